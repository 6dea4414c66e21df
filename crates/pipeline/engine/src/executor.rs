//! Action executor: applies a matched rule's actions to a proposal
//!
//! Actions run strictly in declared order. A failed or skipped action
//! never stops its siblings, and the per-action outcomes are collected
//! into an execution report. Stage moves requested by automation go
//! through the same gatekeeper as user moves, as the system actor.

use crate::gatekeeper::{Actor, GateDecision, TransitionGatekeeper};
use crate::occupancy::OccupancyLedger;
use crate::sinks::{CalendarSink, Clock, Notifier};
use pipeline_types::{
    Action, ActionOutcome, ActionReport, AutomationRule, DenialReason, ExecutionReport, Pipeline,
    PipelineEvent, ProposalState,
};
use std::sync::Arc;

/// Executes rule actions against a locked proposal
pub struct ActionExecutor {
    gatekeeper: TransitionGatekeeper,
    notifier: Arc<dyn Notifier>,
    calendar: Arc<dyn CalendarSink>,
    clock: Arc<dyn Clock>,
}

impl ActionExecutor {
    pub fn new(
        notifier: Arc<dyn Notifier>,
        calendar: Arc<dyn CalendarSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            gatekeeper: TransitionGatekeeper::new(),
            notifier,
            calendar,
            clock,
        }
    }

    /// Run every action of `rule` against the proposal, in order.
    ///
    /// The caller holds the proposal's lock for the whole call. Returns
    /// the execution report and the events the successful actions
    /// produced, for cascade propagation.
    pub fn execute(
        &self,
        rule: &AutomationRule,
        event: &PipelineEvent,
        proposal: &mut ProposalState,
        pipeline: &Pipeline,
        occupancy: &OccupancyLedger,
    ) -> (ExecutionReport, Vec<PipelineEvent>) {
        let mut outcomes = Vec::with_capacity(rule.actions.len());
        let mut derived = Vec::new();

        for (index, action) in rule.actions.iter().enumerate() {
            let outcome = self.apply(action, proposal, pipeline, occupancy, &mut derived);
            match &outcome {
                ActionOutcome::Succeeded => {}
                ActionOutcome::Failed { reason } => {
                    tracing::warn!(
                        rule_id = %rule.id,
                        action = action.kind(),
                        index,
                        reason = %reason,
                        "Rule action failed"
                    );
                }
                ActionOutcome::Skipped { reason } => {
                    tracing::debug!(
                        rule_id = %rule.id,
                        action = action.kind(),
                        index,
                        reason = %reason,
                        "Rule action skipped"
                    );
                }
            }
            outcomes.push(ActionReport {
                index,
                action: action.kind().to_string(),
                outcome,
            });
        }

        let report = ExecutionReport {
            rule_id: rule.id.clone(),
            rule_name: rule.name.clone(),
            proposal_id: proposal.id.clone(),
            event_kind: event.kind().to_string(),
            outcomes,
            fired_at: self.clock.now(),
        };
        (report, derived)
    }

    fn apply(
        &self,
        action: &Action,
        proposal: &mut ProposalState,
        pipeline: &Pipeline,
        occupancy: &OccupancyLedger,
        derived: &mut Vec<PipelineEvent>,
    ) -> ActionOutcome {
        match action {
            Action::MoveStage { target_stage_id } => {
                self.move_stage(proposal, pipeline, target_stage_id, occupancy, derived)
            }

            Action::ChangeStatus { status } => {
                if !pipeline.has_status(status) {
                    return ActionOutcome::failed(format!(
                        "status '{}' not in pipeline vocabulary",
                        status
                    ));
                }
                if proposal.status == *status {
                    return ActionOutcome::Succeeded;
                }
                let old = proposal.set_status(status.clone());
                derived.push(PipelineEvent::StatusChanged {
                    proposal_id: proposal.id.clone(),
                    from_status: old,
                    to_status: status.clone(),
                });
                ActionOutcome::Succeeded
            }

            Action::Notify { recipient, message } => {
                match self.notifier.send(recipient, message) {
                    Ok(()) => ActionOutcome::Succeeded,
                    Err(e) => ActionOutcome::failed(e.to_string()),
                }
            }

            Action::AssignUser { user } => {
                proposal.assign(user.clone());
                ActionOutcome::Succeeded
            }

            Action::SetField { field, value } => {
                proposal.set_field(field.clone(), value.clone());
                derived.push(PipelineEvent::FieldChanged {
                    proposal_id: proposal.id.clone(),
                    field: field.clone(),
                });
                ActionOutcome::Succeeded
            }

            Action::CreateCalendarEvent { title, days_ahead } => {
                let date = self.clock.today() + chrono::Duration::days(*days_ahead);
                match self.calendar.create_event(title, date) {
                    Ok(()) => ActionOutcome::Succeeded,
                    Err(e) => ActionOutcome::failed(e.to_string()),
                }
            }

            Action::AddComment { text } => {
                proposal.add_comment("automation", text.clone());
                ActionOutcome::Succeeded
            }
        }
    }

    /// Stage move as the system actor. Check and count commit share one
    /// ledger critical section.
    fn move_stage(
        &self,
        proposal: &mut ProposalState,
        pipeline: &Pipeline,
        target: &pipeline_types::StageId,
        occupancy: &OccupancyLedger,
        derived: &mut Vec<PipelineEvent>,
    ) -> ActionOutcome {
        let from = proposal.current_stage_id.clone();
        let decision = occupancy.with_counts(|counts| {
            let decision = self.gatekeeper.evaluate(
                proposal,
                pipeline,
                target,
                &Actor::System,
                counts.get(&pipeline.id, target),
            );
            if matches!(decision, GateDecision::Proceed { .. }) {
                counts.transfer(&pipeline.id, &from, target);
            }
            decision
        });

        match decision {
            GateDecision::Proceed { warning } => {
                if let Some(w) = warning {
                    tracing::warn!(
                        proposal_id = %proposal.id,
                        stage_id = %w.stage_id,
                        occupancy = w.occupancy,
                        limit = w.limit,
                        "Automation moved proposal into a stage over its soft limit"
                    );
                }
                proposal.enter_stage(target.clone(), self.clock.now());
                derived.push(PipelineEvent::StageChanged {
                    proposal_id: proposal.id.clone(),
                    from_stage: from,
                    to_stage: target.clone(),
                });
                ActionOutcome::Succeeded
            }
            // The system actor never hits the approval gate; kept for totality
            GateDecision::HoldForApproval => ActionOutcome::skipped("approval required"),
            GateDecision::Deny(reason @ DenialReason::InvalidStageReference { .. }) => {
                ActionOutcome::failed(reason.to_string())
            }
            GateDecision::Deny(reason) => ActionOutcome::skipped(reason.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sinks::{ManualClock, RecordingCalendar, RecordingNotifier};
    use pipeline_types::{
        OrganizationId, ProposalSeed, Stage, StageId, Trigger, WipLimitKind,
    };

    struct Fixture {
        executor: ActionExecutor,
        notifier: Arc<RecordingNotifier>,
        calendar: Arc<RecordingCalendar>,
        occupancy: OccupancyLedger,
        pipeline: Pipeline,
    }

    fn make_fixture() -> Fixture {
        let notifier = Arc::new(RecordingNotifier::new());
        let calendar = Arc::new(RecordingCalendar::new());
        let clock = Arc::new(ManualClock::starting_at(chrono::Utc::now()));
        let pipeline = Pipeline::new("P", OrganizationId::new("org-1"))
            .with_statuses(["draft", "submitted"])
            .with_stage(Stage::new("draft", "Draft", 0))
            .with_stage(Stage::new("review", "Review", 1).with_wip_limit(1, WipLimitKind::Hard))
            .with_stage(Stage::new("archive", "Archive", 2).terminal());
        Fixture {
            executor: ActionExecutor::new(notifier.clone(), calendar.clone(), clock),
            notifier,
            calendar,
            occupancy: OccupancyLedger::new(),
            pipeline,
        }
    }

    fn make_proposal(fixture: &Fixture) -> ProposalState {
        let proposal = ProposalState::new(
            fixture.pipeline.organization_id.clone(),
            fixture.pipeline.id.clone(),
            StageId::new("draft"),
            ProposalSeed::default().with_status("draft"),
        );
        fixture
            .occupancy
            .with_counts(|c| c.enter(&fixture.pipeline.id, &StageId::new("draft")));
        proposal
    }

    fn make_rule(actions: Vec<Action>) -> AutomationRule {
        let mut rule =
            AutomationRule::new("rule", OrganizationId::new("org-1"), Trigger::OnColumnMove);
        for action in actions {
            rule = rule.with_action(action);
        }
        rule
    }

    fn creation_event(proposal: &ProposalState) -> PipelineEvent {
        PipelineEvent::ProposalCreated {
            proposal_id: proposal.id.clone(),
        }
    }

    #[test]
    fn test_all_actions_run_despite_failure() {
        let fixture = make_fixture();
        let mut proposal = make_proposal(&fixture);
        fixture.notifier.set_failing(true);

        let rule = make_rule(vec![
            Action::Notify {
                recipient: "owner".into(),
                message: "hi".into(),
            },
            Action::SetField {
                field: "flag".into(),
                value: "on".into(),
            },
        ]);
        let event = creation_event(&proposal);
        let (report, derived) = fixture.executor.execute(
            &rule,
            &event,
            &mut proposal,
            &fixture.pipeline,
            &fixture.occupancy,
        );

        assert_eq!(report.failed_count(), 1);
        assert_eq!(report.succeeded_count(), 1);
        assert_eq!(proposal.fields.get("flag").unwrap(), "on");
        // Only the succeeding action produced an event
        assert_eq!(derived.len(), 1);
    }

    #[test]
    fn test_move_stage_commits_and_emits() {
        let fixture = make_fixture();
        let mut proposal = make_proposal(&fixture);

        let rule = make_rule(vec![Action::MoveStage {
            target_stage_id: StageId::new("review"),
        }]);
        let event = creation_event(&proposal);
        let (report, derived) = fixture.executor.execute(
            &rule,
            &event,
            &mut proposal,
            &fixture.pipeline,
            &fixture.occupancy,
        );

        assert_eq!(report.succeeded_count(), 1);
        assert_eq!(proposal.current_stage_id, StageId::new("review"));
        assert_eq!(
            fixture
                .occupancy
                .occupancy(&fixture.pipeline.id, &StageId::new("review")),
            1
        );
        assert_eq!(
            fixture
                .occupancy
                .occupancy(&fixture.pipeline.id, &StageId::new("draft")),
            0
        );
        assert!(matches!(
            derived[0],
            PipelineEvent::StageChanged { .. }
        ));
    }

    #[test]
    fn test_move_into_full_hard_stage_skipped() {
        let fixture = make_fixture();
        let mut proposal = make_proposal(&fixture);
        fixture
            .occupancy
            .with_counts(|c| c.enter(&fixture.pipeline.id, &StageId::new("review")));

        let rule = make_rule(vec![Action::MoveStage {
            target_stage_id: StageId::new("review"),
        }]);
        let event = creation_event(&proposal);
        let (report, derived) = fixture.executor.execute(
            &rule,
            &event,
            &mut proposal,
            &fixture.pipeline,
            &fixture.occupancy,
        );

        assert!(matches!(
            report.outcomes[0].outcome,
            ActionOutcome::Skipped { .. }
        ));
        assert_eq!(proposal.current_stage_id, StageId::new("draft"));
        assert!(derived.is_empty());
    }

    #[test]
    fn test_move_out_of_terminal_skipped() {
        let fixture = make_fixture();
        let mut proposal = make_proposal(&fixture);
        proposal.enter_stage(StageId::new("archive"), chrono::Utc::now());

        let rule = make_rule(vec![Action::MoveStage {
            target_stage_id: StageId::new("draft"),
        }]);
        let event = creation_event(&proposal);
        let (report, _) = fixture.executor.execute(
            &rule,
            &event,
            &mut proposal,
            &fixture.pipeline,
            &fixture.occupancy,
        );

        assert!(matches!(
            report.outcomes[0].outcome,
            ActionOutcome::Skipped { .. }
        ));
    }

    #[test]
    fn test_move_to_unknown_stage_fails() {
        let fixture = make_fixture();
        let mut proposal = make_proposal(&fixture);

        let rule = make_rule(vec![Action::MoveStage {
            target_stage_id: StageId::new("nowhere"),
        }]);
        let event = creation_event(&proposal);
        let (report, _) = fixture.executor.execute(
            &rule,
            &event,
            &mut proposal,
            &fixture.pipeline,
            &fixture.occupancy,
        );

        assert!(matches!(
            report.outcomes[0].outcome,
            ActionOutcome::Failed { .. }
        ));
    }

    #[test]
    fn test_change_status_validates_vocabulary() {
        let fixture = make_fixture();
        let mut proposal = make_proposal(&fixture);

        let rule = make_rule(vec![
            Action::ChangeStatus {
                status: "bogus".into(),
            },
            Action::ChangeStatus {
                status: "submitted".into(),
            },
        ]);
        let event = creation_event(&proposal);
        let (report, derived) = fixture.executor.execute(
            &rule,
            &event,
            &mut proposal,
            &fixture.pipeline,
            &fixture.occupancy,
        );

        assert_eq!(report.failed_count(), 1);
        assert_eq!(proposal.status, "submitted");
        assert!(matches!(
            derived[0],
            PipelineEvent::StatusChanged { .. }
        ));
    }

    #[test]
    fn test_calendar_and_comment() {
        let fixture = make_fixture();
        let mut proposal = make_proposal(&fixture);

        let rule = make_rule(vec![
            Action::CreateCalendarEvent {
                title: "Follow up".into(),
                days_ahead: 3,
            },
            Action::AddComment {
                text: "scheduled".into(),
            },
        ]);
        let event = creation_event(&proposal);
        let (report, _) = fixture.executor.execute(
            &rule,
            &event,
            &mut proposal,
            &fixture.pipeline,
            &fixture.occupancy,
        );

        assert_eq!(report.succeeded_count(), 2);
        assert_eq!(fixture.calendar.event_count(), 1);
        assert_eq!(proposal.comments.len(), 1);
        assert_eq!(proposal.comments[0].author, "automation");
    }
}
