//! Trigger matcher: selects the rules that fire for an event
//!
//! Pure evaluation — the matcher reads the event, the proposal, and the
//! candidate rules, and returns the matches in execution order. It
//! never mutates state; marking time-in-stage rules as fired is the
//! engine's job, after execution.

use pipeline_types::{AutomationRule, PipelineEvent, ProposalState, Trigger};

/// Matches pipeline events against rule triggers
#[derive(Clone, Debug, Default)]
pub struct TriggerMatcher;

impl TriggerMatcher {
    pub fn new() -> Self {
        Self
    }

    /// Select the rules that fire for `event`.
    ///
    /// `candidates` must already be the organization's active rules in
    /// (execution_order, created_seq) order — the store's `active_for`
    /// output. Order is preserved.
    pub fn match_rules<'a>(
        &self,
        event: &PipelineEvent,
        proposal: &ProposalState,
        candidates: &'a [AutomationRule],
    ) -> Vec<&'a AutomationRule> {
        candidates
            .iter()
            .filter(|rule| rule.applies_to.includes(proposal))
            .filter(|rule| self.trigger_matches(rule, event, proposal))
            .collect()
    }

    /// Per-trigger-type comparison semantics
    fn trigger_matches(
        &self,
        rule: &AutomationRule,
        event: &PipelineEvent,
        proposal: &ProposalState,
    ) -> bool {
        match (&rule.trigger, event) {
            (
                Trigger::OnStatusChange {
                    from_status,
                    to_status,
                },
                PipelineEvent::StatusChanged {
                    from_status: event_from,
                    to_status: event_to,
                    ..
                },
            ) => {
                // Absent condition = wildcard
                from_status.as_ref().map_or(true, |f| f == event_from)
                    && to_status.as_ref().map_or(true, |t| t == event_to)
            }

            (Trigger::OnColumnMove, PipelineEvent::StageChanged { .. }) => true,

            (
                Trigger::OnDueDateApproaching { days_before },
                PipelineEvent::DueDateApproaching { days_until_due, .. },
            ) => days_until_due == days_before,

            (Trigger::OnTaskCompletion, PipelineEvent::ChecklistItemCompleted { .. }) => true,

            (
                Trigger::OnAllSubtasksComplete,
                PipelineEvent::ChecklistItemCompleted {
                    all_required_complete,
                    ..
                },
            ) => *all_required_complete,

            (
                Trigger::OnFieldChange { field },
                PipelineEvent::FieldChanged {
                    field: event_field, ..
                },
            ) => field == event_field,

            (
                Trigger::OnTimeInStage { days_in_stage },
                PipelineEvent::TimeInStageElapsed {
                    days_in_stage: elapsed,
                    ..
                },
            ) => *elapsed >= *days_in_stage && !proposal.time_rule_fired(&rule.id),

            (Trigger::OnCreation, PipelineEvent::ProposalCreated { .. }) => true,

            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipeline_types::{
        Action, OrganizationId, PipelineId, ProposalId, ProposalSeed, RuleScope, StageId,
    };

    fn make_proposal() -> ProposalState {
        ProposalState::new(
            OrganizationId::new("org-1"),
            PipelineId::new("pipe-1"),
            StageId::new("draft"),
            ProposalSeed::default().with_status("draft"),
        )
    }

    fn make_rule(trigger: Trigger) -> AutomationRule {
        AutomationRule::new("rule", OrganizationId::new("org-1"), trigger).with_action(
            Action::AddComment {
                text: "fired".into(),
            },
        )
    }

    fn status_event(proposal: &ProposalState, from: &str, to: &str) -> PipelineEvent {
        PipelineEvent::StatusChanged {
            proposal_id: proposal.id.clone(),
            from_status: from.into(),
            to_status: to.into(),
        }
    }

    #[test]
    fn test_status_change_exact_and_wildcard() {
        let matcher = TriggerMatcher::new();
        let proposal = make_proposal();
        let rules = vec![make_rule(Trigger::status_change(
            Some("draft"),
            Some("submitted"),
        ))];

        let matched = matcher.match_rules(
            &status_event(&proposal, "draft", "submitted"),
            &proposal,
            &rules,
        );
        assert_eq!(matched.len(), 1);

        // Different to_status: no fire
        let matched = matcher.match_rules(
            &status_event(&proposal, "draft", "in_progress"),
            &proposal,
            &rules,
        );
        assert!(matched.is_empty());

        // Wildcard from
        let rules = vec![make_rule(Trigger::status_change(None, Some("submitted")))];
        let matched = matcher.match_rules(
            &status_event(&proposal, "anything", "submitted"),
            &proposal,
            &rules,
        );
        assert_eq!(matched.len(), 1);
    }

    #[test]
    fn test_column_move_matches_any_move() {
        let matcher = TriggerMatcher::new();
        let proposal = make_proposal();
        let rules = vec![make_rule(Trigger::OnColumnMove)];

        let event = PipelineEvent::StageChanged {
            proposal_id: proposal.id.clone(),
            from_stage: StageId::new("draft"),
            to_stage: StageId::new("review"),
        };
        assert_eq!(matcher.match_rules(&event, &proposal, &rules).len(), 1);

        // Wrong event type entirely
        let event = PipelineEvent::ProposalCreated {
            proposal_id: proposal.id.clone(),
        };
        assert!(matcher.match_rules(&event, &proposal, &rules).is_empty());
    }

    #[test]
    fn test_due_date_exact_day_only() {
        let matcher = TriggerMatcher::new();
        let proposal = make_proposal();
        let rules = vec![make_rule(Trigger::OnDueDateApproaching { days_before: 3 })];

        let event = PipelineEvent::DueDateApproaching {
            proposal_id: proposal.id.clone(),
            days_until_due: 3,
        };
        assert_eq!(matcher.match_rules(&event, &proposal, &rules).len(), 1);

        let event = PipelineEvent::DueDateApproaching {
            proposal_id: proposal.id.clone(),
            days_until_due: 2,
        };
        assert!(matcher.match_rules(&event, &proposal, &rules).is_empty());
    }

    #[test]
    fn test_time_in_stage_threshold_and_marker() {
        let matcher = TriggerMatcher::new();
        let mut proposal = make_proposal();
        let rules = vec![make_rule(Trigger::OnTimeInStage { days_in_stage: 7 })];

        let event = PipelineEvent::TimeInStageElapsed {
            proposal_id: proposal.id.clone(),
            stage_id: StageId::new("draft"),
            days_in_stage: 6,
        };
        assert!(matcher.match_rules(&event, &proposal, &rules).is_empty());

        let event = PipelineEvent::TimeInStageElapsed {
            proposal_id: proposal.id.clone(),
            stage_id: StageId::new("draft"),
            days_in_stage: 7,
        };
        assert_eq!(matcher.match_rules(&event, &proposal, &rules).len(), 1);

        // Once marked fired for this visit, the rule stops matching
        proposal.mark_time_rule_fired(rules[0].id.clone());
        assert!(matcher.match_rules(&event, &proposal, &rules).is_empty());

        // A new stage visit clears the marker
        proposal.enter_stage(StageId::new("review"), chrono::Utc::now());
        let event = PipelineEvent::TimeInStageElapsed {
            proposal_id: proposal.id.clone(),
            stage_id: StageId::new("review"),
            days_in_stage: 8,
        };
        assert_eq!(matcher.match_rules(&event, &proposal, &rules).len(), 1);
    }

    #[test]
    fn test_task_completion_triggers() {
        let matcher = TriggerMatcher::new();
        let proposal = make_proposal();
        let rules = vec![
            make_rule(Trigger::OnTaskCompletion),
            make_rule(Trigger::OnAllSubtasksComplete),
        ];

        let partial = PipelineEvent::ChecklistItemCompleted {
            proposal_id: proposal.id.clone(),
            stage_id: StageId::new("draft"),
            item_id: pipeline_types::ChecklistItemId::new("a"),
            all_required_complete: false,
        };
        let matched = matcher.match_rules(&partial, &proposal, &rules);
        assert_eq!(matched.len(), 1);

        let last = PipelineEvent::ChecklistItemCompleted {
            proposal_id: proposal.id.clone(),
            stage_id: StageId::new("draft"),
            item_id: pipeline_types::ChecklistItemId::new("b"),
            all_required_complete: true,
        };
        let matched = matcher.match_rules(&last, &proposal, &rules);
        assert_eq!(matched.len(), 2);
    }

    #[test]
    fn test_field_change_name_equality() {
        let matcher = TriggerMatcher::new();
        let proposal = make_proposal();
        let rules = vec![make_rule(Trigger::field_change("owner"))];

        let event = PipelineEvent::FieldChanged {
            proposal_id: proposal.id.clone(),
            field: "owner".into(),
        };
        assert_eq!(matcher.match_rules(&event, &proposal, &rules).len(), 1);

        let event = PipelineEvent::FieldChanged {
            proposal_id: proposal.id.clone(),
            field: "budget".into(),
        };
        assert!(matcher.match_rules(&event, &proposal, &rules).is_empty());
    }

    #[test]
    fn test_scope_filters_matches() {
        let matcher = TriggerMatcher::new();
        let proposal = make_proposal(); // in "draft"
        let rules = vec![make_rule(Trigger::OnColumnMove)
            .with_scope(RuleScope::stages([StageId::new("review")]))];

        let event = PipelineEvent::StageChanged {
            proposal_id: proposal.id.clone(),
            from_stage: StageId::new("draft"),
            to_stage: StageId::new("review"),
        };
        assert!(matcher.match_rules(&event, &proposal, &rules).is_empty());
    }

    #[test]
    fn test_creation_trigger() {
        let matcher = TriggerMatcher::new();
        let proposal = make_proposal();
        let rules = vec![make_rule(Trigger::OnCreation)];

        let event = PipelineEvent::ProposalCreated {
            proposal_id: ProposalId::new("p-1"),
        };
        assert_eq!(matcher.match_rules(&event, &proposal, &rules).len(), 1);
    }

    #[test]
    fn test_match_order_preserved() {
        let matcher = TriggerMatcher::new();
        let proposal = make_proposal();
        let rules = vec![
            make_rule(Trigger::OnColumnMove).with_execution_order(1),
            make_rule(Trigger::OnColumnMove).with_execution_order(2),
        ];

        let event = PipelineEvent::StageChanged {
            proposal_id: proposal.id.clone(),
            from_stage: StageId::new("draft"),
            to_stage: StageId::new("review"),
        };
        let matched = matcher.match_rules(&event, &proposal, &rules);
        assert_eq!(matched.len(), 2);
        assert_eq!(matched[0].execution_order, 1);
        assert_eq!(matched[1].execution_order, 2);
    }
}
