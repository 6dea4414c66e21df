//! The engine facade: the one entry point callers interact with
//!
//! PipelineEngine owns the registry, the rule store, the proposal
//! records, and the occupancy ledger, and wires the gatekeeper,
//! matcher, executor, and timer sweep together. Every public operation
//! is safe to call from multiple threads.
//!
//! Lock order is fixed: proposals map, then one proposal's mutex, then
//! registry or rule store, then the occupancy ledger. Rule cascades run
//! entirely under the matched proposal's mutex, and every action of a
//! cascade targets that same proposal, so no second proposal mutex is
//! ever taken.

use crate::executor::ActionExecutor;
use crate::gatekeeper::{Actor, GateDecision, TransitionGatekeeper};
use crate::matcher::TriggerMatcher;
use crate::occupancy::OccupancyLedger;
use crate::queue::EventQueue;
use crate::registry::PipelineRegistry;
use crate::rule_store::RuleStore;
use crate::scheduler::TimerSweep;
use crate::sinks::{CalendarSink, Clock, Notifier, NullCalendar, NullNotifier, SystemClock};
use pipeline_types::{
    ActivityEntry, AutomationRule, ChecklistItemId, EngineDiagnostic, ExecutionReport,
    OrganizationId, Pipeline, PipelineError, PipelineEvent, PipelineId, PipelineResult,
    ProposalId, ProposalSeed, ProposalState, Role, RuleId, StageId, TransitionResult, Trigger,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Cascade depth at which propagation is cut off
pub const DEFAULT_MAX_CASCADE_DEPTH: usize = 5;

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|e| e.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|e| e.into_inner())
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

// ── Builder ──────────────────────────────────────────────────────────

/// Configures sinks, clock, and cascade bound before engine start
pub struct PipelineEngineBuilder {
    notifier: Arc<dyn Notifier>,
    calendar: Arc<dyn CalendarSink>,
    clock: Arc<dyn Clock>,
    max_cascade_depth: usize,
}

impl PipelineEngineBuilder {
    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn calendar(mut self, calendar: Arc<dyn CalendarSink>) -> Self {
        self.calendar = calendar;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn max_cascade_depth(mut self, depth: usize) -> Self {
        self.max_cascade_depth = depth;
        self
    }

    pub fn build(self) -> PipelineEngine {
        PipelineEngine {
            registry: RwLock::new(PipelineRegistry::new()),
            rules: RwLock::new(RuleStore::new()),
            proposals: RwLock::new(HashMap::new()),
            occupancy: OccupancyLedger::new(),
            gatekeeper: TransitionGatekeeper::new(),
            matcher: TriggerMatcher::new(),
            executor: ActionExecutor::new(
                self.notifier,
                self.calendar,
                self.clock.clone(),
            ),
            sweep: TimerSweep::new(),
            clock: self.clock,
            max_cascade_depth: self.max_cascade_depth,
            reports: Mutex::new(Vec::new()),
            diagnostics: Mutex::new(Vec::new()),
        }
    }
}

// ── Engine ───────────────────────────────────────────────────────────

/// Workflow engine for proposal pipelines and automation rules
pub struct PipelineEngine {
    registry: RwLock<PipelineRegistry>,
    rules: RwLock<RuleStore>,
    proposals: RwLock<HashMap<ProposalId, Arc<Mutex<ProposalState>>>>,
    occupancy: OccupancyLedger,
    gatekeeper: TransitionGatekeeper,
    matcher: TriggerMatcher,
    executor: ActionExecutor,
    sweep: TimerSweep,
    clock: Arc<dyn Clock>,
    max_cascade_depth: usize,
    /// Telemetry, drained by the caller
    reports: Mutex<Vec<ExecutionReport>>,
    diagnostics: Mutex<Vec<EngineDiagnostic>>,
}

impl Default for PipelineEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineEngine {
    /// An engine with null sinks and the system clock
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> PipelineEngineBuilder {
        PipelineEngineBuilder {
            notifier: Arc::new(NullNotifier),
            calendar: Arc::new(NullCalendar),
            clock: Arc::new(SystemClock),
            max_cascade_depth: DEFAULT_MAX_CASCADE_DEPTH,
        }
    }

    // ── Pipeline configuration ───────────────────────────────────────

    /// Validate and register a pipeline; it becomes the organization's
    /// current pipeline for new proposals
    pub fn register_pipeline(&self, pipeline: Pipeline) -> PipelineResult<PipelineId> {
        write(&self.registry).register(pipeline)
    }

    pub fn get_pipeline(&self, id: &PipelineId) -> PipelineResult<Pipeline> {
        read(&self.registry).get(id).cloned()
    }

    pub fn current_pipeline(&self, org: &OrganizationId) -> PipelineResult<Pipeline> {
        read(&self.registry).current_for(org).cloned()
    }

    // ── Rule management ──────────────────────────────────────────────

    pub fn create_rule(&self, rule: AutomationRule) -> PipelineResult<RuleId> {
        write(&self.rules).create(rule)
    }

    pub fn update_rule(&self, rule: AutomationRule) -> PipelineResult<()> {
        write(&self.rules).update(rule)
    }

    pub fn delete_rule(&self, id: &RuleId) -> PipelineResult<AutomationRule> {
        write(&self.rules).delete(id)
    }

    /// Flip a rule's active flag, returning the new value
    pub fn toggle_rule(&self, id: &RuleId) -> PipelineResult<bool> {
        write(&self.rules).toggle(id)
    }

    pub fn get_rule(&self, id: &RuleId) -> PipelineResult<AutomationRule> {
        read(&self.rules).get(id).cloned()
    }

    pub fn rules_for(&self, org: &OrganizationId) -> Vec<AutomationRule> {
        read(&self.rules)
            .list_for(org)
            .into_iter()
            .cloned()
            .collect()
    }

    // ── Proposal lifecycle ───────────────────────────────────────────

    /// Create a proposal in the organization's current pipeline.
    ///
    /// The proposal lands in the initial stage, the occupancy ledger is
    /// updated, and the creation event runs through the rule cascade.
    pub fn create_proposal(
        &self,
        org: &OrganizationId,
        mut seed: ProposalSeed,
    ) -> PipelineResult<ProposalId> {
        let pipeline = self.current_pipeline(org)?;
        let initial = pipeline
            .initial_stage()
            .ok_or_else(|| PipelineError::PipelineNotFound(pipeline.id.clone()))?
            .clone();

        if let Some(status) = &seed.status {
            if !pipeline.statuses.is_empty() && !pipeline.has_status(status) {
                return Err(PipelineError::UnknownStatus(status.clone()));
            }
        } else {
            seed.status = pipeline.statuses.first().cloned();
        }

        let proposal = ProposalState::new(
            org.clone(),
            pipeline.id.clone(),
            initial.id.clone(),
            seed,
        );
        let id = proposal.id.clone();
        self.occupancy
            .with_counts(|c| c.enter(&pipeline.id, &initial.id));

        let handle = Arc::new(Mutex::new(proposal));
        write(&self.proposals).insert(id.clone(), handle.clone());
        tracing::info!(proposal_id = %id, stage_id = %initial.id, "Proposal created");

        let mut guard = lock(&handle);
        self.pump(
            &mut guard,
            &pipeline,
            PipelineEvent::ProposalCreated {
                proposal_id: id.clone(),
            },
        );
        Ok(id)
    }

    /// A snapshot of a proposal's current state
    pub fn get_proposal(&self, id: &ProposalId) -> PipelineResult<ProposalState> {
        let handle = self.proposal_handle(id)?;
        let guard = lock(&handle);
        Ok(guard.clone())
    }

    pub fn proposal_count(&self) -> usize {
        read(&self.proposals).len()
    }

    /// IDs of the proposals currently in a stage
    pub fn proposals_in_stage(
        &self,
        pipeline_id: &PipelineId,
        stage_id: &StageId,
    ) -> Vec<ProposalId> {
        let handles: Vec<Arc<Mutex<ProposalState>>> =
            read(&self.proposals).values().cloned().collect();
        handles
            .iter()
            .filter_map(|handle| {
                let guard = lock(handle);
                (&guard.pipeline_id == pipeline_id && &guard.current_stage_id == stage_id)
                    .then(|| guard.id.clone())
            })
            .collect()
    }

    /// A proposal's activity chain, oldest first
    pub fn activity_for(&self, id: &ProposalId) -> PipelineResult<Vec<ActivityEntry>> {
        let handle = self.proposal_handle(id)?;
        let guard = lock(&handle);
        Ok(guard.activity.clone())
    }

    /// Current occupant count of a stage
    pub fn stage_occupancy(&self, pipeline_id: &PipelineId, stage_id: &StageId) -> u32 {
        self.occupancy.occupancy(pipeline_id, stage_id)
    }

    // ── Transitions ──────────────────────────────────────────────────

    /// Request a stage transition on behalf of a role.
    ///
    /// Gating failures come back as `TransitionResult::Denied`, not as
    /// errors; `Err` means the proposal or pipeline could not be
    /// resolved at all.
    pub fn request_transition(
        &self,
        proposal_id: &ProposalId,
        target: &StageId,
        role: Role,
    ) -> PipelineResult<TransitionResult> {
        let handle = self.proposal_handle(proposal_id)?;
        let mut proposal = lock(&handle);
        let pipeline = self.get_pipeline(&proposal.pipeline_id)?;
        Ok(self.transition_locked(&mut proposal, &pipeline, target, &Actor::User(role)))
    }

    /// Approve a held exit and re-run the stored transition.
    ///
    /// The approver must hold one of the current stage's approver
    /// roles; the re-run transition acts as the original requester.
    pub fn approve_exit(
        &self,
        proposal_id: &ProposalId,
        approver: Role,
    ) -> PipelineResult<TransitionResult> {
        let handle = self.proposal_handle(proposal_id)?;
        let mut proposal = lock(&handle);

        let pending = match (proposal.pending_approval, proposal.pending_transition.clone()) {
            (true, Some(pending)) => pending,
            _ => return Err(PipelineError::NoPendingApproval(proposal_id.clone())),
        };

        let pipeline = self.get_pipeline(&proposal.pipeline_id)?;
        let current = pipeline
            .get_stage(&proposal.current_stage_id)
            .ok_or_else(|| PipelineError::StageNotFound(proposal.current_stage_id.clone()))?;
        if !current.allows_approval(&approver) {
            return Err(PipelineError::PermissionDenied(format!(
                "role '{}' may not approve exits from stage '{}'",
                approver, current.id
            )));
        }

        proposal.grant_approval(&approver);
        tracing::info!(
            proposal_id = %proposal_id,
            approver = %approver,
            target = %pending.target_stage_id,
            "Exit approved, re-running held transition"
        );
        Ok(self.transition_locked(
            &mut proposal,
            &pipeline,
            &pending.target_stage_id,
            &Actor::User(pending.requester_role),
        ))
    }

    /// One transition attempt under the proposal's lock. Commits the
    /// occupancy transfer in the same ledger critical section as the
    /// capacity check, then runs the cascade.
    fn transition_locked(
        &self,
        proposal: &mut ProposalState,
        pipeline: &Pipeline,
        target: &StageId,
        actor: &Actor,
    ) -> TransitionResult {
        let from = proposal.current_stage_id.clone();
        let decision = self.occupancy.with_counts(|counts| {
            let decision = self.gatekeeper.evaluate(
                proposal,
                pipeline,
                target,
                actor,
                counts.get(&pipeline.id, target),
            );
            if matches!(decision, GateDecision::Proceed { .. }) {
                counts.transfer(&pipeline.id, &from, target);
            }
            decision
        });

        match decision {
            GateDecision::Proceed { warning } => {
                proposal.enter_stage(target.clone(), self.clock.now());
                tracing::info!(
                    proposal_id = %proposal.id,
                    from = %from,
                    to = %target,
                    "Stage transition committed"
                );
                self.pump(
                    proposal,
                    pipeline,
                    PipelineEvent::StageChanged {
                        proposal_id: proposal.id.clone(),
                        from_stage: from,
                        to_stage: target.clone(),
                    },
                );
                match warning {
                    Some(warning) => {
                        tracing::warn!(
                            proposal_id = %proposal.id,
                            stage_id = %warning.stage_id,
                            occupancy = warning.occupancy,
                            limit = warning.limit,
                            "Stage over its soft WIP limit"
                        );
                        TransitionResult::AllowedWithWarning { warning }
                    }
                    None => TransitionResult::Allowed,
                }
            }
            GateDecision::HoldForApproval => {
                if let Actor::User(role) = actor {
                    proposal.hold_for_approval(target.clone(), role.clone());
                }
                tracing::info!(
                    proposal_id = %proposal.id,
                    target = %target,
                    "Transition held for approval"
                );
                TransitionResult::AwaitingApproval
            }
            GateDecision::Deny(reason) => {
                tracing::debug!(
                    proposal_id = %proposal.id,
                    target = %target,
                    reason = %reason,
                    "Transition denied"
                );
                TransitionResult::Denied { reason }
            }
        }
    }

    // ── Proposal field operations ────────────────────────────────────

    /// Set a proposal's status, feeding the change into the cascade
    pub fn change_status(
        &self,
        proposal_id: &ProposalId,
        status: impl Into<String>,
    ) -> PipelineResult<()> {
        let status = status.into();
        let handle = self.proposal_handle(proposal_id)?;
        let mut proposal = lock(&handle);
        let pipeline = self.get_pipeline(&proposal.pipeline_id)?;

        if !pipeline.statuses.is_empty() && !pipeline.has_status(&status) {
            return Err(PipelineError::UnknownStatus(status));
        }
        if proposal.status == status {
            return Ok(());
        }

        let old = proposal.set_status(status.clone());
        self.pump(
            &mut proposal,
            &pipeline,
            PipelineEvent::StatusChanged {
                proposal_id: proposal_id.clone(),
                from_status: old,
                to_status: status,
            },
        );
        Ok(())
    }

    /// Set a named field, feeding the change into the cascade
    pub fn set_field(
        &self,
        proposal_id: &ProposalId,
        field: impl Into<String>,
        value: impl Into<String>,
    ) -> PipelineResult<()> {
        let field = field.into();
        let handle = self.proposal_handle(proposal_id)?;
        let mut proposal = lock(&handle);
        let pipeline = self.get_pipeline(&proposal.pipeline_id)?;

        proposal.set_field(field.clone(), value);
        self.pump(
            &mut proposal,
            &pipeline,
            PipelineEvent::FieldChanged {
                proposal_id: proposal_id.clone(),
                field,
            },
        );
        Ok(())
    }

    pub fn assign_user(
        &self,
        proposal_id: &ProposalId,
        user: impl Into<String>,
    ) -> PipelineResult<()> {
        let handle = self.proposal_handle(proposal_id)?;
        lock(&handle).assign(user);
        Ok(())
    }

    pub fn add_comment(
        &self,
        proposal_id: &ProposalId,
        author: impl Into<String>,
        text: impl Into<String>,
    ) -> PipelineResult<()> {
        let handle = self.proposal_handle(proposal_id)?;
        lock(&handle).add_comment(author, text);
        Ok(())
    }

    /// Mark a checklist item of the named stage complete.
    ///
    /// Progress is tracked per stage, so completions may be recorded
    /// against any stage of the pipeline, not only the current one.
    /// Returns false when the item was already complete; repeat
    /// completions emit no event.
    pub fn complete_checklist_item(
        &self,
        proposal_id: &ProposalId,
        stage_id: &StageId,
        item_id: &ChecklistItemId,
    ) -> PipelineResult<bool> {
        let handle = self.proposal_handle(proposal_id)?;
        let mut proposal = lock(&handle);
        let pipeline = self.get_pipeline(&proposal.pipeline_id)?;
        let stage = pipeline
            .get_stage(stage_id)
            .ok_or_else(|| PipelineError::StageNotFound(stage_id.clone()))?
            .clone();

        if !stage.checklist.iter().any(|item| &item.id == item_id) {
            return Err(PipelineError::ChecklistItemNotFound(item_id.0.clone()));
        }

        let inserted = proposal.complete_checklist_item(&stage.id, item_id.clone());
        if inserted {
            let all_required_complete =
                stage.checklist_complete(&proposal.completed_items_for(&stage.id));
            self.pump(
                &mut proposal,
                &pipeline,
                PipelineEvent::ChecklistItemCompleted {
                    proposal_id: proposal_id.clone(),
                    stage_id: stage.id.clone(),
                    item_id: item_id.clone(),
                    all_required_complete,
                },
            );
        }
        Ok(inserted)
    }

    // ── Timers ───────────────────────────────────────────────────────

    /// Sweep every proposal for due-date and time-in-stage events and
    /// run the resulting cascades. Returns the number of events fed in.
    pub fn poll_timers(&self) -> usize {
        let now = self.clock.now();
        let today = self.clock.today();
        let handles: Vec<Arc<Mutex<ProposalState>>> =
            read(&self.proposals).values().cloned().collect();

        let mut fed = 0;
        for handle in handles {
            let mut proposal = lock(&handle);
            let events = self.sweep.sweep(&mut proposal, now, today);
            if events.is_empty() {
                continue;
            }
            let pipeline = match self.get_pipeline(&proposal.pipeline_id) {
                Ok(pipeline) => pipeline,
                Err(e) => {
                    tracing::warn!(proposal_id = %proposal.id, error = %e, "Timer sweep skipped");
                    continue;
                }
            };
            for event in events {
                fed += 1;
                self.pump(&mut proposal, &pipeline, event);
            }
        }
        fed
    }

    // ── Telemetry ────────────────────────────────────────────────────

    /// Take all execution reports accumulated since the last drain
    pub fn drain_reports(&self) -> Vec<ExecutionReport> {
        std::mem::take(&mut *lock(&self.reports))
    }

    /// Take all diagnostics accumulated since the last drain
    pub fn drain_diagnostics(&self) -> Vec<EngineDiagnostic> {
        std::mem::take(&mut *lock(&self.diagnostics))
    }

    // ── Cascade ──────────────────────────────────────────────────────

    /// Breadth-first rule cascade for one seed event, run under the
    /// proposal's lock. Derived events past the depth bound are dropped
    /// and surfaced as a loop diagnostic.
    fn pump(&self, proposal: &mut ProposalState, pipeline: &Pipeline, seed: PipelineEvent) {
        let mut queue = EventQueue::new(self.max_cascade_depth);
        queue.seed(seed);

        while let Some((event, depth)) = queue.pop() {
            let candidates = read(&self.rules).active_for(&proposal.organization_id);
            let matched: Vec<AutomationRule> = self
                .matcher
                .match_rules(&event, proposal, &candidates)
                .into_iter()
                .cloned()
                .collect();

            for rule in matched {
                // One fire per matched event, counted before the actions run
                if let Err(e) = write(&self.rules).record_fire(&rule.id) {
                    tracing::debug!(rule_id = %rule.id, error = %e, "Fire count not recorded");
                }
                if matches!(rule.trigger, Trigger::OnTimeInStage { .. }) {
                    proposal.mark_time_rule_fired(rule.id.clone());
                }

                tracing::debug!(
                    rule_id = %rule.id,
                    rule = %rule.name,
                    event = %event,
                    depth,
                    "Rule fired"
                );
                let (report, derived) =
                    self.executor
                        .execute(&rule, &event, proposal, pipeline, &self.occupancy);
                lock(&self.reports).push(report);

                if !queue.push_derived(derived, depth) {
                    tracing::warn!(
                        proposal_id = %proposal.id,
                        depth = depth + 1,
                        "Cascade depth bound hit, dropping derived events"
                    );
                    lock(&self.diagnostics).push(EngineDiagnostic::RuleLoopDetected {
                        proposal_id: proposal.id.clone(),
                        depth: depth + 1,
                    });
                }
            }
        }
    }

    fn proposal_handle(&self, id: &ProposalId) -> PipelineResult<Arc<Mutex<ProposalState>>> {
        read(&self.proposals)
            .get(id)
            .cloned()
            .ok_or_else(|| PipelineError::ProposalNotFound(id.clone()))
    }
}
