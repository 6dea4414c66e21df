//! Proposal state: the mutable per-work-item record
//!
//! ProposalState is only ever mutated through the gatekeeper's commit
//! step or the action executor, and every mutation appends to the
//! proposal's activity chain. It is never deleted by the core.

use crate::{ChecklistItemId, OrganizationId, PipelineId, Role, RuleId, StageId};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

// ── Identifier ───────────────────────────────────────────────────────

/// Unique identifier for a proposal
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProposalId(pub String);

impl ProposalId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn short(&self) -> &str {
        &self.0[..8.min(self.0.len())]
    }
}

impl std::fmt::Display for ProposalId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ── Seed ─────────────────────────────────────────────────────────────

/// Optional initial values for a freshly created proposal
#[derive(Clone, Debug, Default)]
pub struct ProposalSeed {
    pub status: Option<String>,
    pub category: Option<String>,
    pub due_date: Option<NaiveDate>,
    pub assignee: Option<String>,
    pub fields: HashMap<String, String>,
}

impl ProposalSeed {
    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_due_date(mut self, due: NaiveDate) -> Self {
        self.due_date = Some(due);
        self
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }
}

// ── Pending transition ───────────────────────────────────────────────

/// A transition held behind an approval gate
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PendingTransition {
    /// Where the proposal wants to go
    pub target_stage_id: StageId,
    /// Who requested the move; the re-invoked transition runs as this role
    pub requester_role: Role,
    /// When the hold was placed
    pub requested_at: DateTime<Utc>,
}

// ── Proposal State ───────────────────────────────────────────────────

/// The per-proposal record the engine reads and writes
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProposalState {
    /// Unique identifier
    pub id: ProposalId,
    /// The organization this proposal belongs to
    pub organization_id: OrganizationId,
    /// The pipeline version this proposal moves through
    pub pipeline_id: PipelineId,
    /// Current stage
    pub current_stage_id: StageId,
    /// Current status, from the pipeline's status vocabulary
    pub status: String,
    /// Category, used by category-scoped rules
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Reset on every stage entry; basis for time-in-stage triggers
    pub entered_stage_at: DateTime<Utc>,
    /// Completed checklist item IDs, per stage visited
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub checklist_progress: HashMap<StageId, HashSet<ChecklistItemId>>,
    /// True while an approval-gated exit is outstanding
    pub pending_approval: bool,
    /// The held transition, set together with `pending_approval`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_transition: Option<PendingTransition>,
    /// Set by an approver; consumed by the re-invoked transition
    pub approval_granted: bool,
    /// Time-in-stage rules already fired this stage visit; cleared on entry
    #[serde(default, skip_serializing_if = "HashSet::is_empty")]
    pub fired_time_rules: HashSet<RuleId>,
    /// Calendar day the due-date check last ran for this proposal
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_due_evaluated: Option<NaiveDate>,
    /// Due date, if set
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<NaiveDate>,
    /// Assigned user
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignee: Option<String>,
    /// Free-form named fields; the surface for set_field / on_field_change
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub fields: HashMap<String, String>,
    /// Comments appended by people and automation
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub comments: Vec<Comment>,
    /// Ordered record of every state change
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub activity: Vec<ActivityEntry>,
    /// When the proposal was created
    pub created_at: DateTime<Utc>,
    /// When the proposal was last updated
    pub updated_at: DateTime<Utc>,
}

impl ProposalState {
    /// Create a proposal state in the pipeline's initial stage
    pub fn new(
        organization_id: OrganizationId,
        pipeline_id: PipelineId,
        initial_stage: StageId,
        seed: ProposalSeed,
    ) -> Self {
        let now = Utc::now();
        let mut state = Self {
            id: ProposalId::generate(),
            organization_id,
            pipeline_id,
            current_stage_id: initial_stage,
            status: seed.status.unwrap_or_default(),
            category: seed.category,
            entered_stage_at: now,
            checklist_progress: HashMap::new(),
            pending_approval: false,
            pending_transition: None,
            approval_granted: false,
            fired_time_rules: HashSet::new(),
            last_due_evaluated: None,
            due_date: seed.due_date,
            assignee: seed.assignee,
            fields: seed.fields,
            comments: Vec::new(),
            activity: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        state.record_activity("proposal_created", "Proposal created", None);
        state
    }

    // ── Stage movement ───────────────────────────────────────────────

    /// Commit entry into a stage.
    ///
    /// Resets the stage timer, clears any approval hold and the
    /// per-visit fired markers. Only the gatekeeper and the action
    /// executor call this.
    pub fn enter_stage(&mut self, stage_id: StageId, now: DateTime<Utc>) {
        let from = self.current_stage_id.clone();
        self.current_stage_id = stage_id.clone();
        self.entered_stage_at = now;
        self.pending_approval = false;
        self.pending_transition = None;
        self.approval_granted = false;
        self.fired_time_rules.clear();
        self.updated_at = now;
        self.record_activity(
            "stage_entered",
            format!("Moved from '{}' to '{}'", from, stage_id),
            None,
        );
    }

    /// Hold a transition behind an approval gate.
    ///
    /// Any previously granted approval is invalidated; a grant belongs
    /// to exactly one held exit.
    pub fn hold_for_approval(&mut self, target: StageId, requester_role: Role) {
        let now = Utc::now();
        self.pending_approval = true;
        self.approval_granted = false;
        self.pending_transition = Some(PendingTransition {
            target_stage_id: target.clone(),
            requester_role,
            requested_at: now,
        });
        self.updated_at = now;
        self.record_activity(
            "approval_requested",
            format!("Exit to '{}' awaiting approval", target),
            None,
        );
    }

    /// Record an approver's sign-off; the held transition may now re-run
    pub fn grant_approval(&mut self, approver: &Role) {
        self.approval_granted = true;
        self.updated_at = Utc::now();
        self.record_activity(
            "exit_approved",
            format!("Exit approved by '{}'", approver),
            Some(approver.clone()),
        );
    }

    // ── Checklist ────────────────────────────────────────────────────

    /// Mark a checklist item complete for a stage visit.
    ///
    /// Returns false if the item was already complete.
    pub fn complete_checklist_item(&mut self, stage_id: &StageId, item_id: ChecklistItemId) -> bool {
        let inserted = self
            .checklist_progress
            .entry(stage_id.clone())
            .or_default()
            .insert(item_id.clone());
        if inserted {
            self.updated_at = Utc::now();
            self.record_activity(
                "checklist_item_completed",
                format!("Checklist item '{}' completed in '{}'", item_id, stage_id),
                None,
            );
        }
        inserted
    }

    /// Completed checklist item IDs for a stage (empty set if none)
    pub fn completed_items_for(&self, stage_id: &StageId) -> HashSet<ChecklistItemId> {
        self.checklist_progress
            .get(stage_id)
            .cloned()
            .unwrap_or_default()
    }

    // ── Field mutation ───────────────────────────────────────────────

    /// Set the status, returning the previous value
    pub fn set_status(&mut self, status: impl Into<String>) -> String {
        let status = status.into();
        let old = std::mem::replace(&mut self.status, status.clone());
        self.updated_at = Utc::now();
        self.record_activity(
            "status_changed",
            format!("Status '{}' -> '{}'", old, status),
            None,
        );
        old
    }

    /// Set a named field
    pub fn set_field(&mut self, field: impl Into<String>, value: impl Into<String>) {
        let field = field.into();
        self.fields.insert(field.clone(), value.into());
        self.updated_at = Utc::now();
        self.record_activity("field_changed", format!("Field '{}' changed", field), None);
    }

    /// Assign a user
    pub fn assign(&mut self, user: impl Into<String>) {
        let user = user.into();
        self.assignee = Some(user.clone());
        self.updated_at = Utc::now();
        self.record_activity("user_assigned", format!("Assigned to '{}'", user), None);
    }

    /// Append a comment
    pub fn add_comment(&mut self, author: impl Into<String>, text: impl Into<String>) {
        let now = Utc::now();
        self.comments.push(Comment {
            author: author.into(),
            text: text.into(),
            created_at: now,
        });
        self.updated_at = now;
        self.record_activity("comment_added", "Comment added", None);
    }

    // ── Scheduler markers ────────────────────────────────────────────

    /// Mark a time-in-stage rule as fired for the current stage visit
    pub fn mark_time_rule_fired(&mut self, rule_id: RuleId) {
        self.fired_time_rules.insert(rule_id);
    }

    /// Check whether a time-in-stage rule already fired this visit
    pub fn time_rule_fired(&self, rule_id: &RuleId) -> bool {
        self.fired_time_rules.contains(rule_id)
    }

    // ── Time queries ─────────────────────────────────────────────────

    /// Whole days spent in the current stage
    pub fn days_in_stage(&self, now: DateTime<Utc>) -> i64 {
        now.signed_duration_since(self.entered_stage_at).num_days()
    }

    /// Whole days until the due date, if one is set; negative = overdue
    pub fn days_until_due(&self, today: NaiveDate) -> Option<i64> {
        self.due_date
            .map(|due| due.signed_duration_since(today).num_days())
    }

    // ── Internal ─────────────────────────────────────────────────────

    fn record_activity(
        &mut self,
        event_type: impl Into<String>,
        description: impl Into<String>,
        actor: Option<Role>,
    ) {
        self.activity.push(ActivityEntry {
            sequence: self.activity.len() as u64,
            event_type: event_type.into(),
            description: description.into(),
            timestamp: Utc::now(),
            actor,
        });
    }
}

/// A comment on a proposal
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Comment {
    pub author: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

/// An entry in a proposal's activity chain
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ActivityEntry {
    /// Monotonically increasing sequence number
    pub sequence: u64,
    /// Type of event
    pub event_type: String,
    /// Human-readable description
    pub description: String,
    /// When the event occurred
    pub timestamp: DateTime<Utc>,
    /// Who caused this event (if applicable)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actor: Option<Role>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_proposal() -> ProposalState {
        ProposalState::new(
            OrganizationId::new("org-1"),
            PipelineId::new("pipe-1"),
            StageId::new("draft"),
            ProposalSeed::default().with_status("draft"),
        )
    }

    #[test]
    fn test_new_proposal() {
        let proposal = make_proposal();
        assert_eq!(proposal.current_stage_id, StageId::new("draft"));
        assert_eq!(proposal.status, "draft");
        assert!(!proposal.pending_approval);
        assert_eq!(proposal.activity.len(), 1);
    }

    #[test]
    fn test_enter_stage_resets_visit_state() {
        let mut proposal = make_proposal();
        proposal.mark_time_rule_fired(RuleId::new("rule-1"));
        proposal.hold_for_approval(StageId::new("review"), Role::new("editor"));
        assert!(proposal.pending_approval);

        let before = proposal.entered_stage_at;
        let later = Utc::now() + chrono::Duration::hours(1);
        proposal.enter_stage(StageId::new("review"), later);

        assert_eq!(proposal.current_stage_id, StageId::new("review"));
        assert!(proposal.entered_stage_at > before);
        assert!(!proposal.pending_approval);
        assert!(proposal.pending_transition.is_none());
        assert!(!proposal.time_rule_fired(&RuleId::new("rule-1")));
    }

    #[test]
    fn test_checklist_progress_per_stage() {
        let mut proposal = make_proposal();
        let stage = StageId::new("draft");

        assert!(proposal.complete_checklist_item(&stage, ChecklistItemId::new("a")));
        // Second completion of the same item is a no-op
        assert!(!proposal.complete_checklist_item(&stage, ChecklistItemId::new("a")));

        let done = proposal.completed_items_for(&stage);
        assert_eq!(done.len(), 1);
        assert!(proposal
            .completed_items_for(&StageId::new("review"))
            .is_empty());
    }

    #[test]
    fn test_checklist_progress_survives_stage_change() {
        let mut proposal = make_proposal();
        proposal.complete_checklist_item(&StageId::new("draft"), ChecklistItemId::new("a"));
        proposal.enter_stage(StageId::new("review"), Utc::now());

        // Per-visit markers reset but recorded completion stays
        assert_eq!(proposal.completed_items_for(&StageId::new("draft")).len(), 1);
    }

    #[test]
    fn test_approval_hold_and_grant() {
        let mut proposal = make_proposal();
        proposal.hold_for_approval(StageId::new("won"), Role::new("sales"));
        assert!(proposal.pending_approval);
        let pending = proposal.pending_transition.as_ref().unwrap();
        assert_eq!(pending.target_stage_id, StageId::new("won"));

        proposal.grant_approval(&Role::new("manager"));
        assert!(proposal.approval_granted);

        // Holding a different exit drops the earlier grant
        proposal.hold_for_approval(StageId::new("lost"), Role::new("sales"));
        assert!(!proposal.approval_granted);
        let pending = proposal.pending_transition.as_ref().unwrap();
        assert_eq!(pending.target_stage_id, StageId::new("lost"));
    }

    #[test]
    fn test_status_and_fields() {
        let mut proposal = make_proposal();
        let old = proposal.set_status("submitted");
        assert_eq!(old, "draft");
        assert_eq!(proposal.status, "submitted");

        proposal.set_field("owner", "casey");
        assert_eq!(proposal.fields.get("owner").unwrap(), "casey");

        proposal.assign("casey");
        assert_eq!(proposal.assignee.as_deref(), Some("casey"));

        proposal.add_comment("system", "looks good");
        assert_eq!(proposal.comments.len(), 1);
    }

    #[test]
    fn test_days_until_due() {
        let mut proposal = make_proposal();
        assert!(proposal.days_until_due(NaiveDate::from_ymd_opt(2026, 1, 1).unwrap()).is_none());

        proposal.due_date = NaiveDate::from_ymd_opt(2026, 1, 10);
        assert_eq!(
            proposal.days_until_due(NaiveDate::from_ymd_opt(2026, 1, 7).unwrap()),
            Some(3)
        );
        assert_eq!(
            proposal.days_until_due(NaiveDate::from_ymd_opt(2026, 1, 12).unwrap()),
            Some(-2)
        );
    }

    #[test]
    fn test_activity_sequence() {
        let mut proposal = make_proposal();
        proposal.set_status("submitted");
        proposal.assign("casey");
        proposal.enter_stage(StageId::new("review"), Utc::now());

        for (i, entry) in proposal.activity.iter().enumerate() {
            assert_eq!(entry.sequence, i as u64);
        }
        assert!(proposal.activity.len() >= 4);
    }

    #[test]
    fn test_proposal_id() {
        let id = ProposalId::generate();
        assert!(!id.0.is_empty());
        assert!(id.short().len() <= 8);
    }
}
