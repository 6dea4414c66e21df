//! Automation rules: trigger + ordered actions
//!
//! Triggers and actions are tagged unions with fixed field sets, so a
//! rule is structurally checked at save time rather than when it fires.
//! The open-ended key/value configuration of earlier systems does not
//! survive here on purpose.

use crate::{OrganizationId, ProposalState, StageId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

// ── Identifier ───────────────────────────────────────────────────────

/// Unique identifier for an automation rule
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RuleId(pub String);

impl RuleId {
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

impl std::fmt::Display for RuleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ── Automation Rule ──────────────────────────────────────────────────

/// A user-defined automation rule
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AutomationRule {
    /// Unique identifier
    pub id: RuleId,
    /// The organization this rule belongs to
    pub organization_id: OrganizationId,
    /// Human-readable name
    pub name: String,
    /// Description of what this rule automates
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    /// Inactive rules never match
    pub is_active: bool,
    /// The event pattern that fires this rule
    pub trigger: Trigger,
    /// Executed in declared order when the trigger matches
    pub actions: Vec<Action>,
    /// Which proposals this rule applies to
    pub applies_to: RuleScope,
    /// Tie-break ordering across rules matching the same event
    pub execution_order: u32,
    /// How many events this rule has fired for; monotone
    pub fire_count: u64,
    /// Creation sequence assigned by the store; breaks execution_order ties
    pub created_seq: u64,
    /// When this rule was created
    pub created_at: DateTime<Utc>,
}

impl AutomationRule {
    /// Create a new active rule with no actions yet
    pub fn new(
        name: impl Into<String>,
        organization_id: OrganizationId,
        trigger: Trigger,
    ) -> Self {
        Self {
            id: RuleId::generate(),
            organization_id,
            name: name.into(),
            description: String::new(),
            is_active: true,
            trigger,
            actions: Vec::new(),
            applies_to: RuleScope::All,
            execution_order: 0,
            fire_count: 0,
            created_seq: 0,
            created_at: Utc::now(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_action(mut self, action: Action) -> Self {
        self.actions.push(action);
        self
    }

    pub fn with_scope(mut self, scope: RuleScope) -> Self {
        self.applies_to = scope;
        self
    }

    pub fn with_execution_order(mut self, order: u32) -> Self {
        self.execution_order = order;
        self
    }

    pub fn inactive(mut self) -> Self {
        self.is_active = false;
        self
    }

    /// Record one fire. Called once per matched event, never per action.
    pub fn record_fire(&mut self) {
        self.fire_count += 1;
    }

    /// Validate the rule for persistence.
    ///
    /// A persisted rule must have at least one action, and every
    /// action's configuration must be structurally complete.
    pub fn validate(&self) -> crate::PipelineResult<()> {
        if self.actions.is_empty() {
            return Err(crate::PipelineError::ValidationError(
                "Rule must have at least one action".into(),
            ));
        }
        self.trigger.validate()?;
        for action in &self.actions {
            action.validate()?;
        }
        Ok(())
    }
}

// ── Trigger ──────────────────────────────────────────────────────────

/// The event pattern portion of an automation rule
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Trigger {
    /// Fires on status changes; absent from/to match any value
    OnStatusChange {
        #[serde(skip_serializing_if = "Option::is_none")]
        from_status: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        to_status: Option<String>,
    },

    /// Fires on any stage-to-stage move
    OnColumnMove,

    /// Fires when the due date is exactly `days_before` days away
    OnDueDateApproaching { days_before: i64 },

    /// Fires when any checklist item is completed
    OnTaskCompletion,

    /// Fires when the last required checklist item of a stage is completed
    OnAllSubtasksComplete,

    /// Fires when the named field changes
    OnFieldChange { field: String },

    /// Fires once per stage visit when time in stage reaches the threshold
    OnTimeInStage { days_in_stage: i64 },

    /// Fires exactly once, at proposal instantiation
    OnCreation,
}

impl Trigger {
    /// Status-change trigger; `None` from/to act as wildcards
    pub fn status_change(from: Option<&str>, to: Option<&str>) -> Self {
        Self::OnStatusChange {
            from_status: from.map(String::from),
            to_status: to.map(String::from),
        }
    }

    pub fn field_change(field: impl Into<String>) -> Self {
        Self::OnFieldChange {
            field: field.into(),
        }
    }

    fn validate(&self) -> crate::PipelineResult<()> {
        match self {
            Self::OnDueDateApproaching { days_before } if *days_before < 0 => {
                Err(crate::PipelineError::ValidationError(
                    "days_before must be non-negative".into(),
                ))
            }
            Self::OnTimeInStage { days_in_stage } if *days_in_stage < 1 => {
                Err(crate::PipelineError::ValidationError(
                    "days_in_stage must be at least 1".into(),
                ))
            }
            Self::OnFieldChange { field } if field.is_empty() => Err(
                crate::PipelineError::ValidationError("field name must not be empty".into()),
            ),
            _ => Ok(()),
        }
    }
}

// ── Action ───────────────────────────────────────────────────────────

/// One effect executed when a rule's trigger matches
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    /// Move the proposal to another stage, as the system actor
    MoveStage { target_stage_id: StageId },

    /// Set the proposal's status; fails if unknown to the pipeline
    ChangeStatus { status: String },

    /// Send a message through the notifier sink
    Notify { recipient: String, message: String },

    /// Set the proposal's assignee
    AssignUser { user: String },

    /// Set a named field on the proposal
    SetField { field: String, value: String },

    /// Create a calendar event `days_ahead` days from execution
    CreateCalendarEvent { title: String, days_ahead: i64 },

    /// Append a comment to the proposal
    AddComment { text: String },
}

impl Action {
    /// A short label for reports and logging
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MoveStage { .. } => "move_stage",
            Self::ChangeStatus { .. } => "change_status",
            Self::Notify { .. } => "notify",
            Self::AssignUser { .. } => "assign_user",
            Self::SetField { .. } => "set_field",
            Self::CreateCalendarEvent { .. } => "create_calendar_event",
            Self::AddComment { .. } => "add_comment",
        }
    }

    fn validate(&self) -> crate::PipelineResult<()> {
        let complain = |msg: &str| Err(crate::PipelineError::ValidationError(msg.into()));
        match self {
            Self::MoveStage { target_stage_id } if target_stage_id.0.is_empty() => {
                complain("move_stage requires a target stage")
            }
            Self::ChangeStatus { status } if status.is_empty() => {
                complain("change_status requires a status")
            }
            Self::Notify { recipient, .. } if recipient.is_empty() => {
                complain("notify requires a recipient")
            }
            Self::AssignUser { user } if user.is_empty() => complain("assign_user requires a user"),
            Self::SetField { field, .. } if field.is_empty() => {
                complain("set_field requires a field name")
            }
            Self::CreateCalendarEvent { title, .. } if title.is_empty() => {
                complain("create_calendar_event requires a title")
            }
            Self::AddComment { text } if text.is_empty() => complain("add_comment requires text"),
            _ => Ok(()),
        }
    }
}

// ── Scope ────────────────────────────────────────────────────────────

/// Which proposals a rule applies to
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "scope", rename_all = "snake_case")]
pub enum RuleScope {
    /// Every proposal in the organization
    All,
    /// Only proposals currently in one of these stages
    SpecificStages { stage_ids: HashSet<StageId> },
    /// Only proposals carrying one of these categories
    SpecificCategories { categories: HashSet<String> },
}

impl RuleScope {
    pub fn stages(ids: impl IntoIterator<Item = StageId>) -> Self {
        Self::SpecificStages {
            stage_ids: ids.into_iter().collect(),
        }
    }

    pub fn categories(categories: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self::SpecificCategories {
            categories: categories.into_iter().map(Into::into).collect(),
        }
    }

    /// Check whether a proposal falls inside this scope
    pub fn includes(&self, proposal: &ProposalState) -> bool {
        match self {
            Self::All => true,
            Self::SpecificStages { stage_ids } => stage_ids.contains(&proposal.current_stage_id),
            Self::SpecificCategories { categories } => proposal
                .category
                .as_ref()
                .map(|c| categories.contains(c))
                .unwrap_or(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Pipeline, ProposalSeed, Stage};

    fn make_proposal_in(stage: &str) -> ProposalState {
        let pipeline = Pipeline::new("P", OrganizationId::new("org-1"))
            .with_stage(Stage::new("draft", "Draft", 0))
            .with_stage(Stage::new("review", "Review", 1));
        let mut proposal = ProposalState::new(
            OrganizationId::new("org-1"),
            pipeline.id.clone(),
            StageId::new("draft"),
            ProposalSeed::default(),
        );
        if stage != "draft" {
            proposal.enter_stage(StageId::new(stage), Utc::now());
        }
        proposal
    }

    #[test]
    fn test_rule_validation_requires_actions() {
        let rule = AutomationRule::new("No actions", OrganizationId::new("org-1"), Trigger::OnCreation);
        assert!(rule.validate().is_err());

        let rule = rule.with_action(Action::AddComment {
            text: "created".into(),
        });
        assert!(rule.validate().is_ok());
    }

    #[test]
    fn test_action_config_validation() {
        let bad = AutomationRule::new("Bad", OrganizationId::new("org-1"), Trigger::OnColumnMove)
            .with_action(Action::SetField {
                field: String::new(),
                value: "x".into(),
            });
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_trigger_validation() {
        let bad = AutomationRule::new(
            "Bad timing",
            OrganizationId::new("org-1"),
            Trigger::OnTimeInStage { days_in_stage: 0 },
        )
        .with_action(Action::Notify {
            recipient: "owner".into(),
            message: "stale".into(),
        });
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_fire_count_monotone() {
        let mut rule =
            AutomationRule::new("Counter", OrganizationId::new("org-1"), Trigger::OnColumnMove);
        assert_eq!(rule.fire_count, 0);
        rule.record_fire();
        rule.record_fire();
        assert_eq!(rule.fire_count, 2);
    }

    #[test]
    fn test_scope_all() {
        let proposal = make_proposal_in("draft");
        assert!(RuleScope::All.includes(&proposal));
    }

    #[test]
    fn test_scope_stages() {
        let proposal = make_proposal_in("review");
        let scope = RuleScope::stages([StageId::new("review")]);
        assert!(scope.includes(&proposal));

        let scope = RuleScope::stages([StageId::new("draft")]);
        assert!(!scope.includes(&proposal));
    }

    #[test]
    fn test_scope_categories() {
        let mut proposal = make_proposal_in("draft");
        let scope = RuleScope::categories(["rfp"]);
        // No category set
        assert!(!scope.includes(&proposal));

        proposal.category = Some("rfp".into());
        assert!(scope.includes(&proposal));
    }

    #[test]
    fn test_trigger_serde_tagging() {
        let trigger = Trigger::status_change(Some("draft"), Some("submitted"));
        let json = serde_json::to_string(&trigger).unwrap();
        assert!(json.contains("\"type\":\"on_status_change\""));

        let back: Trigger = serde_json::from_str(&json).unwrap();
        assert_eq!(back, trigger);
    }

    #[test]
    fn test_status_change_wildcards() {
        let trigger = Trigger::status_change(None, Some("submitted"));
        match trigger {
            Trigger::OnStatusChange {
                from_status,
                to_status,
            } => {
                assert!(from_status.is_none());
                assert_eq!(to_status.as_deref(), Some("submitted"));
            }
            _ => panic!("Expected status change trigger"),
        }
    }
}
