//! Outcome types: transition results and execution reports
//!
//! Denials and warnings are defined outcomes, not errors — the caller
//! always gets a value describing what happened and why.

use crate::{ProposalId, Role, RuleId, StageId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ── Transition result ────────────────────────────────────────────────

/// The outcome of a transition request
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum TransitionResult {
    /// The transition committed
    Allowed,
    /// The transition committed against a full soft-limited stage
    AllowedWithWarning { warning: CapacityWarning },
    /// The exit is held until an approver signs off; not an error
    AwaitingApproval,
    /// The transition was refused; nothing mutated
    Denied { reason: DenialReason },
}

impl TransitionResult {
    /// True for both `Allowed` and `AllowedWithWarning`
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed | Self::AllowedWithWarning { .. })
    }

    pub fn is_denied(&self) -> bool {
        matches!(self, Self::Denied { .. })
    }
}

/// Why a transition was refused
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum DenialReason {
    /// The requester's role is not permitted to make this move
    PermissionDenied { role: Role, stage_id: StageId },
    /// The current stage is terminal; nothing leaves it
    TerminalStateViolation { stage_id: StageId },
    /// The target stage is at its hard WIP limit
    CapacityExceeded {
        stage_id: StageId,
        limit: u32,
        occupancy: u32,
    },
    /// The target stage does not exist in the proposal's pipeline
    InvalidStageReference { stage_id: StageId },
    /// The proposal is already in the requested stage
    AlreadyInStage { stage_id: StageId },
    /// Required checklist items of the current stage are incomplete
    ChecklistIncomplete { stage_id: StageId },
}

impl std::fmt::Display for DenialReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PermissionDenied { role, stage_id } => {
                write!(f, "role '{}' not permitted at stage '{}'", role, stage_id)
            }
            Self::TerminalStateViolation { stage_id } => {
                write!(f, "stage '{}' is terminal", stage_id)
            }
            Self::CapacityExceeded {
                stage_id,
                limit,
                occupancy,
            } => write!(
                f,
                "stage '{}' at capacity ({}/{})",
                stage_id, occupancy, limit
            ),
            Self::InvalidStageReference { stage_id } => {
                write!(f, "stage '{}' not in pipeline", stage_id)
            }
            Self::AlreadyInStage { stage_id } => {
                write!(f, "proposal already in stage '{}'", stage_id)
            }
            Self::ChecklistIncomplete { stage_id } => {
                write!(f, "checklist incomplete for stage '{}'", stage_id)
            }
        }
    }
}

/// A soft WIP limit was at or over capacity when the transition committed
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapacityWarning {
    pub stage_id: StageId,
    pub limit: u32,
    pub occupancy: u32,
}

// ── Execution report ─────────────────────────────────────────────────

/// Per-action outcome within a rule execution
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ActionOutcome {
    /// The action applied its effect
    Succeeded,
    /// The action failed; siblings still run
    Failed { reason: String },
    /// The action hit a constraint automation must not override
    Skipped { reason: String },
}

impl ActionOutcome {
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed {
            reason: reason.into(),
        }
    }

    pub fn skipped(reason: impl Into<String>) -> Self {
        Self::Skipped {
            reason: reason.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded)
    }
}

/// One action's slot in an execution report
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ActionReport {
    /// Position in the rule's action list
    pub index: usize,
    /// The action kind label
    pub action: String,
    pub outcome: ActionOutcome,
}

/// The record of one rule firing against one event
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub rule_id: RuleId,
    pub rule_name: String,
    pub proposal_id: ProposalId,
    /// The event kind that matched
    pub event_kind: String,
    /// Per-action outcomes, in declared order
    pub outcomes: Vec<ActionReport>,
    pub fired_at: DateTime<Utc>,
}

impl ExecutionReport {
    pub fn succeeded_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.outcome.is_success())
            .count()
    }

    pub fn failed_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.outcome, ActionOutcome::Failed { .. }))
            .count()
    }
}

/// Diagnostics the engine surfaces outside the error channel
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "diagnostic", rename_all = "snake_case")]
pub enum EngineDiagnostic {
    /// The cascade recursion bound tripped; propagation was aborted
    RuleLoopDetected {
        proposal_id: ProposalId,
        depth: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transition_result_predicates() {
        assert!(TransitionResult::Allowed.is_allowed());
        assert!(TransitionResult::AllowedWithWarning {
            warning: CapacityWarning {
                stage_id: StageId::new("review"),
                limit: 2,
                occupancy: 2,
            },
        }
        .is_allowed());
        assert!(!TransitionResult::AwaitingApproval.is_allowed());

        let denied = TransitionResult::Denied {
            reason: DenialReason::TerminalStateViolation {
                stage_id: StageId::new("archive"),
            },
        };
        assert!(denied.is_denied());
    }

    #[test]
    fn test_denial_reason_display() {
        let reason = DenialReason::CapacityExceeded {
            stage_id: StageId::new("review"),
            limit: 2,
            occupancy: 2,
        };
        assert_eq!(format!("{}", reason), "stage 'review' at capacity (2/2)");
    }

    #[test]
    fn test_report_counts() {
        let report = ExecutionReport {
            rule_id: RuleId::new("r-1"),
            rule_name: "Notify owner".into(),
            proposal_id: ProposalId::new("p-1"),
            event_kind: "stage_changed".into(),
            outcomes: vec![
                ActionReport {
                    index: 0,
                    action: "notify".into(),
                    outcome: ActionOutcome::Succeeded,
                },
                ActionReport {
                    index: 1,
                    action: "move_stage".into(),
                    outcome: ActionOutcome::skipped("terminal stage"),
                },
                ActionReport {
                    index: 2,
                    action: "set_field".into(),
                    outcome: ActionOutcome::failed("missing field"),
                },
            ],
            fired_at: Utc::now(),
        };
        assert_eq!(report.succeeded_count(), 1);
        assert_eq!(report.failed_count(), 1);
    }
}
