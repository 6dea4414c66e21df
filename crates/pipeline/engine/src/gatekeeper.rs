//! Transition gatekeeper: permission, capacity, and approval checks
//!
//! The gatekeeper is a pure evaluation function — it inspects the
//! proposal, the pipeline configuration, and the target stage's
//! occupancy, and returns a decision. It never mutates anything; the
//! engine commits (or doesn't) based on the decision, under the locks
//! it already holds.

use pipeline_types::{
    CapacityWarning, DenialReason, Pipeline, ProposalState, Role, StageId, WipLimitKind,
};

/// Who is asking for the transition
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Actor {
    /// A person acting under an organization role
    User(Role),
    /// The action executor. Bypasses role, checklist, and approval
    /// gates, but never terminality or hard WIP limits.
    System,
}

impl Actor {
    pub fn is_system(&self) -> bool {
        matches!(self, Self::System)
    }
}

/// The gatekeeper's verdict on a proposed transition
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GateDecision {
    /// All checks passed; commit. A soft WIP limit at capacity attaches
    /// a warning without blocking.
    Proceed { warning: Option<CapacityWarning> },
    /// The current stage requires approval to exit and none is recorded
    HoldForApproval,
    /// A check failed; nothing may be mutated
    Deny(DenialReason),
}

/// Validates proposed stage transitions against the pipeline's gating rules
#[derive(Clone, Debug, Default)]
pub struct TransitionGatekeeper;

impl TransitionGatekeeper {
    pub fn new() -> Self {
        Self
    }

    /// Evaluate a proposed transition. Checks run in a fixed order and
    /// short-circuit on the first failure:
    ///
    /// 1. target exists and differs from the current stage
    /// 2. current stage is not terminal
    /// 3. requester may exit the current stage
    /// 4. requester may enter the target stage
    /// 5. the current stage's checklist gate, if configured
    /// 6. the current stage's approval gate
    /// 7. the target stage's WIP limit
    ///
    /// `target_occupancy` must be read under the occupancy ledger's
    /// lock, and the commit must happen inside the same critical
    /// section.
    pub fn evaluate(
        &self,
        proposal: &ProposalState,
        pipeline: &Pipeline,
        target_stage_id: &StageId,
        actor: &Actor,
        target_occupancy: u32,
    ) -> GateDecision {
        let target = match pipeline.get_stage(target_stage_id) {
            Some(stage) => stage,
            None => {
                return GateDecision::Deny(DenialReason::InvalidStageReference {
                    stage_id: target_stage_id.clone(),
                })
            }
        };
        if target_stage_id == &proposal.current_stage_id {
            return GateDecision::Deny(DenialReason::AlreadyInStage {
                stage_id: target_stage_id.clone(),
            });
        }

        let current = match pipeline.get_stage(&proposal.current_stage_id) {
            Some(stage) => stage,
            None => {
                // Misconfigured proposal state; treat as a bad reference
                return GateDecision::Deny(DenialReason::InvalidStageReference {
                    stage_id: proposal.current_stage_id.clone(),
                });
            }
        };

        if current.is_terminal {
            return GateDecision::Deny(DenialReason::TerminalStateViolation {
                stage_id: current.id.clone(),
            });
        }

        if let Actor::User(role) = actor {
            if !current.allows_exit(role) {
                return GateDecision::Deny(DenialReason::PermissionDenied {
                    role: role.clone(),
                    stage_id: current.id.clone(),
                });
            }
            if !target.allows_entry(role) {
                return GateDecision::Deny(DenialReason::PermissionDenied {
                    role: role.clone(),
                    stage_id: target.id.clone(),
                });
            }

            if current.require_checklist_to_exit
                && !current.checklist_complete(&proposal.completed_items_for(&current.id))
            {
                return GateDecision::Deny(DenialReason::ChecklistIncomplete {
                    stage_id: current.id.clone(),
                });
            }

            // A grant is only valid for the exit it was recorded against
            let approved_for_target = proposal.approval_granted
                && proposal
                    .pending_transition
                    .as_ref()
                    .map_or(false, |p| &p.target_stage_id == target_stage_id);
            if current.requires_approval_to_exit && !approved_for_target {
                return GateDecision::HoldForApproval;
            }
        }

        if target.has_wip_limit() && target_occupancy >= target.wip_limit {
            match target.wip_limit_kind {
                WipLimitKind::Hard => {
                    return GateDecision::Deny(DenialReason::CapacityExceeded {
                        stage_id: target.id.clone(),
                        limit: target.wip_limit,
                        occupancy: target_occupancy,
                    })
                }
                WipLimitKind::Soft => {
                    return GateDecision::Proceed {
                        warning: Some(CapacityWarning {
                            stage_id: target.id.clone(),
                            limit: target.wip_limit,
                            occupancy: target_occupancy,
                        }),
                    }
                }
            }
        }

        GateDecision::Proceed { warning: None }
    }
}
