//! Domain events produced by the gatekeeper and the scheduler
//!
//! Every state change the rule engine can react to is modelled as one
//! of these variants. Events are immutable once emitted; the matcher
//! only reads them.

use crate::{ChecklistItemId, ProposalId, StageId};
use serde::{Deserialize, Serialize};

/// An event observed on a proposal
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PipelineEvent {
    /// A proposal was instantiated in its pipeline's initial stage.
    /// Emitted exactly once per proposal.
    ProposalCreated { proposal_id: ProposalId },

    /// A proposal moved between stages
    StageChanged {
        proposal_id: ProposalId,
        from_stage: StageId,
        to_stage: StageId,
    },

    /// A proposal's status field changed
    StatusChanged {
        proposal_id: ProposalId,
        from_status: String,
        to_status: String,
    },

    /// A named field on the proposal changed
    FieldChanged { proposal_id: ProposalId, field: String },

    /// A checklist item was completed during the current stage visit
    ChecklistItemCompleted {
        proposal_id: ProposalId,
        stage_id: StageId,
        item_id: ChecklistItemId,
        /// True when this completion closed the last required item of the stage
        all_required_complete: bool,
    },

    /// Scheduler: the proposal's due date is approaching.
    /// Emitted at most once per proposal per calendar day.
    DueDateApproaching {
        proposal_id: ProposalId,
        days_until_due: i64,
    },

    /// Scheduler: time spent in the current stage, in whole days
    TimeInStageElapsed {
        proposal_id: ProposalId,
        stage_id: StageId,
        days_in_stage: i64,
    },
}

impl PipelineEvent {
    /// The proposal this event concerns
    pub fn proposal_id(&self) -> &ProposalId {
        match self {
            Self::ProposalCreated { proposal_id }
            | Self::StageChanged { proposal_id, .. }
            | Self::StatusChanged { proposal_id, .. }
            | Self::FieldChanged { proposal_id, .. }
            | Self::ChecklistItemCompleted { proposal_id, .. }
            | Self::DueDateApproaching { proposal_id, .. }
            | Self::TimeInStageElapsed { proposal_id, .. } => proposal_id,
        }
    }

    /// A short discriminant name, used for logging
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ProposalCreated { .. } => "proposal_created",
            Self::StageChanged { .. } => "stage_changed",
            Self::StatusChanged { .. } => "status_changed",
            Self::FieldChanged { .. } => "field_changed",
            Self::ChecklistItemCompleted { .. } => "checklist_item_completed",
            Self::DueDateApproaching { .. } => "due_date_approaching",
            Self::TimeInStageElapsed { .. } => "time_in_stage_elapsed",
        }
    }
}

impl std::fmt::Display for PipelineEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({})", self.kind(), self.proposal_id())
    }
}
