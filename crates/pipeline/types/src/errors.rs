//! Error types for the pipeline layer
//!
//! These cover lookup and validation failures only. A gated transition
//! being refused is a `TransitionResult::Denied` value, not an error.

use crate::{OrganizationId, PipelineId, ProposalId, RuleId, StageId};

/// Errors that can occur in pipeline operations
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Pipeline not found: {0}")]
    PipelineNotFound(PipelineId),

    #[error("No pipeline registered for organization: {0}")]
    NoPipelineForOrganization(OrganizationId),

    #[error("Proposal not found: {0}")]
    ProposalNotFound(ProposalId),

    #[error("Automation rule not found: {0}")]
    RuleNotFound(RuleId),

    #[error("Stage not found: {0}")]
    StageNotFound(StageId),

    #[error("Checklist item not found: {0}")]
    ChecklistItemNotFound(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Unknown status '{0}' for this pipeline")]
    UnknownStatus(String),

    #[error("No pending approval for proposal: {0}")]
    NoPendingApproval(ProposalId),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

/// Result type alias for pipeline operations
pub type PipelineResult<T> = Result<T, PipelineError>;
