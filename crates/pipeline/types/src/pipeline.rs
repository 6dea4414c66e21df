//! Pipelines: the ordered stage set of an organization
//!
//! A Pipeline is an immutable value object. It is validated as a whole
//! before the registry will accept it; to change a pipeline, build a
//! new one and re-register it as the next version. Partially edited
//! pipelines are therefore never observable by the engine.

use crate::{PipelineError, PipelineResult, Stage, StageId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

// ── Identifiers ──────────────────────────────────────────────────────

/// Unique identifier for a pipeline
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PipelineId(pub String);

impl PipelineId {
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

impl std::fmt::Display for PipelineId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for an organization
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrganizationId(pub String);

impl OrganizationId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for OrganizationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ── Pipeline ─────────────────────────────────────────────────────────

/// An organization's pipeline — the ordered set of stages with gating metadata
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Pipeline {
    /// Unique identifier
    pub id: PipelineId,
    /// The organization this pipeline belongs to
    pub organization_id: OrganizationId,
    /// Human-readable name
    pub name: String,
    /// Version, bumped each time the organization re-registers
    pub version: u32,
    /// The stages, in configuration order
    pub stages: Vec<Stage>,
    /// Status vocabulary valid for proposals in this pipeline
    pub statuses: Vec<String>,
    /// When this pipeline version was created
    pub created_at: DateTime<Utc>,
    /// Metadata
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
}

impl Pipeline {
    /// Create a new empty pipeline
    pub fn new(name: impl Into<String>, organization_id: OrganizationId) -> Self {
        Self {
            id: PipelineId::generate(),
            organization_id,
            name: name.into(),
            version: 1,
            stages: Vec::new(),
            statuses: Vec::new(),
            created_at: Utc::now(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_stage(mut self, stage: Stage) -> Self {
        self.stages.push(stage);
        self
    }

    pub fn with_statuses(mut self, statuses: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.statuses = statuses.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Get a stage by ID
    pub fn get_stage(&self, id: &StageId) -> Option<&Stage> {
        self.stages.iter().find(|s| &s.id == id)
    }

    /// Get a stage by order position
    pub fn stage_at_order(&self, order: u32) -> Option<&Stage> {
        self.stages.iter().find(|s| s.order == order)
    }

    /// The initial stage: lowest order
    pub fn initial_stage(&self) -> Option<&Stage> {
        self.stages.iter().min_by_key(|s| s.order)
    }

    /// Check whether a status string is valid in this pipeline
    pub fn has_status(&self, status: &str) -> bool {
        self.statuses.iter().any(|s| s == status)
    }

    /// Total number of stages
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// Validate the pipeline for structural correctness.
    ///
    /// Enforced: at least one stage, unique stage IDs, unique and
    /// contiguous `order` values starting at zero, and a non-terminal
    /// initial stage.
    pub fn validate(&self) -> PipelineResult<()> {
        if self.stages.is_empty() {
            return Err(PipelineError::ValidationError(
                "Pipeline must have at least one stage".into(),
            ));
        }

        let mut seen_ids = HashSet::new();
        for stage in &self.stages {
            if !seen_ids.insert(&stage.id) {
                return Err(PipelineError::ValidationError(format!(
                    "Duplicate stage ID '{}'",
                    stage.id
                )));
            }
        }

        // Orders must be exactly 0..n with no gaps or repeats
        let mut orders: Vec<u32> = self.stages.iter().map(|s| s.order).collect();
        orders.sort_unstable();
        for (expected, actual) in orders.iter().enumerate() {
            if *actual != expected as u32 {
                return Err(PipelineError::ValidationError(format!(
                    "Stage orders must be unique and contiguous from 0; found order {}",
                    actual
                )));
            }
        }

        let initial = self
            .initial_stage()
            .ok_or_else(|| PipelineError::ValidationError("No initial stage".into()))?;
        if initial.is_terminal {
            return Err(PipelineError::ValidationError(format!(
                "Initial stage '{}' must not be terminal",
                initial.id
            )));
        }

        for stage in &self.stages {
            if stage.requires_approval_to_exit && stage.approver_roles.is_empty() {
                return Err(PipelineError::ValidationError(format!(
                    "Stage '{}' requires approval to exit but has no approver roles",
                    stage.id
                )));
            }
        }

        Ok(())
    }

    /// Produce the next version of this pipeline with a replacement stage set.
    ///
    /// The result must be validated before use; this never mutates `self`.
    pub fn next_version(&self, stages: Vec<Stage>) -> Self {
        let mut next = self.clone();
        next.version += 1;
        next.stages = stages;
        next.created_at = Utc::now();
        next
    }
}
