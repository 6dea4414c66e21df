//! Pipeline registry: stores validated pipeline versions per organization
//!
//! Pipelines are immutable once registered. Re-registering for the same
//! organization appends a new version; the latest registration is the
//! one new proposals are created against.

use pipeline_types::{OrganizationId, Pipeline, PipelineError, PipelineId, PipelineResult};
use std::collections::HashMap;

/// Registry of validated pipelines
#[derive(Clone, Debug, Default)]
pub struct PipelineRegistry {
    /// All registered pipeline versions, keyed by ID
    pipelines: HashMap<PipelineId, Pipeline>,
    /// Registration order per organization; the last entry is current
    by_org: HashMap<OrganizationId, Vec<PipelineId>>,
}

impl PipelineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a pipeline after validating it.
    ///
    /// Violating configurations are rejected here, at save time — the
    /// engine never sees a structurally invalid pipeline.
    pub fn register(&mut self, pipeline: Pipeline) -> PipelineResult<PipelineId> {
        pipeline.validate()?;

        let id = pipeline.id.clone();
        let org = pipeline.organization_id.clone();

        self.pipelines.insert(id.clone(), pipeline);
        self.by_org.entry(org).or_default().push(id.clone());

        tracing::info!(pipeline_id = %id, "Pipeline registered");
        Ok(id)
    }

    /// Get a pipeline version by ID
    pub fn get(&self, id: &PipelineId) -> PipelineResult<&Pipeline> {
        self.pipelines
            .get(id)
            .ok_or_else(|| PipelineError::PipelineNotFound(id.clone()))
    }

    /// The organization's current pipeline (latest registration)
    pub fn current_for(&self, org: &OrganizationId) -> PipelineResult<&Pipeline> {
        self.by_org
            .get(org)
            .and_then(|ids| ids.last())
            .and_then(|id| self.pipelines.get(id))
            .ok_or_else(|| PipelineError::NoPipelineForOrganization(org.clone()))
    }

    /// All versions registered for an organization, oldest first
    pub fn versions_for(&self, org: &OrganizationId) -> Vec<&Pipeline> {
        self.by_org
            .get(org)
            .map(|ids| ids.iter().filter_map(|id| self.pipelines.get(id)).collect())
            .unwrap_or_default()
    }

    pub fn contains(&self, id: &PipelineId) -> bool {
        self.pipelines.contains_key(id)
    }

    pub fn count(&self) -> usize {
        self.pipelines.len()
    }
}
