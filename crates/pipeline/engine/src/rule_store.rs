//! Rule store: the set of automation rules per organization
//!
//! Rules are validated on the way in. The active-rules query returns a
//! stable, deterministic order — ascending `execution_order`, ties
//! broken by creation sequence — which the matcher and executor preserve.

use pipeline_types::{AutomationRule, OrganizationId, PipelineError, PipelineResult, RuleId};
use std::collections::HashMap;

/// Stores automation rules and their fire counters
#[derive(Clone, Debug, Default)]
pub struct RuleStore {
    rules: HashMap<RuleId, AutomationRule>,
    /// Assigned to each created rule; never reused
    next_seq: u64,
}

impl RuleStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and store a new rule, assigning its creation sequence
    pub fn create(&mut self, mut rule: AutomationRule) -> PipelineResult<RuleId> {
        rule.validate()?;
        rule.created_seq = self.next_seq;
        self.next_seq += 1;

        let id = rule.id.clone();
        tracing::info!(rule_id = %id, rule = %rule.name, "Automation rule created");
        self.rules.insert(id.clone(), rule);
        Ok(id)
    }

    /// Replace a rule's definition, preserving its fire counter and
    /// creation sequence
    pub fn update(&mut self, rule: AutomationRule) -> PipelineResult<()> {
        rule.validate()?;
        let existing = self
            .rules
            .get_mut(&rule.id)
            .ok_or_else(|| PipelineError::RuleNotFound(rule.id.clone()))?;

        let fire_count = existing.fire_count;
        let created_seq = existing.created_seq;
        *existing = rule;
        existing.fire_count = fire_count;
        existing.created_seq = created_seq;
        Ok(())
    }

    /// Remove a rule
    pub fn delete(&mut self, id: &RuleId) -> PipelineResult<AutomationRule> {
        self.rules
            .remove(id)
            .ok_or_else(|| PipelineError::RuleNotFound(id.clone()))
    }

    /// Flip a rule's active flag, returning the new value
    pub fn toggle(&mut self, id: &RuleId) -> PipelineResult<bool> {
        let rule = self
            .rules
            .get_mut(id)
            .ok_or_else(|| PipelineError::RuleNotFound(id.clone()))?;
        rule.is_active = !rule.is_active;
        tracing::info!(rule_id = %id, active = rule.is_active, "Automation rule toggled");
        Ok(rule.is_active)
    }

    pub fn get(&self, id: &RuleId) -> PipelineResult<&AutomationRule> {
        self.rules
            .get(id)
            .ok_or_else(|| PipelineError::RuleNotFound(id.clone()))
    }

    /// Active rules for an organization in execution order.
    ///
    /// Sorted by ascending `execution_order`, then creation sequence —
    /// stable across calls, so test expectations are reproducible.
    pub fn active_for(&self, org: &OrganizationId) -> Vec<AutomationRule> {
        let mut rules: Vec<AutomationRule> = self
            .rules
            .values()
            .filter(|r| r.is_active && &r.organization_id == org)
            .cloned()
            .collect();
        rules.sort_by_key(|r| (r.execution_order, r.created_seq));
        rules
    }

    /// All rules for an organization, active or not
    pub fn list_for(&self, org: &OrganizationId) -> Vec<&AutomationRule> {
        self.rules
            .values()
            .filter(|r| &r.organization_id == org)
            .collect()
    }

    /// Increment a rule's fire counter by exactly one
    pub fn record_fire(&mut self, id: &RuleId) -> PipelineResult<u64> {
        let rule = self
            .rules
            .get_mut(id)
            .ok_or_else(|| PipelineError::RuleNotFound(id.clone()))?;
        rule.record_fire();
        Ok(rule.fire_count)
    }

    pub fn count(&self) -> usize {
        self.rules.len()
    }
}
