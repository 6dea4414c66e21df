//! Stages: the named positions of an organization's pipeline
//!
//! A Stage is pure configuration data. Everything that gates movement
//! in and out of it — roles, WIP limits, approval, checklist — lives
//! here, and the gatekeeper reads it without ever mutating it.

use crate::ChecklistItem;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

// ── Identifiers ──────────────────────────────────────────────────────

/// Unique identifier for a stage within a pipeline
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StageId(pub String);

impl StageId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for StageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A role name as configured by the organization
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Role(pub String);

impl Role {
    pub fn new(role: impl Into<String>) -> Self {
        Self(role.into())
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ── Stage ────────────────────────────────────────────────────────────

/// A stage in an organization's pipeline
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Stage {
    /// Unique within the owning pipeline
    pub id: StageId,
    /// Human-readable label shown on the board
    pub label: String,
    /// Traversal/display order; unique and contiguous within a pipeline
    pub order: u32,
    /// What kind of stage this is
    pub kind: StageKind,
    /// Label and position are immutable for end users
    pub is_locked: bool,
    /// No rule or manual action may move a proposal out of a terminal stage
    pub is_terminal: bool,
    /// Maximum concurrent occupants; 0 = unlimited
    pub wip_limit: u32,
    /// Whether the WIP limit warns or blocks
    pub wip_limit_kind: WipLimitKind,
    /// Roles permitted to move a proposal into this stage; empty = unrestricted
    #[serde(default, skip_serializing_if = "HashSet::is_empty")]
    pub entry_roles: HashSet<Role>,
    /// Roles permitted to move a proposal out; empty = unrestricted
    #[serde(default, skip_serializing_if = "HashSet::is_empty")]
    pub exit_roles: HashSet<Role>,
    /// Exits from this stage are held until an approver signs off
    pub requires_approval_to_exit: bool,
    /// Roles that may approve a held exit
    #[serde(default, skip_serializing_if = "HashSet::is_empty")]
    pub approver_roles: HashSet<Role>,
    /// Ordered completion items tracked per proposal-stage visit
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub checklist: Vec<ChecklistItem>,
    /// Required checklist items must be complete before exiting
    pub require_checklist_to_exit: bool,
    /// Metadata
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
}

impl Stage {
    /// Create a new custom stage with no gating configured
    pub fn new(id: impl Into<String>, label: impl Into<String>, order: u32) -> Self {
        Self {
            id: StageId::new(id),
            label: label.into(),
            order,
            kind: StageKind::CustomStage,
            is_locked: false,
            is_terminal: false,
            wip_limit: 0,
            wip_limit_kind: WipLimitKind::Soft,
            entry_roles: HashSet::new(),
            exit_roles: HashSet::new(),
            requires_approval_to_exit: false,
            approver_roles: HashSet::new(),
            checklist: Vec::new(),
            require_checklist_to_exit: false,
            metadata: HashMap::new(),
        }
    }

    /// Create a locked phase (label and position fixed by the organization)
    pub fn locked_phase(id: impl Into<String>, label: impl Into<String>, order: u32) -> Self {
        let mut stage = Self::new(id, label, order);
        stage.kind = StageKind::LockedPhase;
        stage.is_locked = true;
        stage
    }

    /// Create a default status stage
    pub fn default_status(id: impl Into<String>, label: impl Into<String>, order: u32) -> Self {
        let mut stage = Self::new(id, label, order);
        stage.kind = StageKind::DefaultStatus;
        stage
    }

    pub fn terminal(mut self) -> Self {
        self.is_terminal = true;
        self
    }

    pub fn with_wip_limit(mut self, limit: u32, kind: WipLimitKind) -> Self {
        self.wip_limit = limit;
        self.wip_limit_kind = kind;
        self
    }

    pub fn with_entry_roles(mut self, roles: impl IntoIterator<Item = Role>) -> Self {
        self.entry_roles = roles.into_iter().collect();
        self
    }

    pub fn with_exit_roles(mut self, roles: impl IntoIterator<Item = Role>) -> Self {
        self.exit_roles = roles.into_iter().collect();
        self
    }

    pub fn with_approval(mut self, approvers: impl IntoIterator<Item = Role>) -> Self {
        self.requires_approval_to_exit = true;
        self.approver_roles = approvers.into_iter().collect();
        self
    }

    pub fn with_checklist(mut self, items: Vec<ChecklistItem>) -> Self {
        self.checklist = items;
        self
    }

    pub fn checklist_gates_exit(mut self) -> Self {
        self.require_checklist_to_exit = true;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Check whether a role may move a proposal into this stage
    pub fn allows_entry(&self, role: &Role) -> bool {
        self.entry_roles.is_empty() || self.entry_roles.contains(role)
    }

    /// Check whether a role may move a proposal out of this stage
    pub fn allows_exit(&self, role: &Role) -> bool {
        self.exit_roles.is_empty() || self.exit_roles.contains(role)
    }

    /// Check whether a role may approve a held exit from this stage
    pub fn allows_approval(&self, role: &Role) -> bool {
        self.approver_roles.contains(role)
    }

    /// Check whether a WIP limit is configured at all
    pub fn has_wip_limit(&self) -> bool {
        self.wip_limit > 0
    }

    /// Check whether every required checklist item appears in `completed`
    pub fn checklist_complete(&self, completed: &HashSet<crate::ChecklistItemId>) -> bool {
        self.checklist
            .iter()
            .filter(|item| item.required)
            .all(|item| completed.contains(&item.id))
    }

    /// The required checklist items of this stage, in order
    pub fn required_checklist_items(&self) -> Vec<&ChecklistItem> {
        self.checklist.iter().filter(|i| i.required).collect()
    }
}

// ── Stage Kind ───────────────────────────────────────────────────────

/// The provenance of a stage's configuration
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    /// Fixed phase of the pipeline, not editable by end users
    LockedPhase,
    /// A stock status shipped with every pipeline
    DefaultStatus,
    /// Created by the organization
    CustomStage,
}

/// Whether a full stage warns or refuses further entries
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WipLimitKind {
    /// Entry proceeds, the result carries a capacity warning
    Soft,
    /// Entry is denied once the limit is reached
    Hard,
}
