//! Checklist items: per-stage completion tracking
//!
//! Each stage carries an ordered list of items. Completion is recorded
//! per proposal-stage visit; the item definitions themselves are
//! immutable pipeline configuration.

use serde::{Deserialize, Serialize};

/// Unique identifier for a checklist item within a stage
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChecklistItemId(pub String);

impl ChecklistItemId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for ChecklistItemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A single completion item on a stage's checklist
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChecklistItem {
    pub id: ChecklistItemId,
    pub label: String,
    pub kind: ChecklistItemKind,
    /// Required items gate checklist completion; optional ones are informational
    pub required: bool,
    /// Display order within the stage
    pub order: u32,
}

impl ChecklistItem {
    /// Create a required checklist item
    pub fn new(
        id: impl Into<String>,
        label: impl Into<String>,
        kind: ChecklistItemKind,
        order: u32,
    ) -> Self {
        Self {
            id: ChecklistItemId::new(id),
            label: label.into(),
            kind,
            required: true,
            order,
        }
    }

    /// Create an optional checklist item
    pub fn optional(
        id: impl Into<String>,
        label: impl Into<String>,
        kind: ChecklistItemKind,
        order: u32,
    ) -> Self {
        let mut item = Self::new(id, label, kind, order);
        item.required = false;
        item
    }
}

/// How a checklist item gets completed
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChecklistItemKind {
    /// A person ticks it off
    ManualCheck,
    /// The system verifies and completes it
    SystemCheck,
    /// Completed by finishing a dialog flow
    ModalTrigger,
    /// Completed by an external generation step
    AiTrigger,
}
