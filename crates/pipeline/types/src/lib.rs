//! Proposal Pipeline Domain Types
//!
//! Pipelines here are NOT fixed state machines. They are end-user
//! configuration — **data** describing stages, gating constraints, and
//! automation rules — interpreted by the engine crate at runtime.
//!
//! # Key Concepts
//!
//! - **Pipeline**: An organization's ordered set of stages, validated
//!   as a whole and immutable once registered.
//! - **Stage**: One named position with its gating metadata — entry and
//!   exit roles, WIP limit, approval requirement, checklist.
//! - **ProposalState**: The mutable per-work-item record, carrying the
//!   current stage, visit timers, checklist progress, and an ordered
//!   activity chain.
//! - **AutomationRule**: A trigger (tagged union per event shape) plus
//!   an ordered action list, validated at save time.
//! - **PipelineEvent**: The typed domain events the rule engine matches
//!   against.
//! - **TransitionResult** / **ExecutionReport**: Defined outcomes —
//!   denials, warnings, and per-action results are values, not panics.
//!
//! # Design Principles
//!
//! 1. Pipelines are values. Mutation means building and re-validating a
//!    new version; partially edited configuration is never observable.
//! 2. Triggers and actions are statically shaped sum types, checked at
//!    rule-save time rather than at fire time.
//! 3. Every proposal mutation appends to the proposal's activity chain.

#![deny(unsafe_code)]

mod checklist;
mod errors;
mod event;
mod pipeline;
mod proposal;
mod report;
mod rule;
mod stage;

pub use checklist::*;
pub use errors::*;
pub use event::*;
pub use pipeline::*;
pub use proposal::*;
pub use report::*;
pub use rule::*;
pub use stage::*;
