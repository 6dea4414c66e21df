//! Proposal Pipeline Engine
//!
//! Interprets the configuration data from `pipeline-types` at runtime:
//! validates stage transitions against role, capacity, checklist, and
//! approval gates, and runs event-driven automation rules with bounded
//! cascades.
//!
//! # Architecture
//!
//! - **PipelineEngine**: the facade. Owns the registry, rule store,
//!   proposal records, and occupancy ledger; every public operation is
//!   thread-safe.
//! - **TransitionGatekeeper**: pure ordered gate evaluation for one
//!   proposed transition.
//! - **TriggerMatcher**: pure event-to-rule matching, preserving the
//!   store's execution order.
//! - **ActionExecutor**: runs a matched rule's actions in declared
//!   order; failures are recorded per action and never stop siblings.
//! - **EventQueue**: breadth-first cascade propagation with a depth
//!   bound; overflow surfaces as a `RuleLoopDetected` diagnostic.
//! - **TimerSweep**: polling-based due-date and time-in-stage events.
//!
//! # Example
//!
//! ```
//! use pipeline_engine::PipelineEngine;
//! use pipeline_types::{OrganizationId, Pipeline, ProposalSeed, Role, Stage, StageId};
//!
//! let engine = PipelineEngine::new();
//! let org = OrganizationId::new("acme");
//! let pipeline = Pipeline::new("Proposals", org.clone())
//!     .with_statuses(["draft", "submitted"])
//!     .with_stage(Stage::new("draft", "Draft", 0))
//!     .with_stage(Stage::new("review", "Review", 1))
//!     .with_stage(Stage::new("won", "Won", 2).terminal());
//! engine.register_pipeline(pipeline).unwrap();
//!
//! let proposal = engine.create_proposal(&org, ProposalSeed::default()).unwrap();
//! let result = engine
//!     .request_transition(&proposal, &StageId::new("review"), Role::new("editor"))
//!     .unwrap();
//! assert!(result.is_allowed());
//! ```

#![deny(unsafe_code)]

mod engine;
mod executor;
mod gatekeeper;
mod matcher;
mod occupancy;
mod queue;
mod registry;
mod rule_store;
mod scheduler;
mod sinks;

pub use engine::{PipelineEngine, PipelineEngineBuilder, DEFAULT_MAX_CASCADE_DEPTH};
pub use executor::ActionExecutor;
pub use gatekeeper::{Actor, GateDecision, TransitionGatekeeper};
pub use matcher::TriggerMatcher;
pub use occupancy::{Counts, OccupancyLedger, StageKey};
pub use queue::EventQueue;
pub use registry::PipelineRegistry;
pub use rule_store::RuleStore;
pub use scheduler::TimerSweep;
pub use sinks::{
    CalendarSink, Clock, ManualClock, Notifier, NullCalendar, NullNotifier, RecordingCalendar,
    RecordingNotifier, SinkError, SystemClock,
};
