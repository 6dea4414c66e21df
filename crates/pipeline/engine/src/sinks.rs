//! Collaborator seams: notifier, calendar, and clock
//!
//! The engine never talks to delivery infrastructure directly. These
//! traits are the whole surface; a sink failure is recorded in the
//! execution report and logged, never propagated into proposal state.

use chrono::{DateTime, NaiveDate, Utc};
use std::sync::Mutex;

/// A sink call failed
#[derive(Debug, thiserror::Error)]
#[error("sink error: {0}")]
pub struct SinkError(pub String);

impl SinkError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

/// Delivers messages to people; transport is someone else's problem.
///
/// Calls are made synchronously under a proposal's lock, so an
/// implementation must bound its own delivery timeout and return
/// `SinkError` on expiry rather than block.
pub trait Notifier: Send + Sync {
    fn send(&self, recipient: &str, message: &str) -> Result<(), SinkError>;
}

/// Creates calendar events.
///
/// Like [`Notifier`], implementations own their timeout; a slow
/// backend must fail the call, not stall the executor.
pub trait CalendarSink: Send + Sync {
    fn create_event(&self, title: &str, date: NaiveDate) -> Result<(), SinkError>;
}

/// Source of the current time, injectable for deterministic tests
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }
}

// ── Default implementations ──────────────────────────────────────────

/// Drops every notification
#[derive(Clone, Debug, Default)]
pub struct NullNotifier;

impl Notifier for NullNotifier {
    fn send(&self, _recipient: &str, _message: &str) -> Result<(), SinkError> {
        Ok(())
    }
}

/// Drops every calendar event
#[derive(Clone, Debug, Default)]
pub struct NullCalendar;

impl CalendarSink for NullCalendar {
    fn create_event(&self, _title: &str, _date: NaiveDate) -> Result<(), SinkError> {
        Ok(())
    }
}

/// The wall clock
#[derive(Clone, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

// ── Test doubles ─────────────────────────────────────────────────────

/// Records every notification; optionally fails on demand
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<(String, String)>>,
    pub fail: Mutex<bool>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent sends fail
    pub fn set_failing(&self, fail: bool) {
        *self.fail.lock().unwrap_or_else(|e| e.into_inner()) = fail;
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

impl Notifier for RecordingNotifier {
    fn send(&self, recipient: &str, message: &str) -> Result<(), SinkError> {
        if *self.fail.lock().unwrap_or_else(|e| e.into_inner()) {
            return Err(SinkError::new("notifier unavailable"));
        }
        self.sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((recipient.to_string(), message.to_string()));
        Ok(())
    }
}

/// Records every calendar event
#[derive(Debug, Default)]
pub struct RecordingCalendar {
    pub events: Mutex<Vec<(String, NaiveDate)>>,
}

impl RecordingCalendar {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn event_count(&self) -> usize {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

impl CalendarSink for RecordingCalendar {
    fn create_event(&self, title: &str, date: NaiveDate) -> Result<(), SinkError> {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((title.to_string(), date));
        Ok(())
    }
}

/// A clock that only moves when told to
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn starting_at(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn advance(&self, duration: chrono::Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += duration;
    }

    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}
