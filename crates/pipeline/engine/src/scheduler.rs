//! Timer sweep: derives time-based events from proposal state
//!
//! Polling is the only source of due-date and time-in-stage events.
//! The sweep itself is idempotent per calendar day for due dates; the
//! once-per-visit guarantee for time-in-stage rules lives in the
//! matcher's fired markers, because it is per rule, not per proposal.

use chrono::{DateTime, NaiveDate, Utc};
use pipeline_types::{PipelineEvent, ProposalState};

/// Derives timer events for proposals during a poll
#[derive(Clone, Debug, Default)]
pub struct TimerSweep;

impl TimerSweep {
    pub fn new() -> Self {
        Self
    }

    /// Compute the timer events one proposal produces at this instant.
    ///
    /// Marks the proposal's due-date evaluation day, so repeated polls
    /// within one calendar day emit the due event at most once.
    pub fn sweep(
        &self,
        proposal: &mut ProposalState,
        now: DateTime<Utc>,
        today: NaiveDate,
    ) -> Vec<PipelineEvent> {
        let mut events = Vec::new();

        if proposal.last_due_evaluated != Some(today) {
            if let Some(days_until_due) = proposal.days_until_due(today) {
                proposal.last_due_evaluated = Some(today);
                // Overdue proposals produce no approaching event
                if days_until_due >= 0 {
                    events.push(PipelineEvent::DueDateApproaching {
                        proposal_id: proposal.id.clone(),
                        days_until_due,
                    });
                }
            }
        }

        let days_in_stage = proposal.days_in_stage(now);
        if days_in_stage >= 1 {
            events.push(PipelineEvent::TimeInStageElapsed {
                proposal_id: proposal.id.clone(),
                stage_id: proposal.current_stage_id.clone(),
                days_in_stage,
            });
        }

        events
    }
}
