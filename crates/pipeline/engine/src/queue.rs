//! Bounded breadth-first event queue for rule cascades
//!
//! Actions can produce events that match further rules. Propagation is
//! breadth-first with a per-cascade depth counter; events past the
//! bound are dropped, and the caller records the loop diagnostic.

use pipeline_types::PipelineEvent;
use std::collections::VecDeque;

/// FIFO of pending events with their cascade depth
#[derive(Debug)]
pub struct EventQueue {
    queue: VecDeque<(PipelineEvent, usize)>,
    max_depth: usize,
}

impl EventQueue {
    pub fn new(max_depth: usize) -> Self {
        Self {
            queue: VecDeque::new(),
            max_depth,
        }
    }

    /// Enqueue the cascade's originating event at depth zero
    pub fn seed(&mut self, event: PipelineEvent) {
        self.queue.push_back((event, 0));
    }

    pub fn pop(&mut self) -> Option<(PipelineEvent, usize)> {
        self.queue.pop_front()
    }

    /// Enqueue events derived at `parent_depth`.
    ///
    /// Returns false when the children would exceed the depth bound;
    /// the events are dropped and nothing is enqueued.
    pub fn push_derived(
        &mut self,
        events: impl IntoIterator<Item = PipelineEvent>,
        parent_depth: usize,
    ) -> bool {
        let depth = parent_depth + 1;
        if depth > self.max_depth {
            return events.into_iter().next().is_none();
        }
        for event in events {
            self.queue.push_back((event, depth));
        }
        true
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipeline_types::ProposalId;

    fn event() -> PipelineEvent {
        PipelineEvent::ProposalCreated {
            proposal_id: ProposalId::new("p-1"),
        }
    }

    #[test]
    fn test_breadth_first_order() {
        let mut queue = EventQueue::new(5);
        queue.seed(event());
        let (_, depth) = queue.pop().unwrap();
        assert_eq!(depth, 0);

        assert!(queue.push_derived([event(), event()], 0));
        let (_, d1) = queue.pop().unwrap();
        let (_, d2) = queue.pop().unwrap();
        assert_eq!((d1, d2), (1, 1));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_depth_bound_drops_children() {
        let mut queue = EventQueue::new(2);
        assert!(queue.push_derived([event()], 0)); // depth 1
        assert!(queue.push_derived([event()], 1)); // depth 2, at the bound
        assert!(!queue.push_derived([event()], 2)); // depth 3, dropped
        assert_eq!(queue.queue.len(), 2);
    }

    #[test]
    fn test_no_children_never_trips_bound() {
        let mut queue = EventQueue::new(1);
        assert!(queue.push_derived(Vec::new(), 5));
        assert!(queue.is_empty());
    }
}
