//! Bounded in-memory event transcript for diagnostics.

use deck_core::now_millis;
use deck_rpc::EventMessage;
use deck_types::{ActorKind, Direction, TranscriptEntry};
use std::collections::VecDeque;

/// Ring of the most recent routed messages. Recording is infallible and
/// never blocks routing; when full the oldest entry is dropped.
#[derive(Debug)]
pub struct Transcript {
    entries: VecDeque<TranscriptEntry>,
    capacity: usize,
}

impl Transcript {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn record(
        &mut self,
        direction: Direction,
        actor: ActorKind,
        actor_id: &str,
        message: &EventMessage,
    ) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(TranscriptEntry {
            timestamp_ms: now_millis(),
            direction,
            actor,
            actor_id: actor_id.to_string(),
            event: message.event.clone(),
            context: message.context.clone(),
            action: message.action.clone(),
        });
    }

    /// The most recent `n` entries, oldest first.
    #[must_use]
    pub fn recent(&self, n: usize) -> Vec<TranscriptEntry> {
        let skip = self.entries.len().saturating_sub(n);
        self.entries.iter().skip(skip).cloned().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use deck_rpc::protocol::events;

    fn message(event: &str) -> EventMessage {
        EventMessage::new(event).with_context("ctx1")
    }

    #[test]
    fn test_record_and_recent() {
        let mut transcript = Transcript::new(8);
        transcript.record(
            Direction::Inbound,
            ActorKind::Plugin,
            "com.example.counter",
            &message(events::SET_TITLE),
        );

        let recent = transcript.recent(10);
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].event, "setTitle");
        assert_eq!(recent[0].context.as_deref(), Some("ctx1"));
        assert_eq!(recent[0].actor_id, "com.example.counter");
    }

    #[test]
    fn test_capacity_drops_oldest() {
        let mut transcript = Transcript::new(2);
        transcript.record(Direction::Inbound, ActorKind::Plugin, "p", &message("a"));
        transcript.record(Direction::Inbound, ActorKind::Plugin, "p", &message("b"));
        transcript.record(Direction::Inbound, ActorKind::Plugin, "p", &message("c"));

        assert_eq!(transcript.len(), 2);
        let events: Vec<_> = transcript.recent(10).iter().map(|e| e.event.clone()).collect();
        assert_eq!(events, vec!["b", "c"]);
    }

    #[test]
    fn test_recent_returns_newest_tail() {
        let mut transcript = Transcript::new(8);
        for event in ["a", "b", "c", "d"] {
            transcript.record(Direction::Outbound, ActorKind::Inspector, "pi", &message(event));
        }
        let events: Vec<_> = transcript.recent(2).iter().map(|e| e.event.clone()).collect();
        assert_eq!(events, vec!["c", "d"]);
    }

    #[test]
    fn test_empty_transcript() {
        let transcript = Transcript::new(4);
        assert!(transcript.is_empty());
        assert!(transcript.recent(3).is_empty());
    }
}
