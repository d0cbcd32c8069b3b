//! Duplicate event suppression

use std::collections::HashSet;
use tata_wire::StreamEvent;

/// Identity of an event for duplicate detection
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct Fingerprint {
    kind: String,
    timestamp_bits: u64,
    prefix: String,
}

/// Admits each distinct event once.
///
/// Events are identified by kind, timestamp and a content prefix. The filter is
/// owned by a single turn and dropped with it.
#[derive(Debug)]
pub struct DuplicateFilter {
    seen: HashSet<Fingerprint>,
    prefix_chars: usize,
}

impl DuplicateFilter {
    /// Create a filter that compares the first `prefix_chars` characters of content
    pub fn new(prefix_chars: usize) -> Self {
        Self {
            seen: HashSet::new(),
            prefix_chars,
        }
    }

    /// Returns true the first time an event is seen, false for every repeat
    pub fn admit(&mut self, event: &StreamEvent) -> bool {
        // -0.0 and 0.0 compare equal, so normalise before taking the bits
        let timestamp = if event.timestamp == 0.0 { 0.0 } else { event.timestamp };
        self.seen.insert(Fingerprint {
            kind: event.kind.as_str().to_string(),
            timestamp_bits: timestamp.to_bits(),
            prefix: event.content_prefix(self.prefix_chars).to_string(),
        })
    }

    /// Number of distinct events admitted
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

impl Default for DuplicateFilter {
    fn default() -> Self {
        Self::new(50)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tata_wire::EventKind;

    #[test]
    fn test_repeat_is_rejected() {
        let mut filter = DuplicateFilter::default();
        let event = StreamEvent::new(EventKind::Thinking, "decided to call flights", 10.0);
        assert!(filter.admit(&event));
        assert!(!filter.admit(&event.clone()));
        assert_eq!(filter.len(), 1);
    }

    #[test]
    fn test_kind_and_timestamp_distinguish() {
        let mut filter = DuplicateFilter::default();
        assert!(filter.admit(&StreamEvent::new(EventKind::Thinking, "x", 10.0)));
        assert!(filter.admit(&StreamEvent::new(EventKind::AssistantMessage, "x", 10.0)));
        assert!(filter.admit(&StreamEvent::new(EventKind::Thinking, "x", 10.5)));
    }

    #[test]
    fn test_only_prefix_is_compared() {
        let mut filter = DuplicateFilter::new(5);
        assert!(filter.admit(&StreamEvent::new(EventKind::Final, "hello world", 1.0)));
        assert!(!filter.admit(&StreamEvent::new(EventKind::Final, "hello there", 1.0)));
    }

    #[test]
    fn test_metadata_is_not_part_of_identity() {
        let mut filter = DuplicateFilter::default();
        let a = StreamEvent::new(EventKind::ToolCall, "", 3.0).with_meta("call_id", "c1");
        let b = StreamEvent::new(EventKind::ToolCall, "", 3.0).with_meta("call_id", "c2");
        assert!(filter.admit(&a));
        assert!(!filter.admit(&b));
    }
}
