//! Contiguous event-index ranges.

use serde::{Deserialize, Serialize};

/// A contiguous batch of events processed by one rank in one iteration.
///
/// `count` may be zero: ranks past the end of the dataset still carry an
/// (empty) chunk so they can participate in collective I/O.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventChunk {
    /// Global index of the first event in the chunk.
    pub start: u64,
    /// Number of events in the chunk.
    pub count: u64,
}

impl EventChunk {
    pub fn new(start: u64, count: u64) -> Self {
        EventChunk { start, count }
    }

    /// One past the last event in the chunk.
    pub fn end(&self) -> u64 {
        self.start + self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

impl std::fmt::Display for EventChunk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {})", self.start, self.end())
    }
}
