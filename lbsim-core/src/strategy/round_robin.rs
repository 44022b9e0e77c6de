//! Round-robin selection.
//!
//! Cycles through the pool in index order regardless of load. The cursor
//! starts at 0 and is advanced before each pick, so the first request lands on
//! index 1 and a pool of three yields 1, 2, 0, 1, 2, 0, ...

use super::SelectionStrategy;
use crate::worker::Worker;

/// Round-robin selector.
#[derive(Debug, Default)]
pub struct RoundRobin {
    index: usize,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self { index: 0 }
    }
}

impl SelectionStrategy for RoundRobin {
    fn select(&mut self, workers: &[Worker]) -> Option<usize> {
        if workers.is_empty() {
            return None;
        }
        self.index += 1;
        if self.index >= workers.len() {
            self.index = 0;
        }
        Some(self.index)
    }

    fn name(&self) -> &str {
        "round_robin"
    }
}
