//! Least-utilized selection.
//!
//! Reads every worker's live utilization and picks the lowest. Ties go to the
//! lowest index. Ignores completion feedback.

use super::SelectionStrategy;
use crate::worker::Worker;

#[derive(Debug, Default)]
pub struct LeastUtilized;

impl LeastUtilized {
    pub fn new() -> Self {
        Self
    }
}

impl SelectionStrategy for LeastUtilized {
    fn select(&mut self, workers: &[Worker]) -> Option<usize> {
        let mut best: Option<(usize, f64)> = None;
        for (index, worker) in workers.iter().enumerate() {
            let load = worker.utilization();
            match best {
                Some((_, lowest)) if load >= lowest => {}
                _ => best = Some((index, load)),
            }
        }
        best.map(|(index, _)| index)
    }

    fn name(&self) -> &str {
        "least_utilized"
    }
}
