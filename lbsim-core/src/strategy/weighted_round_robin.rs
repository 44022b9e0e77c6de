//! Weighted round-robin selection driven by completion feedback.
//!
//! Interleaved weighted round robin: a cursor walks the pool in index order
//! while a current-weight threshold steps down from the largest weight by the
//! gcd of all weights, restarting from the top after each full pass. A worker
//! is picked when its weight is at or above the threshold, so over one cycle
//! each worker receives `weight / gcd` requests, spread out rather than
//! bunched.
//!
//! Weights come from completions: each reported utilization is turned into a
//! spare-capacity weight with [`weight_for_utilization`]. Workers that have
//! not reported yet carry the idle weight.

use std::collections::HashMap;

use tracing::trace;

use super::SelectionStrategy;
use crate::request::CompletionEvent;
use crate::worker::{Worker, WorkerId};

/// Number of weight steps between a saturated and an idle worker.
pub const WEIGHT_STEPS: u64 = 10;

/// Weight of a worker with no spare capacity. Never zero, so every worker
/// keeps receiving a trickle of requests and can report recovery.
pub const MIN_WEIGHT: u64 = 1;

/// Weight of an idle worker.
pub const IDLE_WEIGHT: u64 = MIN_WEIGHT + WEIGHT_STEPS;

/// Maps a reported utilization to a selection weight: idle workers get
/// [`IDLE_WEIGHT`], saturated or overloaded ones [`MIN_WEIGHT`].
pub fn weight_for_utilization(utilization: f64) -> u64 {
    let spare = (1.0 - utilization).clamp(0.0, 1.0);
    if spare.is_nan() {
        return MIN_WEIGHT;
    }
    MIN_WEIGHT + (spare * WEIGHT_STEPS as f64).round() as u64
}

fn gcd(a: u64, b: u64) -> u64 {
    if b == 0 {
        a
    } else {
        gcd(b, a % b)
    }
}

#[derive(Debug, Default)]
pub struct WeightedRoundRobin {
    weights: HashMap<WorkerId, u64>,
    cursor: Option<usize>,
    current_weight: u64,
}

impl WeightedRoundRobin {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn weight(&self, worker: WorkerId) -> u64 {
        self.weights.get(&worker).copied().unwrap_or(IDLE_WEIGHT)
    }

    /// Overrides a worker's weight. Zero is raised to [`MIN_WEIGHT`].
    pub fn set_weight(&mut self, worker: WorkerId, weight: u64) {
        self.weights.insert(worker, weight.max(MIN_WEIGHT));
    }
}

impl SelectionStrategy for WeightedRoundRobin {
    fn select(&mut self, workers: &[Worker]) -> Option<usize> {
        let len = workers.len();
        if len == 0 {
            return None;
        }
        if len == 1 {
            return Some(0);
        }

        let weights: Vec<u64> = workers.iter().map(|w| self.weight(w.id())).collect();
        let max_weight = weights.iter().copied().max().unwrap_or(MIN_WEIGHT);
        let step = weights.iter().copied().fold(0, gcd);

        // Weights may have dropped since the last pick.
        self.current_weight = self.current_weight.min(max_weight);

        // Terminates: some worker carries max_weight and the threshold
        // returns to max_weight at least once per pass.
        let mut index = self.cursor.filter(|&i| i < len).map_or(len - 1, |i| i);
        loop {
            index = (index + 1) % len;
            if index == 0 {
                self.current_weight = match self.current_weight.checked_sub(step) {
                    Some(w) if w > 0 => w,
                    _ => max_weight,
                };
            }
            if weights[index] >= self.current_weight {
                self.cursor = Some(index);
                return Some(index);
            }
        }
    }

    fn process_response(&mut self, event: &CompletionEvent) {
        let Some(worker) = event.worker() else {
            return;
        };
        let weight = weight_for_utilization(event.utilization);
        self.set_weight(worker, weight);
        trace!(%worker, weight, utilization = event.utilization, "Weight updated");
    }

    fn name(&self) -> &str {
        "weighted_round_robin"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::Request;
    use crate::strategy::tests::make_workers;
    use chrono::Utc;
    use std::time::Duration;

    fn completion(worker: u32, utilization: f64) -> CompletionEvent {
        let mut request = Request::new(0, Utc::now(), Duration::from_millis(1));
        request.assigned_worker = Some(WorkerId(worker));
        CompletionEvent {
            request,
            utilization,
        }
    }

    fn tally(strategy: &mut WeightedRoundRobin, workers: &[Worker], picks: usize) -> Vec<usize> {
        let mut counts = vec![0; workers.len()];
        for _ in 0..picks {
            counts[strategy.select(workers).unwrap()] += 1;
        }
        counts
    }

    #[test]
    fn weight_mapping() {
        assert_eq!(weight_for_utilization(0.0), IDLE_WEIGHT);
        assert_eq!(weight_for_utilization(0.5), MIN_WEIGHT + WEIGHT_STEPS / 2);
        assert_eq!(weight_for_utilization(1.0), MIN_WEIGHT);
        assert_eq!(weight_for_utilization(3.5), MIN_WEIGHT);
        assert_eq!(weight_for_utilization(f64::NAN), MIN_WEIGHT);
    }

    #[test]
    fn equal_weights_cycle_in_order() {
        let workers = make_workers(3);
        let mut wrr = WeightedRoundRobin::new();
        let picks: Vec<_> = (0..6).map(|_| wrr.select(&workers).unwrap()).collect();
        assert_eq!(picks, vec![0, 1, 2, 0, 1, 2]);
    }

    #[test]
    fn one_to_two_split_is_proportional() {
        let workers = make_workers(20);
        let mut wrr = WeightedRoundRobin::new();
        for (index, worker) in workers.iter().enumerate() {
            wrr.set_weight(worker.id(), if index % 2 == 0 { 1 } else { 2 });
        }

        // 30 picks per cycle; 100 whole cycles.
        let counts = tally(&mut wrr, &workers, 3_000);
        for (index, count) in counts.iter().enumerate() {
            let expected = if index % 2 == 0 { 100 } else { 200 };
            assert_eq!(*count, expected, "worker index {index}");
        }
    }

    #[test]
    fn reweighting_shifts_picks() {
        let workers = make_workers(20);
        let mut wrr = WeightedRoundRobin::new();
        for (index, worker) in workers.iter().enumerate() {
            wrr.set_weight(worker.id(), if index % 2 == 0 { 1 } else { 2 });
        }
        tally(&mut wrr, &workers, 1_500);

        wrr.set_weight(workers[3].id(), 100);
        let counts = tally(&mut wrr, &workers, 1_000);
        assert!(counts[3] >= 700, "heavy worker got {}", counts[3]);
        for (index, count) in counts.iter().enumerate().filter(|(i, _)| *i != 3) {
            assert!(*count <= 20, "worker index {index} got {count}");
        }
    }

    #[test]
    fn completions_move_traffic_to_spare_capacity() {
        let workers = make_workers(2);
        let mut wrr = WeightedRoundRobin::new();
        wrr.process_response(&completion(1, 0.0));
        wrr.process_response(&completion(2, 1.5));
        assert_eq!(wrr.weight(WorkerId(1)), IDLE_WEIGHT);
        assert_eq!(wrr.weight(WorkerId(2)), MIN_WEIGHT);

        let counts = tally(&mut wrr, &workers, 12);
        assert_eq!(counts, vec![11, 1]);
    }

    #[test]
    fn zero_weight_is_raised_to_minimum() {
        let mut wrr = WeightedRoundRobin::new();
        wrr.set_weight(WorkerId(4), 0);
        assert_eq!(wrr.weight(WorkerId(4)), MIN_WEIGHT);
    }

    #[test]
    fn single_and_empty_pools() {
        let mut wrr = WeightedRoundRobin::new();
        assert_eq!(wrr.select(&[]), None);
        let workers = make_workers(1);
        assert_eq!(wrr.select(&workers), Some(0));
    }
}
