//! EWMA power-of-two-choices selection.
//!
//! Every completion reports the utilization of the worker that served it. The
//! strategy keeps an exponentially weighted moving average of those reports
//! per worker and, for each request, samples two distinct workers at random
//! and picks the one with the lower average. Workers with no completions yet
//! score 0.

use std::collections::HashMap;
use std::time::Duration;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use tokio::time::Instant;
use tracing::trace;

use super::SelectionStrategy;
use crate::request::CompletionEvent;
use crate::worker::{Worker, WorkerId};

/// Ratio between the exponential time constant and the half-life (`1/ln 2`).
const HALF_LIFE_TO_TAU: f64 = 1.44;

/// Shorter half-lives are raised to this; a zero time constant has no decay.
const MIN_HALF_LIFE: Duration = Duration::from_millis(1);

/// Exponential moving average whose weight on old samples halves every
/// half-life. Starts at the first sampled value.
#[derive(Debug, Clone)]
pub struct EwmaValue {
    tau: f64,
    average: f64,
    last_updated: Option<Instant>,
}

impl EwmaValue {
    pub fn new(half_life: Duration) -> Self {
        Self {
            tau: HALF_LIFE_TO_TAU * half_life.max(MIN_HALF_LIFE).as_secs_f64(),
            average: 0.0,
            last_updated: None,
        }
    }

    pub fn average(&self) -> f64 {
        self.average
    }

    pub fn add_sample(&mut self, value: f64, now: Instant) -> f64 {
        self.average = match self.last_updated {
            None => value,
            Some(last) => {
                let elapsed = now.saturating_duration_since(last).as_secs_f64();
                let weight = (-elapsed / self.tau).exp();
                (1.0 - weight) * value + weight * self.average
            }
        };
        self.last_updated = Some(now);
        self.average
    }
}

pub struct EwmaStrategy {
    half_life: Duration,
    scores: HashMap<WorkerId, EwmaValue>,
    rng: SmallRng,
}

impl EwmaStrategy {
    pub fn new(half_life: Duration, seed: u64) -> Self {
        Self {
            half_life,
            scores: HashMap::new(),
            rng: SmallRng::seed_from_u64(seed),
        }
    }

    pub fn score(&self, worker: WorkerId) -> f64 {
        self.scores.get(&worker).map_or(0.0, EwmaValue::average)
    }

    fn pick_pair(&mut self, len: usize) -> (usize, usize) {
        let first = self.rng.random_range(0..len);
        let mut second = self.rng.random_range(0..len - 1);
        if second >= first {
            second += 1;
        }
        (first, second)
    }
}

impl SelectionStrategy for EwmaStrategy {
    fn select(&mut self, workers: &[Worker]) -> Option<usize> {
        match workers.len() {
            0 => None,
            1 => Some(0),
            len => {
                let (a, b) = self.pick_pair(len);
                let (score_a, score_b) = (self.score(workers[a].id()), self.score(workers[b].id()));
                Some(if score_b < score_a { b } else { a })
            }
        }
    }

    fn process_response(&mut self, event: &CompletionEvent) {
        let Some(worker) = event.worker() else {
            return;
        };
        let half_life = self.half_life;
        let average = self
            .scores
            .entry(worker)
            .or_insert_with(|| EwmaValue::new(half_life))
            .add_sample(event.utilization, Instant::now());
        trace!(%worker, average, "EWMA score updated");
    }

    fn name(&self) -> &str {
        "ewma"
    }
}

impl std::fmt::Debug for EwmaStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EwmaStrategy")
            .field("half_life", &self.half_life)
            .field("scores", &self.scores)
            .finish_non_exhaustive()
    }
}
