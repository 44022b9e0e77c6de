//! Worker selection strategies.
//!
//! All strategies implement [`SelectionStrategy`]. The balancer calls
//! [`SelectionStrategy::select`] for every incoming request and forwards each
//! completion to [`SelectionStrategy::process_response`], so a strategy may be
//! stateless, cursor-based or driven by completion feedback without the
//! balancer knowing which.

mod ewma;
mod least_utilized;
mod round_robin;
mod weighted_round_robin;

pub use ewma::{EwmaStrategy, EwmaValue};
pub use least_utilized::LeastUtilized;
pub use round_robin::RoundRobin;
pub use weighted_round_robin::{weight_for_utilization, WeightedRoundRobin};

use lbsim_config::{BalancerConfig, StrategyKind};

use crate::request::CompletionEvent;
use crate::worker::Worker;

/// Chooses which worker receives the next request.
pub trait SelectionStrategy: Send {
    /// Index into `workers` of the chosen worker. `None` only when the pool is
    /// empty.
    fn select(&mut self, workers: &[Worker]) -> Option<usize>;

    /// Called once per completed request.
    fn process_response(&mut self, _event: &CompletionEvent) {}

    /// Human-readable name for logs.
    fn name(&self) -> &str;
}

/// Builds the strategy named in configuration.
pub fn from_config(config: &BalancerConfig) -> Box<dyn SelectionStrategy> {
    match config.strategy {
        StrategyKind::RoundRobin => Box::new(RoundRobin::new()),
        StrategyKind::LeastUtilized => Box::new(LeastUtilized::new()),
        StrategyKind::WeightedRoundRobin => Box::new(WeightedRoundRobin::new()),
        StrategyKind::Ewma => Box::new(EwmaStrategy::new(config.ewma_half_life(), config.seed)),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::worker::{WorkerId, WorkerIdSequence};
    use lbsim_config::WorkerConfig;
    use tokio::sync::mpsc;

    /// Idle, unstarted workers with ids 1..=n.
    pub(crate) fn make_workers(n: usize) -> Vec<Worker> {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut ids = WorkerIdSequence::new();
        (0..n)
            .map(|_| Worker::new(ids.next_id(), &WorkerConfig::default(), tx.clone()))
            .collect()
    }

    #[test]
    fn from_config_honours_kind() {
        let mut config = BalancerConfig::default();
        assert_eq!(from_config(&config).name(), "round_robin");
        config.strategy = StrategyKind::LeastUtilized;
        assert_eq!(from_config(&config).name(), "least_utilized");
        config.strategy = StrategyKind::WeightedRoundRobin;
        assert_eq!(from_config(&config).name(), "weighted_round_robin");
        config.strategy = StrategyKind::Ewma;
        assert_eq!(from_config(&config).name(), "ewma");
    }

    #[test]
    fn every_strategy_rejects_empty_pool() {
        for kind in [
            StrategyKind::RoundRobin,
            StrategyKind::LeastUtilized,
            StrategyKind::WeightedRoundRobin,
            StrategyKind::Ewma,
        ] {
            let config = BalancerConfig {
                strategy: kind,
                ..BalancerConfig::default()
            };
            assert_eq!(from_config(&config).select(&[]), None, "{kind}");
        }
    }

    #[test]
    fn make_workers_assigns_sequential_ids() {
        let workers = make_workers(3);
        let ids: Vec<_> = workers.iter().map(Worker::id).collect();
        assert_eq!(ids, vec![WorkerId(1), WorkerId(2), WorkerId(3)]);
    }
}
