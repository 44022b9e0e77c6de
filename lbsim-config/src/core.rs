//! Core dispatch engine configuration.
//!
//! Sizing and behaviour of the pieces that make up the balancer:
//! - Worker pool size and selection strategy
//! - Per-worker slot count and admission queue bound
//! - Utilization sampling cadence

use std::time::Duration;

use serde::{Deserialize, Serialize};
use validator::{self, Validate};

/// Balancer configuration.
#[derive(Debug, Serialize, Deserialize, Validate, Clone)]
pub struct BalancerConfig {
    /// Number of workers in the pool.
    #[serde(default = "default_pool_size")]
    #[validate(range(min = 1, max = 10000))]
    pub pool_size: usize,

    /// Selection strategy used to route requests.
    #[serde(default)]
    pub strategy: StrategyKind,

    /// Half-life of the EWMA utilization score (milliseconds).
    #[serde(default = "default_half_life_ms")]
    #[validate(range(min = 1))]
    pub ewma_half_life_ms: u64,

    /// Seed for strategies that sample workers at random.
    #[serde(default = "default_seed")]
    pub seed: u64,
}

/// Selection strategy names accepted in configuration.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    #[default]
    RoundRobin,
    LeastUtilized,
    WeightedRoundRobin,
    Ewma,
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            StrategyKind::RoundRobin => "round_robin",
            StrategyKind::LeastUtilized => "least_utilized",
            StrategyKind::WeightedRoundRobin => "weighted_round_robin",
            StrategyKind::Ewma => "ewma",
        };
        f.write_str(name)
    }
}

fn default_pool_size() -> usize {
    50
}

fn default_half_life_ms() -> u64 {
    10_000
}

fn default_seed() -> u64 {
    42
}

impl BalancerConfig {
    pub fn ewma_half_life(&self) -> Duration {
        Duration::from_millis(self.ewma_half_life_ms)
    }
}

impl Default for BalancerConfig {
    fn default() -> Self {
        Self {
            pool_size: default_pool_size(),
            strategy: StrategyKind::default(),
            ewma_half_life_ms: default_half_life_ms(),
            seed: default_seed(),
        }
    }
}

/// Per-worker configuration, shared by every worker in the pool.
#[derive(Debug, Serialize, Deserialize, Validate, Clone, Copy, PartialEq, Eq)]
pub struct WorkerConfig {
    /// Number of parallel execution slots.
    #[serde(default = "default_concurrency")]
    #[validate(range(min = 1, max = 4096))]
    pub concurrency: usize,

    /// Requests allowed to wait for a free slot.
    #[serde(default = "default_queue_capacity")]
    #[validate(range(min = 1, max = 1048576))]
    pub queue_capacity: usize,
}

fn default_concurrency() -> usize {
    16
}

fn default_queue_capacity() -> usize {
    100
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

/// Utilization sampler configuration.
#[derive(Debug, Serialize, Deserialize, Validate, Clone)]
pub struct SamplerConfig {
    /// Tick interval (milliseconds).
    #[serde(default = "default_interval_ms")]
    #[validate(range(min = 1))]
    pub interval_ms: u64,
}

fn default_interval_ms() -> u64 {
    1000
}

impl SamplerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
        }
    }
}
