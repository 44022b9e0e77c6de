//! # lbsim Configuration System
//!
//! Hierarchical configuration for the load-balancer simulator.
//!
//! ## Features
//! - **Unified Configuration**: one document covers the pool, the sampler, the
//!   replay driver and telemetry
//! - **Validation**: runtime validation of every sizing parameter
//! - **Environment Awareness**: `LBSIM_*` variables override file values

#![warn(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format, Serialized, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

mod core;
mod error;
mod simulator;
mod telemetry;
mod validation;

pub use core::BalancerConfig;
pub use core::SamplerConfig;
pub use core::StrategyKind;
pub use core::WorkerConfig;
pub use error::ConfigError;
pub use simulator::ReplayConfig;
pub use telemetry::TelemetryConfig;

/// Default configuration file, read when present in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "lbsim.yaml";

/// Top-level configuration container.
#[derive(Debug, Serialize, Deserialize, Validate, Default, Clone)]
pub struct LbSimConfig {
    /// Pool size and selection strategy.
    #[validate(nested)]
    #[serde(default)]
    pub balancer: BalancerConfig,

    /// Slot count and admission queue bound for each worker.
    #[validate(nested)]
    #[serde(default)]
    pub worker: WorkerConfig,

    /// Utilization sampling cadence.
    #[validate(nested)]
    #[serde(default)]
    pub sampler: SamplerConfig,

    /// Trace source and replay speed.
    #[validate(nested)]
    #[serde(default)]
    pub replay: ReplayConfig,

    #[validate(nested)]
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl LbSimConfig {
    /// Load configuration from the default file and environment.
    ///
    /// Hierarchy:
    /// 1. Default values
    /// 2. `lbsim.yaml` in the working directory, if present
    /// 3. `LBSIM_*` environment variables (`__` separates nested keys)
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(LbSimConfig::default()));
        if Path::new(DEFAULT_CONFIG_FILE).exists() {
            figment = figment.merge(Yaml::file(DEFAULT_CONFIG_FILE));
        }
        Self::finish(figment)
    }

    /// Load configuration from an explicit file. Unlike [`LbSimConfig::load`],
    /// a missing file is an error.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::FileNotFound(PathBuf::from(path)));
        }

        let figment =
            Figment::from(Serialized::defaults(LbSimConfig::default())).merge(Yaml::file(path));
        Self::finish(figment)
    }

    /// Renders the configuration as YAML, in the same shape [`LbSimConfig::load_from_path`]
    /// accepts.
    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        Ok(serde_yaml::to_string(self)?)
    }

    fn finish(figment: Figment) -> Result<Self, ConfigError> {
        let config: Self = figment
            .merge(Env::prefixed("LBSIM_").split("__"))
            .extract()?;
        config.validate()?;
        Ok(config)
    }
}
