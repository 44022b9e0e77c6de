//! Trace replay configuration.
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use validator::{self, Validate};

use crate::validation;

#[derive(Debug, Serialize, Deserialize, Validate, Clone)]
pub struct ReplayConfig {
    /// CSV trace of `<timestamp>,<seconds>` records.
    #[serde(default = "default_trace_path")]
    #[validate(custom(function = validation::validate_trace_path))]
    pub trace_path: PathBuf,

    /// Divides every inter-arrival gap; 1.0 replays at the recorded cadence.
    #[serde(default = "default_time_scale")]
    #[validate(custom(function = validation::validate_time_scale))]
    pub time_scale: f64,
}

fn default_trace_path() -> PathBuf {
    PathBuf::from("lb_requests.csv")
}

fn default_time_scale() -> f64 {
    1.0
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            trace_path: default_trace_path(),
            time_scale: default_time_scale(),
        }
    }
}
