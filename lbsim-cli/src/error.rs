use lbsim_config::ConfigError;
use lbsim_core::SimulationError;
use lbsim_simulator::TraceError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Trace(#[from] TraceError),

    #[error("Simulation error: {0}")]
    Simulation(#[from] SimulationError),

    #[error("Failed to render metrics: {0}")]
    Metrics(String),

    #[error("Failed to write output: {0}")]
    Output(#[from] std::io::Error),
}
