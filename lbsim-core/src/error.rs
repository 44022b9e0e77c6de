use thiserror::Error;

#[derive(Debug, Error)]
pub enum SimulationError {
    #[error("Balancer already started")]
    AlreadyStarted,

    #[error("Worker {0} already started")]
    WorkerAlreadyStarted(crate::worker::WorkerId),

    #[error("Task failed: {0}")]
    Task(String),
}

impl From<tokio::task::JoinError> for SimulationError {
    fn from(err: tokio::task::JoinError) -> Self {
        SimulationError::Task(err.to_string())
    }
}
