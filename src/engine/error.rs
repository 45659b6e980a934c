use crate::buffer::BufferError;
use crate::config::ConfigError;
use crate::sender::ClientError;
use thiserror::Error;

/// Failures that prevent the engine from starting.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("Queue error: {0}")]
    Buffer(#[from] BufferError),
    #[error("Delivery client error: {0}")]
    Client(#[from] ClientError),
    #[error("Analytics engine must be initialized inside a tokio runtime")]
    NoRuntime,
}
