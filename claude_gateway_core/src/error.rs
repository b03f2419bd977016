//! Error types for the gateway core

use thiserror::Error;

#[derive(Error, Debug)]
pub enum GatewayError {
    /// The agent binary could not be started (missing, not executable, bad cwd).
    #[error("Failed to launch agent: {0}")]
    Launch(#[source] std::io::Error),

    /// Reading the agent's output failed after it had started.
    #[error("Failed to read agent output: {0}")]
    OutputRead(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl GatewayError {
    /// True for failures that happened before any process existed.
    pub fn is_launch_failure(&self) -> bool {
        matches!(self, GatewayError::Launch(_))
    }

    /// Reclassify a failure seen while consuming stdout as an output read failure.
    pub fn into_output_read(self) -> Self {
        match self {
            GatewayError::OutputRead(_) => self,
            other => GatewayError::OutputRead(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, GatewayError>;
