//! Error types for the simulator
//!
//! Every failure the engine can see falls into one of three classes:
//!
//! - **Transport**: connect/write/read failure or timeout. The cycle is skipped and
//!   the next scheduled tick tries again.
//! - **Protocol**: bad magic, length mismatch, invalid JSON or a response the server
//!   marked as failed. Handled like a transport failure but logged louder.
//! - **Configuration**: unreadable recording, malformed interval, invalid settings.
//!   Fatal at startup.

use thiserror::Error;

/// Result type alias for simulator operations
pub type SimResult<T> = Result<T, SimError>;

/// Errors that can occur while loading or running the simulation
#[derive(Debug, Error)]
pub enum SimError {
    /// The server could not be reached or the connection failed mid-exchange
    #[error("transport error: {0}")]
    Transport(String),

    /// The peer sent something that does not follow the wire protocol
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Invalid recording or settings
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl SimError {
    /// Protocol errors point at an incompatible peer rather than a flaky network.
    pub fn is_protocol(&self) -> bool {
        matches!(self, SimError::Protocol(_))
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, SimError::Transport(_))
    }
}

impl From<std::io::Error> for SimError {
    fn from(err: std::io::Error) -> Self {
        SimError::Transport(err.to_string())
    }
}

impl From<serde_json::Error> for SimError {
    fn from(err: serde_json::Error) -> Self {
        SimError::Protocol(err.to_string())
    }
}

impl From<serde_yaml::Error> for SimError {
    fn from(err: serde_yaml::Error) -> Self {
        SimError::Configuration(err.to_string())
    }
}
