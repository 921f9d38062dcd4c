//! Error types for the agent runner.
//!
//! Uses `thiserror` for typed errors that surface through the whole tick
//! pipeline: game server I/O, chat backend streaming, action decoding,
//! prompt rendering, and settings persistence. Everything except
//! [`RunnerError::Config`] is recoverable at the tick boundary.

use lanepilot_core::{CadenceError, DecodeError};

/// Errors that can occur during agent runner operation.
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    /// The game server was unreachable or answered with a non-2xx status.
    #[error("transport failure: {0}")]
    Transport(String),

    /// The chat backend failed, either up front or mid-stream.
    #[error("policy failure: {0}")]
    Policy(String),

    /// A tool call could not be turned into an action.
    #[error("decode failure: {0}")]
    Decode(#[from] DecodeError),

    /// The decision deadline was exceeded.
    #[error("timeout: decision exceeded {ms}ms")]
    Timeout {
        /// The deadline that elapsed.
        ms: u64,
    },

    /// Failed to load or render a prompt template.
    #[error("template error: {0}")]
    Template(String),

    /// Configuration is invalid.
    #[error("config error: {0}")]
    Config(String),

    /// Loop settings could not be persisted.
    #[error("settings error: {0}")]
    Settings(String),

    /// Serialization or deserialization failure.
    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl From<CadenceError> for RunnerError {
    fn from(err: CadenceError) -> Self {
        Self::Config(err.to_string())
    }
}
