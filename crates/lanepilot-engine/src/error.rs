//! Error types for the engine binary.
//!
//! [`EngineError`] wraps every failure that can abort startup. Once the
//! loop is running nothing is fatal; bad ticks degrade inside the runner.

/// Top-level startup error.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Configuration loading or validation failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: lanepilot_core::ConfigError,
    },

    /// A runner component could not be built.
    #[error("runner error: {source}")]
    Runner {
        /// The underlying runner error.
        #[from]
        source: lanepilot_runner::RunnerError,
    },

    /// The control API failed to bind.
    #[error("observer error: {source}")]
    Observer {
        /// The underlying server error.
        #[from]
        source: lanepilot_observer::ServerError,
    },

    /// The tracing subscriber could not be installed.
    #[error("logging error: {message}")]
    Logging {
        /// Description of the failure.
        message: String,
    },
}
