//! Error types for the server launcher.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while launching or supervising a llama-server
/// process.
#[derive(Debug, Error)]
pub enum ServerError {
    /// A configuration field failed validation.
    #[error("invalid {field}: {reason}")]
    Validation {
        /// Name of the offending configuration field
        field: &'static str,
        reason: String,
    },

    /// The configured model file does not exist.
    #[error("model_path does not exist: {path}")]
    ModelNotFound { path: PathBuf },

    /// The llama-server binary could not be located.
    #[error("'{binary}' not found in PATH. Install it or add it to PATH.")]
    BinaryNotFound { binary: String },

    /// Spawning the child process failed.
    #[error("failed to spawn llama-server: {0}")]
    Spawn(std::io::Error),

    /// The server exited before reporting healthy.
    #[error("llama-server exited early before healthy. Last output:\n{output}")]
    ExitedEarly { output: String },

    /// The server did not report healthy within the allowed time.
    ///
    /// The process has already been terminated by the time this is returned.
    #[error(
        "server did not report healthy within {waited:.1}s on port {port}. Last output:\n{output}"
    )]
    HealthTimeout { waited: f64, port: u16, output: String },

    /// Building the health-check HTTP client failed.
    #[error("health check client error: {0}")]
    Http(#[from] reqwest::Error),

    /// IO error while supervising the process.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for server launcher operations.
pub type ServerResult<T> = Result<T, ServerError>;
