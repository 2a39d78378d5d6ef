//! Error taxonomy for Roundup.
//!
//! One enum covers the service, the job manager and the build stages so that
//! every layer can propagate with `?` and decide presentation at the edge
//! (HTTP status codes in the service, exit codes in the binaries).

use thiserror::Error;

pub type RoundupResult<T> = Result<T, RoundupError>;

#[derive(Debug, Error)]
pub enum RoundupError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// Manifest and lock file disagree. Frozen installs never re-resolve.
    #[error("manifest and lock file disagree: {0}")]
    ResolutionMismatch(String),

    #[error("checksum mismatch for {package}: expected {expected}, found {actual}")]
    ChecksumMismatch {
        package: String,
        expected: String,
        actual: String,
    },

    #[error("copy failed: {0}")]
    Copy(String),

    #[error("launch failed: {0}")]
    Launch(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl RoundupError {
    /// Whether the error was caused by the caller's input rather than by the
    /// process or its environment.
    pub fn is_client_error(&self) -> bool {
        matches!(self, RoundupError::NotFound(_) | RoundupError::Json(_))
    }
}
