//! Engine error taxonomy (§7).
//!
//! Command handlers surface these directly to callers. Transport/IO failures
//! that occur *inside* a running transfer never reach here — the worker
//! folds them into the download's `failed` status instead (see `worker`).

use thiserror::Error;

/// Typed error returned by scheduler command handlers.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("io error: {0}")]
    Io(String),

    #[error("cancelled")]
    Cancelled,
}

impl EngineError {
    /// Taxonomy label used on the wire (§6, §7) — stable across message text changes.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::InvalidPath(_) => "invalid-path",
            EngineError::InvalidState(_) => "invalid-state",
            EngineError::NotFound(_) => "not-found",
            EngineError::Validation(_) => "validation",
            EngineError::Transport(_) => "transport",
            EngineError::Io(_) => "io",
            EngineError::Cancelled => "cancelled",
        }
    }
}

impl From<std::io::Error> for EngineError {
    fn from(e: std::io::Error) -> Self {
        EngineError::Io(e.to_string())
    }
}

impl From<sqlx::Error> for EngineError {
    fn from(e: sqlx::Error) -> Self {
        EngineError::Io(format!("store: {e}"))
    }
}

/// The Store's methods return `anyhow::Result` (§4.A); command handlers here
/// surface any failure from it as a generic `Io` error (the taxonomy has no
/// finer-grained store-specific variant, per §7).
impl From<anyhow::Error> for EngineError {
    fn from(e: anyhow::Error) -> Self {
        EngineError::Io(format!("store: {e}"))
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
