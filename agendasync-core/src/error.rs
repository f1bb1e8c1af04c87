//! Error types for agendasync.

use thiserror::Error;

use crate::backend::BackendError;

/// Errors that abort an agenda run.
///
/// Per-operation backend failures that were retried and still failed are not
/// errors at this level: they are recorded in the apply report and the run
/// carries on. Only the variants below stop a run.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Agenda not found: {0}")]
    AgendaNotFound(String),

    #[error("Snapshot error: {0}")]
    Snapshot(String),

    #[error("State error: {0}")]
    State(String),

    #[error(
        "Could not save sync state for agenda '{agenda}': {reason}. \
         The remote calendars were already modified; reconcile manually before the next run"
    )]
    StatePersist { agenda: String, reason: String },

    #[error("Backend error for '{teacher}': {source}")]
    Backend {
        teacher: String,
        #[source]
        source: BackendError,
    },

    #[error("Provider '{0}' not found in PATH")]
    ProviderNotInstalled(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for SyncError {
    fn from(e: serde_json::Error) -> Self {
        SyncError::Serialization(e.to_string())
    }
}

/// Result type alias for agendasync operations.
pub type SyncResult<T> = Result<T, SyncError>;
