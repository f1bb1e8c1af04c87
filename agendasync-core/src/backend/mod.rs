//! The remote calendar, as seen by the apply engine.
//!
//! The engine only ever creates, deletes and lists events; it never updates
//! one in place. Implementations decide how those calls reach the calendar
//! service. [`provider::ProviderBackend`] hands them to an external provider
//! binary.

pub mod protocol;
pub mod provider;
mod retry;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::entry::TeacherId;
use crate::event_spec::{Category, EventSpec};

pub use retry::RetryPolicy;

/// How a backend call failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// Timeouts, rate limits, flaky network. Worth retrying.
    #[error("transient: {0}")]
    Transient(String),

    /// Authentication or permission problems. Aborts the whole run.
    #[error("permanent: {0}")]
    Permanent(String),

    /// The remote object (or mailbox) does not exist.
    #[error("not found: {0}")]
    NotFound(String),
}

impl BackendError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, BackendError::Transient(_))
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, BackendError::Permanent(_))
    }
}

/// Result of an idempotent delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    /// The event was already gone; counts as a successful removal.
    AlreadyGone,
}

impl DeleteOutcome {
    pub fn from_result(result: Result<(), BackendError>) -> Result<Self, BackendError> {
        match result {
            Ok(()) => Ok(DeleteOutcome::Deleted),
            Err(BackendError::NotFound(_)) => Ok(DeleteOutcome::AlreadyGone),
            Err(e) => Err(e),
        }
    }
}

/// An event found on the remote calendar while clearing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteEvent {
    pub id: String,
    pub subject: String,
}

#[async_trait]
pub trait CalendarBackend: Send + Sync {
    /// Create an event on the teacher's calendar and return its remote id.
    async fn create_event(&self, teacher: &TeacherId, event: &EventSpec) -> Result<String, BackendError>;

    /// Delete an event by remote id. A missing event is [`BackendError::NotFound`].
    async fn delete_event(&self, teacher: &TeacherId, remote_event_id: &str) -> Result<(), BackendError>;

    /// All events on the teacher's calendar whose subject starts with `subject_prefix`.
    async fn list_events(
        &self,
        teacher: &TeacherId,
        subject_prefix: &str,
    ) -> Result<Vec<RemoteEvent>, BackendError>;

    /// Make sure the given categories exist on the teacher's mailbox.
    async fn ensure_categories(
        &self,
        teacher: &TeacherId,
        categories: &[Category],
    ) -> Result<(), BackendError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_event_is_already_gone() {
        assert_eq!(DeleteOutcome::from_result(Ok(())), Ok(DeleteOutcome::Deleted));
        assert_eq!(
            DeleteOutcome::from_result(Err(BackendError::NotFound("AAMk-1".into()))),
            Ok(DeleteOutcome::AlreadyGone)
        );
        assert!(DeleteOutcome::from_result(Err(BackendError::Transient("429".into()))).is_err());
    }
}
