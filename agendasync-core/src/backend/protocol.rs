//! Defines the JSON protocol used for communication between agendasync
//! and provider binaries over stdin/stdout.

use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::backend::{BackendError, RemoteEvent};
use crate::entry::TeacherId;
use crate::event_spec::{Category, EventSpec};

pub trait ProviderCommand: Serialize {
    type Response: DeserializeOwned;
    fn command() -> Command;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Command {
    CreateEvent,
    DeleteEvent,
    ListEvents,
    EnsureCategories,
}

/// Request sent from agendasync to the provider.
#[derive(Debug, Serialize, Deserialize)]
pub struct Request {
    pub command: Command,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// Response sent from the provider back.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Response<T> {
    Success {
        data: T,
    },
    Error {
        error: String,
        #[serde(default)]
        kind: ErrorKind,
    },
}

/// Provider-side classification of a failure. Unclassified errors are
/// treated as transient so they are retried but never abort a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    #[default]
    Transient,
    Permanent,
    NotFound,
}

impl<T> Response<T> {
    pub fn into_result(self) -> Result<T, BackendError> {
        match self {
            Response::Success { data } => Ok(data),
            Response::Error { error, kind } => Err(match kind {
                ErrorKind::Transient => BackendError::Transient(error),
                ErrorKind::Permanent => BackendError::Permanent(error),
                ErrorKind::NotFound => BackendError::NotFound(error),
            }),
        }
    }
}

/// Create a new event on a teacher's calendar.
#[derive(Debug, Serialize, Deserialize)]
pub struct CreateEvent {
    pub teacher: TeacherId,
    pub event: EventSpec,
}

impl ProviderCommand for CreateEvent {
    type Response = String; // Remote event id
    fn command() -> Command {
        Command::CreateEvent
    }
}

/// Delete an event by remote id.
#[derive(Debug, Serialize, Deserialize)]
pub struct DeleteEvent {
    pub teacher: TeacherId,
    pub remote_event_id: String,
}

impl ProviderCommand for DeleteEvent {
    type Response = ();
    fn command() -> Command {
        Command::DeleteEvent
    }
}

/// List events whose subject starts with a prefix.
#[derive(Debug, Serialize, Deserialize)]
pub struct ListEvents {
    pub teacher: TeacherId,
    pub subject_prefix: String,
}

impl ProviderCommand for ListEvents {
    type Response = Vec<RemoteEvent>;
    fn command() -> Command {
        Command::ListEvents
    }
}

/// Create any missing categories on a teacher's mailbox.
#[derive(Debug, Serialize, Deserialize)]
pub struct EnsureCategories {
    pub teacher: TeacherId,
    pub categories: Vec<Category>,
}

impl ProviderCommand for EnsureCategories {
    type Response = ();
    fn command() -> Command {
        Command::EnsureCategories
    }
}
