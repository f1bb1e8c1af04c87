//! Core of agendasync: one-way reconciliation of teacher schedules onto
//! remote calendars.
//!
//! A run loads the agenda's schedule snapshot and its last synced state,
//! computes an [`AgendaDiff`], applies it through a [`CalendarBackend`] and
//! persists the confirmed result:
//! - `snapshot` / `state` for the two inputs
//! - `diff` for the pure set difference
//! - `apply` / `engine` for the backend calls and the run modes
//! - `backend` for the calendar abstraction and the provider protocol

pub mod apply;
pub mod backend;
pub mod config;
pub mod diff;
pub mod engine;
pub mod entry;
pub mod error;
pub mod event_spec;
pub mod report;
pub mod snapshot;
pub mod state;

pub use apply::{ApplyReport, ClearReport, TeacherOutcome};
pub use backend::{BackendError, CalendarBackend};
pub use config::{AgendaConfig, AgendasyncConfig};
pub use diff::{AgendaDiff, DiffCounts, DiffKind, EntryDiff, TeacherDiff};
pub use engine::{Agenda, Engine, RunMode, RunOutcome, RunSummary};
pub use entry::{ScheduleEntry, SyncType, TeacherId};
pub use error::{SyncError, SyncResult};
pub use report::RunReport;
pub use state::{AgendaState, FileStateRepository, StateRepository, SyncedEvent};
