//! One run of one agenda: load, diff, and (depending on the mode) apply or
//! clear, then persist.

use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;

use serde::Serialize;

use crate::apply::{ApplyEngine, ApplyReport, ClearReport};
use crate::backend::{CalendarBackend, RetryPolicy};
use crate::config::AgendasyncConfig;
use crate::diff::AgendaDiff;
use crate::entry::{SyncType, TeacherId};
use crate::error::{SyncError, SyncResult};
use crate::event_spec::EventTemplate;
use crate::snapshot::{Roster, Snapshot};
use crate::state::{AgendaState, StateRepository};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    /// Report the diff, touch nothing.
    DryRun,
    Execute,
    /// Remove everything the agenda ever created and forget its state.
    ClearOnly,
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunMode::DryRun => write!(f, "dry-run"),
            RunMode::Execute => write!(f, "execute"),
            RunMode::ClearOnly => write!(f, "clear-only"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RunOutcome {
    Diff(AgendaDiff),
    Apply { diff: AgendaDiff, report: ApplyReport },
    Clear(ClearReport),
}

/// Totals across a run, as printed at the end and written to the run report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub added: usize,
    pub removed: usize,
    pub changed: usize,
    pub unchanged: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl RunOutcome {
    pub fn summary(&self) -> RunSummary {
        match self {
            RunOutcome::Diff(diff) => {
                let counts = diff.counts();
                RunSummary {
                    added: counts.added,
                    removed: counts.removed,
                    changed: counts.changed,
                    unchanged: counts.unchanged,
                    failed: 0,
                    skipped: diff.skipped.len(),
                }
            }
            RunOutcome::Apply { diff, report } => {
                let counts = report.counts();
                RunSummary {
                    added: counts.added,
                    removed: counts.removed,
                    changed: counts.changed,
                    unchanged: counts.unchanged,
                    failed: report.failed(),
                    skipped: diff.skipped.len(),
                }
            }
            RunOutcome::Clear(report) => RunSummary {
                removed: report.deleted(),
                failed: report.failed(),
                ..RunSummary::default()
            },
        }
    }

    /// The run finished but left something for a human to look at.
    pub fn needs_attention(&self) -> bool {
        let summary = self.summary();
        summary.failed > 0 || summary.skipped > 0
    }
}

/// A configured agenda, ready to run.
#[derive(Debug, Clone)]
pub struct Agenda {
    pub name: String,
    pub sync_type: SyncType,
    pub snapshots: Vec<PathBuf>,
    pub template: EventTemplate,
}

impl Agenda {
    pub fn from_config(config: &AgendasyncConfig, name: &str) -> SyncResult<Self> {
        let agenda = config.agenda(name)?;

        Ok(Agenda {
            name: name.to_string(),
            sync_type: agenda.sync_type,
            snapshots: config.snapshot_paths(agenda),
            template: EventTemplate::new(agenda.sync_type, agenda.subject(), config.tz()?),
        })
    }
}

pub struct Engine<'a> {
    states: &'a dyn StateRepository,
    roster: Roster,
    retry: RetryPolicy,
    backend: Option<&'a dyn CalendarBackend>,
}

impl<'a> Engine<'a> {
    pub fn new(states: &'a dyn StateRepository, roster: Roster, retry: RetryPolicy) -> Self {
        Engine {
            states,
            roster,
            retry,
            backend: None,
        }
    }

    /// Required for every mode but dry-run.
    pub fn with_backend(mut self, backend: &'a dyn CalendarBackend) -> Self {
        self.backend = Some(backend);
        self
    }

    pub async fn run(&self, agenda: &Agenda, mode: RunMode) -> SyncResult<RunOutcome> {
        tracing::info!(agenda = %agenda.name, %mode, "run started");

        let snapshot = Snapshot::load(&agenda.snapshots, agenda.sync_type, |name| {
            self.roster.resolve(name)
        })?;
        let old = self.load_state(agenda)?;

        match mode {
            RunMode::DryRun => Ok(RunOutcome::Diff(AgendaDiff::compute(
                &agenda.name,
                agenda.sync_type,
                old.as_ref(),
                &snapshot,
            ))),
            RunMode::Execute => {
                let diff = AgendaDiff::compute(&agenda.name, agenda.sync_type, old.as_ref(), &snapshot);
                let report = ApplyEngine::new(self.backend()?, &agenda.template, self.retry)
                    .apply(&diff)
                    .await?;

                let state = next_state(agenda, &diff, &report);
                self.states.save(&agenda.name, &state)?;
                tracing::info!(
                    agenda = %agenda.name,
                    teachers = state.teacher_count(),
                    events = state.event_count(),
                    "state persisted"
                );

                Ok(RunOutcome::Apply { diff, report })
            }
            RunMode::ClearOnly => {
                let mut teachers: BTreeSet<TeacherId> = snapshot.schedule.teachers().cloned().collect();
                teachers.extend(snapshot.skipped.iter().map(|s| s.teacher.clone()));
                if let Some(state) = &old {
                    teachers.extend(state.events.keys().cloned());
                    teachers.extend(state.pending_clear.iter().cloned());
                }
                let teachers: Vec<TeacherId> = teachers.into_iter().collect();

                let report = ApplyEngine::new(self.backend()?, &agenda.template, self.retry)
                    .clear(&agenda.name, &teachers)
                    .await?;
                // Leftovers from failed deletes are caught by the next bootstrap clear.
                self.states.remove(&agenda.name)?;

                Ok(RunOutcome::Clear(report))
            }
        }
    }

    fn load_state(&self, agenda: &Agenda) -> SyncResult<Option<AgendaState>> {
        let old = self.states.load(&agenda.name)?;
        if let Some(state) = &old {
            if state.sync_type != agenda.sync_type {
                return Err(SyncError::State(format!(
                    "State of agenda '{}' was synced as {}, but the agenda is configured as {}",
                    agenda.name, state.sync_type, agenda.sync_type
                )));
            }
        }
        Ok(old)
    }

    fn backend(&self) -> SyncResult<&'a dyn CalendarBackend> {
        self.backend
            .ok_or_else(|| SyncError::Config("No calendar backend configured".into()))
    }
}

/// The state after an apply: what is confirmed to exist remotely.
///
/// Unchanged and newly created events come from the apply report, which also
/// keeps events whose delete failed. Skipped teachers keep their old events.
/// Teachers whose clear failed, or could not run, stay pending.
pub fn next_state(agenda: &Agenda, diff: &AgendaDiff, report: &ApplyReport) -> AgendaState {
    let mut state = AgendaState::new(&agenda.name, agenda.sync_type);

    for outcome in &report.teachers {
        if !outcome.events.is_empty() {
            state.events.insert(outcome.teacher.clone(), outcome.events.clone());
        }
    }
    for (teacher, events) in &diff.carried {
        state.events.insert(teacher.clone(), events.clone());
    }

    state.pending_clear.extend(report.clear_incomplete().cloned());
    state.pending_clear.extend(diff.carried_pending.iter().cloned());
    if !state.pending_clear.is_empty() {
        tracing::warn!(agenda = %agenda.name, teachers = ?state.pending_clear, "clear still pending");
    }

    state
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apply::tests::{Call, FakeBackend};
    use crate::backend::BackendError;
    use crate::state::FileStateRepository;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    const SNAPSHOT: &str = r#"{
        "Anna SMITH": [
            {"day": "Monday", "start": "09:00", "end": "12:00"},
            {"day": "Tuesday", "start": "09:00", "end": "12:00"}
        ]
    }"#;

    fn setup(snapshot: &str) -> (TempDir, Agenda, FileStateRepository) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("snapshot.json");
        std::fs::write(&path, snapshot).unwrap();

        let agenda = Agenda {
            name: "method".to_string(),
            sync_type: SyncType::Recurring,
            snapshots: vec![path],
            template: EventTemplate::new(SyncType::Recurring, "Teaching", chrono_tz::Europe::Zurich)
                .with_today(NaiveDate::from_ymd_opt(2026, 3, 2).unwrap()),
        };
        let states = FileStateRepository::new(dir.path().join("state"));
        (dir, agenda, states)
    }

    fn roster() -> Roster {
        Roster::new([("Anna SMITH".to_string(), "anna@school.ch".to_string())])
    }

    #[tokio::test]
    async fn test_dry_run_makes_no_backend_calls() {
        let (_dir, agenda, states) = setup(SNAPSHOT);
        let backend = FakeBackend::default();
        let engine = Engine::new(&states, roster(), RetryPolicy::none()).with_backend(&backend);

        let outcome = engine.run(&agenda, RunMode::DryRun).await.unwrap();

        assert!(backend.calls().is_empty());
        assert_eq!(outcome.summary().added, 2);
        assert!(states.load("method").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_execute_then_rerun_is_steady() {
        let (_dir, agenda, states) = setup(SNAPSHOT);
        let backend = FakeBackend::default();
        let engine = Engine::new(&states, roster(), RetryPolicy::none()).with_backend(&backend);

        engine.run(&agenda, RunMode::Execute).await.unwrap();
        let state = states.load("method").unwrap().unwrap();
        assert_eq!(state.event_count(), 2);

        let outcome = engine.run(&agenda, RunMode::DryRun).await.unwrap();
        let RunOutcome::Diff(diff) = outcome else {
            panic!("expected a diff");
        };
        assert!(diff.counts().is_steady());
        assert_eq!(diff.counts().unchanged, 2);
    }

    #[tokio::test]
    async fn test_permanent_error_leaves_state_untouched() {
        let (_dir, agenda, states) = setup(SNAPSHOT);
        let backend = FakeBackend::default();
        let engine = Engine::new(&states, roster(), RetryPolicy::none()).with_backend(&backend);
        engine.run(&agenda, RunMode::Execute).await.unwrap();
        let before = states.load("method").unwrap().unwrap();

        std::fs::write(&agenda.snapshots[0], r#"{"Anna SMITH": []}"#).unwrap();
        for event in before.teacher_events(&"anna@school.ch".into()) {
            backend.fail_delete.lock().unwrap().insert(
                event.remote_event_id.clone(),
                BackendError::Permanent("403".into()),
            );
        }

        let err = engine.run(&agenda, RunMode::Execute).await.unwrap_err();

        assert!(matches!(err, SyncError::Backend { .. }));
        assert_eq!(states.load("method").unwrap().unwrap(), before);
    }

    #[tokio::test]
    async fn test_clear_only_removes_state() {
        let (_dir, agenda, states) = setup(SNAPSHOT);
        let backend = FakeBackend::default();
        let engine = Engine::new(&states, roster(), RetryPolicy::none()).with_backend(&backend);
        engine.run(&agenda, RunMode::Execute).await.unwrap();

        let outcome = engine.run(&agenda, RunMode::ClearOnly).await.unwrap();

        assert_eq!(outcome.summary().removed, 2);
        assert!(states.load("method").unwrap().is_none());
        assert!(backend.calls().iter().any(|c| matches!(c, Call::List(_))));
    }

    #[tokio::test]
    async fn test_skipped_teacher_keeps_state_and_needs_attention() {
        let (_dir, agenda, states) = setup(SNAPSHOT);
        let backend = FakeBackend::default();
        let engine = Engine::new(&states, roster(), RetryPolicy::none()).with_backend(&backend);
        engine.run(&agenda, RunMode::Execute).await.unwrap();

        std::fs::write(
            &agenda.snapshots[0],
            r#"{"Anna SMITH": [{"day": "Monday", "start": "9 o'clock", "end": "12:00"}]}"#,
        )
        .unwrap();
        let outcome = engine.run(&agenda, RunMode::Execute).await.unwrap();

        assert!(outcome.needs_attention());
        assert_eq!(outcome.summary().removed, 0);
        assert_eq!(states.load("method").unwrap().unwrap().event_count(), 2);
    }

    #[tokio::test]
    async fn test_failed_bootstrap_clear_is_retried_before_creating() {
        let (_dir, agenda, states) = setup(SNAPSHOT);
        let backend = FakeBackend::default();
        backend.seed("anna@school.ch", "stray", "Teaching");
        backend
            .fail_delete
            .lock()
            .unwrap()
            .insert("stray".to_string(), BackendError::Transient("503".into()));
        let engine = Engine::new(&states, roster(), RetryPolicy::none()).with_backend(&backend);

        let first = engine.run(&agenda, RunMode::Execute).await.unwrap();

        assert!(first.needs_attention());
        let state = states.load("method").unwrap().unwrap();
        assert_eq!(state.event_count(), 0);
        assert!(state.pending_clear.contains(&"anna@school.ch".into()));
        assert!(!backend.calls().iter().any(|c| matches!(c, Call::Create(_))));

        backend.fail_delete.lock().unwrap().clear();
        backend.calls.lock().unwrap().clear();
        let second = engine.run(&agenda, RunMode::Execute).await.unwrap();

        assert!(!second.needs_attention());
        let calls = backend.calls();
        assert_eq!(calls[0], Call::List("anna@school.ch".to_string()));
        assert_eq!(calls[1], Call::Delete("stray".to_string()));
        assert!(calls[2..].iter().all(|c| matches!(c, Call::Create(_))));
        let remote = backend.remote.lock().unwrap();
        assert!(remote["anna@school.ch"].iter().all(|e| e.id != "stray"));
        assert_eq!(remote["anna@school.ch"].len(), 2);
        drop(remote);

        let state = states.load("method").unwrap().unwrap();
        assert_eq!(state.event_count(), 2);
        assert!(state.pending_clear.is_empty());
    }

    #[tokio::test]
    async fn test_sync_type_mismatch_is_state_error() {
        let (_dir, agenda, states) = setup(SNAPSHOT);
        states
            .save("method", &AgendaState::new("method", SyncType::Dated))
            .unwrap();
        let engine = Engine::new(&states, roster(), RetryPolicy::none());

        let err = engine.run(&agenda, RunMode::DryRun).await.unwrap_err();

        assert!(matches!(err, SyncError::State(_)));
    }

    #[tokio::test]
    async fn test_execute_without_backend_is_config_error() {
        let (_dir, agenda, states) = setup(SNAPSHOT);
        let engine = Engine::new(&states, roster(), RetryPolicy::none());

        let err = engine.run(&agenda, RunMode::Execute).await.unwrap_err();

        assert!(matches!(err, SyncError::Config(_)));
    }
}
