//! Apply engine: turns an [`AgendaDiff`] into backend calls.
//!
//! Each teacher is processed in diff order, which puts the delete half of a
//! changed pair before its create half. Transient failures are retried, then
//! recorded per teacher and left out of the next state. A permanent failure
//! aborts the whole run before anything is persisted.

use std::collections::HashSet;
use std::ops::AddAssign;

use serde::Serialize;

use crate::backend::{BackendError, CalendarBackend, DeleteOutcome, RetryPolicy};
use crate::diff::{AgendaDiff, DiffKind, TeacherDiff};
use crate::entry::{ScheduleEntry, SyncType, TeacherId};
use crate::error::{SyncError, SyncResult};
use crate::event_spec::EventTemplate;
use crate::state::SyncedEvent;

/// Confirmed operations for one teacher or a whole agenda.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ApplyCounts {
    pub added: usize,
    pub removed: usize,
    pub changed: usize,
    pub unchanged: usize,
    /// Removals whose event was already missing remotely. Included in `removed`.
    pub already_gone: usize,
    pub failed: usize,
}

impl AddAssign for ApplyCounts {
    fn add_assign(&mut self, other: Self) {
        self.added += other.added;
        self.removed += other.removed;
        self.changed += other.changed;
        self.unchanged += other.unchanged;
        self.already_gone += other.already_gone;
        self.failed += other.failed;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TeacherOutcome {
    pub teacher: TeacherId,
    #[serde(flatten)]
    pub counts: ApplyCounts,
    pub errors: Vec<String>,
    /// What exists remotely for this teacher after the apply.
    #[serde(skip)]
    pub events: Vec<SyncedEvent>,
}

impl TeacherOutcome {
    fn new(teacher: TeacherId) -> Self {
        TeacherOutcome {
            teacher,
            counts: ApplyCounts::default(),
            errors: Vec::new(),
            events: Vec::new(),
        }
    }

    fn fail(&mut self, what: impl std::fmt::Display, error: &BackendError) {
        tracing::warn!(teacher = %self.teacher, %error, "{what} failed");
        self.counts.failed += 1;
        self.errors.push(format!("{what}: {error}"));
    }
}

/// Result of clearing one teacher's calendar.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ClearOutcome {
    pub teacher: TeacherId,
    pub found: usize,
    pub deleted: usize,
    pub failed: usize,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ApplyReport {
    pub agenda: String,
    pub bootstrap: bool,
    /// Clears run before the first create, one entry per teacher. Empty unless
    /// bootstrapping or finishing an earlier incomplete clear.
    pub cleared: Vec<ClearOutcome>,
    pub teachers: Vec<TeacherOutcome>,
}

impl ApplyReport {
    pub fn counts(&self) -> ApplyCounts {
        let mut total = ApplyCounts::default();
        for teacher in &self.teachers {
            total += teacher.counts;
        }
        total
    }

    pub fn failed(&self) -> usize {
        self.counts().failed + self.cleared.iter().map(|c| c.failed).sum::<usize>()
    }

    /// Teachers whose clear did not fully succeed; retried next run.
    pub fn clear_incomplete(&self) -> impl Iterator<Item = &TeacherId> {
        self.cleared.iter().filter(|c| c.failed > 0).map(|c| &c.teacher)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ClearReport {
    pub agenda: String,
    pub teachers: Vec<ClearOutcome>,
}

impl ClearReport {
    pub fn deleted(&self) -> usize {
        self.teachers.iter().map(|t| t.deleted).sum()
    }

    pub fn failed(&self) -> usize {
        self.teachers.iter().map(|t| t.failed).sum()
    }
}

pub struct ApplyEngine<'a> {
    backend: &'a dyn CalendarBackend,
    template: &'a EventTemplate,
    retry: RetryPolicy,
}

impl<'a> ApplyEngine<'a> {
    pub fn new(backend: &'a dyn CalendarBackend, template: &'a EventTemplate, retry: RetryPolicy) -> Self {
        ApplyEngine {
            backend,
            template,
            retry,
        }
    }

    /// Apply every teacher's changes.
    ///
    /// Teachers in [`AgendaDiff::clear_first`] are cleared before the first
    /// create. A teacher whose clear did not fully succeed gets no creates
    /// this run and stays pending, so leftovers are never duplicated.
    pub async fn apply(&self, diff: &AgendaDiff) -> SyncResult<ApplyReport> {
        let mut cleared = Vec::new();
        let mut blocked: HashSet<&TeacherId> = HashSet::new();

        if !diff.clear_first.is_empty() {
            tracing::info!(
                agenda = %diff.agenda,
                bootstrap = diff.bootstrap,
                teachers = diff.clear_first.len(),
                "clearing before first create"
            );
            for teacher in &diff.clear_first {
                let outcome = self.clear_teacher(teacher).await?;
                if outcome.failed > 0 {
                    blocked.insert(teacher);
                }
                cleared.push(outcome);
            }
        }

        let mut teachers = Vec::new();
        for teacher_diff in &diff.teachers {
            let outcome = if blocked.contains(&teacher_diff.teacher) {
                Self::blocked_outcome(teacher_diff)
            } else {
                self.apply_teacher(teacher_diff).await?
            };
            tracing::info!(
                agenda = %diff.agenda,
                teacher = %outcome.teacher,
                added = outcome.counts.added,
                removed = outcome.counts.removed,
                changed = outcome.counts.changed,
                failed = outcome.counts.failed,
                "teacher applied"
            );
            teachers.push(outcome);
        }

        Ok(ApplyReport {
            agenda: diff.agenda.clone(),
            bootstrap: diff.bootstrap,
            cleared,
            teachers,
        })
    }

    /// Delete every event matching the agenda's subject for each teacher.
    pub async fn clear(&self, agenda: &str, teachers: &[TeacherId]) -> SyncResult<ClearReport> {
        let mut outcomes = Vec::new();
        for teacher in teachers {
            let outcome = self.clear_teacher(teacher).await?;
            tracing::info!(agenda, teacher = %teacher, deleted = outcome.deleted, failed = outcome.failed, "teacher cleared");
            outcomes.push(outcome);
        }

        Ok(ClearReport {
            agenda: agenda.to_string(),
            teachers: outcomes,
        })
    }

    async fn apply_teacher(&self, diff: &TeacherDiff) -> SyncResult<TeacherOutcome> {
        let teacher = &diff.teacher;
        let mut outcome = TeacherOutcome::new(teacher.clone());
        outcome.counts.unchanged = diff.unchanged.len();
        outcome.events.extend(diff.unchanged.iter().cloned());

        let creates = diff.changes.iter().any(|c| c.to_create().is_some());
        if creates && self.template.sync_type == SyncType::Dated {
            self.ensure_categories(teacher).await;
        }

        for change in &diff.changes {
            match change.kind {
                DiffKind::Remove => {
                    let Some(old) = change.to_delete() else { continue };
                    match self.delete(teacher, &old.remote_event_id).await {
                        Ok(deleted) => {
                            outcome.counts.removed += 1;
                            if deleted == DeleteOutcome::AlreadyGone {
                                outcome.counts.already_gone += 1;
                            }
                        }
                        Err(e) => {
                            let e = abort_if_fatal(teacher, e)?;
                            outcome.fail(format_args!("remove {}", old.entry), &e);
                            // Still exists remotely: retried next run.
                            outcome.events.push(old.clone());
                        }
                    }
                }
                DiffKind::Add => {
                    let Some(entry) = change.to_create() else { continue };
                    match self.create(teacher, entry).await {
                        Ok(synced) => {
                            outcome.counts.added += 1;
                            outcome.events.push(synced);
                        }
                        Err(e) => {
                            let e = abort_if_fatal(teacher, e)?;
                            outcome.fail(format_args!("add {entry}"), &e);
                        }
                    }
                }
                DiffKind::Change => {
                    let (Some(old), Some(entry)) = (change.to_delete(), change.to_create()) else {
                        continue;
                    };
                    if let Err(e) = self.delete(teacher, &old.remote_event_id).await {
                        let e = abort_if_fatal(teacher, e)?;
                        outcome.fail(format_args!("change {} (delete)", old.entry), &e);
                        outcome.events.push(old.clone());
                        continue;
                    }
                    match self.create(teacher, entry).await {
                        Ok(synced) => {
                            outcome.counts.changed += 1;
                            outcome.events.push(synced);
                        }
                        Err(e) => {
                            let e = abort_if_fatal(teacher, e)?;
                            outcome.fail(format_args!("change {entry} (create)"), &e);
                        }
                    }
                }
            }
        }

        Ok(outcome)
    }

    fn blocked_outcome(diff: &TeacherDiff) -> TeacherOutcome {
        let mut outcome = TeacherOutcome::new(diff.teacher.clone());
        outcome.counts.failed = diff.changes.len();
        outcome
            .errors
            .push("clear incomplete, changes postponed".to_string());
        // Nothing was deleted, so every old event is still there.
        outcome.events.extend(diff.unchanged.iter().cloned());
        outcome
            .events
            .extend(diff.changes.iter().filter_map(|c| c.to_delete()).cloned());
        outcome
    }

    async fn clear_teacher(&self, teacher: &TeacherId) -> SyncResult<ClearOutcome> {
        let prefix = self.template.subject_prefix();
        let mut outcome = ClearOutcome {
            teacher: teacher.clone(),
            ..ClearOutcome::default()
        };

        let events = match self
            .retry
            .run("list_events", || self.backend.list_events(teacher, prefix))
            .await
        {
            Ok(events) => events,
            Err(e) => {
                let e = abort_if_fatal(teacher, e)?;
                tracing::warn!(teacher = %teacher, error = %e, "could not list events");
                outcome.failed += 1;
                outcome.errors.push(format!("list events: {e}"));
                return Ok(outcome);
            }
        };

        outcome.found = events.len();
        for event in events {
            match self.delete(teacher, &event.id).await {
                Ok(_) => outcome.deleted += 1,
                Err(e) => {
                    let e = abort_if_fatal(teacher, e)?;
                    tracing::warn!(teacher = %teacher, remote_id = %event.id, error = %e, "could not clear event");
                    outcome.failed += 1;
                    outcome
                        .errors
                        .push(format!("delete '{}' ({}): {e}", event.subject, event.id));
                }
            }
        }

        Ok(outcome)
    }

    async fn ensure_categories(&self, teacher: &TeacherId) {
        let categories = self.template.categories();
        let result = self
            .retry
            .run("ensure_categories", || {
                self.backend.ensure_categories(teacher, &categories)
            })
            .await;

        if let Err(e) = result {
            tracing::warn!(teacher = %teacher, error = %e, "could not provision categories");
        }
    }

    async fn delete(&self, teacher: &TeacherId, remote_id: &str) -> Result<DeleteOutcome, BackendError> {
        let result = self
            .retry
            .run("delete_event", || self.backend.delete_event(teacher, remote_id))
            .await;
        let outcome = DeleteOutcome::from_result(result)?;
        tracing::debug!(teacher = %teacher, remote_id, ?outcome, "deleted");
        Ok(outcome)
    }

    async fn create(&self, teacher: &TeacherId, entry: &ScheduleEntry) -> Result<SyncedEvent, BackendError> {
        let spec = self.template.build(entry);
        let remote_event_id = self
            .retry
            .run("create_event", || self.backend.create_event(teacher, &spec))
            .await?;
        tracing::debug!(teacher = %teacher, remote_id = %remote_event_id, %entry, "created");

        Ok(SyncedEvent {
            remote_event_id,
            entry: entry.clone(),
            subject: spec.subject,
            category: spec.category.map(|c| c.name),
        })
    }
}

/// Permanent errors end the run; anything else is returned for recording.
fn abort_if_fatal(teacher: &TeacherId, error: BackendError) -> SyncResult<BackendError> {
    if error.is_fatal() {
        return Err(SyncError::Backend {
            teacher: teacher.to_string(),
            source: error,
        });
    }
    Ok(error)
}
