//! Agenda-wide diff: every teacher known from the state or the snapshot.

use std::collections::{BTreeMap, BTreeSet};
use std::ops::AddAssign;

use serde::Serialize;

use crate::diff::TeacherDiff;
use crate::entry::{SyncType, TeacherId};
use crate::snapshot::{SkippedTeacher, Snapshot};
use crate::state::{AgendaState, SyncedEvent};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DiffCounts {
    pub added: usize,
    pub removed: usize,
    pub changed: usize,
    pub unchanged: usize,
}

impl DiffCounts {
    /// Steady state: nothing to add, remove or change.
    pub fn is_steady(&self) -> bool {
        self.added == 0 && self.removed == 0 && self.changed == 0
    }
}

impl AddAssign for DiffCounts {
    fn add_assign(&mut self, other: Self) {
        self.added += other.added;
        self.removed += other.removed;
        self.changed += other.changed;
        self.unchanged += other.unchanged;
    }
}

/// The differences between an agenda's synced state and its new snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct AgendaDiff {
    pub agenda: String,
    pub sync_type: SyncType,
    /// No prior state: the remote gets a bulk clear before anything is created.
    pub bootstrap: bool,
    pub teachers: Vec<TeacherDiff>,
    pub skipped: Vec<SkippedTeacher>,
    pub unresolved: Vec<String>,
    pub activity_breakdown: BTreeMap<String, usize>,
    /// Teachers whose remote calendars are cleared before anything is created
    /// for them: everyone on bootstrap, later only those whose clear failed.
    pub clear_first: BTreeSet<TeacherId>,
    /// Synced events of skipped teachers, kept in the next state untouched.
    #[serde(skip)]
    pub carried: BTreeMap<TeacherId, Vec<SyncedEvent>>,
    /// Skipped teachers still owed a clear.
    #[serde(skip)]
    pub carried_pending: BTreeSet<TeacherId>,
}

impl AgendaDiff {
    pub fn compute(
        agenda: &str,
        sync_type: SyncType,
        old: Option<&AgendaState>,
        snapshot: &Snapshot,
    ) -> Self {
        let mut all_teachers: BTreeSet<&TeacherId> = snapshot.schedule.teachers().collect();
        if let Some(state) = old {
            all_teachers.extend(state.events.keys());
            all_teachers.extend(state.pending_clear.iter());
        }
        all_teachers.extend(snapshot.skipped.iter().map(|s| &s.teacher));

        let needs_clear = |teacher: &TeacherId| match old {
            None => true,
            Some(state) => state.pending_clear.contains(teacher),
        };

        let mut teachers = Vec::new();
        let mut clear_first = BTreeSet::new();
        let mut carried = BTreeMap::new();
        let mut carried_pending = BTreeSet::new();

        for teacher in all_teachers {
            let old_events = old.map(|s| s.teacher_events(teacher)).unwrap_or_default();

            if snapshot.is_skipped(teacher) {
                if !old_events.is_empty() {
                    carried.insert(teacher.clone(), old_events.to_vec());
                }
                if needs_clear(teacher) {
                    carried_pending.insert(teacher.clone());
                }
                continue;
            }

            if needs_clear(teacher) {
                clear_first.insert(teacher.clone());
            }

            let new_entries = snapshot.schedule.get(teacher).unwrap_or_default();
            let diff = TeacherDiff::compute(teacher.clone(), old_events, new_entries);
            tracing::debug!(agenda, teacher = %teacher, counts = ?diff.counts(), "teacher diff");
            teachers.push(diff);
        }

        let activity_breakdown = match sync_type {
            SyncType::Dated => snapshot.activity_breakdown(),
            SyncType::Recurring => BTreeMap::new(),
        };

        AgendaDiff {
            agenda: agenda.to_string(),
            sync_type,
            bootstrap: old.is_none(),
            teachers,
            skipped: snapshot.skipped.clone(),
            unresolved: snapshot.unresolved.clone(),
            activity_breakdown,
            clear_first,
            carried,
            carried_pending,
        }
    }

    pub fn counts(&self) -> DiffCounts {
        let mut total = DiffCounts::default();
        for teacher in &self.teachers {
            total += teacher.counts();
        }
        total
    }

    pub fn is_empty(&self) -> bool {
        self.teachers.iter().all(TeacherDiff::is_empty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::{RecurringEntry, ScheduleEntry, hhmm};
    use crate::snapshot::TeacherSchedule;
    use chrono::Weekday;

    fn weekly(day: Weekday, start: &str, end: &str) -> ScheduleEntry {
        ScheduleEntry::Recurring(RecurringEntry {
            weekday: day,
            start: hhmm::parse(start).unwrap(),
            end: hhmm::parse(end).unwrap(),
        })
    }

    fn state_with(teacher: &str, events: Vec<(&str, ScheduleEntry)>) -> AgendaState {
        let mut state = AgendaState::new("sfs", SyncType::Recurring);
        state.events.insert(
            teacher.into(),
            events
                .into_iter()
                .map(|(id, entry)| SyncedEvent {
                    remote_event_id: id.to_string(),
                    entry,
                    subject: "Teaching".to_string(),
                    category: None,
                })
                .collect(),
        );
        state
    }

    fn snapshot_of(teacher: &str, entries: Vec<ScheduleEntry>) -> Snapshot {
        Snapshot {
            schedule: TeacherSchedule::from_iter([(TeacherId::from(teacher), entries)]),
            ..Snapshot::default()
        }
    }

    #[test]
    fn test_no_prior_state_is_bootstrap_all_added() {
        let snapshot = snapshot_of(
            "anna@school.ch",
            vec![
                weekly(Weekday::Mon, "09:00", "12:00"),
                weekly(Weekday::Tue, "09:00", "12:00"),
                weekly(Weekday::Wed, "09:00", "12:00"),
            ],
        );

        let diff = AgendaDiff::compute("sfs", SyncType::Recurring, None, &snapshot);

        assert!(diff.bootstrap);
        assert_eq!(
            diff.counts(),
            DiffCounts {
                added: 3,
                removed: 0,
                changed: 0,
                unchanged: 0
            }
        );
    }

    #[test]
    fn test_teacher_missing_from_snapshot_is_all_removed() {
        let state = state_with("ben@school.ch", vec![("e1", weekly(Weekday::Mon, "09:00", "12:00"))]);
        let snapshot = snapshot_of("anna@school.ch", vec![weekly(Weekday::Fri, "09:00", "12:00")]);

        let diff = AgendaDiff::compute("sfs", SyncType::Recurring, Some(&state), &snapshot);

        assert!(!diff.bootstrap);
        assert_eq!(diff.teachers.len(), 2);
        let counts = diff.counts();
        assert_eq!((counts.added, counts.removed), (1, 1));
    }

    #[test]
    fn test_pending_clear_survives_later_runs() {
        let mut state = state_with("anna@school.ch", vec![]);
        state.pending_clear.insert("anna@school.ch".into());
        state.pending_clear.insert("ben@school.ch".into());
        let snapshot = Snapshot {
            schedule: TeacherSchedule::from_iter([(
                TeacherId::from("anna@school.ch"),
                vec![weekly(Weekday::Mon, "09:00", "12:00")],
            )]),
            skipped: vec![SkippedTeacher {
                teacher: "ben@school.ch".into(),
                raw_name: "Ben SMITH".to_string(),
                reason: "entry 0: invalid time".to_string(),
            }],
            ..Snapshot::default()
        };

        let diff = AgendaDiff::compute("sfs", SyncType::Recurring, Some(&state), &snapshot);

        assert!(!diff.bootstrap);
        assert_eq!(diff.clear_first, BTreeSet::from([TeacherId::from("anna@school.ch")]));
        assert_eq!(diff.carried_pending, BTreeSet::from([TeacherId::from("ben@school.ch")]));
    }

    #[test]
    fn test_skipped_teacher_is_carried_not_removed() {
        let state = state_with("ben@school.ch", vec![("e1", weekly(Weekday::Mon, "09:00", "12:00"))]);
        let snapshot = Snapshot {
            skipped: vec![SkippedTeacher {
                teacher: "ben@school.ch".into(),
                raw_name: "Ben SMITH".to_string(),
                reason: "entry 0: invalid time".to_string(),
            }],
            ..Snapshot::default()
        };

        let diff = AgendaDiff::compute("sfs", SyncType::Recurring, Some(&state), &snapshot);

        assert!(diff.teachers.is_empty());
        assert!(diff.counts().is_steady());
        assert_eq!(diff.carried[&TeacherId::from("ben@school.ch")].len(), 1);
    }
}
