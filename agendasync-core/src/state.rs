//! Persisted record of what was last pushed to the remote calendars.
//!
//! One JSON file per agenda. The file is the only place remote event ids are
//! remembered: without it the next run falls back to a bootstrap sync.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entry::{ScheduleEntry, SyncType, TeacherId};
use crate::error::{SyncError, SyncResult};

/// A schedule entry that exists on the remote calendar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncedEvent {
    #[serde(alias = "outlook_event_id")]
    pub remote_event_id: String,
    #[serde(flatten)]
    pub entry: ScheduleEntry,
    pub subject: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

/// Everything synced for one agenda at `synced_at`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgendaState {
    pub synced_at: DateTime<Utc>,
    pub agenda: String,
    pub sync_type: SyncType,
    pub events: BTreeMap<TeacherId, Vec<SyncedEvent>>,
    /// Teachers whose bootstrap clear did not finish. Their calendars are
    /// cleared again before anything is created for them.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub pending_clear: BTreeSet<TeacherId>,
}

impl AgendaState {
    pub fn new(agenda: &str, sync_type: SyncType) -> Self {
        AgendaState {
            synced_at: Utc::now(),
            agenda: agenda.to_string(),
            sync_type,
            events: BTreeMap::new(),
            pending_clear: BTreeSet::new(),
        }
    }

    pub fn teacher_events(&self, teacher: &TeacherId) -> &[SyncedEvent] {
        self.events.get(teacher).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn teacher_count(&self) -> usize {
        self.events.len()
    }

    pub fn event_count(&self) -> usize {
        self.events.values().map(Vec::len).sum()
    }
}

/// Storage for agenda states, one record per agenda.
pub trait StateRepository: Send + Sync {
    /// `Ok(None)` when the agenda has never been synced.
    fn load(&self, agenda: &str) -> SyncResult<Option<AgendaState>>;

    /// Replace the stored state. Errors are [`SyncError::StatePersist`].
    fn save(&self, agenda: &str, state: &AgendaState) -> SyncResult<()>;

    /// Forget the agenda so the next run bootstraps.
    fn remove(&self, agenda: &str) -> SyncResult<()>;
}

/// Stores each agenda as `<dir>/<agenda-slug>.json`.
#[derive(Debug, Clone)]
pub struct FileStateRepository {
    dir: PathBuf,
}

impl FileStateRepository {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        FileStateRepository { dir: dir.into() }
    }

    pub fn path_for(&self, agenda: &str) -> PathBuf {
        self.dir.join(format!("{}.json", slug::slugify(agenda)))
    }

    fn write_and_verify(&self, path: &Path, state: &AgendaState) -> Result<(), String> {
        std::fs::create_dir_all(&self.dir)
            .map_err(|e| format!("could not create {}: {e}", self.dir.display()))?;

        let content = serde_json::to_string_pretty(state).map_err(|e| e.to_string())?;
        let temp = path.with_extension("json.tmp");

        std::fs::write(&temp, &content)
            .map_err(|e| format!("could not write {}: {e}", temp.display()))?;

        // The previous state is only replaced by a file that reads back intact.
        if let Err(reason) = Self::verify(&temp, state) {
            let _ = std::fs::remove_file(&temp);
            return Err(reason);
        }

        std::fs::rename(&temp, path)
            .map_err(|e| format!("could not replace {}: {e}", path.display()))
    }

    fn verify(path: &Path, state: &AgendaState) -> Result<(), String> {
        let written = std::fs::read_to_string(path)
            .map_err(|e| format!("could not read back {}: {e}", path.display()))?;
        let reloaded: AgendaState = serde_json::from_str(&written)
            .map_err(|e| format!("{} does not parse after writing: {e}", path.display()))?;
        if &reloaded != state {
            return Err(format!("{} does not match what was written", path.display()));
        }
        Ok(())
    }
}

impl StateRepository for FileStateRepository {
    fn load(&self, agenda: &str) -> SyncResult<Option<AgendaState>> {
        let path = self.path_for(agenda);
        if !path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(&path)?;
        let state: AgendaState = serde_json::from_str(&content)
            .map_err(|e| SyncError::State(format!("Invalid state file {}: {e}", path.display())))?;
        Ok(Some(state))
    }

    fn save(&self, agenda: &str, state: &AgendaState) -> SyncResult<()> {
        let path = self.path_for(agenda);
        self.write_and_verify(&path, state)
            .map_err(|reason| SyncError::StatePersist {
                agenda: agenda.to_string(),
                reason,
            })?;
        tracing::debug!(agenda, path = %path.display(), events = state.event_count(), "state saved");
        Ok(())
    }

    fn remove(&self, agenda: &str) -> SyncResult<()> {
        let path = self.path_for(agenda);
        if path.exists() {
            std::fs::remove_file(&path)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::{ActivityCode, DatedEntry, RecurringEntry};
    use chrono::{NaiveDate, NaiveTime, Weekday};

    fn recurring_event(id: &str) -> SyncedEvent {
        SyncedEvent {
            remote_event_id: id.to_string(),
            entry: ScheduleEntry::Recurring(RecurringEntry {
                weekday: Weekday::Mon,
                start: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
                end: NaiveTime::from_hms_opt(12, 0, 0).unwrap(),
            }),
            subject: "Teaching".to_string(),
            category: None,
        }
    }

    #[test]
    fn test_synced_event_json_shape() {
        let json = serde_json::to_value(recurring_event("AAMk-1")).unwrap();

        assert_eq!(json["remote_event_id"], "AAMk-1");
        assert_eq!(json["weekday"], "Monday");
        assert_eq!(json["start"], "09:00");
        assert_eq!(json["end"], "12:00");
        assert_eq!(json["subject"], "Teaching");
        assert!(json.get("category").is_none());
    }

    #[test]
    fn test_dated_synced_event_reads_legacy_field_names() {
        let event: SyncedEvent = serde_json::from_str(
            r#"{"outlook_event_id": "AAMk-2", "date": "2026-03-02", "start": "10:00",
                "end": "11:00", "type": "JPR", "subject": "Private: JPR - Junior Private",
                "online": false}"#,
        )
        .unwrap();

        assert_eq!(event.remote_event_id, "AAMk-2");
        assert_eq!(
            event.entry,
            ScheduleEntry::Dated(DatedEntry {
                date: NaiveDate::from_ymd_opt(2026, 3, 2).unwrap(),
                start: NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
                end: NaiveTime::from_hms_opt(11, 0, 0).unwrap(),
                activity_code: ActivityCode::Jpr,
                label: String::new(),
                is_remote: false,
            })
        );
    }

    #[test]
    fn test_missing_state_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let repo = FileStateRepository::new(dir.path());

        assert!(repo.load("sfs_lausanne").unwrap().is_none());
    }

    #[test]
    fn test_save_replaces_previous_state() {
        let dir = tempfile::tempdir().unwrap();
        let repo = FileStateRepository::new(dir.path().join("state"));

        let mut first = AgendaState::new("sfs_lausanne", SyncType::Recurring);
        first
            .events
            .insert("anna@school.ch".into(), vec![recurring_event("AAMk-1")]);
        repo.save("sfs_lausanne", &first).unwrap();

        let mut second = AgendaState::new("sfs_lausanne", SyncType::Recurring);
        second
            .events
            .insert("ben@school.ch".into(), vec![recurring_event("AAMk-9")]);
        repo.save("sfs_lausanne", &second).unwrap();

        let loaded = repo.load("sfs_lausanne").unwrap().unwrap();
        assert_eq!(loaded, second);
        assert!(loaded.teacher_events(&"anna@school.ch".into()).is_empty());
        assert!(!repo.path_for("sfs_lausanne").with_extension("json.tmp").exists());
    }

    #[test]
    fn test_state_that_does_not_read_back_keeps_previous_file() {
        let dir = tempfile::tempdir().unwrap();
        let repo = FileStateRepository::new(dir.path());
        let mut good = AgendaState::new("method", SyncType::Recurring);
        good.events
            .insert("anna@school.ch".into(), vec![recurring_event("AAMk-1")]);
        repo.save("method", &good).unwrap();

        // Seconds are not part of the file format, so this cannot read back equal.
        let mut bad_event = recurring_event("AAMk-2");
        bad_event.entry = ScheduleEntry::Recurring(RecurringEntry {
            weekday: Weekday::Mon,
            start: NaiveTime::from_hms_opt(9, 0, 30).unwrap(),
            end: NaiveTime::from_hms_opt(12, 0, 0).unwrap(),
        });
        let mut bad = AgendaState::new("method", SyncType::Recurring);
        bad.events.insert("anna@school.ch".into(), vec![bad_event]);

        let err = repo.save("method", &bad).unwrap_err();

        assert!(matches!(err, SyncError::StatePersist { .. }));
        assert_eq!(repo.load("method").unwrap().unwrap(), good);
        assert!(!repo.path_for("method").with_extension("json.tmp").exists());
    }

    #[test]
    fn test_pending_clear_round_trips_and_defaults_empty() {
        let dir = tempfile::tempdir().unwrap();
        let repo = FileStateRepository::new(dir.path());
        let mut state = AgendaState::new("method", SyncType::Recurring);
        state.pending_clear.insert("anna@school.ch".into());

        repo.save("method", &state).unwrap();

        assert_eq!(repo.load("method").unwrap().unwrap(), state);
        let legacy: AgendaState = serde_json::from_str(
            r#"{"synced_at": "2026-03-02T08:00:00Z", "agenda": "method",
                "sync_type": "recurring", "events": {}}"#,
        )
        .unwrap();
        assert!(legacy.pending_clear.is_empty());
    }

    #[test]
    fn test_corrupt_state_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let repo = FileStateRepository::new(dir.path());
        std::fs::write(repo.path_for("sfs_lausanne"), "{ not json").unwrap();

        assert!(matches!(repo.load("sfs_lausanne"), Err(SyncError::State(_))));
    }

    #[test]
    fn test_save_failure_is_state_persist_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("state");
        std::fs::write(&blocker, "a file where the directory should be").unwrap();
        let repo = FileStateRepository::new(&blocker);

        let err = repo
            .save("sfs_lausanne", &AgendaState::new("sfs_lausanne", SyncType::Recurring))
            .unwrap_err();

        assert!(matches!(err, SyncError::StatePersist { .. }));
    }

    #[test]
    fn test_remove_forgets_agenda() {
        let dir = tempfile::tempdir().unwrap();
        let repo = FileStateRepository::new(dir.path());
        repo.save("vip", &AgendaState::new("vip", SyncType::Dated)).unwrap();

        repo.remove("vip").unwrap();

        assert!(repo.load("vip").unwrap().is_none());
    }
}
