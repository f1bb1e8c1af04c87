//! Schedule snapshots produced by the scraper.
//!
//! A snapshot file maps raw teacher names to lists of entries. Loading one
//! resolves every name to a [`TeacherId`], merges teachers that appear under
//! several names or in several files, and deduplicates each teacher's entries
//! by slot key (first occurrence wins). Malformed entries only knock out the
//! teacher they belong to.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::Value;

use crate::entry::{ScheduleEntry, SyncType, TeacherId, first_per_slot};
use crate::error::{SyncError, SyncResult};

/// Teacher id -> deduplicated entries, in first-seen order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TeacherSchedule {
    entries: BTreeMap<TeacherId, Vec<ScheduleEntry>>,
}

impl TeacherSchedule {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append entries for a teacher, dropping any whose slot is already taken.
    pub fn insert(&mut self, teacher: TeacherId, entries: impl IntoIterator<Item = ScheduleEntry>) {
        let existing = self.entries.remove(&teacher).unwrap_or_default();
        let merged = first_per_slot(existing.into_iter().chain(entries), ScheduleEntry::slot_key);
        self.entries.insert(teacher, merged);
    }

    pub fn get(&self, teacher: &TeacherId) -> Option<&[ScheduleEntry]> {
        self.entries.get(teacher).map(Vec::as_slice)
    }

    pub fn teachers(&self) -> impl Iterator<Item = &TeacherId> {
        self.entries.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&TeacherId, &[ScheduleEntry])> {
        self.entries.iter().map(|(t, e)| (t, e.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entry_count(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }
}

impl FromIterator<(TeacherId, Vec<ScheduleEntry>)> for TeacherSchedule {
    fn from_iter<I: IntoIterator<Item = (TeacherId, Vec<ScheduleEntry>)>>(iter: I) -> Self {
        let mut schedule = TeacherSchedule::new();
        for (teacher, entries) in iter {
            schedule.insert(teacher, entries);
        }
        schedule
    }
}

/// A teacher left out of this run because their snapshot data was unusable.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedTeacher {
    pub teacher: TeacherId,
    pub raw_name: String,
    pub reason: String,
}

/// A loaded snapshot plus what could not be used.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub schedule: TeacherSchedule,
    pub skipped: Vec<SkippedTeacher>,
    pub unresolved: Vec<String>,
}

impl Snapshot {
    /// Read and merge snapshot files in order.
    pub fn load(
        paths: &[PathBuf],
        sync_type: SyncType,
        resolve: impl Fn(&str) -> Option<TeacherId>,
    ) -> SyncResult<Self> {
        let mut raw = Vec::new();
        for path in paths {
            raw.extend(read_snapshot_file(path)?);
        }
        Ok(Self::from_raw(raw, sync_type, resolve))
    }

    /// Build a snapshot from raw `(name, entries)` pairs.
    pub fn from_raw(
        raw: Vec<(String, Value)>,
        sync_type: SyncType,
        resolve: impl Fn(&str) -> Option<TeacherId>,
    ) -> Self {
        let mut parsed: Vec<(TeacherId, Vec<ScheduleEntry>)> = Vec::new();
        let mut skipped: Vec<SkippedTeacher> = Vec::new();
        let mut unresolved = Vec::new();

        for (raw_name, value) in raw {
            let Some(teacher) = resolve(&raw_name) else {
                tracing::debug!(raw_name = %raw_name, "unresolved teacher name");
                unresolved.push(raw_name);
                continue;
            };

            match parse_entries(value, sync_type) {
                Ok(entries) => parsed.push((teacher, entries)),
                Err(reason) => {
                    tracing::warn!(teacher = %teacher, raw_name = %raw_name, %reason, "skipping teacher");
                    skipped.push(SkippedTeacher {
                        teacher,
                        raw_name,
                        reason,
                    });
                }
            }
        }

        // A teacher with any unusable source is skipped as a whole, so a
        // partial schedule never gets diffed as if it were complete.
        let skipped_ids: HashSet<TeacherId> = skipped.iter().map(|s| s.teacher.clone()).collect();
        let schedule = parsed
            .into_iter()
            .filter(|(teacher, _)| !skipped_ids.contains(teacher))
            .collect();

        Snapshot {
            schedule,
            skipped,
            unresolved,
        }
    }

    pub fn is_skipped(&self, teacher: &TeacherId) -> bool {
        self.skipped.iter().any(|s| &s.teacher == teacher)
    }

    /// Entry counts per activity code (dated snapshots only).
    pub fn activity_breakdown(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for (_, entries) in self.schedule.iter() {
            for code in entries.iter().filter_map(ScheduleEntry::activity_code) {
                *counts.entry(code.to_string()).or_insert(0) += 1;
            }
        }
        counts
    }
}

fn read_snapshot_file(path: &Path) -> SyncResult<Vec<(String, Value)>> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| SyncError::Snapshot(format!("Could not read {}: {e}", path.display())))?;

    let value: Value = serde_json::from_str(&content)
        .map_err(|e| SyncError::Snapshot(format!("Invalid JSON in {}: {e}", path.display())))?;

    match value {
        Value::Object(map) => Ok(map.into_iter().collect()),
        _ => Err(SyncError::Snapshot(format!(
            "{} must contain an object of teacher -> entries",
            path.display()
        ))),
    }
}

fn parse_entries(value: Value, sync_type: SyncType) -> Result<Vec<ScheduleEntry>, String> {
    let Value::Array(items) = value else {
        return Err("entries must be a list".to_string());
    };

    items
        .into_iter()
        .enumerate()
        .map(|(i, item)| {
            let entry: ScheduleEntry =
                serde_json::from_value(item).map_err(|e| format!("entry {i}: {e}"))?;
            if entry.sync_type() != sync_type {
                return Err(format!(
                    "entry {i}: {} entry in a {sync_type} agenda",
                    entry.sync_type()
                ));
            }
            entry.validate().map_err(|e| format!("entry {i}: {e}"))?;
            Ok(entry)
        })
        .collect()
}

/// Raw schedule name -> teacher id lookup.
///
/// Resolution is a pure function of the roster: names are compared after
/// trimming, collapsing inner whitespace and lowercasing. An empty roster
/// passes names through unchanged, for snapshots already keyed by teacher id.
#[derive(Debug, Clone, Default)]
pub struct Roster {
    aliases: HashMap<String, TeacherId>,
}

impl Roster {
    pub fn new(aliases: impl IntoIterator<Item = (String, String)>) -> Self {
        Roster {
            aliases: aliases
                .into_iter()
                .map(|(name, id)| (normalize_name(&name), TeacherId::new(id)))
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.aliases.is_empty()
    }

    pub fn resolve(&self, raw_name: &str) -> Option<TeacherId> {
        let trimmed = raw_name.trim();
        if trimmed.is_empty() {
            return None;
        }
        if self.aliases.is_empty() {
            return Some(TeacherId::new(trimmed));
        }
        self.aliases.get(&normalize_name(trimmed)).cloned()
    }
}

fn normalize_name(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}
