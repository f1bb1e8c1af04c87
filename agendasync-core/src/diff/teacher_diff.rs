//! Per-teacher set difference between synced events and the snapshot.

use std::collections::HashMap;

use serde::Serialize;

use crate::diff::{DiffCounts, DiffKind, EntryDiff};
use crate::entry::{ScheduleEntry, SlotKey, TeacherId, first_per_slot};
use crate::state::SyncedEvent;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TeacherDiff {
    pub teacher: TeacherId,
    pub changes: Vec<EntryDiff>,
    /// Synced events that stay as they are, remote ids untouched.
    pub unchanged: Vec<SyncedEvent>,
}

impl TeacherDiff {
    /// Diff one teacher's synced events against their new entries.
    ///
    /// Old events are matched first-occurrence-wins by slot key. Extra old
    /// events sharing a key still exist remotely, so they are removed rather
    /// than forgotten.
    pub fn compute(teacher: TeacherId, old: &[SyncedEvent], new: &[ScheduleEntry]) -> Self {
        let new = first_per_slot(new.iter(), |e| e.slot_key());
        let new_by_key: HashMap<SlotKey, &ScheduleEntry> =
            new.iter().map(|e| (e.slot_key(), *e)).collect();

        let mut old_by_key: HashMap<SlotKey, &SyncedEvent> = HashMap::new();
        let mut changes = Vec::new();
        let mut unchanged = Vec::new();

        for synced in old {
            let key = synced.entry.slot_key();
            if old_by_key.contains_key(&key) {
                changes.extend(EntryDiff::get_diff(Some(synced.clone()), None));
                continue;
            }
            old_by_key.insert(key.clone(), synced);

            match new_by_key.get(&key) {
                None => changes.extend(EntryDiff::get_diff(Some(synced.clone()), None)),
                Some(entry) => {
                    match EntryDiff::get_diff(Some(synced.clone()), Some((*entry).clone())) {
                        Some(diff) => changes.push(diff),
                        None => unchanged.push(synced.clone()),
                    }
                }
            }
        }

        for entry in &new {
            if !old_by_key.contains_key(&entry.slot_key()) {
                changes.extend(EntryDiff::get_diff(None, Some((*entry).clone())));
            }
        }

        TeacherDiff {
            teacher,
            changes,
            unchanged,
        }
    }

    pub fn counts(&self) -> DiffCounts {
        let mut counts = DiffCounts {
            unchanged: self.unchanged.len(),
            ..DiffCounts::default()
        };
        for diff in &self.changes {
            match diff.kind {
                DiffKind::Add => counts.added += 1,
                DiffKind::Change => counts.changed += 1,
                DiffKind::Remove => counts.removed += 1,
            }
        }
        counts
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}
