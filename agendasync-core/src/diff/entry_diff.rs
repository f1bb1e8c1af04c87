use std::fmt;

use serde::Serialize;

use crate::diff::DiffKind;
use crate::entry::ScheduleEntry;
use crate::state::SyncedEvent;

/// One slot that differs between the synced state and the snapshot.
///
/// A change keeps both sides: the apply engine deletes `old` and then
/// creates `new`, but the slot is counted once.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntryDiff {
    pub kind: DiffKind,
    pub old: Option<SyncedEvent>,
    pub new: Option<ScheduleEntry>,
}

impl fmt::Display for EntryDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.kind, &self.old, &self.new) {
            (DiffKind::Change, Some(old), Some(new)) => {
                write!(f, "{}: {} -> {}", self.kind, old.entry, new)
            }
            _ => write!(f, "{}: {}", self.kind, self.entry()),
        }
    }
}

impl EntryDiff {
    pub fn get_diff(old: Option<SyncedEvent>, new: Option<ScheduleEntry>) -> Option<EntryDiff> {
        match (&old, &new) {
            (None, Some(_)) => Some(EntryDiff {
                kind: DiffKind::Add,
                old: None,
                new,
            }),
            (Some(_), None) => Some(EntryDiff {
                kind: DiffKind::Remove,
                old,
                new: None,
            }),
            (Some(synced), Some(entry)) => {
                if synced.entry.same_attributes(entry) {
                    None
                } else {
                    Some(EntryDiff {
                        kind: DiffKind::Change,
                        old,
                        new,
                    })
                }
            }
            (None, None) => None,
        }
    }

    /// The entry this diff is about (prefer new, fallback to old).
    pub fn entry(&self) -> &ScheduleEntry {
        match (&self.new, &self.old) {
            (Some(new), _) => new,
            (None, Some(old)) => &old.entry,
            (None, None) => unreachable!("EntryDiff is only built with at least one side"),
        }
    }

    /// The remote event to delete, for removals and the first half of changes.
    pub fn to_delete(&self) -> Option<&SyncedEvent> {
        self.old.as_ref()
    }

    /// The entry to create, for additions and the second half of changes.
    pub fn to_create(&self) -> Option<&ScheduleEntry> {
        self.new.as_ref()
    }
}
