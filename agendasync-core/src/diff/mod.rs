//! Diff types for reconciling synced state with a schedule snapshot.

mod agenda_diff;
mod diff_kind;
mod entry_diff;
mod teacher_diff;

pub use agenda_diff::{AgendaDiff, DiffCounts};
pub use diff_kind::DiffKind;
pub use entry_diff::EntryDiff;
pub use teacher_diff::TeacherDiff;
