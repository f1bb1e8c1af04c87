//! JSON run reports, one file per agenda run.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::engine::{RunMode, RunOutcome, RunSummary};
use crate::error::SyncResult;

#[derive(Debug, Serialize)]
pub struct RunReport<'a> {
    pub run_id: Uuid,
    pub agenda: &'a str,
    pub mode: RunMode,
    pub finished_at: DateTime<Utc>,
    pub summary: RunSummary,
    pub outcome: &'a RunOutcome,
}

impl<'a> RunReport<'a> {
    pub fn new(agenda: &'a str, mode: RunMode, outcome: &'a RunOutcome) -> Self {
        RunReport {
            run_id: Uuid::new_v4(),
            agenda,
            mode,
            finished_at: Utc::now(),
            summary: outcome.summary(),
            outcome,
        }
    }

    /// `<dir>/<agenda>_<timestamp>.json`
    pub fn file_name(&self) -> String {
        format!(
            "{}_{}.json",
            slug::slugify(self.agenda),
            self.finished_at.format("%Y%m%d_%H%M%S")
        )
    }

    pub fn write(&self, dir: &Path) -> SyncResult<PathBuf> {
        std::fs::create_dir_all(dir)?;

        let path = dir.join(self.file_name());
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, content)?;

        tracing::debug!(agenda = self.agenda, run_id = %self.run_id, path = %path.display(), "run report written");
        Ok(path)
    }
}
