//! TUI rendering traits for agendasync types.
//!
//! This module provides extension traits that add colored terminal rendering
//! to agendasync-core types using owo_colors.

use agendasync_core::apply::{ApplyReport, ClearReport};
use agendasync_core::{Agenda, AgendaDiff, AgendaState, DiffKind, EntryDiff, RunOutcome, TeacherDiff};
use owo_colors::OwoColorize;

/// Extension trait for TUI rendering with colors.
pub trait Render {
    fn render(&self) -> String;
}

impl Render for DiffKind {
    fn render(&self) -> String {
        let symbol = self.symbol();
        match self {
            DiffKind::Add => symbol.green().to_string(),
            DiffKind::Change => symbol.yellow().to_string(),
            DiffKind::Remove => symbol.red().to_string(),
        }
    }
}

/// Colorize text according to the diff kind
fn colorize_diff(kind: DiffKind, text: &str) -> String {
    match kind {
        DiffKind::Add => text.green().to_string(),
        DiffKind::Change => text.yellow().to_string(),
        DiffKind::Remove => text.red().to_string(),
    }
}

impl Render for EntryDiff {
    fn render(&self) -> String {
        match (&self.old, &self.new) {
            (Some(old), Some(new)) if self.kind == DiffKind::Change => format!(
                "{} {} {}",
                self.kind.render(),
                colorize_diff(self.kind, &new.to_string()),
                format!("(was {})", old.entry).dimmed()
            ),
            _ => format!(
                "{} {}",
                self.kind.render(),
                colorize_diff(self.kind, &self.entry().to_string())
            ),
        }
    }
}

impl Render for Agenda {
    fn render(&self) -> String {
        format!("📅 {} {}", self.name, format!("({})", self.sync_type).dimmed())
    }
}

/// Threshold for compact view (show counts instead of individual entries)
const COMPACT_THRESHOLD: usize = 5;

/// Simple pluralization helper
fn pluralize(word: &str, count: usize) -> String {
    match (count, word.strip_suffix('y')) {
        (1, _) => word.to_string(),
        (_, Some(stem)) => format!("{stem}ies"),
        (_, None) => format!("{word}s"),
    }
}

/// Render one teacher's changes, compact if there are many and verbose is false
fn render_teacher_diff(diff: &TeacherDiff, verbose: bool, lines: &mut Vec<String>) {
    lines.push(format!("   {}", diff.teacher));

    if verbose || diff.changes.len() <= COMPACT_THRESHOLD {
        for change in &diff.changes {
            lines.push(format!("      {}", change.render()));
        }
        return;
    }

    let counts = diff.counts();
    if counts.added > 0 {
        let label = format!("({} new {})", counts.added, pluralize("entry", counts.added));
        lines.push(format!("      {} {}", "+".green(), label.green()));
    }
    if counts.changed > 0 {
        let label = format!("({} changed)", counts.changed);
        lines.push(format!("      {} {}", "~".yellow(), label.yellow()));
    }
    if counts.removed > 0 {
        let label = format!("({} removed)", counts.removed);
        lines.push(format!("      {} {}", "-".red(), label.red()));
    }
}

pub trait DiffRender {
    fn render(&self, verbose: bool) -> String;
}

impl DiffRender for AgendaDiff {
    fn render(&self, verbose: bool) -> String {
        let mut lines = Vec::new();

        if self.bootstrap {
            lines.push(
                "   Never synced: matching remote events are cleared first"
                    .dimmed()
                    .to_string(),
            );
        } else if !self.clear_first.is_empty() {
            let teachers: Vec<_> = self.clear_first.iter().map(|t| t.to_string()).collect();
            lines.push(format!(
                "   {} {}",
                "Clear pending".yellow(),
                format!("{}: matching remote events are cleared first", teachers.join(", ")).yellow()
            ));
        }

        if self.is_empty() {
            lines.push("   No changes".dimmed().to_string());
        } else {
            for teacher in self.teachers.iter().filter(|t| !t.is_empty()) {
                render_teacher_diff(teacher, verbose, &mut lines);
            }
        }

        for skipped in &self.skipped {
            lines.push(format!(
                "   {} {}",
                "Skipped".yellow(),
                format!("{} ({}): {}", skipped.teacher, skipped.raw_name, skipped.reason).yellow()
            ));
        }

        if !self.unresolved.is_empty() {
            let names: Vec<_> = self.unresolved.iter().map(|n| format!("\"{n}\"")).collect();
            lines.push(format!("   {} {}", "Unresolved".yellow(), names.join(", ").yellow()));
        }

        if !self.activity_breakdown.is_empty() {
            let breakdown: Vec<_> = self
                .activity_breakdown
                .iter()
                .map(|(code, count)| format!("{code} {count}"))
                .collect();
            lines.push(format!("   {}", format!("By activity: {}", breakdown.join(", ")).dimmed()));
        }

        let counts = self.counts();
        lines.push(
            format!(
                "   {} to add, {} to remove, {} to change, {} unchanged",
                counts.added, counts.removed, counts.changed, counts.unchanged
            )
            .dimmed()
            .to_string(),
        );

        lines.join("\n")
    }
}

impl Render for ApplyReport {
    fn render(&self) -> String {
        let mut lines = Vec::new();

        if !self.cleared.is_empty() {
            let cleared: usize = self.cleared.iter().map(|c| c.deleted).sum();
            lines.push(format!("   Cleared {} existing {}", cleared, pluralize("event", cleared)));
            for outcome in &self.cleared {
                for error in &outcome.errors {
                    lines.push(format!("   {} {}", outcome.teacher.short_name().red(), error.red()));
                }
            }
        }

        for outcome in &self.teachers {
            for error in &outcome.errors {
                lines.push(format!("   {} {}", outcome.teacher.short_name().red(), error.red()));
            }
        }

        let counts = self.counts();
        let summary = format!(
            "   Applied: {} added, {} removed, {} changed, {} unchanged",
            counts.added, counts.removed, counts.changed, counts.unchanged
        );
        lines.push(summary.green().to_string());

        let failed = self.failed();
        if failed > 0 {
            lines.push(format!("   {}", format!("{} failed {}", failed, pluralize("operation", failed)).red()));
        }

        lines.join("\n")
    }
}

impl Render for ClearReport {
    fn render(&self) -> String {
        let mut lines = Vec::new();

        for outcome in &self.teachers {
            let line = format!("   {}: {} of {} deleted", outcome.teacher, outcome.deleted, outcome.found);
            lines.push(if outcome.failed > 0 {
                line.red().to_string()
            } else {
                line
            });
            for error in &outcome.errors {
                lines.push(format!("      {}", error.red()));
            }
        }

        lines.push(
            format!("   Cleared {} {}, state forgotten", self.deleted(), pluralize("event", self.deleted()))
                .green()
                .to_string(),
        );

        lines.join("\n")
    }
}

pub trait OutcomeRender {
    fn render(&self, verbose: bool) -> String;
}

impl OutcomeRender for RunOutcome {
    fn render(&self, verbose: bool) -> String {
        match self {
            RunOutcome::Diff(diff) => {
                format!("{}\n   {}", diff.render(verbose), "Dry run: nothing applied".dimmed())
            }
            RunOutcome::Apply { diff, report } => {
                format!("{}\n{}", diff.render(verbose), report.render())
            }
            RunOutcome::Clear(report) => report.render(),
        }
    }
}

impl Render for AgendaState {
    fn render(&self) -> String {
        format!(
            "   Last synced {} {}",
            self.synced_at.format("%Y-%m-%d %H:%M UTC"),
            format!(
                "({} {}, {} {})",
                self.teacher_count(),
                pluralize("teacher", self.teacher_count()),
                self.event_count(),
                pluralize("event", self.event_count())
            )
            .dimmed()
        )
    }
}
