use std::path::Path;

use agendasync_core::backend::provider::ProviderBackend;
use agendasync_core::{
    Agenda, AgendasyncConfig, Engine, FileStateRepository, RunMode, RunOutcome, RunReport,
};
use anyhow::Result;
use owo_colors::OwoColorize;

use crate::render::{OutcomeRender, Render};
use crate::utils::tui;

/// Run each agenda in turn. Returns whether any run needs attention
/// (failed operations or skipped teachers).
pub async fn run(
    config: &AgendasyncConfig,
    agendas: Vec<Agenda>,
    mode: RunMode,
    verbose: bool,
) -> Result<bool> {
    let states = FileStateRepository::new(config.state_dir());

    // Dry runs never reach the provider, so it need not be installed.
    let provider = match mode {
        RunMode::DryRun => None,
        RunMode::Execute | RunMode::ClearOnly => Some(ProviderBackend::from_name(
            &config.provider,
            config.provider_timeout,
        )?),
    };

    let mut engine = Engine::new(&states, config.roster(), config.retry_policy());
    if let Some(provider) = &provider {
        engine = engine.with_backend(provider);
    }

    let mut needs_attention = false;
    let mut failed_agendas = Vec::new();

    for (i, agenda) in agendas.iter().enumerate() {
        let spinner = tui::create_spinner(agenda.render());
        let result = engine.run(agenda, mode).await;
        spinner.finish_and_clear();

        println!("{}", agenda.render());

        match result {
            Ok(outcome) => {
                println!("{}", outcome.render(verbose));
                needs_attention |= outcome.needs_attention();

                if mode != RunMode::DryRun && !write_report(&config.reports_dir(), agenda, mode, &outcome) {
                    failed_agendas.push(agenda.name.as_str());
                }
            }
            Err(e) => {
                tracing::error!(agenda = %agenda.name, error = %e, "run failed");
                println!("   {}", e.to_string().red());
                failed_agendas.push(agenda.name.as_str());
            }
        }

        if i < agendas.len() - 1 {
            println!();
        }
    }

    if !failed_agendas.is_empty() {
        anyhow::bail!("Run failed for: {}", failed_agendas.join(", "));
    }

    Ok(needs_attention)
}

/// Write the agenda's run report. State is already saved at this point, so a
/// failure is reported and the remaining agendas still run.
fn write_report(dir: &Path, agenda: &Agenda, mode: RunMode, outcome: &RunOutcome) -> bool {
    match RunReport::new(&agenda.name, mode, outcome).write(dir) {
        Ok(path) => {
            println!("   {}", format!("Report: {}", path.display()).dimmed());
            true
        }
        Err(e) => {
            tracing::error!(agenda = %agenda.name, error = %e, "could not write run report");
            println!("   {}", format!("Could not write run report: {e}").red());
            false
        }
    }
}
