mod commands;
mod render;
mod utils;

use std::process::ExitCode;

use agendasync_core::{Agenda, AgendasyncConfig, RunMode};
use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "agendasync")]
#[command(about = "Sync teacher schedule snapshots onto their remote calendars")]
struct Cli {
    /// Debug logging and full diff listings
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Diff agendas against their last sync and optionally apply the changes
    Run {
        /// Agendas to run (default: all configured agendas)
        agendas: Vec<String>,

        /// Apply the diff to the remote calendars (default is a dry run)
        #[arg(long, conflicts_with = "clear_only")]
        execute: bool,

        /// Delete every event the agenda created and forget its state
        #[arg(long)]
        clear_only: bool,
    },
    /// Show when each agenda was last synced
    Status {
        /// Only show this agenda
        agenda: Option<String>,
    },
    /// List configured agendas
    Agendas,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = AgendasyncConfig::load()?;

    match cli.command {
        Commands::Run {
            agendas,
            execute,
            clear_only,
        } => {
            let mode = match (execute, clear_only) {
                (_, true) => RunMode::ClearOnly,
                (true, false) => RunMode::Execute,
                (false, false) => RunMode::DryRun,
            };
            let agendas = resolve_agendas(&config, &agendas)?;
            let needs_attention = commands::run::run(&config, agendas, mode, cli.verbose).await?;

            Ok(if needs_attention {
                ExitCode::from(2)
            } else {
                ExitCode::SUCCESS
            })
        }
        Commands::Status { agenda } => {
            let names: Vec<String> = agenda.into_iter().collect();
            let agendas = resolve_agendas(&config, &names)?;
            commands::status::run(&config, agendas)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Agendas => {
            commands::agendas::run(&config)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Logs go to stderr so the summary on stdout stays readable.
fn init_tracing(verbose: bool) {
    let default_filter = if verbose {
        "agendasync=debug,agendasync_core=debug"
    } else {
        "agendasync=info,agendasync_core=info"
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn resolve_agendas(config: &AgendasyncConfig, names: &[String]) -> Result<Vec<Agenda>> {
    if config.agendas.is_empty() {
        anyhow::bail!(
            "No agendas configured.\n\n\
            Add one to {}:\n  \
            [agendas.method]\n  \
            sync_type = \"recurring\"\n  \
            snapshots = [\"snapshots/method.json\"]",
            AgendasyncConfig::config_path()?.display()
        );
    }

    let names: Vec<&str> = if names.is_empty() {
        config.agenda_names().collect()
    } else {
        names.iter().map(String::as_str).collect()
    };

    names
        .into_iter()
        .map(|name| {
            if config.agenda(name).is_err() {
                let available: Vec<_> = config.agenda_names().collect();
                anyhow::bail!(
                    "Agenda '{}' not found. Available: {}",
                    name,
                    available.join(", ")
                );
            }
            Ok(Agenda::from_config(config, name)?)
        })
        .collect()
}
