use agendasync_core::AgendasyncConfig;
use anyhow::Result;
use owo_colors::OwoColorize;

pub fn run(config: &AgendasyncConfig) -> Result<()> {
    if config.agendas.is_empty() {
        println!(
            "{}",
            format!(
                "No agendas configured in {}",
                AgendasyncConfig::config_path()?.display()
            )
            .dimmed()
        );
        return Ok(());
    }

    for (name, agenda) in &config.agendas {
        println!(
            "📅 {} {} {}",
            name,
            format!("({})", agenda.sync_type).dimmed(),
            format!("subject \"{}\"", agenda.subject()).dimmed()
        );
        for path in config.snapshot_paths(agenda) {
            let marker = if path.exists() { "•".green().to_string() } else { "•".red().to_string() };
            println!("   {} {}", marker, path.display());
        }
    }

    Ok(())
}
