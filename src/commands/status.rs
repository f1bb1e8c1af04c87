use agendasync_core::{Agenda, AgendasyncConfig, FileStateRepository, StateRepository};
use anyhow::Result;
use owo_colors::OwoColorize;

use crate::render::Render;

pub fn run(config: &AgendasyncConfig, agendas: Vec<Agenda>) -> Result<()> {
    let states = FileStateRepository::new(config.state_dir());

    for (i, agenda) in agendas.iter().enumerate() {
        println!("{}", agenda.render());

        match states.load(&agenda.name) {
            Ok(Some(state)) => println!("{}", state.render()),
            Ok(None) => println!("   {}", "Never synced".dimmed()),
            Err(e) => println!("   {}", e.to_string().red()),
        }

        if i < agendas.len() - 1 {
            println!();
        }
    }

    Ok(())
}
