use anyhow::{Context, Result};
use clap::ArgMatches;
use colored::Colorize;
use std::path::PathBuf;
use std::sync::Arc;

use crate::core::diagnostics::{CrashHistoryRing, JsonFileStore};
use crate::core::Config;
use crate::ui::format_crash_entry;

pub fn execute(matches: &ArgMatches) -> Result<()> {
    let history = open_history(matches.get_one::<PathBuf>("file"))?;

    match matches.subcommand() {
        Some(("show", _)) => handle_show(&history),
        Some(("last", _)) => handle_last(&history),
        Some(("clear", _)) => handle_clear(&history),
        _ => handle_show(&history),
    }
}

fn open_history(file: Option<&PathBuf>) -> Result<CrashHistoryRing> {
    let path = match file {
        Some(path) => path.clone(),
        None => Config::load()?
            .crash_history_file()
            .context("Could not determine crash history location")?,
    };

    log::debug!("Using crash history at {:?}", path);
    Ok(CrashHistoryRing::new(Arc::new(JsonFileStore::new(path))))
}

fn handle_show(history: &CrashHistoryRing) -> Result<()> {
    let entries = history.entries().context("Failed to read crash history")?;

    if entries.is_empty() {
        println!("{}", "No crashes recorded.".green());
        return Ok(());
    }

    println!(
        "{}",
        format!("Recent crashes (newest first, {} of {}):", entries.len(), history.capacity())
            .bold()
    );
    println!();
    for (index, entry) in entries.iter().enumerate() {
        println!("{}", format_crash_entry(index, entry));
        println!();
    }
    Ok(())
}

fn handle_last(history: &CrashHistoryRing) -> Result<()> {
    match history.last_entry().context("Failed to read crash history")? {
        Some(entry) => println!("{}", format_crash_entry(0, &entry)),
        None => println!("{}", "No crashes recorded.".green()),
    }
    Ok(())
}

fn handle_clear(history: &CrashHistoryRing) -> Result<()> {
    history.clear().context("Failed to clear crash history")?;
    println!("{}", "✓ Crash history cleared".green());
    Ok(())
}
