use crate::core::Config;
use anyhow::{Context, Result};
use colored::Colorize;

pub fn execute(matches: &clap::ArgMatches) -> Result<()> {
    match matches.subcommand() {
        Some(("show", _)) => handle_show(),
        Some(("path", _)) => handle_path(),
        Some(("init", sub_matches)) => handle_init(sub_matches.get_flag("force")),
        _ => {
            println!("Use 'devbot config --help' for more information.");
            Ok(())
        }
    }
}

fn handle_show() -> Result<()> {
    let config = Config::load()?;
    let json = serde_json::to_string_pretty(&config).context("Failed to serialize config")?;
    println!("{}", json);
    Ok(())
}

fn handle_path() -> Result<()> {
    let config_path = Config::get_config_path()?;
    println!("{}", config_path.display());

    if !config_path.exists() {
        println!(
            "{}",
            "(not created yet, defaults are in use; run 'devbot config init')".dimmed()
        );
    }
    Ok(())
}

fn handle_init(force: bool) -> Result<()> {
    let config_path = Config::get_config_path()?;

    if config_path.exists() && !force {
        println!(
            "{}",
            format!("Config already exists at {}", config_path.display()).yellow()
        );
        println!("{}", "Use --force to overwrite it with the defaults.".dimmed());
        return Ok(());
    }

    Config::default().save_to(&config_path)?;
    println!(
        "{} {}",
        "✓ Config written to".green(),
        config_path.display().to_string().cyan()
    );
    Ok(())
}
