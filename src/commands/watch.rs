use anyhow::{anyhow, Context, Result};
use clap::ArgMatches;
use colored::Colorize;
use std::fs;
use std::path::PathBuf;
use tokio::sync::broadcast;
use tokio::time::{interval, Duration};

use super::build_runtime;
use crate::core::diagnostics::{DiagnosticEngine, DiagnosticEvent};
use crate::core::Config;
use crate::ui::{format_event_line, format_event_trace};

const LOG_STREAM_CHECK: Duration = Duration::from_millis(500);

pub fn execute(matches: &ArgMatches) -> Result<()> {
    let mut config = Config::load()?;
    apply_overrides(&mut config, matches);
    let export = matches.get_one::<PathBuf>("export").cloned();

    let runtime = build_runtime()?;
    runtime.block_on(run(config, export))
}

/// Command line flags take precedence over the config file
fn apply_overrides(config: &mut Config, matches: &ArgMatches) {
    let log_monitor = &mut config.log_monitor;

    if let Some(command) = matches.get_one::<String>("command") {
        log_monitor.command = command.clone();
        log_monitor.enabled = true;
    }
    if let Some(args) = matches.get_many::<String>("arg") {
        log_monitor.args = args.cloned().collect();
    }
    if let Some(filter) = matches.get_one::<String>("filter") {
        log_monitor.process_filter = Some(filter.clone());
    }
    if let Some(&max) = matches.get_one::<u32>("max-lines") {
        log_monitor.max_lines_per_second = (max > 0).then_some(max);
    }
    if matches.get_flag("no-crash-handler") {
        config.install_crash_handler = false;
    }
}

async fn run(config: Config, export: Option<PathBuf>) -> Result<()> {
    let engine = DiagnosticEngine::from_config(&config)?;
    let mut feed = engine.events().subscribe();

    let (stop_tx, mut stop_rx) = broadcast::channel::<()>(1);
    ctrlc::set_handler(move || {
        let _ = stop_tx.send(());
    })
    .map_err(|e| anyhow!("Failed to set Ctrl+C handler: {}", e))?;

    engine.start()?;

    println!("{}", "DevBot diagnostics active".cyan().bold());
    if config.log_monitor.enabled {
        println!(
            "{}",
            format!(
                "Log source: {} {}",
                config.log_monitor.command,
                config.log_monitor.args.join(" ")
            )
            .dimmed()
        );
    }
    println!("{}", "Press Ctrl+C to stop".dimmed());
    println!();

    let logs_enabled = config.log_monitor.enabled;
    let mut log_check = interval(LOG_STREAM_CHECK);
    let mut shown = 0usize;

    loop {
        tokio::select! {
            biased;

            _ = stop_rx.recv() => {
                println!();
                println!("{}", "Stopping diagnostics...".yellow().bold());
                break;
            }
            event = feed.recv() => match event {
                Some(event) => {
                    print_event(&event);
                    shown += 1;
                }
                None => break,
            },
            _ = log_check.tick() => {
                if logs_enabled && !engine.logs().is_running() {
                    println!("{}", "Log stream ended".yellow());
                    break;
                }
            }
        }
    }

    engine.shutdown().await;
    for event in feed.drain() {
        print_event(&event);
        shown += 1;
    }

    println!();
    println!("{} {}", "Events observed:".bold(), shown);
    let dropped = engine.events().dropped_count();
    if dropped > 0 {
        println!("{} {}", "Events dropped (slow consumer):".yellow(), dropped);
    }
    let skipped = engine.logs().skipped_lines();
    if skipped > 0 {
        println!("{} {}", "Log lines over budget:".yellow(), skipped);
    }

    if let Some(path) = export {
        let json = engine.export_diagnostics(None, None)?;
        fs::write(&path, json)
            .with_context(|| format!("Failed to write export file: {:?}", path))?;
        println!(
            "{} {}",
            "✓ Diagnostics exported to".green(),
            path.display().to_string().cyan()
        );
    }

    Ok(())
}

fn print_event(event: &DiagnosticEvent) {
    println!("{}", format_event_line(event));
    if let Some(trace) = format_event_trace(event) {
        println!("{}", trace.dimmed());
    }
}
