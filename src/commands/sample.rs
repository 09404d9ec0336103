use anyhow::{anyhow, Result};
use clap::ArgMatches;
use colored::Colorize;
use serde_json::json;
use tokio::sync::broadcast;
use tokio::time::{interval, MissedTickBehavior};

use super::build_runtime;
use crate::core::diagnostics::tasks::performance::SAMPLING_INTERVAL;
use crate::core::diagnostics::{PerformanceEvent, PerformanceMonitor};
use crate::core::Config;
use crate::ui::{format_memory_sample, format_timestamp};

const DEFAULT_SECONDS: u64 = 5;

pub fn execute(matches: &ArgMatches) -> Result<()> {
    let seconds = matches
        .get_one::<u64>("seconds")
        .copied()
        .unwrap_or(DEFAULT_SECONDS);
    let as_json = matches.get_flag("json");
    let config = Config::load()?;

    let runtime = build_runtime()?;
    runtime.block_on(run(config, seconds, as_json))
}

async fn run(config: Config, seconds: u64, as_json: bool) -> Result<()> {
    let monitor = PerformanceMonitor::with_sysinfo(config.thresholds);
    let mut issues = monitor.issues().subscribe();

    let (stop_tx, mut stop_rx) = broadcast::channel::<()>(1);
    ctrlc::set_handler(move || {
        let _ = stop_tx.send(());
    })
    .map_err(|e| anyhow!("Failed to set Ctrl+C handler: {}", e))?;

    if !as_json {
        println!(
            "{}",
            format!("Sampling process memory for {}s (Ctrl+C to stop)...", seconds)
                .cyan()
                .bold()
        );
    }

    monitor.start()?;

    let mut ticker = interval(SAMPLING_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    for _ in 0..seconds {
        tokio::select! {
            biased;

            _ = stop_rx.recv() => break,
            _ = ticker.tick() => {
                if let Some(sample) = monitor.current_memory() {
                    if as_json {
                        println!("{}", json!({ "type": "sample", "memory": sample }));
                    } else {
                        println!("  {}", format_memory_sample(&sample));
                    }
                }

                for issue in issues.drain() {
                    print_issue(&issue, as_json);
                }
            }
        }
    }

    monitor.shutdown().await;
    for issue in issues.drain() {
        print_issue(&issue, as_json);
    }

    Ok(())
}

fn print_issue(issue: &PerformanceEvent, as_json: bool) {
    if as_json {
        println!("{}", json!({ "type": "issue", "issue": issue }));
    } else {
        println!(
            "  {} {} {}",
            format_timestamp(issue.timestamp).dimmed(),
            "⚠".yellow(),
            issue.message.yellow()
        );
    }
}
