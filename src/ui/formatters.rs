use chrono::{DateTime, Local, Utc};
use colored::*;
use humansize::{format_size, BINARY};

use crate::core::diagnostics::events::{DiagnosticEvent, Severity};
use crate::core::diagnostics::tasks::MemorySample;

const BYTES_PER_MB: u64 = 1024 * 1024;

/// Format a megabyte count in human-readable form (e.g. "1.5 GiB")
pub fn format_megabytes(mb: u64) -> String {
    format_size(mb.saturating_mul(BYTES_PER_MB), BINARY)
}

/// Format a timestamp in local time (HH:MM:SS.mmm)
pub fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    let local: DateTime<Local> = timestamp.into();
    local.format("%H:%M:%S%.3f").to_string()
}

/// Fixed-width severity label colored by level
pub fn severity_label(severity: Severity) -> ColoredString {
    let label = format!("{:<8}", severity.to_string());
    match severity {
        Severity::Low => label.dimmed(),
        Severity::Medium => label.yellow(),
        Severity::High => label.red(),
        Severity::Critical => label.red().bold(),
    }
}

/// One-line summary of an event: `time SEVERITY [source] message`
pub fn format_event_line(event: &DiagnosticEvent) -> String {
    let first_line = event.message().lines().next().unwrap_or("");
    let mut line = format!(
        "{} {} {} {}",
        format_timestamp(event.timestamp()).dimmed(),
        severity_label(event.severity()),
        format!("[{}]", event.source()).cyan(),
        first_line
    );

    let detail = match event {
        DiagnosticEvent::Log(e) => Some(e.tag.clone()),
        DiagnosticEvent::Network(e) => Some(e.url.clone()),
        DiagnosticEvent::Database(e) => e.query.clone(),
        DiagnosticEvent::Crash(e) => Some(format!("thread '{}'", e.thread_name)),
        DiagnosticEvent::Performance(_) => None,
    };
    if let Some(detail) = detail {
        line.push_str(&format!(" {}", format!("({})", detail).dimmed()));
    }

    line
}

/// Stack trace of an event, indented, when it has one
pub fn format_event_trace(event: &DiagnosticEvent) -> Option<String> {
    let trace = match event {
        DiagnosticEvent::Log(e) => e.stack_trace.as_deref(),
        DiagnosticEvent::Crash(e) => Some(e.stack_trace.as_str()),
        _ => None,
    }?;

    if trace.trim().is_empty() {
        return None;
    }

    Some(
        trace
            .lines()
            .map(|l| format!("    {}", l))
            .collect::<Vec<_>>()
            .join("\n"),
    )
}

pub fn format_memory_sample(sample: &MemorySample) -> String {
    let percentage = if sample.heap_max_mb > 0 {
        sample.heap_used_mb * 100 / sample.heap_max_mb
    } else {
        0
    };

    format!(
        "process {} | system {} / {} ({}%)",
        format_megabytes(sample.resident_mb),
        format_megabytes(sample.heap_used_mb),
        format_megabytes(sample.heap_max_mb),
        percentage
    )
}

/// Render a stored crash history entry with a colored header line
pub fn format_crash_entry(index: usize, entry: &str) -> String {
    let mut lines = entry.lines();
    let header = lines.next().unwrap_or("");
    let header = render_entry_header(header);

    let body: Vec<String> = lines
        .filter(|l| *l != "---")
        .map(|l| format!("    {}", l))
        .collect();

    format!("{} {}\n{}", format!("#{}", index + 1).bold(), header, body.join("\n"))
}

// "[epoch_ms] thread" -> "2026-10-17 12:00:00 on thread"
fn render_entry_header(header: &str) -> String {
    let parsed = header
        .strip_prefix('[')
        .and_then(|rest| rest.split_once("] "))
        .and_then(|(millis, thread)| {
            let millis: i64 = millis.parse().ok()?;
            let time = DateTime::<Utc>::from_timestamp_millis(millis)?;
            Some((time, thread))
        });

    match parsed {
        Some((time, thread)) => {
            let local: DateTime<Local> = time.into();
            format!(
                "{} on {}",
                local.format("%Y-%m-%d %H:%M:%S").to_string().yellow(),
                format!("'{}'", thread).cyan()
            )
        }
        None => header.to_string(),
    }
}
