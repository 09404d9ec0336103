//! Reconstruction of multi-line error records from a line-oriented log stream.
//!
//! The parser is a two-state machine. A line carrying a severity marker
//! (`E/`, `W/`, `F/`, `A/`) closes the record in progress and opens a new
//! one; any other line is a continuation (stack frame, cause chain) of the
//! open record, or noise when no record is open.

use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;

use super::events::{LogError, Severity};

/// Records stop growing past this many characters
pub const MAX_RECORD_CHARS: usize = 10_000;

pub const UNKNOWN_TAG: &str = "Unknown";

static TAG_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[VDIWEFA]/([^:]+):").expect("tag pattern is a valid regex")
});

/// Severity implied by the marker in a log line, if any.
///
/// Markers are checked in `E/`, `W/`, `F/`|`A/` order.
pub fn severity_marker(line: &str) -> Option<Severity> {
    if line.contains("E/") {
        Some(Severity::High)
    } else if line.contains("W/") {
        Some(Severity::Medium)
    } else if line.contains("F/") || line.contains("A/") {
        Some(Severity::Critical)
    } else {
        None
    }
}

/// Tag of a log line, `"Unknown"` when the line has no `X/tag:` prefix
pub fn extract_tag(line: &str) -> String {
    TAG_REGEX
        .captures(line)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| UNKNOWN_TAG.to_string())
}

/// Split an accumulated record into its message and stack trace.
///
/// The message is the first line after its first `": "`, or the whole first
/// line without one. The stack trace is every following line, or `None` for
/// a single-line record.
pub fn split_record(record: &str) -> (String, Option<String>) {
    let mut lines = record.split('\n');
    let first_line = lines.next().unwrap_or("");

    let message = match first_line.find(": ") {
        Some(idx) => first_line[idx + 2..].to_string(),
        None => first_line.to_string(),
    };

    let rest: Vec<&str> = lines.collect();
    let stack_trace = if rest.is_empty() {
        None
    } else {
        Some(rest.join("\n"))
    };

    (message, stack_trace)
}

/// In-progress record owned by the parser
#[derive(Debug)]
struct LogLineAccumulator {
    buffer: String,
    tag: String,
    severity: Severity,
}

impl LogLineAccumulator {
    fn start(line: &str, severity: Severity) -> Self {
        Self {
            buffer: line.to_string(),
            tag: extract_tag(line),
            severity,
        }
    }

    fn append(&mut self, line: &str) {
        if self.buffer.len() < MAX_RECORD_CHARS {
            self.buffer.push('\n');
            self.buffer.push_str(line);
        }
    }

    fn into_record(self) -> Option<LogError> {
        if self.buffer.is_empty() {
            return None;
        }

        let (message, stack_trace) = split_record(&self.buffer);
        Some(LogError {
            message,
            stack_trace,
            severity: self.severity,
            tag: self.tag,
            timestamp: Utc::now(),
        })
    }
}

#[derive(Debug, Default)]
enum ParserState {
    #[default]
    Idle,
    Accumulating(LogLineAccumulator),
}

/// Stateful parser fed one line at a time
#[derive(Debug, Default)]
pub struct LogStreamParser {
    process_filter: Option<String>,
    state: ParserState,
}

impl LogStreamParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Only lines containing `filter` are considered
    pub fn with_process_filter(filter: impl Into<String>) -> Self {
        Self {
            process_filter: Some(filter.into()),
            state: ParserState::Idle,
        }
    }

    pub fn is_accumulating(&self) -> bool {
        matches!(self.state, ParserState::Accumulating(_))
    }

    /// Feed the next line; returns the record completed by this line, if any.
    pub fn feed(&mut self, line: &str) -> Option<LogError> {
        if let Some(filter) = &self.process_filter {
            if !line.contains(filter.as_str()) {
                return None;
            }
        }

        if let Some(severity) = severity_marker(line) {
            let previous = std::mem::replace(
                &mut self.state,
                ParserState::Accumulating(LogLineAccumulator::start(line, severity)),
            );
            return match previous {
                ParserState::Accumulating(acc) => acc.into_record(),
                ParserState::Idle => None,
            };
        }

        if let ParserState::Accumulating(acc) = &mut self.state {
            acc.append(line);
        }
        None
    }

    /// End of stream: flush the pending record
    pub fn finish(&mut self) -> Option<LogError> {
        match std::mem::take(&mut self.state) {
            ParserState::Accumulating(acc) => acc.into_record(),
            ParserState::Idle => None,
        }
    }
}
