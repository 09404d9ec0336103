//! Domain events published by the diagnostics monitors.
//!
//! Every event is created by its owning monitor at the moment of detection
//! and never mutated afterwards.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::bus::Timestamped;

/// Maximum number of characters of a SQL query kept on a database event
pub const MAX_QUERY_CHARS: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Severity::Low => "LOW",
            Severity::Medium => "MEDIUM",
            Severity::High => "HIGH",
            Severity::Critical => "CRITICAL",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PerformanceMetric {
    MemoryUsage,
    UiThreadBlock,
    FrameDrop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DatabaseIssueType {
    SlowQuery,
    LockContention,
    MigrationFailure,
    CursorLeak,
    TransactionFailure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NetworkErrorType {
    Timeout,
    ConnectionFailed,
    HttpError,
    SslError,
    DnsFailure,
}

/// An unhandled fault observed by the crash interceptor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrashEvent {
    pub message: String,
    pub thread_name: String,
    pub stack_trace: String,
    pub location: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl CrashEvent {
    pub fn new(
        message: impl Into<String>,
        thread_name: impl Into<String>,
        stack_trace: impl Into<String>,
        location: Option<String>,
    ) -> Self {
        Self {
            message: message.into(),
            thread_name: thread_name.into(),
            stack_trace: stack_trace.into(),
            location,
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceEvent {
    pub message: String,
    pub metric: PerformanceMetric,
    pub value: u64,
    pub threshold: u64,
    pub timestamp: DateTime<Utc>,
}

impl PerformanceEvent {
    pub fn new(message: impl Into<String>, metric: PerformanceMetric, value: u64, threshold: u64) -> Self {
        Self {
            message: message.into(),
            metric,
            value,
            threshold,
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseEvent {
    pub message: String,
    pub kind: DatabaseIssueType,
    pub query: Option<String>,
    pub duration_ms: Option<u64>,
    pub timestamp: DateTime<Utc>,
}

impl DatabaseEvent {
    pub fn new(message: impl Into<String>, kind: DatabaseIssueType) -> Self {
        Self {
            message: message.into(),
            kind,
            query: None,
            duration_ms: None,
            timestamp: Utc::now(),
        }
    }

    /// Attach the offending query, truncated to [`MAX_QUERY_CHARS`]
    pub fn with_query(mut self, query: &str) -> Self {
        self.query = Some(query.chars().take(MAX_QUERY_CHARS).collect());
        self
    }

    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkEvent {
    pub message: String,
    pub kind: NetworkErrorType,
    pub url: String,
    pub status_code: Option<u16>,
    pub timestamp: DateTime<Utc>,
}

impl NetworkEvent {
    pub fn new(message: impl Into<String>, kind: NetworkErrorType, url: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind,
            url: url.into(),
            status_code: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_status(mut self, status_code: u16) -> Self {
        self.status_code = Some(status_code);
        self
    }
}

/// A multi-line error record reconstructed from the system log stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogError {
    pub message: String,
    pub stack_trace: Option<String>,
    pub severity: Severity,
    pub tag: String,
    pub timestamp: DateTime<Utc>,
}

macro_rules! impl_timestamped {
    ($($event:ty),+ $(,)?) => {
        $(
            impl Timestamped for $event {
                fn timestamp(&self) -> DateTime<Utc> {
                    self.timestamp
                }

                fn set_timestamp(&mut self, timestamp: DateTime<Utc>) {
                    self.timestamp = timestamp;
                }
            }
        )+
    };
}

impl_timestamped!(CrashEvent, PerformanceEvent, DatabaseEvent, NetworkEvent, LogError);

/// Monitor domain an event belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventSource {
    Crash,
    Performance,
    Database,
    Network,
    Log,
}

impl EventSource {
    pub const ALL: [EventSource; 5] = [
        EventSource::Crash,
        EventSource::Performance,
        EventSource::Database,
        EventSource::Network,
        EventSource::Log,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventSource::Crash => "crash",
            EventSource::Performance => "performance",
            EventSource::Database => "database",
            EventSource::Network => "network",
            EventSource::Log => "log",
        }
    }
}

impl fmt::Display for EventSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "crash" => Ok(EventSource::Crash),
            "performance" => Ok(EventSource::Performance),
            "database" => Ok(EventSource::Database),
            "network" => Ok(EventSource::Network),
            "log" => Ok(EventSource::Log),
            other => Err(format!(
                "Unknown event source '{}'. Valid sources: crash, performance, database, network, log",
                other
            )),
        }
    }
}

/// Any diagnostic record, tagged by domain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "lowercase")]
pub enum DiagnosticEvent {
    Crash(CrashEvent),
    Performance(PerformanceEvent),
    Database(DatabaseEvent),
    Network(NetworkEvent),
    Log(LogError),
}

impl DiagnosticEvent {
    pub fn message(&self) -> &str {
        match self {
            DiagnosticEvent::Crash(e) => &e.message,
            DiagnosticEvent::Performance(e) => &e.message,
            DiagnosticEvent::Database(e) => &e.message,
            DiagnosticEvent::Network(e) => &e.message,
            DiagnosticEvent::Log(e) => &e.message,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            DiagnosticEvent::Crash(e) => e.timestamp,
            DiagnosticEvent::Performance(e) => e.timestamp,
            DiagnosticEvent::Database(e) => e.timestamp,
            DiagnosticEvent::Network(e) => e.timestamp,
            DiagnosticEvent::Log(e) => e.timestamp,
        }
    }

    pub fn source(&self) -> EventSource {
        match self {
            DiagnosticEvent::Crash(_) => EventSource::Crash,
            DiagnosticEvent::Performance(_) => EventSource::Performance,
            DiagnosticEvent::Database(_) => EventSource::Database,
            DiagnosticEvent::Network(_) => EventSource::Network,
            DiagnosticEvent::Log(_) => EventSource::Log,
        }
    }

    /// Display severity. Only log records carry their own; the other
    /// domains are ranked by kind.
    pub fn severity(&self) -> Severity {
        match self {
            DiagnosticEvent::Crash(_) => Severity::Critical,
            DiagnosticEvent::Log(e) => e.severity,
            DiagnosticEvent::Performance(e) => match e.metric {
                PerformanceMetric::UiThreadBlock => Severity::High,
                PerformanceMetric::MemoryUsage | PerformanceMetric::FrameDrop => Severity::Medium,
            },
            DiagnosticEvent::Database(e) => match e.kind {
                DatabaseIssueType::MigrationFailure | DatabaseIssueType::TransactionFailure => {
                    Severity::High
                }
                DatabaseIssueType::SlowQuery
                | DatabaseIssueType::LockContention
                | DatabaseIssueType::CursorLeak => Severity::Medium,
            },
            DiagnosticEvent::Network(e) => match e.kind {
                NetworkErrorType::SslError => Severity::High,
                NetworkErrorType::HttpError => match e.status_code {
                    Some(code) if code >= 500 => Severity::High,
                    _ => Severity::Medium,
                },
                NetworkErrorType::Timeout
                | NetworkErrorType::ConnectionFailed
                | NetworkErrorType::DnsFailure => Severity::Medium,
            },
        }
    }
}

impl From<CrashEvent> for DiagnosticEvent {
    fn from(event: CrashEvent) -> Self {
        DiagnosticEvent::Crash(event)
    }
}

impl From<PerformanceEvent> for DiagnosticEvent {
    fn from(event: PerformanceEvent) -> Self {
        DiagnosticEvent::Performance(event)
    }
}

impl From<DatabaseEvent> for DiagnosticEvent {
    fn from(event: DatabaseEvent) -> Self {
        DiagnosticEvent::Database(event)
    }
}

impl From<NetworkEvent> for DiagnosticEvent {
    fn from(event: NetworkEvent) -> Self {
        DiagnosticEvent::Network(event)
    }
}

impl From<LogError> for DiagnosticEvent {
    fn from(event: LogError) -> Self {
        DiagnosticEvent::Log(event)
    }
}
