//! In-process runtime diagnostics.
//!
//! Monitors observe panics, the system log stream and reported performance,
//! database and network signals, turn them into typed events and publish
//! them on bounded, replayable [`bus::EventBus`] channels.

pub mod bus;
pub mod crash;
pub mod database;
pub mod engine;
pub mod events;
pub mod history;
pub mod log_parser;
pub mod network;
pub mod store;
pub mod tasks;
pub mod thresholds;

pub use bus::{BusCapacity, EventBus, EventStream, Subscription, Timestamped};
pub use crash::CrashInterceptor;
pub use database::DatabaseMonitor;
pub use engine::{DiagnosticEngine, DiagnosticsExport};
pub use events::{
    CrashEvent, DatabaseEvent, DatabaseIssueType, DiagnosticEvent, EventSource, LogError,
    NetworkErrorType, NetworkEvent, PerformanceEvent, PerformanceMetric, Severity,
};
pub use history::CrashHistoryRing;
pub use log_parser::LogStreamParser;
pub use network::NetworkMonitor;
pub use store::{JsonFileStore, KeyValueStore, MemoryStore};
pub use tasks::{
    CommandLogSource, FrameTracker, LogMonitor, LogMonitorConfig, LogSource, MemorySample,
    MetricSource, PerformanceMonitor, ReaderLogSource, SysinfoMetricSource,
};
pub use thresholds::{PerformanceThresholds, ThreadState};
