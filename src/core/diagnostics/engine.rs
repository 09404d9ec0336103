//! Aggregation of every monitor into one diagnostic feed.
//!
//! The engine owns one instance of each monitor, forwards their events to a
//! single [`DiagnosticEvent`] bus and keeps the most recent events in memory
//! for listing and export.

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::bus::{EventBus, EventStream};
use super::crash::CrashInterceptor;
use super::database::DatabaseMonitor;
use super::events::{DiagnosticEvent, EventSource};
use super::history::CrashHistoryRing;
use super::network::NetworkMonitor;
use super::store::JsonFileStore;
use super::tasks::{
    CommandLogSource, LogMonitor, LogSource, MetricSource, PerformanceMonitor,
    SysinfoMetricSource, TaskHandle,
};
use crate::core::config::Config;
use crate::error::{DevbotError, Result};

pub const MAX_RECENT_EVENTS: usize = 500;
pub const DEFAULT_RECENT_LIMIT: usize = 50;

/// Snapshot written by [`DiagnosticEngine::export_diagnostics`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticsExport {
    pub export_time: DateTime<Utc>,
    pub export_time_epoch_ms: i64,
    pub app_version: String,
    pub total_events_in_export: usize,
    pub total_events_in_memory: usize,
    pub max_events_stored: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filtered_sources: Option<Vec<EventSource>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_age_ms: Option<i64>,
    pub summary: BTreeMap<String, usize>,
    pub crash_history: Vec<String>,
    pub events: Vec<DiagnosticEvent>,
}

type RecentEvents = Arc<Mutex<VecDeque<DiagnosticEvent>>>;

pub struct DiagnosticEngine {
    crash: CrashInterceptor,
    logs: LogMonitor,
    performance: PerformanceMonitor,
    database: DatabaseMonitor,
    network: NetworkMonitor,
    bus: EventBus<DiagnosticEvent>,
    recent: RecentEvents,
    forwarders: Mutex<Vec<TaskHandle>>,
    monitoring: AtomicBool,
    install_crash_handler: bool,
}

impl DiagnosticEngine {
    pub fn new(config: &Config, history: CrashHistoryRing, metrics: impl MetricSource) -> Self {
        let buses = &config.buses;

        Self {
            crash: CrashInterceptor::with_capacity(history, buses.crash),
            logs: LogMonitor::with_capacity(config.log_monitor.clone(), buses.log),
            performance: PerformanceMonitor::with_capacity(
                metrics,
                config.thresholds.clone(),
                buses.performance,
            ),
            database: DatabaseMonitor::with_capacity(buses.database),
            network: NetworkMonitor::with_capacity(buses.network),
            bus: EventBus::new("engine", buses.engine),
            recent: Arc::new(Mutex::new(VecDeque::with_capacity(MAX_RECENT_EVENTS))),
            forwarders: Mutex::new(Vec::new()),
            monitoring: AtomicBool::new(false),
            install_crash_handler: config.install_crash_handler,
        }
    }

    /// Engine with a file-backed crash history and `sysinfo` metrics
    pub fn from_config(config: &Config) -> Result<Self> {
        let path = config
            .crash_history_file()
            .ok_or_else(|| DevbotError::storage("Could not determine crash history location"))?;
        let history = CrashHistoryRing::new(Arc::new(JsonFileStore::new(path)));

        Ok(Self::new(config, history, SysinfoMetricSource::new()))
    }

    pub fn events(&self) -> EventStream<DiagnosticEvent> {
        self.bus.stream()
    }

    pub fn crash(&self) -> &CrashInterceptor {
        &self.crash
    }

    pub fn logs(&self) -> &LogMonitor {
        &self.logs
    }

    pub fn performance(&self) -> &PerformanceMonitor {
        &self.performance
    }

    pub fn database(&self) -> &DatabaseMonitor {
        &self.database
    }

    pub fn network(&self) -> &NetworkMonitor {
        &self.network
    }

    pub fn is_monitoring(&self) -> bool {
        self.monitoring.load(Ordering::SeqCst)
    }

    /// Start every monitor, reading logs from the configured command
    pub fn start(&self) -> Result<()> {
        let source = self
            .logs
            .config()
            .enabled
            .then(|| CommandLogSource::from_config(self.logs.config()));
        self.start_monitors(source)
    }

    /// Start every monitor, reading logs from `source`
    pub fn start_with_log_source<S: LogSource>(&self, source: S) -> Result<()> {
        self.start_monitors(Some(source))
    }

    fn start_monitors<S: LogSource>(&self, log_source: Option<S>) -> Result<()> {
        {
            let mut forwarders = self.forwarders.lock();
            if forwarders.is_empty() {
                *forwarders = self.spawn_forwarders()?;
            }
        }

        if self.monitoring.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        if let Some(source) = log_source {
            self.logs.start_with_source(source)?;
        }
        if self.install_crash_handler {
            self.crash.install();
        }
        self.performance.start()?;

        log::info!("Diagnostic monitoring active");
        Ok(())
    }

    // Forwarders live as long as the engine so replayed events are only
    // delivered once
    fn spawn_forwarders(&self) -> Result<Vec<TaskHandle>> {
        Ok(vec![
            forward(EventSource::Crash, self.crash.crashes(), &self.bus, &self.recent)?,
            forward(EventSource::Log, self.logs.errors(), &self.bus, &self.recent)?,
            forward(
                EventSource::Performance,
                self.performance.issues(),
                &self.bus,
                &self.recent,
            )?,
            forward(EventSource::Database, self.database.issues(), &self.bus, &self.recent)?,
            forward(EventSource::Network, self.network.failures(), &self.bus, &self.recent)?,
        ])
    }

    /// Stop the monitors and restore the previous panic hook
    pub fn stop(&self) {
        if !self.monitoring.swap(false, Ordering::SeqCst) {
            return;
        }

        self.logs.stop();
        self.performance.stop();
        self.crash.uninstall();
        log::info!("Diagnostic monitoring stopped");
    }

    /// Stop everything, forwarders included, and wait for the tasks to end
    pub async fn shutdown(&self) {
        self.stop();
        self.logs.shutdown().await;
        self.performance.shutdown().await;

        let forwarders: Vec<TaskHandle> = self.forwarders.lock().drain(..).collect();
        for task in forwarders {
            task.shutdown().await;
        }
    }

    /// Up to `limit` most recent events, oldest first
    pub fn recent_events(&self, limit: usize) -> Vec<DiagnosticEvent> {
        let recent = self.recent.lock();
        let skip = recent.len().saturating_sub(limit);
        recent.iter().skip(skip).cloned().collect()
    }

    pub fn events_by_source(&self, source: EventSource) -> Vec<DiagnosticEvent> {
        self.recent
            .lock()
            .iter()
            .filter(|e| e.source() == source)
            .cloned()
            .collect()
    }

    pub fn clear_recent(&self) {
        self.recent.lock().clear();
    }

    pub fn build_export(
        &self,
        sources: Option<&[EventSource]>,
        max_age: Option<Duration>,
    ) -> DiagnosticsExport {
        let now = Utc::now();
        let all_events: Vec<DiagnosticEvent> = self.recent.lock().iter().cloned().collect();

        let events: Vec<DiagnosticEvent> = all_events
            .iter()
            .filter(|e| sources.map_or(true, |s| s.contains(&e.source())))
            .filter(|e| max_age.map_or(true, |age| now - e.timestamp() <= age))
            .cloned()
            .collect();

        let summary = EventSource::ALL
            .iter()
            .map(|source| {
                let count = events.iter().filter(|e| e.source() == *source).count();
                (source.as_str().to_string(), count)
            })
            .collect();

        DiagnosticsExport {
            export_time: now,
            export_time_epoch_ms: now.timestamp_millis(),
            app_version: env!("CARGO_PKG_VERSION").to_string(),
            total_events_in_export: events.len(),
            total_events_in_memory: all_events.len(),
            max_events_stored: MAX_RECENT_EVENTS,
            filtered_sources: sources.map(|s| s.to_vec()),
            max_age_ms: max_age.map(|age| age.num_milliseconds()),
            summary,
            crash_history: self.crash.crash_history(),
            events,
        }
    }

    /// Pretty JSON export of the recent events, optionally filtered
    pub fn export_diagnostics(
        &self,
        sources: Option<&[EventSource]>,
        max_age: Option<Duration>,
    ) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.build_export(sources, max_age))?)
    }
}

fn record_event(bus: &EventBus<DiagnosticEvent>, recent: &RecentEvents, event: DiagnosticEvent) {
    {
        let mut recent = recent.lock();
        recent.push_back(event.clone());
        while recent.len() > MAX_RECENT_EVENTS {
            recent.pop_front();
        }
    }
    bus.publish(event);
}

fn forward<T>(
    source: EventSource,
    stream: EventStream<T>,
    bus: &EventBus<DiagnosticEvent>,
    recent: &RecentEvents,
) -> Result<TaskHandle>
where
    T: Clone + Send + Into<DiagnosticEvent> + 'static,
{
    let mut subscription = stream.subscribe();
    let bus = bus.clone();
    let recent = Arc::clone(recent);

    TaskHandle::spawn(source.as_str(), move |mut shutdown| async move {
        loop {
            tokio::select! {
                biased;

                _ = shutdown.recv() => {
                    // Events published before shutdown still reach the feed
                    for event in subscription.drain() {
                        record_event(&bus, &recent, event.into());
                    }
                    break;
                }
                event = subscription.recv() => match event {
                    Some(event) => record_event(&bus, &recent, event.into()),
                    None => break,
                },
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::diagnostics::events::{
        DatabaseEvent, DatabaseIssueType, NetworkErrorType, NetworkEvent,
    };
    use crate::core::diagnostics::bus::BusCapacity;
    use crate::core::diagnostics::store::MemoryStore;
    use crate::core::diagnostics::tasks::{MemorySample, ReaderLogSource};

    struct QuietSource;

    impl MetricSource for QuietSource {
        fn memory(&mut self) -> Option<MemorySample> {
            Some(MemorySample {
                resident_mb: 1,
                heap_used_mb: 1,
                heap_max_mb: 100,
            })
        }
    }

    fn engine() -> DiagnosticEngine {
        let config = Config {
            install_crash_handler: false,
            ..Config::default()
        };
        let history = CrashHistoryRing::new(Arc::new(MemoryStore::new()));
        DiagnosticEngine::new(&config, history, QuietSource)
    }

    fn recorded_event(engine: &DiagnosticEngine, i: usize) {
        record_event(
            &engine.bus,
            &engine.recent,
            DiagnosticEvent::Network(NetworkEvent::new(
                format!("failure {}", i),
                NetworkErrorType::Timeout,
                "https://example.com",
            )),
        );
    }

    #[test]
    fn test_start_outside_runtime_fails() {
        let engine = engine();
        assert!(engine.start().is_err());
        assert!(!engine.is_monitoring());
    }

    #[test]
    fn test_recent_ring_keeps_newest() {
        let engine = engine();
        for i in 0..(MAX_RECENT_EVENTS + 20) {
            recorded_event(&engine, i);
        }

        assert_eq!(engine.recent_events(usize::MAX).len(), MAX_RECENT_EVENTS);
        let last_two = engine.recent_events(2);
        assert_eq!(last_two[0].message(), format!("failure {}", MAX_RECENT_EVENTS + 18));
        assert_eq!(last_two[1].message(), format!("failure {}", MAX_RECENT_EVENTS + 19));

        engine.clear_recent();
        assert!(engine.recent_events(DEFAULT_RECENT_LIMIT).is_empty());
    }

    #[tokio::test]
    async fn test_monitor_events_are_forwarded() {
        let engine = engine();
        let mut feed = engine.events().subscribe();
        engine
            .start_with_log_source(ReaderLogSource::from_text("E/Tag: boom\n"))
            .unwrap();
        assert!(engine.is_monitoring());

        engine.database().report_slow_query("SELECT 1", 250);
        engine.network().report_http_error("https://example.com", 502);

        let mut sources = Vec::new();
        for _ in 0..3 {
            sources.push(feed.recv().await.unwrap().source());
        }
        sources.sort_by_key(|s| s.as_str());
        assert_eq!(
            sources,
            vec![EventSource::Database, EventSource::Log, EventSource::Network]
        );

        assert_eq!(engine.events_by_source(EventSource::Database).len(), 1);
        engine.shutdown().await;
        assert!(!engine.is_monitoring());
    }

    #[tokio::test]
    async fn test_forwarder_drains_queue_on_shutdown() {
        let network = EventBus::ordered("network", BusCapacity::NETWORK);
        let bus = EventBus::new("engine", BusCapacity::ENGINE);
        let recent: RecentEvents = Arc::new(Mutex::new(VecDeque::new()));

        let task = forward(EventSource::Network, network.stream(), &bus, &recent).unwrap();
        for i in 0..3 {
            network.publish(NetworkEvent::new(
                format!("failure {}", i),
                NetworkErrorType::Timeout,
                "https://example.com",
            ));
        }

        // The task has not been polled yet: shutdown and events are both ready
        task.shutdown().await;

        assert_eq!(recent.lock().len(), 3);
        assert_eq!(bus.replay().len(), 3);
    }

    #[tokio::test]
    async fn test_export_filters_by_source_and_age() {
        let engine = engine();
        recorded_event(&engine, 0);
        record_event(
            &engine.bus,
            &engine.recent,
            DiagnosticEvent::Database(DatabaseEvent::new(
                "Transaction failed: x",
                DatabaseIssueType::TransactionFailure,
            )),
        );

        let export = engine.build_export(Some(&[EventSource::Network]), None);
        assert_eq!(export.total_events_in_export, 1);
        assert_eq!(export.total_events_in_memory, 2);
        assert_eq!(export.summary["network"], 1);
        assert_eq!(export.summary["database"], 0);

        let export = engine.build_export(None, Some(Duration::minutes(5)));
        assert_eq!(export.total_events_in_export, 2);

        let json = engine.export_diagnostics(None, None).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["max_events_stored"], 500);
        assert_eq!(value["events"][1]["source"], "database");
    }
}
