use std::sync::Arc;
use std::time::Duration;

use devbot::core::config::Config;
use devbot::core::diagnostics::{
    CrashEvent, CrashHistoryRing, DiagnosticEngine, DiagnosticEvent, EventSource, MemorySample,
    MemoryStore, MetricSource, ReaderLogSource,
};
use tokio::time::timeout;

struct QuietSource;

impl MetricSource for QuietSource {
    fn memory(&mut self) -> Option<MemorySample> {
        Some(MemorySample {
            resident_mb: 5,
            heap_used_mb: 5,
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

async fn next_event(
    feed: &mut devbot::core::diagnostics::Subscription<DiagnosticEvent>,
) -> DiagnosticEvent {
    timeout(Duration::from_secs(5), feed.recv())
        .await
        .expect("event within timeout")
        .expect("feed open")
}

#[tokio::test]
async fn test_engine_aggregates_every_source() {
    let engine = engine();
    let mut feed = engine.events().subscribe();

    engine
        .start_with_log_source(ReaderLogSource::from_text("F/libc: Fatal signal 11\n"))
        .unwrap();

    engine
        .crash()
        .record_fault(CrashEvent::new("caught at boundary", "worker", "at frame", None));
    engine.performance().report_slow_operation("layout", 250);
    engine.database().report_transaction_failure("constraint violated");
    engine.network().report_dns_failure("https://nowhere.invalid");

    let mut sources = Vec::new();
    for _ in 0..5 {
        sources.push(next_event(&mut feed).await.source());
    }
    for source in EventSource::ALL {
        assert!(sources.contains(&source), "missing {}", source);
    }

    assert_eq!(engine.crash().crash_history().len(), 1);
    assert_eq!(engine.recent_events(usize::MAX).len(), 5);

    engine.shutdown().await;
    assert!(!engine.is_monitoring());
}

#[tokio::test]
async fn test_events_before_start_are_replayed_once() {
    let engine = engine();
    engine.network().report_timeout("https://api.example.com", 1000);

    let mut feed = engine.events().subscribe();
    engine
        .start_with_log_source(ReaderLogSource::from_text(""))
        .unwrap();

    let event = next_event(&mut feed).await;
    assert_eq!(event.message(), "Network timeout after 1000ms");

    // Restart must not deliver the replayed event a second time
    engine.stop();
    engine
        .start_with_log_source(ReaderLogSource::from_text(""))
        .unwrap();
    engine.network().report_dns_failure("https://nowhere.invalid");

    let event = next_event(&mut feed).await;
    assert_eq!(event.message(), "DNS resolution failed");
    assert_eq!(engine.events_by_source(EventSource::Network).len(), 2);

    engine.shutdown().await;
}

#[tokio::test]
async fn test_export_contains_crash_history() {
    let engine = engine();
    let mut feed = engine.events().subscribe();
    engine
        .start_with_log_source(ReaderLogSource::from_text(""))
        .unwrap();

    engine
        .crash()
        .record_fault(CrashEvent::new("exported crash", "main", "at frame", None));
    next_event(&mut feed).await;

    let json = engine
        .export_diagnostics(Some(&[EventSource::Crash]), None)
        .unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();

    assert_eq!(value["total_events_in_export"], 1);
    assert_eq!(value["filtered_sources"][0], "crash");
    assert!(value["crash_history"][0]
        .as_str()
        .unwrap()
        .contains("exported crash"));

    engine.shutdown().await;
}
