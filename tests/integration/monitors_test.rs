use std::time::Duration;

use devbot::core::diagnostics::{
    DatabaseIssueType, DatabaseMonitor, LogMonitor, LogMonitorConfig, MemorySample, MetricSource,
    NetworkErrorType, NetworkMonitor, PerformanceMetric, PerformanceMonitor,
    PerformanceThresholds, ReaderLogSource, Severity,
};
use tokio::time::timeout;

const LOGCAT: &str = "\
10-17 09:15:02.114 I/ActivityManager( 1200): Start proc 4242
10-17 09:15:02.200 E/AndroidRuntime( 4242): FATAL EXCEPTION: main
\tat com.example.Main.run(Main.kt:12) 4242
10-17 09:15:02.300 E/Other( 999): not ours
10-17 09:15:02.400 W/Choreographer( 4242): Skipped 40 frames
";

#[tokio::test]
async fn test_log_monitor_applies_process_filter() {
    let config = LogMonitorConfig {
        process_filter: Some("4242".to_string()),
        max_lines_per_second: None,
        ..LogMonitorConfig::default()
    };
    let monitor = LogMonitor::new(config);
    let mut errors = monitor.errors().subscribe();

    monitor
        .start_with_source(ReaderLogSource::from_text(LOGCAT))
        .unwrap();

    let first = timeout(Duration::from_secs(5), errors.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(first.severity, Severity::High);
    assert_eq!(first.message, "FATAL EXCEPTION: main");
    assert!(first.stack_trace.unwrap().contains("Main.kt:12"));

    let second = timeout(Duration::from_secs(5), errors.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(second.severity, Severity::Medium);
    assert_eq!(second.message, "Skipped 40 frames");

    monitor.shutdown().await;
    assert!(!monitor.is_running());
    assert_eq!(monitor.errors().replay().len(), 2);
}

struct GrowingSource {
    resident_mb: u64,
}

impl MetricSource for GrowingSource {
    fn memory(&mut self) -> Option<MemorySample> {
        self.resident_mb += 100;
        Some(MemorySample {
            resident_mb: self.resident_mb,
            heap_used_mb: 10,
            heap_max_mb: 100,
        })
    }
}

#[tokio::test(start_paused = true)]
async fn test_sampling_is_paced_once_per_second() {
    // 100, 200, 300 stay at or under the ceiling; 400 onwards fire
    let monitor = PerformanceMonitor::new(
        GrowingSource { resident_mb: 0 },
        PerformanceThresholds::default(),
    );
    let mut issues = monitor.issues().subscribe();

    monitor.start().unwrap();
    tokio::time::sleep(Duration::from_millis(5_500)).await;
    monitor.shutdown().await;

    let events = issues.drain();
    assert!(
        (2..=3).contains(&events.len()),
        "unexpected sample count: {}",
        events.len()
    );
    assert!(events
        .iter()
        .all(|e| e.metric == PerformanceMetric::MemoryUsage && e.value > 300));
}

#[test]
fn test_frame_callbacks() {
    let monitor = PerformanceMonitor::new(
        GrowingSource { resident_mb: 0 },
        PerformanceThresholds::default(),
    );
    let ms = 1_000_000u64;

    monitor.record_frame(0);
    monitor.record_frame(16 * ms);
    monitor.record_frame(16 * ms + 80 * ms);

    assert_eq!(monitor.dropped_frames(), 4);
    let replay = monitor.issues().replay();
    assert_eq!(replay.len(), 1);
    assert_eq!(
        replay[0].message,
        "Frame drop detected: 4 frames dropped (80ms frame time)"
    );

    monitor.report_frame_drop(5);
    monitor.report_frame_drop(6);
    assert_eq!(monitor.issues().replay().len(), 2);
}

#[test]
fn test_database_reports() {
    let monitor = DatabaseMonitor::new();
    let mut issues = monitor.issues().subscribe();

    monitor.report_slow_query("SELECT * FROM users", 100);
    monitor.report_slow_query("SELECT * FROM users", 101);
    monitor.report_lock_contention("users", 40);
    monitor.report_migration_failure("no such column");
    monitor.report_cursor_leak("SELECT 1");
    monitor.report_transaction_failure("disk full");

    let kinds: Vec<DatabaseIssueType> = issues.drain().into_iter().map(|e| e.kind).collect();
    assert_eq!(
        kinds,
        vec![
            DatabaseIssueType::SlowQuery,
            DatabaseIssueType::LockContention,
            DatabaseIssueType::MigrationFailure,
            DatabaseIssueType::CursorLeak,
            DatabaseIssueType::TransactionFailure,
        ]
    );
}

#[test]
fn test_network_reports() {
    let monitor = NetworkMonitor::new();

    monitor.report_timeout("https://api.example.com", 3000);
    monitor.report_connection_failed("https://api.example.com", "refused");
    monitor.report_http_error("https://api.example.com/items", 503);
    monitor.report_ssl_error("https://api.example.com", "expired certificate");
    monitor.report_dns_failure("https://nowhere.invalid");

    let failures = monitor.failures().replay();
    assert_eq!(failures.len(), 5);
    assert_eq!(failures[0].message, "Network timeout after 3000ms");
    assert_eq!(failures[2].status_code, Some(503));
    assert_eq!(failures[3].message, "SSL/TLS error: expired certificate");
    assert_eq!(failures[4].kind, NetworkErrorType::DnsFailure);
}
