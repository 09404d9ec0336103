use std::panic;
use std::sync::Arc;

use devbot::core::diagnostics::history::{split_entries, MAX_CRASH_ENTRIES};
use devbot::core::diagnostics::{
    CrashEvent, CrashHistoryRing, CrashInterceptor, JsonFileStore,
};
use tempfile::TempDir;

fn file_history(dir: &TempDir) -> CrashHistoryRing {
    CrashHistoryRing::new(Arc::new(JsonFileStore::new(dir.path().join("crashes.json"))))
}

#[test]
fn test_history_keeps_ten_newest_first() {
    let temp_dir = TempDir::new().unwrap();
    let history = file_history(&temp_dir);

    for i in 0..15 {
        let event = CrashEvent::new(format!("crash {}", i), "main", "at frame\n", None);
        history.push(&event).unwrap();
    }

    let entries = history.entries().unwrap();
    assert_eq!(entries.len(), MAX_CRASH_ENTRIES);
    assert!(entries[0].contains("crash 14"));
    assert!(entries[9].contains("crash 5"));
    assert!(entries.iter().all(|e| !e.contains("crash 4\n")));
    assert!(history.last_entry().unwrap().unwrap().contains("crash 14"));
}

#[test]
fn test_history_survives_reopen() {
    let temp_dir = TempDir::new().unwrap();

    let event = CrashEvent::new("index out of bounds", "worker-1", "at a\nat b", None);
    file_history(&temp_dir).push(&event).unwrap();

    let reopened = file_history(&temp_dir);
    let entries = reopened.entries().unwrap();
    assert_eq!(entries.len(), 1);
    assert!(entries[0].starts_with(&format!("[{}] worker-1\n", event.timestamp.timestamp_millis())));
    assert!(entries[0].ends_with("at a\nat b\n---"));
    assert_eq!(
        reopened.last_timestamp().unwrap(),
        Some(event.timestamp.timestamp_millis())
    );

    reopened.clear().unwrap();
    assert!(file_history(&temp_dir).entries().unwrap().is_empty());
}

#[test]
fn test_terminator_inside_message_does_not_split_entry() {
    let temp_dir = TempDir::new().unwrap();
    let history = file_history(&temp_dir);

    history
        .push(&CrashEvent::new("before\n---\nafter", "main", "at frame", None))
        .unwrap();

    let entries = history.entries().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(split_entries(&entries.join("\n")).len(), 1);
}

#[test]
fn test_interceptor_records_caught_panic() {
    let temp_dir = TempDir::new().unwrap();
    let interceptor = CrashInterceptor::new(file_history(&temp_dir));
    let mut crashes = interceptor.crashes().subscribe();

    interceptor.install();
    let result = panic::catch_unwind(|| panic!("integration boom"));
    interceptor.uninstall();

    assert!(result.is_err());
    let event = crashes.try_recv().unwrap();
    assert_eq!(event.message, "integration boom");
    assert!(event.location.is_some());

    let last = interceptor.get_last_crash().unwrap();
    assert!(last.contains("integration boom"));
    assert_eq!(interceptor.crash_history().len(), 1);

    interceptor.clear_history();
    assert!(interceptor.get_last_crash().is_none());
}
