//! Rolling crash history kept in a key-value store.
//!
//! The history is a text blob of at most [`MAX_CRASH_ENTRIES`] entries,
//! newest first. Each entry has the layout
//!
//! ```text
//! [timestamp_ms] threadName
//! message
//! stackTrace
//! ---
//! ```
//!
//! The most recent entry and its timestamp are also stored on their own so
//! the last crash can be read without parsing the blob.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;

use super::events::CrashEvent;
use super::store::KeyValueStore;
use crate::error::Result;

pub const MAX_CRASH_ENTRIES: usize = 10;

pub const RECENT_CRASHES_KEY: &str = "recent_crashes";
pub const LAST_CRASH_KEY: &str = "last_crash";
pub const LAST_CRASH_TIME_KEY: &str = "last_crash_time";

const ENTRY_TERMINATOR: &str = "---";

/// Format one crash as a history entry
pub fn format_entry(event: &CrashEvent) -> String {
    format!(
        "[{}] {}\n{}\n{}\n{}",
        event.timestamp.timestamp_millis(),
        event.thread_name,
        escape_terminator(&event.message),
        escape_terminator(event.stack_trace.trim_end()),
        ENTRY_TERMINATOR
    )
}

// A literal terminator line inside a field would split the entry on reload
fn escape_terminator(text: &str) -> String {
    text.lines()
        .map(|line| if line == ENTRY_TERMINATOR { "- - -" } else { line })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Split a stored blob back into its entries, newest first
pub fn split_entries(blob: &str) -> Vec<String> {
    let mut entries = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for line in blob.lines() {
        if line == ENTRY_TERMINATOR {
            if !current.is_empty() {
                current.push(ENTRY_TERMINATOR);
                entries.push(current.join("\n"));
            }
            current.clear();
        } else {
            current.push(line);
        }
    }

    entries
}

/// Bounded newest-first crash ring
pub struct CrashHistoryRing {
    store: Arc<dyn KeyValueStore>,
    capacity: usize,
    write_lock: Mutex<()>,
}

impl CrashHistoryRing {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self::with_capacity(store, MAX_CRASH_ENTRIES)
    }

    pub fn with_capacity(store: Arc<dyn KeyValueStore>, capacity: usize) -> Self {
        Self {
            store,
            capacity: capacity.max(1),
            write_lock: Mutex::new(()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Prepend a crash and trim the ring to capacity
    pub fn push(&self, event: &CrashEvent) -> Result<()> {
        let _guard = self.write_lock.lock();
        self.write_entry(event)
    }

    /// Like [`push`](Self::push), but gives up after `timeout` when another
    /// write holds the ring. Returns `Ok(false)` when the crash was skipped.
    pub fn try_push_for(&self, event: &CrashEvent, timeout: Duration) -> Result<bool> {
        let Some(_guard) = self.write_lock.try_lock_for(timeout) else {
            return Ok(false);
        };
        self.write_entry(event)?;
        Ok(true)
    }

    fn write_entry(&self, event: &CrashEvent) -> Result<()> {
        let entry = format_entry(event);
        let existing = self
            .store
            .get_string(RECENT_CRASHES_KEY)
            .unwrap_or_else(|e| {
                log::warn!("Crash history unreadable, starting a new one: {}", e);
                None
            })
            .unwrap_or_default();

        let mut entries = Vec::with_capacity(self.capacity);
        entries.push(entry.clone());
        entries.extend(split_entries(&existing));
        entries.truncate(self.capacity);

        self.store.put_all(vec![
            (RECENT_CRASHES_KEY.to_string(), Value::String(entries.join("\n"))),
            (LAST_CRASH_KEY.to_string(), Value::String(entry)),
            (
                LAST_CRASH_TIME_KEY.to_string(),
                Value::from(event.timestamp.timestamp_millis()),
            ),
        ])
    }

    /// All entries, newest first
    pub fn entries(&self) -> Result<Vec<String>> {
        Ok(self
            .store
            .get_string(RECENT_CRASHES_KEY)?
            .map(|blob| split_entries(&blob))
            .unwrap_or_default())
    }

    pub fn last_entry(&self) -> Result<Option<String>> {
        self.store.get_string(LAST_CRASH_KEY)
    }

    /// Epoch milliseconds of the last recorded crash
    pub fn last_timestamp(&self) -> Result<Option<i64>> {
        self.store.get_i64(LAST_CRASH_TIME_KEY)
    }

    pub fn clear(&self) -> Result<()> {
        let _guard = self.write_lock.lock();
        self.store.clear()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::diagnostics::store::MemoryStore;

    fn crash(message: &str) -> CrashEvent {
        CrashEvent::new(message, "main", "at frame_one\nat frame_two\n", None)
    }

    #[test]
    fn test_entry_layout() {
        let event = crash("boom");
        let entry = format_entry(&event);
        let expected = format!(
            "[{}] main\nboom\nat frame_one\nat frame_two\n---",
            event.timestamp.timestamp_millis()
        );
        assert_eq!(entry, expected);
    }

    #[test]
    fn test_split_entries_roundtrip() {
        let first = format_entry(&crash("first"));
        let second = format_entry(&crash("second"));
        let blob = format!("{}\n{}", second, first);
        assert_eq!(split_entries(&blob), vec![second, first]);
    }

    #[test]
    fn test_terminator_inside_message_is_escaped() {
        let event = CrashEvent::new("a\n---\nb", "main", "", None);
        let entry = format_entry(&event);
        assert_eq!(split_entries(&entry).len(), 1);
    }

    #[test]
    fn test_push_keeps_newest_first() {
        let ring = CrashHistoryRing::new(Arc::new(MemoryStore::new()));
        ring.push(&crash("older")).unwrap();
        ring.push(&crash("newer")).unwrap();

        let entries = ring.entries().unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries[0].contains("\nnewer\n"));
        assert!(entries[1].contains("\nolder\n"));
        assert_eq!(ring.last_entry().unwrap(), Some(entries[0].clone()));
        assert!(ring.last_timestamp().unwrap().is_some());
    }

    #[test]
    fn test_clear_empties_ring() {
        let ring = CrashHistoryRing::new(Arc::new(MemoryStore::new()));
        ring.push(&crash("gone")).unwrap();
        ring.clear().unwrap();
        assert!(ring.entries().unwrap().is_empty());
        assert!(ring.last_entry().unwrap().is_none());
    }
}
