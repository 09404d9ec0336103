//! Database issue reporting.

use super::bus::{BusCapacity, EventBus, EventStream};
use super::events::{DatabaseEvent, DatabaseIssueType};
use super::thresholds::evaluate_slow_query;

pub struct DatabaseMonitor {
    bus: EventBus<DatabaseEvent>,
}

impl Default for DatabaseMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl DatabaseMonitor {
    pub fn new() -> Self {
        Self::with_capacity(BusCapacity::DATABASE)
    }

    pub fn with_capacity(capacity: BusCapacity) -> Self {
        Self {
            bus: EventBus::ordered("database", capacity),
        }
    }

    pub fn issues(&self) -> EventStream<DatabaseEvent> {
        self.bus.stream()
    }

    /// Reported only above the slow query threshold
    pub fn report_slow_query(&self, query: &str, duration_ms: u64) {
        if let Some(event) = evaluate_slow_query(query, duration_ms) {
            self.bus.publish(event);
        }
    }

    pub fn report_lock_contention(&self, table: &str, wait_ms: u64) {
        self.bus.publish(
            DatabaseEvent::new(
                format!("Lock contention on table '{}' - waited {}ms", table, wait_ms),
                DatabaseIssueType::LockContention,
            )
            .with_duration(wait_ms),
        );
    }

    pub fn report_migration_failure(&self, error: &str) {
        self.bus.publish(DatabaseEvent::new(
            format!("Database migration failed: {}", error),
            DatabaseIssueType::MigrationFailure,
        ));
    }

    pub fn report_cursor_leak(&self, query: &str) {
        self.bus.publish(
            DatabaseEvent::new("Potential cursor leak detected", DatabaseIssueType::CursorLeak)
                .with_query(query),
        );
    }

    pub fn report_transaction_failure(&self, error: &str) {
        self.bus.publish(DatabaseEvent::new(
            format!("Transaction failed: {}", error),
            DatabaseIssueType::TransactionFailure,
        ));
    }
}
