//! Threshold evaluation shared by the performance, database and network monitors.
//!
//! Every function here is pure: a sample is compared with its threshold and
//! an event is built on breach. Comparisons are strictly greater-than, and
//! there is no hysteresis, so callers must pace how often they sample.

use serde::{Deserialize, Serialize};

use super::events::{DatabaseEvent, DatabaseIssueType, PerformanceEvent, PerformanceMetric};

pub const SLOW_QUERY_THRESHOLD_MS: u64 = 100;
pub const DEFAULT_SLOW_OPERATION_THRESHOLD_MS: u64 = 100;
pub const FRAME_DROP_THRESHOLD: u64 = 5;

/// Thresholds used by the performance monitor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceThresholds {
    pub memory_threshold_mb: u64,
    pub memory_percentage_threshold: u64,
    pub frame_drop_threshold: u64, // dropped frames within one frame callback
    pub frame_time_threshold_ms: u64,
    pub jank_threshold_ms: u64,
}

impl Default for PerformanceThresholds {
    fn default() -> Self {
        Self {
            memory_threshold_mb: 300,
            memory_percentage_threshold: 85,
            frame_drop_threshold: 3,
            frame_time_threshold_ms: 16,
            jank_threshold_ms: 100,
        }
    }
}

/// Observed state of the main (UI) thread
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ThreadState {
    Runnable,
    Blocked,
    Waiting,
    TimedWaiting,
    Terminated,
}

impl ThreadState {
    pub fn is_stalled(&self) -> bool {
        matches!(self, ThreadState::Blocked | ThreadState::Waiting)
    }
}

/// Strict breach check: equal to the threshold does not fire
pub fn exceeds(sample: u64, threshold: u64) -> bool {
    sample > threshold
}

/// Generic evaluation of one sample against its threshold
pub fn evaluate(sample: u64, threshold: u64, metric: PerformanceMetric) -> Option<PerformanceEvent> {
    if !exceeds(sample, threshold) {
        return None;
    }

    let message = match metric {
        PerformanceMetric::MemoryUsage => format!(
            "High memory usage detected: {}MB (threshold: {}MB)",
            sample, threshold
        ),
        PerformanceMetric::UiThreadBlock => {
            format!("UI thread blocked for {}ms (threshold: {}ms)", sample, threshold)
        }
        PerformanceMetric::FrameDrop => format!("Frame drop detected: {} frames", sample),
    };

    Some(PerformanceEvent::new(message, metric, sample, threshold))
}

pub fn evaluate_slow_query(query: &str, duration_ms: u64) -> Option<DatabaseEvent> {
    if !exceeds(duration_ms, SLOW_QUERY_THRESHOLD_MS) {
        return None;
    }

    Some(
        DatabaseEvent::new(
            format!(
                "Slow query: {}ms (threshold: {}ms)",
                duration_ms, SLOW_QUERY_THRESHOLD_MS
            ),
            DatabaseIssueType::SlowQuery,
        )
        .with_query(query)
        .with_duration(duration_ms),
    )
}

/// Resident memory of the process above the configured ceiling
pub fn evaluate_memory_usage(resident_mb: u64, threshold_mb: u64) -> Option<PerformanceEvent> {
    evaluate(resident_mb, threshold_mb, PerformanceMetric::MemoryUsage)
}

/// Share of the available heap in use above the configured percentage
pub fn evaluate_memory_pressure(
    used_mb: u64,
    max_mb: u64,
    percentage_threshold: u64,
) -> Option<PerformanceEvent> {
    if max_mb == 0 {
        return None;
    }

    let percentage = used_mb * 100 / max_mb;
    if !exceeds(percentage, percentage_threshold) {
        return None;
    }

    Some(PerformanceEvent::new(
        format!(
            "Memory pressure: {}% used ({}MB / {}MB)",
            percentage, used_mb, max_mb
        ),
        PerformanceMetric::MemoryUsage,
        percentage,
        percentage_threshold,
    ))
}

pub fn evaluate_thread_state(state: ThreadState) -> Option<PerformanceEvent> {
    if !state.is_stalled() {
        return None;
    }

    Some(PerformanceEvent::new(
        format!("Main thread observed in {:?} state", state),
        PerformanceMetric::UiThreadBlock,
        1,
        0,
    ))
}

pub fn evaluate_frame_drop(dropped_frames: u64) -> Option<PerformanceEvent> {
    if !exceeds(dropped_frames, FRAME_DROP_THRESHOLD) {
        return None;
    }

    Some(PerformanceEvent::new(
        format!("Frame drop detected: {} frames", dropped_frames),
        PerformanceMetric::FrameDrop,
        dropped_frames,
        FRAME_DROP_THRESHOLD,
    ))
}

pub fn evaluate_slow_operation(
    operation: &str,
    duration_ms: u64,
    threshold_ms: u64,
) -> Option<PerformanceEvent> {
    if !exceeds(duration_ms, threshold_ms) {
        return None;
    }

    Some(PerformanceEvent::new(
        format!(
            "{} took {}ms (threshold: {}ms)",
            operation, duration_ms, threshold_ms
        ),
        PerformanceMetric::UiThreadBlock,
        duration_ms,
        threshold_ms,
    ))
}
