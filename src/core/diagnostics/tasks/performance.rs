//! Performance monitoring: periodic memory and UI thread sampling plus
//! report entry points for slow operations and frame timing.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sysinfo::{MemoryRefreshKind, Pid, ProcessRefreshKind, ProcessesToUpdate, RefreshKind, System};
use tokio::sync::broadcast;
use tokio::time::{interval, Duration, MissedTickBehavior};

use super::TaskHandle;
use crate::core::diagnostics::bus::{BusCapacity, EventBus, EventStream};
use crate::core::diagnostics::events::{PerformanceEvent, PerformanceMetric};
use crate::core::diagnostics::thresholds::{
    evaluate_frame_drop, evaluate_memory_pressure, evaluate_memory_usage,
    evaluate_slow_operation, evaluate_thread_state, PerformanceThresholds, ThreadState,
    DEFAULT_SLOW_OPERATION_THRESHOLD_MS,
};
use crate::error::Result;

pub const SAMPLING_INTERVAL: Duration = Duration::from_secs(1);

const BYTES_PER_MB: u64 = 1024 * 1024;
const NANOS_PER_MS: u64 = 1_000_000;
const JANK_FRAMES_IN_A_ROW: u32 = 2;

/// One memory reading, in megabytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MemorySample {
    pub resident_mb: u64,
    pub heap_used_mb: u64,
    pub heap_max_mb: u64,
}

/// Where the sampling task reads its metrics from
pub trait MetricSource: Send + 'static {
    fn memory(&mut self) -> Option<MemorySample>;

    fn main_thread_state(&mut self) -> Option<ThreadState> {
        None
    }
}

/// Process and system memory read through `sysinfo`.
///
/// Heap figures are the machine's used and total RAM. Thread state is not
/// observable this way and is never reported.
pub struct SysinfoMetricSource {
    system: System,
    pid: Option<Pid>,
}

impl SysinfoMetricSource {
    pub fn new() -> Self {
        let pid = sysinfo::get_current_pid()
            .map_err(|e| log::warn!("Could not determine current pid: {}", e))
            .ok();
        Self::for_pid(pid)
    }

    pub fn for_pid(pid: Option<Pid>) -> Self {
        let refresh_kind =
            RefreshKind::nothing().with_memory(MemoryRefreshKind::nothing().with_ram());

        Self {
            system: System::new_with_specifics(refresh_kind),
            pid,
        }
    }

    fn resident_bytes(&mut self) -> u64 {
        let Some(pid) = self.pid else {
            return 0;
        };

        self.system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[pid]),
            true,
            ProcessRefreshKind::nothing().with_memory(),
        );
        self.system.process(pid).map(|p| p.memory()).unwrap_or(0)
    }
}

impl Default for SysinfoMetricSource {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricSource for SysinfoMetricSource {
    fn memory(&mut self) -> Option<MemorySample> {
        self.system.refresh_memory();
        let total = self.system.total_memory();
        if total == 0 {
            return None;
        }

        Some(MemorySample {
            resident_mb: self.resident_bytes() / BYTES_PER_MB,
            heap_used_mb: self.system.used_memory() / BYTES_PER_MB,
            heap_max_mb: total / BYTES_PER_MB,
        })
    }
}

/// Turns frame callback timestamps into frame drop and jank events
#[derive(Debug)]
pub struct FrameTracker {
    thresholds: PerformanceThresholds,
    last_frame_nanos: Option<u64>,
    dropped_total: u64,
    consecutive_janky: u32,
}

impl FrameTracker {
    pub fn new(thresholds: PerformanceThresholds) -> Self {
        Self {
            thresholds,
            last_frame_nanos: None,
            dropped_total: 0,
            consecutive_janky: 0,
        }
    }

    /// Record the timestamp of a rendered frame
    pub fn record(&mut self, frame_time_nanos: u64) -> Vec<PerformanceEvent> {
        let mut events = Vec::new();
        let Some(last) = self.last_frame_nanos.replace(frame_time_nanos) else {
            return events;
        };

        let frame_ms = frame_time_nanos.saturating_sub(last) / NANOS_PER_MS;
        let frame_budget = self.thresholds.frame_time_threshold_ms.max(1);

        if frame_ms > frame_budget {
            let dropped = frame_ms / frame_budget - 1;
            self.dropped_total += dropped;

            if dropped > 0 && dropped >= self.thresholds.frame_drop_threshold {
                events.push(PerformanceEvent::new(
                    format!(
                        "Frame drop detected: {} frames dropped ({}ms frame time)",
                        dropped, frame_ms
                    ),
                    PerformanceMetric::FrameDrop,
                    dropped,
                    self.thresholds.frame_drop_threshold,
                ));
            }
        }

        if frame_ms > self.thresholds.jank_threshold_ms {
            self.consecutive_janky += 1;
            if self.consecutive_janky >= JANK_FRAMES_IN_A_ROW {
                events.push(PerformanceEvent::new(
                    format!(
                        "UI jank detected: {}ms frame time (threshold: {}ms)",
                        frame_ms, self.thresholds.jank_threshold_ms
                    ),
                    PerformanceMetric::UiThreadBlock,
                    frame_ms,
                    self.thresholds.jank_threshold_ms,
                ));
            }
        } else {
            self.consecutive_janky = 0;
        }

        events
    }

    pub fn dropped_frames(&self) -> u64 {
        self.dropped_total
    }

    pub fn reset(&mut self) {
        self.last_frame_nanos = None;
        self.dropped_total = 0;
        self.consecutive_janky = 0;
    }
}

type SharedSource = Arc<Mutex<Box<dyn MetricSource>>>;

pub struct PerformanceMonitor {
    thresholds: PerformanceThresholds,
    source: SharedSource,
    bus: EventBus<PerformanceEvent>,
    frames: Mutex<FrameTracker>,
    task: Mutex<Option<TaskHandle>>,
}

impl PerformanceMonitor {
    pub fn new(source: impl MetricSource, thresholds: PerformanceThresholds) -> Self {
        Self::with_capacity(source, thresholds, BusCapacity::PERFORMANCE)
    }

    pub fn with_capacity(
        source: impl MetricSource,
        thresholds: PerformanceThresholds,
        capacity: BusCapacity,
    ) -> Self {
        Self {
            frames: Mutex::new(FrameTracker::new(thresholds.clone())),
            thresholds,
            source: Arc::new(Mutex::new(Box::new(source))),
            bus: EventBus::ordered("performance", capacity),
            task: Mutex::new(None),
        }
    }

    pub fn with_sysinfo(thresholds: PerformanceThresholds) -> Self {
        Self::new(SysinfoMetricSource::new(), thresholds)
    }

    pub fn thresholds(&self) -> &PerformanceThresholds {
        &self.thresholds
    }

    pub fn issues(&self) -> EventStream<PerformanceEvent> {
        self.bus.stream()
    }

    /// Start sampling every [`SAMPLING_INTERVAL`]. A no-op while running.
    pub fn start(&self) -> Result<()> {
        let mut task = self.task.lock();
        if task.as_ref().is_some_and(|t| !t.is_finished()) {
            return Ok(());
        }

        let source = Arc::clone(&self.source);
        let bus = self.bus.clone();
        let thresholds = self.thresholds.clone();

        *task = Some(TaskHandle::spawn("Performance monitor", move |shutdown| {
            performance_task(source, bus, thresholds, shutdown)
        })?);
        Ok(())
    }

    pub fn stop(&self) {
        if let Some(task) = self.task.lock().take() {
            task.stop();
        }
        self.frames.lock().reset();
    }

    pub async fn shutdown(&self) {
        let task = self.task.lock().take();
        if let Some(task) = task {
            task.shutdown().await;
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.lock().as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Run one sampling pass immediately and publish what it finds
    pub fn check_once(&self) -> Vec<PerformanceEvent> {
        sample_and_publish(&self.source, &self.bus, &self.thresholds)
    }

    pub fn report_slow_operation(&self, operation: &str, duration_ms: u64) {
        self.report_slow_operation_with_threshold(
            operation,
            duration_ms,
            DEFAULT_SLOW_OPERATION_THRESHOLD_MS,
        );
    }

    pub fn report_slow_operation_with_threshold(
        &self,
        operation: &str,
        duration_ms: u64,
        threshold_ms: u64,
    ) {
        if let Some(event) = evaluate_slow_operation(operation, duration_ms, threshold_ms) {
            self.bus.publish(event);
        }
    }

    pub fn report_frame_drop(&self, dropped_frames: u64) {
        if let Some(event) = evaluate_frame_drop(dropped_frames) {
            self.bus.publish(event);
        }
    }

    /// Feed a frame timestamp (nanoseconds, monotonic) to the frame tracker
    pub fn record_frame(&self, frame_time_nanos: u64) {
        let events = self.frames.lock().record(frame_time_nanos);
        for event in events {
            self.bus.publish(event);
        }
    }

    pub fn dropped_frames(&self) -> u64 {
        self.frames.lock().dropped_frames()
    }

    pub fn current_memory(&self) -> Option<MemorySample> {
        self.source.lock().memory()
    }
}

impl Drop for PerformanceMonitor {
    fn drop(&mut self) {
        if let Some(task) = self.task.get_mut().take() {
            task.stop();
        }
    }
}

/// Evaluate one round of samples. Each metric yields at most one event.
fn check_metrics(
    source: &mut dyn MetricSource,
    thresholds: &PerformanceThresholds,
) -> Vec<PerformanceEvent> {
    let mut events = Vec::new();

    if let Some(sample) = source.memory() {
        events.extend(evaluate_memory_usage(
            sample.resident_mb,
            thresholds.memory_threshold_mb,
        ));
        events.extend(evaluate_memory_pressure(
            sample.heap_used_mb,
            sample.heap_max_mb,
            thresholds.memory_percentage_threshold,
        ));
    }

    if let Some(state) = source.main_thread_state() {
        events.extend(evaluate_thread_state(state));
    }

    events
}

fn sample_and_publish(
    source: &SharedSource,
    bus: &EventBus<PerformanceEvent>,
    thresholds: &PerformanceThresholds,
) -> Vec<PerformanceEvent> {
    let events = {
        let mut source = source.lock();
        check_metrics(source.as_mut(), thresholds)
    };

    for event in &events {
        log::debug!("Performance issue: {}", event.message);
        bus.publish(event.clone());
    }
    events
}

async fn performance_task(
    source: SharedSource,
    bus: EventBus<PerformanceEvent>,
    thresholds: PerformanceThresholds,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut ticker = interval(SAMPLING_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;

            _ = shutdown.recv() => {
                log::debug!("Performance monitor shutting down");
                break;
            }
            _ = ticker.tick() => {
                sample_and_publish(&source, &bus, &thresholds);
            }
        }
    }
}
