//! Long-lived monitor tasks.
//!
//! Each monitor runs in its own tokio task and stops through a broadcast
//! shutdown channel, checked with priority over new input.

pub mod log_monitor;
pub mod performance;

pub use log_monitor::{
    CommandLogSource, LogMonitor, LogMonitorConfig, LogReader, LogSource, ReaderLogSource,
};
pub use performance::{
    FrameTracker, MemorySample, MetricSource, PerformanceMonitor, SysinfoMetricSource,
};

use std::future::Future;

use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::error::{DevbotError, Result};

/// A spawned monitor task and its shutdown switch
pub(crate) struct TaskHandle {
    shutdown: broadcast::Sender<()>,
    join: JoinHandle<()>,
}

impl TaskHandle {
    /// Spawn `task` on the current tokio runtime
    pub(crate) fn spawn<F, Fut>(name: &str, task: F) -> Result<Self>
    where
        F: FnOnce(broadcast::Receiver<()>) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let runtime = Handle::try_current().map_err(|e| {
            DevbotError::runtime(format!("{} must be started inside a tokio runtime: {}", name, e))
        })?;

        let (shutdown, shutdown_rx) = broadcast::channel(1);
        let join = runtime.spawn(task(shutdown_rx));
        log::debug!("{} task started", name);

        Ok(Self { shutdown, join })
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Signal shutdown; the task exits at its next check
    pub(crate) fn stop(self) {
        let _ = self.shutdown.send(());
    }

    /// Signal shutdown and wait for the task to exit
    pub(crate) async fn shutdown(self) {
        let _ = self.shutdown.send(());
        if let Err(e) = self.join.await {
            log::warn!("Monitor task ended abnormally: {}", e);
        }
    }
}
