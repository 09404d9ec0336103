// Command handlers module
pub mod completions;
pub mod config;
pub mod crashes;
pub mod sample;
pub mod version;
pub mod watch;

// Re-exports for cleaner imports
pub use version::execute as version;

use anyhow::{Context, Result};
use tokio::runtime::Runtime;

/// Runtime for commands that drive the async monitors
pub(crate) fn build_runtime() -> Result<Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .thread_name("devbot-worker")
        .build()
        .context("Failed to start async runtime")
}
