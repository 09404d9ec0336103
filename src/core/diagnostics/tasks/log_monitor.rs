//! Live log stream monitoring.
//!
//! A [`LogSource`] yields a line-oriented reader (by default the stdout of a
//! `logcat` subprocess). The monitor task feeds every line to a
//! [`LogStreamParser`] and publishes each completed record.

use std::io::{self, Cursor};
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::broadcast;
use tokio::time::{Duration, Instant};

use super::TaskHandle;
use crate::core::diagnostics::bus::{BusCapacity, EventBus, EventStream};
use crate::core::diagnostics::events::LogError;
use crate::core::diagnostics::log_parser::LogStreamParser;
use crate::error::Result;

pub const DEFAULT_LOG_COMMAND: &str = "logcat";
pub const DEFAULT_MAX_LINES_PER_SECOND: u32 = 100;

const READ_BUFFER_SIZE: usize = 8192;
const RATE_WINDOW: Duration = Duration::from_secs(1);

/// Settings of the log stream monitor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogMonitorConfig {
    pub enabled: bool,
    pub command: String,
    pub args: Vec<String>,
    /// Only lines containing this text are parsed
    pub process_filter: Option<String>,
    /// `None` disables the budget
    pub max_lines_per_second: Option<u32>,
}

impl Default for LogMonitorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            command: DEFAULT_LOG_COMMAND.to_string(),
            args: vec!["-v".into(), "time".into(), "*:W".into()],
            process_filter: None,
            max_lines_per_second: Some(DEFAULT_MAX_LINES_PER_SECOND),
        }
    }
}

impl LogMonitorConfig {
    /// Default command restricted to one process id
    pub fn for_process(pid: u32) -> Self {
        Self {
            args: vec![
                "-v".into(),
                "time".into(),
                format!("--pid={}", pid),
                "*:W".into(),
            ],
            ..Self::default()
        }
    }
}

pub type LogReader = Box<dyn AsyncBufRead + Send + Unpin>;

/// Producer of the raw log stream
pub trait LogSource: Send + 'static {
    fn open(&mut self) -> io::Result<LogReader>;

    /// Stop the producer. Called once the monitor task ends.
    fn terminate(&mut self) {}
}

/// Log stream read from a subprocess's stdout
pub struct CommandLogSource {
    program: String,
    args: Vec<String>,
    child: Option<Child>,
}

impl CommandLogSource {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            child: None,
        }
    }

    pub fn from_config(config: &LogMonitorConfig) -> Self {
        Self::new(config.command.clone(), config.args.clone())
    }
}

impl LogSource for CommandLogSource {
    fn open(&mut self) -> io::Result<LogReader> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| io::Error::other("log command stdout was not captured"))?;

        log::debug!("Spawned log command '{}' {:?}", self.program, self.args);
        self.child = Some(child);
        Ok(Box::new(BufReader::with_capacity(READ_BUFFER_SIZE, stdout)))
    }

    fn terminate(&mut self) {
        if let Some(mut child) = self.child.take() {
            if let Err(e) = child.start_kill() {
                log::debug!("Log command already exited: {}", e);
            }
        }
    }
}

/// Log stream backed by an in-memory or caller-supplied reader
pub struct ReaderLogSource {
    reader: Option<LogReader>,
}

impl ReaderLogSource {
    pub fn new(reader: impl AsyncBufRead + Send + Unpin + 'static) -> Self {
        Self {
            reader: Some(Box::new(reader)),
        }
    }

    pub fn from_text(text: impl Into<String>) -> Self {
        Self::new(Cursor::new(text.into().into_bytes()))
    }
}

impl LogSource for ReaderLogSource {
    fn open(&mut self) -> io::Result<LogReader> {
        self.reader
            .take()
            .ok_or_else(|| io::Error::other("log reader already consumed"))
    }
}

/// Per-second line budget
#[derive(Debug)]
struct LineRateLimiter {
    max_per_window: Option<u32>,
    window_start: Instant,
    lines_in_window: u32,
}

impl LineRateLimiter {
    fn new(max_per_window: Option<u32>) -> Self {
        Self {
            max_per_window,
            window_start: Instant::now(),
            lines_in_window: 0,
        }
    }

    fn admit(&mut self, now: Instant) -> bool {
        let Some(max) = self.max_per_window else {
            return true;
        };

        if now.duration_since(self.window_start) >= RATE_WINDOW {
            self.window_start = now;
            self.lines_in_window = 0;
        }

        if self.lines_in_window >= max {
            return false;
        }
        self.lines_in_window += 1;
        true
    }
}

/// Turns a log stream into [`LogError`] records on its own bus
pub struct LogMonitor {
    config: LogMonitorConfig,
    bus: EventBus<LogError>,
    task: Mutex<Option<TaskHandle>>,
    skipped_lines: Arc<AtomicU64>,
}

impl LogMonitor {
    pub fn new(config: LogMonitorConfig) -> Self {
        Self::with_capacity(config, BusCapacity::LOG)
    }

    pub fn with_capacity(config: LogMonitorConfig, capacity: BusCapacity) -> Self {
        Self {
            config,
            bus: EventBus::ordered("log", capacity),
            task: Mutex::new(None),
            skipped_lines: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn config(&self) -> &LogMonitorConfig {
        &self.config
    }

    pub fn errors(&self) -> EventStream<LogError> {
        self.bus.stream()
    }

    /// Lines skipped by the per-second budget so far
    pub fn skipped_lines(&self) -> u64 {
        self.skipped_lines.load(Ordering::Relaxed)
    }

    /// Start reading the configured command
    pub fn start(&self) -> Result<()> {
        self.start_with_source(CommandLogSource::from_config(&self.config))
    }

    /// Start reading `source`. A no-op while a previous task is still running.
    pub fn start_with_source<S: LogSource>(&self, source: S) -> Result<()> {
        let mut task = self.task.lock();
        if task.as_ref().is_some_and(|t| !t.is_finished()) {
            return Ok(());
        }

        let bus = self.bus.clone();
        let parser = match &self.config.process_filter {
            Some(filter) => LogStreamParser::with_process_filter(filter.clone()),
            None => LogStreamParser::new(),
        };
        let limiter = LineRateLimiter::new(self.config.max_lines_per_second);
        let skipped = Arc::clone(&self.skipped_lines);

        *task = Some(TaskHandle::spawn("Log monitor", move |shutdown| {
            log_monitor_task(source, bus, parser, limiter, skipped, shutdown)
        })?);
        Ok(())
    }

    pub fn stop(&self) {
        if let Some(task) = self.task.lock().take() {
            task.stop();
        }
    }

    /// Stop and wait until the subprocess is terminated
    pub async fn shutdown(&self) {
        let task = self.task.lock().take();
        if let Some(task) = task {
            task.shutdown().await;
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.lock().as_ref().is_some_and(|t| !t.is_finished())
    }
}

impl Drop for LogMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn log_monitor_task<S: LogSource>(
    mut source: S,
    bus: EventBus<LogError>,
    mut parser: LogStreamParser,
    mut limiter: LineRateLimiter,
    skipped: Arc<AtomicU64>,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut reader = match source.open() {
        Ok(reader) => reader,
        Err(e) => {
            log::warn!("Failed to open log stream: {}", e);
            return;
        }
    };

    let mut buf = Vec::with_capacity(256);

    loop {
        buf.clear();

        tokio::select! {
            biased;

            _ = shutdown.recv() => {
                log::debug!("Log monitor shutting down");
                break;
            }
            read = reader.read_until(b'\n', &mut buf) => match read {
                Ok(0) => {
                    if let Some(record) = parser.finish() {
                        bus.publish(record);
                    }
                    log::debug!("Log stream ended");
                    break;
                }
                Ok(_) => {
                    if !limiter.admit(Instant::now()) {
                        skipped.fetch_add(1, Ordering::Relaxed);
                        continue;
                    }

                    let line = String::from_utf8_lossy(&buf);
                    let line = line.trim_end_matches(&['\n', '\r'][..]);
                    if let Some(record) = parser.feed(line) {
                        bus.publish(record);
                    }
                }
                Err(e) => {
                    log::warn!("Error reading log stream: {}", e);
                    break;
                }
            }
        }
    }

    source.terminate();
}
