//! Process-wide panic interception with handler chaining.
//!
//! Every installed [`CrashInterceptor`] is registered in one process-wide
//! registry guarded by a single mutex. The first install captures the
//! currently registered panic hook and replaces it with a dispatcher that
//! lets each registered interceptor record the panic (event bus and crash
//! history) and then always calls the captured hook, so the default behavior
//! (printing, aborting) still happens. Interceptors may uninstall in any
//! order; the captured hook is put back once the last one is gone.

use std::any::Any;
use std::backtrace::Backtrace;
use std::panic::{self, PanicHookInfo};
use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::Lazy;
use parking_lot::Mutex;

use super::bus::{BusCapacity, EventBus, EventStream};
use super::events::CrashEvent;
use super::history::CrashHistoryRing;

pub const UNKNOWN_CRASH_MESSAGE: &str = "Unknown crash";
const UNNAMED_THREAD: &str = "<unnamed>";

// Bounded waits inside the hook: the panicking thread may already hold
// these locks
const REGISTRY_WAIT: Duration = Duration::from_millis(100);
const HISTORY_WAIT: Duration = Duration::from_millis(250);

type PanicHook = dyn Fn(&PanicHookInfo<'_>) + Send + Sync + 'static;

#[derive(Default)]
struct HookRegistry {
    recorders: Vec<Arc<CrashRecorder>>,
    previous: Option<Arc<PanicHook>>,
}

impl HookRegistry {
    fn contains(&self, recorder: &Arc<CrashRecorder>) -> bool {
        self.recorders.iter().any(|r| Arc::ptr_eq(r, recorder))
    }
}

static HOOK_REGISTRY: Lazy<Mutex<HookRegistry>> =
    Lazy::new(|| Mutex::new(HookRegistry::default()));

fn dispatch_panic(info: &PanicHookInfo<'_>, previous: &PanicHook) {
    let recorders = match HOOK_REGISTRY.try_lock_for(REGISTRY_WAIT) {
        Some(registry) => registry.recorders.clone(),
        None => {
            log::warn!("Crash handler registry busy, panic not recorded");
            Vec::new()
        }
    };

    for recorder in &recorders {
        recorder.record_panic(info);
    }
    previous(info);
}

/// Records crashes to the bus and the persistent ring
struct CrashRecorder {
    bus: EventBus<CrashEvent>,
    history: CrashHistoryRing,
}

impl CrashRecorder {
    // Must not panic: a panic inside the hook aborts the process
    fn record_panic(&self, info: &PanicHookInfo<'_>) {
        let thread = std::thread::current();
        let thread_name = thread.name().unwrap_or(UNNAMED_THREAD).to_string();
        let message =
            panic_message(info.payload()).unwrap_or_else(|| UNKNOWN_CRASH_MESSAGE.to_string());
        let location = info
            .location()
            .map(|loc| format!("{}:{}:{}", loc.file(), loc.line(), loc.column()));
        let backtrace = Backtrace::force_capture();

        let stack_trace = format_stack_trace(&thread_name, &message, location.as_deref(), &backtrace);
        let event = CrashEvent::new(message, thread_name, stack_trace, location);
        self.publish(&event);

        match self.history.try_push_for(&event, HISTORY_WAIT) {
            Ok(true) => {}
            Ok(false) => log::warn!("Crash history busy, crash not saved"),
            Err(e) => log::error!("Failed to save crash: {}", e),
        }
    }

    fn record(&self, event: CrashEvent) {
        self.publish(&event);

        if let Err(e) = self.history.push(&event) {
            log::error!("Failed to save crash: {}", e);
        }
    }

    fn publish(&self, event: &CrashEvent) {
        log::error!("Crash detected on '{}': {}", event.thread_name, event.message);
        self.bus.publish(event.clone());
    }
}

/// Extract the text of a panic payload (`&str` or `String`)
pub fn panic_message(payload: &(dyn Any + Send)) -> Option<String> {
    if let Some(s) = payload.downcast_ref::<&str>() {
        Some((*s).to_string())
    } else {
        payload.downcast_ref::<String>().cloned()
    }
}

fn format_stack_trace(
    thread_name: &str,
    message: &str,
    location: Option<&str>,
    backtrace: &Backtrace,
) -> String {
    let mut trace = format!("thread '{}' panicked", thread_name);
    if let Some(loc) = location {
        trace.push_str(" at ");
        trace.push_str(loc);
    }
    trace.push_str(":\n");
    trace.push_str(message);
    trace.push('\n');
    trace.push_str(&backtrace.to_string());
    trace
}

/// Owned handle on the process panic hook
pub struct CrashInterceptor {
    recorder: Arc<CrashRecorder>,
}

impl CrashInterceptor {
    pub fn new(history: CrashHistoryRing) -> Self {
        Self::with_capacity(history, BusCapacity::CRASH)
    }

    pub fn with_capacity(history: CrashHistoryRing, capacity: BusCapacity) -> Self {
        Self {
            recorder: Arc::new(CrashRecorder {
                bus: EventBus::ordered("crash", capacity),
                history,
            }),
        }
    }

    /// Start recording panics. A no-op while already installed.
    pub fn install(&self) {
        let mut registry = HOOK_REGISTRY.lock();
        if registry.contains(&self.recorder) {
            log::debug!("Crash handler already installed");
            return;
        }

        if registry.recorders.is_empty() {
            let previous: Arc<PanicHook> = Arc::from(panic::take_hook());
            let chained = Arc::clone(&previous);
            panic::set_hook(Box::new(move |info| dispatch_panic(info, chained.as_ref())));
            registry.previous = Some(previous);
        }

        registry.recorders.push(Arc::clone(&self.recorder));
        log::debug!("Crash handler installed");
    }

    /// Stop recording panics. The hook captured by the first
    /// [`install`](Self::install) comes back once no interceptor is left.
    /// A no-op when not installed.
    pub fn uninstall(&self) {
        let mut registry = HOOK_REGISTRY.lock();
        if !registry.contains(&self.recorder) {
            return;
        }

        registry.recorders.retain(|r| !Arc::ptr_eq(r, &self.recorder));
        if registry.recorders.is_empty() {
            if let Some(previous) = registry.previous.take() {
                // Drops the dispatcher
                let _ = panic::take_hook();
                panic::set_hook(Box::new(move |info| previous(info)));
            }
        }
        log::debug!("Crash handler uninstalled");
    }

    pub fn is_installed(&self) -> bool {
        HOOK_REGISTRY.lock().contains(&self.recorder)
    }

    /// Record a fault caught elsewhere (for example at a `catch_unwind` boundary)
    pub fn record_fault(&self, event: CrashEvent) {
        self.recorder.record(event);
    }

    pub fn crashes(&self) -> EventStream<CrashEvent> {
        self.recorder.bus.stream()
    }

    /// Most recent history entry; `None` when empty or unreadable
    pub fn get_last_crash(&self) -> Option<String> {
        self.recorder.history.last_entry().unwrap_or_else(|e| {
            log::warn!("Failed to read last crash: {}", e);
            None
        })
    }

    /// Every history entry, newest first; empty when unreadable
    pub fn crash_history(&self) -> Vec<String> {
        self.recorder.history.entries().unwrap_or_else(|e| {
            log::warn!("Failed to read crash history: {}", e);
            Vec::new()
        })
    }

    pub fn clear_history(&self) {
        if let Err(e) = self.recorder.history.clear() {
            log::error!("Failed to clear crash history: {}", e);
        }
    }
}

impl Drop for CrashInterceptor {
    fn drop(&mut self) {
        if !std::thread::panicking() {
            self.uninstall();
        }
    }
}
