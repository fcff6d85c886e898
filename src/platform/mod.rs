//! Task scheduling, either by the embedder or by the bridge's own default.
//!
//! The engine itself always runs on its built-in platform: the engine binding offers no way to
//! plug in a foreign one. What goes through [`Platform`] is the work the bridge schedules on the
//! engine's behalf (message loop pumps, idle passes, script watchdogs), so the embedder decides
//! when and where it runs.

use crate::config;
use crate::enums::ExpectedRuntime;
use crate::error::{BridgeError, BridgeResult};
use crate::isolate::Isolate;
use log::{debug, info, trace};
use std::sync::{Arc, Condvar, Mutex, OnceLock, RwLock};
use std::time::{Duration, Instant};

mod default;
mod foreign;

pub use default::*;
pub use foreign::*;

/// A unit of work. Consumed by running it.
pub trait Task: Send {
    fn run(self: Box<Self>);
}

/// A unit of work for idle time, given the deadline in seconds of
/// [`Platform::monotonically_increasing_time`].
pub trait IdleTask: Send {
    fn run(self: Box<Self>, deadline_in_seconds: f64);
}

pub type TaskPtr = *mut Box<dyn Task>;
pub type IdleTaskPtr = *mut Box<dyn IdleTask>;

pub fn task_into_raw(task: Box<dyn Task>) -> TaskPtr {
    Box::into_raw(Box::new(task))
}

pub fn idle_task_into_raw(task: Box<dyn IdleTask>) -> IdleTaskPtr {
    Box::into_raw(Box::new(task))
}

/// The scheduling services the bridge needs.
pub trait Platform: Send + Sync {
    fn number_of_available_background_threads(&self) -> usize;

    fn call_on_background_thread(&self, task: Box<dyn Task>, expected_runtime: ExpectedRuntime);

    fn call_on_foreground_thread(&self, isolate: &Isolate, task: Box<dyn Task>);

    fn call_delayed_on_foreground_thread(
        &self,
        isolate: &Isolate,
        task: Box<dyn Task>,
        delay_in_seconds: f64,
    );

    fn call_idle_on_foreground_thread(&self, isolate: &Isolate, task: Box<dyn IdleTask>);

    fn idle_tasks_enabled(&self, isolate: &Isolate) -> bool;

    /// Seconds since an arbitrary, fixed origin.
    fn monotonically_increasing_time(&self) -> f64;
}

pub type PlatformPtr = *mut Box<dyn Platform>;

static PLATFORM: RwLock<Option<Arc<dyn Platform>>> = RwLock::new(None);

/// The engine's built-in platform.
///
/// Held separately so message loop pumps can reach it; the engine keeps its own reference.
struct EnginePlatform(v8::SharedRef<v8::Platform>);

// The engine's default platform is internally synchronized.
unsafe impl Send for EnginePlatform {}
unsafe impl Sync for EnginePlatform {}

static ENGINE_PLATFORM: RwLock<Option<EnginePlatform>> = RwLock::new(None);

/// Installs the platform adapter and brings up the engine's platform, sized after the adapter's
/// background thread count. Must happen once, before the engine initializes.
pub fn initialize(platform: Box<dyn Platform>) -> BridgeResult<()> {
    let mut installed = PLATFORM.write().unwrap_or_else(|poisoned| poisoned.into_inner());
    if installed.is_some() {
        return Err(BridgeError::AlreadyInitialized);
    }

    let mut engine = ENGINE_PLATFORM
        .write()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    if engine.is_some() {
        return Err(BridgeError::AlreadyInitialized);
    }

    let threads = platform.number_of_available_background_threads() as u32;
    let idle_task_support = config::current().idle_task_support;
    let shared = v8::new_default_platform(threads, idle_task_support).make_shared();
    v8::V8::initialize_platform(shared.clone());

    info!(
        "platform initialized ({} background threads, idle tasks {})",
        threads,
        if idle_task_support { "on" } else { "off" }
    );
    *engine = Some(EnginePlatform(shared));
    *installed = Some(Arc::from(platform));
    Ok(())
}

/// Drops the platform adapter, running its destroy hook. The engine must be disposed already.
pub fn shutdown() {
    if let Ok(mut engine) = ENGINE_PLATFORM.write() {
        engine.take();
    }
    let platform = match PLATFORM.write() {
        Ok(mut installed) => installed.take(),
        Err(poisoned) => poisoned.into_inner().take(),
    };
    if platform.is_some() {
        debug!("platform adapter released");
    }
}

/// The installed platform adapter, if any.
pub fn installed() -> Option<Arc<dyn Platform>> {
    PLATFORM.read().ok().and_then(|platform| platform.clone())
}

pub(crate) fn engine_platform() -> Option<v8::SharedRef<v8::Platform>> {
    ENGINE_PLATFORM
        .read()
        .ok()
        .and_then(|engine| engine.as_ref().map(|engine| engine.0.clone()))
}

/// The installed platform adapter, or the default scheduler if none is installed.
pub(crate) fn current() -> Arc<dyn Platform> {
    installed().unwrap_or_else(|| Arc::new(DefaultPlatform::new()) as Arc<dyn Platform>)
}

/// Seconds since the first time anything in the bridge asked for the time.
pub fn monotonic_seconds() -> f64 {
    static ORIGIN: OnceLock<Instant> = OnceLock::new();
    ORIGIN.get_or_init(Instant::now).elapsed().as_secs_f64()
}

/// Pumps the engine's message loop for an isolate and runs its microtasks.
pub(crate) struct MessageLoopTask {
    isolate: u64,
    pending: bool,
}

impl MessageLoopTask {
    pub fn new(isolate: u64) -> Self {
        MessageLoopTask {
            isolate,
            pending: true,
        }
    }
}

impl Task for MessageLoopTask {
    fn run(mut self: Box<Self>) {
        self.pending = false;
        if Isolate::with_live(self.isolate, |isolate| isolate.pump_message_loop()).is_none() {
            trace!("message loop task outlived isolate {}", self.isolate);
        }
    }
}

impl Drop for MessageLoopTask {
    fn drop(&mut self) {
        // destroyed unrun, the next forward call has to queue another
        if self.pending {
            Isolate::with_live(self.isolate, Isolate::message_loop_dropped);
        }
    }
}

/// Runs the engine's own idle tasks for an isolate until the deadline.
pub(crate) struct EngineIdleTask {
    isolate: u64,
    pending: bool,
}

impl EngineIdleTask {
    pub fn new(isolate: u64) -> Self {
        EngineIdleTask {
            isolate,
            pending: true,
        }
    }

    /// Idle time left until `deadline_in_seconds`, read off the clock of `platform` that the
    /// deadline was taken from.
    fn budget(platform: &dyn Platform, deadline_in_seconds: f64) -> f64 {
        (deadline_in_seconds - platform.monotonically_increasing_time()).max(0.0)
    }
}

impl IdleTask for EngineIdleTask {
    fn run(mut self: Box<Self>, deadline_in_seconds: f64) {
        self.pending = false;
        let remaining = Self::budget(&*current(), deadline_in_seconds);
        Isolate::with_live(self.isolate, |isolate| isolate.run_engine_idle_tasks(remaining));
    }
}

impl Drop for EngineIdleTask {
    fn drop(&mut self) {
        if self.pending {
            Isolate::with_live(self.isolate, Isolate::idle_dropped);
        }
    }
}

/// Terminates an isolate's execution if a script is still running when the timeout expires.
///
/// V8 can only cancel script evaluation while running actual JavaScript code. If embedder code is
/// being executed when the timeout is triggered, the execution continues until it returns to
/// JavaScript.
pub(crate) struct Watchdog {
    // (still executing, fired)
    state: Arc<(Mutex<(bool, bool)>, Condvar)>,
    handle: v8::IsolateHandle,
}

struct WatchdogTask {
    state: Arc<(Mutex<(bool, bool)>, Condvar)>,
    handle: v8::IsolateHandle,
    timeout: Duration,
    // counted from arming, a worker may pick the task up late
    deadline: Instant,
}

impl Task for WatchdogTask {
    fn run(self: Box<Self>) {
        let (mutex, condvar) = &*self.state;
        let Ok(guard) = mutex.lock() else {
            return;
        };
        let remaining = self.deadline.saturating_duration_since(Instant::now());
        let Ok((mut state, _)) =
            condvar.wait_timeout_while(guard, remaining, |(executing, _)| *executing)
        else {
            return;
        };
        if state.0 {
            state.1 = true;
            debug!("script timed out after {:?}", self.timeout);
            self.handle.terminate_execution();
        }
    }
}

impl Watchdog {
    /// Arms a watchdog on the installed platform, or on the default one if none is installed.
    pub fn arm(isolate: &Isolate, timeout: Duration) -> Watchdog {
        let state = Arc::new((Mutex::new((true, false)), Condvar::new()));
        let handle = isolate.isolate_handle();
        let task = Box::new(WatchdogTask {
            state: state.clone(),
            handle: handle.clone(),
            timeout,
            deadline: Instant::now() + timeout,
        });
        current().call_on_background_thread(task, ExpectedRuntime::ShortRunning);
        Watchdog { state, handle }
    }

    /// Whether the timeout expired and execution was terminated.
    pub fn fired(&self) -> bool {
        let (mutex, _) = &*self.state;
        mutex.lock().map(|state| state.1).unwrap_or(false)
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        let (mutex, condvar) = &*self.state;
        let fired = match mutex.lock() {
            Ok(mut state) => {
                state.0 = false;
                state.1
            }
            Err(_) => false,
        };
        condvar.notify_one();
        // a termination that landed after the script finished would hit the next one
        if fired {
            self.handle.cancel_terminate_execution();
        }
    }
}
