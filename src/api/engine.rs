//! Process-wide lifecycle: configuration, platform, engine, allocators and tasks.

use crate::allocator::{
    AllocatorFunctions, AllocatorPtr, ArrayBufferAllocator, DefaultAllocator, ForeignAllocator,
};
use crate::config::{self, BridgeConfig};
use crate::logging::{self, FatalErrorCallback};
use crate::platform::{
    self, DefaultPlatform, ForeignPlatform, IdleTask, IdleTaskPtr, Platform, PlatformFunctions,
    PlatformPtr, Task, TaskPtr,
};
use log::{debug, info, warn};
use std::ffi::{c_char, c_void, CStr};
use std::sync::Mutex;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum EngineState {
    Uninitialized,
    PlatformReady,
    Running,
    Disposed,
}

static STATE: Mutex<EngineState> = Mutex::new(EngineState::Uninitialized);

fn transition(from: EngineState, to: EngineState, func: impl FnOnce() -> bool) -> bool {
    let mut state = STATE.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    if *state != from {
        warn!("engine is {:?}, cannot move to {:?}", *state, to);
        return false;
    }
    if !func() {
        return false;
    }
    debug!("engine {:?} -> {:?}", from, to);
    *state = to;
    true
}

pub(crate) fn running() -> bool {
    *STATE.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) == EngineState::Running
}

const BUILD_INFO: &str = concat!(
    "v8-glue ",
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("GIT_DESCRIBE"),
    ", built ",
    env!("BUILD_TIMESTAMP"),
    ")\0"
);

/// Static, nul-terminated description of this build.
#[no_mangle]
pub extern "C" fn v8glue_build_info() -> *const c_char {
    BUILD_INFO.as_ptr() as *const c_char
}

/// Applies a JSON configuration document (null for defaults) and installs logging. Should be
/// called first; the platform and the engine read the configuration when they come up.
///
/// Returns false if the document could not be parsed, in which case nothing changes.
#[no_mangle]
pub unsafe extern "C" fn v8glue_configure(json: *const c_char) -> bool {
    let config = if json.is_null() {
        Ok(BridgeConfig::default())
    } else {
        CStr::from_ptr(json)
            .to_str()
            .map_err(|_| crate::error::BridgeError::InvalidUtf8)
            .and_then(BridgeConfig::from_json)
    };
    let config = match config {
        Ok(config) => config,
        Err(err) => {
            warn!("rejected configuration: {}", err);
            return false;
        }
    };

    if let Err(err) = logging::setup(&config) {
        log::set_max_level(config.level_filter());
        debug!("keeping existing logger: {:#}", err);
    }
    info!("{}", BUILD_INFO.trim_end_matches('\0'));
    config::replace(config);
    true
}

#[no_mangle]
pub extern "C" fn v8glue_set_fatal_error_handler(handler: Option<FatalErrorCallback>) {
    logging::set_fatal_error_handler(handler);
}

/// Creates a platform adapter over a function table. A null table behaves like the default
/// platform.
///
/// # Safety
///
/// See [`ForeignPlatform::new`].
#[no_mangle]
pub unsafe extern "C" fn v8glue_platform_create(
    functions: *const PlatformFunctions,
    data: *mut c_void,
) -> PlatformPtr {
    let functions = functions.as_ref().copied().unwrap_or_default();
    let platform: Box<dyn Platform> = Box::new(ForeignPlatform::new(functions, data));
    Box::into_raw(Box::new(platform))
}

#[no_mangle]
pub extern "C" fn v8glue_platform_create_default() -> PlatformPtr {
    let platform: Box<dyn Platform> = Box::new(DefaultPlatform::new());
    Box::into_raw(Box::new(platform))
}

/// Destroys a platform that was never handed to `v8glue_v8_initialize_platform`.
#[no_mangle]
pub unsafe extern "C" fn v8glue_platform_destroy(platform: PlatformPtr) {
    if !platform.is_null() {
        drop(Box::from_raw(platform));
    }
}

/// Installs a platform and brings up the engine's own. Takes ownership of `platform`, also on
/// failure.
#[no_mangle]
pub unsafe extern "C" fn v8glue_v8_initialize_platform(platform: PlatformPtr) -> bool {
    if platform.is_null() {
        warn!("no platform to initialize");
        return false;
    }
    let platform = *Box::from_raw(platform);
    transition(EngineState::Uninitialized, EngineState::PlatformReady, || {
        match platform::initialize(platform) {
            Ok(()) => true,
            Err(err) => {
                warn!("platform initialization failed: {}", err);
                false
            }
        }
    })
}

#[no_mangle]
pub unsafe extern "C" fn v8glue_v8_set_flags_from_string(flags: *const c_char) {
    if flags.is_null() {
        return;
    }
    match CStr::from_ptr(flags).to_str() {
        Ok(flags) => {
            debug!("engine flags: {}", flags);
            v8::V8::set_flags_from_string(flags);
        }
        Err(_) => warn!("ignoring engine flags that are not UTF-8"),
    }
}

#[no_mangle]
pub extern "C" fn v8glue_v8_initialize() -> bool {
    transition(EngineState::PlatformReady, EngineState::Running, || {
        if let Some(flags) = config::current().v8_flags {
            v8::V8::set_flags_from_string(&flags);
        }
        v8::V8::initialize();
        info!("engine {} initialized", v8::V8::get_version());
        true
    })
}

/// Tears the engine down. Every isolate must be disposed already; the engine cannot be brought
/// up again in this process.
#[no_mangle]
pub extern "C" fn v8glue_v8_dispose() -> bool {
    transition(EngineState::Running, EngineState::Disposed, || unsafe {
        v8::V8::dispose()
    })
}

/// Releases the engine platform and the platform adapter, after `v8glue_v8_dispose`.
#[no_mangle]
pub unsafe extern "C" fn v8glue_v8_shutdown_platform() {
    let state = *STATE.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    if state != EngineState::Disposed {
        warn!("cannot shut the platform down while the engine is {:?}", state);
        return;
    }
    v8::V8::dispose_platform();
    platform::shutdown();
    info!("platform shut down");
}

/// Creates an allocator adapter over a function table. A null table behaves like the default
/// allocator.
///
/// # Safety
///
/// See [`ForeignAllocator::new`].
#[no_mangle]
pub unsafe extern "C" fn v8glue_allocator_create(
    functions: *const AllocatorFunctions,
    data: *mut c_void,
) -> AllocatorPtr {
    let functions = functions.as_ref().copied().unwrap_or_default();
    let allocator: Box<dyn ArrayBufferAllocator> = Box::new(ForeignAllocator::new(functions, data));
    Box::into_raw(Box::new(allocator))
}

#[no_mangle]
pub extern "C" fn v8glue_allocator_create_default() -> AllocatorPtr {
    let allocator: Box<dyn ArrayBufferAllocator> = Box::new(DefaultAllocator);
    Box::into_raw(Box::new(allocator))
}

/// Destroys an allocator that was never handed to `v8glue_isolate_new`.
#[no_mangle]
pub unsafe extern "C" fn v8glue_allocator_destroy(allocator: AllocatorPtr) {
    if !allocator.is_null() {
        drop(Box::from_raw(allocator));
    }
}

/// Runs a task handed out by the platform, consuming it.
#[no_mangle]
pub unsafe extern "C" fn v8glue_task_run(task: TaskPtr) {
    if task.is_null() {
        return;
    }
    let task: Box<dyn Task> = *Box::from_raw(task);
    task.run();
}

/// Drops a task handed out by the platform without running it.
#[no_mangle]
pub unsafe extern "C" fn v8glue_task_destroy(task: TaskPtr) {
    if !task.is_null() {
        drop(Box::from_raw(task));
    }
}

#[no_mangle]
pub unsafe extern "C" fn v8glue_idle_task_run(task: IdleTaskPtr, deadline_in_seconds: f64) {
    if task.is_null() {
        return;
    }
    let task: Box<dyn IdleTask> = *Box::from_raw(task);
    task.run(deadline_in_seconds);
}

#[no_mangle]
pub unsafe extern "C" fn v8glue_idle_task_destroy(task: IdleTaskPtr) {
    if !task.is_null() {
        drop(Box::from_raw(task));
    }
}

/// Seconds on the clock idle task deadlines are measured against.
#[no_mangle]
pub extern "C" fn v8glue_monotonically_increasing_time() -> f64 {
    match platform::installed() {
        Some(platform) => platform.monotonically_increasing_time(),
        None => platform::monotonic_seconds(),
    }
}
