use super::{
    idle_task_into_raw, task_into_raw, DefaultPlatform, IdleTask, IdleTaskPtr, Platform, Task,
    TaskPtr,
};
use crate::enums::ExpectedRuntime;
use crate::isolate::{Isolate, IsolatePtr};
use log::debug;
use std::ffi::c_void;

/// Scheduling entry points supplied by the embedder. Every entry receives the `data` pointer the
/// table was registered with. A null entry falls back to [`DefaultPlatform`].
///
/// Tasks handed out are owned by the embedder, which must eventually pass each one to
/// `v8glue_task_run` (or `v8glue_idle_task_run`) or `v8glue_task_destroy`.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default)]
pub struct PlatformFunctions {
    pub destroy: Option<unsafe extern "C" fn(data: *mut c_void)>,
    pub number_of_available_background_threads:
        Option<unsafe extern "C" fn(data: *mut c_void) -> usize>,
    pub call_on_background_thread: Option<
        unsafe extern "C" fn(data: *mut c_void, task: TaskPtr, expected_runtime: ExpectedRuntime),
    >,
    pub call_on_foreground_thread:
        Option<unsafe extern "C" fn(data: *mut c_void, isolate: IsolatePtr, task: TaskPtr)>,
    pub call_delayed_on_foreground_thread: Option<
        unsafe extern "C" fn(
            data: *mut c_void,
            isolate: IsolatePtr,
            task: TaskPtr,
            delay_in_seconds: f64,
        ),
    >,
    pub call_idle_on_foreground_thread:
        Option<unsafe extern "C" fn(data: *mut c_void, isolate: IsolatePtr, task: IdleTaskPtr)>,
    pub idle_tasks_enabled: Option<unsafe extern "C" fn(data: *mut c_void, isolate: IsolatePtr) -> bool>,
    pub monotonically_increasing_time: Option<unsafe extern "C" fn(data: *mut c_void) -> f64>,
}

/// A [`Platform`] forwarding to an embedder's function table.
pub struct ForeignPlatform {
    functions: PlatformFunctions,
    data: *mut c_void,
    fallback: DefaultPlatform,
}

// The embedder guarantees its table may be called from any thread.
unsafe impl Send for ForeignPlatform {}
unsafe impl Sync for ForeignPlatform {}

impl ForeignPlatform {
    /// # Safety
    ///
    /// Every entry in `functions` must be safe to call with `data` from any thread until the
    /// platform is dropped.
    pub unsafe fn new(functions: PlatformFunctions, data: *mut c_void) -> Self {
        ForeignPlatform {
            functions,
            data,
            fallback: DefaultPlatform::new(),
        }
    }

    fn fallback(&self) -> &DefaultPlatform {
        &self.fallback
    }
}

impl Platform for ForeignPlatform {
    fn number_of_available_background_threads(&self) -> usize {
        match self.functions.number_of_available_background_threads {
            Some(f) => unsafe { f(self.data) },
            None => self.fallback().number_of_available_background_threads(),
        }
    }

    fn call_on_background_thread(&self, task: Box<dyn Task>, expected_runtime: ExpectedRuntime) {
        match self.functions.call_on_background_thread {
            Some(f) => unsafe { f(self.data, task_into_raw(task), expected_runtime) },
            None => self
                .fallback()
                .call_on_background_thread(task, expected_runtime),
        }
    }

    fn call_on_foreground_thread(&self, isolate: &Isolate, task: Box<dyn Task>) {
        match self.functions.call_on_foreground_thread {
            Some(f) => unsafe { f(self.data, isolate.as_ptr(), task_into_raw(task)) },
            None => self.fallback().call_on_foreground_thread(isolate, task),
        }
    }

    fn call_delayed_on_foreground_thread(
        &self,
        isolate: &Isolate,
        task: Box<dyn Task>,
        delay_in_seconds: f64,
    ) {
        match self.functions.call_delayed_on_foreground_thread {
            Some(f) => unsafe {
                f(
                    self.data,
                    isolate.as_ptr(),
                    task_into_raw(task),
                    delay_in_seconds,
                )
            },
            None => self
                .fallback()
                .call_delayed_on_foreground_thread(isolate, task, delay_in_seconds),
        }
    }

    fn call_idle_on_foreground_thread(&self, isolate: &Isolate, task: Box<dyn IdleTask>) {
        match self.functions.call_idle_on_foreground_thread {
            Some(f) => unsafe { f(self.data, isolate.as_ptr(), idle_task_into_raw(task)) },
            None => self.fallback().call_idle_on_foreground_thread(isolate, task),
        }
    }

    fn idle_tasks_enabled(&self, isolate: &Isolate) -> bool {
        match self.functions.idle_tasks_enabled {
            Some(f) => unsafe { f(self.data, isolate.as_ptr()) },
            None => self.fallback().idle_tasks_enabled(isolate),
        }
    }

    fn monotonically_increasing_time(&self) -> f64 {
        match self.functions.monotonically_increasing_time {
            Some(f) => unsafe { f(self.data) },
            None => self.fallback().monotonically_increasing_time(),
        }
    }
}

impl Drop for ForeignPlatform {
    fn drop(&mut self) {
        // the fallback field drops after this, so embedder state always goes first
        if let Some(destroy) = self.functions.destroy {
            unsafe { destroy(self.data) };
        }
        debug!("foreign platform destroyed");
    }
}
