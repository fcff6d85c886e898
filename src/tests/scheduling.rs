use super::Harness;
use crate::api::engine::*;
use crate::api::isolate::*;
use crate::enums::ExpectedRuntime;
use crate::isolate::IsolatePtr;
use crate::platform::{
    DefaultPlatform, ForeignPlatform, IdleTask, IdleTaskPtr, MessageLoopTask, Platform,
    PlatformFunctions, Task, TaskPtr, Workers,
};
use std::cell::RefCell;
use std::collections::HashSet;
use std::ffi::c_void;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread::{self, ThreadId};
use std::time::Duration;

struct CountingTask(Arc<AtomicUsize>);

impl Task for CountingTask {
    fn run(self: Box<Self>) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

impl IdleTask for CountingTask {
    fn run(self: Box<Self>, _deadline_in_seconds: f64) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

/// Marks its counter when dropped, whether it ran or not.
struct DropFlag(Arc<AtomicUsize>);

impl Task for DropFlag {
    fn run(self: Box<Self>) {}
}

impl Drop for DropFlag {
    fn drop(&mut self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

/// Reports the thread it ran on.
struct ThreadTask {
    seen: Arc<Mutex<HashSet<ThreadId>>>,
    done: mpsc::Sender<()>,
}

impl Task for ThreadTask {
    fn run(self: Box<Self>) {
        if let Ok(mut seen) = self.seen.lock() {
            seen.insert(thread::current().id());
        }
        thread::sleep(Duration::from_millis(2));
        let _ = self.done.send(());
    }
}

#[derive(Default)]
struct Recorder {
    foreground: RefCell<Vec<(IsolatePtr, TaskPtr)>>,
    idle: RefCell<Vec<IdleTaskPtr>>,
    destroyed: AtomicUsize,
}

unsafe extern "C" fn record_foreground(data: *mut c_void, isolate: IsolatePtr, task: TaskPtr) {
    let recorder = &*(data as *const Recorder);
    recorder.foreground.borrow_mut().push((isolate, task));
}

unsafe extern "C" fn record_idle(data: *mut c_void, _isolate: IsolatePtr, task: IdleTaskPtr) {
    let recorder = &*(data as *const Recorder);
    recorder.idle.borrow_mut().push(task);
}

unsafe extern "C" fn idle_enabled(_data: *mut c_void, _isolate: IsolatePtr) -> bool {
    true
}

unsafe extern "C" fn three_threads(_data: *mut c_void) -> usize {
    3
}

unsafe extern "C" fn fixed_clock(_data: *mut c_void) -> f64 {
    42.5
}

unsafe extern "C" fn count_destroy(data: *mut c_void) {
    let recorder = &*(data as *const Recorder);
    recorder.destroyed.fetch_add(1, Ordering::SeqCst);
}

fn recording_table() -> PlatformFunctions {
    PlatformFunctions {
        destroy: Some(count_destroy),
        number_of_available_background_threads: Some(three_threads),
        call_on_foreground_thread: Some(record_foreground),
        call_idle_on_foreground_thread: Some(record_idle),
        idle_tasks_enabled: Some(idle_enabled),
        monotonically_increasing_time: Some(fixed_clock),
        ..Default::default()
    }
}

#[test]
fn foreign_table_receives_tasks() {
    let harness = Harness::new();
    let recorder = Recorder::default();
    let platform = unsafe {
        ForeignPlatform::new(recording_table(), &recorder as *const Recorder as *mut c_void)
    };
    let runs = Arc::new(AtomicUsize::new(0));

    assert_eq!(3, platform.number_of_available_background_threads());
    assert_eq!(42.5, platform.monotonically_increasing_time());
    assert!(platform.idle_tasks_enabled(harness.bridge()));

    platform.call_on_foreground_thread(harness.bridge(), Box::new(CountingTask(runs.clone())));
    platform.call_idle_on_foreground_thread(harness.bridge(), Box::new(CountingTask(runs.clone())));
    assert_eq!(0, runs.load(Ordering::SeqCst));

    let foreground = recorder.foreground.take();
    assert_eq!(1, foreground.len());
    assert_eq!(harness.isolate, foreground[0].0);
    unsafe {
        v8glue_task_run(foreground[0].1);
        for task in recorder.idle.take() {
            v8glue_idle_task_run(task, 1.0);
        }
    }
    assert_eq!(2, runs.load(Ordering::SeqCst));

    drop(platform);
    assert_eq!(1, recorder.destroyed.load(Ordering::SeqCst));
}

#[test]
fn missing_entries_fall_back_to_default() {
    let harness = Harness::new();
    let platform =
        unsafe { ForeignPlatform::new(PlatformFunctions::default(), std::ptr::null_mut()) };
    let runs = Arc::new(AtomicUsize::new(0));

    platform.call_on_foreground_thread(harness.bridge(), Box::new(CountingTask(runs.clone())));
    platform.call_delayed_on_foreground_thread(
        harness.bridge(),
        Box::new(CountingTask(runs.clone())),
        3600.0,
    );
    assert_eq!(2, harness.bridge().queues.pending());

    // only the undelayed task is due
    assert_eq!(1, unsafe { v8glue_isolate_run_enqueued_tasks(harness.isolate) });
    assert_eq!(1, runs.load(Ordering::SeqCst));
    assert_eq!(1, harness.bridge().queues.pending());
    assert!(platform.monotonically_increasing_time() >= 0.0);
}

#[test]
fn idle_tasks_run_until_deadline() {
    let harness = Harness::new();
    let platform = DefaultPlatform::new();
    let runs = Arc::new(AtomicUsize::new(0));
    for _ in 0..3 {
        platform.call_idle_on_foreground_thread(
            harness.bridge(),
            Box::new(CountingTask(runs.clone())),
        );
    }
    assert_eq!(3, harness.bridge().queues.pending_idle());

    // no idle time, nothing runs
    assert_eq!(0, unsafe { v8glue_isolate_run_idle_tasks(harness.isolate, 0.0) });
    assert_eq!(3, unsafe { v8glue_isolate_run_idle_tasks(harness.isolate, 5.0) });
    assert_eq!(3, runs.load(Ordering::SeqCst));
    assert_eq!(0, harness.bridge().queues.pending_idle());
}

#[test]
fn destroyed_tasks_never_run() {
    let dropped = Arc::new(AtomicUsize::new(0));
    let task = crate::platform::task_into_raw(Box::new(DropFlag(dropped.clone())));
    unsafe {
        v8glue_task_destroy(task);
        v8glue_task_destroy(std::ptr::null_mut());
        v8glue_task_run(std::ptr::null_mut());
    }
    assert_eq!(1, dropped.load(Ordering::SeqCst));
}

#[test]
fn background_tasks_run_off_thread() {
    let platform = DefaultPlatform::new();
    let runs = Arc::new(AtomicUsize::new(0));
    platform.call_on_background_thread(
        Box::new(CountingTask(runs.clone())),
        ExpectedRuntime::ShortRunning,
    );
    for _ in 0..200 {
        if runs.load(Ordering::SeqCst) == 1 {
            break;
        }
        std::thread::sleep(std::time::Duration::from_millis(10));
    }
    assert_eq!(1, runs.load(Ordering::SeqCst));
}

#[test]
fn scripts_queue_engine_housekeeping() {
    let mut harness = Harness::new();
    // drain whatever isolate creation left behind
    unsafe { v8glue_isolate_run_enqueued_tasks(harness.isolate) };

    let first = harness.eval("Promise.resolve(1).then(v => v)");
    assert_eq!(1, harness.bridge().queues.pending());
    // a second run does not queue a second pump
    let second = harness.eval("2");
    assert_eq!(1, harness.bridge().queues.pending());
    unsafe {
        crate::api::value::v8glue_value_release(first);
        crate::api::value::v8glue_value_release(second);
    }

    assert_eq!(1, unsafe { v8glue_isolate_run_enqueued_tasks(harness.isolate) });
    assert_eq!(0, harness.bridge().queues.pending());
    assert!(v8glue_monotonically_increasing_time() >= 0.0);
}

#[test]
fn background_tasks_share_a_bounded_pool() {
    let platform = DefaultPlatform::new();
    let seen = Arc::new(Mutex::new(HashSet::new()));
    let (done, finished) = mpsc::channel();
    for _ in 0..64 {
        platform.call_on_background_thread(
            Box::new(ThreadTask {
                seen: seen.clone(),
                done: done.clone(),
            }),
            ExpectedRuntime::ShortRunning,
        );
    }
    for _ in 0..64 {
        finished.recv_timeout(Duration::from_secs(10)).unwrap();
    }
    let threads = seen.lock().unwrap().len();
    assert!(threads >= 1);
    assert!(threads <= Workers::pool_size());
    assert!(!seen.lock().unwrap().contains(&thread::current().id()));
}

#[test]
fn destroyed_housekeeping_is_queued_again() {
    let mut harness = Harness::new();
    unsafe { v8glue_isolate_run_enqueued_tasks(harness.isolate) };

    let value = harness.eval("1");
    assert_eq!(1, harness.bridge().queues.pending());
    unsafe { crate::api::value::v8glue_value_release(value) };

    // an embedder dropping the pump it was handed must not leave the isolate without one
    let task = crate::platform::task_into_raw(Box::new(MessageLoopTask::new(harness.bridge().id())));
    unsafe { v8glue_task_destroy(task) };
    let value = harness.eval("2");
    assert_eq!(2, harness.bridge().queues.pending());
    unsafe { crate::api::value::v8glue_value_release(value) };

    assert_eq!(2, unsafe { v8glue_isolate_run_enqueued_tasks(harness.isolate) });
}
