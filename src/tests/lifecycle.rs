use super::Harness;
use crate::allocator::{AllocatorFunctions, SuperAllocate};
use crate::api::engine::*;
use crate::api::isolate::*;
use crate::api::script::*;
use crate::api::value::*;
use crate::enums::PromiseRejectEvent;
use crate::handle::ValueRef;
use crate::isolate::IsolatePtr;
use std::cell::RefCell;
use std::ffi::{c_void, CStr};
use std::ptr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

static ARRAY_BUFFER_ALLOCATIONS: AtomicUsize = AtomicUsize::new(0);

thread_local! {
    static REJECTIONS: RefCell<Vec<PromiseRejectEvent>> = RefCell::new(Vec::new());
}

unsafe extern "C" fn counting_allocate(
    _data: *mut c_void,
    super_fn: SuperAllocate,
    super_data: *mut c_void,
    length: usize,
) -> *mut c_void {
    ARRAY_BUFFER_ALLOCATIONS.fetch_add(1, Ordering::SeqCst);
    super_fn(super_data, length)
}

unsafe extern "C" fn record_rejection(
    _isolate: IsolatePtr,
    event: PromiseRejectEvent,
    promise: ValueRef,
    _value: ValueRef,
) {
    assert!(!promise.is_null());
    REJECTIONS.with(|events| events.borrow_mut().push(event));
}

#[test]
fn one_plus_two_is_three() {
    let mut harness = Harness::new();
    let result = harness.eval_i32("1+2");
    assert!(result.is_set);
    assert_eq!(3, result.value);
    assert!(harness.exception().is_null());
    assert!(harness.message().is_null());
}

#[test]
fn engine_cannot_initialize_twice() {
    super::setup();
    assert!(!v8glue_v8_initialize());
    assert!(!unsafe { v8glue_v8_initialize_platform(v8glue_platform_create_default()) });
}

#[test]
fn build_info_names_the_crate() {
    let info = unsafe { CStr::from_ptr(v8glue_build_info()) };
    assert!(info.to_str().unwrap().starts_with("v8-glue "));
}

#[test]
fn runaway_script_times_out() {
    let mut harness = Harness::new();
    let source = harness.string("while (true) {}");
    let ctx = harness.ctx();
    unsafe {
        let script = v8glue_script_compile(&ctx, harness.context, source);
        assert!(!script.is_null());
        let result = v8glue_script_run_with_timeout(&ctx, harness.context, script, 50);
        assert!(result.is_null());
        v8glue_script_release(script);
        v8glue_value_release(source);
    }
    assert_eq!("evaluation timed out", harness.error_message());
    harness.clear();

    // the isolate stays usable
    assert_eq!(3, harness.eval_i32("1+2").value);
}

#[test]
fn other_thread_terminates_runaway_script() {
    let mut harness = Harness::new();
    let source = harness.string("while (true) {}");
    let ctx = harness.ctx();
    // the token crosses threads as an address, the way an embedder's watchdog would hold it
    let token = harness.isolate as usize;
    let terminator = thread::spawn(move || {
        thread::sleep(Duration::from_millis(50));
        unsafe { v8glue_isolate_terminate_execution(token as IsolatePtr) };
    });
    unsafe {
        let script = v8glue_script_compile(&ctx, harness.context, source);
        assert!(!script.is_null());
        let result = v8glue_script_run(&ctx, harness.context, script);
        assert!(result.is_null());
        v8glue_script_release(script);
        v8glue_value_release(source);
    }
    terminator.join().unwrap();
    assert_eq!("execution terminated", harness.error_message());
    harness.clear();

    assert_eq!(3, harness.eval_i32("1+2").value);
}

#[test]
fn isolates_dispose_in_creation_order() {
    let mut first = Harness::new();
    let mut second = Harness::new();
    assert_eq!(1, first.eval_i32("1").value);
    assert_eq!(2, second.eval_i32("2").value);
    drop(first);

    assert_eq!(3, second.eval_i32("1+2").value);
    let third = Harness::new();
    drop(second);
    drop(third);
}

#[test]
fn quick_script_beats_its_timeout() {
    let mut harness = Harness::new();
    let source = harness.string("6 * 7");
    let ctx = harness.ctx();
    unsafe {
        let script = v8glue_script_compile(&ctx, harness.context, source);
        let result = v8glue_script_run_with_timeout(&ctx, harness.context, script, 10_000);
        assert_eq!(42, harness.int(result).value);
        v8glue_value_release(result);
        v8glue_script_release(script);
        v8glue_value_release(source);
    }
    assert!(harness.exception().is_null());
}

#[test]
fn script_origin_names_messages() {
    let mut harness = Harness::new();
    let source = harness.string("\n\nthrow new Error('where')");
    let name = harness.string("demo.js");
    let ctx = harness.ctx();
    unsafe {
        let script = v8glue_script_compile_origin(
            &ctx,
            harness.context,
            source,
            name,
            10,
            0,
            false,
            -1,
            false,
            ptr::null_mut(),
            false,
        );
        assert!(!script.is_null());
        assert!(v8glue_script_run(&ctx, harness.context, script).is_null());
        v8glue_script_release(script);

        let message = harness.message();
        let resource = v8glue_message_get_script_resource_name(&ctx, harness.context, message);
        assert_eq!("demo.js", harness.read(resource));
        let line = v8glue_message_get_line_number(&ctx, harness.context, message);
        assert_eq!(13, line.value);

        v8glue_value_release(resource);
        v8glue_value_release(name);
        v8glue_value_release(source);
    }
}

#[test]
fn promise_rejections_reach_the_embedder() {
    let mut harness = Harness::new();
    REJECTIONS.with(|events| events.borrow_mut().clear());
    unsafe { v8glue_isolate_set_promise_reject_callback(harness.isolate, Some(record_rejection)) };

    let promise = harness.eval("Promise.reject(new Error('unhandled'))");
    assert!(!promise.is_null());
    unsafe { v8glue_value_release(promise) };

    REJECTIONS.with(|events| {
        assert_eq!(
            Some(&PromiseRejectEvent::RejectWithNoHandler),
            events.borrow().first()
        );
    });
}

#[test]
fn foreign_allocator_backs_array_buffers() {
    let functions = AllocatorFunctions {
        allocate: Some(counting_allocate),
        ..Default::default()
    };
    let allocator = unsafe { v8glue_allocator_create(&functions, ptr::null_mut()) };
    let before = ARRAY_BUFFER_ALLOCATIONS.load(Ordering::SeqCst);

    let mut harness = Harness::with_allocator(allocator);
    assert_eq!(64, harness.eval_i32("new ArrayBuffer(64).byteLength").value);
    assert!(ARRAY_BUFFER_ALLOCATIONS.load(Ordering::SeqCst) > before);
}

#[test]
fn isolate_requires_running_engine_but_not_an_allocator() {
    super::setup();
    let isolate = unsafe { v8glue_isolate_new(ptr::null_mut()) };
    assert!(!isolate.is_null());
    unsafe {
        assert!(v8glue_context_global(isolate, ptr::null_mut()).is_null());
        v8glue_isolate_dispose(isolate);
        // null isolates are ignored
        v8glue_isolate_dispose(ptr::null_mut());
    }
}
