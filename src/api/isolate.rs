use super::bridge;
use crate::allocator::{self, AllocatorPtr, ArrayBufferAllocator, DefaultAllocator};
use crate::api::engine;
use crate::callback::Frame;
use crate::enums::PromiseRejectEvent;
use crate::handle::{self, ContextRef, Durable, ObjectTemplateRef, ValueRef};
use crate::isolate::{Isolate, IsolatePtr, PromiseRejectCallback};
use log::{trace, warn};
use std::ptr;

/// Creates an isolate. Takes ownership of `allocator`; null uses the default allocator.
///
/// Returns null if the engine is not running.
#[no_mangle]
pub unsafe extern "C" fn v8glue_isolate_new(allocator: AllocatorPtr) -> IsolatePtr {
    let allocator: Box<dyn ArrayBufferAllocator> = if allocator.is_null() {
        Box::new(DefaultAllocator)
    } else {
        *Box::from_raw(allocator)
    };
    if !engine::running() {
        warn!("cannot create an isolate before the engine is initialized");
        return ptr::null_mut();
    }
    Box::into_raw(Isolate::new(allocator::into_engine(allocator)))
}

/// Disposes an isolate. Tokens that belong to it must not be demoted afterwards, but may still
/// be released.
#[no_mangle]
pub unsafe extern "C" fn v8glue_isolate_dispose(isolate: IsolatePtr) {
    let Some(bridge) = bridge(isolate) else {
        return;
    };
    if bridge.callback_depth() > 0 {
        warn!("refusing to dispose isolate {} from inside a callback", bridge.id());
        return;
    }
    drop(Box::from_raw(isolate));
}

/// The context forward calls default to: the innermost entered one, else the current context of
/// the running callback. Null if there is neither.
#[no_mangle]
pub unsafe extern "C" fn v8glue_isolate_get_current_context(isolate: IsolatePtr) -> ContextRef {
    bridge(isolate)
        .and_then(Isolate::current_context)
        .map(|context| Durable::from_global(context).into_raw())
        .unwrap_or(ptr::null_mut())
}

#[no_mangle]
pub unsafe extern "C" fn v8glue_isolate_set_capture_stack_trace_for_uncaught_exceptions(
    isolate: IsolatePtr,
    capture: bool,
    frame_limit: i32,
) {
    if let Some(bridge) = bridge(isolate) {
        bridge.with_isolate(|isolate| {
            isolate.set_capture_stack_trace_for_uncaught_exceptions(capture, frame_limit)
        });
    }
}

extern "C" fn promise_reject_trampoline(message: v8::PromiseRejectMessage) {
    let scope = &mut unsafe { v8::CallbackScope::new(&message) };
    let Some(isolate) = Isolate::from_engine(scope) else {
        return;
    };
    let Some(callback) = isolate.promise_reject_callback.get() else {
        return;
    };

    let event = PromiseRejectEvent::from(message.get_event());
    trace!("promise reject event {:?} on isolate {}", event, isolate.id());
    let mut frame = Frame::default();
    let promise = frame.lend(scope, message.get_promise().into());
    let value = match message.get_value() {
        Some(value) => frame.lend(scope, value),
        None => ptr::null_mut(),
    };

    let _entered = isolate.enter_callback(scope);
    unsafe { callback(isolate.as_ptr(), event, promise, value) };
}

/// Routes promise rejection events to `callback`. Null stops the routing.
#[no_mangle]
pub unsafe extern "C" fn v8glue_isolate_set_promise_reject_callback(
    isolate: IsolatePtr,
    callback: Option<PromiseRejectCallback>,
) {
    let Some(bridge) = bridge(isolate) else {
        return;
    };
    bridge.promise_reject_callback.set(callback);
    if callback.is_some() {
        bridge.with_isolate(|isolate| isolate.set_promise_reject_callback(promise_reject_trampoline));
    }
}

/// Stops the script running in `isolate`, from any thread.
#[no_mangle]
pub unsafe extern "C" fn v8glue_isolate_terminate_execution(isolate: IsolatePtr) {
    if let Some(bridge) = bridge(isolate) {
        bridge.isolate_handle().terminate_execution();
    }
}

/// Runs the default platform's foreground tasks for `isolate` that are due. Returns how many ran.
#[no_mangle]
pub unsafe extern "C" fn v8glue_isolate_run_enqueued_tasks(isolate: IsolatePtr) -> usize {
    bridge(isolate).map_or(0, |bridge| bridge.queues.run_due())
}

/// Runs the default platform's idle tasks for `isolate` for at most `idle_time_in_seconds`.
/// Returns how many ran.
#[no_mangle]
pub unsafe extern "C" fn v8glue_isolate_run_idle_tasks(
    isolate: IsolatePtr,
    idle_time_in_seconds: f64,
) -> usize {
    bridge(isolate).map_or(0, |bridge| bridge.queues.run_idle(idle_time_in_seconds))
}

#[no_mangle]
pub unsafe extern "C" fn v8glue_context_new(isolate: IsolatePtr) -> ContextRef {
    let Some(bridge) = bridge(isolate) else {
        return ptr::null_mut();
    };
    bridge.scope(|scope| {
        let context = v8::Context::new(scope);
        handle::to_durable(scope, Some(context))
    })
}

/// Creates a context whose global object is stamped out of `template`.
#[no_mangle]
pub unsafe extern "C" fn v8glue_context_new_from_template(
    isolate: IsolatePtr,
    template: ObjectTemplateRef,
) -> ContextRef {
    let Some(bridge) = bridge(isolate) else {
        return ptr::null_mut();
    };
    bridge.scope(|scope| {
        let Some(template) = handle::to_local(scope, template) else {
            warn!("no global template given");
            return ptr::null_mut();
        };
        let context = v8::Context::new_from_template(scope, template);
        handle::to_durable(scope, Some(context))
    })
}

#[no_mangle]
pub unsafe extern "C" fn v8glue_context_global(
    isolate: IsolatePtr,
    context: ContextRef,
) -> ValueRef {
    let Some(bridge) = bridge(isolate) else {
        return ptr::null_mut();
    };
    bridge.scope(|scope| {
        let global = handle::to_local(scope, context).map(|context| context.global(scope));
        handle::value_to_durable(scope, global)
    })
}

/// Makes `context` the default for forward calls until the matching `v8glue_context_exit`.
#[no_mangle]
pub unsafe extern "C" fn v8glue_context_enter(isolate: IsolatePtr, context: ContextRef) -> bool {
    let (Some(bridge), Some(context)) = (bridge(isolate), Durable::borrow(context)) else {
        return false;
    };
    bridge.enter_context(context.global().clone());
    true
}

/// Leaves the innermost entered context. Returns false if none was entered.
#[no_mangle]
pub unsafe extern "C" fn v8glue_context_exit(isolate: IsolatePtr) -> bool {
    bridge(isolate).is_some_and(Isolate::exit_context)
}

#[no_mangle]
pub unsafe extern "C" fn v8glue_context_release(context: ContextRef) {
    handle::release(context)
}
