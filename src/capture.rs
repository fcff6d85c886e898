//! The capture context threaded through fallible forward calls.
//!
//! Every such call runs inside a try-catch. When the engine raises, the exception and its message
//! are promoted and written into the caller's slots, and the call's own result is forced absent.
//! Calls that do not raise leave both slots exactly as they found them.

use crate::error::BridgeError;
use crate::handle::{self, ContextRef, Durable, MessageRef, ValueRef};
use crate::isolate::{Isolate, IsolatePtr};
use crate::maybe::Maybe;
use crate::platform::Watchdog;
use log::{trace, warn};
use std::time::Duration;

#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct CallContext {
    pub isolate: IsolatePtr,
    /// Receives the thrown value. Skipped when null.
    pub exception: *mut ValueRef,
    /// Receives the diagnostic message of the thrown value. Skipped when null.
    pub message: *mut MessageRef,
}

/// A forward-call result that can be dropped when an exception forces the call absent.
pub(crate) trait Discard {
    fn discard(self);
}

impl<T> Discard for *mut Durable<T> {
    fn discard(self) {
        unsafe { handle::release(self) }
    }
}

macro_rules! discard_by_value {
    ($($ty:ty),*) => {
        $(impl Discard for $ty {
            fn discard(self) {}
        })*
    };
}

discard_by_value!(bool, i32, u32, i64, f64, usize, crate::enums::PropertyAttribute);

impl<T: Default> Discard for Maybe<T> {
    fn discard(self) {}
}

// messages of the errors that stand in for a termination
const TERMINATED: &str = "execution terminated";
const TIMED_OUT: &str = "evaluation timed out";

/// Resolves the isolate of a capture context.
///
/// # Safety
///
/// `ctx` must be null or point at a valid record whose isolate is null or live.
pub(crate) unsafe fn isolate<'a>(ctx: *const CallContext) -> Option<(&'a CallContext, &'a Isolate)> {
    let Some(call) = ctx.as_ref() else {
        warn!("forward call without a call context");
        return None;
    };
    let Some(isolate) = call.isolate.as_ref() else {
        warn!("forward call without an isolate");
        return None;
    };
    Some((call, isolate))
}

/// Runs `func` inside a try-catch in `context` (or the default context, see
/// `Isolate::context_scope`) and captures anything it raises.
///
/// # Safety
///
/// `ctx` as for [`isolate`]; `context` must be null or a live token.
pub(crate) unsafe fn run<T, F>(ctx: *const CallContext, context: ContextRef, func: F) -> Option<T>
where
    T: Discard,
    F: FnOnce(&mut v8::TryCatch<v8::HandleScope>, &Isolate) -> Option<T>,
{
    guarded(ctx, context, None, false, func)
}

/// Like [`run`], for calls that execute script code. Queues engine housekeeping afterwards.
///
/// # Safety
///
/// As for [`run`].
pub(crate) unsafe fn execute<T, F>(ctx: *const CallContext, context: ContextRef, func: F) -> Option<T>
where
    T: Discard,
    F: FnOnce(&mut v8::TryCatch<v8::HandleScope>, &Isolate) -> Option<T>,
{
    guarded(ctx, context, None, true, func)
}

/// Like [`execute`], terminating the script if it is still running after `timeout`.
///
/// # Safety
///
/// As for [`run`].
pub(crate) unsafe fn execute_with_timeout<T, F>(
    ctx: *const CallContext,
    context: ContextRef,
    timeout: Duration,
    func: F,
) -> Option<T>
where
    T: Discard,
    F: FnOnce(&mut v8::TryCatch<v8::HandleScope>, &Isolate) -> Option<T>,
{
    guarded(ctx, context, Some(timeout), true, func)
}

unsafe fn guarded<T, F>(
    ctx: *const CallContext,
    context: ContextRef,
    timeout: Option<Duration>,
    housekeeping: bool,
    func: F,
) -> Option<T>
where
    T: Discard,
    F: FnOnce(&mut v8::TryCatch<v8::HandleScope>, &Isolate) -> Option<T>,
{
    let (call, isolate) = isolate(ctx)?;
    // the watchdog cannot interrupt the embedder code a callback is running
    let nested_timeout = timeout.is_some() && isolate.callback_depth() > 0;
    let watchdog = match timeout {
        Some(timeout) if !nested_timeout => Some(Watchdog::arm(isolate, timeout)),
        _ => None,
    };

    let outcome = isolate.context_scope(context, |scope| {
        let scope = &mut v8::TryCatch::new(scope);
        let result = if nested_timeout {
            BridgeError::InvalidTimeout.throw(scope);
            None
        } else {
            func(scope, isolate)
        };
        let timed_out = watchdog.as_ref().is_some_and(Watchdog::fired);
        let reason = if timed_out { TIMED_OUT } else { TERMINATED };
        let terminated = scope.has_terminated();
        let caught = capture(scope, call, reason);
        // outside callbacks nothing is left for the termination to unwind
        if terminated && isolate.callback_depth() == 0 {
            scope.cancel_terminate_execution();
        }
        if caught {
            if let Some(result) = result {
                result.discard();
            }
            return None;
        }
        result
    });
    drop(watchdog);

    if housekeeping {
        isolate.schedule_engine_work();
    }
    match outcome {
        Ok(result) => result,
        Err(err) => {
            warn!("forward call on isolate {} failed: {}", isolate.id(), err);
            None
        }
    }
}

/// Runs `func` in a plain handle scope. For context-free calls that cannot raise.
///
/// # Safety
///
/// As for [`isolate`].
pub(crate) unsafe fn run_scoped<T, F>(ctx: *const CallContext, func: F) -> Option<T>
where
    F: FnOnce(&mut v8::HandleScope<()>, &Isolate) -> Option<T>,
{
    let (_, isolate) = isolate(ctx)?;
    isolate.scope(|scope| func(scope, isolate))
}

/// Copies a caught exception into the capture slots. Returns whether anything was caught.
fn capture(scope: &mut v8::TryCatch<v8::HandleScope>, call: &CallContext, reason: &str) -> bool {
    let terminated = scope.has_terminated();
    if !terminated && !scope.has_caught() {
        return false;
    }

    let exception = if terminated {
        let message = v8::String::new(scope, reason).unwrap_or_else(|| v8::String::empty(scope));
        Some(v8::Exception::error(scope, message))
    } else {
        scope.exception()
    };
    let message = scope.message();
    trace!(
        "captured {} on isolate {:?}",
        if terminated { "termination" } else { "exception" },
        call.isolate
    );

    unsafe {
        if let Some(slot) = call.exception.as_mut() {
            *slot = handle::value_to_durable(scope, exception);
        }
        if let Some(slot) = call.message.as_mut() {
            *slot = handle::to_durable(scope, message);
        }
    }
    true
}
