use super::{bridge, bytes};
use crate::capture::{self, CallContext};
use crate::handle::{self, ContextRef, Durable, MessageRef, StackTraceRef, ValueRef};
use crate::isolate::IsolatePtr;
use crate::maybe::{MaybeBool, MaybeF64, MaybeI32, MaybeI64, MaybeU32};
use log::warn;
use std::ffi::c_char;
use std::ptr;
use std::slice;

unsafe fn new_string(
    ctx: *const CallContext,
    data: *const c_char,
    length: i32,
    kind: v8::NewStringType,
) -> ValueRef {
    capture::run_scoped(ctx, |scope, _| {
        let Some(data) = bytes(data, length) else {
            warn!("no string data given");
            return None;
        };
        let string = v8::String::new_from_utf8(scope, data, kind);
        Some(handle::value_to_durable(scope, string))
    })
    .unwrap_or(ptr::null_mut())
}

/// Creates a string from UTF-8 bytes. A negative `length` reads up to the terminating nul.
/// Returns null if the string is too long for the engine.
#[no_mangle]
pub unsafe extern "C" fn v8glue_string_new_from_utf8_normal(
    ctx: *const CallContext,
    data: *const c_char,
    length: i32,
) -> ValueRef {
    new_string(ctx, data, length, v8::NewStringType::Normal)
}

/// Like `v8glue_string_new_from_utf8_normal`, interning the string.
#[no_mangle]
pub unsafe extern "C" fn v8glue_string_new_from_utf8_internalized(
    ctx: *const CallContext,
    data: *const c_char,
    length: i32,
) -> ValueRef {
    new_string(ctx, data, length, v8::NewStringType::Internalized)
}

/// Writes a string as UTF-8 into `buffer`, without a terminating nul, stopping before a character
/// that would not fit into `capacity` bytes. Returns the number of bytes written, or -1 if
/// `string` is not a string.
#[no_mangle]
pub unsafe extern "C" fn v8glue_string_write_utf8(
    ctx: *const CallContext,
    string: ValueRef,
    buffer: *mut c_char,
    capacity: i32,
) -> i32 {
    capture::run_scoped(ctx, |scope, _| {
        let string: v8::Local<v8::String> = match handle::cast(scope, string, "String") {
            Ok(string) => string,
            Err(err) => {
                warn!("cannot write string: {}", err);
                return None;
            }
        };
        let capacity = usize::try_from(capacity).unwrap_or(0);
        if buffer.is_null() || capacity == 0 {
            return Some(0);
        }
        let buffer = slice::from_raw_parts_mut(buffer as *mut u8, capacity);
        let written = string.write_utf8(
            scope,
            buffer,
            None,
            v8::WriteOptions::NO_NULL_TERMINATION,
        );
        Some(i32::try_from(written).unwrap_or(i32::MAX))
    })
    .unwrap_or(-1)
}

/// Length of a string in UTF-8 bytes, or -1 if `string` is not a string.
#[no_mangle]
pub unsafe extern "C" fn v8glue_string_utf8_length(ctx: *const CallContext, string: ValueRef) -> i32 {
    capture::run_scoped(ctx, |scope, _| {
        let string: v8::Local<v8::String> = handle::cast(scope, string, "String").ok()?;
        i32::try_from(string.utf8_length(scope)).ok()
    })
    .unwrap_or(-1)
}

unsafe fn primitive<F>(isolate: IsolatePtr, func: F) -> ValueRef
where
    F: for<'s> FnOnce(&mut v8::HandleScope<'s, ()>) -> v8::Local<'s, v8::Value>,
{
    match bridge(isolate) {
        Some(bridge) => bridge.scope(|scope| {
            let value = func(scope);
            handle::to_durable(scope, Some(value))
        }),
        None => ptr::null_mut(),
    }
}

#[no_mangle]
pub unsafe extern "C" fn v8glue_undefined(isolate: IsolatePtr) -> ValueRef {
    primitive(isolate, |scope| v8::undefined(scope).into())
}

#[no_mangle]
pub unsafe extern "C" fn v8glue_null(isolate: IsolatePtr) -> ValueRef {
    primitive(isolate, |scope| v8::null(scope).into())
}

#[no_mangle]
pub unsafe extern "C" fn v8glue_true(isolate: IsolatePtr) -> ValueRef {
    primitive(isolate, |scope| v8::Boolean::new(scope, true).into())
}

#[no_mangle]
pub unsafe extern "C" fn v8glue_false(isolate: IsolatePtr) -> ValueRef {
    primitive(isolate, |scope| v8::Boolean::new(scope, false).into())
}

#[no_mangle]
pub unsafe extern "C" fn v8glue_boolean_new(isolate: IsolatePtr, value: bool) -> ValueRef {
    primitive(isolate, |scope| v8::Boolean::new(scope, value).into())
}

#[no_mangle]
pub unsafe extern "C" fn v8glue_number_new(isolate: IsolatePtr, value: f64) -> ValueRef {
    primitive(isolate, |scope| v8::Number::new(scope, value).into())
}

#[no_mangle]
pub unsafe extern "C" fn v8glue_integer_new(isolate: IsolatePtr, value: i32) -> ValueRef {
    primitive(isolate, |scope| v8::Integer::new(scope, value).into())
}

#[no_mangle]
pub unsafe extern "C" fn v8glue_integer_new_from_unsigned(isolate: IsolatePtr, value: u32) -> ValueRef {
    primitive(isolate, |scope| v8::Integer::new_from_unsigned(scope, value).into())
}

/// Converts `value` with JavaScript's `ToBoolean`. Absent only for a null token.
#[no_mangle]
pub unsafe extern "C" fn v8glue_value_boolean_value(
    ctx: *const CallContext,
    context: ContextRef,
    value: ValueRef,
) -> MaybeBool {
    capture::run(ctx, context, |scope, _| {
        let value = handle::to_local(scope, value)?;
        Some(value.boolean_value(scope))
    })
    .into()
}

#[no_mangle]
pub unsafe extern "C" fn v8glue_value_int32_value(
    ctx: *const CallContext,
    context: ContextRef,
    value: ValueRef,
) -> MaybeI32 {
    capture::run(ctx, context, |scope, _| {
        handle::to_local(scope, value)?.int32_value(scope)
    })
    .into()
}

#[no_mangle]
pub unsafe extern "C" fn v8glue_value_uint32_value(
    ctx: *const CallContext,
    context: ContextRef,
    value: ValueRef,
) -> MaybeU32 {
    capture::run(ctx, context, |scope, _| {
        handle::to_local(scope, value)?.uint32_value(scope)
    })
    .into()
}

#[no_mangle]
pub unsafe extern "C" fn v8glue_value_integer_value(
    ctx: *const CallContext,
    context: ContextRef,
    value: ValueRef,
) -> MaybeI64 {
    capture::run(ctx, context, |scope, _| {
        handle::to_local(scope, value)?.integer_value(scope)
    })
    .into()
}

#[no_mangle]
pub unsafe extern "C" fn v8glue_value_number_value(
    ctx: *const CallContext,
    context: ContextRef,
    value: ValueRef,
) -> MaybeF64 {
    capture::run(ctx, context, |scope, _| {
        handle::to_local(scope, value)?.number_value(scope)
    })
    .into()
}

#[derive(Clone, Copy)]
enum Conversion {
    String,
    Object,
    Number,
    Integer,
}

unsafe fn convert(
    ctx: *const CallContext,
    context: ContextRef,
    value: ValueRef,
    conversion: Conversion,
) -> ValueRef {
    // conversions may call back into script, through `toString` or `valueOf`
    capture::execute(ctx, context, |scope, _| {
        let value = handle::receiver(scope, value);
        let converted: Option<v8::Local<v8::Value>> = match conversion {
            Conversion::String => value.to_string(scope).map(Into::into),
            Conversion::Object => value.to_object(scope).map(Into::into),
            Conversion::Number => value.to_number(scope).map(Into::into),
            Conversion::Integer => value.to_integer(scope).map(Into::into),
        };
        Some(handle::to_durable(scope, converted))
    })
    .unwrap_or(ptr::null_mut())
}

/// `String(value)`, for anything but symbols. A null value is `undefined`.
#[no_mangle]
pub unsafe extern "C" fn v8glue_value_to_string(
    ctx: *const CallContext,
    context: ContextRef,
    value: ValueRef,
) -> ValueRef {
    convert(ctx, context, value, Conversion::String)
}

/// `Object(value)`. Raises for `null` and `undefined`.
#[no_mangle]
pub unsafe extern "C" fn v8glue_value_to_object(
    ctx: *const CallContext,
    context: ContextRef,
    value: ValueRef,
) -> ValueRef {
    convert(ctx, context, value, Conversion::Object)
}

#[no_mangle]
pub unsafe extern "C" fn v8glue_value_to_number(
    ctx: *const CallContext,
    context: ContextRef,
    value: ValueRef,
) -> ValueRef {
    convert(ctx, context, value, Conversion::Number)
}

/// The value converted to a number and truncated towards zero.
#[no_mangle]
pub unsafe extern "C" fn v8glue_value_to_integer(
    ctx: *const CallContext,
    context: ContextRef,
    value: ValueRef,
) -> ValueRef {
    convert(ctx, context, value, Conversion::Integer)
}

unsafe fn predicate<F>(isolate: IsolatePtr, value: ValueRef, func: F) -> bool
where
    F: FnOnce(&v8::Value) -> bool,
{
    let (Some(bridge), Some(value)) = (bridge(isolate), Durable::borrow(value)) else {
        return false;
    };
    bridge.with_isolate(|isolate| func(value.global().open(isolate)))
}

#[no_mangle]
pub unsafe extern "C" fn v8glue_value_is_undefined(isolate: IsolatePtr, value: ValueRef) -> bool {
    predicate(isolate, value, v8::Value::is_undefined)
}

#[no_mangle]
pub unsafe extern "C" fn v8glue_value_is_null(isolate: IsolatePtr, value: ValueRef) -> bool {
    predicate(isolate, value, v8::Value::is_null)
}

#[no_mangle]
pub unsafe extern "C" fn v8glue_value_is_string(isolate: IsolatePtr, value: ValueRef) -> bool {
    predicate(isolate, value, v8::Value::is_string)
}

#[no_mangle]
pub unsafe extern "C" fn v8glue_value_is_object(isolate: IsolatePtr, value: ValueRef) -> bool {
    predicate(isolate, value, v8::Value::is_object)
}

#[no_mangle]
pub unsafe extern "C" fn v8glue_value_is_function(isolate: IsolatePtr, value: ValueRef) -> bool {
    predicate(isolate, value, v8::Value::is_function)
}

#[no_mangle]
pub unsafe extern "C" fn v8glue_value_is_number(isolate: IsolatePtr, value: ValueRef) -> bool {
    predicate(isolate, value, v8::Value::is_number)
}

unsafe fn compare<F>(isolate: IsolatePtr, a: ValueRef, b: ValueRef, func: F) -> bool
where
    F: FnOnce(v8::Local<v8::Value>, v8::Local<v8::Value>) -> bool,
{
    let Some(bridge) = bridge(isolate) else {
        return false;
    };
    bridge.scope(|scope| {
        let a = handle::receiver(scope, a);
        let b = handle::receiver(scope, b);
        func(a, b)
    })
}

/// `a === b`. Null tokens compare as `undefined`.
#[no_mangle]
pub unsafe extern "C" fn v8glue_value_strict_equals(
    isolate: IsolatePtr,
    a: ValueRef,
    b: ValueRef,
) -> bool {
    compare(isolate, a, b, |a, b| a.strict_equals(b))
}

/// `Object.is(a, b)`. Null tokens compare as `undefined`.
#[no_mangle]
pub unsafe extern "C" fn v8glue_value_same_value(isolate: IsolatePtr, a: ValueRef, b: ValueRef) -> bool {
    compare(isolate, a, b, |a, b| a.same_value(b))
}

/// Creates a second, independently released token for the same value. Used to keep values lent
/// to a callback.
#[no_mangle]
pub unsafe extern "C" fn v8glue_value_clone(value: ValueRef) -> ValueRef {
    match Durable::borrow(value) {
        Some(value) => Durable::from_global(value.global().clone()).into_raw(),
        None => ptr::null_mut(),
    }
}

#[no_mangle]
pub unsafe extern "C" fn v8glue_value_release(value: ValueRef) {
    handle::release(value)
}

/// The message text, as `Uncaught TypeError: ...`.
#[no_mangle]
pub unsafe extern "C" fn v8glue_message_get(
    ctx: *const CallContext,
    context: ContextRef,
    message: MessageRef,
) -> ValueRef {
    capture::run(ctx, context, |scope, _| {
        let message = handle::to_local(scope, message)?;
        let text = message.get(scope);
        Some(handle::value_to_durable(scope, Some(text)))
    })
    .unwrap_or(ptr::null_mut())
}

#[no_mangle]
pub unsafe extern "C" fn v8glue_message_get_line_number(
    ctx: *const CallContext,
    context: ContextRef,
    message: MessageRef,
) -> MaybeI32 {
    capture::run(ctx, context, |scope, _| {
        let message = handle::to_local(scope, message)?;
        message
            .get_line_number(scope)
            .and_then(|line| i32::try_from(line).ok())
    })
    .into()
}

#[no_mangle]
pub unsafe extern "C" fn v8glue_message_get_start_column(
    ctx: *const CallContext,
    context: ContextRef,
    message: MessageRef,
) -> MaybeI32 {
    capture::run(ctx, context, |scope, _| {
        let message = handle::to_local(scope, message)?;
        i32::try_from(message.get_start_column()).ok()
    })
    .into()
}

#[no_mangle]
pub unsafe extern "C" fn v8glue_message_get_script_resource_name(
    ctx: *const CallContext,
    context: ContextRef,
    message: MessageRef,
) -> ValueRef {
    capture::run(ctx, context, |scope, _| {
        let message = handle::to_local(scope, message)?;
        let name = message.get_script_resource_name(scope);
        Some(handle::value_to_durable(scope, name))
    })
    .unwrap_or(ptr::null_mut())
}

#[no_mangle]
pub unsafe extern "C" fn v8glue_message_release(message: MessageRef) {
    handle::release(message)
}

/// The stack recorded when the message's exception was thrown. Null unless stack capture for
/// uncaught exceptions is on.
#[no_mangle]
pub unsafe extern "C" fn v8glue_message_get_stack_trace(
    ctx: *const CallContext,
    context: ContextRef,
    message: MessageRef,
) -> StackTraceRef {
    capture::run(ctx, context, |scope, _| {
        let message = handle::to_local(scope, message)?;
        let trace = message.get_stack_trace(scope)?;
        Some(handle::to_durable(scope, Some(trace)))
    })
    .unwrap_or(ptr::null_mut())
}

/// Number of frames in `trace`, or -1 for a null trace.
#[no_mangle]
pub unsafe extern "C" fn v8glue_stack_trace_get_frame_count(
    ctx: *const CallContext,
    trace: StackTraceRef,
) -> i32 {
    capture::run_scoped(ctx, |scope, _| {
        let trace = handle::to_local(scope, trace)?;
        i32::try_from(trace.get_frame_count()).ok()
    })
    .unwrap_or(-1)
}

/// One frame of a stack trace. Line and column are 1-based, 0 if unknown. The name tokens are
/// owned by the caller and null where the frame has no such name.
#[repr(C)]
#[derive(Debug)]
pub struct StackFrame {
    pub line_number: i32,
    pub column: i32,
    pub is_eval: bool,
    pub is_constructor: bool,
    pub script_name: ValueRef,
    pub function_name: ValueRef,
}

impl Default for StackFrame {
    fn default() -> Self {
        StackFrame {
            line_number: 0,
            column: 0,
            is_eval: false,
            is_constructor: false,
            script_name: ptr::null_mut(),
            function_name: ptr::null_mut(),
        }
    }
}

/// Fills `frame` with frame `index` of `trace`, innermost first. Returns false, leaving `frame`
/// untouched, if there is no such frame.
#[no_mangle]
pub unsafe extern "C" fn v8glue_stack_trace_get_frame(
    ctx: *const CallContext,
    context: ContextRef,
    trace: StackTraceRef,
    index: i32,
    frame: *mut StackFrame,
) -> bool {
    let Some(out) = frame.as_mut() else {
        return false;
    };
    capture::run(ctx, context, |scope, _| {
        let trace = handle::to_local(scope, trace)?;
        let frame = trace.get_frame(scope, usize::try_from(index).ok()?)?;
        // top-level code reports an empty function name
        let function_name = frame
            .get_function_name(scope)
            .filter(|name| name.length() > 0);
        let script_name = frame.get_script_name(scope);
        *out = StackFrame {
            line_number: i32::try_from(frame.get_line_number()).unwrap_or(0),
            column: i32::try_from(frame.get_column()).unwrap_or(0),
            is_eval: frame.is_eval(),
            is_constructor: frame.is_constructor(),
            script_name: handle::value_to_durable(scope, script_name),
            function_name: handle::value_to_durable(scope, function_name),
        };
        Some(true)
    })
    .unwrap_or(false)
}

#[no_mangle]
pub unsafe extern "C" fn v8glue_stack_trace_release(trace: StackTraceRef) {
    handle::release(trace)
}
