use super::arguments;
use crate::capture::{self, CallContext};
use crate::handle::{self, ContextRef, ScriptRef, ValueRef};
use log::debug;
use std::ptr;
use std::time::Duration;

/// Compiles `source` in `context`. Syntax errors are captured.
#[no_mangle]
pub unsafe extern "C" fn v8glue_script_compile(
    ctx: *const CallContext,
    context: ContextRef,
    source: ValueRef,
) -> ScriptRef {
    capture::run(ctx, context, |scope, _| {
        let source: v8::Local<v8::String> = handle::cast_or_throw(scope, source, "String")?;
        let script = v8::Script::compile(scope, source, None);
        Some(handle::to_durable(scope, script))
    })
    .unwrap_or(ptr::null_mut())
}

/// Compiles `source` with origin metadata, which shows up in stack traces and messages. Null
/// `resource_name` and `source_map_url` are `undefined`.
#[no_mangle]
#[allow(clippy::too_many_arguments)]
pub unsafe extern "C" fn v8glue_script_compile_origin(
    ctx: *const CallContext,
    context: ContextRef,
    source: ValueRef,
    resource_name: ValueRef,
    line_offset: i32,
    column_offset: i32,
    is_shared_cross_origin: bool,
    script_id: i32,
    is_debug_script: bool,
    source_map_url: ValueRef,
    is_opaque: bool,
) -> ScriptRef {
    if is_debug_script {
        debug!("the engine no longer distinguishes debug scripts, compiling as a regular one");
    }
    capture::run(ctx, context, |scope, _| {
        let source: v8::Local<v8::String> = handle::cast_or_throw(scope, source, "String")?;
        let resource_name = handle::receiver(scope, resource_name);
        let source_map_url = handle::receiver(scope, source_map_url);
        let origin = v8::ScriptOrigin::new(
            scope,
            resource_name,
            line_offset,
            column_offset,
            is_shared_cross_origin,
            script_id,
            source_map_url,
            is_opaque,
            false,
            false,
        );
        let script = v8::Script::compile(scope, source, Some(&origin));
        Some(handle::to_durable(scope, script))
    })
    .unwrap_or(ptr::null_mut())
}

/// Runs a compiled script in `context`, returning its completion value.
#[no_mangle]
pub unsafe extern "C" fn v8glue_script_run(
    ctx: *const CallContext,
    context: ContextRef,
    script: ScriptRef,
) -> ValueRef {
    capture::execute(ctx, context, |scope, _| {
        let script = handle::to_local(scope, script)?;
        let result = script.run(scope);
        Some(handle::value_to_durable(scope, result))
    })
    .unwrap_or(ptr::null_mut())
}

/// Like `v8glue_script_run`, terminating the script once `timeout_ms` have passed. A timed out
/// run captures an `Error` and leaves the isolate usable. Not available inside callbacks.
#[no_mangle]
pub unsafe extern "C" fn v8glue_script_run_with_timeout(
    ctx: *const CallContext,
    context: ContextRef,
    script: ScriptRef,
    timeout_ms: u64,
) -> ValueRef {
    let timeout = Duration::from_millis(timeout_ms);
    capture::execute_with_timeout(ctx, context, timeout, |scope, _| {
        let script = handle::to_local(scope, script)?;
        let result = script.run(scope);
        Some(handle::value_to_durable(scope, result))
    })
    .unwrap_or(ptr::null_mut())
}

#[no_mangle]
pub unsafe extern "C" fn v8glue_script_release(script: ScriptRef) {
    handle::release(script)
}

/// Calls `function` with `argc` arguments from `argv`. A null receiver is `undefined`.
#[no_mangle]
pub unsafe extern "C" fn v8glue_function_call(
    ctx: *const CallContext,
    context: ContextRef,
    function: ValueRef,
    recv: ValueRef,
    argc: i32,
    argv: *const ValueRef,
) -> ValueRef {
    capture::execute(ctx, context, |scope, _| {
        let function: v8::Local<v8::Function> = handle::cast_or_throw(scope, function, "Function")?;
        let recv = handle::receiver(scope, recv);
        let args = arguments(scope, argc, argv);
        let result = function.call(scope, recv, &args);
        Some(handle::value_to_durable(scope, result))
    })
    .unwrap_or(ptr::null_mut())
}

/// `new function(...args)`.
#[no_mangle]
pub unsafe extern "C" fn v8glue_function_new_instance(
    ctx: *const CallContext,
    context: ContextRef,
    function: ValueRef,
    argc: i32,
    argv: *const ValueRef,
) -> ValueRef {
    capture::execute(ctx, context, |scope, _| {
        let function: v8::Local<v8::Function> = handle::cast_or_throw(scope, function, "Function")?;
        let args = arguments(scope, argc, argv);
        let instance = function.new_instance(scope, &args);
        Some(handle::value_to_durable(scope, instance))
    })
    .unwrap_or(ptr::null_mut())
}
