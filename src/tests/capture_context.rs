use super::Harness;
use crate::api::isolate::*;
use crate::api::object::*;
use crate::api::script::*;
use crate::api::value::*;
use std::ptr;

#[test]
fn syntax_error_fills_both_slots() {
    let mut harness = Harness::new();
    let result = harness.eval("1 +");
    assert!(result.is_null());
    assert!(!harness.exception().is_null());

    let ctx = harness.ctx();
    let message = harness.message();
    assert!(!message.is_null());
    let line = unsafe { v8glue_message_get_line_number(&ctx, harness.context, message) };
    assert!(line.is_set);
    assert_eq!(1, line.value);
    let text = unsafe { v8glue_message_get(&ctx, harness.context, message) };
    assert!(harness.read(text).contains("SyntaxError"));
    unsafe { v8glue_value_release(text) };
}

#[test]
fn thrown_error_is_captured_with_its_type() {
    let mut harness = Harness::new();
    let result = harness.eval("throw new TypeError('nope')");
    assert!(result.is_null());
    assert_eq!("nope", harness.error_message());
    let exception = harness.exception();
    let name = harness.get(exception, "name");
    assert_eq!("TypeError", harness.read(name));
    unsafe { v8glue_value_release(name) };
}

#[test]
fn successful_call_leaves_slots_untouched() {
    let mut harness = Harness::new();
    harness.eval("throw 1");
    let exception = harness.exception();
    let message = harness.message();
    assert!(!exception.is_null());

    assert_eq!(3, harness.eval_i32("1 + 2").value);
    assert_eq!(exception, harness.exception());
    assert_eq!(message, harness.message());
}

#[test]
fn null_slots_are_skipped() {
    let mut harness = Harness::new();
    let source = harness.string("throw 1");
    let ctx = super::callback_ctx(harness.isolate);
    unsafe {
        let script = v8glue_script_compile(&ctx, harness.context, source);
        let result = v8glue_script_run(&ctx, harness.context, script);
        assert!(result.is_null());
        v8glue_script_release(script);
        v8glue_value_release(source);
    }
}

#[test]
fn wrong_receiver_type_raises_type_error() {
    let mut harness = Harness::new();
    let ctx = harness.ctx();
    let number = unsafe { v8glue_number_new(harness.isolate, 4.0) };
    let key = harness.string("x");
    let value = unsafe { v8glue_object_get(&ctx, harness.context, number, key) };
    assert!(value.is_null());
    let exception = harness.exception();
    let name = harness.get(exception, "name");
    assert_eq!("TypeError", harness.read(name));
    unsafe {
        v8glue_value_release(name);
        v8glue_value_release(key);
        v8glue_value_release(number);
    }
}

#[test]
fn missing_context_falls_back_to_entered_one() {
    let mut harness = Harness::new();
    let ctx = harness.ctx();

    // nothing passed, nothing entered
    let object = unsafe { v8glue_object_new(&ctx, ptr::null_mut()) };
    assert!(object.is_null());
    assert!(harness.exception().is_null());
    assert!(unsafe { v8glue_isolate_get_current_context(harness.isolate) }.is_null());

    unsafe {
        assert!(v8glue_context_enter(harness.isolate, harness.context));
        let object = v8glue_object_new(&ctx, ptr::null_mut());
        assert!(!object.is_null());
        v8glue_value_release(object);

        let current = v8glue_isolate_get_current_context(harness.isolate);
        assert!(!current.is_null());
        v8glue_context_release(current);

        assert!(v8glue_context_exit(harness.isolate));
        assert!(!v8glue_context_exit(harness.isolate));
    }
}

#[test]
fn messages_carry_stack_frames() {
    let mut harness = Harness::new();
    let result = harness.eval(
        "function inner() { throw new Error('deep'); }\nfunction outer() { inner(); }\nouter();",
    );
    assert!(result.is_null());
    let message = harness.message();
    assert!(!message.is_null());
    let ctx = harness.ctx();
    unsafe {
        let trace = v8glue_message_get_stack_trace(&ctx, harness.context, message);
        assert!(!trace.is_null());
        let count = v8glue_stack_trace_get_frame_count(&ctx, trace);
        assert_eq!(3, count);

        let mut frame = StackFrame::default();
        assert!(v8glue_stack_trace_get_frame(&ctx, harness.context, trace, 0, &mut frame));
        assert_eq!(1, frame.line_number);
        assert!(frame.column > 1);
        assert!(!frame.is_eval && !frame.is_constructor);
        assert_eq!("inner", harness.read(frame.function_name));
        v8glue_value_release(frame.function_name);
        v8glue_value_release(frame.script_name);

        // top-level code has no function name
        let mut top = StackFrame::default();
        assert!(v8glue_stack_trace_get_frame(&ctx, harness.context, trace, count - 1, &mut top));
        assert_eq!(3, top.line_number);
        assert!(top.function_name.is_null());
        v8glue_value_release(top.script_name);

        let mut missing = StackFrame::default();
        assert!(!v8glue_stack_trace_get_frame(&ctx, harness.context, trace, count, &mut missing));
        assert!(!v8glue_stack_trace_get_frame(&ctx, harness.context, trace, -1, &mut missing));
        assert_eq!(0, missing.line_number);
        assert_eq!(-1, v8glue_stack_trace_get_frame_count(&ctx, ptr::null_mut()));
        v8glue_stack_trace_release(trace);
    }
    assert!(!harness.exception().is_null());
}
