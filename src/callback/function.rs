use super::*;
use crate::enums::ConstructorBehavior;
use std::ptr;

/// Invoked for calls and, unless construction is disallowed, for `new` expressions.
pub type FunctionCallback = unsafe extern "C" fn(info: *mut FunctionCallbackInfo);

fn function_trampoline(
    scope: &mut v8::HandleScope,
    args: v8::FunctionCallbackArguments,
    mut rv: v8::ReturnValue,
) {
    let Some(snapshot) = Snapshot::lookup(scope, args.data()) else {
        return;
    };
    let Handlers::Function(callback) = snapshot.handlers else {
        return;
    };

    let mut frame = Frame::default();
    let length = args.length();
    let argv: Vec<ValueRef> = (0..length)
        .map(|i| frame.lend(scope, args.get(i)))
        .collect();
    let this = args.this();
    let holder = args.holder();
    let mut info = FunctionCallbackInfo {
        length,
        args: argv.as_ptr(),
        this: frame.lend(scope, this.into()),
        holder: frame.lend(scope, holder.into()),
        new_target: frame.lend(scope, args.new_target()),
        is_construct_call: args.is_construct_call(),
        data: frame.lend_global(scope, snapshot.data.as_ref()),
        isolate: snapshot.isolate.as_ptr(),
        return_value: ptr::null_mut(),
        thrown_value: ptr::null_mut(),
    };

    {
        let _entered = snapshot.isolate.enter_callback(scope);
        unsafe { callback(&mut info) };
    }

    frame.finish(
        scope,
        info.thrown_value,
        info.return_value,
        Some(&mut rv),
        Expect::Value,
    );
}

fn empty_trampoline(
    _scope: &mut v8::HandleScope,
    _args: v8::FunctionCallbackArguments,
    _rv: v8::ReturnValue,
) {
}

/// Creates a function whose invocations reach `callback`.
pub(crate) fn new_function<'s>(
    scope: &mut v8::HandleScope<'s>,
    isolate: &Isolate,
    callback: FunctionCallback,
    data: ValueRef,
    length: i32,
    behavior: ConstructorBehavior,
) -> Option<v8::Local<'s, v8::Function>> {
    let carrier = register(scope, isolate, Handlers::Function(callback), data);
    v8::Function::builder(function_trampoline)
        .data(carrier.into())
        .length(length)
        .constructor_behavior(behavior.into())
        .build(scope)
}

/// Creates a function template. Without a callback, instances behave like a function with an
/// empty body and no registration is made.
pub(crate) fn new_function_template<'s>(
    scope: &mut v8::HandleScope<'s, ()>,
    isolate: &Isolate,
    callback: Option<FunctionCallback>,
    data: ValueRef,
    length: i32,
    behavior: ConstructorBehavior,
) -> v8::Local<'s, v8::FunctionTemplate> {
    match callback {
        Some(callback) => {
            let carrier = register(scope, isolate, Handlers::Function(callback), data);
            v8::FunctionTemplate::builder(function_trampoline)
                .data(carrier.into())
                .length(length)
                .constructor_behavior(behavior.into())
                .build(scope)
        }
        None => v8::FunctionTemplate::builder(empty_trampoline)
            .length(length)
            .constructor_behavior(behavior.into())
            .build(scope),
    }
}
