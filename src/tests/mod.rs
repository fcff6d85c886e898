use crate::allocator::AllocatorPtr;
use crate::api::engine::*;
use crate::api::isolate::*;
use crate::api::object::*;
use crate::api::script::*;
use crate::api::value::*;
use crate::capture::CallContext;
use crate::handle::{ContextRef, MessageRef, ValueRef};
use crate::isolate::{Isolate, IsolatePtr};
use crate::maybe::MaybeI32;
use std::ffi::{c_char, CString};
use std::ptr;
use std::sync::Once;

mod capture_context;
mod handles;
mod lifecycle;
mod scheduling;

static INIT: Once = Once::new();

/// Brings the engine up once per test binary, through the same entry points an embedder uses.
pub(crate) fn setup() {
    INIT.call_once(|| unsafe {
        let config = CString::new(r#"{ "log_level": "debug", "capture_stack_trace_frames": 16 }"#)
            .unwrap();
        assert!(v8glue_configure(config.as_ptr()));
        assert!(v8glue_v8_initialize_platform(v8glue_platform_create_default()));
        assert!(v8glue_v8_initialize());
    });
}

/// One isolate with one context, plus the capture slots forward calls write into.
pub(crate) struct Harness {
    pub isolate: IsolatePtr,
    pub context: ContextRef,
    // boxed so the slots keep their address when the harness moves
    exception: Box<ValueRef>,
    message: Box<MessageRef>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_allocator(ptr::null_mut())
    }

    pub fn with_allocator(allocator: AllocatorPtr) -> Self {
        setup();
        unsafe {
            let isolate = v8glue_isolate_new(allocator);
            assert!(!isolate.is_null());
            let context = v8glue_context_new(isolate);
            assert!(!context.is_null());
            Harness {
                isolate,
                context,
                exception: Box::new(ptr::null_mut()),
                message: Box::new(ptr::null_mut()),
            }
        }
    }

    pub fn bridge(&self) -> &Isolate {
        unsafe { &*self.isolate }
    }

    pub fn ctx(&mut self) -> CallContext {
        CallContext {
            isolate: self.isolate,
            exception: &mut *self.exception,
            message: &mut *self.message,
        }
    }

    pub fn exception(&self) -> ValueRef {
        *self.exception
    }

    pub fn message(&self) -> MessageRef {
        *self.message
    }

    /// Releases whatever the last failing call captured.
    pub fn clear(&mut self) {
        unsafe {
            v8glue_value_release(std::mem::replace(&mut *self.exception, ptr::null_mut()));
            v8glue_message_release(std::mem::replace(&mut *self.message, ptr::null_mut()));
        }
    }

    pub fn string(&mut self, text: &str) -> ValueRef {
        let ctx = self.ctx();
        unsafe {
            v8glue_string_new_from_utf8_normal(
                &ctx,
                text.as_ptr() as *const c_char,
                text.len() as i32,
            )
        }
    }

    pub fn eval(&mut self, source: &str) -> ValueRef {
        let source = self.string(source);
        let ctx = self.ctx();
        unsafe {
            let script = v8glue_script_compile(&ctx, self.context, source);
            let result = v8glue_script_run(&ctx, self.context, script);
            v8glue_script_release(script);
            v8glue_value_release(source);
            result
        }
    }

    pub fn eval_i32(&mut self, source: &str) -> MaybeI32 {
        let value = self.eval(source);
        let result = self.int(value);
        unsafe { v8glue_value_release(value) };
        result
    }

    pub fn int(&mut self, value: ValueRef) -> MaybeI32 {
        let ctx = self.ctx();
        unsafe { v8glue_value_int32_value(&ctx, self.context, value) }
    }

    pub fn read(&mut self, value: ValueRef) -> String {
        let ctx = self.ctx();
        unsafe {
            let length = v8glue_string_utf8_length(&ctx, value);
            assert!(length >= 0, "value is not a string");
            let mut buffer = vec![0u8; length as usize];
            let written = v8glue_string_write_utf8(
                &ctx,
                value,
                buffer.as_mut_ptr() as *mut c_char,
                length,
            );
            buffer.truncate(written as usize);
            String::from_utf8(buffer).unwrap()
        }
    }

    pub fn get(&mut self, object: ValueRef, key: &str) -> ValueRef {
        let key = self.string(key);
        let ctx = self.ctx();
        unsafe {
            let value = v8glue_object_get(&ctx, self.context, object, key);
            v8glue_value_release(key);
            value
        }
    }

    /// The `message` property of the captured exception.
    pub fn error_message(&mut self) -> String {
        let exception = self.exception();
        assert!(!exception.is_null(), "nothing was captured");
        let message = self.get(exception, "message");
        let text = self.read(message);
        unsafe { v8glue_value_release(message) };
        text
    }

    /// Defines a global variable. `value` stays owned by the caller.
    pub fn set_global(&mut self, name: &str, value: ValueRef) {
        let key = self.string(name);
        let ctx = self.ctx();
        unsafe {
            let global = v8glue_context_global(self.isolate, self.context);
            let set = v8glue_object_set(&ctx, self.context, global, key, value);
            assert!(set.is_set && set.value);
            v8glue_value_release(global);
            v8glue_value_release(key);
        }
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        self.clear();
        unsafe {
            v8glue_context_release(self.context);
            v8glue_isolate_dispose(self.isolate);
        }
    }
}

/// A capture context for forward calls made from inside a callback, discarding exceptions.
pub(crate) fn callback_ctx(isolate: IsolatePtr) -> CallContext {
    CallContext {
        isolate,
        exception: ptr::null_mut(),
        message: ptr::null_mut(),
    }
}
