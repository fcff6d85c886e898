//! The flat `extern "C"` surface.
//!
//! Conventions shared by every entry point:
//!
//! - Tokens returned are owned by the caller and must be released with the matching
//!   `v8glue_*_release`. Tokens passed in are borrowed unless documented otherwise.
//! - Null is absence, in both directions.
//! - Fallible calls take a [`CallContext`](crate::capture::CallContext) and, where the engine
//!   needs one, a context token. A null context token means the innermost entered context, or
//!   the current context of the running callback.

use crate::handle::{self, ValueRef};
use crate::isolate::{Isolate, IsolatePtr};
use log::warn;
use std::ffi::{c_char, CStr};
use std::slice;

pub mod engine;
pub mod isolate;
pub mod object;
pub mod script;
pub mod template;
pub mod value;

/// Resolves an isolate token.
unsafe fn bridge<'a>(isolate: IsolatePtr) -> Option<&'a Isolate> {
    let isolate = isolate.as_ref();
    if isolate.is_none() {
        warn!("call without an isolate");
    }
    isolate
}

/// Borrows a caller buffer of `length` bytes, or up to the terminating nul when `length` is
/// negative. A null buffer is only accepted as empty.
unsafe fn bytes<'a>(data: *const c_char, length: i32) -> Option<&'a [u8]> {
    if data.is_null() {
        return (length == 0).then_some(&[]);
    }
    Some(match usize::try_from(length) {
        Ok(length) => slice::from_raw_parts(data as *const u8, length),
        Err(_) => CStr::from_ptr(data).to_bytes(),
    })
}

/// Demotes a caller argument array. Null entries become `undefined`.
unsafe fn arguments<'s>(
    scope: &mut v8::HandleScope<'s, ()>,
    argc: i32,
    argv: *const ValueRef,
) -> Vec<v8::Local<'s, v8::Value>> {
    let argc = usize::try_from(argc).unwrap_or(0);
    if argv.is_null() || argc == 0 {
        return Vec::new();
    }
    slice::from_raw_parts(argv, argc)
        .iter()
        .map(|arg| handle::receiver(scope, *arg))
        .collect()
}
