//! Promotion of scope-bound engine handles to tokens that outlive any handle scope, and
//! demotion back.
//!
//! A token is a `*mut Durable<T>`. Null always means "absent": an operation that produced no
//! value, or an optional argument that was not supplied. The `Global` inside a token carries the
//! isolate association; demoting it inside another isolate panics in the engine binding.

use crate::error::{BridgeError, BridgeResult};

/// A heap-durable handle to an engine object, released by dropping it.
pub struct Durable<T>(v8::Global<T>);

pub type ValueRef = *mut Durable<v8::Value>;
pub type ContextRef = *mut Durable<v8::Context>;
pub type ScriptRef = *mut Durable<v8::Script>;
pub type MessageRef = *mut Durable<v8::Message>;
pub type StackTraceRef = *mut Durable<v8::StackTrace>;
pub type ObjectTemplateRef = *mut Durable<v8::ObjectTemplate>;
pub type FunctionTemplateRef = *mut Durable<v8::FunctionTemplate>;

impl<T> Durable<T> {
    pub fn new(scope: &mut v8::HandleScope<()>, local: v8::Local<T>) -> Self {
        Durable(v8::Global::new(scope, local))
    }

    pub fn from_global(global: v8::Global<T>) -> Self {
        Durable(global)
    }

    pub fn global(&self) -> &v8::Global<T> {
        &self.0
    }

    pub fn into_raw(self) -> *mut Durable<T> {
        Box::into_raw(Box::new(self))
    }

    /// Takes ownership of a token. Null yields `None`.
    ///
    /// # Safety
    ///
    /// `ptr` must be null or a token produced by `into_raw` that was not released yet.
    pub unsafe fn from_raw(ptr: *mut Durable<T>) -> Option<Self> {
        (!ptr.is_null()).then(|| *Box::from_raw(ptr))
    }

    /// Borrows a token without taking ownership.
    ///
    /// # Safety
    ///
    /// Same as `from_raw`; the token must stay alive for `'a`.
    pub unsafe fn borrow<'a>(ptr: *const Durable<T>) -> Option<&'a Self> {
        ptr.as_ref()
    }
}

/// Promotes an optional local handle to a token. `None` becomes null.
pub fn to_durable<T>(
    scope: &mut v8::HandleScope<()>,
    local: Option<v8::Local<T>>,
) -> *mut Durable<T> {
    match local {
        Some(local) => Durable::new(scope, local).into_raw(),
        None => std::ptr::null_mut(),
    }
}

/// Promotes any value-like local handle to a value token.
pub fn value_to_durable<'a, T>(
    scope: &mut v8::HandleScope<()>,
    local: Option<v8::Local<'a, T>>,
) -> ValueRef
where
    v8::Local<'a, T>: Into<v8::Local<'a, v8::Value>>,
{
    to_durable(scope, local.map(Into::into))
}

/// Demotes a token to a local handle in the current scope. Null becomes `None`.
///
/// # Safety
///
/// `ptr` must be null or a live token.
pub unsafe fn to_local<'s, T>(
    scope: &mut v8::HandleScope<'s, ()>,
    ptr: *const Durable<T>,
) -> Option<v8::Local<'s, T>> {
    Durable::borrow(ptr).map(|durable| v8::Local::new(scope, &durable.0))
}

/// Demotes a receiver token. An absent receiver is `undefined`, never an error.
///
/// # Safety
///
/// `ptr` must be null or a live token.
pub unsafe fn receiver<'s>(
    scope: &mut v8::HandleScope<'s, ()>,
    ptr: *const Durable<v8::Value>,
) -> v8::Local<'s, v8::Value> {
    match to_local(scope, ptr) {
        Some(value) => value,
        None => v8::undefined(scope).into(),
    }
}

/// Demotes a value token and downcasts it to a concrete engine type. A null token is reported
/// as a wrong type as well, since every caller of this requires a value.
///
/// # Safety
///
/// `ptr` must be null or a live token.
pub unsafe fn cast<'s, T>(
    scope: &mut v8::HandleScope<'s, ()>,
    ptr: *const Durable<v8::Value>,
    expected: &'static str,
) -> BridgeResult<v8::Local<'s, T>>
where
    v8::Local<'s, T>: TryFrom<v8::Local<'s, v8::Value>>,
{
    to_local(scope, ptr)
        .and_then(|value| v8::Local::<T>::try_from(value).ok())
        .ok_or_else(|| BridgeError::wrong_type(expected))
}

/// Like `cast`, but raises the mismatch as a `TypeError` in the current scope so it lands in
/// the capture context of the surrounding forward call.
///
/// # Safety
///
/// `ptr` must be null or a live token.
pub unsafe fn cast_or_throw<'s, T>(
    scope: &mut v8::HandleScope<'s>,
    ptr: *const Durable<v8::Value>,
    expected: &'static str,
) -> Option<v8::Local<'s, T>>
where
    v8::Local<'s, T>: TryFrom<v8::Local<'s, v8::Value>>,
{
    match cast(scope, ptr, expected) {
        Ok(local) => Some(local),
        Err(err) => {
            err.throw(scope);
            None
        }
    }
}

/// Releases a token of any kind. Null is a no-op.
///
/// # Safety
///
/// `ptr` must be null or a live token; it is dangling afterwards.
pub unsafe fn release<T>(ptr: *mut Durable<T>) {
    drop(Durable::from_raw(ptr));
}
