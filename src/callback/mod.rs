//! Trampolines that let the engine call back into embedder functions.
//!
//! The engine only accepts a fixed native signature per callback category, so every category has
//! one trampoline. Installing a callback stores the embedder's function pointers and user data in
//! the isolate's [`Registry`] and hands the engine a `v8::External` holding nothing but the
//! registration index. When the engine invokes the trampoline it reads that index back from the
//! callback data, copies the registration out, lends the call's values to the embedder as borrowed
//! tokens, and applies whatever the embedder left in the info record.

use crate::handle::{self, Durable, ValueRef};
use crate::isolate::{Isolate, IsolatePtr};
use log::{trace, warn};
use rustc_hash::FxHashMap;
use std::cell::RefCell;
use std::ffi::c_void;
use std::rc::Rc;

pub mod accessor;
pub mod function;
pub mod property;

pub use accessor::*;
pub use function::*;
pub use property::*;

/// Per-call record handed to property and accessor callbacks.
///
/// Every token in it is borrowed: valid until the callback returns, released by the bridge
/// afterwards. Callers that want to keep one must clone it.
#[repr(C)]
#[derive(Debug)]
pub struct PropertyCallbackInfo {
    pub isolate: IsolatePtr,
    pub data: ValueRef,
    pub this: ValueRef,
    pub holder: ValueRef,
    /// Set by the callback to produce a result; ownership passes to the bridge.
    pub return_value: ValueRef,
    /// Set by the callback to raise an exception; takes precedence over `return_value`.
    pub thrown_value: ValueRef,
    pub should_throw_on_error: bool,
}

/// Per-call record handed to function and constructor callbacks. Same borrowing rules as
/// [`PropertyCallbackInfo`]; `args` points at `length` borrowed tokens.
#[repr(C)]
#[derive(Debug)]
pub struct FunctionCallbackInfo {
    pub length: i32,
    pub args: *const ValueRef,
    pub this: ValueRef,
    pub holder: ValueRef,
    pub new_target: ValueRef,
    pub is_construct_call: bool,
    pub data: ValueRef,
    pub isolate: IsolatePtr,
    pub return_value: ValueRef,
    pub thrown_value: ValueRef,
}

#[derive(Clone, Copy)]
pub(crate) enum Handlers {
    Named(NamedPropertyHandlers),
    Indexed(IndexedPropertyHandlers),
    Function(FunctionCallback),
    Accessor(AccessorHandlers),
}

pub(crate) struct Registration {
    handlers: Handlers,
    data: Option<v8::Global<v8::Value>>,
    // keeps the finalizer armed until the engine collects the carrier
    weak: Option<v8::Weak<v8::External>>,
}

/// Arena of callback registrations for one isolate.
#[derive(Default)]
pub struct Registry {
    next_id: u32,
    entries: FxHashMap<u32, Registration>,
}

impl Registry {
    fn insert(&mut self, handlers: Handlers, data: Option<v8::Global<v8::Value>>) -> u32 {
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);
        self.entries.insert(
            id,
            Registration {
                handlers,
                data,
                weak: None,
            },
        );
        id
    }

    fn attach(&mut self, id: u32, weak: v8::Weak<v8::External>) {
        if let Some(entry) = self.entries.get_mut(&id) {
            entry.weak = Some(weak);
        }
    }

    fn remove(&mut self, id: u32) -> Option<Registration> {
        self.entries.remove(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Stores a registration and returns the carrier the engine keeps in its callback data slot.
///
/// The registration is dropped when the engine collects the carrier, which happens no earlier
/// than the collection of the function, template or accessor decorated with it.
pub(crate) fn register<'s>(
    scope: &mut v8::HandleScope<'s, ()>,
    isolate: &Isolate,
    handlers: Handlers,
    data: ValueRef,
) -> v8::Local<'s, v8::External> {
    let data = unsafe { handle::to_local(scope, data) }.map(|data| v8::Global::new(scope, data));
    let registry = isolate.registry();
    let id = registry.borrow_mut().insert(handlers, data);
    let carrier = v8::External::new(scope, id as usize as *mut c_void);

    let weak_registry = Rc::downgrade(&registry);
    let weak = v8::Weak::with_guaranteed_finalizer(
        scope,
        carrier,
        Box::new(move || release_registration(weak_registry, id)),
    );
    registry.borrow_mut().attach(id, weak);
    trace!("registered callback {} on isolate {}", id, isolate.id());
    carrier
}

fn release_registration(registry: std::rc::Weak<RefCell<Registry>>, id: u32) {
    // the isolate is being torn down when the registry is gone
    let Some(registry) = registry.upgrade() else {
        return;
    };
    let removed = match registry.try_borrow_mut() {
        Ok(mut registry) => registry.remove(id),
        Err(_) => {
            warn!("callback registry busy, leaking registration {}", id);
            return;
        }
    };
    trace!("released callback {}", id);
    drop(removed);
}

/// A registration copied out of the registry for the duration of one call, so no borrow of the
/// registry is held while the embedder runs (and possibly re-enters the engine).
pub(crate) struct Snapshot<'a> {
    pub isolate: &'a Isolate,
    pub handlers: Handlers,
    pub data: Option<v8::Global<v8::Value>>,
}

impl<'a> Snapshot<'a> {
    pub fn lookup(scope: &mut v8::HandleScope, carrier: v8::Local<v8::Value>) -> Option<Self> {
        let isolate = Isolate::from_engine(scope)?;
        let carrier = v8::Local::<v8::External>::try_from(carrier).ok()?;
        let id = carrier.value() as usize as u32;
        let registry = isolate.registry();
        let registry = registry.borrow();
        let Some(entry) = registry.entries.get(&id) else {
            warn!("callback {} fired after its registration was released", id);
            return None;
        };
        Some(Snapshot {
            isolate,
            handlers: entry.handlers,
            data: entry.data.clone(),
        })
    }
}

/// Result category a callback must produce, checked before the result reaches the engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Expect {
    Value,
    Integer,
    Boolean,
    Array,
}

impl Expect {
    fn accepts(self, value: v8::Local<v8::Value>) -> bool {
        match self {
            Expect::Value => true,
            Expect::Integer => value.is_int32() || value.is_uint32(),
            Expect::Boolean => value.is_boolean(),
            Expect::Array => value.is_array(),
        }
    }
}

/// Tokens lent to the embedder for one callback, released when the frame drops.
#[derive(Default)]
pub(crate) struct Frame {
    lent: Vec<ValueRef>,
}

impl Frame {
    pub fn lend(&mut self, scope: &mut v8::HandleScope<()>, value: v8::Local<v8::Value>) -> ValueRef {
        let ptr = Durable::new(scope, value).into_raw();
        self.lent.push(ptr);
        ptr
    }

    pub fn lend_global(
        &mut self,
        scope: &mut v8::HandleScope<()>,
        value: Option<&v8::Global<v8::Value>>,
    ) -> ValueRef {
        match value {
            Some(value) => {
                let value = v8::Local::new(scope, value);
                self.lend(scope, value)
            }
            None => std::ptr::null_mut(),
        }
    }

    /// Demotes a token the embedder handed back. Tokens the embedder created are released once
    /// demoted; lent ones are left to the frame.
    fn settle<'s>(
        &self,
        scope: &mut v8::HandleScope<'s, ()>,
        ptr: ValueRef,
    ) -> Option<v8::Local<'s, v8::Value>> {
        let local = unsafe { handle::to_local(scope, ptr) };
        if !ptr.is_null() && !self.lent.contains(&ptr) {
            unsafe { handle::release(ptr) };
        }
        local
    }

    /// Applies the embedder's outcome: a thrown value is raised, otherwise a returned value of
    /// the expected category becomes the callback's result.
    pub fn finish(
        &self,
        scope: &mut v8::HandleScope,
        thrown: ValueRef,
        returned: ValueRef,
        rv: Option<&mut v8::ReturnValue>,
        expect: Expect,
    ) {
        let thrown = self.settle(scope, thrown);
        let returned = self.settle(scope, returned);
        if let Some(exception) = thrown {
            scope.throw_exception(exception);
            return;
        }
        let (Some(value), Some(rv)) = (returned, rv) else {
            return;
        };
        if expect.accepts(value) {
            rv.set(value);
        } else {
            warn!("ignoring callback result, expected {:?}", expect);
        }
    }
}

impl Drop for Frame {
    fn drop(&mut self) {
        for ptr in self.lent.drain(..) {
            unsafe { handle::release(ptr) };
        }
    }
}
