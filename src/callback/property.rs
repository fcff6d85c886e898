use super::*;
use crate::enums::PropertyHandlerFlags;
use std::ptr;

pub type NamedGetterCallback = unsafe extern "C" fn(property: ValueRef, info: *mut PropertyCallbackInfo);
pub type NamedSetterCallback =
    unsafe extern "C" fn(property: ValueRef, value: ValueRef, info: *mut PropertyCallbackInfo);
pub type NamedQueryCallback = unsafe extern "C" fn(property: ValueRef, info: *mut PropertyCallbackInfo);
pub type NamedDeleterCallback = unsafe extern "C" fn(property: ValueRef, info: *mut PropertyCallbackInfo);
pub type IndexedGetterCallback = unsafe extern "C" fn(index: u32, info: *mut PropertyCallbackInfo);
pub type IndexedSetterCallback =
    unsafe extern "C" fn(index: u32, value: ValueRef, info: *mut PropertyCallbackInfo);
pub type IndexedQueryCallback = unsafe extern "C" fn(index: u32, info: *mut PropertyCallbackInfo);
pub type IndexedDeleterCallback = unsafe extern "C" fn(index: u32, info: *mut PropertyCallbackInfo);
pub type EnumeratorCallback = unsafe extern "C" fn(info: *mut PropertyCallbackInfo);

/// Interceptors for string and symbol keyed properties. Absent roles are not installed, so the
/// engine falls through to ordinary property semantics for them.
///
/// Query results must be integers (property attributes), deleter results booleans and
/// enumerator results arrays; anything else is ignored.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default)]
pub struct NamedPropertyHandlers {
    pub getter: Option<NamedGetterCallback>,
    pub setter: Option<NamedSetterCallback>,
    pub query: Option<NamedQueryCallback>,
    pub deleter: Option<NamedDeleterCallback>,
    pub enumerator: Option<EnumeratorCallback>,
}

/// Interceptors for integer indexed properties, with the same rules as
/// [`NamedPropertyHandlers`].
#[repr(C)]
#[derive(Clone, Copy, Debug, Default)]
pub struct IndexedPropertyHandlers {
    pub getter: Option<IndexedGetterCallback>,
    pub setter: Option<IndexedSetterCallback>,
    pub query: Option<IndexedQueryCallback>,
    pub deleter: Option<IndexedDeleterCallback>,
    pub enumerator: Option<EnumeratorCallback>,
}

/// Runs one property-style callback: looks up the registration, lets `prepare` pick the role and
/// lend role-specific arguments, then calls out with the scope pushed on the isolate interface.
pub(crate) fn dispatch<P, C>(
    scope: &mut v8::HandleScope,
    args: &v8::PropertyCallbackArguments,
    rv: Option<&mut v8::ReturnValue>,
    expect: Expect,
    prepare: P,
) where
    P: FnOnce(Handlers, &mut Frame, &mut v8::HandleScope) -> Option<C>,
    C: FnOnce(*mut PropertyCallbackInfo),
{
    let Some(snapshot) = Snapshot::lookup(scope, args.data()) else {
        return;
    };
    let mut frame = Frame::default();
    let Some(call) = prepare(snapshot.handlers, &mut frame, scope) else {
        return;
    };

    let this = args.this();
    let holder = args.holder();
    let mut info = PropertyCallbackInfo {
        isolate: snapshot.isolate.as_ptr(),
        data: frame.lend_global(scope, snapshot.data.as_ref()),
        this: frame.lend(scope, this.into()),
        holder: frame.lend(scope, holder.into()),
        return_value: ptr::null_mut(),
        thrown_value: ptr::null_mut(),
        should_throw_on_error: args.should_throw_on_error(),
    };

    {
        let _entered = snapshot.isolate.enter_callback(scope);
        call(&mut info as *mut PropertyCallbackInfo);
    }

    frame.finish(scope, info.thrown_value, info.return_value, rv, expect);
}

fn named_getter(
    scope: &mut v8::HandleScope,
    name: v8::Local<v8::Name>,
    args: v8::PropertyCallbackArguments,
    mut rv: v8::ReturnValue,
) {
    dispatch(scope, &args, Some(&mut rv), Expect::Value, |handlers, frame, scope| {
        let Handlers::Named(NamedPropertyHandlers { getter: Some(getter), .. }) = handlers else {
            return None;
        };
        let property = frame.lend(scope, name.into());
        Some(move |info: *mut PropertyCallbackInfo| unsafe { getter(property, info) })
    });
}

fn named_setter(
    scope: &mut v8::HandleScope,
    name: v8::Local<v8::Name>,
    value: v8::Local<v8::Value>,
    args: v8::PropertyCallbackArguments,
    mut rv: v8::ReturnValue,
) {
    dispatch(scope, &args, Some(&mut rv), Expect::Value, |handlers, frame, scope| {
        let Handlers::Named(NamedPropertyHandlers { setter: Some(setter), .. }) = handlers else {
            return None;
        };
        let property = frame.lend(scope, name.into());
        let value = frame.lend(scope, value);
        Some(move |info: *mut PropertyCallbackInfo| unsafe { setter(property, value, info) })
    });
}

fn named_query(
    scope: &mut v8::HandleScope,
    name: v8::Local<v8::Name>,
    args: v8::PropertyCallbackArguments,
    mut rv: v8::ReturnValue,
) {
    dispatch(scope, &args, Some(&mut rv), Expect::Integer, |handlers, frame, scope| {
        let Handlers::Named(NamedPropertyHandlers { query: Some(query), .. }) = handlers else {
            return None;
        };
        let property = frame.lend(scope, name.into());
        Some(move |info: *mut PropertyCallbackInfo| unsafe { query(property, info) })
    });
}

fn named_deleter(
    scope: &mut v8::HandleScope,
    name: v8::Local<v8::Name>,
    args: v8::PropertyCallbackArguments,
    mut rv: v8::ReturnValue,
) {
    dispatch(scope, &args, Some(&mut rv), Expect::Boolean, |handlers, frame, scope| {
        let Handlers::Named(NamedPropertyHandlers { deleter: Some(deleter), .. }) = handlers else {
            return None;
        };
        let property = frame.lend(scope, name.into());
        Some(move |info: *mut PropertyCallbackInfo| unsafe { deleter(property, info) })
    });
}

fn named_enumerator(
    scope: &mut v8::HandleScope,
    args: v8::PropertyCallbackArguments,
    mut rv: v8::ReturnValue,
) {
    dispatch(scope, &args, Some(&mut rv), Expect::Array, |handlers, _, _| {
        let Handlers::Named(NamedPropertyHandlers { enumerator: Some(enumerator), .. }) = handlers
        else {
            return None;
        };
        Some(move |info: *mut PropertyCallbackInfo| unsafe { enumerator(info) })
    });
}

fn indexed_getter(
    scope: &mut v8::HandleScope,
    index: u32,
    args: v8::PropertyCallbackArguments,
    mut rv: v8::ReturnValue,
) {
    dispatch(scope, &args, Some(&mut rv), Expect::Value, |handlers, _, _| {
        let Handlers::Indexed(IndexedPropertyHandlers { getter: Some(getter), .. }) = handlers
        else {
            return None;
        };
        Some(move |info: *mut PropertyCallbackInfo| unsafe { getter(index, info) })
    });
}

fn indexed_setter(
    scope: &mut v8::HandleScope,
    index: u32,
    value: v8::Local<v8::Value>,
    args: v8::PropertyCallbackArguments,
    mut rv: v8::ReturnValue,
) {
    dispatch(scope, &args, Some(&mut rv), Expect::Value, |handlers, frame, scope| {
        let Handlers::Indexed(IndexedPropertyHandlers { setter: Some(setter), .. }) = handlers
        else {
            return None;
        };
        let value = frame.lend(scope, value);
        Some(move |info: *mut PropertyCallbackInfo| unsafe { setter(index, value, info) })
    });
}

fn indexed_query(
    scope: &mut v8::HandleScope,
    index: u32,
    args: v8::PropertyCallbackArguments,
    mut rv: v8::ReturnValue,
) {
    dispatch(scope, &args, Some(&mut rv), Expect::Integer, |handlers, _, _| {
        let Handlers::Indexed(IndexedPropertyHandlers { query: Some(query), .. }) = handlers else {
            return None;
        };
        Some(move |info: *mut PropertyCallbackInfo| unsafe { query(index, info) })
    });
}

fn indexed_deleter(
    scope: &mut v8::HandleScope,
    index: u32,
    args: v8::PropertyCallbackArguments,
    mut rv: v8::ReturnValue,
) {
    dispatch(scope, &args, Some(&mut rv), Expect::Boolean, |handlers, _, _| {
        let Handlers::Indexed(IndexedPropertyHandlers { deleter: Some(deleter), .. }) = handlers
        else {
            return None;
        };
        Some(move |info: *mut PropertyCallbackInfo| unsafe { deleter(index, info) })
    });
}

fn indexed_enumerator(
    scope: &mut v8::HandleScope,
    args: v8::PropertyCallbackArguments,
    mut rv: v8::ReturnValue,
) {
    dispatch(scope, &args, Some(&mut rv), Expect::Array, |handlers, _, _| {
        let Handlers::Indexed(IndexedPropertyHandlers { enumerator: Some(enumerator), .. }) =
            handlers
        else {
            return None;
        };
        Some(move |info: *mut PropertyCallbackInfo| unsafe { enumerator(info) })
    });
}

/// Decorates an object template with named interceptors.
pub(crate) fn set_named_property_handler(
    scope: &mut v8::HandleScope<()>,
    isolate: &Isolate,
    template: v8::Local<v8::ObjectTemplate>,
    handlers: NamedPropertyHandlers,
    data: ValueRef,
    flags: PropertyHandlerFlags,
) {
    let carrier = register(scope, isolate, Handlers::Named(handlers), data);
    let mut config = v8::NamedPropertyHandlerConfiguration::new()
        .data(carrier.into())
        .flags(flags.into());
    if handlers.getter.is_some() {
        config = config.getter(named_getter);
    }
    if handlers.setter.is_some() {
        config = config.setter(named_setter);
    }
    if handlers.query.is_some() {
        config = config.query(named_query);
    }
    if handlers.deleter.is_some() {
        config = config.deleter(named_deleter);
    }
    if handlers.enumerator.is_some() {
        config = config.enumerator(named_enumerator);
    }
    template.set_named_property_handler(config);
}

/// Decorates an object template with indexed interceptors.
pub(crate) fn set_indexed_property_handler(
    scope: &mut v8::HandleScope<()>,
    isolate: &Isolate,
    template: v8::Local<v8::ObjectTemplate>,
    handlers: IndexedPropertyHandlers,
    data: ValueRef,
    flags: PropertyHandlerFlags,
) {
    let carrier = register(scope, isolate, Handlers::Indexed(handlers), data);
    let mut config = v8::IndexedPropertyHandlerConfiguration::new()
        .data(carrier.into())
        .flags(flags.into());
    if handlers.getter.is_some() {
        config = config.getter(indexed_getter);
    }
    if handlers.setter.is_some() {
        config = config.setter(indexed_setter);
    }
    if handlers.query.is_some() {
        config = config.query(indexed_query);
    }
    if handlers.deleter.is_some() {
        config = config.deleter(indexed_deleter);
    }
    if handlers.enumerator.is_some() {
        config = config.enumerator(indexed_enumerator);
    }
    template.set_indexed_property_handler(config);
}
