use super::property::dispatch;
use super::*;
use crate::enums::{AccessControl, PropertyAttribute};
use log::debug;

pub type AccessorGetterCallback =
    unsafe extern "C" fn(property: ValueRef, info: *mut PropertyCallbackInfo);
pub type AccessorSetterCallback =
    unsafe extern "C" fn(property: ValueRef, value: ValueRef, info: *mut PropertyCallbackInfo);

/// A native data property: looks like a plain data property to script code, but reads and
/// writes go through the embedder. Without a setter the property is read-only.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default)]
pub struct AccessorHandlers {
    pub getter: Option<AccessorGetterCallback>,
    pub setter: Option<AccessorSetterCallback>,
}

fn accessor_getter(
    scope: &mut v8::HandleScope,
    name: v8::Local<v8::Name>,
    args: v8::PropertyCallbackArguments,
    mut rv: v8::ReturnValue,
) {
    dispatch(scope, &args, Some(&mut rv), Expect::Value, |handlers, frame, scope| {
        let Handlers::Accessor(AccessorHandlers { getter: Some(getter), .. }) = handlers else {
            return None;
        };
        let property = frame.lend(scope, name.into());
        Some(move |info: *mut PropertyCallbackInfo| unsafe { getter(property, info) })
    });
}

fn accessor_setter(
    scope: &mut v8::HandleScope,
    name: v8::Local<v8::Name>,
    value: v8::Local<v8::Value>,
    args: v8::PropertyCallbackArguments,
    _rv: v8::ReturnValue,
) {
    dispatch(scope, &args, None, Expect::Value, |handlers, frame, scope| {
        let Handlers::Accessor(AccessorHandlers { setter: Some(setter), .. }) = handlers else {
            return None;
        };
        let property = frame.lend(scope, name.into());
        let value = frame.lend(scope, value);
        Some(move |info: *mut PropertyCallbackInfo| unsafe { setter(property, value, info) })
    });
}

/// Installs a native data property on an object template. Returns false, installing nothing,
/// when no getter is supplied.
#[allow(clippy::too_many_arguments)]
pub(crate) fn set_accessor(
    scope: &mut v8::HandleScope<()>,
    isolate: &Isolate,
    template: v8::Local<v8::ObjectTemplate>,
    name: v8::Local<v8::Name>,
    handlers: AccessorHandlers,
    data: ValueRef,
    control: AccessControl,
    attribute: PropertyAttribute,
) -> bool {
    if handlers.getter.is_none() {
        warn!("refusing to install an accessor without a getter");
        return false;
    }
    if control != AccessControl::DEFAULT {
        debug!("ignoring access control {:?}", control);
    }

    let carrier = register(scope, isolate, Handlers::Accessor(handlers), data);
    let mut config = v8::AccessorConfiguration::new(accessor_getter).data(carrier.into());
    if handlers.setter.is_some() {
        config = config.setter(accessor_setter);
    }
    if let Some(attribute) = attribute.to_v8() {
        config = config.property_attribute(attribute);
    }
    template.set_accessor_with_configuration(name, config);
    true
}
