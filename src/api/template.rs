use super::bridge;
use crate::callback::{
    self, AccessorHandlers, FunctionCallback, IndexedPropertyHandlers, NamedPropertyHandlers,
};
use crate::capture::{self, CallContext};
use crate::enums::{
    AccessControl, ConstructorBehavior, Intrinsic, PropertyAttribute, PropertyHandlerFlags,
};
use crate::error::BridgeError;
use crate::handle::{self, ContextRef, FunctionTemplateRef, ObjectTemplateRef, ValueRef};
use crate::isolate::IsolatePtr;
use log::warn;
use std::ptr;

/// Creates a function calling `callback`. `data` is cloned; the caller keeps its token.
#[no_mangle]
pub unsafe extern "C" fn v8glue_function_new(
    ctx: *const CallContext,
    context: ContextRef,
    callback: Option<FunctionCallback>,
    data: ValueRef,
    length: i32,
    behavior: ConstructorBehavior,
) -> ValueRef {
    capture::run(ctx, context, |scope, isolate| {
        let Some(callback) = callback else {
            BridgeError::wrong_type("function pointer").throw(scope);
            return None;
        };
        let function = callback::new_function(scope, isolate, callback, data, length, behavior);
        Some(handle::value_to_durable(scope, function))
    })
    .unwrap_or(ptr::null_mut())
}

/// Creates a function template. A null `callback` makes functions with an empty body.
#[no_mangle]
pub unsafe extern "C" fn v8glue_function_template_new(
    isolate: IsolatePtr,
    callback: Option<FunctionCallback>,
    data: ValueRef,
    length: i32,
    behavior: ConstructorBehavior,
) -> FunctionTemplateRef {
    let Some(bridge) = bridge(isolate) else {
        return ptr::null_mut();
    };
    bridge.scope(|scope| {
        let template =
            callback::new_function_template(scope, bridge, callback, data, length, behavior);
        handle::to_durable(scope, Some(template))
    })
}

/// The function a template stamps out for `context`.
#[no_mangle]
pub unsafe extern "C" fn v8glue_function_template_get_function(
    ctx: *const CallContext,
    context: ContextRef,
    template: FunctionTemplateRef,
) -> ValueRef {
    capture::run(ctx, context, |scope, _| {
        let template = handle::to_local(scope, template)?;
        let function = template.get_function(scope);
        Some(handle::value_to_durable(scope, function))
    })
    .unwrap_or(ptr::null_mut())
}

#[no_mangle]
pub unsafe extern "C" fn v8glue_function_template_release(template: FunctionTemplateRef) {
    handle::release(template)
}

#[no_mangle]
pub unsafe extern "C" fn v8glue_object_template_new(isolate: IsolatePtr) -> ObjectTemplateRef {
    let Some(bridge) = bridge(isolate) else {
        return ptr::null_mut();
    };
    bridge.scope(|scope| {
        let template = v8::ObjectTemplate::new(scope);
        handle::to_durable(scope, Some(template))
    })
}

#[no_mangle]
pub unsafe extern "C" fn v8glue_object_template_set_internal_field_count(
    isolate: IsolatePtr,
    template: ObjectTemplateRef,
    count: i32,
) -> bool {
    let (Some(bridge), Ok(count)) = (bridge(isolate), usize::try_from(count)) else {
        return false;
    };
    bridge.scope(|scope| match handle::to_local(scope, template) {
        Some(template) => template.set_internal_field_count(count),
        None => false,
    })
}

#[no_mangle]
pub unsafe extern "C" fn v8glue_object_template_new_instance(
    ctx: *const CallContext,
    context: ContextRef,
    template: ObjectTemplateRef,
) -> ValueRef {
    capture::run(ctx, context, |scope, _| {
        let template = handle::to_local(scope, template)?;
        let instance = template.new_instance(scope);
        Some(handle::value_to_durable(scope, instance))
    })
    .unwrap_or(ptr::null_mut())
}

/// Installs named interceptors on instances of `template`. Roles left null in `handlers` are not
/// installed. `data` is cloned and handed to every invocation.
#[no_mangle]
pub unsafe extern "C" fn v8glue_object_template_set_named_property_handler(
    isolate: IsolatePtr,
    template: ObjectTemplateRef,
    handlers: *const NamedPropertyHandlers,
    data: ValueRef,
    flags: PropertyHandlerFlags,
) -> bool {
    let (Some(bridge), Some(handlers)) = (bridge(isolate), handlers.as_ref()) else {
        return false;
    };
    bridge.scope(|scope| {
        let Some(template) = handle::to_local(scope, template) else {
            return false;
        };
        callback::set_named_property_handler(scope, bridge, template, *handlers, data, flags);
        true
    })
}

/// Installs indexed interceptors on instances of `template`, as
/// `v8glue_object_template_set_named_property_handler` does for named ones.
#[no_mangle]
pub unsafe extern "C" fn v8glue_object_template_set_indexed_property_handler(
    isolate: IsolatePtr,
    template: ObjectTemplateRef,
    handlers: *const IndexedPropertyHandlers,
    data: ValueRef,
    flags: PropertyHandlerFlags,
) -> bool {
    let (Some(bridge), Some(handlers)) = (bridge(isolate), handlers.as_ref()) else {
        return false;
    };
    bridge.scope(|scope| {
        let Some(template) = handle::to_local(scope, template) else {
            return false;
        };
        callback::set_indexed_property_handler(scope, bridge, template, *handlers, data, flags);
        true
    })
}

/// Installs a native data property `name` on instances of `template`. Returns false, installing
/// nothing, if there is no getter or `name` is not a string or symbol.
#[no_mangle]
#[allow(clippy::too_many_arguments)]
pub unsafe extern "C" fn v8glue_object_template_set_accessor(
    isolate: IsolatePtr,
    template: ObjectTemplateRef,
    name: ValueRef,
    handlers: *const AccessorHandlers,
    data: ValueRef,
    control: AccessControl,
    attribute: PropertyAttribute,
) -> bool {
    let (Some(bridge), Some(handlers)) = (bridge(isolate), handlers.as_ref()) else {
        return false;
    };
    bridge.scope(|scope| {
        let Some(template) = handle::to_local(scope, template) else {
            return false;
        };
        let name: v8::Local<v8::Name> = match handle::cast(scope, name, "Name") {
            Ok(name) => name,
            Err(err) => {
                warn!("cannot install accessor: {}", err);
                return false;
            }
        };
        callback::set_accessor(scope, bridge, template, name, *handlers, data, control, attribute)
    })
}

/// Sets a property every instance of `template` starts out with. `value` must be a primitive or
/// a template.
#[no_mangle]
pub unsafe extern "C" fn v8glue_template_set(
    isolate: IsolatePtr,
    template: ObjectTemplateRef,
    name: ValueRef,
    value: ValueRef,
    attribute: PropertyAttribute,
) -> bool {
    let Some(bridge) = bridge(isolate) else {
        return false;
    };
    bridge.scope(|scope| {
        let Some(template) = handle::to_local(scope, template) else {
            return false;
        };
        let name: v8::Local<v8::Name> = match handle::cast(scope, name, "Name") {
            Ok(name) => name,
            Err(err) => {
                warn!("cannot set template property: {}", err);
                return false;
            }
        };
        let value = handle::receiver(scope, value);
        if value.is_object() {
            warn!("template properties must be primitives");
            return false;
        }
        let attribute = attribute.to_v8().unwrap_or(v8::PropertyAttribute::NONE);
        template.set_with_attr(name, value.into(), attribute);
        true
    })
}

/// Gives every instance of `template` a data property holding a built-in of the instance's
/// context. Script that replaced the built-in's usual property path does not affect it.
#[no_mangle]
pub unsafe extern "C" fn v8glue_template_set_intrinsic_data_property(
    isolate: IsolatePtr,
    template: ObjectTemplateRef,
    name: ValueRef,
    intrinsic: Intrinsic,
    attribute: PropertyAttribute,
) -> bool {
    let Some(bridge) = bridge(isolate) else {
        return false;
    };
    bridge.scope(|scope| {
        let Some(template) = handle::to_local(scope, template) else {
            return false;
        };
        let name: v8::Local<v8::Name> = match handle::cast(scope, name, "Name") {
            Ok(name) => name,
            Err(err) => {
                warn!("cannot set intrinsic template property: {}", err);
                return false;
            }
        };
        let attribute = attribute.to_v8().unwrap_or(v8::PropertyAttribute::NONE);
        template.set_intrinsic_data_property(name, intrinsic.into(), attribute);
        true
    })
}

#[no_mangle]
pub unsafe extern "C" fn v8glue_object_template_release(template: ObjectTemplateRef) {
    handle::release(template)
}
