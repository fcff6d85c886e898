use super::arguments;
use crate::capture::{self, CallContext};
use crate::enums::{
    IndexFilter, IntegrityLevel, KeyCollectionMode, PropertyAttribute, PropertyFilter,
};
use crate::error::BridgeError;
use crate::handle::{self, ContextRef, ValueRef};
use crate::maybe::MaybeBool;
use std::ptr;

#[no_mangle]
pub unsafe extern "C" fn v8glue_object_new(ctx: *const CallContext, context: ContextRef) -> ValueRef {
    capture::run(ctx, context, |scope, _| {
        let object = v8::Object::new(scope);
        Some(handle::value_to_durable(scope, Some(object)))
    })
    .unwrap_or(ptr::null_mut())
}

/// `object[key]`. A null key is `undefined`.
#[no_mangle]
pub unsafe extern "C" fn v8glue_object_get(
    ctx: *const CallContext,
    context: ContextRef,
    object: ValueRef,
    key: ValueRef,
) -> ValueRef {
    capture::run(ctx, context, |scope, _| {
        let object: v8::Local<v8::Object> = handle::cast_or_throw(scope, object, "Object")?;
        let key = handle::receiver(scope, key);
        let value = object.get(scope, key);
        Some(handle::value_to_durable(scope, value))
    })
    .unwrap_or(ptr::null_mut())
}

#[no_mangle]
pub unsafe extern "C" fn v8glue_object_set(
    ctx: *const CallContext,
    context: ContextRef,
    object: ValueRef,
    key: ValueRef,
    value: ValueRef,
) -> MaybeBool {
    capture::run(ctx, context, |scope, _| {
        let object: v8::Local<v8::Object> = handle::cast_or_throw(scope, object, "Object")?;
        let key = handle::receiver(scope, key);
        let value = handle::receiver(scope, value);
        object.set(scope, key, value)
    })
    .into()
}

#[no_mangle]
pub unsafe extern "C" fn v8glue_object_has(
    ctx: *const CallContext,
    context: ContextRef,
    object: ValueRef,
    key: ValueRef,
) -> MaybeBool {
    capture::run(ctx, context, |scope, _| {
        let object: v8::Local<v8::Object> = handle::cast_or_throw(scope, object, "Object")?;
        let key = handle::receiver(scope, key);
        object.has(scope, key)
    })
    .into()
}

#[no_mangle]
pub unsafe extern "C" fn v8glue_object_delete(
    ctx: *const CallContext,
    context: ContextRef,
    object: ValueRef,
    key: ValueRef,
) -> MaybeBool {
    capture::run(ctx, context, |scope, _| {
        let object: v8::Local<v8::Object> = handle::cast_or_throw(scope, object, "Object")?;
        let key = handle::receiver(scope, key);
        object.delete(scope, key)
    })
    .into()
}

#[no_mangle]
pub unsafe extern "C" fn v8glue_object_get_index(
    ctx: *const CallContext,
    context: ContextRef,
    object: ValueRef,
    index: u32,
) -> ValueRef {
    capture::run(ctx, context, |scope, _| {
        let object: v8::Local<v8::Object> = handle::cast_or_throw(scope, object, "Object")?;
        let value = object.get_index(scope, index);
        Some(handle::value_to_durable(scope, value))
    })
    .unwrap_or(ptr::null_mut())
}

#[no_mangle]
pub unsafe extern "C" fn v8glue_object_set_index(
    ctx: *const CallContext,
    context: ContextRef,
    object: ValueRef,
    index: u32,
    value: ValueRef,
) -> MaybeBool {
    capture::run(ctx, context, |scope, _| {
        let object: v8::Local<v8::Object> = handle::cast_or_throw(scope, object, "Object")?;
        let value = handle::receiver(scope, value);
        object.set_index(scope, index, value)
    })
    .into()
}

/// Attributes of a property, looked up along the prototype chain. A missing property has no
/// attributes. [`PropertyAttribute::ABSENT`] if the lookup raised.
#[no_mangle]
pub unsafe extern "C" fn v8glue_object_get_property_attributes(
    ctx: *const CallContext,
    context: ContextRef,
    object: ValueRef,
    key: ValueRef,
) -> PropertyAttribute {
    capture::run(ctx, context, |scope, _| {
        let object: v8::Local<v8::Object> = handle::cast_or_throw(scope, object, "Object")?;
        let key = handle::receiver(scope, key);
        object.get_property_attributes(scope, key).map(PropertyAttribute::from_v8)
    })
    .unwrap_or(PropertyAttribute::ABSENT)
}

/// Number of internal fields, as set on the object template the object was made from. -1 if
/// `object` is not an object.
#[no_mangle]
pub unsafe extern "C" fn v8glue_object_internal_field_count(
    ctx: *const CallContext,
    object: ValueRef,
) -> i32 {
    capture::run_scoped(ctx, |scope, _| {
        let object: v8::Local<v8::Object> = handle::cast(scope, object, "Object").ok()?;
        i32::try_from(object.internal_field_count()).ok()
    })
    .unwrap_or(-1)
}

/// Checks `index` against the object's internal fields, raising a `RangeError` if it is outside.
fn field_index(
    scope: &mut v8::HandleScope,
    object: v8::Local<v8::Object>,
    index: i32,
) -> Option<usize> {
    let count = object.internal_field_count();
    match usize::try_from(index) {
        Ok(field) if field < count => Some(field),
        _ => {
            BridgeError::FieldOutOfRange { index, count }.throw(scope);
            None
        }
    }
}

/// Reads an internal field. Fields never written read as `undefined`.
#[no_mangle]
pub unsafe extern "C" fn v8glue_object_get_internal_field(
    ctx: *const CallContext,
    context: ContextRef,
    object: ValueRef,
    index: i32,
) -> ValueRef {
    capture::run(ctx, context, |scope, _| {
        let object: v8::Local<v8::Object> = handle::cast_or_throw(scope, object, "Object")?;
        let index = field_index(scope, object, index)?;
        let value = object
            .get_internal_field(scope, index)
            .and_then(|data| v8::Local::<v8::Value>::try_from(data).ok());
        Some(handle::to_durable(scope, value))
    })
    .unwrap_or(ptr::null_mut())
}

/// Writes an internal field. A null value stores `undefined`.
#[no_mangle]
pub unsafe extern "C" fn v8glue_object_set_internal_field(
    ctx: *const CallContext,
    context: ContextRef,
    object: ValueRef,
    index: i32,
    value: ValueRef,
) -> bool {
    capture::run(ctx, context, |scope, _| {
        let object: v8::Local<v8::Object> = handle::cast_or_throw(scope, object, "Object")?;
        let index = field_index(scope, object, index)?;
        let value = handle::receiver(scope, value);
        Some(object.set_internal_field(index, value.into()))
    })
    .unwrap_or(false)
}

/// The object's property names as an array.
#[no_mangle]
pub unsafe extern "C" fn v8glue_object_get_property_names(
    ctx: *const CallContext,
    context: ContextRef,
    object: ValueRef,
    mode: KeyCollectionMode,
    property_filter: PropertyFilter,
    index_filter: IndexFilter,
) -> ValueRef {
    capture::run(ctx, context, |scope, _| {
        let object: v8::Local<v8::Object> = handle::cast_or_throw(scope, object, "Object")?;
        let names = object.get_property_names(
            scope,
            v8::GetPropertyNamesArgs {
                mode: mode.into(),
                property_filter: property_filter.into(),
                index_filter: index_filter.into(),
                key_conversion: v8::KeyConversionMode::KeepNumbers,
            },
        );
        Some(handle::value_to_durable(scope, names))
    })
    .unwrap_or(ptr::null_mut())
}

/// `Object.freeze` or `Object.seal`.
#[no_mangle]
pub unsafe extern "C" fn v8glue_object_set_integrity_level(
    ctx: *const CallContext,
    context: ContextRef,
    object: ValueRef,
    level: IntegrityLevel,
) -> MaybeBool {
    capture::run(ctx, context, |scope, _| {
        let object: v8::Local<v8::Object> = handle::cast_or_throw(scope, object, "Object")?;
        object.set_integrity_level(scope, level.into())
    })
    .into()
}

/// Calls a callable object. A null receiver is `undefined`.
#[no_mangle]
pub unsafe extern "C" fn v8glue_object_call_as_function(
    ctx: *const CallContext,
    context: ContextRef,
    object: ValueRef,
    recv: ValueRef,
    argc: i32,
    argv: *const ValueRef,
) -> ValueRef {
    capture::execute(ctx, context, |scope, _| {
        let function: v8::Local<v8::Function> =
            handle::cast_or_throw(scope, object, "callable object")?;
        let recv = handle::receiver(scope, recv);
        let args = arguments(scope, argc, argv);
        let result = function.call(scope, recv, &args);
        Some(handle::value_to_durable(scope, result))
    })
    .unwrap_or(ptr::null_mut())
}

/// `new object(...args)` for a constructible object.
#[no_mangle]
pub unsafe extern "C" fn v8glue_object_call_as_constructor(
    ctx: *const CallContext,
    context: ContextRef,
    object: ValueRef,
    argc: i32,
    argv: *const ValueRef,
) -> ValueRef {
    capture::execute(ctx, context, |scope, _| {
        let function: v8::Local<v8::Function> =
            handle::cast_or_throw(scope, object, "constructor")?;
        let args = arguments(scope, argc, argv);
        let instance = function.new_instance(scope, &args);
        Some(handle::value_to_durable(scope, instance))
    })
    .unwrap_or(ptr::null_mut())
}
