use super::Harness;
use crate::api::object::*;
use crate::api::script::*;
use crate::api::value::*;
use crate::enums::{
    IndexFilter, IntegrityLevel, KeyCollectionMode, PropertyAttribute, PropertyFilter,
};
use crate::handle::Durable;
use std::ptr;

#[test]
fn null_receiver_is_undefined() {
    let mut harness = Harness::new();
    let function = harness.eval("(function () { 'use strict'; return this === undefined; })");
    let ctx = harness.ctx();
    unsafe {
        let result =
            v8glue_function_call(&ctx, harness.context, function, ptr::null_mut(), 0, ptr::null());
        assert!(!result.is_null());
        let truthy = v8glue_value_boolean_value(&ctx, harness.context, result);
        assert_eq!((true, true), (truthy.is_set, truthy.value));
        v8glue_value_release(result);
        v8glue_value_release(function);
    }
}

#[test]
fn null_arguments_are_undefined() {
    let mut harness = Harness::new();
    let function = harness.eval("(function (a, b) { return a === undefined ? b : -1; })");
    let ctx = harness.ctx();
    unsafe {
        let two = v8glue_integer_new(harness.isolate, 2);
        let args = [ptr::null_mut(), two];
        let result =
            v8glue_function_call(&ctx, harness.context, function, ptr::null_mut(), 2, args.as_ptr());
        assert_eq!(2, harness.int(result).value);
        v8glue_value_release(result);
        v8glue_value_release(two);
        v8glue_value_release(function);
    }
}

#[test]
fn clone_survives_release_of_original() {
    let mut harness = Harness::new();
    let original = harness.string("kept");
    let copy = unsafe { v8glue_value_clone(original) };
    assert_ne!(original, copy);
    unsafe { v8glue_value_release(original) };
    assert_eq!("kept", harness.read(copy));
    unsafe { v8glue_value_release(copy) };

    assert!(unsafe { v8glue_value_clone(ptr::null_mut()) }.is_null());
    assert!(unsafe { Durable::<v8::Value>::from_raw(ptr::null_mut()) }.is_none());
}

#[test]
fn predicates_and_equality() {
    let harness = Harness::new();
    unsafe {
        let nan = v8glue_number_new(harness.isolate, f64::NAN);
        let undefined = v8glue_undefined(harness.isolate);
        let null = v8glue_null(harness.isolate);
        assert!(v8glue_value_is_number(harness.isolate, nan));
        assert!(v8glue_value_is_undefined(harness.isolate, undefined));
        assert!(v8glue_value_is_null(harness.isolate, null));
        assert!(!v8glue_value_is_object(harness.isolate, null));
        assert!(!v8glue_value_is_string(harness.isolate, ptr::null_mut()));

        assert!(!v8glue_value_strict_equals(harness.isolate, nan, nan));
        assert!(v8glue_value_same_value(harness.isolate, nan, nan));
        // absent tokens compare as undefined
        assert!(v8glue_value_strict_equals(harness.isolate, undefined, ptr::null_mut()));

        v8glue_value_release(nan);
        v8glue_value_release(undefined);
        v8glue_value_release(null);
    }
}

#[test]
fn numeric_conversions_report_absence() {
    let mut harness = Harness::new();
    let ctx = harness.ctx();
    unsafe {
        let value = v8glue_number_new(harness.isolate, -7.5);
        assert_eq!(-7, v8glue_value_int32_value(&ctx, harness.context, value).value);
        assert_eq!(-7, v8glue_value_integer_value(&ctx, harness.context, value).value);
        assert_eq!(-7.5, v8glue_value_number_value(&ctx, harness.context, value).value);
        v8glue_value_release(value);

        let absent = v8glue_value_int32_value(&ctx, harness.context, ptr::null_mut());
        assert!(!absent.is_set);
        assert_eq!(0, absent.value);
    }

    // a throwing valueOf makes the conversion absent and is captured
    let tricky = harness.eval("({ valueOf() { throw new Error('no number'); } })");
    let converted = harness.int(tricky);
    assert!(!converted.is_set);
    assert_eq!("no number", harness.error_message());
    unsafe { v8glue_value_release(tricky) };
}

#[test]
fn strings_round_trip_through_utf8() {
    let mut harness = Harness::new();
    let text = "grüße, 世界";
    let string = harness.string(text);
    assert_eq!(text.len() as i32, unsafe {
        v8glue_string_utf8_length(&harness.ctx(), string)
    });
    assert_eq!(text, harness.read(string));

    // short buffers stop at a character boundary
    let ctx = harness.ctx();
    let mut buffer = [0u8; 3];
    let written = unsafe {
        v8glue_string_write_utf8(&ctx, string, buffer.as_mut_ptr() as *mut std::ffi::c_char, 3)
    };
    assert_eq!(2, written);
    assert_eq!(b"gr", &buffer[..2]);

    let number = unsafe { v8glue_integer_new(harness.isolate, 1) };
    assert_eq!(-1, unsafe { v8glue_string_utf8_length(&ctx, number) });
    unsafe {
        v8glue_value_release(number);
        v8glue_value_release(string);
    }
}

#[test]
fn empty_strings_need_no_buffer() {
    let mut harness = Harness::new();
    let ctx = harness.ctx();
    unsafe {
        let empty = v8glue_string_new_from_utf8_normal(&ctx, ptr::null(), 0);
        assert!(!empty.is_null());
        assert_eq!(0, v8glue_string_utf8_length(&ctx, empty));
        assert_eq!("", harness.read(empty));
        v8glue_value_release(empty);

        // without a buffer there is nothing to read a length or a terminator from
        assert!(v8glue_string_new_from_utf8_normal(&ctx, ptr::null(), 3).is_null());
        assert!(v8glue_string_new_from_utf8_internalized(&ctx, ptr::null(), -1).is_null());
    }
}

#[test]
fn property_attributes_walk_the_prototype_chain() {
    let mut harness = Harness::new();
    let object = harness.eval(
        "Object.defineProperty({ open: 1 }, 'locked', { value: 2, writable: false, enumerable: false, configurable: false })",
    );
    let ctx = harness.ctx();
    let open = harness.string("open");
    let locked = harness.string("locked");
    let missing = harness.string("missing");
    unsafe {
        assert_eq!(
            PropertyAttribute::NONE,
            v8glue_object_get_property_attributes(&ctx, harness.context, object, open)
        );
        assert_eq!(
            PropertyAttribute::READ_ONLY | PropertyAttribute::DONT_ENUM | PropertyAttribute::DONT_DELETE,
            v8glue_object_get_property_attributes(&ctx, harness.context, object, locked)
        );
        // missing properties have no attributes, inherited ones report the prototype's
        assert_eq!(
            PropertyAttribute::NONE,
            v8glue_object_get_property_attributes(&ctx, harness.context, object, missing)
        );
        let inherited = harness.string("toString");
        assert_eq!(
            PropertyAttribute::DONT_ENUM,
            v8glue_object_get_property_attributes(&ctx, harness.context, object, inherited)
        );
        v8glue_value_release(inherited);

        let frozen =
            v8glue_object_set_integrity_level(&ctx, harness.context, object, IntegrityLevel::Frozen);
        assert!(frozen.is_set && frozen.value);
        assert!(v8glue_object_get_property_attributes(&ctx, harness.context, object, open)
            .contains(PropertyAttribute::READ_ONLY));

        for key in [open, locked, missing, object] {
            v8glue_value_release(key);
        }
    }
}

#[test]
fn property_names_keep_numbers() {
    let mut harness = Harness::new();
    let object = harness.eval("({ 0: 'a', b: 1 })");
    let ctx = harness.ctx();
    unsafe {
        let names = v8glue_object_get_property_names(
            &ctx,
            harness.context,
            object,
            KeyCollectionMode::OwnOnly,
            PropertyFilter::ONLY_ENUMERABLE,
            IndexFilter::IncludeIndices,
        );
        let first = v8glue_object_get_index(&ctx, harness.context, names, 0);
        assert!(v8glue_value_is_number(harness.isolate, first));
        let count = harness.get(names, "length");
        assert_eq!(2, harness.int(count).value);

        for value in [first, count, names, object] {
            v8glue_value_release(value);
        }
    }
}

#[test]
fn objects_support_basic_operations() {
    let mut harness = Harness::new();
    let ctx = harness.ctx();
    let object = unsafe { v8glue_object_new(&ctx, harness.context) };
    let key = harness.string("k");
    unsafe {
        let value = v8glue_integer_new(harness.isolate, 9);
        assert!(v8glue_object_set(&ctx, harness.context, object, key, value).value);
        assert!(v8glue_object_has(&ctx, harness.context, object, key).value);
        assert!(v8glue_object_set_index(&ctx, harness.context, object, 3, value).value);
        let element = v8glue_object_get_index(&ctx, harness.context, object, 3);
        assert_eq!(9, harness.int(element).value);
        assert!(v8glue_object_delete(&ctx, harness.context, object, key).value);
        assert!(!v8glue_object_has(&ctx, harness.context, object, key).value);

        for token in [element, value, key, object] {
            v8glue_value_release(token);
        }
    }
}

#[test]
fn call_as_function_requires_a_callable() {
    let mut harness = Harness::new();
    let ctx = harness.ctx();
    let constructor = harness.eval("(function Point(x) { this.x = x; })");
    let plain = unsafe { v8glue_object_new(&ctx, harness.context) };
    unsafe {
        let five = v8glue_integer_new(harness.isolate, 5);
        let args = [five];
        let point =
            v8glue_object_call_as_constructor(&ctx, harness.context, constructor, 1, args.as_ptr());
        let x = harness.get(point, "x");
        assert_eq!(5, harness.int(x).value);

        let nothing = v8glue_object_call_as_function(
            &ctx,
            harness.context,
            plain,
            ptr::null_mut(),
            0,
            ptr::null(),
        );
        assert!(nothing.is_null());
        assert!(!harness.exception().is_null());

        for token in [x, point, five, plain, constructor] {
            v8glue_value_release(token);
        }
    }
}

#[test]
fn conversions_follow_script_semantics() {
    let mut harness = Harness::new();
    let custom = harness.eval("({ toString() { return 'custom'; }, valueOf() { return 7.9; } })");
    let ctx = harness.ctx();
    unsafe {
        let text = v8glue_value_to_string(&ctx, harness.context, custom);
        assert_eq!("custom", harness.read(text));
        let number = v8glue_value_to_number(&ctx, harness.context, custom);
        assert_eq!(7.9, v8glue_value_number_value(&ctx, harness.context, number).value);
        let integer = v8glue_value_to_integer(&ctx, harness.context, custom);
        assert_eq!(7, harness.int(integer).value);

        let five = v8glue_integer_new(harness.isolate, 5);
        let boxed = v8glue_value_to_object(&ctx, harness.context, five);
        assert!(v8glue_value_is_object(harness.isolate, boxed));
        let undefined = v8glue_value_to_string(&ctx, harness.context, ptr::null_mut());
        assert_eq!("undefined", harness.read(undefined));
        assert!(harness.exception().is_null());

        // undefined has no object form
        let none = v8glue_value_to_object(&ctx, harness.context, ptr::null_mut());
        assert!(none.is_null());
        for value in [text, number, integer, five, boxed, undefined, custom] {
            v8glue_value_release(value);
        }
    }
    assert!(!harness.exception().is_null());
    harness.clear();

    let hostile = harness.eval("({ toString() { throw new Error('no text'); } })");
    let ctx = harness.ctx();
    let text = unsafe { v8glue_value_to_string(&ctx, harness.context, hostile) };
    assert!(text.is_null());
    assert_eq!("no text", harness.error_message());
    unsafe { v8glue_value_release(hostile) };
}
