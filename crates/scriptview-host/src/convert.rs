// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Conversions between VM values, JSON and record field values, plus the
//! helpers bridge functions use to raise script exceptions

use rquickjs::convert::Coerced;
use rquickjs::{Array, Ctx, Exception, Function, Object, Type, Value};
use scriptview_orm::{FieldValue, Row};
use serde_json::Value as Json;

/// Global bootstrap helper that builds a named `Error` instance
pub const HOST_ERROR_FN: &str = "__hostError";

const MAX_DEPTH: usize = 64;

/// Name of a value's type, for error messages
pub fn kind_name(value: &Value<'_>) -> &'static str {
    match value.type_of() {
        Type::Uninitialized | Type::Undefined => "undefined",
        Type::Null => "null",
        Type::Bool => "boolean",
        Type::Int | Type::Float => "number",
        Type::String => "string",
        Type::Symbol => "symbol",
        Type::Array => "array",
        Type::Function | Type::Constructor => "function",
        Type::Exception => "error",
        Type::BigInt => "bigint",
        _ => "object",
    }
}

/// Build an `Error` whose `name` is `name`
pub fn error_value<'js>(ctx: &Ctx<'js>, name: &str, message: &str) -> rquickjs::Result<Value<'js>> {
    let make: Function = ctx.globals().get(HOST_ERROR_FN)?;
    make.call((name, message))
}

/// Raise a named custom error in the VM
pub fn throw_error(ctx: &Ctx<'_>, name: &str, message: &str) -> rquickjs::Error {
    match error_value(ctx, name, message) {
        Ok(value) => ctx.throw(value),
        Err(_) => Exception::throw_message(ctx, &format!("{name}: {message}")),
    }
}

/// Raise a `TypeError` in the VM
pub fn type_error(ctx: &Ctx<'_>, message: &str) -> rquickjs::Error {
    Exception::throw_type(ctx, message)
}

/// Raise a `ValueError` naming the value that failed to convert
pub fn value_error(ctx: &Ctx<'_>, message: &str) -> rquickjs::Error {
    throw_error(ctx, "ValueError", message)
}

/// Take the pending exception out of `err`, turning non-exception errors
/// into a script `Error`
pub fn take_exception<'js>(ctx: &Ctx<'js>, err: rquickjs::Error) -> Value<'js> {
    if !err.is_exception() {
        let _ = Exception::throw_message(ctx, &err.to_string());
    }
    ctx.catch()
}

/// Human readable text of a thrown value: `Name: message` for errors
pub fn describe_exception(value: &Value<'_>) -> String {
    if let Some(obj) = value.as_object() {
        let message: Option<String> = obj.get("message").ok().flatten();
        if let Some(message) = message {
            let name: Option<String> = obj.get("name").ok().flatten();
            return match name {
                Some(name) if !name.is_empty() => format!("{name}: {message}"),
                _ => message,
            };
        }
    }
    display_string(value).unwrap_or_else(|_| "uncaught exception".to_string())
}

/// `String(value)`
pub fn display_string(value: &Value<'_>) -> rquickjs::Result<String> {
    if let Some(s) = value.as_string() {
        return s.to_string();
    }
    Ok(value.get::<Coerced<String>>()?.0)
}

/// Convert a JSON value into the VM
pub fn json_to_js<'js>(ctx: &Ctx<'js>, json: &Json) -> rquickjs::Result<Value<'js>> {
    Ok(match json {
        Json::Null => Value::new_null(ctx.clone()),
        Json::Bool(b) => Value::new_bool(ctx.clone(), *b),
        Json::Number(n) => match n.as_i64().and_then(|i| i32::try_from(i).ok()) {
            Some(i) => Value::new_int(ctx.clone(), i),
            None => Value::new_float(ctx.clone(), n.as_f64().unwrap_or(f64::NAN)),
        },
        Json::String(s) => rquickjs::String::from_str(ctx.clone(), s)?.into_value(),
        Json::Array(items) => {
            let array = Array::new(ctx.clone())?;
            for (idx, item) in items.iter().enumerate() {
                array.set(idx, json_to_js(ctx, item)?)?;
            }
            array.into_value()
        }
        Json::Object(map) => {
            let obj = Object::new(ctx.clone())?;
            for (key, item) in map {
                obj.set(key.as_str(), json_to_js(ctx, item)?)?;
            }
            obj.into_value()
        }
    })
}

/// Export a VM value as JSON. `field` names the value in error messages.
pub fn js_to_json<'js>(ctx: &Ctx<'js>, field: &str, value: &Value<'js>) -> rquickjs::Result<Json> {
    export(ctx, field, value, 0)
}

fn export<'js>(ctx: &Ctx<'js>, field: &str, value: &Value<'js>, depth: usize) -> rquickjs::Result<Json> {
    if depth > MAX_DEPTH {
        return Err(value_error(ctx, &format!("{field}: value nests too deeply")));
    }
    match value.type_of() {
        Type::Uninitialized | Type::Undefined | Type::Null => Ok(Json::Null),
        Type::Bool => Ok(Json::Bool(value.as_bool().unwrap_or_default())),
        Type::Int => Ok(Json::from(value.as_int().unwrap_or_default())),
        Type::Float => Ok(float_to_json(value.as_float().unwrap_or(f64::NAN))),
        Type::String => Ok(Json::String(display_string(value)?)),
        Type::Function | Type::Constructor => Ok(Json::Null),
        Type::Array => {
            let Some(array) = value.as_array() else {
                return Err(value_error(ctx, &format!("{field}: not an array")));
            };
            let mut out = Vec::with_capacity(array.len());
            for (idx, item) in array.iter::<Value>().enumerate() {
                out.push(export(ctx, &format!("{field}[{idx}]"), &item?, depth + 1)?);
            }
            Ok(Json::Array(out))
        }
        Type::Object | Type::Exception => {
            let Some(obj) = value.as_object() else {
                return Err(value_error(ctx, &format!("{field}: not an object")));
            };
            let mut out = serde_json::Map::new();
            for prop in obj.props::<String, Value>() {
                let (key, item) = prop?;
                if matches!(item.type_of(), Type::Function | Type::Constructor | Type::Undefined) {
                    continue;
                }
                let path = format!("{field}.{key}");
                out.insert(key, export(ctx, &path, &item, depth + 1)?);
            }
            Ok(Json::Object(out))
        }
        _ => Err(value_error(
            ctx,
            &format!("{field}: cannot export a {}", kind_name(value)),
        )),
    }
}

fn float_to_json(f: f64) -> Json {
    if f.fract() == 0.0 && f.abs() < 9.0e15 {
        Json::from(f as i64)
    } else {
        serde_json::Number::from_f64(f)
            .map(Json::Number)
            .unwrap_or(Json::Null)
    }
}

/// Convert a scalar VM value into a record field value
pub fn js_to_field<'js>(ctx: &Ctx<'js>, field: &str, value: &Value<'js>) -> rquickjs::Result<FieldValue> {
    match value.type_of() {
        Type::Uninitialized | Type::Undefined | Type::Null => Ok(FieldValue::Null),
        Type::Bool => Ok(FieldValue::Bool(value.as_bool().unwrap_or_default())),
        Type::Int => Ok(FieldValue::Int(i64::from(value.as_int().unwrap_or_default()))),
        Type::Float => Ok(FieldValue::Float(value.as_float().unwrap_or(f64::NAN))),
        Type::String => Ok(FieldValue::Text(display_string(value)?)),
        _ => Err(value_error(
            ctx,
            &format!("{field}: cannot store a {}", kind_name(value)),
        )),
    }
}

/// Convert a record field value into the VM
pub fn field_to_js<'js>(ctx: &Ctx<'js>, value: &FieldValue) -> rquickjs::Result<Value<'js>> {
    let number = |n: f64| Value::new_float(ctx.clone(), n);
    Ok(match value {
        FieldValue::Null => Value::new_null(ctx.clone()),
        FieldValue::Bool(b) => Value::new_bool(ctx.clone(), *b),
        FieldValue::Int(i) => match i32::try_from(*i) {
            Ok(i) => Value::new_int(ctx.clone(), i),
            Err(_) => number(*i as f64),
        },
        FieldValue::UInt(u) => match i32::try_from(*u) {
            Ok(i) => Value::new_int(ctx.clone(), i),
            Err(_) => number(*u as f64),
        },
        FieldValue::Float(f) => number(*f),
        FieldValue::Text(s) => rquickjs::String::from_str(ctx.clone(), s)?.into_value(),
    })
}

/// Marshal a record into a plain object
pub fn row_to_js<'js>(ctx: &Ctx<'js>, row: &Row) -> rquickjs::Result<Value<'js>> {
    let obj = Object::new(ctx.clone())?;
    for (name, value) in row {
        obj.set(*name, field_to_js(ctx, value)?)?;
    }
    Ok(obj.into_value())
}

/// Read `{field: value}` pairs from a script object
pub fn object_fields<'js>(ctx: &Ctx<'js>, obj: &Object<'js>) -> rquickjs::Result<Vec<(String, FieldValue)>> {
    let mut fields = Vec::new();
    for prop in obj.props::<String, Value>() {
        let (key, value) = prop?;
        let value = js_to_field(ctx, &key, &value)?;
        fields.push((key, value));
    }
    Ok(fields)
}
