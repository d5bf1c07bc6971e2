// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! `web` module: rendering, request introspection, sessions and redirects
//!
//! Every function looks the request context up when it is called, so the
//! module value itself holds no request state.

use super::{expect_string, format_args_js, method, type_error};
use crate::context::{CONTEXT_ID, RequestContext, Response};
use crate::convert;
use crate::environment::{Host, HostModule};
use rquickjs::function::Rest;
use rquickjs::{Ctx, Object, Value};
use std::sync::Arc;

/// The `web` module
#[derive(Debug, Default, Clone, Copy)]
pub struct WebModule;

fn context(ctx: &Ctx<'_>, host: &Host) -> rquickjs::Result<Arc<RequestContext>> {
    host.opaque::<RequestContext>(CONTEXT_ID)
        .ok_or_else(|| convert::value_error(ctx, "request context is not available"))
}

/// Split an optional leading status code off `args`
fn status_and_rest<'a, 'js>(
    ctx: &Ctx<'js>,
    func: &str,
    args: &'a [Value<'js>],
    min_rest: usize,
) -> rquickjs::Result<(u16, &'a [Value<'js>])> {
    match args.split_first() {
        Some((first, rest)) if first.is_number() && rest.len() >= min_rest => {
            let code = first.as_int().map(f64::from).or_else(|| first.as_float()).unwrap_or(0.0);
            if !(100.0..=599.0).contains(&code) || code.fract() != 0.0 {
                return Err(type_error(ctx, &format!("{func}: invalid status code {code}")));
            }
            Ok((code as u16, rest))
        }
        _ => Ok((200, args)),
    }
}

fn optional_string<'js>(ctx: &Ctx<'js>, value: Option<&str>) -> rquickjs::Result<Value<'js>> {
    match value {
        Some(s) => Ok(rquickjs::String::from_str(ctx.clone(), s)?.into_value()),
        None => Ok(Value::new_null(ctx.clone())),
    }
}

impl HostModule for WebModule {
    fn build<'js>(&self, ctx: &Ctx<'js>, host: &Host) -> rquickjs::Result<Value<'js>> {
        let exports = Object::new(ctx.clone())?;

        let h = host.clone();
        method(ctx, &exports, "renderText", move |ctx: Ctx<'js>, args: Rest<Value<'js>>| -> rquickjs::Result<()> {
            let request = context(&ctx, &h)?;
            let (status, rest) = status_and_rest(&ctx, "renderText", &args, 1)?;
            let body = format_args_js(&ctx, "renderText", rest)?;
            request.respond(Response::text(status, body));
            Ok(())
        })?;

        let h = host.clone();
        method(ctx, &exports, "renderHTML", move |ctx: Ctx<'js>, args: Rest<Value<'js>>| -> rquickjs::Result<()> {
            let request = context(&ctx, &h)?;
            let (status, rest) = status_and_rest(&ctx, "renderHTML", &args, 1)?;
            let name = expect_string(&ctx, "renderHTML", rest, 0)?;
            let values = match rest.get(1) {
                Some(values) => convert::js_to_json(&ctx, "renderHTML values", values)?,
                None => serde_json::Value::Null,
            };
            let Some(templates) = request.templates() else {
                return Err(convert::value_error(&ctx, "renderHTML: no template directory configured"));
            };
            let body = templates
                .render(&name, &values)
                .map_err(|err| convert::value_error(&ctx, &err.to_string()))?;
            request.respond(Response::html(status, body));
            Ok(())
        })?;

        let h = host.clone();
        method(ctx, &exports, "renderJSON", move |ctx: Ctx<'js>, args: Rest<Value<'js>>| -> rquickjs::Result<()> {
            let request = context(&ctx, &h)?;
            let (status, rest) = status_and_rest(&ctx, "renderJSON", &args, 1)?;
            let value = match rest.first() {
                Some(value) => convert::js_to_json(&ctx, "renderJSON value", value)?,
                None => serde_json::Value::Null,
            };
            request.respond(Response::json(status, value.to_string()));
            Ok(())
        })?;

        for (name, form) in [("$GET", false), ("$POST", true)] {
            let h = host.clone();
            method(ctx, &exports, name, move |ctx: Ctx<'js>, args: Rest<Value<'js>>| -> rquickjs::Result<Value<'js>> {
                let request = context(&ctx, &h)?;
                let key = expect_string(&ctx, name, &args, 0)?;
                let value = if form { request.form_value(&key) } else { request.query_param(&key) };
                optional_string(&ctx, value)
            })?;
        }

        let h = host.clone();
        method(ctx, &exports, "$METHOD", move |ctx: Ctx<'js>| -> rquickjs::Result<String> {
            Ok(context(&ctx, &h)?.method().to_string())
        })?;

        let h = host.clone();
        method(ctx, &exports, "$REMOTE_ADDR", move |ctx: Ctx<'js>| -> rquickjs::Result<String> {
            Ok(context(&ctx, &h)?.remote_addr().to_string())
        })?;

        let h = host.clone();
        method(ctx, &exports, "$URL", move |ctx: Ctx<'js>| -> rquickjs::Result<String> {
            Ok(context(&ctx, &h)?.url().to_string())
        })?;

        let h = host.clone();
        method(ctx, &exports, "$SESSION", move |ctx: Ctx<'js>, args: Rest<Value<'js>>| -> rquickjs::Result<Value<'js>> {
            let request = context(&ctx, &h)?;
            let key = expect_string(&ctx, "$SESSION", &args, 0)?;
            match args.get(1) {
                None => match request.session_get(&key) {
                    Some(value) => convert::json_to_js(&ctx, &value),
                    None => Ok(Value::new_null(ctx.clone())),
                },
                Some(value) if value.is_null() || value.is_undefined() => {
                    request.session_remove(&key);
                    Ok(Value::new_null(ctx.clone()))
                }
                Some(value) => {
                    let json = convert::js_to_json(&ctx, &format!("$SESSION {key}"), value)?;
                    request.session_set(&key, json);
                    Ok(value.clone())
                }
            }
        })?;

        let h = host.clone();
        method(ctx, &exports, "Redirect", move |ctx: Ctx<'js>, args: Rest<Value<'js>>| -> rquickjs::Result<()> {
            let request = context(&ctx, &h)?;
            let location = expect_string(&ctx, "Redirect", &args, 0)?;
            request.respond(Response::redirect(&location));
            Ok(())
        })?;

        Ok(exports.into_value())
    }
}
