// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Host bridge modules
//!
//! `web`, `utils` and `logger` are registered on every view. `models` and
//! `db` wrap a database and are registered by the embedder.

pub mod db;
pub mod logger;
pub mod models;
pub mod utils;
pub mod web;

pub use db::DbModule;
pub use logger::LoggerModule;
pub use models::ModelsModule;
pub use utils::UtilsModule;
pub use web::WebModule;

use crate::convert;
use crate::environment::Builtin;
use rquickjs::function::IntoJsFunc;
use rquickjs::{Ctx, Function, Object, Value};
use scriptview_orm::OrmError;
use serde_json::Value as Json;

/// The modules every view starts with
pub fn standard_modules() -> Vec<(&'static str, Builtin)> {
    vec![
        ("web", Builtin::native(WebModule)),
        ("utils", Builtin::native(UtilsModule)),
        ("logger", Builtin::native(LoggerModule)),
    ]
}

/// Define a named function property on `obj`
pub fn method<'js, F, P>(ctx: &Ctx<'js>, obj: &Object<'js>, name: &str, f: F) -> rquickjs::Result<()>
where
    F: IntoJsFunc<'js, P> + 'js,
{
    let func = Function::new(ctx.clone(), f)?.with_name(name)?;
    obj.set(name, func)
}

pub(crate) fn type_error(ctx: &Ctx<'_>, message: &str) -> rquickjs::Error {
    convert::type_error(ctx, message)
}

/// String argument `idx` of `func`
pub fn expect_string<'js>(ctx: &Ctx<'js>, func: &str, args: &[Value<'js>], idx: usize) -> rquickjs::Result<String> {
    match args.get(idx) {
        Some(value) if value.is_string() => convert::display_string(value),
        Some(value) => Err(type_error(
            ctx,
            &format!("{func}: argument {} must be a string, got {}", idx + 1, convert::kind_name(value)),
        )),
        None => Err(type_error(
            ctx,
            &format!("{func}: expected at least {} argument(s), got {}", idx + 1, args.len()),
        )),
    }
}

/// Export every argument as JSON, naming the failing one
pub fn export_args<'js>(ctx: &Ctx<'js>, func: &str, args: &[Value<'js>]) -> rquickjs::Result<Vec<Json>> {
    args.iter()
        .enumerate()
        .map(|(idx, arg)| convert::js_to_json(ctx, &format!("{func} argument {}", idx + 1), arg))
        .collect()
}

/// `sprintf(args[0], ...args[1..])`; a non-string first argument is
/// formatted like a surplus argument
pub fn format_args_js<'js>(ctx: &Ctx<'js>, func: &str, args: &[Value<'js>]) -> rquickjs::Result<String> {
    let values = export_args(ctx, func, args)?;
    Ok(match values.split_first() {
        Some((Json::String(fmt), rest)) => utils::sprintf(fmt, rest),
        Some(_) => utils::sprintf("", &values).trim_start().to_string(),
        None => String::new(),
    })
}

/// Raise an ORM failure in the VM: `DBError` for database and session
/// failures, `ValueError` for rejected input
pub fn orm_error(ctx: &Ctx<'_>, err: OrmError) -> rquickjs::Error {
    let name = match err {
        OrmError::Database { .. } | OrmError::SessionClosed | OrmError::EngineMismatch { .. } => "DBError",
        _ => "ValueError",
    };
    convert::throw_error(ctx, name, &err.to_string())
}
