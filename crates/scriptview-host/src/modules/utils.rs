// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! `utils` module: hashing and string formatting

use super::{format_args_js, method, type_error};
use crate::convert;
use crate::environment::{Host, HostModule};
use md5::{Digest, Md5};
use ring::digest;
use rquickjs::function::Rest;
use rquickjs::{Ctx, Object, Value};
use serde_json::Value as Json;

/// Lower-case hex MD5 digest
pub fn md5_hex(data: &[u8]) -> String {
    hex::encode(Md5::digest(data))
}

/// Lower-case hex SHA-256 digest
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(digest::digest(&digest::SHA256, data))
}

/// Format `fmt` with printf-style directives.
///
/// `%s`/`%v` plain text, `%d`/`%i` integers, `%f` floats, `%j` JSON,
/// `%x`/`%X` hex, `%%` a literal percent. Directives without an argument
/// are kept verbatim; surplus arguments are appended after a space.
pub fn sprintf(fmt: &str, args: &[Json]) -> String {
    let mut result = String::with_capacity(fmt.len());
    let mut args = args.iter();
    let mut chars = fmt.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '%' {
            result.push(c);
            continue;
        }
        let Some(&next) = chars.peek() else {
            result.push('%');
            break;
        };
        if next == '%' {
            chars.next();
            result.push('%');
            continue;
        }
        if !matches!(next, 's' | 'v' | 'd' | 'i' | 'f' | 'j' | 'x' | 'X') {
            result.push('%');
            continue;
        }
        chars.next();
        match args.next() {
            Some(arg) => result.push_str(&directive(next, arg)),
            None => {
                result.push('%');
                result.push(next);
            }
        }
    }

    for arg in args {
        result.push(' ');
        result.push_str(&plain(arg));
    }
    result
}

fn directive(kind: char, arg: &Json) -> String {
    match kind {
        'd' | 'i' => match number(arg) {
            Some(n) if n.is_finite() => format!("{}", n.trunc() as i64),
            _ => "NaN".to_string(),
        },
        'f' => match number(arg) {
            Some(n) => n.to_string(),
            None => "NaN".to_string(),
        },
        'j' => arg.to_string(),
        'x' | 'X' => {
            let hex = match (arg, number(arg)) {
                (Json::String(s), _) => hex::encode(s.as_bytes()),
                (_, Some(n)) if n.is_finite() => format!("{:x}", n.trunc() as i64),
                _ => hex::encode(plain(arg).as_bytes()),
            };
            if kind == 'X' { hex.to_uppercase() } else { hex }
        }
        _ => plain(arg),
    }
}

fn number(arg: &Json) -> Option<f64> {
    match arg {
        Json::Number(n) => n.as_f64(),
        Json::Bool(b) => Some(f64::from(u8::from(*b))),
        Json::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Text of a value as `String(value)` would print it
pub fn plain(arg: &Json) -> String {
    match arg {
        Json::String(s) => s.clone(),
        Json::Null => "null".to_string(),
        other => other.to_string(),
    }
}

/// The `utils` module
#[derive(Debug, Default, Clone, Copy)]
pub struct UtilsModule;

impl HostModule for UtilsModule {
    fn build<'js>(&self, ctx: &Ctx<'js>, _host: &Host) -> rquickjs::Result<Value<'js>> {
        let exports = Object::new(ctx.clone())?;

        let hashes: [(&str, fn(&[u8]) -> String, bool); 4] = [
            ("md5", md5_hex, false),
            ("MD5", md5_hex, true),
            ("sha256", sha256_hex, false),
            ("SHA256", sha256_hex, true),
        ];
        for (name, hash, upper) in hashes {
            method(ctx, &exports, name, move |ctx: Ctx<'js>, args: Rest<Value<'js>>| -> rquickjs::Result<String> {
                let Some(value) = args.first() else {
                    return Err(type_error(&ctx, &format!("{name}: expected 1 argument, got 0")));
                };
                let data = convert::display_string(value)?;
                let digest = hash(data.as_bytes());
                Ok(if upper { digest.to_uppercase() } else { digest })
            })?;
        }

        method(ctx, &exports, "sprintf", |ctx: Ctx<'js>, args: Rest<Value<'js>>| {
            format_args_js(&ctx, "sprintf", &args)
        })?;

        Ok(exports.into_value())
    }
}
