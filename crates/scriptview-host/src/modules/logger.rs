// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! `logger` module: leveled script logging under the `script` target

use super::format_args_js;
use crate::environment::{Host, HostModule};
use rquickjs::function::Rest;
use rquickjs::{Ctx, Function, Value};

/// Tracing target of script log entries
pub const TARGET: &str = "script";

// The third stack frame is the caller of debug/info/error.
const WRAPPER: &str = r#"
(function (emit) {
  function where() {
    var frames = String(new Error().stack || '').split('\n').filter(function (line) {
      return line.trim() !== '';
    });
    var frame = frames[2] || '';
    return frame.trim().replace(/^at\s+/, '');
  }
  function level(name) {
    return function () {
      emit.apply(null, [name, where()].concat(Array.prototype.slice.call(arguments)));
    };
  }
  return { debug: level('debug'), info: level('info'), error: level('error') };
})
"#;

/// Log levels scripts can emit at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    /// `logger.debug`
    Debug,
    /// `logger.info`
    Info,
    /// `logger.error`
    Error,
}

impl Level {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "debug" => Some(Level::Debug),
            "info" => Some(Level::Info),
            "error" => Some(Level::Error),
            _ => None,
        }
    }
}

/// `location|message`
pub fn entry(location: &str, message: &str) -> String {
    format!("{location}|{message}")
}

fn emit(level: Level, line: &str) {
    match level {
        Level::Debug => tracing::debug!(target: TARGET, "{line}"),
        Level::Info => tracing::info!(target: TARGET, "{line}"),
        Level::Error => tracing::error!(target: TARGET, "{line}"),
    }
}

/// The `logger` module
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggerModule;

impl HostModule for LoggerModule {
    fn build<'js>(&self, ctx: &Ctx<'js>, _host: &Host) -> rquickjs::Result<Value<'js>> {
        let native = Function::new(
            ctx.clone(),
            |ctx: Ctx<'js>, level: String, location: String, args: Rest<Value<'js>>| -> rquickjs::Result<()> {
                let Some(level) = Level::parse(&level) else {
                    return Err(super::type_error(&ctx, &format!("unknown log level '{level}'")));
                };
                let message = format_args_js(&ctx, "logger", &args)?;
                emit(level, &entry(&location, &message));
                Ok(())
            },
        )?;
        let wrap: Function = ctx.eval(WRAPPER)?;
        wrap.call((native,))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_format() {
        assert_eq!(entry("handler (/srv/app/index.js:3:5)", "hi"), "handler (/srv/app/index.js:3:5)|hi");
        assert_eq!(Level::parse("info"), Some(Level::Info));
        assert_eq!(Level::parse("warn"), None);
    }
}
