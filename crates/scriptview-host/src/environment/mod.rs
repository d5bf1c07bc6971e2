// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Script environments
//!
//! A [`ScriptEnvironment`] owns one VM. On construction it installs the
//! host primitives that resolve and load modules and the global `require`
//! built on top of them. Builtin modules always win over files with the
//! same id.
//!
//! ```rust,ignore
//! use scriptview_host::{Builtin, RequirePolicy, ScriptEnvironment, ScriptLoader};
//! use std::sync::Arc;
//!
//! let loader = Arc::new(ScriptLoader::new(["scripts"], false)?);
//! let env = ScriptEnvironment::new(loader, RequirePolicy::Cached)?;
//! env.install_builtin("config", Builtin::data(serde_json::json!({"debug": true})))?;
//! let debug = env.run("require('config').debug")?;
//! ```

mod bootstrap;
mod registry;

pub use registry::{Builtin, BuiltinRegistry, Host, HostModule};

use crate::convert;
use crate::error::{HostError, Result};
use crate::loader::ScriptLoader;
use rquickjs::{Context, Ctx, Function, Object, Runtime, Value};
use serde_json::Value as Json;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// How `require` treats modules it has already executed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequirePolicy {
    /// Execute each module once per environment and reuse its exports
    Cached,
    /// Re-resolve, reload and re-execute on every call
    Fresh,
}

impl RequirePolicy {
    /// `Fresh` in development mode, `Cached` otherwise
    pub fn for_mode(development: bool) -> Self {
        if development {
            RequirePolicy::Fresh
        } else {
            RequirePolicy::Cached
        }
    }
}

/// One VM with the module system installed.
///
/// Environments are `!Send`: create, use and drop them on one thread.
pub struct ScriptEnvironment {
    host: Host,
    policy: RequirePolicy,
    loader: Arc<ScriptLoader>,
    context: Context,
    _runtime: Runtime,
}

impl ScriptEnvironment {
    /// Create an environment whose global `require` resolves relative ids
    /// against the loader's first search root
    pub fn new(loader: Arc<ScriptLoader>, policy: RequirePolicy) -> Result<Self> {
        let runtime = Runtime::new()?;
        let context = Context::full(&runtime)?;
        let host = Host::new();
        let root = loader
            .search_paths()
            .first()
            .cloned()
            .unwrap_or_else(|| PathBuf::from("."));

        context.with(|ctx| {
            bootstrap::install(&ctx, &loader, &host, policy == RequirePolicy::Cached, &root)
                .map_err(|err| script_error(&ctx, err))
        })?;

        Ok(Self {
            host,
            policy,
            loader,
            context,
            _runtime: runtime,
        })
    }

    /// Policy selected at construction
    pub fn policy(&self) -> RequirePolicy {
        self.policy
    }

    /// Loader shared with other environments
    pub fn loader(&self) -> &Arc<ScriptLoader> {
        &self.loader
    }

    /// Registry handle of this environment
    pub fn host(&self) -> &Host {
        &self.host
    }

    /// Register a builtin module. Factories are built on first `require`;
    /// everything else is converted now. Re-registering overwrites.
    pub fn install_builtin(&self, id: impl Into<String>, builtin: Builtin) -> Result<()> {
        let id = id.into();
        self.context.with(|ctx| {
            bootstrap::install_builtin(&ctx, &self.host, id, builtin).map_err(|err| script_error(&ctx, err))
        })
    }

    /// Evaluate global code and export its completion value
    pub fn run(&self, code: &str) -> Result<Json> {
        self.context.with(|ctx| {
            ctx.eval::<Value, _>(code)
                .and_then(|value| convert::js_to_json(&ctx, "result", &value))
                .map_err(|err| script_error(&ctx, err))
        })
    }

    /// Run a file as the main module and export its `module.exports`
    pub fn run_file(&self, path: &Path) -> Result<Json> {
        let path = std::path::absolute(path).map_err(HostError::io(path))?;
        let script = self.loader.load(&path)?;
        self.run_main(&path, &script.factory)
    }

    /// Run an already wrapped factory as the main module at `path`
    pub fn run_main(&self, path: &Path, factory: &str) -> Result<Json> {
        self.context.with(|ctx| {
            run_main(&ctx, path, factory).map_err(|err| script_error(&ctx, err))
        })
    }

    /// Run `f` inside the VM
    pub fn with<R>(&self, f: impl for<'js> FnOnce(Ctx<'js>) -> R) -> R {
        self.context.with(f)
    }
}

fn run_main<'js>(ctx: &Ctx<'js>, path: &Path, factory: &str) -> rquickjs::Result<Json> {
    let filename = path.to_string_lossy().into_owned();
    let factory: Function = bootstrap::eval_named(ctx, factory, &filename)?;
    let api: Object = ctx.globals().get(bootstrap::LOADER_GLOBAL)?;
    let run: Function = api.get("runMain")?;
    let dirname = path
        .parent()
        .map(|dir| dir.to_string_lossy().into_owned())
        .unwrap_or_default();
    let exports: Value = run.call((factory, filename, dirname))?;
    convert::js_to_json(ctx, "module.exports", &exports)
}

/// Translate a VM failure, taking the pending exception if there is one
pub fn script_error(ctx: &Ctx<'_>, err: rquickjs::Error) -> HostError {
    if !err.is_exception() {
        return HostError::Vm(err);
    }
    let exception = ctx.catch();
    let text = convert::describe_exception(&exception);
    let name: Option<String> = exception
        .as_object()
        .and_then(|obj| obj.get("name").ok());
    match name.as_deref() {
        Some("SyntaxError") => HostError::Compile(text),
        _ => HostError::Runtime(text),
    }
}
