// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Request script views
//!
//! A [`RequestScriptView`] runs its entry script once per request in a
//! fresh [`ScriptEnvironment`]. Nothing but the loader caches and the
//! compiled entry outlives a request.

use crate::config::HostConfig;
use crate::context::{CONTEXT_ID, RequestContext, Response};
use crate::environment::{Builtin, RequirePolicy, ScriptEnvironment};
use crate::error::{HostError, Result};
use crate::loader::{ScriptLoader, modified_time, wrap_factory};
use crate::modules::{self, DbModule};
use crate::template::{DirectoryTemplates, TemplateRenderer};
use parking_lot::RwLock;
use scriptview_orm::Database;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

/// Builtin id carrying the matched URL tail
pub const ROUTE_PATH_ID: &str = "routePath";

/// Entry script ready to run
#[derive(Debug)]
pub struct EntryScript {
    /// Absolute path of the entry file
    pub path: PathBuf,
    /// Modification time the factory was built from
    pub modified: SystemTime,
    /// Wrapped factory source
    pub factory: Arc<str>,
}

/// HTTP-facing script view mounted under a base path
pub struct RequestScriptView {
    base_path: String,
    entry: PathBuf,
    development: bool,
    loader: Arc<ScriptLoader>,
    builtins: Vec<(String, Builtin)>,
    templates: Option<Arc<dyn TemplateRenderer>>,
    compiled: RwLock<Option<Arc<EntryScript>>>,
    compiles: AtomicU64,
}

impl RequestScriptView {
    /// View running `entry`; a relative entry is taken from the loader's
    /// first search root. `web`, `utils` and `logger` are pre-registered.
    pub fn new(loader: Arc<ScriptLoader>, entry: impl AsRef<Path>) -> Self {
        let entry = entry.as_ref();
        let entry = match loader.search_paths().first() {
            Some(root) if entry.is_relative() => root.join(entry),
            _ => entry.to_path_buf(),
        };
        let builtins = modules::standard_modules()
            .into_iter()
            .map(|(id, builtin)| (id.to_string(), builtin))
            .collect();
        Self {
            base_path: String::new(),
            entry,
            development: loader.is_development(),
            loader,
            builtins,
            templates: None,
            compiled: RwLock::new(None),
            compiles: AtomicU64::new(0),
        }
    }

    /// View described by `config`. A configured database is exposed through
    /// the `db` module; record models are added by the caller.
    pub fn from_config(config: &HostConfig) -> Result<Self> {
        config.validate()?;
        let loader = Arc::new(ScriptLoader::new(&config.search_paths, config.development)?);
        let mut view = Self::new(loader, &config.entry).with_base_path(&config.base_path);
        if let Some(dir) = &config.templates {
            view = view.with_templates(Arc::new(DirectoryTemplates::new(dir)));
        }
        if let Some(path) = &config.database {
            let database = Database::open(path)?;
            view = view.with_module("db", Builtin::factory(DbModule::new(database)));
        }
        Ok(view)
    }

    /// Mount under `base` (one path segment, slashes trimmed)
    pub fn with_base_path(mut self, base: &str) -> Self {
        self.base_path = base.trim_matches('/').to_string();
        self
    }

    /// Register a builtin for every request, replacing one with the same id
    pub fn with_module(mut self, id: impl Into<String>, builtin: Builtin) -> Self {
        let id = id.into();
        self.builtins.retain(|(existing, _)| *existing != id);
        self.builtins.push((id, builtin));
        self
    }

    /// Renderer used by `renderHTML`
    pub fn with_templates(mut self, templates: Arc<dyn TemplateRenderer>) -> Self {
        self.templates = Some(templates);
        self
    }

    /// Mount segment
    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    /// Absolute entry path
    pub fn entry(&self) -> &Path {
        &self.entry
    }

    /// Whether the entry and modules are revalidated per request
    pub fn is_development(&self) -> bool {
        self.development
    }

    /// Loader shared by every request
    pub fn loader(&self) -> &Arc<ScriptLoader> {
        &self.loader
    }

    /// How many times the entry script was (re)built
    pub fn compile_count(&self) -> u64 {
        self.compiles.load(Ordering::Relaxed)
    }

    /// Tail of `path` below the mount point, or `None` when `path` is
    /// outside it
    pub fn route_tail(&self, path: &str) -> Option<String> {
        let path = path.trim_start_matches('/');
        if self.base_path.is_empty() {
            return Some(path.to_string());
        }
        let rest = path.strip_prefix(self.base_path.as_str())?;
        if rest.is_empty() {
            return Some(String::new());
        }
        rest.strip_prefix('/').map(str::to_string)
    }

    /// Compiled entry, rebuilt in development mode when the file changed
    pub fn entry_script(&self) -> Result<Arc<EntryScript>> {
        let cached = self.compiled.read().clone();
        if let Some(script) = cached {
            if !self.development || modified_time(&self.entry)? <= script.modified {
                return Ok(script);
            }
        }

        let mut slot = self.compiled.write();
        let modified = modified_time(&self.entry)?;
        if let Some(script) = slot.as_ref() {
            if !self.development || modified <= script.modified {
                return Ok(Arc::clone(script));
            }
        }

        let source = std::fs::read_to_string(&self.entry).map_err(HostError::io(&self.entry))?;
        let script = Arc::new(EntryScript {
            path: self.entry.clone(),
            modified,
            factory: wrap_factory(&source).into(),
        });
        self.compiles.fetch_add(1, Ordering::Relaxed);
        tracing::info!(entry = %self.entry.display(), "entry script compiled");
        *slot = Some(Arc::clone(&script));
        Ok(script)
    }

    /// Run the entry script for one request. Script failures become a 500
    /// response carrying the error text.
    pub fn handle_request(&self, request: RequestContext, route_path: &str) -> Response {
        let request = match &self.templates {
            Some(templates) => request.with_templates(Some(Arc::clone(templates))),
            None => request,
        };
        let request = Arc::new(request);
        match self.execute(&request, route_path) {
            Ok(()) => request.take_response(),
            Err(err) => {
                tracing::error!(
                    method = request.method(),
                    url = request.url(),
                    error = %err,
                    "script failed"
                );
                Response::text(500, err.to_string())
            }
        }
    }

    fn execute(&self, request: &Arc<RequestContext>, route_path: &str) -> Result<()> {
        let entry = self.entry_script()?;
        let env = ScriptEnvironment::new(Arc::clone(&self.loader), RequirePolicy::for_mode(self.development))?;
        for (id, builtin) in &self.builtins {
            env.install_builtin(id.clone(), builtin.clone())?;
        }
        env.install_builtin(CONTEXT_ID, Builtin::opaque(Arc::clone(request)))?;
        env.install_builtin(ROUTE_PATH_ID, Builtin::data(route_path))?;
        env.run_main(&entry.path, &entry.factory)?;
        Ok(())
    }
}

impl std::fmt::Debug for RequestScriptView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestScriptView")
            .field("base_path", &self.base_path)
            .field("entry", &self.entry)
            .field("development", &self.development)
            .field("builtins", &self.builtins.iter().map(|(id, _)| id).collect::<Vec<_>>())
            .finish()
    }
}
