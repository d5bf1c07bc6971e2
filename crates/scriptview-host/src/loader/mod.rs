// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Script loader
//!
//! Resolves module ids to files and caches their sources wrapped as
//! CommonJS factories. Both caches are process-wide and shared by every
//! environment; each sits behind its own reader/writer lock.
//!
//! In development mode every source lookup re-stats the file and reloads it
//! when its modification time advanced. In production mode the first loaded
//! source is kept until the process restarts.

mod cache;
mod resolver;

pub use cache::{LoadedScript, SourceCache};
pub use resolver::{Resolver, candidates, is_relative, normalize};

use crate::error::{HostError, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

/// Snapshot of loader counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoaderStats {
    /// Resolutions answered from the path cache
    pub resolve_hits: u64,
    /// Candidate paths checked on disk
    pub probes: u64,
    /// Source files read from disk
    pub source_reads: u64,
}

/// Wrap raw script text as a CommonJS factory expression. The source starts
/// on the header line so its line numbers are unchanged.
pub fn wrap_factory(source: &str) -> String {
    format!("(function (exports, require, module, __filename, __dirname) {{{source}\n}})")
}

/// Modification time of a file
pub fn modified_time(path: &Path) -> Result<SystemTime> {
    std::fs::metadata(path)
        .and_then(|meta| meta.modified())
        .map_err(HostError::io(path))
}

/// Resolves and loads scripts for every environment of the process
pub struct ScriptLoader {
    development: bool,
    resolver: Resolver,
    sources: SourceCache,
    source_reads: AtomicU64,
}

impl ScriptLoader {
    /// Create a loader over ordered search roots. Relative roots are made
    /// absolute against the current directory.
    pub fn new<I, P>(search_paths: I, development: bool) -> Result<Self>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let mut roots = Vec::new();
        for path in search_paths {
            let path = path.as_ref();
            let absolute = std::path::absolute(path).map_err(HostError::io(path))?;
            roots.push(normalize(&absolute));
        }
        if roots.is_empty() {
            roots.push(std::env::current_dir().map_err(HostError::io("."))?);
        }
        Ok(Self {
            development,
            resolver: Resolver::new(roots),
            sources: SourceCache::new(),
            source_reads: AtomicU64::new(0),
        })
    }

    /// Whether sources are revalidated on every access
    pub fn is_development(&self) -> bool {
        self.development
    }

    /// Absolute search roots in precedence order
    pub fn search_paths(&self) -> &[PathBuf] {
        self.resolver.roots()
    }

    /// Resolve `id` as required from directory `cwd`
    pub fn resolve(&self, cwd: &Path, id: &str) -> Result<PathBuf> {
        self.resolver.resolve(cwd, id)
    }

    /// Wrapped factory source of the script at `path`
    pub fn load_source(&self, path: &Path) -> Result<Arc<str>> {
        Ok(self.load(path)?.factory)
    }

    /// Cached script for `path`, loading or reloading it as needed
    pub fn load(&self, path: &Path) -> Result<LoadedScript> {
        if let Some(script) = self.sources.get(path) {
            if !self.development {
                return Ok(script);
            }
            if modified_time(path)? <= script.modified {
                return Ok(script);
            }
            tracing::debug!(path = %path.display(), "script changed on disk; reloading");
        }

        let modified = modified_time(path)?;
        let source = std::fs::read_to_string(path).map_err(HostError::io(path))?;
        self.source_reads.fetch_add(1, Ordering::Relaxed);
        let script = LoadedScript {
            modified,
            factory: wrap_factory(&source).into(),
        };
        self.sources.set(path.to_path_buf(), script.clone());
        Ok(script)
    }

    /// Drop the cached source of `path`
    pub fn invalidate(&self, path: &Path) -> bool {
        self.sources.delete(path).is_some()
    }

    /// Current counters
    pub fn stats(&self) -> LoaderStats {
        LoaderStats {
            resolve_hits: self.resolver.hits(),
            probes: self.resolver.probes(),
            source_reads: self.source_reads.load(Ordering::Relaxed),
        }
    }
}

impl std::fmt::Debug for ScriptLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptLoader")
            .field("development", &self.development)
            .field("search_paths", &self.resolver.roots())
            .field("cached_sources", &self.sources.len())
            .finish()
    }
}
