// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Source cache for loaded scripts

use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

/// A script wrapped as a CommonJS factory, with the modification time of
/// the file it was read from
#[derive(Debug, Clone)]
pub struct LoadedScript {
    /// File modification time when the source was read
    pub modified: SystemTime,
    /// `(function (exports, require, module, __filename, __dirname) {...})`
    pub factory: Arc<str>,
}

/// Thread-safe cache of loaded scripts keyed by absolute path
#[derive(Default)]
pub struct SourceCache {
    entries: RwLock<HashMap<PathBuf, LoadedScript>>,
}

impl SourceCache {
    /// Create a new empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a cached script by path
    pub fn get(&self, path: &Path) -> Option<LoadedScript> {
        self.entries.read().get(path).cloned()
    }

    /// Add or replace a script
    pub fn set(&self, path: PathBuf, script: LoadedScript) {
        self.entries.write().insert(path, script);
    }

    /// Remove a script
    pub fn delete(&self, path: &Path) -> Option<LoadedScript> {
        self.entries.write().remove(path)
    }

    /// Number of cached scripts
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Check if the cache is empty
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
