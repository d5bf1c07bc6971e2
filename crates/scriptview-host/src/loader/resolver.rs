// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Module id resolution against search roots

use crate::error::{HostError, Result};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

/// Whether `id` is resolved against the requiring module's directory
pub fn is_relative(id: &str) -> bool {
    id.starts_with('.')
}

/// Lexically normalize `.` and `..` components
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Paths tried for `id` under `root`, in precedence order
pub fn candidates(root: &Path, id: &str) -> [PathBuf; 3] {
    let base = normalize(&root.join(id));
    let mut with_ext = base.clone().into_os_string();
    with_ext.push(".js");
    [base.clone(), PathBuf::from(with_ext), base.join("index.js")]
}

/// Resolves module ids to absolute file paths, remembering every hit.
///
/// The cache is append-only: paths are assumed not to move while the
/// process runs.
pub struct Resolver {
    roots: Vec<PathBuf>,
    cache: RwLock<HashMap<String, PathBuf>>,
    hits: AtomicU64,
    probes: AtomicU64,
}

impl Resolver {
    /// Create a resolver over absolute search roots
    pub fn new(roots: Vec<PathBuf>) -> Self {
        Self {
            roots,
            cache: RwLock::new(HashMap::new()),
            hits: AtomicU64::new(0),
            probes: AtomicU64::new(0),
        }
    }

    /// Search roots in precedence order
    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    /// Resolve `id` as required from directory `cwd`
    pub fn resolve(&self, cwd: &Path, id: &str) -> Result<PathBuf> {
        let relative = is_relative(id);
        let key = if relative {
            normalize(&cwd.join(id)).to_string_lossy().into_owned()
        } else {
            id.to_string()
        };

        if let Some(path) = self.cache.read().get(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(path.clone());
        }

        let roots = if relative {
            vec![cwd.to_path_buf()]
        } else {
            self.roots.clone()
        };
        for root in &roots {
            for candidate in candidates(root, id) {
                self.probes.fetch_add(1, Ordering::Relaxed);
                if candidate.is_file() {
                    tracing::debug!(id, path = %candidate.display(), "module resolved");
                    self.cache.write().insert(key, candidate.clone());
                    return Ok(candidate);
                }
            }
        }

        Err(HostError::ModuleNotFound {
            id: id.to_string(),
            cwd: cwd.to_path_buf(),
        })
    }

    /// Resolution cache hits so far
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Filesystem probes so far
    pub fn probes(&self) -> u64 {
        self.probes.load(Ordering::Relaxed)
    }
}
