// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Error types for the script host

use std::path::PathBuf;
use thiserror::Error;

/// Result type for script host operations
pub type Result<T> = std::result::Result<T, HostError>;

/// Errors that can occur while loading or running scripts
#[derive(Debug, Error)]
pub enum HostError {
    /// Resolution exhausted every search root
    #[error("cannot find module '{id}' from '{}'", cwd.display())]
    ModuleNotFound {
        /// Requested module id
        id: String,
        /// Directory of the requiring module
        cwd: PathBuf,
    },

    /// File system error
    #[error("io error on '{}': {source}", path.display())]
    Io {
        /// File being accessed
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Script failed to compile
    #[error("{0}")]
    Compile(String),

    /// Uncaught exception while running a script
    #[error("{0}")]
    Runtime(String),

    /// Wrong arity or argument type at a bridge boundary
    #[error("TypeError: {0}")]
    TypeError(String),

    /// ORM failure
    #[error(transparent)]
    Orm(#[from] scriptview_orm::OrmError),

    /// VM failure that is not a script exception
    #[error("vm error: {0}")]
    Vm(#[from] rquickjs::Error),

    /// JSON conversion error
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid configuration
    #[error("config error: {0}")]
    Config(String),

    /// Template lookup or rendering failed
    #[error("template error: {0}")]
    Template(String),

    /// HTTP server failure
    #[error("http error: {0}")]
    Http(String),
}

impl HostError {
    /// Wrap an io error with the path it concerns
    pub fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| Self::Io { path, source }
    }

    /// Create a new TypeError
    pub fn type_error(msg: impl Into<String>) -> Self {
        Self::TypeError(msg.into())
    }
}
