// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! # Scriptview Host
//!
//! Runs JavaScript request handlers in a fresh QuickJS environment per
//! request, with CommonJS modules and host bridge modules.
//!
//! ## Features
//!
//! - **Module loading**: `require` with search roots, `.js`/`index.js`
//!   resolution and process-wide caches with development-mode hot reload
//! - **Builtin modules**: host-provided modules that take precedence over
//!   files, built eagerly or on first `require`
//! - **Bridge modules**: `web`, `utils`, `logger`, `models` and `db`
//! - **Views**: one environment per request, cached entry script, script
//!   failures answered with 500
//!
//! ## Example
//!
//! ```rust,ignore
//! use scriptview_host::{HostConfig, RequestScriptView, Server};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> scriptview_host::Result<()> {
//!     let config = HostConfig::load(None)?;
//!     let view = Arc::new(RequestScriptView::from_config(&config)?);
//!     Server::new(view).run(&config.listen).await
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod context;
pub mod convert;
pub mod environment;
pub mod error;
pub mod loader;
pub mod modules;
pub mod server;
pub mod template;
pub mod view;

pub use config::HostConfig;
pub use context::{RequestContext, Response, SessionStore};
pub use environment::{Builtin, Host, HostModule, RequirePolicy, ScriptEnvironment};
pub use error::{HostError, Result};
pub use loader::{LoadedScript, LoaderStats, ScriptLoader};
pub use modules::{DbModule, LoggerModule, ModelsModule, UtilsModule, WebModule};
pub use server::Server;
pub use template::{DirectoryTemplates, TemplateRenderer};
pub use view::RequestScriptView;

/// Version of the host
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
