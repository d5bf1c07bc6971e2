// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Host configuration
//!
//! Values come from defaults, then a TOML file, then `SCRIPTVIEW_*`
//! environment variables. The binary applies its command line flags last.

use crate::error::{HostError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Prefix of the environment variables read by [`HostConfig::load_from_env`]
pub const ENV_PREFIX: &str = "SCRIPTVIEW_";

/// Configuration of one mounted script view and its server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Socket address to listen on
    pub listen: String,

    /// URL path segment the view is mounted under
    pub base_path: String,

    /// Entry script run for every request
    pub entry: PathBuf,

    /// Ordered module search roots
    pub search_paths: Vec<PathBuf>,

    /// Re-check file modification times on every access
    pub development: bool,

    /// SQLite database exposed through the `models` and `db` modules
    pub database: Option<PathBuf>,

    /// Directory of templates used by `renderHTML`
    pub templates: Option<PathBuf>,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:8080".to_string(),
            base_path: "app".to_string(),
            entry: PathBuf::from("index.js"),
            search_paths: vec![PathBuf::from(".")],
            development: false,
            database: None,
            templates: None,
        }
    }
}

impl HostConfig {
    /// Load the configuration file (if any), then the environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.load_from_env(std::env::vars())?;
        Ok(config)
    }

    /// Parse a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(HostError::io(path))?;
        Self::from_toml_str(&content)
    }

    /// Parse TOML text; missing keys keep their defaults
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| HostError::Config(e.to_string()))
    }

    /// Apply `SCRIPTVIEW_*` variables from `vars`
    pub fn load_from_env<I>(&mut self, vars: I) -> Result<()>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, value) in vars {
            if let Some(name) = key.strip_prefix(ENV_PREFIX) {
                self.set(&name.to_lowercase(), &value)?;
            }
        }
        Ok(())
    }

    /// Set one value by key. Unknown keys are ignored.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "listen" => self.listen = value.to_string(),
            "base_path" => self.base_path = value.trim_matches('/').to_string(),
            "entry" => self.entry = PathBuf::from(value),
            "search_paths" => {
                self.search_paths = std::env::split_paths(value).collect();
            }
            "development" => {
                self.development = parse_bool(value)
                    .ok_or_else(|| HostError::Config(format!("invalid boolean for development: {value}")))?;
            }
            "database" => self.database = Some(PathBuf::from(value)),
            "templates" => self.templates = Some(PathBuf::from(value)),
            _ => tracing::debug!(key, "ignoring unknown config key"),
        }
        Ok(())
    }

    /// Reject configurations the server cannot start with
    pub fn validate(&self) -> Result<()> {
        if self.search_paths.is_empty() {
            return Err(HostError::Config("search_paths must not be empty".into()));
        }
        if self.base_path.contains('/') {
            return Err(HostError::Config(format!(
                "base_path must be a single path segment, got '{}'",
                self.base_path
            )));
        }
        Ok(())
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = HostConfig::default();
        assert_eq!(config.listen, "127.0.0.1:8080");
        assert_eq!(config.base_path, "app");
        assert_eq!(config.search_paths, vec![PathBuf::from(".")]);
        assert!(!config.development);
        config.validate().unwrap();
    }

    #[test]
    fn test_toml_keeps_missing_defaults() {
        let config = HostConfig::from_toml_str(
            r#"
            entry = "scripts/main.js"
            search_paths = ["scripts", "lib"]
            development = true
            "#,
        )
        .unwrap();
        assert_eq!(config.entry, PathBuf::from("scripts/main.js"));
        assert_eq!(config.search_paths.len(), 2);
        assert!(config.development);
        assert_eq!(config.base_path, "app");
    }

    #[test]
    fn test_env_overrides() {
        let mut config = HostConfig::default();
        config
            .load_from_env([
                ("SCRIPTVIEW_LISTEN".to_string(), "0.0.0.0:9000".to_string()),
                ("SCRIPTVIEW_DEVELOPMENT".to_string(), "yes".to_string()),
                ("SCRIPTVIEW_DATABASE".to_string(), "app.db".to_string()),
                ("HOME".to_string(), "/root".to_string()),
            ])
            .unwrap();
        assert_eq!(config.listen, "0.0.0.0:9000");
        assert!(config.development);
        assert_eq!(config.database, Some(PathBuf::from("app.db")));
    }

    #[test]
    fn test_invalid_boolean_is_an_error() {
        let mut config = HostConfig::default();
        assert!(matches!(
            config.set("development", "maybe"),
            Err(HostError::Config(_))
        ));
    }

    #[test]
    fn test_nested_base_path_is_rejected() {
        let config = HostConfig {
            base_path: "a/b".into(),
            ..HostConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
