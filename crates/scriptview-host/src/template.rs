// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Template rendering for `renderHTML`

use crate::error::{HostError, Result};
use serde_json::Value as Json;
use std::path::{Component, Path, PathBuf};

/// Renders a named template with a map of values
pub trait TemplateRenderer: Send + Sync {
    /// Render template `name`
    fn render(&self, name: &str, values: &Json) -> Result<String>;
}

/// Templates read from files under a root directory.
///
/// `{{ path.to.value }}` is replaced by the HTML-escaped value found by
/// walking `values`; missing paths render as nothing.
#[derive(Debug, Clone)]
pub struct DirectoryTemplates {
    root: PathBuf,
}

impl DirectoryTemplates {
    /// Templates under `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_of(&self, name: &str) -> Result<PathBuf> {
        let relative = Path::new(name);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes {
            return Err(HostError::Template(format!("invalid template name '{name}'")));
        }
        Ok(self.root.join(relative))
    }
}

impl TemplateRenderer for DirectoryTemplates {
    fn render(&self, name: &str, values: &Json) -> Result<String> {
        let path = self.path_of(name)?;
        let source = std::fs::read_to_string(&path)
            .map_err(|e| HostError::Template(format!("{}: {e}", path.display())))?;
        substitute(&source, values)
    }
}

/// Fill `{{ ... }}` placeholders of `source` from `values`
pub fn substitute(source: &str, values: &Json) -> Result<String> {
    let mut out = String::with_capacity(source.len());
    let mut rest = source;
    while let Some(open) = rest.find("{{") {
        out.push_str(&rest[..open]);
        let after = &rest[open + 2..];
        let Some(close) = after.find("}}") else {
            return Err(HostError::Template("unterminated '{{' placeholder".into()));
        };
        let key = after[..close].trim();
        if let Some(value) = lookup(values, key) {
            out.push_str(&escape_html(&plain_text(value)));
        }
        rest = &after[close + 2..];
    }
    out.push_str(rest);
    Ok(out)
}

fn lookup<'a>(values: &'a Json, key: &str) -> Option<&'a Json> {
    key.split('.').try_fold(values, |node, part| match node {
        Json::Object(map) => map.get(part),
        Json::Array(items) => part.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

fn plain_text(value: &Json) -> String {
    match value {
        Json::Null => String::new(),
        Json::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Escape text for an HTML body or attribute
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
