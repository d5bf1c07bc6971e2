// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Request context handed to bridge modules, the response it accumulates
//! and the process-wide HTTP session store

use crate::template::TemplateRenderer;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde_json::Value as Json;
use std::collections::HashMap;
use std::sync::Arc;

/// Builtin id carrying the request context. Scripts see an empty object.
pub const CONTEXT_ID: &str = "__context";

/// Cookie holding the HTTP session id
pub const SESSION_COOKIE: &str = "SCRIPTVIEW_SESSION";

/// Response produced by a script
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    /// HTTP status code
    pub status: u16,
    /// `Content-Type` header
    pub content_type: String,
    /// Body
    pub body: String,
    /// Extra headers
    pub headers: Vec<(String, String)>,
    /// `Set-Cookie` values
    pub set_cookies: Vec<String>,
}

impl Default for Response {
    fn default() -> Self {
        Self::new(200, "text/plain; charset=utf-8", String::new())
    }
}

impl Response {
    /// Response with no extra headers
    pub fn new(status: u16, content_type: &str, body: impl Into<String>) -> Self {
        Self {
            status,
            content_type: content_type.to_string(),
            body: body.into(),
            headers: Vec::new(),
            set_cookies: Vec::new(),
        }
    }

    /// `text/plain`
    pub fn text(status: u16, body: impl Into<String>) -> Self {
        Self::new(status, "text/plain; charset=utf-8", body)
    }

    /// `text/html`
    pub fn html(status: u16, body: impl Into<String>) -> Self {
        Self::new(status, "text/html; charset=utf-8", body)
    }

    /// `application/json`
    pub fn json(status: u16, body: impl Into<String>) -> Self {
        Self::new(status, "application/json", body)
    }

    /// 302 to `location`
    pub fn redirect(location: &str) -> Self {
        let mut response = Self::text(302, String::new());
        response.headers.push(("Location".to_string(), location.to_string()));
        response
    }

    /// Value of header `name`, case-insensitive
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Reason phrase for common status codes
pub fn status_text(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        204 => "No Content",
        301 => "Moved Permanently",
        302 => "Found",
        304 => "Not Modified",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        500 => "Internal Server Error",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        _ => "Unknown",
    }
}

/// HTTP session values keyed by session id
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: DashMap<String, HashMap<String, Json>>,
}

impl SessionStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a session and return its id
    pub fn create(&self) -> String {
        let id = uuid::Uuid::new_v4().to_string();
        self.sessions.insert(id.clone(), HashMap::new());
        tracing::debug!(session = %id, "http session created");
        id
    }

    /// Whether session `id` exists
    pub fn contains(&self, id: &str) -> bool {
        self.sessions.contains_key(id)
    }

    /// Value stored under `key`
    pub fn get(&self, id: &str, key: &str) -> Option<Json> {
        self.sessions.get(id)?.get(key).cloned()
    }

    /// Store `value` under `key`
    pub fn set(&self, id: &str, key: &str, value: Json) {
        self.sessions
            .entry(id.to_string())
            .or_default()
            .insert(key.to_string(), value);
    }

    /// Remove `key`, returning its value
    pub fn remove(&self, id: &str, key: &str) -> Option<Json> {
        self.sessions.get_mut(id)?.remove(key)
    }

    /// Number of live sessions
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether no session exists
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

/// Everything a script may learn about, or do to, the current request
pub struct RequestContext {
    method: String,
    url: String,
    remote_addr: String,
    query: HashMap<String, String>,
    form: HashMap<String, String>,
    sessions: Arc<SessionStore>,
    session_id: Mutex<Option<String>>,
    session_created: Mutex<bool>,
    response: Mutex<Option<Response>>,
    templates: Option<Arc<dyn TemplateRenderer>>,
}

impl RequestContext {
    /// Context for `method url` with no parameters and a private session store
    pub fn new(method: &str, url: &str) -> Self {
        Self {
            method: method.to_ascii_uppercase(),
            url: url.to_string(),
            remote_addr: String::new(),
            query: HashMap::new(),
            form: HashMap::new(),
            sessions: Arc::new(SessionStore::new()),
            session_id: Mutex::new(None),
            session_created: Mutex::new(false),
            response: Mutex::new(None),
            templates: None,
        }
    }

    /// Set the client address
    pub fn with_remote_addr(mut self, addr: impl Into<String>) -> Self {
        self.remote_addr = addr.into();
        self
    }

    /// Parse a URL query string
    pub fn with_query(mut self, query: &str) -> Self {
        self.query = parse_pairs(query.as_bytes());
        self
    }

    /// Parse an `application/x-www-form-urlencoded` body
    pub fn with_form(mut self, body: &[u8]) -> Self {
        self.form = parse_pairs(body);
        self
    }

    /// Attach the session store and the id sent by the client, if it is
    /// still known
    pub fn with_sessions(mut self, store: Arc<SessionStore>, cookie: Option<&str>) -> Self {
        let id = cookie.filter(|id| store.contains(id)).map(str::to_string);
        self.sessions = store;
        self.session_id = Mutex::new(id);
        self
    }

    /// Renderer used by `renderHTML`
    pub fn with_templates(mut self, templates: Option<Arc<dyn TemplateRenderer>>) -> Self {
        self.templates = templates;
        self
    }

    /// Upper-case HTTP method
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Request URL (path and query)
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Client address
    pub fn remote_addr(&self) -> &str {
        &self.remote_addr
    }

    /// Query parameter
    pub fn query_param(&self, key: &str) -> Option<&str> {
        self.query.get(key).map(String::as_str)
    }

    /// Posted form field
    pub fn form_value(&self, key: &str) -> Option<&str> {
        self.form.get(key).map(String::as_str)
    }

    /// Template renderer, if configured
    pub fn templates(&self) -> Option<&Arc<dyn TemplateRenderer>> {
        self.templates.as_ref()
    }

    /// Current session id, if the client has one
    pub fn session_id(&self) -> Option<String> {
        self.session_id.lock().clone()
    }

    /// Session value under `key`
    pub fn session_get(&self, key: &str) -> Option<Json> {
        let id = self.session_id.lock().clone()?;
        self.sessions.get(&id, key)
    }

    /// Store a session value, starting a session if needed
    pub fn session_set(&self, key: &str, value: Json) {
        let mut id = self.session_id.lock();
        let id = id.get_or_insert_with(|| {
            *self.session_created.lock() = true;
            self.sessions.create()
        });
        self.sessions.set(id, key, value);
    }

    /// Remove a session value
    pub fn session_remove(&self, key: &str) -> Option<Json> {
        let id = self.session_id.lock().clone()?;
        self.sessions.remove(&id, key)
    }

    /// Replace the pending response
    pub fn respond(&self, response: Response) {
        *self.response.lock() = Some(response);
    }

    /// Whether a script has produced a response
    pub fn has_response(&self) -> bool {
        self.response.lock().is_some()
    }

    /// Take the response, adding the session cookie when a session was
    /// started during this request
    pub fn take_response(&self) -> Response {
        let mut response = self.response.lock().take().unwrap_or_default();
        if *self.session_created.lock() {
            if let Some(id) = self.session_id.lock().as_deref() {
                response
                    .set_cookies
                    .push(format!("{SESSION_COOKIE}={id}; Path=/; HttpOnly"));
            }
        }
        response
    }
}

impl std::fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestContext")
            .field("method", &self.method)
            .field("url", &self.url)
            .field("remote_addr", &self.remote_addr)
            .finish_non_exhaustive()
    }
}

/// Repeated keys keep their first value
fn parse_pairs(input: &[u8]) -> HashMap<String, String> {
    let mut pairs = HashMap::new();
    for (key, value) in url::form_urlencoded::parse(input).into_owned() {
        pairs.entry(key).or_insert(value);
    }
    pairs
}

/// Session id from a `Cookie` header value
pub fn session_cookie(header: &str) -> Option<&str> {
    header
        .split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parameters() {
        let ctx = RequestContext::new("post", "/app/x?name=a%20b")
            .with_query("name=a%20b&n=1")
            .with_form(b"title=hello+world");
        assert_eq!(ctx.method(), "POST");
        assert_eq!(ctx.query_param("name"), Some("a b"));
        assert_eq!(ctx.query_param("missing"), None);
        assert_eq!(ctx.form_value("title"), Some("hello world"));
    }

    #[test]
    fn test_repeated_keys_keep_first_value() {
        let ctx = RequestContext::new("post", "/app?tag=a&tag=b")
            .with_query("tag=a&tag=b")
            .with_form(b"tag=x&tag=y&tag=z");
        assert_eq!(ctx.query_param("tag"), Some("a"));
        assert_eq!(ctx.form_value("tag"), Some("x"));
    }

    #[test]
    fn test_session_started_on_first_write() {
        let store = Arc::new(SessionStore::new());
        let ctx = RequestContext::new("GET", "/").with_sessions(Arc::clone(&store), None);
        assert_eq!(ctx.session_get("user"), None);

        ctx.session_set("user", json!("ann"));
        let id = ctx.session_id().unwrap();
        assert_eq!(store.get(&id, "user"), Some(json!("ann")));

        let response = ctx.take_response();
        assert_eq!(response.status, 200);
        assert_eq!(response.set_cookies.len(), 1);
        assert!(response.set_cookies[0].starts_with("SCRIPTVIEW_SESSION="));

        let again = RequestContext::new("GET", "/").with_sessions(Arc::clone(&store), Some(&id));
        assert_eq!(again.session_remove("user"), Some(json!("ann")));
        assert!(again.take_response().set_cookies.is_empty());
    }

    #[test]
    fn test_unknown_cookie_is_ignored() {
        let store = Arc::new(SessionStore::new());
        let ctx = RequestContext::new("GET", "/").with_sessions(store, Some("stale"));
        assert_eq!(ctx.session_id(), None);
    }

    #[test]
    fn test_session_cookie_header() {
        assert_eq!(session_cookie("a=1; SCRIPTVIEW_SESSION=abc; b=2"), Some("abc"));
        assert_eq!(session_cookie("a=1"), None);
    }

    #[test]
    fn test_redirect() {
        let response = Response::redirect("/login");
        assert_eq!(response.status, 302);
        assert_eq!(response.header("location"), Some("/login"));
        assert_eq!(status_text(302), "Found");
    }
}
