//! Request views and the web, utils and logger bridges

use scriptview_host::{
    Builtin, DirectoryTemplates, RequestContext, RequestScriptView, Response, ScriptLoader, SessionStore,
};
use serde_json::{Value as Json, json};
use std::fs::File;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tempfile::TempDir;

fn view_with(entry: &str, development: bool) -> (TempDir, RequestScriptView) {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("index.js"), entry).unwrap();
    let loader = Arc::new(ScriptLoader::new([dir.path()], development).unwrap());
    let view = RequestScriptView::new(loader, "index.js").with_base_path("app");
    (dir, view)
}

fn get(view: &RequestScriptView, query: &str) -> Response {
    let request = RequestContext::new("get", &format!("/app?{query}")).with_query(query);
    view.handle_request(request, "")
}

fn json_body(response: &Response) -> Json {
    serde_json::from_str(&response.body).unwrap()
}

fn touch_later(path: &Path) {
    File::options()
        .write(true)
        .open(path)
        .unwrap()
        .set_modified(SystemTime::now() + Duration::from_secs(5))
        .unwrap();
}

#[test]
fn test_render_text_with_status_and_format() {
    let (_dir, view) = view_with(
        "var web = require('web'); web.renderText(201, 'hello %s', web.$GET('name'));",
        false,
    );
    let response = get(&view, "name=ann");
    assert_eq!(response.status, 201);
    assert_eq!(response.body, "hello ann");
    assert!(response.content_type.starts_with("text/plain"));
}

#[test]
fn test_request_introspection() {
    let (_dir, view) = view_with(
        "var web = require('web');
         web.renderJSON({
           missing: web.$GET('x'),
           title: web.$POST('title'),
           method: web.$METHOD(),
           addr: web.$REMOTE_ADDR(),
           url: web.$URL(),
           route: require('routePath')
         });",
        false,
    );
    let request = RequestContext::new("post", "/app/items/3")
        .with_remote_addr("10.0.0.1:5000")
        .with_form(b"title=Hi+there");
    let response = view.handle_request(request, "items/3");
    assert_eq!(response.status, 200);
    assert_eq!(response.content_type, "application/json");
    assert_eq!(
        json_body(&response),
        json!({
            "missing": null,
            "title": "Hi there",
            "method": "POST",
            "addr": "10.0.0.1:5000",
            "url": "/app/items/3",
            "route": "items/3"
        })
    );
}

#[test]
fn test_render_json_with_status() {
    let (_dir, view) = view_with("require('web').renderJSON(404, {error: 'missing'});", false);
    let response = get(&view, "");
    assert_eq!(response.status, 404);
    assert_eq!(json_body(&response), json!({"error": "missing"}));
}

#[test]
fn test_render_html_template() {
    let (dir, view) = view_with(
        "require('web').renderHTML('page.html', {user: {name: require('web').$GET('name')}});",
        false,
    );
    let templates = dir.path().join("templates");
    std::fs::create_dir(&templates).unwrap();
    std::fs::write(templates.join("page.html"), "<h1>{{ user.name }}</h1>").unwrap();
    let view = view.with_templates(Arc::new(DirectoryTemplates::new(&templates)));

    let response = get(&view, "name=%3Cann%3E");
    assert_eq!(response.status, 200);
    assert!(response.content_type.starts_with("text/html"));
    assert_eq!(response.body, "<h1>&lt;ann&gt;</h1>");
}

#[test]
fn test_redirect() {
    let (_dir, view) = view_with("require('web').Redirect('/login');", false);
    let response = get(&view, "");
    assert_eq!(response.status, 302);
    assert_eq!(response.header("Location"), Some("/login"));
}

#[test]
fn test_session_round_trip() {
    let (_dir, view) = view_with(
        "var web = require('web');
         var visits = (web.$SESSION('visits') || 0) + 1;
         web.$SESSION('visits', visits);
         if (visits > 2) { web.$SESSION('visits', null); }
         web.renderText('%d', visits);",
        false,
    );
    let store = Arc::new(SessionStore::new());

    let first = view.handle_request(
        RequestContext::new("GET", "/app").with_sessions(Arc::clone(&store), None),
        "",
    );
    assert_eq!(first.body, "1");
    let cookie = first.set_cookies[0].clone();
    let id = cookie
        .strip_prefix("SCRIPTVIEW_SESSION=")
        .and_then(|rest| rest.split(';').next())
        .unwrap()
        .to_string();

    let second = view.handle_request(
        RequestContext::new("GET", "/app").with_sessions(Arc::clone(&store), Some(&id)),
        "",
    );
    assert_eq!(second.body, "2");
    assert!(second.set_cookies.is_empty());

    let third = view.handle_request(
        RequestContext::new("GET", "/app").with_sessions(Arc::clone(&store), Some(&id)),
        "",
    );
    assert_eq!(third.body, "3");
    assert_eq!(store.get(&id, "visits"), None);
}

#[test]
fn test_utils_module() {
    let (_dir, view) = view_with(
        "var utils = require('utils');
         require('web').renderJSON([
           utils.md5('abc'),
           utils.MD5('abc'),
           utils.sha256('abc').slice(0, 8),
           utils.SHA256('abc').slice(0, 8),
           utils.sprintf('%d-%s', 3.9, 'x', 'extra'),
           utils.md5(123)
         ]);",
        false,
    );
    let response = get(&view, "");
    assert_eq!(
        json_body(&response),
        json!([
            "900150983cd24fb0d6963f7d28e17f72",
            "900150983CD24FB0D6963F7D28E17F72",
            "ba7816bf",
            "BA7816BF",
            "3-x extra",
            "202cb962ac59075b964b07152d234b70"
        ])
    );
}

#[test]
fn test_logger_module() {
    let (_dir, view) = view_with(
        "var logger = require('logger');
         logger.debug('starting %s', 'up');
         logger.info('count %d', 3);
         logger.error({code: 1});
         require('web').renderText('logged');",
        false,
    );
    assert_eq!(get(&view, "").body, "logged");
}

#[test]
fn test_bridge_type_errors_abort_the_script() {
    let (_dir, view) = view_with("require('web').$GET(5);", false);
    let response = get(&view, "");
    assert_eq!(response.status, 500);
    assert!(response.body.starts_with("TypeError:"), "{}", response.body);
}

#[test]
fn test_script_can_catch_bridge_errors() {
    let (_dir, view) = view_with(
        "var web = require('web');
         try { require('utils').md5(); } catch (e) { web.renderText(e.name); }",
        false,
    );
    assert_eq!(get(&view, "").body, "TypeError");
}

#[test]
fn test_no_render_is_an_empty_ok() {
    let (_dir, view) = view_with("var x = 1;", false);
    let response = get(&view, "");
    assert_eq!(response.status, 200);
    assert_eq!(response.body, "");
}

#[test]
fn test_thrown_error_becomes_500() {
    let (_dir, view) = view_with("throw new Error('boom');", false);
    let response = get(&view, "");
    assert_eq!(response.status, 500);
    assert_eq!(response.body, "Error: boom");
}

#[test]
fn test_syntax_error_becomes_500() {
    let (_dir, view) = view_with("function (", false);
    let response = get(&view, "");
    assert_eq!(response.status, 500);
    assert!(response.body.contains("SyntaxError"), "{}", response.body);
}

#[test]
fn test_view_modules_are_installed() {
    let (_dir, view) = view_with("require('web').renderText(require('settings').greeting);", false);
    let view = view.with_module("settings", Builtin::data(json!({"greeting": "hey"})));
    assert_eq!(get(&view, "").body, "hey");
}

#[test]
fn test_development_recompiles_changed_entry() {
    let (dir, view) = view_with("require('web').renderText('v1');", true);
    assert_eq!(get(&view, "").body, "v1");
    assert_eq!(get(&view, "").body, "v1");
    assert_eq!(view.compile_count(), 1);

    let entry = dir.path().join("index.js");
    std::fs::write(&entry, "require('web').renderText('v2');").unwrap();
    touch_later(&entry);
    assert_eq!(get(&view, "").body, "v2");
    assert_eq!(view.compile_count(), 2);
}

#[test]
fn test_production_keeps_first_entry() {
    let (dir, view) = view_with("require('web').renderText('v1');", false);
    assert_eq!(get(&view, "").body, "v1");

    let entry = dir.path().join("index.js");
    std::fs::write(&entry, "require('web').renderText('v2');").unwrap();
    touch_later(&entry);
    assert_eq!(get(&view, "").body, "v1");
    assert_eq!(view.compile_count(), 1);
}

#[test]
fn test_environments_do_not_share_state() {
    let (_dir, view) = view_with(
        "globalThis.n = (globalThis.n || 0) + 1; require('web').renderText('%d', globalThis.n);",
        false,
    );
    assert_eq!(get(&view, "").body, "1");
    assert_eq!(get(&view, "").body, "1");
}
