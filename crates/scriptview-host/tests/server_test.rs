//! End-to-end HTTP tests over a raw TCP connection

use scriptview_host::{RequestScriptView, ScriptLoader, Server};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

async fn start(entry: &str) -> (tempfile::TempDir, SocketAddr) {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("index.js"), entry).unwrap();
    let loader = Arc::new(ScriptLoader::new([dir.path()], false).unwrap());
    let view = Arc::new(RequestScriptView::new(loader, "index.js").with_base_path("app"));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(Server::new(view).serve(listener));
    (dir, addr)
}

async fn send(addr: SocketAddr, request: &str) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(request.as_bytes()).await.unwrap();
    let mut response = Vec::new();
    stream.read_to_end(&mut response).await.unwrap();
    String::from_utf8(response).unwrap()
}

#[tokio::test]
async fn test_get_under_base_path() {
    let (_dir, addr) = start(
        "var web = require('web'); web.renderText('hello %s at %s', web.$GET('name'), require('routePath'));",
    )
    .await;
    let response = send(
        addr,
        "GET /app/greet?name=ann HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
    )
    .await;
    assert!(response.starts_with("HTTP/1.1 200 OK"), "{response}");
    assert!(response.ends_with("hello ann at greet"), "{response}");
}

#[tokio::test]
async fn test_post_form_and_session_cookie() {
    let (_dir, addr) = start(
        "var web = require('web'); web.$SESSION('user', web.$POST('user')); web.renderText(web.$METHOD());",
    )
    .await;
    let body = "user=ann";
    let request = format!(
        "POST /app HTTP/1.1\r\nHost: localhost\r\nContent-Type: application/x-www-form-urlencoded\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    let response = send(addr, &request).await;
    assert!(response.starts_with("HTTP/1.1 200 OK"), "{response}");
    assert!(response.to_ascii_lowercase().contains("set-cookie: scriptview_session="), "{response}");
    assert!(response.ends_with("POST"), "{response}");
}

#[tokio::test]
async fn test_outside_base_path_is_404() {
    let (_dir, addr) = start("require('web').renderText('unreachable');").await;
    let response = send(
        addr,
        "GET /elsewhere HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
    )
    .await;
    assert!(response.starts_with("HTTP/1.1 404 Not Found"), "{response}");
}

#[tokio::test]
async fn test_script_failure_is_500() {
    let (_dir, addr) = start("throw new Error('kaput');").await;
    let response = send(
        addr,
        "GET /app HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
    )
    .await;
    assert!(response.starts_with("HTTP/1.1 500 Internal Server Error"), "{response}");
    assert!(response.ends_with("Error: kaput"), "{response}");
}

#[tokio::test]
async fn test_redirect_header() {
    let (_dir, addr) = start("require('web').Redirect('/app/login');").await;
    let response = send(
        addr,
        "GET /app HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
    )
    .await;
    assert!(response.starts_with("HTTP/1.1 302 Found"), "{response}");
    assert!(response.to_ascii_lowercase().contains("location: /app/login"), "{response}");
}
