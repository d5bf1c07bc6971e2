// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! HTTP server mounting one script view
//!
//! Every request under the view's base path is handed to the view on a
//! blocking worker thread, since script environments never leave the
//! thread that created them. Other paths answer 404.

use crate::context::{self, RequestContext, SessionStore};
use crate::error::{HostError, Result};
use crate::view::RequestScriptView;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::header::{CONTENT_TYPE, COOKIE, HeaderValue, LOCATION, SET_COOKIE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, StatusCode};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

type HttpResponse = hyper::Response<Full<Bytes>>;

/// Serves a [`RequestScriptView`]
#[derive(Debug, Clone)]
pub struct Server {
    view: Arc<RequestScriptView>,
    sessions: Arc<SessionStore>,
}

impl Server {
    /// Server for `view` with an empty session store
    pub fn new(view: Arc<RequestScriptView>) -> Self {
        Self {
            view,
            sessions: Arc::new(SessionStore::new()),
        }
    }

    /// Mounted view
    pub fn view(&self) -> &Arc<RequestScriptView> {
        &self.view
    }

    /// Bind `addr` and serve until the task is dropped
    pub async fn run(self, addr: &str) -> Result<()> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| HostError::Http(format!("failed to bind {addr}: {e}")))?;
        self.serve(listener).await
    }

    /// Accept connections from `listener` forever
    pub async fn serve(self, listener: TcpListener) -> Result<()> {
        let local = listener
            .local_addr()
            .map_err(|e| HostError::Http(e.to_string()))?;
        tracing::info!(
            addr = %local,
            base_path = %self.view.base_path(),
            development = self.view.is_development(),
            "listening"
        );

        loop {
            let (stream, remote) = match listener.accept().await {
                Ok(conn) => conn,
                Err(e) => {
                    tracing::warn!(error = %e, "accept failed");
                    continue;
                }
            };
            let server = self.clone();
            tokio::spawn(async move {
                let service = service_fn(move |req| {
                    let server = server.clone();
                    async move { Ok::<_, Infallible>(server.handle(req, remote).await) }
                });
                if let Err(e) = http1::Builder::new()
                    .serve_connection(TokioIo::new(stream), service)
                    .await
                {
                    tracing::debug!(remote = %remote, error = %e, "connection closed with error");
                }
            });
        }
    }

    async fn handle(&self, req: Request<Incoming>, remote: SocketAddr) -> HttpResponse {
        let uri = req.uri().clone();
        let Some(tail) = self.view.route_tail(uri.path()) else {
            return plain(StatusCode::NOT_FOUND, "not found");
        };

        let method = req.method().as_str().to_string();
        let cookie = req
            .headers()
            .get(COOKIE)
            .and_then(|v| v.to_str().ok())
            .and_then(context::session_cookie)
            .map(str::to_string);
        let is_form = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("application/x-www-form-urlencoded"));

        let body = match req.into_body().collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) => {
                tracing::warn!(error = %e, "failed to read request body");
                return plain(StatusCode::BAD_REQUEST, "unreadable request body");
            }
        };

        let form: &[u8] = if is_form { &body } else { &[] };
        let request = RequestContext::new(&method, &uri.to_string())
            .with_remote_addr(remote.to_string())
            .with_query(uri.query().unwrap_or_default())
            .with_form(form)
            .with_sessions(Arc::clone(&self.sessions), cookie.as_deref());

        let view = Arc::clone(&self.view);
        let started = std::time::Instant::now();
        let response = tokio::task::spawn_blocking(move || view.handle_request(request, &tail)).await;
        match response {
            Ok(response) => {
                tracing::debug!(
                    method = %method,
                    path = uri.path(),
                    status = response.status,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "request handled"
                );
                into_http(response)
            }
            Err(e) => {
                tracing::error!(error = %e, "script worker panicked");
                plain(StatusCode::INTERNAL_SERVER_ERROR, "script worker failed")
            }
        }
    }
}

fn plain(status: StatusCode, body: &'static str) -> HttpResponse {
    let mut response = hyper::Response::new(Full::new(Bytes::from_static(body.as_bytes())));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"));
    response
}

/// Convert a script response into an HTTP response; invalid headers are
/// dropped with a warning
pub fn into_http(response: context::Response) -> HttpResponse {
    let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let mut http = hyper::Response::new(Full::new(Bytes::from(response.body)));
    *http.status_mut() = status;

    let headers = http.headers_mut();
    if let Ok(value) = HeaderValue::from_str(&response.content_type) {
        headers.insert(CONTENT_TYPE, value);
    }
    for (name, value) in &response.headers {
        let name = if name.eq_ignore_ascii_case("location") {
            LOCATION
        } else {
            match hyper::header::HeaderName::from_bytes(name.as_bytes()) {
                Ok(name) => name,
                Err(_) => {
                    tracing::warn!(header = %name, "dropping invalid header name");
                    continue;
                }
            }
        };
        match HeaderValue::from_str(value) {
            Ok(value) => {
                headers.append(name, value);
            }
            Err(_) => tracing::warn!(header = %name, "dropping invalid header value"),
        }
    }
    for cookie in &response.set_cookies {
        if let Ok(value) = HeaderValue::from_str(cookie) {
            headers.append(SET_COOKIE, value);
        }
    }
    http
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_into_http() {
        let mut response = context::Response::redirect("/login");
        response.set_cookies.push("a=b".into());
        let http = into_http(response);
        assert_eq!(http.status(), StatusCode::FOUND);
        assert_eq!(http.headers().get(LOCATION).unwrap(), "/login");
        assert_eq!(http.headers().get(SET_COOKIE).unwrap(), "a=b");
    }
}
