//! Shared helpers for HTTP tests: an in-process router wired to a `/bin/sh`
//! stand-in for the agent.

// rustc can't see usage across test crates
#![allow(dead_code)]

use axum::{
    Router,
    body::Body,
    http::{Request, Response, header},
};
use base64::{Engine, engine::general_purpose::STANDARD};
use claude_gateway::{AgentBinary, AppState, Credentials, ServerConfig, build_router};
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tower::ServiceExt;

pub const USER: &str = "admin";
pub const PASSWORD: &str = "s3cret";
pub const TEST_TIMEOUT: Duration = Duration::from_secs(10);

pub struct TestApp {
    pub router: Router,
    pub state: Arc<AppState>,
    pub dir: TempDir,
}

impl TestApp {
    /// `body` is the stand-in agent's shell script minus the shebang.
    pub fn new(body: &str) -> Self {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("claude");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        Self::with_agent(dir, path)
    }

    pub fn with_agent(dir: TempDir, path: PathBuf) -> Self {
        let config = ServerConfig {
            bind_addr: "127.0.0.1:0".into(),
            credentials: Credentials::new(USER, PASSWORD),
            agent: AgentBinary {
                path,
                version: "1.0.0 (test)".into(),
            },
            max_line_bytes: 1024 * 1024,
        };
        let state = Arc::new(AppState::new(&config));
        let router = build_router(state.clone());
        Self { router, state, dir }
    }

    pub fn workdir(&self) -> String {
        self.dir.path().display().to_string()
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        tokio::time::timeout(TEST_TIMEOUT, self.router.clone().oneshot(request))
            .await
            .expect("request timed out")
            .expect("router is infallible")
    }
}

pub fn basic_auth(user: &str, password: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{user}:{password}")))
}

pub fn authed(method: &str, uri: &str) -> axum::http::request::Builder {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, basic_auth(USER, PASSWORD))
}

pub fn chat_request(json: serde_json::Value) -> Request<Body> {
    authed("POST", "/chat")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(json.to_string()))
        .unwrap()
}

pub async fn body_text(response: Response<Body>) -> String {
    let bytes = tokio::time::timeout(
        TEST_TIMEOUT,
        axum::body::to_bytes(response.into_body(), usize::MAX),
    )
    .await
    .expect("body did not finish")
    .expect("body read failed");
    String::from_utf8(bytes.to_vec()).unwrap()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    serde_json::from_str(&body_text(response).await).expect("JSON body")
}

/// `(event, data)` pairs from an SSE body, ignoring keep-alive comments.
pub fn sse_events(text: &str) -> Vec<(String, String)> {
    text.split("\n\n")
        .filter_map(|block| {
            let mut event = None;
            let mut data = Vec::new();
            for line in block.lines() {
                if let Some(v) = line.strip_prefix("event:") {
                    event = Some(v.trim().to_string());
                } else if let Some(v) = line.strip_prefix("data:") {
                    data.push(v.strip_prefix(' ').unwrap_or(v).to_string());
                }
            }
            event.map(|e| (e, data.join("\n")))
        })
        .collect()
}
