//! Route handlers.

use crate::bridge::AppState;
use crate::error::ApiError;
use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    http::{HeaderName, HeaderValue, header},
    response::{
        IntoResponse, Response,
        sse::{Event, KeepAlive, Sse},
    },
};
use claude_gateway_core::{InvocationRequest, OutputEvent};
use futures::StreamExt;
use serde::Serialize;
use serde_json::{Value, json};
use std::{convert::Infallible, sync::Arc};
use tracing::{debug, error, info, warn};

pub const PROCESS_ID_HEADER: &str = "x-process-id";

pub async fn root() -> Json<Value> {
    Json(json!({
        "message": "Claude Code API Gateway",
        "docs": "/docs",
        "health": "/health",
    }))
}

pub async fn docs() -> Json<Value> {
    Json(json!({
        "endpoints": [
            { "method": "GET", "path": "/health", "auth": false, "description": "Service status and Claude Code version" },
            { "method": "POST", "path": "/chat", "auth": true, "description": "Run Claude Code and stream its stream-json output as SSE; X-Process-ID carries the id" },
            { "method": "DELETE", "path": "/chat/{process_id}", "auth": true, "description": "Cancel a running invocation" },
            { "method": "GET", "path": "/processes", "auth": true, "description": "List running invocations" },
        ],
        "sse_events": ["message", "done", "error", "cancelled"],
    }))
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub claude_path: String,
    pub claude_version: String,
}

pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    debug!("Health check requested");
    Json(HealthResponse {
        status: "ok",
        claude_path: state.agent.path.display().to_string(),
        claude_version: state.agent.version.clone(),
    })
}

/// Frame one output event for the wire.
pub fn sse_event(event: OutputEvent) -> Event {
    match event {
        OutputEvent::Line(line) => {
            // SSE fields cannot carry bare carriage returns.
            let data = if line.contains('\r') {
                line.replace('\r', "")
            } else {
                line
            };
            Event::default().event("message").data(data)
        }
        OutputEvent::Done { id } => Event::default()
            .event("done")
            .data(json!({ "process_id": id }).to_string()),
        OutputEvent::Error { message } => Event::default()
            .event("error")
            .data(json!({ "error": message }).to_string()),
        OutputEvent::Cancelled { id } => Event::default()
            .event("cancelled")
            .data(json!({ "process_id": id }).to_string()),
    }
}

pub async fn chat(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<InvocationRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(request) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    debug!(
        cwd = %request.cwd.display(),
        model = ?request.model,
        session_id = ?request.session_id,
        prompt_chars = request.prompt.chars().count(),
        "Chat request"
    );

    match tokio::fs::metadata(&request.cwd).await {
        Ok(meta) if meta.is_dir() => {}
        Ok(_) => {
            error!("Path is not a directory: {}", request.cwd.display());
            return Err(ApiError::BadRequest(format!(
                "Path is not a directory: {}",
                request.cwd.display()
            )));
        }
        Err(_) => {
            error!("Directory does not exist: {}", request.cwd.display());
            return Err(ApiError::BadRequest(format!(
                "Directory does not exist: {}",
                request.cwd.display()
            )));
        }
    }

    let (process_id, output) = state.gateway.start_invocation(&request).await?;
    info!(process_id = %process_id, "Started invocation");

    let events = output.map(|event| Ok::<_, Infallible>(sse_event(event)));
    let mut response = Sse::new(events)
        .keep_alive(KeepAlive::default())
        .into_response();

    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(&process_id) {
        headers.insert(HeaderName::from_static(PROCESS_ID_HEADER), value);
    }
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(
        HeaderName::from_static("x-accel-buffering"),
        HeaderValue::from_static("no"),
    );
    Ok(response)
}

pub async fn cancel_chat(
    State(state): State<Arc<AppState>>,
    Path(process_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    info!(process_id = %process_id, "Cancel requested");

    if !state.gateway.cancel_invocation(&process_id).await {
        warn!(process_id = %process_id, "Process not found");
        return Err(ApiError::NotFound(format!(
            "Process not found: {process_id}"
        )));
    }

    info!(process_id = %process_id, "Process cancelled");
    Ok(Json(json!({
        "status": "cancelled",
        "process_id": process_id,
    })))
}

pub async fn list_processes(State(state): State<Arc<AppState>>) -> Json<Value> {
    let processes = state.gateway.list_invocations();
    debug!(count = processes.len(), "Returning active processes");
    Json(json!({
        "count": processes.len(),
        "processes": processes,
    }))
}

