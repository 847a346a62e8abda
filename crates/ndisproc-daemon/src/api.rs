//! REST API handlers
//!
//! Entries are addressed by their path below the root namespace, so
//! `GET /api/proc/wlan0/settings` reads the settings entry of `wlan0` and
//! `PUT /api/proc/debug` writes the debug level.

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, HeaderName, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use ndisproc_procfs::{ProcError, PAGE_SIZE, ROOT_NAME};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::state::AppState;

/// API error response
#[derive(Serialize)]
struct ApiError {
    error: String,
    errno: i32,
}

impl ApiError {
    fn response(status: StatusCode, msg: impl Into<String>, errno: i32) -> Response {
        (
            status,
            Json(Self {
                error: msg.into(),
                errno,
            }),
        )
            .into_response()
    }
}

fn status_for(e: &ProcError) -> StatusCode {
    match e {
        ProcError::InputTooLong { .. }
        | ProcError::InvalidInput(_)
        | ProcError::MissingArgument(_)
        | ProcError::OutOfRange { .. }
        | ProcError::UnknownSetting(_)
        | ProcError::ValueTooLong { .. } => StatusCode::BAD_REQUEST,
        ProcError::PermissionDenied(_) => StatusCode::FORBIDDEN,
        ProcError::NotFound(_) => StatusCode::NOT_FOUND,
        ProcError::Removed(_) => StatusCode::GONE,
        ProcError::AlreadyExists(_) => StatusCode::CONFLICT,
        ProcError::Hardware { .. } | ProcError::NoPnpHandler => StatusCode::BAD_GATEWAY,
        ProcError::NoRoot | ProcError::EntryLimit(_) => StatusCode::INSUFFICIENT_STORAGE,
    }
}

impl IntoResponse for ProcErrorResponse {
    fn into_response(self) -> Response {
        ApiError::response(status_for(&self.0), self.0.to_string(), self.0.errno())
    }
}

/// Wrapper so endpoint errors can be returned from handlers
struct ProcErrorResponse(ProcError);

fn join_failed(e: tokio::task::JoinError) -> Response {
    error!(error = %e, "Endpoint task failed");
    ApiError::response(StatusCode::INTERNAL_SERVER_ERROR, "Endpoint task failed", 0)
}

/// Namespace overview
pub async fn list_namespace(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "root": ROOT_NAME,
        "present": state.registry.has_root(),
        "debug": state.registry.has_root() && state.config.procfs.debug_entry,
        "devices": state.devices(),
    }))
}

/// Read parameters
#[derive(Debug, Deserialize)]
pub struct ReadParams {
    /// Byte offset of the read; anything but 0 yields end of file
    #[serde(default)]
    offset: u64,
    /// Buffer size the client offers
    #[serde(default = "default_capacity")]
    capacity: usize,
}

fn default_capacity() -> usize {
    PAGE_SIZE
}

/// Read an entry as text
pub async fn read_entry(
    State(state): State<Arc<AppState>>,
    Path(path): Path<String>,
    Query(params): Query<ReadParams>,
) -> Response {
    let registry = state.registry.clone();
    let entry = path.clone();
    let result = tokio::task::spawn_blocking(move || {
        registry.read(&entry, params.offset, params.capacity)
    })
    .await;

    match result {
        Ok(Ok(read)) => {
            debug!(path = %path, bytes = read.data.len(), "Entry read");
            let truncated = if read.truncated { "true" } else { "false" };
            (
                StatusCode::OK,
                [
                    (header::CONTENT_TYPE, "text/plain; charset=utf-8"),
                    (HeaderName::from_static("x-truncated"), truncated),
                ],
                read.data,
            )
                .into_response()
        }
        Ok(Err(e)) => ProcErrorResponse(e).into_response(),
        Err(e) => join_failed(e),
    }
}

/// Write raw bytes to an entry
pub async fn write_entry(
    State(state): State<Arc<AppState>>,
    Path(path): Path<String>,
    body: Bytes,
) -> Response {
    let registry = state.registry.clone();
    let entry = path.clone();
    let result = tokio::task::spawn_blocking(move || registry.write(&entry, &body)).await;

    match result {
        Ok(Ok(written)) => {
            debug!(path = %path, written, "Entry written");
            Json(serde_json::json!({ "written": written })).into_response()
        }
        Ok(Err(e)) => ProcErrorResponse(e).into_response(),
        Err(e) => join_failed(e),
    }
}

/// Stop a device and remove its endpoints
pub async fn remove_device(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Response {
    info!(device = %name, "Remove device requested");

    let target = name.clone();
    let removed = tokio::task::spawn_blocking(move || state.remove_device(&target)).await;
    match removed {
        Ok(true) => Json(serde_json::json!({
            "status": "removed",
            "device": name
        }))
        .into_response(),
        Ok(false) => ProcErrorResponse(ProcError::NotFound(name)).into_response(),
        Err(e) => join_failed(e),
    }
}
