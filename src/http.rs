use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::bridge::{Coordinator, ResponseCache};
use crate::messages::{BridgeRequest, DispatchResult};

/// Upper bound on a caller-supplied request id.
pub const MAX_REQUEST_ID_LEN: usize = 128;
/// Upper bound on the bridged payload; keeps the JSON envelope within a
/// single datagram.
pub const MAX_PAYLOAD_BYTES: usize = 32 * 1024;

const TIMEOUT_ERROR: &str = "UDP response timeout. Retry with the same payload or request id.";

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<Coordinator>,
    pub cache: ResponseCache,
    pub request_timeout: Duration,
    pub request_id_header: String,
}

/// Build the bridge router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/bridge", post(dispatch_request))
        .route("/bridge/{request_id}", get(lookup_response))
        .route("/hc", get(health))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
pub struct BridgeHttpRequest {
    pub payload: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeHttpResponse {
    pub request_id: String,
    pub payload: String,
    pub from_cache: bool,
    pub received_at_utc: Option<DateTime<Utc>>,
}

impl From<DispatchResult> for BridgeHttpResponse {
    fn from(result: DispatchResult) -> Self {
        Self {
            request_id: result.request_id,
            payload: result.payload.unwrap_or_default(),
            from_cache: result.served_from_cache,
            received_at_utc: result.received_at,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeTimeoutResponse {
    pub request_id: String,
    pub error: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

async fn health() -> impl IntoResponse {
    Json(HealthResponse { status: "healthy" })
}

/// POST /bridge: validate, resolve the request id, run one bridge call.
async fn dispatch_request(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<BridgeHttpRequest>,
) -> Response {
    if body.payload.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "Payload must not be empty.");
    }
    if body.payload.len() > MAX_PAYLOAD_BYTES {
        return error_response(
            StatusCode::PAYLOAD_TOO_LARGE,
            "Payload exceeds the maximum size.",
        );
    }

    let request_id = match resolve_request_id(&headers, &state.request_id_header, &body.payload) {
        Ok(request_id) => request_id,
        Err(message) => return error_response(StatusCode::BAD_REQUEST, message),
    };

    let request = BridgeRequest::new(request_id, body.payload);
    match state
        .coordinator
        .dispatch(request, state.request_timeout)
        .await
    {
        Ok(result) if result.is_timeout => (
            StatusCode::GATEWAY_TIMEOUT,
            Json(BridgeTimeoutResponse {
                request_id: result.request_id,
                error: TIMEOUT_ERROR.to_string(),
            }),
        )
            .into_response(),
        Ok(result) => (StatusCode::OK, Json(BridgeHttpResponse::from(result))).into_response(),
        Err(_) => error_response(StatusCode::BAD_REQUEST, "Request id must not be empty."),
    }
}

/// GET /bridge/{request_id}: poll the response cache.
async fn lookup_response(
    State(state): State<AppState>,
    Path(request_id): Path<String>,
) -> Response {
    let request_id = request_id.trim();
    if request_id.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "Request id must not be empty.");
    }
    if let Err(message) = validate_request_id(request_id) {
        return error_response(StatusCode::BAD_REQUEST, message);
    }

    match state.cache.get(request_id) {
        Some(response) => (
            StatusCode::OK,
            Json(BridgeHttpResponse {
                request_id: response.request_id,
                payload: response.payload,
                from_cache: true,
                received_at_utc: Some(response.received_at),
            }),
        )
            .into_response(),
        None => error_response(StatusCode::NOT_FOUND, "Response not found."),
    }
}

/// Take the caller-supplied id from the configured header, or derive one from
/// the payload when absent.
fn resolve_request_id(
    headers: &HeaderMap,
    header_name: &str,
    payload: &str,
) -> Result<String, &'static str> {
    let supplied = headers
        .get(header_name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty());

    match supplied {
        Some(request_id) => {
            validate_request_id(request_id)?;
            Ok(request_id.to_string())
        }
        None => Ok(derive_request_id(payload)),
    }
}

/// Hardened id check: bounded length, restricted charset.
fn validate_request_id(request_id: &str) -> Result<(), &'static str> {
    if request_id.len() > MAX_REQUEST_ID_LEN {
        return Err("Request id exceeds the maximum length.");
    }
    if !request_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':'))
    {
        return Err("Request id contains invalid characters.");
    }
    Ok(())
}

/// Deterministic id for callers that do not supply one: SHA-256 of the
/// payload, so duplicate submissions of the same body correlate.
fn derive_request_id(payload: &str) -> String {
    let digest = Sha256::digest(payload.as_bytes());
    hex::encode_upper(digest)
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: message.to_string(),
        }),
    )
        .into_response()
}
