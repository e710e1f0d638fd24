//! HTTP API: the wallet-facing validation endpoint plus the mesh endpoints
//! other nodes call.

use std::net::SocketAddr;
use std::sync::Arc;

use antifraud_core::ValidationRequest;
use antifraud_mesh::protocol::{DEFAULT_HANDSHAKE_PATH, DEFAULT_SIGNAL_PATH, VALIDATE_PATH};
use antifraud_mesh::{HandshakeRequest, MeshError, MeshResponder, SecureEnvelope};
use antifraud_validator::{TransactionValidator, ValidatorError};
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::json;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

/// Message returned for requests that cannot be validated.
pub const INVALID_REQUEST_MESSAGE: &str =
    "Solicitud inválida. Incluye dirección, monto y tarifa.";

/// Shared state for the API server.
pub struct ApiState {
    pub validator: TransactionValidator,
    pub responder: MeshResponder,
}

fn error_body(status: StatusCode, message: &str, detail: Option<String>) -> Response {
    let body = match detail {
        Some(detail) => json!({ "error": message, "detail": detail }),
        None => json!({ "error": message }),
    };
    (status, Json(body)).into_response()
}

/// Mesh callers are unauthenticated; they only get the error class.
fn mesh_error(err: &MeshError) -> Response {
    match err {
        MeshError::Authentication(_) => {
            error_body(StatusCode::UNAUTHORIZED, "authentication failed", None)
        }
        MeshError::Protocol(_) => {
            error_body(StatusCode::BAD_REQUEST, "malformed mesh message", None)
        }
        _ => error_body(StatusCode::INTERNAL_SERVER_ERROR, "mesh error", None),
    }
}

/// Validates a transaction candidate from the wallet.
async fn validate(State(state): State<Arc<ApiState>>, body: Bytes) -> Response {
    // An unparseable body is treated like an empty request.
    let request: ValidationRequest = serde_json::from_slice(&body).unwrap_or_default();

    match state.validator.validate(request).await {
        Ok(result) => Json(result).into_response(),
        Err(ValidatorError::InvalidRequest(detail)) => {
            error_body(StatusCode::BAD_REQUEST, INVALID_REQUEST_MESSAGE, Some(detail))
        }
        Err(other) => error_body(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Error antifraude",
            Some(other.to_string()),
        ),
    }
}

/// Answers a mesh handshake with this node's public keys.
async fn handshake(State(state): State<Arc<ApiState>>, body: Bytes) -> Response {
    let request: HandshakeRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            debug!("Malformed handshake: {}", e);
            return error_body(StatusCode::BAD_REQUEST, "malformed handshake", None);
        }
    };
    match state.responder.handle_handshake(&request) {
        Ok(reply) => Json(reply).into_response(),
        Err(e) => {
            warn!("Rejected handshake from {}: {}", request.from_id, e);
            mesh_error(&e)
        }
    }
}

/// Scores a sealed signal request and returns a sealed signal.
async fn signal(State(state): State<Arc<ApiState>>, body: Bytes) -> Response {
    let envelope: SecureEnvelope = match serde_json::from_slice(&body) {
        Ok(envelope) => envelope,
        Err(e) => {
            debug!("Malformed envelope: {}", e);
            return error_body(StatusCode::BAD_REQUEST, "malformed envelope", None);
        }
    };
    match state.responder.handle_signal(&envelope) {
        Ok(reply) => Json(reply).into_response(),
        Err(e) => {
            warn!("Rejected signal request from {}: {}", envelope.from_id, e);
            mesh_error(&e)
        }
    }
}

/// Build the API router.
pub fn router(state: Arc<ApiState>) -> Router {
    let mut signal_path = state.validator.config().mesh.signal_path.clone();
    if signal_path == VALIDATE_PATH || signal_path == DEFAULT_HANDSHAKE_PATH {
        warn!(
            "Signal path {} is taken; serving signals on {}",
            signal_path, DEFAULT_SIGNAL_PATH
        );
        signal_path = DEFAULT_SIGNAL_PATH.to_string();
    }
    Router::new()
        .route(VALIDATE_PATH, post(validate))
        .route(DEFAULT_HANDSHAKE_PATH, post(handshake))
        .route(&signal_path, post(signal))
        .with_state(state)
}

/// Bind `addr` and serve until Ctrl-C.
pub async fn start_server(addr: SocketAddr, state: Arc<ApiState>) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!("Antifraud API listening on http://{}", listener.local_addr()?);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down");
        })
        .await
}
