//! HTTP facade over the verification directory.
//!
//! JSON-only API consumed by device installers and the account tooling:
//!
//! - `GET  /healthz` – liveness probe.
//! - `POST /verify` – claim a fingerprint for a user (body:
//!   `{"fp": ..., "email": ..., "name": ..., "kind": ...}`). Answers the
//!   owner's peer list when already verified, `{"verified": false}` while
//!   confirmation is pending, 409 when the fingerprint belongs to another
//!   user.
//! - `GET  /peers/:user` – every persisted peer of a user, connected or not.
//! - `POST /peers/:fp/verified` – record the outcome of an out-of-band
//!   confirmation (body: `{"verified": true}`). Deployments must keep this
//!   route behind the confirmation flow's own authentication.
//!
//! The facade is a thin translation onto [`Directory`]; it owns no state of
//! its own and never touches the hub.

use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::Context;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tokio::net::TcpListener;
use tracing::{error, info};

use peerhub_core::store::StoreError;

use crate::application::directory::{ClaimOutcome, ClaimRequest, Directory, DirectoryError};

/// Shared state injected into every facade handler.
#[derive(Clone)]
pub struct ApiState {
    pub directory: Arc<Directory>,
}

/// Builds the facade router.
pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/healthz", get(healthcheck))
        .route("/verify", post(verify))
        .route("/peers/:user", get(list_peers))
        .route("/peers/:fp/verified", post(set_verified))
        .with_state(state)
}

/// Serves the facade until `running` is cleared.
///
/// # Errors
///
/// Returns an error if the listener cannot be bound or the server fails.
pub async fn run_http_server(
    addr: SocketAddr,
    state: ApiState,
    running: Arc<AtomicBool>,
) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind facade listener on {addr}"))?;
    info!("facade listening on {addr}");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal(running))
        .await
        .context("facade server failed")
}

/// Resolves once the shutdown flag clears.
async fn shutdown_signal(running: Arc<AtomicBool>) {
    while running.load(Ordering::Relaxed) {
        tokio::time::sleep(Duration::from_millis(200)).await;
    }
}

// ── Handlers ──────────────────────────────────────────────────────────────────

async fn healthcheck() -> impl IntoResponse {
    StatusCode::OK
}

/// Body of `POST /verify`.
#[derive(Debug, Deserialize)]
struct VerifyRequest {
    fp: String,
    email: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    kind: String,
}

async fn verify(
    State(state): State<ApiState>,
    Json(request): Json<VerifyRequest>,
) -> impl IntoResponse {
    if request.fp.is_empty() {
        return (StatusCode::BAD_REQUEST, Json(json!({"m": "missing fingerprint"})))
            .into_response();
    }
    if request.email.is_empty() {
        return (StatusCode::BAD_REQUEST, Json(json!({"m": "missing email"}))).into_response();
    }

    let claim = ClaimRequest {
        fingerprint: request.fp,
        user: request.email,
        name: request.name,
        kind: request.kind,
    };
    match state.directory.claim(claim).await {
        Ok(ClaimOutcome::Verified(peers)) => Json(json!({ "peers": peers })).into_response(),
        Ok(ClaimOutcome::PendingVerification) => {
            Json(json!({ "verified": false })).into_response()
        }
        Err(DirectoryError::OwnedByAnotherUser(_)) => (
            StatusCode::CONFLICT,
            Json(json!({"m": "fingerprint is associated to another user"})),
        )
            .into_response(),
        Err(DirectoryError::Store(e)) => store_failure(e),
    }
}

async fn list_peers(
    State(state): State<ApiState>,
    Path(user): Path<String>,
) -> impl IntoResponse {
    match state.directory.list_peers(&user).await {
        Ok(peers) => Json(json!({ "peers": peers })).into_response(),
        Err(e) => store_failure(e),
    }
}

/// Body of `POST /peers/:fp/verified`.
#[derive(Debug, Deserialize)]
struct VerifiedRequest {
    verified: bool,
}

async fn set_verified(
    State(state): State<ApiState>,
    Path(fp): Path<String>,
    Json(request): Json<VerifiedRequest>,
) -> impl IntoResponse {
    match state.directory.set_verified(&fp, request.verified).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(StoreError::NotFound(_)) => {
            (StatusCode::NOT_FOUND, Json(json!({"m": "peer not found"}))).into_response()
        }
        Err(e) => store_failure(e),
    }
}

fn store_failure(e: StoreError) -> axum::response::Response {
    error!("identity store failure: {e}");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({"m": "identity store failure"})),
    )
        .into_response()
}

// ── Tests ─────────────────────────────────────────────────────────────────────
