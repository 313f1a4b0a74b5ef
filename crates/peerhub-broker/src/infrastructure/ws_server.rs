//! Session endpoint: accept loop and per-connection handshake.
//!
//! This module is responsible for:
//!
//! 1. Binding the TCP listener for the WebSocket session endpoint.
//! 2. Extracting the connection claims from the upgrade request's query
//!    string, refusing the upgrade with HTTP 400 when the fingerprint is
//!    missing.
//! 3. Completing the WebSocket upgrade with the configured frame-size limit.
//! 4. Resolving the claims against the identity store and triggering a
//!    verification notification for sessions that did not authenticate.
//! 5. Handing the upgraded socket to [`session::run_session`].
//! 6. Draining in-flight sessions before returning when the shutdown flag
//!    clears.
//!
//! The upgrade proceeds for `PeerNotFound` and `PeerChanged` verdicts so the
//! client receives a status frame describing why it is not yet trusted; only
//! a missing fingerprint or a pre-upgrade store failure refuses the
//! connection outright.

use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::Context;
use futures_util::SinkExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_hdr_async_with_config, WebSocketStream};
use tracing::{debug, error, info, warn};

use peerhub_core::frames::StatusFrame;
use peerhub_core::notifier::VerificationNotifier;
use peerhub_core::store::IdentityStore;

use crate::application::handshake::{self, HandshakeVerdict};
use crate::application::hub::HubHandle;
use crate::domain::config::BrokerConfig;
use crate::infrastructure::session;

/// Runs the session accept loop until `running` is cleared, then waits for
/// every in-flight session to finish.
///
/// # Errors
///
/// Returns an error if the TCP listener cannot be bound.
pub async fn run_ws_server(
    config: Arc<BrokerConfig>,
    store: Arc<dyn IdentityStore>,
    notifier: Arc<dyn VerificationNotifier>,
    hub: HubHandle,
    running: Arc<AtomicBool>,
) -> anyhow::Result<()> {
    let listener = TcpListener::bind(config.ws_bind_addr)
        .await
        .with_context(|| format!("failed to bind session listener on {}", config.ws_bind_addr))?;

    info!("session endpoint listening on {}", config.ws_bind_addr);

    let mut sessions = JoinSet::new();

    loop {
        if !running.load(Ordering::Relaxed) {
            info!("shutdown flag set; stopping session accept loop");
            break;
        }

        // Short accept timeout so the loop can poll the shutdown flag even
        // when no clients are connecting.
        match timeout(Duration::from_millis(200), listener.accept()).await {
            Ok(Ok((stream, peer_addr))) => {
                debug!("new connection from {peer_addr}");
                let config = Arc::clone(&config);
                let store = Arc::clone(&store);
                let notifier = Arc::clone(&notifier);
                let hub = hub.clone();
                sessions.spawn(async move {
                    handle_connection(stream, peer_addr, config, store, notifier, hub).await;
                });
            }
            Ok(Err(e)) => {
                // Transient accept error; keep the endpoint alive.
                error!("accept error: {e}");
            }
            Err(_) => {}
        }

        // Reap finished session tasks so the set does not grow unbounded.
        while sessions.try_join_next().is_some() {}
    }

    drop(listener);
    if !sessions.is_empty() {
        info!("draining {} in-flight session(s)", sessions.len());
    }
    while sessions.join_next().await.is_some() {}
    Ok(())
}

/// Top-level handler for one connection; wraps [`run_connection`] and logs
/// the outcome.
async fn handle_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    config: Arc<BrokerConfig>,
    store: Arc<dyn IdentityStore>,
    notifier: Arc<dyn VerificationNotifier>,
    hub: HubHandle,
) {
    match run_connection(stream, config, store, notifier, hub).await {
        Ok(()) => debug!("connection {peer_addr} finished"),
        Err(e) => warn!("connection {peer_addr} failed: {e:#}"),
    }
}

/// Runs the upgrade, the handshake verdict, and the session itself.
async fn run_connection(
    stream: TcpStream,
    config: Arc<BrokerConfig>,
    store: Arc<dyn IdentityStore>,
    notifier: Arc<dyn VerificationNotifier>,
    hub: HubHandle,
) -> anyhow::Result<()> {
    // The upgrade callback parses the claims and refuses the handshake with
    // an HTTP 400 before the upgrade when the fingerprint is missing.
    let mut claims_slot = None;
    let callback = |request: &Request, response: Response| {
        match handshake::parse_claims(request.uri().query().unwrap_or("")) {
            Ok(claims) => {
                claims_slot = Some(claims);
                Ok(response)
            }
            Err(e) => {
                let mut refusal = ErrorResponse::new(Some(e.to_string()));
                *refusal.status_mut() = StatusCode::BAD_REQUEST;
                Err(refusal)
            }
        }
    };

    let mut ws_config = WebSocketConfig::default();
    ws_config.max_message_size = Some(config.max_frame_bytes);
    ws_config.max_frame_size = Some(config.max_frame_bytes);

    let mut ws = accept_hdr_async_with_config(stream, callback, Some(ws_config))
        .await
        .context("WebSocket upgrade failed")?;

    let claims = claims_slot.context("upgrade succeeded without claims")?;

    let verdict = match handshake::resolve(store.as_ref(), &claims).await {
        Ok(verdict) => verdict,
        Err(e) => {
            // The registry is independent of store availability; only this
            // connection is affected.
            push_and_close(&mut ws, StatusFrame::new(500, e.to_string())).await;
            return Err(e).context("identity store failed during handshake");
        }
    };

    if !verdict.is_authenticated() {
        notify_pending_verification(&verdict, &claims.user, &claims.fingerprint, notifier);
    }

    session::run_session(ws, claims, verdict, hub, &config).await;
    Ok(())
}

/// Pushes one status frame and closes the socket; used before a session's
/// write task exists.
async fn push_and_close(ws: &mut WebSocketStream<TcpStream>, status: StatusFrame) {
    let _ = ws.send(Message::Text(status.to_value().to_string())).await;
    let _ = ws.close(None).await;
}

/// Fires the out-of-band verification request for a not-yet-trusted session.
/// Runs in the background; failures only reach the log.
fn notify_pending_verification(
    verdict: &HandshakeVerdict,
    claimed_user: &str,
    fingerprint: &str,
    notifier: Arc<dyn VerificationNotifier>,
) {
    // A changed peer has a persisted owner on record; an unknown one only
    // has its claim.
    let user = match verdict {
        HandshakeVerdict::PeerChanged(identity) => identity.user.clone(),
        _ => claimed_user.to_string(),
    };
    if user.is_empty() {
        warn!(fingerprint, "cannot notify: connection claimed no user");
        return;
    }
    tokio::spawn(async move {
        if let Err(e) = notifier.send_verification(&user).await {
            warn!(%user, "failed to send verification notification: {e}");
        }
    });
}
