//! Per-connection session: one read loop, one write task, one bounded
//! outbound queue.
//!
//! The two tasks never share the write path. The read loop owns the inbound
//! half of the socket: it parses request frames, injects the trusted source
//! fields, and forwards them to the hub; any read failure (malformed payload,
//! oversized frame, deadline expiry, remote close) ends the session. The
//! write task owns the outbound half: it drains the session's queue under a
//! write deadline and fires a keepalive ping at 9/10 of the pong window so
//! intermediaries never drop the idle connection and the remote side can
//! detect liveness.
//!
//! # Lifecycle
//!
//! [`run_session`] registers the session with the hub, then supervises both
//! tasks. Whichever side ends first ends the session: exactly one
//! unregistration event is emitted, the hub drops the queue's only sender,
//! the write task observes the closed queue, announces a close frame, and
//! exits. The socket halves are released only after both tasks finished.
//!
//! There is no cancellation token: the read loop is bounded by its pong
//! deadline, so a dead peer unblocks it within one deadline window.

use std::time::Duration;

use futures_util::{Sink, SinkExt, Stream, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::{interval, timeout, timeout_at, Instant};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, info, warn};
use uuid::Uuid;

use peerhub_core::frames::RequestFrame;
use peerhub_core::identity::SessionClaims;

use crate::application::handshake::HandshakeVerdict;
use crate::application::hub::{HubHandle, SessionHandle};
use crate::domain::config::BrokerConfig;

/// Why the read loop ended; used only for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ReadOutcome {
    /// No pong arrived within the deadline window.
    DeadlineExpired,
    /// The remote closed the connection.
    StreamClosed,
    /// The transport reported an error (includes oversized frames).
    TransportError,
    /// The payload was not a JSON object.
    FrameRejected,
}

/// Runs one session to completion: registration, both pump tasks, and the
/// single unregistration.
pub async fn run_session(
    ws: WebSocketStream<TcpStream>,
    claims: SessionClaims,
    verdict: HandshakeVerdict,
    hub: HubHandle,
    config: &BrokerConfig,
) {
    let session_id = Uuid::new_v4();
    let (sink, mut stream) = ws.split();
    let (outbound_tx, outbound_rx) = mpsc::channel::<Value>(config.send_queue_capacity);

    let mut write_handle = tokio::spawn(write_task(
        sink,
        outbound_rx,
        config.write_timeout,
        config.ping_interval(),
    ));

    // A session that did not authenticate stays connected, but is told why it
    // is not trusted before anything else reaches its queue.
    if let Some(status) = verdict.status_frame(&claims.fingerprint) {
        let _ = outbound_tx.send(status.to_value()).await;
    }

    // The injected source name prefers the persisted record over the claim.
    let (authenticated, user, verified, source_name) = match &verdict {
        HandshakeVerdict::Authenticated(identity) | HandshakeVerdict::PeerChanged(identity) => (
            verdict.is_authenticated(),
            Some(identity.user.clone()),
            identity.verified,
            identity.name.clone(),
        ),
        HandshakeVerdict::PeerNotFound => (false, None, false, claims.name.clone()),
    };

    // The handle takes the queue's only sender: from here on the hub alone
    // decides when the queue closes.
    let handle = SessionHandle {
        session_id,
        fingerprint: claims.fingerprint.clone(),
        user,
        authenticated,
        verified,
        outbound: outbound_tx,
    };
    hub.register(handle).await;

    let outcome = tokio::select! {
        outcome = read_loop(
            &mut stream,
            &hub,
            &claims.fingerprint,
            &source_name,
            config.pong_timeout,
        ) => Some(outcome),
        _ = &mut write_handle => None,
    };

    // Exactly once, whichever side ended first.
    hub.unregister(&claims.fingerprint, session_id).await;

    match outcome {
        Some(reason) => {
            debug!(fingerprint = %claims.fingerprint, ?reason, "read side ended");
            // The unregistration above drops the queue sender, which lets
            // the write task finish with a close frame.
            let _ = write_handle.await;
        }
        None => debug!(fingerprint = %claims.fingerprint, "write side ended first"),
    }
    info!(fingerprint = %claims.fingerprint, %session_id, "session closed");
}

/// Pumps inbound frames from the socket to the hub.
///
/// The read deadline starts at one pong window and is refreshed only by
/// keepalive acknowledgments; data frames do not extend a silent peer's
/// lifetime.
async fn read_loop<R, E>(
    stream: &mut R,
    hub: &HubHandle,
    source_fp: &str,
    source_name: &str,
    pong_timeout: Duration,
) -> ReadOutcome
where
    R: Stream<Item = Result<Message, E>> + Unpin,
    E: std::fmt::Display,
{
    let mut deadline = Instant::now() + pong_timeout;
    loop {
        match timeout_at(deadline, stream.next()).await {
            Err(_) => {
                warn!(source_fp, "read deadline expired without a pong");
                return ReadOutcome::DeadlineExpired;
            }
            Ok(None) => return ReadOutcome::StreamClosed,
            Ok(Some(Err(e))) => {
                debug!(source_fp, "read error: {e}");
                return ReadOutcome::TransportError;
            }
            Ok(Some(Ok(message))) => match message {
                Message::Text(text) => match RequestFrame::parse(&text) {
                    Ok(mut frame) => {
                        frame.inject_source(source_fp, source_name);
                        hub.submit(frame).await;
                    }
                    Err(e) => {
                        warn!(source_fp, "rejecting malformed frame: {e}");
                        return ReadOutcome::FrameRejected;
                    }
                },
                Message::Pong(_) => {
                    deadline = Instant::now() + pong_timeout;
                }
                Message::Ping(_) => {
                    // The protocol library queues the pong reply; it flushes
                    // with the write task's next send.
                    debug!(source_fp, "ping received");
                }
                Message::Binary(_) => {
                    warn!(source_fp, "rejecting binary frame on a JSON-only session");
                    return ReadOutcome::FrameRejected;
                }
                Message::Close(_) => return ReadOutcome::StreamClosed,
                Message::Frame(_) => {}
            },
        }
    }
}

/// Pumps outbound frames from the queue to the socket and keeps the
/// connection alive.
///
/// The queue closing is the hub's signal that the session ended or was
/// evicted: the task announces a close frame and exits. Any send failure or
/// deadline overrun also ends the task.
async fn write_task<S, E>(
    mut sink: S,
    mut outbound: mpsc::Receiver<Value>,
    write_timeout: Duration,
    ping_interval: Duration,
) where
    S: Sink<Message, Error = E> + Unpin,
    E: std::fmt::Display,
{
    let mut ticker = interval(ping_interval);
    ticker.tick().await; // Skip the immediate first tick.

    loop {
        tokio::select! {
            item = outbound.recv() => match item {
                Some(value) => {
                    match timeout(write_timeout, sink.send(Message::Text(value.to_string()))).await {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) => {
                            debug!("frame send failed: {e}");
                            break;
                        }
                        Err(_) => {
                            debug!("frame send missed the write deadline");
                            break;
                        }
                    }
                }
                None => {
                    // Queue closed by the hub.
                    let _ = timeout(write_timeout, sink.send(Message::Close(None))).await;
                    break;
                }
            },
            _ = ticker.tick() => {
                match timeout(write_timeout, sink.send(Message::Ping(Vec::new()))).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        debug!("keepalive send failed: {e}");
                        break;
                    }
                    Err(_) => {
                        debug!("keepalive missed the write deadline");
                        break;
                    }
                }
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
