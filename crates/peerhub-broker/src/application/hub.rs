//! The hub: single coordinator owning the live-connection registry and
//! arbitrating message routing.
//!
//! The hub is one logical actor. Registration events, unregistration events,
//! and inbound request frames all pass through a single bounded queue and are
//! consumed by one loop, so every registry mutation and every routing
//! decision is totally ordered. That ordering is what makes the
//! at-most-one-session-per-fingerprint invariant and the authorization checks
//! race-free without any lock around the registry. The cost is that all
//! connection churn and all routed traffic serialize through this loop; any
//! change here must preserve that single-consumer shape.
//!
//! # Routing resolution order
//!
//! 1. The target fingerprint must resolve to a registered, authenticated
//!    session, else the source gets a 404 status push.
//! 2. The target's persisted owner must equal the source's persisted owner;
//!    cross-account routing is a hard security boundary, independent of
//!    verification state.
//! 3. The source itself must be authenticated.
//! 4. Delivery appends to the target's bounded queue; a full queue drops the
//!    frame and pushes a 503 to the source. The hub never blocks on a slow
//!    session, so one stalled peer cannot stall unrelated peers.
//!
//! Routing failures are per-message: they produce a status push to the
//! source and never close anyone's connection.

use std::collections::HashMap;

use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info, warn};
use uuid::Uuid;

use peerhub_core::frames::{RequestFrame, StatusFrame};

/// Error type for routing decisions. Each variant carries the peer it is
/// about and maps onto the status frame pushed back to the source.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RouteError {
    #[error("request does not name a target fingerprint")]
    MissingTarget,
    #[error("target peer not found: {0}")]
    TargetNotFound(String),
    #[error("target peer belongs to a different user: {0}")]
    PeerIsForeign(String),
    #[error("peer is not authenticated, blocking request: {0}")]
    UnauthorizedPeer(String),
    #[error("target peer is busy: {0}")]
    TargetBusy(String),
}

impl RouteError {
    /// Status code pushed to the source for this failure.
    pub fn status_code(&self) -> u16 {
        match self {
            RouteError::MissingTarget => 400,
            RouteError::UnauthorizedPeer(_) => 401,
            RouteError::PeerIsForeign(_) => 403,
            RouteError::TargetNotFound(_) => 404,
            RouteError::TargetBusy(_) => 503,
        }
    }
}

/// The hub-side handle to one live session.
///
/// Holds the *only* sender of the session's outbound queue: removing the
/// handle from the registry closes the queue, which the session's write task
/// observes as its signal to send a close frame and exit.
#[derive(Debug)]
pub struct SessionHandle {
    /// Unique per-connection instance id; what distinguishes a stale
    /// unregistration from a current one.
    pub session_id: Uuid,
    /// The fingerprint this session claims; the registry key.
    pub fingerprint: String,
    /// Persisted owning user, when a persisted record existed at handshake.
    pub user: Option<String>,
    /// Whether the handshake claims matched the persisted record.
    pub authenticated: bool,
    /// Cached verified flag from the persisted record.
    pub verified: bool,
    /// The session's bounded outbound queue.
    pub outbound: mpsc::Sender<Value>,
}

/// Events consumed by the hub loop, in arrival order.
#[derive(Debug)]
pub enum HubEvent {
    /// A session finished its handshake and joins the registry.
    Register(SessionHandle),
    /// A session ended; remove it only if it still owns its fingerprint.
    Unregister {
        fingerprint: String,
        session_id: Uuid,
    },
    /// A request frame from a connected session, source fields already
    /// injected by its read task.
    Request(RequestFrame),
}

/// Cheaply cloneable producer side of the hub's event queue.
///
/// All three producers go through the same bounded channel, so a full queue
/// makes them await their turn rather than reorder events.
#[derive(Debug, Clone)]
pub struct HubHandle {
    events: mpsc::Sender<HubEvent>,
}

impl HubHandle {
    pub(crate) fn from_sender(events: mpsc::Sender<HubEvent>) -> Self {
        Self { events }
    }

    /// Hands a session over to the hub.
    pub async fn register(&self, handle: SessionHandle) {
        if self.events.send(HubEvent::Register(handle)).await.is_err() {
            debug!("hub is gone; dropping registration");
        }
    }

    /// Reports a session's end to the hub.
    pub async fn unregister(&self, fingerprint: &str, session_id: Uuid) {
        let event = HubEvent::Unregister {
            fingerprint: fingerprint.to_string(),
            session_id,
        };
        if self.events.send(event).await.is_err() {
            debug!("hub is gone; dropping unregistration");
        }
    }

    /// Submits a request frame for routing.
    pub async fn submit(&self, frame: RequestFrame) {
        if self.events.send(HubEvent::Request(frame)).await.is_err() {
            debug!("hub is gone; dropping request frame");
        }
    }
}

/// The hub actor. Construct with [`Hub::new`], then drive with
/// [`Hub::run`] on a dedicated task.
pub struct Hub {
    events: mpsc::Receiver<HubEvent>,
    registry: HashMap<String, SessionHandle>,
}

impl Hub {
    /// Creates the hub and its producer handle. `event_queue_capacity`
    /// bounds the shared event queue.
    pub fn new(event_queue_capacity: usize) -> (Self, HubHandle) {
        let (tx, rx) = mpsc::channel(event_queue_capacity);
        let hub = Self {
            events: rx,
            registry: HashMap::new(),
        };
        (hub, HubHandle::from_sender(tx))
    }

    /// Consumes events until every producer handle is dropped.
    pub async fn run(mut self) {
        info!("hub loop started");
        while let Some(event) = self.events.recv().await {
            match event {
                HubEvent::Register(handle) => self.register(handle),
                HubEvent::Unregister {
                    fingerprint,
                    session_id,
                } => self.unregister(&fingerprint, session_id),
                HubEvent::Request(frame) => self.route(frame),
            }
        }
        info!("hub loop stopped");
    }

    /// Inserts a session, evicting any live predecessor on the same
    /// fingerprint.
    fn register(&mut self, handle: SessionHandle) {
        info!(
            fingerprint = %handle.fingerprint,
            session_id = %handle.session_id,
            authenticated = handle.authenticated,
            verified = handle.verified,
            "session registered"
        );
        if let Some(evicted) = self.registry.insert(handle.fingerprint.clone(), handle) {
            // Dropping the old handle closes its outbound queue; its write
            // task sends a close frame and exits.
            info!(
                fingerprint = %evicted.fingerprint,
                session_id = %evicted.session_id,
                "evicted previous session for fingerprint"
            );
        }
    }

    /// Removes a registry entry, but only when it still points at the exact
    /// session instance that ended. An unregistration racing a newer
    /// registration for the same fingerprint must never evict the newer
    /// session.
    fn unregister(&mut self, fingerprint: &str, session_id: Uuid) {
        match self.registry.get(fingerprint) {
            Some(current) if current.session_id == session_id => {
                self.registry.remove(fingerprint);
                debug!(fingerprint, %session_id, "session unregistered");
            }
            Some(_) => {
                debug!(fingerprint, %session_id, "stale unregistration ignored");
            }
            None => {
                debug!(fingerprint, %session_id, "unregistration for unknown fingerprint");
            }
        }
    }

    /// Routes one request frame, pushing a status to the source on failure.
    fn route(&self, frame: RequestFrame) {
        let Some(source_fp) = frame.source_fp().map(ToOwned::to_owned) else {
            // Frames reach the hub through session read tasks, which always
            // inject the source fields first.
            warn!("dropping request frame without injected source");
            return;
        };
        let Some(source) = self.registry.get(&source_fp) else {
            // The source disconnected while its frame was queued.
            debug!(%source_fp, "dropping request from departed session");
            return;
        };

        match self.resolve(source, &frame) {
            Ok(target) => {
                let target_fp = target.fingerprint.clone();
                match target.outbound.try_send(frame.into_value()) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => {
                        // Favor hub liveness over delivery: drop the frame
                        // and tell the source.
                        warn!(%target_fp, "target queue full; dropping frame");
                        self.push_status(source, &RouteError::TargetBusy(target_fp));
                    }
                    Err(TrySendError::Closed(_)) => {
                        debug!(%target_fp, "target queue closed; reporting not found");
                        self.push_status(source, &RouteError::TargetNotFound(target_fp));
                    }
                }
            }
            Err(err) => {
                debug!(%source_fp, %err, "routing refused");
                self.push_status(source, &err);
            }
        }
    }

    /// Applies the resolution order documented at module level.
    fn resolve<'a>(
        &'a self,
        source: &SessionHandle,
        frame: &RequestFrame,
    ) -> Result<&'a SessionHandle, RouteError> {
        let target_fp = frame.target().ok_or(RouteError::MissingTarget)?;

        // Sessions that never authenticated are not reachable targets.
        let target = self
            .registry
            .get(target_fp)
            .filter(|t| t.authenticated)
            .ok_or_else(|| RouteError::TargetNotFound(target_fp.to_string()))?;

        // Cross-account boundary, judged on persisted owners only. A source
        // without a persisted record cannot pass as foreign; it is rejected
        // as unauthenticated below.
        if let (Some(source_user), Some(target_user)) = (&source.user, &target.user) {
            if source_user != target_user {
                return Err(RouteError::PeerIsForeign(target_fp.to_string()));
            }
        }

        if !source.authenticated {
            return Err(RouteError::UnauthorizedPeer(source.fingerprint.clone()));
        }

        Ok(target)
    }

    /// Best-effort status push to a session; never blocks the hub loop.
    fn push_status(&self, session: &SessionHandle, err: &RouteError) {
        let status = StatusFrame::new(err.status_code(), err.to_string());
        if session.outbound.try_send(status.to_value()).is_err() {
            debug!(
                fingerprint = %session.fingerprint,
                "could not push status to session"
            );
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
