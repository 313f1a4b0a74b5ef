//! Integration tests for the verification lifecycle.
//!
//! # Purpose
//!
//! These tests walk a device through the full identity lifecycle the way the
//! facade and the session endpoint drive it in production:
//!
//! 1. A fingerprint is claimed for a user via the directory; the record is
//!    created unverified and a notification goes out.
//! 2. A handshake with matching claims authenticates; a handshake with a
//!    changed display name does not, and any route it attempts is refused
//!    as unauthorized until the device re-verifies and reconnects.
//! 3. Out-of-band confirmation flips the verified flag, after which a claim
//!    answers with the owner's peer list.
//!
//! The store is the in-memory adapter and the notifier is a recording
//! double, so the tests observe exactly what would be persisted and sent.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::mpsc;
use uuid::Uuid;

use peerhub_broker::application::directory::{ClaimOutcome, ClaimRequest, Directory};
use peerhub_broker::application::handshake::{self, HandshakeVerdict};
use peerhub_broker::application::hub::{Hub, SessionHandle};
use peerhub_broker::infrastructure::MemoryStore;
use peerhub_core::frames::RequestFrame;
use peerhub_core::identity::SessionClaims;
use peerhub_core::notifier::{NotifyError, VerificationNotifier};
use peerhub_core::store::IdentityStore;

/// Notifier double that records every recipient.
#[derive(Default)]
struct RecordingNotifier {
    sent: Mutex<Vec<String>>,
}

#[async_trait]
impl VerificationNotifier for RecordingNotifier {
    async fn send_verification(&self, user: &str) -> Result<(), NotifyError> {
        self.sent.lock().unwrap().push(user.to_string());
        Ok(())
    }
}

fn make_world() -> (Directory, Arc<MemoryStore>, Arc<RecordingNotifier>) {
    let store = Arc::new(MemoryStore::new());
    let notifier = Arc::new(RecordingNotifier::default());
    let directory = Directory::new(
        Arc::clone(&store) as Arc<dyn IdentityStore>,
        Arc::clone(&notifier) as Arc<dyn VerificationNotifier>,
    );
    (directory, store, notifier)
}

fn claim(fp: &str, user: &str, name: &str) -> ClaimRequest {
    ClaimRequest {
        fingerprint: fp.to_string(),
        user: user.to_string(),
        name: name.to_string(),
        kind: "terminal".to_string(),
    }
}

fn claims(fp: &str, user: &str, name: &str) -> SessionClaims {
    SessionClaims {
        fingerprint: fp.to_string(),
        user: user.to_string(),
        name: name.to_string(),
        kind: "terminal".to_string(),
    }
}

#[tokio::test]
async fn test_claim_then_matching_handshake_authenticates() {
    let (directory, store, notifier) = make_world();

    let outcome = directory
        .claim(claim("fp-a", "alice@example.com", "laptop"))
        .await
        .unwrap();
    assert_eq!(outcome, ClaimOutcome::PendingVerification);
    assert_eq!(
        notifier.sent.lock().unwrap().as_slice(),
        ["alice@example.com"]
    );

    let verdict = handshake::resolve(
        store.as_ref(),
        &claims("fp-a", "alice@example.com", "laptop"),
    )
    .await
    .unwrap();
    assert!(verdict.is_authenticated());
}

#[tokio::test]
async fn test_changed_name_handshake_is_excluded_from_routing_until_reverified() {
    let (directory, store, _notifier) = make_world();
    directory
        .claim(claim("fp-a", "alice@example.com", "laptop"))
        .await
        .unwrap();
    directory
        .claim(claim("fp-b", "alice@example.com", "desktop"))
        .await
        .unwrap();

    // The device reconnects claiming a different display name.
    let verdict = handshake::resolve(
        store.as_ref(),
        &claims("fp-a", "alice@example.com", "renamed-laptop"),
    )
    .await
    .unwrap();
    assert!(matches!(verdict, HandshakeVerdict::PeerChanged(_)));
    assert_eq!(verdict.status_frame("fp-a").unwrap().status_code, 401);

    // Register it the way the session layer would: present, but
    // unauthenticated, with its persisted owner cached.
    let (hub, handle) = Hub::new(16);
    tokio::spawn(hub.run());

    let (changed_tx, mut changed_rx) = mpsc::channel(8);
    let (target_tx, mut target_rx) = mpsc::channel(8);
    handle
        .register(SessionHandle {
            session_id: Uuid::new_v4(),
            fingerprint: "fp-a".to_string(),
            user: Some("alice@example.com".to_string()),
            authenticated: false,
            verified: false,
            outbound: changed_tx,
        })
        .await;
    handle
        .register(SessionHandle {
            session_id: Uuid::new_v4(),
            fingerprint: "fp-b".to_string(),
            user: Some("alice@example.com".to_string()),
            authenticated: true,
            verified: false,
            outbound: target_tx,
        })
        .await;

    let mut frame =
        RequestFrame::parse(&json!({"target": "fp-b", "msg": "hi"}).to_string()).unwrap();
    frame.inject_source("fp-a", "laptop");
    handle.submit(frame).await;

    // The route attempt is refused as unauthorized; the sibling sees nothing.
    let status = changed_rx.recv().await.unwrap();
    assert_eq!(status["status_code"], 401);
    assert!(target_rx.try_recv().is_err());

    // Re-verifying the record (rename + confirmation) restores authentication
    // for the next connection.
    directory
        .claim(claim("fp-a", "alice@example.com", "renamed-laptop"))
        .await
        .unwrap();
    directory.set_verified("fp-a", true).await.unwrap();
    let verdict = handshake::resolve(
        store.as_ref(),
        &claims("fp-a", "alice@example.com", "renamed-laptop"),
    )
    .await
    .unwrap();
    assert!(verdict.is_authenticated());
}

#[tokio::test]
async fn test_confirmation_flips_verified_and_claim_returns_peer_list() {
    let (directory, _store, notifier) = make_world();
    directory
        .claim(claim("fp-a", "alice@example.com", "laptop"))
        .await
        .unwrap();

    // Out-of-band confirmation completes.
    directory.set_verified("fp-a", true).await.unwrap();

    let outcome = directory
        .claim(claim("fp-a", "alice@example.com", "laptop"))
        .await
        .unwrap();
    match outcome {
        ClaimOutcome::Verified(peers) => {
            assert_eq!(peers.len(), 1);
            assert!(peers[0].verified);
        }
        other => panic!("expected Verified, got {other:?}"),
    }
    // Only the initial pending claim notified; the verified claim did not.
    assert_eq!(notifier.sent.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_unknown_fingerprint_handshake_is_peer_not_found() {
    let (_directory, store, _notifier) = make_world();
    let verdict = handshake::resolve(
        store.as_ref(),
        &claims("fp-ghost", "alice@example.com", "laptop"),
    )
    .await
    .unwrap();
    assert_eq!(verdict, HandshakeVerdict::PeerNotFound);
}

#[tokio::test]
async fn test_foreign_claim_never_reaches_the_store() {
    let (directory, store, _notifier) = make_world();
    directory
        .claim(claim("fp-a", "alice@example.com", "laptop"))
        .await
        .unwrap();

    let result = directory.claim(claim("fp-a", "bob@example.com", "stolen")).await;
    assert!(result.is_err());

    // The record still belongs to the original owner under its original name.
    let record = store.get("fp-a").await.unwrap();
    assert_eq!(record.user, "alice@example.com");
    assert_eq!(record.name, "laptop");
}
