//! Verification facade: peer listing, fingerprint claims, and the verified
//! flag, expressed over the identity store and notifier contracts.
//!
//! Claiming a fingerprint for a user follows one linear validate-then-act
//! path:
//!
//! - Unknown fingerprint: create an unverified record and notify the user.
//! - Known but owned by a different user: refused with a conflict.
//! - Known and owned by the claiming user: update the display name when it
//!   changed, then either return the user's peer list (already verified) or
//!   re-notify (still pending).
//!
//! Once the out-of-band confirmation completes, [`Directory::set_verified`]
//! flips the flag so subsequent handshakes for that fingerprint authenticate
//! without re-challenge. Notification failures are logged and never
//! propagated.

use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};

use peerhub_core::identity::PeerIdentity;
use peerhub_core::notifier::VerificationNotifier;
use peerhub_core::store::{IdentityStore, StoreError};

/// Error type for claim processing.
#[derive(Debug, Error)]
pub enum DirectoryError {
    /// The fingerprint is already owned by another account.
    #[error("fingerprint is associated to another user: {0}")]
    OwnedByAnotherUser(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// A request to claim a fingerprint for a user.
#[derive(Debug, Clone)]
pub struct ClaimRequest {
    pub fingerprint: String,
    pub user: String,
    pub name: String,
    pub kind: String,
}

/// Outcome of a successful claim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// The record exists (created or pre-existing) but awaits out-of-band
    /// confirmation; a notification was triggered.
    PendingVerification,
    /// The fingerprint is already verified for this user; carries the user's
    /// full peer list.
    Verified(Vec<PeerIdentity>),
}

/// The facade over persisted identities and the out-of-band notifier.
pub struct Directory {
    store: Arc<dyn IdentityStore>,
    notifier: Arc<dyn VerificationNotifier>,
}

impl Directory {
    pub fn new(store: Arc<dyn IdentityStore>, notifier: Arc<dyn VerificationNotifier>) -> Self {
        Self { store, notifier }
    }

    /// Claims `request.fingerprint` for `request.user`.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError::OwnedByAnotherUser`] when the fingerprint
    /// belongs to a different account, and store errors verbatim.
    pub async fn claim(&self, request: ClaimRequest) -> Result<ClaimOutcome, DirectoryError> {
        let existing = match self.store.get(&request.fingerprint).await {
            Ok(identity) => identity,
            Err(StoreError::NotFound(_)) => {
                let identity = PeerIdentity::unverified(
                    &request.fingerprint,
                    &request.user,
                    &request.name,
                    &request.kind,
                );
                self.store.put_new(identity).await?;
                info!(
                    fingerprint = %request.fingerprint,
                    user = %request.user,
                    "new peer claimed, verification pending"
                );
                self.notify(&request.user).await;
                return Ok(ClaimOutcome::PendingVerification);
            }
            Err(e) => return Err(e.into()),
        };

        if existing.user != request.user {
            return Err(DirectoryError::OwnedByAnotherUser(existing.user));
        }
        if !request.name.is_empty() && existing.name != request.name {
            self.store
                .set_name(&request.fingerprint, &request.name)
                .await?;
        }
        if existing.verified {
            let peers = self.store.list_by_user(&request.user).await?;
            Ok(ClaimOutcome::Verified(peers))
        } else {
            self.notify(&request.user).await;
            Ok(ClaimOutcome::PendingVerification)
        }
    }

    /// Lists every persisted peer owned by `user`, connected or not.
    ///
    /// # Errors
    ///
    /// Returns store errors verbatim.
    pub async fn list_peers(&self, user: &str) -> Result<Vec<PeerIdentity>, StoreError> {
        self.store.list_by_user(user).await
    }

    /// Records the result of an out-of-band confirmation.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] for an unknown fingerprint.
    pub async fn set_verified(&self, fingerprint: &str, verified: bool) -> Result<(), StoreError> {
        self.store.set_verified(fingerprint, verified).await?;
        info!(fingerprint, verified, "peer verification flag updated");
        Ok(())
    }

    /// Triggers a verification notification, logging any failure.
    pub async fn notify(&self, user: &str) {
        if user.is_empty() {
            warn!("skipping verification notification: no user to notify");
            return;
        }
        if let Err(e) = self.notifier.send_verification(user).await {
            warn!(user, "failed to send verification notification: {e}");
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use peerhub_core::notifier::NotifyError;
    use std::sync::Mutex;

    use crate::infrastructure::memory_store::MemoryStore;

    /// Notifier double that records every recipient.
    #[derive(Default)]
    struct RecordingNotifier {
        sent: Mutex<Vec<String>>,
        should_fail: bool,
    }

    #[async_trait]
    impl VerificationNotifier for RecordingNotifier {
        async fn send_verification(&self, user: &str) -> Result<(), NotifyError> {
            if self.should_fail {
                return Err(NotifyError("injected failure".to_string()));
            }
            self.sent.lock().unwrap().push(user.to_string());
            Ok(())
        }
    }

    fn make_directory() -> (Directory, Arc<MemoryStore>, Arc<RecordingNotifier>) {
        let store = Arc::new(MemoryStore::new());
        let notifier = Arc::new(RecordingNotifier::default());
        let directory = Directory::new(
            Arc::clone(&store) as Arc<dyn IdentityStore>,
            Arc::clone(&notifier) as Arc<dyn VerificationNotifier>,
        );
        (directory, store, notifier)
    }

    fn claim_request(fingerprint: &str, user: &str, name: &str) -> ClaimRequest {
        ClaimRequest {
            fingerprint: fingerprint.to_string(),
            user: user.to_string(),
            name: name.to_string(),
            kind: "terminal".to_string(),
        }
    }

    #[tokio::test]
    async fn test_claim_unknown_fingerprint_creates_unverified_record() {
        let (directory, store, notifier) = make_directory();

        let outcome = directory
            .claim(claim_request("fp-a", "alice@example.com", "laptop"))
            .await
            .unwrap();

        assert_eq!(outcome, ClaimOutcome::PendingVerification);
        let record = store.get("fp-a").await.unwrap();
        assert!(!record.verified);
        assert_eq!(record.user, "alice@example.com");
        assert_eq!(
            notifier.sent.lock().unwrap().as_slice(),
            ["alice@example.com"]
        );
    }

    #[tokio::test]
    async fn test_claim_foreign_fingerprint_is_conflict() {
        let (directory, _store, notifier) = make_directory();
        directory
            .claim(claim_request("fp-a", "alice@example.com", "laptop"))
            .await
            .unwrap();

        let result = directory
            .claim(claim_request("fp-a", "bob@example.com", "stolen"))
            .await;

        match result {
            Err(DirectoryError::OwnedByAnotherUser(owner)) => {
                assert_eq!(owner, "alice@example.com");
            }
            other => panic!("expected conflict, got {other:?}"),
        }
        // Only the original claim notified.
        assert_eq!(notifier.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_claim_same_owner_renames_and_renotifies() {
        let (directory, store, notifier) = make_directory();
        directory
            .claim(claim_request("fp-a", "alice@example.com", "laptop"))
            .await
            .unwrap();

        let outcome = directory
            .claim(claim_request("fp-a", "alice@example.com", "laptop-2"))
            .await
            .unwrap();

        assert_eq!(outcome, ClaimOutcome::PendingVerification);
        assert_eq!(store.get("fp-a").await.unwrap().name, "laptop-2");
        assert_eq!(notifier.sent.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_claim_verified_fingerprint_returns_peer_list() {
        let (directory, _store, notifier) = make_directory();
        directory
            .claim(claim_request("fp-a", "alice@example.com", "laptop"))
            .await
            .unwrap();
        directory
            .claim(claim_request("fp-b", "alice@example.com", "phone"))
            .await
            .unwrap();
        directory.set_verified("fp-a", true).await.unwrap();

        let outcome = directory
            .claim(claim_request("fp-a", "alice@example.com", "laptop"))
            .await
            .unwrap();

        match outcome {
            ClaimOutcome::Verified(peers) => {
                assert_eq!(peers.len(), 2);
                assert!(peers.iter().any(|p| p.fingerprint == "fp-a" && p.verified));
                assert!(peers.iter().any(|p| p.fingerprint == "fp-b" && !p.verified));
            }
            other => panic!("expected Verified, got {other:?}"),
        }
        // A verified claim does not re-notify.
        assert_eq!(notifier.sent.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_list_peers_returns_records_regardless_of_connection() {
        let (directory, _store, _notifier) = make_directory();
        directory
            .claim(claim_request("fp-a", "alice@example.com", "laptop"))
            .await
            .unwrap();

        let peers = directory.list_peers("alice@example.com").await.unwrap();
        assert_eq!(peers.len(), 1);
        assert!(directory.list_peers("bob@example.com").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_set_verified_unknown_fingerprint_is_not_found() {
        let (directory, _store, _notifier) = make_directory();
        let result = directory.set_verified("fp-ghost", true).await;
        assert!(matches!(result, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_notifier_failure_does_not_fail_claim() {
        let store = Arc::new(MemoryStore::new());
        let notifier = Arc::new(RecordingNotifier {
            sent: Mutex::new(Vec::new()),
            should_fail: true,
        });
        let directory = Directory::new(
            store as Arc<dyn IdentityStore>,
            notifier as Arc<dyn VerificationNotifier>,
        );

        let outcome = directory
            .claim(claim_request("fp-a", "alice@example.com", "laptop"))
            .await
            .unwrap();
        assert_eq!(outcome, ClaimOutcome::PendingVerification);
    }

    #[tokio::test]
    async fn test_notify_skips_empty_user() {
        let (directory, _store, notifier) = make_directory();
        directory.notify("").await;
        assert!(notifier.sent.lock().unwrap().is_empty());
    }
}
