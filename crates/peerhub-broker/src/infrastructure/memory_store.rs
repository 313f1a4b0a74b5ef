//! In-memory [`IdentityStore`] adapter.
//!
//! Backs local development and the test suites. Every operation takes the
//! map lock once, which gives the per-key atomicity the contract asks for;
//! nothing here survives a restart. Production deployments put a persistent
//! backend behind the same trait.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use peerhub_core::identity::PeerIdentity;
use peerhub_core::store::{IdentityStore, StoreError};

/// Process-local identity store over a `HashMap`.
#[derive(Default)]
pub struct MemoryStore {
    peers: RwLock<HashMap<String, PeerIdentity>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl IdentityStore for MemoryStore {
    async fn exists(&self, fingerprint: &str) -> Result<bool, StoreError> {
        Ok(self.peers.read().await.contains_key(fingerprint))
    }

    async fn get(&self, fingerprint: &str) -> Result<PeerIdentity, StoreError> {
        self.peers
            .read()
            .await
            .get(fingerprint)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(fingerprint.to_string()))
    }

    async fn put_new(&self, identity: PeerIdentity) -> Result<(), StoreError> {
        let mut peers = self.peers.write().await;
        if peers.contains_key(&identity.fingerprint) {
            return Err(StoreError::Conflict(identity.fingerprint));
        }
        peers.insert(identity.fingerprint.clone(), identity);
        Ok(())
    }

    async fn list_by_user(&self, user: &str) -> Result<Vec<PeerIdentity>, StoreError> {
        let mut peers: Vec<PeerIdentity> = self
            .peers
            .read()
            .await
            .values()
            .filter(|p| p.user == user)
            .cloned()
            .collect();
        // Stable output order for callers and tests.
        peers.sort_by(|a, b| a.fingerprint.cmp(&b.fingerprint));
        Ok(peers)
    }

    async fn set_verified(&self, fingerprint: &str, verified: bool) -> Result<(), StoreError> {
        let mut peers = self.peers.write().await;
        let peer = peers
            .get_mut(fingerprint)
            .ok_or_else(|| StoreError::NotFound(fingerprint.to_string()))?;
        peer.verified = verified;
        Ok(())
    }

    async fn set_name(&self, fingerprint: &str, name: &str) -> Result<(), StoreError> {
        let mut peers = self.peers.write().await;
        let peer = peers
            .get_mut(fingerprint)
            .ok_or_else(|| StoreError::NotFound(fingerprint.to_string()))?;
        peer.name = name.to_string();
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
