//! Contract for the persisted identity store the broker consumes.
//!
//! The backing implementation lives outside the core: the broker only needs
//! the per-key operations below, each atomic on its own. No cross-key
//! transactions are required, and the hub's in-memory registry never depends
//! on store availability once a session is registered.

use async_trait::async_trait;
use thiserror::Error;

use crate::identity::PeerIdentity;

/// Error type for identity store operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    /// No record exists for the fingerprint.
    #[error("peer not found: {0}")]
    NotFound(String),
    /// A record for the fingerprint already exists.
    #[error("fingerprint already registered: {0}")]
    Conflict(String),
    /// The backend could not serve the request.
    #[error("identity store failure: {0}")]
    Unavailable(String),
}

/// Persisted peer records, keyed by fingerprint and queryable by owning user.
///
/// Implementations must make each individual operation atomic; the broker
/// never assumes ordering across keys.
#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Returns whether a record exists for the fingerprint.
    async fn exists(&self, fingerprint: &str) -> Result<bool, StoreError>;

    /// Fetches the record for a fingerprint.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when no record exists.
    async fn get(&self, fingerprint: &str) -> Result<PeerIdentity, StoreError>;

    /// Inserts a record for a fingerprint not yet present.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Conflict`] when the fingerprint is taken.
    async fn put_new(&self, identity: PeerIdentity) -> Result<(), StoreError>;

    /// Lists every record owned by a user, connected or not.
    async fn list_by_user(&self, user: &str) -> Result<Vec<PeerIdentity>, StoreError>;

    /// Flips the verified flag for a fingerprint.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when no record exists.
    async fn set_verified(&self, fingerprint: &str, verified: bool) -> Result<(), StoreError>;

    /// Updates the display name for a fingerprint.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when no record exists.
    async fn set_name(&self, fingerprint: &str, name: &str) -> Result<(), StoreError>;
}
