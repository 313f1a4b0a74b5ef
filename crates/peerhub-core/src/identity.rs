//! Persisted peer records and the claims a connecting client presents.
//!
//! A [`PeerIdentity`] is created the first time a fingerprint is claimed for
//! an account and lives in the identity store from then on. A
//! [`SessionClaims`] is the ephemeral counterpart: the fingerprint, owning
//! user, display name, and device kind a client asserts when it opens a
//! session. The broker never trusts claims over the persisted record; the
//! comparison in [`PeerIdentity::matches`] is what decides whether a session
//! authenticates.

use serde::{Deserialize, Serialize};

use crate::Fingerprint;

/// Persisted record of a known device, keyed by fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerIdentity {
    /// Stable public-key-derived identifier; unique across the store.
    pub fingerprint: Fingerprint,
    /// Owning account identifier (an email address in practice).
    pub user: String,
    /// Human-readable display label.
    pub name: String,
    /// Client category, e.g. `"server"` or `"terminal"`.
    pub kind: String,
    /// Set only after out-of-band confirmation completes.
    pub verified: bool,
}

impl PeerIdentity {
    /// Creates a new, not-yet-verified record from a claim.
    pub fn unverified(fingerprint: &str, user: &str, name: &str, kind: &str) -> Self {
        Self {
            fingerprint: fingerprint.to_string(),
            user: user.to_string(),
            name: name.to_string(),
            kind: kind.to_string(),
            verified: false,
        }
    }

    /// Returns `true` when the claimed user, name, and kind all match this
    /// record. A mismatch on any field means the device changed its
    /// properties and must re-verify.
    pub fn matches(&self, claims: &SessionClaims) -> bool {
        self.user == claims.user && self.name == claims.name && self.kind == claims.kind
    }
}

/// The connection parameters a client presents when opening a session.
///
/// Only the fingerprint is mandatory; the remaining fields default to empty
/// strings and are compared verbatim against the persisted record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionClaims {
    pub fingerprint: Fingerprint,
    pub user: String,
    pub name: String,
    pub kind: String,
}

// ── Tests ─────────────────────────────────────────────────────────────────────
