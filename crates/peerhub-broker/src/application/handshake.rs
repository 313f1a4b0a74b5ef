//! Connection handshake: claim parsing and identity binding.
//!
//! A connecting client presents its claims as URL query parameters:
//! `fingerprint` (required), `user`, `name`, and `kind`. The claims are
//! resolved against the identity store into a [`HandshakeVerdict`]:
//!
//! - No persisted record → [`HandshakeVerdict::PeerNotFound`].
//! - Record exists but user/name/kind differ → [`HandshakeVerdict::PeerChanged`].
//!   Claims are never trusted over the persisted record; the device must
//!   re-verify out of band.
//! - Record exists and all fields match → [`HandshakeVerdict::Authenticated`].
//!
//! Only a missing fingerprint refuses the connection outright (before the
//! socket upgrade). The two non-authenticated verdicts still get an upgraded
//! socket so the broker can push a status frame explaining why the session
//! is not yet trusted; such sessions are excluded from routing until they
//! reconnect after re-verification.

use thiserror::Error;

use peerhub_core::frames::StatusFrame;
use peerhub_core::identity::{PeerIdentity, SessionClaims};
use peerhub_core::store::{IdentityStore, StoreError};

/// Error type for handshake processing.
#[derive(Debug, Error)]
pub enum HandshakeError {
    /// The client did not present a fingerprint; refused before upgrade.
    #[error("missing `fingerprint` connection parameter")]
    MissingFingerprint,
    /// The identity store could not answer.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Outcome of resolving a session's claims against the identity store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeVerdict {
    /// Claims match the persisted record.
    Authenticated(PeerIdentity),
    /// The fingerprint is unknown to the store.
    PeerNotFound,
    /// The fingerprint is known but the claims differ from the persisted
    /// record, which is carried along for its cached owner and name.
    PeerChanged(PeerIdentity),
}

impl HandshakeVerdict {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, HandshakeVerdict::Authenticated(_))
    }

    /// The status frame pushed to a session that did not authenticate.
    pub fn status_frame(&self, fingerprint: &str) -> Option<StatusFrame> {
        match self {
            HandshakeVerdict::Authenticated(_) => None,
            HandshakeVerdict::PeerNotFound => Some(StatusFrame::new(
                401,
                format!("peer not found: {fingerprint}"),
            )),
            HandshakeVerdict::PeerChanged(_) => Some(StatusFrame::new(
                401,
                "peer exists with different properties",
            )),
        }
    }
}

/// Parses connection claims out of a raw query string.
///
/// Unknown parameters are ignored; absent optional parameters become empty
/// strings and simply fail the claim comparison if the record has values.
///
/// # Errors
///
/// Returns [`HandshakeError::MissingFingerprint`] when the `fingerprint`
/// parameter is absent or empty.
pub fn parse_claims(query: &str) -> Result<SessionClaims, HandshakeError> {
    let mut claims = SessionClaims::default();
    for (key, value) in form_urlencoded::parse(query.as_bytes()) {
        match key.as_ref() {
            "fingerprint" => claims.fingerprint = value.into_owned(),
            "user" => claims.user = value.into_owned(),
            "name" => claims.name = value.into_owned(),
            "kind" => claims.kind = value.into_owned(),
            _ => {}
        }
    }
    if claims.fingerprint.is_empty() {
        return Err(HandshakeError::MissingFingerprint);
    }
    Ok(claims)
}

/// Resolves claims against the identity store.
///
/// # Errors
///
/// Returns the store error verbatim when the backend cannot answer; the
/// caller decides whether that refuses the upgrade or closes the session.
pub async fn resolve(
    store: &dyn IdentityStore,
    claims: &SessionClaims,
) -> Result<HandshakeVerdict, StoreError> {
    match store.get(&claims.fingerprint).await {
        Ok(identity) => {
            if identity.matches(claims) {
                Ok(HandshakeVerdict::Authenticated(identity))
            } else {
                Ok(HandshakeVerdict::PeerChanged(identity))
            }
        }
        Err(StoreError::NotFound(_)) => Ok(HandshakeVerdict::PeerNotFound),
        Err(e) => Err(e),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
