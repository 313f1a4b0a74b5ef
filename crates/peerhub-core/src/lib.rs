//! # peerhub-core
//!
//! Shared library for the peerhub control-plane broker containing the domain
//! entities, the JSON wire frame types, and the contracts for the external
//! services the broker consumes.
//!
//! This crate is used by the broker binary and by anything that needs to
//! speak its wire format. It has zero dependencies on network sockets, the
//! async runtime, or any storage backend.
//!
//! The broker itself is the identity, presence, and message-routing plane for
//! devices that belong to the same account: devices are addressed by a stable
//! public-key-derived *fingerprint*, announce themselves over a WebSocket
//! session, and exchange small control frames with sibling devices before
//! setting up a direct data channel elsewhere. This crate defines:
//!
//! - **`identity`** – The persisted [`PeerIdentity`] record and the
//!   [`SessionClaims`] a connecting client presents for comparison against it.
//!
//! - **`frames`** – What travels over the socket after the upgrade: free-form
//!   JSON request frames addressed by fingerprint, and the status frames the
//!   broker pushes back.
//!
//! - **`store`** – The [`IdentityStore`] contract the broker consumes for
//!   persisted peer records. Backends only need per-key atomicity.
//!
//! - **`notifier`** – The [`VerificationNotifier`] contract for best-effort
//!   out-of-band verification messages.

pub mod frames;
pub mod identity;
pub mod notifier;
pub mod store;

pub use frames::{FrameError, RequestFrame, StatusFrame};
pub use identity::{PeerIdentity, SessionClaims};
pub use notifier::{NotifyError, VerificationNotifier};
pub use store::{IdentityStore, StoreError};

/// Stable public-key-derived peer identifier; the addressing key for both
/// storage and routing.
pub type Fingerprint = String;
