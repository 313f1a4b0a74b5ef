//! Contract for best-effort out-of-band verification messages.
//!
//! Delivery (email in the reference deployment) happens outside the broker.
//! Callers log failures and never let them reach the socket-facing error
//! path.

use async_trait::async_trait;
use thiserror::Error;

/// Error type for notification delivery.
#[derive(Debug, Error)]
#[error("verification notification failed: {0}")]
pub struct NotifyError(pub String);

/// Sends a verification request to a user's out-of-band channel.
#[async_trait]
pub trait VerificationNotifier: Send + Sync {
    /// Asks the user to confirm ownership of a pending device. Best-effort.
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError`] when delivery could not even be attempted;
    /// callers log and continue.
    async fn send_verification(&self, user: &str) -> Result<(), NotifyError>;
}
