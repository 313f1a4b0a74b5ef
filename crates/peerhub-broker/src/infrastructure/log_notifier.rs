//! Log-only [`VerificationNotifier`] adapter.
//!
//! Actual delivery (email in the reference deployment) is an external
//! collaborator; this adapter records the request in the broker's log so
//! local development and tests have a visible notification path.

use async_trait::async_trait;
use tracing::info;

use peerhub_core::notifier::{NotifyError, VerificationNotifier};

/// Notifier that logs instead of delivering.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl VerificationNotifier for LogNotifier {
    async fn send_verification(&self, user: &str) -> Result<(), NotifyError> {
        info!(user, "verification notification requested; delivery is handled out of band");
        Ok(())
    }
}
