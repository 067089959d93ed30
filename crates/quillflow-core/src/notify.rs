//! Recipient notification port.
//!
//! The coordinator calls the notifier after a transition has been committed.
//! A failed notification never rolls back state; the recipient keeps
//! `notified_at = None` and the next scheduler pass retries it.

use quillflow_types::envelope::{Envelope, EnvelopeRecipient};
use thiserror::Error;

/// Errors a notifier adapter can report.
#[derive(Debug, Error)]
pub enum NotifyError {
    /// The downstream service refused the notification.
    #[error("notification rejected: {0}")]
    Rejected(String),

    /// The notification could not be delivered at all.
    #[error("notification transport failed: {0}")]
    Transport(String),
}

/// Sends a recipient its access link.
pub trait Notifier: Send + Sync {
    fn notify(
        &self,
        envelope: &Envelope,
        recipient: &EnvelopeRecipient,
    ) -> impl std::future::Future<Output = Result<(), NotifyError>> + Send;
}
