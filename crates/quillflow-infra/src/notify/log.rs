//! Notifier that only writes a structured log line.

use quillflow_core::notify::{Notifier, NotifyError};
use quillflow_types::envelope::{Envelope, EnvelopeRecipient};

/// Logs each access-link notification at info level. The default adapter.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl LogNotifier {
    pub fn new() -> Self {
        Self
    }
}

impl Notifier for LogNotifier {
    async fn notify(
        &self,
        envelope: &Envelope,
        recipient: &EnvelopeRecipient,
    ) -> Result<(), NotifyError> {
        tracing::info!(
            envelope_id = %envelope.id,
            recipient_id = %recipient.id,
            email = %recipient.email,
            recipient_type = %recipient.recipient_type,
            subject = %envelope.subject,
            "Recipient notified"
        );
        Ok(())
    }
}
