//! Webhook notifier: POSTs a JSON payload per recipient notification.

use std::time::Duration;

use quillflow_core::notify::{Notifier, NotifyError};
use quillflow_types::config::NotifierSettings;
use quillflow_types::envelope::{Envelope, EnvelopeRecipient, RecipientAction};
use serde::Serialize;

/// Body sent to the configured endpoint.
#[derive(Debug, Serialize)]
pub struct NotificationPayload<'a> {
    pub envelope_id: String,
    pub account_id: String,
    pub subject: &'a str,
    pub message: Option<&'a str>,
    pub recipient_id: String,
    pub recipient_name: &'a str,
    pub recipient_email: &'a str,
    pub recipient_type: String,
    pub action: RecipientAction,
    pub routing_order: u32,
}

impl<'a> NotificationPayload<'a> {
    pub fn new(envelope: &'a Envelope, recipient: &'a EnvelopeRecipient) -> Self {
        Self {
            envelope_id: envelope.id.to_string(),
            account_id: envelope.account_id.to_string(),
            subject: &envelope.subject,
            message: envelope.message.as_deref(),
            recipient_id: recipient.id.to_string(),
            recipient_name: &recipient.name,
            recipient_email: &recipient.email,
            recipient_type: recipient.recipient_type.to_string(),
            action: recipient.recipient_type.action(),
            routing_order: recipient.routing_order,
        }
    }
}

pub struct HttpNotifier {
    client: reqwest::Client,
    url: String,
}

impl HttpNotifier {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NotifyError::Transport(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub fn from_settings(settings: &NotifierSettings) -> Result<Self, NotifyError> {
        let url = settings.url.as_deref().ok_or_else(|| {
            NotifyError::Rejected("notifier.url is required for the http notifier".to_string())
        })?;
        Self::new(url, Duration::from_secs(settings.timeout_secs))
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Notifier for HttpNotifier {
    async fn notify(
        &self,
        envelope: &Envelope,
        recipient: &EnvelopeRecipient,
    ) -> Result<(), NotifyError> {
        let payload = NotificationPayload::new(envelope, recipient);

        let response = self
            .client
            .post(&self.url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| NotifyError::Transport(format!("HTTP request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NotifyError::Rejected(format!("HTTP {status}: {body}")));
        }

        tracing::debug!(
            envelope_id = %envelope.id,
            recipient_id = %recipient.id,
            url = %self.url,
            "Notification delivered"
        );
        Ok(())
    }
}
