//! Notifier adapters.
//!
//! Implement `Notifier` from `quillflow-core`. Which adapter runs is picked
//! from `[notifier]` in `config.toml`.

pub mod http;
pub mod log;

use quillflow_core::notify::{Notifier, NotifyError};
use quillflow_types::config::{NotifierKind, NotifierSettings};
use quillflow_types::envelope::{Envelope, EnvelopeRecipient};

pub use http::HttpNotifier;
pub use log::LogNotifier;

/// The notifier selected by configuration.
pub enum ConfiguredNotifier {
    Log(LogNotifier),
    Http(HttpNotifier),
}

impl ConfiguredNotifier {
    /// Build the adapter named by `settings.kind`.
    pub fn from_settings(settings: &NotifierSettings) -> Result<Self, NotifyError> {
        match settings.kind {
            NotifierKind::Log => Ok(Self::Log(LogNotifier::new())),
            NotifierKind::Http => Ok(Self::Http(HttpNotifier::from_settings(settings)?)),
        }
    }
}

impl Notifier for ConfiguredNotifier {
    async fn notify(
        &self,
        envelope: &Envelope,
        recipient: &EnvelopeRecipient,
    ) -> Result<(), NotifyError> {
        match self {
            Self::Log(n) => n.notify(envelope, recipient).await,
            Self::Http(n) => n.notify(envelope, recipient).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings_pick_log_notifier() {
        let notifier = ConfiguredNotifier::from_settings(&NotifierSettings::default()).unwrap();
        assert!(matches!(notifier, ConfiguredNotifier::Log(_)));
    }

    #[test]
    fn test_http_without_url_is_rejected() {
        let settings = NotifierSettings {
            kind: NotifierKind::Http,
            ..Default::default()
        };
        assert!(matches!(
            ConfiguredNotifier::from_settings(&settings),
            Err(NotifyError::Rejected(_))
        ));
    }

    #[test]
    fn test_http_with_url() {
        let settings = NotifierSettings {
            kind: NotifierKind::Http,
            url: Some("http://127.0.0.1:9/notify".to_string()),
            ..Default::default()
        };
        let notifier = ConfiguredNotifier::from_settings(&settings).unwrap();
        assert!(matches!(notifier, ConfiguredNotifier::Http(_)));
    }
}
