//! Event types for the QuillFlow workflow event bus.
//!
//! `WorkflowEvent` is broadcast after each committed workflow transition.
//! All variants are Clone + Send + Sync for use with tokio broadcast channels.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::envelope::{EnvelopeId, EnvelopeStatus, RecipientStatus};

/// Events emitted by the workflow coordinator.
///
/// Subscribers (audit log, UI push) only ever see committed state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkflowEvent {
    /// The envelope is waiting for its scheduled send time.
    EnvelopeScheduled {
        envelope_id: EnvelopeId,
        scheduled_send_at: DateTime<Utc>,
    },

    EnvelopeSent {
        envelope_id: EnvelopeId,
        sent_at: DateTime<Utc>,
    },

    /// A recipient became eligible to act.
    RecipientActivated {
        envelope_id: EnvelopeId,
        recipient_id: Uuid,
        /// 0-based wave index.
        wave: usize,
        notify_at: DateTime<Utc>,
    },

    /// The notifier accepted the access link for a recipient.
    RecipientNotified {
        envelope_id: EnvelopeId,
        recipient_id: Uuid,
    },

    /// A recipient reported progress.
    RecipientActed {
        envelope_id: EnvelopeId,
        recipient_id: Uuid,
        status: RecipientStatus,
    },

    /// The envelope moved between in-flight statuses (delivered, declined).
    StatusChanged {
        envelope_id: EnvelopeId,
        from: EnvelopeStatus,
        to: EnvelopeStatus,
    },

    /// Wave activation is frozen.
    EnvelopePaused { envelope_id: EnvelopeId },

    /// Routing picked up again in `status`.
    EnvelopeResumed {
        envelope_id: EnvelopeId,
        status: EnvelopeStatus,
    },

    EnvelopeCompleted {
        envelope_id: EnvelopeId,
        completed_at: DateTime<Utc>,
    },

    EnvelopeVoided {
        envelope_id: EnvelopeId,
        reason: String,
    },
}

impl WorkflowEvent {
    /// The envelope this event belongs to.
    pub fn envelope_id(&self) -> EnvelopeId {
        match self {
            WorkflowEvent::EnvelopeScheduled { envelope_id, .. }
            | WorkflowEvent::EnvelopeSent { envelope_id, .. }
            | WorkflowEvent::RecipientActivated { envelope_id, .. }
            | WorkflowEvent::RecipientNotified { envelope_id, .. }
            | WorkflowEvent::RecipientActed { envelope_id, .. }
            | WorkflowEvent::StatusChanged { envelope_id, .. }
            | WorkflowEvent::EnvelopePaused { envelope_id }
            | WorkflowEvent::EnvelopeResumed { envelope_id, .. }
            | WorkflowEvent::EnvelopeCompleted { envelope_id, .. }
            | WorkflowEvent::EnvelopeVoided { envelope_id, .. } => *envelope_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recipient_activated_serde_roundtrip() {
        let event = WorkflowEvent::RecipientActivated {
            envelope_id: EnvelopeId::new(),
            recipient_id: Uuid::now_v7(),
            wave: 1,
            notify_at: Utc::now(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"recipient_activated\""));
        let parsed: WorkflowEvent = serde_json::from_str(&json).unwrap();
        assert!(matches!(parsed, WorkflowEvent::RecipientActivated { wave: 1, .. }));
    }

    #[test]
    fn test_status_changed_uses_lowercase_statuses() {
        let event = WorkflowEvent::StatusChanged {
            envelope_id: EnvelopeId::new(),
            from: EnvelopeStatus::Sent,
            to: EnvelopeStatus::Paused,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"from\":\"sent\""));
        assert!(json.contains("\"to\":\"paused\""));
    }

    #[test]
    fn test_envelope_id_accessor() {
        let id = EnvelopeId::new();
        let event = WorkflowEvent::EnvelopeVoided {
            envelope_id: id,
            reason: "workflow cancelled".to_string(),
        };
        assert_eq!(event.envelope_id(), id);
    }
}
