//! Envelope state machine: guarded, side-effect-free transitions.
//!
//! ```text
//! draft -> created -> scheduled -> sent -> delivered -> completed
//!   |         |                     |  \       |     /
//!   +---------+--------> sent       |   +-> declined
//!                                   +-> paused -> (sent | delivered | declined)
//! any non-draft, non-terminal --void--> voided
//! draft --delete--> (soft deleted)
//! ```
//!
//! Every failed transition leaves the input envelope untouched; callers get
//! a new envelope only on success.

use chrono::{DateTime, Utc};
use quillflow_types::envelope::{
    CustomField, Envelope, EnvelopeStatus, RecipientStatus, UpdateEnvelopeRequest,
};
use quillflow_types::error::EnvelopeError;

use crate::routing;

/// Something that happens to an envelope.
#[derive(Debug, Clone)]
pub enum EnvelopeEvent {
    /// Lock the draft's content without sending it.
    Finalize,
    /// Edit draft fields.
    Update(UpdateEnvelopeRequest),
    /// Hold the envelope until `at`.
    Schedule { at: DateTime<Utc> },
    Send,
    /// A recipient opened the envelope.
    Deliver,
    /// A required recipient declined.
    Decline,
    Pause,
    Resume,
    /// Every recipient has settled.
    Complete,
    Void { reason: String },
    /// Soft delete.
    Delete,
}

impl EnvelopeEvent {
    pub fn name(&self) -> &'static str {
        match self {
            EnvelopeEvent::Finalize => "finalize",
            EnvelopeEvent::Update(_) => "update",
            EnvelopeEvent::Schedule { .. } => "schedule",
            EnvelopeEvent::Send => "send",
            EnvelopeEvent::Deliver => "deliver",
            EnvelopeEvent::Decline => "decline",
            EnvelopeEvent::Pause => "pause",
            EnvelopeEvent::Resume => "resume",
            EnvelopeEvent::Complete => "complete",
            EnvelopeEvent::Void { .. } => "void",
            EnvelopeEvent::Delete => "delete",
        }
    }
}

/// Applies [`EnvelopeEvent`]s to envelopes.
#[derive(Debug, Clone)]
pub struct EnvelopeStateMachine {
    max_delay_days: u32,
}

impl Default for EnvelopeStateMachine {
    fn default() -> Self {
        Self::new(30)
    }
}

impl EnvelopeStateMachine {
    pub fn new(max_delay_days: u32) -> Self {
        Self { max_delay_days }
    }

    pub fn max_delay_days(&self) -> u32 {
        self.max_delay_days
    }

    /// Apply `event` at time `at`, returning the updated envelope.
    pub fn transition(
        &self,
        envelope: &Envelope,
        event: EnvelopeEvent,
        at: DateTime<Utc>,
    ) -> Result<Envelope, EnvelopeError> {
        if envelope.is_deleted() {
            return Err(EnvelopeError::BusinessLogic(
                "envelope has been deleted".to_string(),
            ));
        }

        let from = envelope.status;
        let mut next = envelope.clone();

        match event {
            EnvelopeEvent::Finalize => {
                require(from, &[EnvelopeStatus::Draft], "finalize")?;
                self.validate_ready(envelope)?;
                next.status = EnvelopeStatus::Created;
            }
            EnvelopeEvent::Update(changes) => {
                ensure_mutable(envelope)?;
                apply_update(&mut next, changes)?;
            }
            EnvelopeEvent::Schedule { at: send_at } => {
                require(
                    from,
                    &[EnvelopeStatus::Draft, EnvelopeStatus::Created],
                    "schedule",
                )?;
                if send_at <= at {
                    return Err(EnvelopeError::Validation(
                        "scheduled send time must be in the future".to_string(),
                    ));
                }
                self.validate_ready(envelope)?;
                next.status = EnvelopeStatus::Scheduled;
                next.scheduled_send_at = Some(send_at);
            }
            EnvelopeEvent::Send => {
                require(
                    from,
                    &[
                        EnvelopeStatus::Draft,
                        EnvelopeStatus::Created,
                        EnvelopeStatus::Scheduled,
                    ],
                    "send",
                )?;
                self.validate_ready(envelope)?;
                next.status = EnvelopeStatus::Sent;
                next.sent_date_time = Some(at);
            }
            EnvelopeEvent::Deliver => {
                require(from, &[EnvelopeStatus::Sent], "mark delivered")?;
                next.status = EnvelopeStatus::Delivered;
                next.delivered_date_time = Some(at);
            }
            EnvelopeEvent::Decline => {
                require(
                    from,
                    &[EnvelopeStatus::Sent, EnvelopeStatus::Delivered],
                    "mark declined",
                )?;
                next.status = EnvelopeStatus::Declined;
            }
            EnvelopeEvent::Pause => {
                if from.is_pre_send() {
                    return Err(EnvelopeError::BusinessLogic(format!(
                        "cannot pause an envelope that has not been sent (status: {from})"
                    )));
                }
                require(
                    from,
                    &[
                        EnvelopeStatus::Sent,
                        EnvelopeStatus::Delivered,
                        EnvelopeStatus::Declined,
                    ],
                    "pause",
                )?;
                next.status = EnvelopeStatus::Paused;
            }
            EnvelopeEvent::Resume => {
                require(from, &[EnvelopeStatus::Paused], "resume")?;
                next.status = in_flight_status(envelope);
                if next.status == EnvelopeStatus::Delivered && next.delivered_date_time.is_none() {
                    next.delivered_date_time = Some(at);
                }
            }
            EnvelopeEvent::Complete => {
                require(
                    from,
                    &[
                        EnvelopeStatus::Sent,
                        EnvelopeStatus::Delivered,
                        EnvelopeStatus::Declined,
                    ],
                    "complete",
                )?;
                if envelope.sent_date_time.is_none() {
                    return Err(EnvelopeError::BusinessLogic(
                        "envelope was never sent".to_string(),
                    ));
                }
                if !routing::is_routing_complete(&envelope.recipients) {
                    return Err(EnvelopeError::BusinessLogic(
                        "recipients are still pending".to_string(),
                    ));
                }
                next.status = EnvelopeStatus::Completed;
                next.completed_date_time = Some(at);
            }
            EnvelopeEvent::Void { reason } => {
                match from {
                    EnvelopeStatus::Draft => {
                        return Err(EnvelopeError::BusinessLogic(
                            "cannot void a draft envelope; delete it instead".to_string(),
                        ));
                    }
                    s if s.is_terminal() => {
                        return Err(EnvelopeError::BusinessLogic(format!(
                            "envelope is already {s}"
                        )));
                    }
                    _ => {}
                }
                let reason = reason.trim();
                if reason.is_empty() {
                    return Err(EnvelopeError::Validation(
                        "a void reason is required".to_string(),
                    ));
                }
                next.status = EnvelopeStatus::Voided;
                next.voided_date_time = Some(at);
                next.voided_reason = Some(reason.to_string());
            }
            EnvelopeEvent::Delete => {
                if from != EnvelopeStatus::Draft {
                    return Err(EnvelopeError::BusinessLogic(format!(
                        "only draft envelopes can be deleted (status: {from})"
                    )));
                }
                next.deleted_at = Some(at);
            }
        }

        debug_assert!(next.status == from || from.can_transition_to(next.status));
        next.updated_at = at;
        Ok(next)
    }

    /// Documents and recipients are present and routing is well-formed.
    pub fn validate_ready(&self, envelope: &Envelope) -> Result<(), EnvelopeError> {
        if envelope.documents.is_empty() {
            return Err(EnvelopeError::Validation(
                "envelope has no documents".to_string(),
            ));
        }
        if envelope.recipients.is_empty() {
            return Err(EnvelopeError::Validation(
                "envelope has no recipients".to_string(),
            ));
        }
        routing::validate_routing(&envelope.recipients, self.max_delay_days)
    }
}

/// Content edits (fields, documents, recipients) are only allowed on live drafts.
pub fn ensure_mutable(envelope: &Envelope) -> Result<(), EnvelopeError> {
    if envelope.is_deleted() {
        return Err(EnvelopeError::BusinessLogic(
            "envelope has been deleted".to_string(),
        ));
    }
    if envelope.status != EnvelopeStatus::Draft {
        return Err(EnvelopeError::BusinessLogic(format!(
            "envelope is {}; only drafts can be modified",
            envelope.status
        )));
    }
    Ok(())
}

/// The status a paused envelope returns to, derived from recipient progress.
pub fn in_flight_status(envelope: &Envelope) -> EnvelopeStatus {
    let declined = envelope.recipients.iter().any(|r| {
        r.recipient_type.is_required() && r.status == RecipientStatus::Declined
    });
    if declined {
        EnvelopeStatus::Declined
    } else if envelope.delivered_date_time.is_some()
        || envelope.recipients.iter().any(|r| r.delivered_at.is_some())
    {
        EnvelopeStatus::Delivered
    } else {
        EnvelopeStatus::Sent
    }
}

/// Validate custom fields: non-empty, unique names.
pub fn validate_custom_fields(fields: &[CustomField]) -> Result<(), EnvelopeError> {
    let mut seen = std::collections::HashSet::new();
    for field in fields {
        let name = field.name.trim();
        if name.is_empty() {
            return Err(EnvelopeError::Validation(
                "custom field name cannot be empty".to_string(),
            ));
        }
        if !seen.insert(name.to_lowercase()) {
            return Err(EnvelopeError::Validation(format!(
                "duplicate custom field '{name}'"
            )));
        }
    }
    Ok(())
}

fn require(
    from: EnvelopeStatus,
    allowed: &[EnvelopeStatus],
    action: &str,
) -> Result<(), EnvelopeError> {
    if allowed.contains(&from) {
        Ok(())
    } else {
        Err(EnvelopeError::BusinessLogic(format!(
            "cannot {action} an envelope in status '{from}'"
        )))
    }
}

fn apply_update(envelope: &mut Envelope, changes: UpdateEnvelopeRequest) -> Result<(), EnvelopeError> {
    if let Some(subject) = changes.subject {
        let trimmed = subject.trim();
        if trimmed.is_empty() {
            return Err(EnvelopeError::Validation(
                "subject cannot be empty".to_string(),
            ));
        }
        envelope.subject = trimmed.to_string();
    }
    if let Some(message) = changes.message {
        envelope.message = if message.trim().is_empty() {
            None
        } else {
            Some(message)
        };
    }
    if let Some(mode) = changes.routing_mode {
        envelope.routing_mode = mode;
    }
    if let Some(fields) = changes.custom_fields {
        validate_custom_fields(&fields)?;
        envelope.custom_fields = fields;
    }
    Ok(())
}
