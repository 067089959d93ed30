use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use std::fmt;
use std::str::FromStr;

/// Unique identifier for an envelope, wrapping a UUID v7 (time-sortable).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EnvelopeId(pub Uuid);

impl EnvelopeId {
    /// Create a new EnvelopeId using UUID v7.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Create an EnvelopeId from an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for EnvelopeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EnvelopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for EnvelopeId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// An envelope: a package of documents routed to recipients for signature.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub id: EnvelopeId,
    /// Owning account. Every access is scoped to it.
    pub account_id: Uuid,
    pub subject: String,
    /// Optional email blurb sent along with access links.
    pub message: Option<String>,
    pub status: EnvelopeStatus,
    /// How recipients are activated relative to each other.
    pub routing_mode: RoutingMode,
    pub documents: Vec<EnvelopeDocument>,
    pub recipients: Vec<EnvelopeRecipient>,
    pub custom_fields: Vec<CustomField>,
    /// Set while the envelope waits in `scheduled`.
    pub scheduled_send_at: Option<DateTime<Utc>>,
    pub sent_date_time: Option<DateTime<Utc>>,
    pub delivered_date_time: Option<DateTime<Utc>>,
    pub completed_date_time: Option<DateTime<Utc>>,
    pub voided_date_time: Option<DateTime<Utc>>,
    pub voided_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Soft-delete marker. Deleted envelopes are invisible to lookups.
    pub deleted_at: Option<DateTime<Utc>>,
    /// Bumped by every successful save. A save carrying an older version
    /// is rejected as a conflict.
    #[serde(default)]
    pub version: i64,
}

impl Envelope {
    /// Build a fresh draft envelope for an account.
    pub fn draft(account_id: Uuid, subject: impl Into<String>, routing_mode: RoutingMode) -> Self {
        let now = Utc::now();
        Self {
            id: EnvelopeId::new(),
            account_id,
            subject: subject.into(),
            message: None,
            status: EnvelopeStatus::Draft,
            routing_mode,
            documents: Vec::new(),
            recipients: Vec::new(),
            custom_fields: Vec::new(),
            scheduled_send_at: None,
            sent_date_time: None,
            delivered_date_time: None,
            completed_date_time: None,
            voided_date_time: None,
            voided_reason: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
            version: 0,
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    pub fn recipient(&self, id: &Uuid) -> Option<&EnvelopeRecipient> {
        self.recipients.iter().find(|r| r.id == *id)
    }

    pub fn recipient_mut(&mut self, id: &Uuid) -> Option<&mut EnvelopeRecipient> {
        self.recipients.iter_mut().find(|r| r.id == *id)
    }
}

/// Envelope lifecycle states.
///
/// - Draft: editable, not yet routed
/// - Created: content locked, ready to send
/// - Scheduled: waiting for `scheduled_send_at`
/// - Sent / Delivered / Declined: in flight
/// - Paused: in flight, wave activation frozen
/// - Completed / Voided: terminal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvelopeStatus {
    Draft,
    Created,
    Scheduled,
    Sent,
    Delivered,
    Declined,
    Paused,
    Completed,
    Voided,
}

impl EnvelopeStatus {
    /// Terminal states accept no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, EnvelopeStatus::Completed | EnvelopeStatus::Voided)
    }

    /// Recipients are being routed (paused envelopes are excluded).
    pub fn is_in_flight(self) -> bool {
        matches!(
            self,
            EnvelopeStatus::Sent | EnvelopeStatus::Delivered | EnvelopeStatus::Declined
        )
    }

    /// The envelope has not been sent yet.
    pub fn is_pre_send(self) -> bool {
        matches!(
            self,
            EnvelopeStatus::Draft | EnvelopeStatus::Created | EnvelopeStatus::Scheduled
        )
    }

    /// Statuses directly reachable from this one.
    pub fn successors(self) -> &'static [EnvelopeStatus] {
        use EnvelopeStatus::*;
        match self {
            Draft => &[Created, Scheduled, Sent],
            Created => &[Scheduled, Sent, Voided],
            Scheduled => &[Sent, Voided],
            Sent => &[Delivered, Declined, Paused, Completed, Voided],
            Delivered => &[Declined, Paused, Completed, Voided],
            Declined => &[Paused, Completed, Voided],
            Paused => &[Sent, Delivered, Declined, Voided],
            Completed | Voided => &[],
        }
    }

    pub fn can_transition_to(self, next: EnvelopeStatus) -> bool {
        self.successors().contains(&next)
    }
}

impl fmt::Display for EnvelopeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EnvelopeStatus::Draft => "draft",
            EnvelopeStatus::Created => "created",
            EnvelopeStatus::Scheduled => "scheduled",
            EnvelopeStatus::Sent => "sent",
            EnvelopeStatus::Delivered => "delivered",
            EnvelopeStatus::Declined => "declined",
            EnvelopeStatus::Paused => "paused",
            EnvelopeStatus::Completed => "completed",
            EnvelopeStatus::Voided => "voided",
        };
        write!(f, "{s}")
    }
}

impl FromStr for EnvelopeStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "draft" => Ok(EnvelopeStatus::Draft),
            "created" => Ok(EnvelopeStatus::Created),
            "scheduled" => Ok(EnvelopeStatus::Scheduled),
            "sent" => Ok(EnvelopeStatus::Sent),
            "delivered" => Ok(EnvelopeStatus::Delivered),
            "declined" => Ok(EnvelopeStatus::Declined),
            "paused" => Ok(EnvelopeStatus::Paused),
            "completed" => Ok(EnvelopeStatus::Completed),
            "voided" => Ok(EnvelopeStatus::Voided),
            other => Err(format!("invalid envelope status: '{other}'")),
        }
    }
}

/// Recipient routing strategy (the workflow type).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoutingMode {
    /// One recipient at a time, in routing order.
    Sequential,
    /// Everyone at once.
    Parallel,
    /// Sequential, except recipients flagged `parallel_with_previous`
    /// join their predecessor's wave.
    Mixed,
}

impl Default for RoutingMode {
    fn default() -> Self {
        RoutingMode::Mixed
    }
}

impl fmt::Display for RoutingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoutingMode::Sequential => write!(f, "sequential"),
            RoutingMode::Parallel => write!(f, "parallel"),
            RoutingMode::Mixed => write!(f, "mixed"),
        }
    }
}

impl FromStr for RoutingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sequential" => Ok(RoutingMode::Sequential),
            "parallel" => Ok(RoutingMode::Parallel),
            "mixed" => Ok(RoutingMode::Mixed),
            other => Err(format!("invalid routing mode: '{other}'")),
        }
    }
}

/// A document attached to an envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvelopeDocument {
    pub id: Uuid,
    pub envelope_id: EnvelopeId,
    pub name: String,
    /// 1-based display order within the envelope.
    pub document_order: u32,
    /// Opaque key into the file store.
    pub file_reference: String,
    pub created_at: DateTime<Utc>,
}

/// What a recipient is expected to do with the envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecipientType {
    Signer,
    Approver,
    Viewer,
    Cc,
}

impl RecipientType {
    /// Signers and approvers must act before the envelope can complete.
    pub fn is_required(self) -> bool {
        matches!(self, RecipientType::Signer | RecipientType::Approver)
    }

    pub fn action(self) -> RecipientAction {
        match self {
            RecipientType::Signer => RecipientAction::Sign,
            RecipientType::Approver => RecipientAction::Approve,
            RecipientType::Viewer => RecipientAction::View,
            RecipientType::Cc => RecipientAction::ReceiveCopy,
        }
    }
}

impl fmt::Display for RecipientType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecipientType::Signer => write!(f, "signer"),
            RecipientType::Approver => write!(f, "approver"),
            RecipientType::Viewer => write!(f, "viewer"),
            RecipientType::Cc => write!(f, "cc"),
        }
    }
}

impl FromStr for RecipientType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "signer" => Ok(RecipientType::Signer),
            "approver" => Ok(RecipientType::Approver),
            "viewer" => Ok(RecipientType::Viewer),
            "cc" => Ok(RecipientType::Cc),
            other => Err(format!("invalid recipient type: '{other}'")),
        }
    }
}

/// Per-recipient progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecipientStatus {
    /// Not yet activated.
    Created,
    /// Activated: eligible to act.
    Sent,
    /// Opened the envelope.
    Delivered,
    Completed,
    Declined,
}

impl RecipientStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, RecipientStatus::Completed | RecipientStatus::Declined)
    }

    pub fn is_activated(self) -> bool {
        !matches!(self, RecipientStatus::Created)
    }
}

impl fmt::Display for RecipientStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecipientStatus::Created => write!(f, "created"),
            RecipientStatus::Sent => write!(f, "sent"),
            RecipientStatus::Delivered => write!(f, "delivered"),
            RecipientStatus::Completed => write!(f, "completed"),
            RecipientStatus::Declined => write!(f, "declined"),
        }
    }
}

impl FromStr for RecipientStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "created" => Ok(RecipientStatus::Created),
            "sent" => Ok(RecipientStatus::Sent),
            "delivered" => Ok(RecipientStatus::Delivered),
            "completed" => Ok(RecipientStatus::Completed),
            "declined" => Ok(RecipientStatus::Declined),
            other => Err(format!("invalid recipient status: '{other}'")),
        }
    }
}

/// A party the envelope is routed to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvelopeRecipient {
    pub id: Uuid,
    pub envelope_id: EnvelopeId,
    pub name: String,
    pub email: String,
    pub recipient_type: RecipientType,
    /// Routing rank, starting at 1.
    pub routing_order: u32,
    pub status: RecipientStatus,
    /// Activate together with the immediate predecessor (mixed routing only).
    pub parallel_with_previous: bool,
    /// Minimum wait between activation and notification.
    pub delay_days: u32,
    pub activated_at: Option<DateTime<Utc>>,
    /// When the access link may go out (activated_at + delay_days).
    pub notify_at: Option<DateTime<Utc>>,
    pub notified_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub declined_at: Option<DateTime<Utc>>,
    pub decline_reason: Option<String>,
}

impl EnvelopeRecipient {
    /// Settled recipients no longer hold up routing: terminal, or a
    /// non-required recipient that has already been activated.
    pub fn is_settled(&self) -> bool {
        self.status.is_terminal()
            || (!self.recipient_type.is_required() && self.status.is_activated())
    }

    /// Activated, not terminal, and notification is due but not yet sent.
    pub fn notification_due(&self, now: DateTime<Utc>) -> bool {
        self.status.is_activated()
            && !self.status.is_terminal()
            && self.notified_at.is_none()
            && self.notify_at.is_some_and(|at| at <= now)
    }
}

/// A named envelope-level metadata field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomField {
    pub name: String,
    pub value: String,
    /// Visible to recipients.
    #[serde(default)]
    pub show: bool,
}

/// Recipient-facing action derived from the recipient type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecipientAction {
    Sign,
    Approve,
    View,
    ReceiveCopy,
}

/// Progress reported for a recipient by the signing surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum RecipientProgress {
    /// The recipient opened the envelope.
    Delivered,
    /// The recipient signed, approved, or viewed.
    Completed,
    /// The recipient refused to act.
    Declined { reason: String },
}

// ---------------------------------------------------------------------------
// Derived workflow view
// ---------------------------------------------------------------------------

/// The routing plan of an envelope, derived from its recipients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    pub workflow_type: RoutingMode,
    pub steps: Vec<WorkflowStep>,
}

/// One recipient's place in the routing plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowStep {
    pub recipient_id: Uuid,
    pub routing_order: u32,
    pub action: RecipientAction,
    pub delay_days: u32,
    pub parallel: bool,
    /// 0-based activation wave.
    pub wave: usize,
    pub status: RecipientStatus,
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// Request to create a new draft envelope. Only `subject` is required.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateEnvelopeRequest {
    pub subject: String,
    pub message: Option<String>,
    pub routing_mode: Option<RoutingMode>,
    #[serde(default)]
    pub custom_fields: Vec<CustomField>,
}

/// Partial update of a draft envelope's fields.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateEnvelopeRequest {
    pub subject: Option<String>,
    pub message: Option<String>,
    pub routing_mode: Option<RoutingMode>,
    pub custom_fields: Option<Vec<CustomField>>,
}

impl UpdateEnvelopeRequest {
    pub fn is_empty(&self) -> bool {
        self.subject.is_none()
            && self.message.is_none()
            && self.routing_mode.is_none()
            && self.custom_fields.is_none()
    }
}

/// Request to attach a document to a draft envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddDocumentRequest {
    pub name: String,
    pub file_reference: String,
    /// Defaults to the next free position.
    pub document_order: Option<u32>,
}

/// Request to add a recipient to a draft envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddRecipientRequest {
    pub name: String,
    pub email: String,
    pub recipient_type: RecipientType,
    /// Defaults to one past the current highest routing order.
    pub routing_order: Option<u32>,
    #[serde(default)]
    pub parallel_with_previous: bool,
    #[serde(default)]
    pub delay_days: u32,
}

/// Partial update of a recipient on a draft envelope.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateRecipientRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub recipient_type: Option<RecipientType>,
    pub routing_order: Option<u32>,
    pub parallel_with_previous: Option<bool>,
    pub delay_days: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recipient(recipient_type: RecipientType, status: RecipientStatus) -> EnvelopeRecipient {
        EnvelopeRecipient {
            id: Uuid::now_v7(),
            envelope_id: EnvelopeId::new(),
            name: "Ada".to_string(),
            email: "ada@example.com".to_string(),
            recipient_type,
            routing_order: 1,
            status,
            parallel_with_previous: false,
            delay_days: 0,
            activated_at: None,
            notify_at: None,
            notified_at: None,
            delivered_at: None,
            completed_at: None,
            declined_at: None,
            decline_reason: None,
        }
    }

    #[test]
    fn test_envelope_status_roundtrip_strings() {
        for status in [
            EnvelopeStatus::Draft,
            EnvelopeStatus::Created,
            EnvelopeStatus::Scheduled,
            EnvelopeStatus::Sent,
            EnvelopeStatus::Delivered,
            EnvelopeStatus::Declined,
            EnvelopeStatus::Paused,
            EnvelopeStatus::Completed,
            EnvelopeStatus::Voided,
        ] {
            let parsed: EnvelopeStatus = status.to_string().parse().unwrap();
            assert_eq!(parsed, status);
        }
        assert!("archived".parse::<EnvelopeStatus>().is_err());
    }

    #[test]
    fn test_status_serde_matches_display() {
        let json = serde_json::to_string(&EnvelopeStatus::Delivered).unwrap();
        assert_eq!(json, "\"delivered\"");
    }

    #[test]
    fn test_terminal_states_have_no_successors() {
        assert!(EnvelopeStatus::Completed.successors().is_empty());
        assert!(EnvelopeStatus::Voided.successors().is_empty());
        assert!(EnvelopeStatus::Completed.is_terminal());
        assert!(!EnvelopeStatus::Declined.is_terminal());
    }

    #[test]
    fn test_completed_only_reachable_from_in_flight() {
        assert!(!EnvelopeStatus::Draft.can_transition_to(EnvelopeStatus::Completed));
        assert!(!EnvelopeStatus::Created.can_transition_to(EnvelopeStatus::Completed));
        assert!(!EnvelopeStatus::Scheduled.can_transition_to(EnvelopeStatus::Completed));
        assert!(EnvelopeStatus::Sent.can_transition_to(EnvelopeStatus::Completed));
    }

    #[test]
    fn test_draft_cannot_be_voided() {
        assert!(!EnvelopeStatus::Draft.can_transition_to(EnvelopeStatus::Voided));
        assert!(EnvelopeStatus::Paused.can_transition_to(EnvelopeStatus::Voided));
    }

    #[test]
    fn test_required_recipient_types() {
        assert!(RecipientType::Signer.is_required());
        assert!(RecipientType::Approver.is_required());
        assert!(!RecipientType::Viewer.is_required());
        assert!(!RecipientType::Cc.is_required());
    }

    #[test]
    fn test_cc_settles_on_activation() {
        assert!(!recipient(RecipientType::Cc, RecipientStatus::Created).is_settled());
        assert!(recipient(RecipientType::Cc, RecipientStatus::Sent).is_settled());
        assert!(!recipient(RecipientType::Signer, RecipientStatus::Sent).is_settled());
        assert!(recipient(RecipientType::Signer, RecipientStatus::Declined).is_settled());
    }

    #[test]
    fn test_notification_due() {
        let now = Utc::now();
        let mut r = recipient(RecipientType::Signer, RecipientStatus::Sent);
        assert!(!r.notification_due(now));

        r.notify_at = Some(now - chrono::Duration::minutes(1));
        assert!(r.notification_due(now));

        r.notified_at = Some(now);
        assert!(!r.notification_due(now));
    }

    #[test]
    fn test_recipient_progress_tagged_serde() {
        let p: RecipientProgress =
            serde_json::from_str(r#"{"action":"declined","reason":"wrong name"}"#).unwrap();
        assert_eq!(
            p,
            RecipientProgress::Declined {
                reason: "wrong name".to_string()
            }
        );
        let p: RecipientProgress = serde_json::from_str(r#"{"action":"completed"}"#).unwrap();
        assert_eq!(p, RecipientProgress::Completed);
    }

    #[test]
    fn test_default_routing_mode_is_mixed() {
        assert_eq!(RoutingMode::default(), RoutingMode::Mixed);
    }
}
