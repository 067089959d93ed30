//! In-memory doubles and fixtures shared by the core unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use quillflow_types::envelope::{
    Envelope, EnvelopeDocument, EnvelopeId, EnvelopeRecipient, EnvelopeStatus, RecipientStatus,
    RecipientType, RoutingMode,
};
use quillflow_types::error::RepositoryError;
use uuid::Uuid;

use crate::notify::{Notifier, NotifyError};
use crate::repository::SortOrder;
use crate::repository::envelope::{EnvelopeFilter, EnvelopeRepository};

pub fn sample_envelope() -> Envelope {
    Envelope::draft(Uuid::now_v7(), "Please sign", RoutingMode::Mixed)
}

pub fn document(envelope: &Envelope, name: &str, order: u32) -> EnvelopeDocument {
    EnvelopeDocument {
        id: Uuid::now_v7(),
        envelope_id: envelope.id,
        name: name.to_string(),
        document_order: order,
        file_reference: format!("blobs/{name}"),
        created_at: Utc::now(),
    }
}

pub fn recipient(
    envelope: &Envelope,
    name: &str,
    recipient_type: RecipientType,
    routing_order: u32,
) -> EnvelopeRecipient {
    EnvelopeRecipient {
        id: Uuid::now_v7(),
        envelope_id: envelope.id,
        name: name.to_string(),
        email: format!("{}@example.com", name.to_lowercase().replace(' ', ".")),
        recipient_type,
        routing_order,
        status: RecipientStatus::Created,
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

#[derive(Clone, Default)]
pub struct InMemoryEnvelopeRepository {
    rows: Arc<Mutex<HashMap<EnvelopeId, Envelope>>>,
}

impl InMemoryEnvelopeRepository {
    /// Overwrite the stored status, simulating another process.
    pub fn force_status(&self, id: &EnvelopeId, status: EnvelopeStatus) {
        if let Some(env) = self.rows.lock().unwrap().get_mut(id) {
            env.status = status;
        }
    }

    pub fn raw(&self, id: &EnvelopeId) -> Option<Envelope> {
        self.rows.lock().unwrap().get(id).cloned()
    }
}

impl EnvelopeRepository for InMemoryEnvelopeRepository {
    async fn create(&self, envelope: &Envelope) -> Result<Envelope, RepositoryError> {
        let mut rows = self.rows.lock().unwrap();
        if rows.contains_key(&envelope.id) {
            return Err(RepositoryError::Conflict("duplicate id".to_string()));
        }
        rows.insert(envelope.id, envelope.clone());
        Ok(envelope.clone())
    }

    async fn get_by_id(&self, id: &EnvelopeId) -> Result<Option<Envelope>, RepositoryError> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .get(id)
            .filter(|e| !e.is_deleted())
            .cloned())
    }

    async fn list(&self, filter: Option<EnvelopeFilter>) -> Result<Vec<Envelope>, RepositoryError> {
        let filter = filter.unwrap_or_default();
        let mut out: Vec<Envelope> = self
            .rows
            .lock()
            .unwrap()
            .values()
            .filter(|e| !e.is_deleted())
            .filter(|e| filter.account_id.is_none_or(|a| a == e.account_id))
            .filter(|e| filter.status.is_none_or(|s| s == e.status))
            .cloned()
            .collect();
        out.sort_by_key(|e| e.created_at);
        if filter.sort_order.unwrap_or_default() == SortOrder::Desc {
            out.reverse();
        }
        let offset = filter.offset.unwrap_or(0).max(0) as usize;
        let limit = filter.limit.unwrap_or(i64::MAX).max(0) as usize;
        Ok(out.into_iter().skip(offset).take(limit).collect())
    }

    async fn save(
        &self,
        envelope: &Envelope,
        expected_status: EnvelopeStatus,
    ) -> Result<Envelope, RepositoryError> {
        let mut rows = self.rows.lock().unwrap();
        let stored = rows.get(&envelope.id).ok_or(RepositoryError::NotFound)?;
        if stored.version != envelope.version {
            return Err(RepositoryError::Conflict(format!(
                "expected version {}, found {}",
                envelope.version, stored.version
            )));
        }
        if stored.status != expected_status {
            return Err(RepositoryError::Conflict(format!(
                "expected status {expected_status}, found {}",
                stored.status
            )));
        }
        let mut saved = envelope.clone();
        saved.version += 1;
        rows.insert(envelope.id, saved.clone());
        Ok(saved)
    }

    async fn list_due(&self, now: DateTime<Utc>) -> Result<Vec<EnvelopeId>, RepositoryError> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .values()
            .filter(|e| !e.is_deleted())
            .filter(|e| {
                (e.status == EnvelopeStatus::Scheduled
                    && e.scheduled_send_at.is_some_and(|at| at <= now))
                    || (crate::workflow::accepts_notifications(e.status)
                        && e.recipients.iter().any(|r| r.notification_due(now)))
            })
            .map(|e| e.id)
            .collect())
    }
}

/// Records every notification; can be switched into failure mode.
#[derive(Clone, Default)]
pub struct RecordingNotifier {
    sent: Arc<Mutex<Vec<(EnvelopeId, Uuid)>>>,
    failing: Arc<AtomicBool>,
}

impl RecordingNotifier {
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<(EnvelopeId, Uuid)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_to(&self, recipient_id: &Uuid) -> usize {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, r)| r == recipient_id)
            .count()
    }
}

impl Notifier for RecordingNotifier {
    async fn notify(
        &self,
        envelope: &Envelope,
        recipient: &EnvelopeRecipient,
    ) -> Result<(), NotifyError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(NotifyError::Transport("connection refused".to_string()));
        }
        self.sent.lock().unwrap().push((envelope.id, recipient.id));
        Ok(())
    }
}
