//! Envelope repository trait definition.

use chrono::{DateTime, Utc};
use quillflow_types::envelope::{Envelope, EnvelopeId, EnvelopeStatus};
use quillflow_types::error::RepositoryError;
use uuid::Uuid;

use super::SortOrder;

/// Filter criteria for listing envelopes.
#[derive(Debug, Clone, Default)]
pub struct EnvelopeFilter {
    /// Restrict to one account. Services always set this.
    pub account_id: Option<Uuid>,
    /// Filter by lifecycle status.
    pub status: Option<EnvelopeStatus>,
    /// Sort direction on `created_at`.
    pub sort_order: Option<SortOrder>,
    /// Maximum number of results.
    pub limit: Option<i64>,
    /// Number of results to skip (offset pagination).
    pub offset: Option<i64>,
}

/// Repository trait for envelope persistence.
///
/// An envelope is an aggregate: documents, recipients, and custom fields are
/// always loaded and written together with the envelope row. Soft-deleted
/// envelopes are invisible to every read.
///
/// Implementations live in quillflow-infra (e.g., SqliteEnvelopeRepository).
pub trait EnvelopeRepository: Send + Sync {
    /// Insert a new envelope with its children.
    fn create(
        &self,
        envelope: &Envelope,
    ) -> impl std::future::Future<Output = Result<Envelope, RepositoryError>> + Send;

    /// Get an envelope by ID. Returns `None` when missing or soft-deleted.
    fn get_by_id(
        &self,
        id: &EnvelopeId,
    ) -> impl std::future::Future<Output = Result<Option<Envelope>, RepositoryError>> + Send;

    /// List envelopes with optional filtering and pagination.
    fn list(
        &self,
        filter: Option<EnvelopeFilter>,
    ) -> impl std::future::Future<Output = Result<Vec<Envelope>, RepositoryError>> + Send;

    /// Persist the whole aggregate in one transaction, but only if the
    /// stored status still equals `expected_status` and the stored version
    /// still equals `envelope.version`. The returned envelope carries the
    /// bumped version.
    ///
    /// Returns `RepositoryError::Conflict` when another write landed since
    /// the caller loaded the envelope and `RepositoryError::NotFound` when
    /// the row is gone.
    fn save(
        &self,
        envelope: &Envelope,
        expected_status: EnvelopeStatus,
    ) -> impl std::future::Future<Output = Result<Envelope, RepositoryError>> + Send;

    /// Envelopes with scheduler work at `now`: scheduled sends that are due,
    /// and in-flight envelopes holding a recipient whose notification is due.
    fn list_due(
        &self,
        now: DateTime<Utc>,
    ) -> impl std::future::Future<Output = Result<Vec<EnvelopeId>, RepositoryError>> + Send;
}
