//! SQLite envelope repository implementation.
//!
//! Implements `EnvelopeRepository` from `quillflow-core`. An envelope is
//! stored across four tables (envelopes, documents, recipients, custom
//! fields); `save` rewrites the child rows inside the same transaction as
//! the envelope update, which is guarded on both status and version.

use chrono::{DateTime, SecondsFormat, Utc};
use quillflow_core::repository::SortOrder;
use quillflow_core::repository::envelope::{EnvelopeFilter, EnvelopeRepository};
use quillflow_types::envelope::{
    CustomField, Envelope, EnvelopeDocument, EnvelopeId, EnvelopeRecipient, EnvelopeStatus,
};
use quillflow_types::error::RepositoryError;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, Transaction};
use uuid::Uuid;

use super::pool::DatabasePool;

/// SQLite-backed implementation of `EnvelopeRepository`.
pub struct SqliteEnvelopeRepository {
    pool: DatabasePool,
}

impl SqliteEnvelopeRepository {
    /// Create a new repository backed by the given database pool.
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    async fn load_children(&self, envelope: &mut Envelope) -> Result<(), RepositoryError> {
        let id = envelope.id.to_string();

        let rows = sqlx::query(
            "SELECT * FROM envelope_documents WHERE envelope_id = ? ORDER BY document_order, created_at",
        )
        .bind(&id)
        .fetch_all(&self.pool.reader)
        .await
        .map_err(query_err)?;
        envelope.documents = rows
            .iter()
            .map(|row| DocumentRow::from_row(row).map_err(query_err)?.into_document())
            .collect::<Result<_, _>>()?;

        let rows = sqlx::query(
            "SELECT * FROM envelope_recipients WHERE envelope_id = ? ORDER BY position",
        )
        .bind(&id)
        .fetch_all(&self.pool.reader)
        .await
        .map_err(query_err)?;
        envelope.recipients = rows
            .iter()
            .map(|row| RecipientRow::from_row(row).map_err(query_err)?.into_recipient())
            .collect::<Result<_, _>>()?;

        let rows = sqlx::query(
            "SELECT name, value, show FROM envelope_custom_fields WHERE envelope_id = ? ORDER BY position",
        )
        .bind(&id)
        .fetch_all(&self.pool.reader)
        .await
        .map_err(query_err)?;
        envelope.custom_fields = rows
            .iter()
            .map(|row| {
                Ok(CustomField {
                    name: row.try_get("name")?,
                    value: row.try_get("value")?,
                    show: row.try_get("show")?,
                })
            })
            .collect::<Result<_, sqlx::Error>>()
            .map_err(query_err)?;

        Ok(())
    }

    async fn hydrate(&self, row: &SqliteRow) -> Result<Envelope, RepositoryError> {
        let mut envelope = EnvelopeRow::from_row(row)
            .map_err(query_err)?
            .into_envelope()?;
        self.load_children(&mut envelope).await?;
        Ok(envelope)
    }
}

// ---------------------------------------------------------------------------
// Internal row types
// ---------------------------------------------------------------------------

struct EnvelopeRow {
    id: String,
    account_id: String,
    subject: String,
    message: Option<String>,
    status: String,
    routing_mode: String,
    scheduled_send_at: Option<String>,
    sent_date_time: Option<String>,
    delivered_date_time: Option<String>,
    completed_date_time: Option<String>,
    voided_date_time: Option<String>,
    voided_reason: Option<String>,
    created_at: String,
    updated_at: String,
    deleted_at: Option<String>,
    version: i64,
}

impl EnvelopeRow {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            account_id: row.try_get("account_id")?,
            subject: row.try_get("subject")?,
            message: row.try_get("message")?,
            status: row.try_get("status")?,
            routing_mode: row.try_get("routing_mode")?,
            scheduled_send_at: row.try_get("scheduled_send_at")?,
            sent_date_time: row.try_get("sent_date_time")?,
            delivered_date_time: row.try_get("delivered_date_time")?,
            completed_date_time: row.try_get("completed_date_time")?,
            voided_date_time: row.try_get("voided_date_time")?,
            voided_reason: row.try_get("voided_reason")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            deleted_at: row.try_get("deleted_at")?,
            version: row.try_get("version")?,
        })
    }

    fn into_envelope(self) -> Result<Envelope, RepositoryError> {
        Ok(Envelope {
            id: self
                .id
                .parse::<EnvelopeId>()
                .map_err(|e| RepositoryError::Query(format!("invalid envelope id: {e}")))?,
            account_id: parse_uuid(&self.account_id)?,
            subject: self.subject,
            message: self.message,
            status: self.status.parse().map_err(RepositoryError::Query)?,
            routing_mode: self.routing_mode.parse().map_err(RepositoryError::Query)?,
            documents: Vec::new(),
            recipients: Vec::new(),
            custom_fields: Vec::new(),
            scheduled_send_at: parse_optional(self.scheduled_send_at)?,
            sent_date_time: parse_optional(self.sent_date_time)?,
            delivered_date_time: parse_optional(self.delivered_date_time)?,
            completed_date_time: parse_optional(self.completed_date_time)?,
            voided_date_time: parse_optional(self.voided_date_time)?,
            voided_reason: self.voided_reason,
            created_at: parse_datetime(&self.created_at)?,
            updated_at: parse_datetime(&self.updated_at)?,
            deleted_at: parse_optional(self.deleted_at)?,
            version: self.version,
        })
    }
}

struct DocumentRow {
    id: String,
    envelope_id: String,
    name: String,
    document_order: i64,
    file_reference: String,
    created_at: String,
}

impl DocumentRow {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            envelope_id: row.try_get("envelope_id")?,
            name: row.try_get("name")?,
            document_order: row.try_get("document_order")?,
            file_reference: row.try_get("file_reference")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn into_document(self) -> Result<EnvelopeDocument, RepositoryError> {
        Ok(EnvelopeDocument {
            id: parse_uuid(&self.id)?,
            envelope_id: EnvelopeId::from_uuid(parse_uuid(&self.envelope_id)?),
            name: self.name,
            document_order: to_u32(self.document_order, "document_order")?,
            file_reference: self.file_reference,
            created_at: parse_datetime(&self.created_at)?,
        })
    }
}

struct RecipientRow {
    id: String,
    envelope_id: String,
    name: String,
    email: String,
    recipient_type: String,
    routing_order: i64,
    status: String,
    parallel_with_previous: bool,
    delay_days: i64,
    activated_at: Option<String>,
    notify_at: Option<String>,
    notified_at: Option<String>,
    delivered_at: Option<String>,
    completed_at: Option<String>,
    declined_at: Option<String>,
    decline_reason: Option<String>,
}

impl RecipientRow {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            envelope_id: row.try_get("envelope_id")?,
            name: row.try_get("name")?,
            email: row.try_get("email")?,
            recipient_type: row.try_get("recipient_type")?,
            routing_order: row.try_get("routing_order")?,
            status: row.try_get("status")?,
            parallel_with_previous: row.try_get("parallel_with_previous")?,
            delay_days: row.try_get("delay_days")?,
            activated_at: row.try_get("activated_at")?,
            notify_at: row.try_get("notify_at")?,
            notified_at: row.try_get("notified_at")?,
            delivered_at: row.try_get("delivered_at")?,
            completed_at: row.try_get("completed_at")?,
            declined_at: row.try_get("declined_at")?,
            decline_reason: row.try_get("decline_reason")?,
        })
    }

    fn into_recipient(self) -> Result<EnvelopeRecipient, RepositoryError> {
        Ok(EnvelopeRecipient {
            id: parse_uuid(&self.id)?,
            envelope_id: EnvelopeId::from_uuid(parse_uuid(&self.envelope_id)?),
            name: self.name,
            email: self.email,
            recipient_type: self.recipient_type.parse().map_err(RepositoryError::Query)?,
            routing_order: to_u32(self.routing_order, "routing_order")?,
            status: self.status.parse().map_err(RepositoryError::Query)?,
            parallel_with_previous: self.parallel_with_previous,
            delay_days: to_u32(self.delay_days, "delay_days")?,
            activated_at: parse_optional(self.activated_at)?,
            notify_at: parse_optional(self.notify_at)?,
            notified_at: parse_optional(self.notified_at)?,
            delivered_at: parse_optional(self.delivered_at)?,
            completed_at: parse_optional(self.completed_at)?,
            declined_at: parse_optional(self.declined_at)?,
            decline_reason: self.decline_reason,
        })
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn query_err(e: sqlx::Error) -> RepositoryError {
    RepositoryError::Query(e.to_string())
}

fn parse_uuid(s: &str) -> Result<Uuid, RepositoryError> {
    s.parse::<Uuid>()
        .map_err(|e| RepositoryError::Query(format!("invalid UUID '{s}': {e}")))
}

fn parse_datetime(s: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Query(format!("invalid datetime: {e}")))
}

fn parse_optional(s: Option<String>) -> Result<Option<DateTime<Utc>>, RepositoryError> {
    s.as_deref().map(parse_datetime).transpose()
}

/// Fixed-width UTC timestamps so SQL string comparison matches time order.
fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn format_optional(dt: &Option<DateTime<Utc>>) -> Option<String> {
    dt.as_ref().map(format_datetime)
}

fn to_u32(value: i64, column: &str) -> Result<u32, RepositoryError> {
    u32::try_from(value)
        .map_err(|_| RepositoryError::Query(format!("{column} out of range: {value}")))
}

/// Replace every child row of the envelope inside `tx`.
async fn write_children(
    tx: &mut Transaction<'_, Sqlite>,
    envelope: &Envelope,
) -> Result<(), RepositoryError> {
    let id = envelope.id.to_string();

    for table in [
        "envelope_documents",
        "envelope_recipients",
        "envelope_custom_fields",
    ] {
        sqlx::query(&format!("DELETE FROM {table} WHERE envelope_id = ?"))
            .bind(&id)
            .execute(&mut **tx)
            .await
            .map_err(query_err)?;
    }

    for doc in &envelope.documents {
        sqlx::query(
            "INSERT INTO envelope_documents (id, envelope_id, name, document_order, file_reference, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(doc.id.to_string())
        .bind(&id)
        .bind(&doc.name)
        .bind(i64::from(doc.document_order))
        .bind(&doc.file_reference)
        .bind(format_datetime(&doc.created_at))
        .execute(&mut **tx)
        .await
        .map_err(query_err)?;
    }

    for (position, r) in envelope.recipients.iter().enumerate() {
        sqlx::query(
            "INSERT INTO envelope_recipients (id, envelope_id, position, name, email, recipient_type, routing_order, status, parallel_with_previous, delay_days, activated_at, notify_at, notified_at, delivered_at, completed_at, declined_at, decline_reason)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(r.id.to_string())
        .bind(&id)
        .bind(position as i64)
        .bind(&r.name)
        .bind(&r.email)
        .bind(r.recipient_type.to_string())
        .bind(i64::from(r.routing_order))
        .bind(r.status.to_string())
        .bind(r.parallel_with_previous)
        .bind(i64::from(r.delay_days))
        .bind(format_optional(&r.activated_at))
        .bind(format_optional(&r.notify_at))
        .bind(format_optional(&r.notified_at))
        .bind(format_optional(&r.delivered_at))
        .bind(format_optional(&r.completed_at))
        .bind(format_optional(&r.declined_at))
        .bind(&r.decline_reason)
        .execute(&mut **tx)
        .await
        .map_err(query_err)?;
    }

    for (position, field) in envelope.custom_fields.iter().enumerate() {
        sqlx::query(
            "INSERT INTO envelope_custom_fields (envelope_id, name, value, show, position)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(&field.name)
        .bind(&field.value)
        .bind(field.show)
        .bind(position as i64)
        .execute(&mut **tx)
        .await
        .map_err(query_err)?;
    }

    Ok(())
}

impl EnvelopeRepository for SqliteEnvelopeRepository {
    async fn create(&self, envelope: &Envelope) -> Result<Envelope, RepositoryError> {
        let mut tx = self.pool.writer.begin().await.map_err(query_err)?;

        let result = sqlx::query(
            "INSERT INTO envelopes (id, account_id, subject, message, status, routing_mode, scheduled_send_at, sent_date_time, delivered_date_time, completed_date_time, voided_date_time, voided_reason, created_at, updated_at, deleted_at, version)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(envelope.id.to_string())
        .bind(envelope.account_id.to_string())
        .bind(&envelope.subject)
        .bind(&envelope.message)
        .bind(envelope.status.to_string())
        .bind(envelope.routing_mode.to_string())
        .bind(format_optional(&envelope.scheduled_send_at))
        .bind(format_optional(&envelope.sent_date_time))
        .bind(format_optional(&envelope.delivered_date_time))
        .bind(format_optional(&envelope.completed_date_time))
        .bind(format_optional(&envelope.voided_date_time))
        .bind(&envelope.voided_reason)
        .bind(format_datetime(&envelope.created_at))
        .bind(format_datetime(&envelope.updated_at))
        .bind(format_optional(&envelope.deleted_at))
        .bind(envelope.version)
        .execute(&mut *tx)
        .await;

        match result {
            Ok(_) => {}
            Err(sqlx::Error::Database(db_err)) if db_err.message().contains("UNIQUE") => {
                return Err(RepositoryError::Conflict(format!(
                    "envelope {} already exists",
                    envelope.id
                )));
            }
            Err(e) => return Err(query_err(e)),
        }

        write_children(&mut tx, envelope).await?;
        tx.commit().await.map_err(query_err)?;

        tracing::debug!(envelope_id = %envelope.id, "Envelope row inserted");
        Ok(envelope.clone())
    }

    async fn get_by_id(&self, id: &EnvelopeId) -> Result<Option<Envelope>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM envelopes WHERE id = ? AND deleted_at IS NULL")
            .bind(id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(query_err)?;

        match row {
            Some(row) => Ok(Some(self.hydrate(&row).await?)),
            None => Ok(None),
        }
    }

    async fn list(&self, filter: Option<EnvelopeFilter>) -> Result<Vec<Envelope>, RepositoryError> {
        let filter = filter.unwrap_or_default();

        let mut sql = String::from("SELECT * FROM envelopes WHERE deleted_at IS NULL");
        if filter.account_id.is_some() {
            sql.push_str(" AND account_id = ?");
        }
        if filter.status.is_some() {
            sql.push_str(" AND status = ?");
        }
        let order = match filter.sort_order.unwrap_or_default() {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        };
        sql.push_str(&format!(" ORDER BY created_at {order}, id {order}"));
        sql.push_str(" LIMIT ? OFFSET ?");

        let mut query = sqlx::query(&sql);
        if let Some(account_id) = filter.account_id {
            query = query.bind(account_id.to_string());
        }
        if let Some(status) = filter.status {
            query = query.bind(status.to_string());
        }
        let rows = query
            .bind(filter.limit.unwrap_or(-1))
            .bind(filter.offset.unwrap_or(0).max(0))
            .fetch_all(&self.pool.reader)
            .await
            .map_err(query_err)?;

        let mut envelopes = Vec::with_capacity(rows.len());
        for row in &rows {
            envelopes.push(self.hydrate(row).await?);
        }
        Ok(envelopes)
    }

    async fn save(
        &self,
        envelope: &Envelope,
        expected_status: EnvelopeStatus,
    ) -> Result<Envelope, RepositoryError> {
        let mut tx = self.pool.writer.begin().await.map_err(query_err)?;

        let result = sqlx::query(
            "UPDATE envelopes SET subject = ?, message = ?, status = ?, routing_mode = ?, scheduled_send_at = ?, sent_date_time = ?, delivered_date_time = ?, completed_date_time = ?, voided_date_time = ?, voided_reason = ?, updated_at = ?, deleted_at = ?, version = version + 1
             WHERE id = ? AND status = ? AND version = ? AND deleted_at IS NULL",
        )
        .bind(&envelope.subject)
        .bind(&envelope.message)
        .bind(envelope.status.to_string())
        .bind(envelope.routing_mode.to_string())
        .bind(format_optional(&envelope.scheduled_send_at))
        .bind(format_optional(&envelope.sent_date_time))
        .bind(format_optional(&envelope.delivered_date_time))
        .bind(format_optional(&envelope.completed_date_time))
        .bind(format_optional(&envelope.voided_date_time))
        .bind(&envelope.voided_reason)
        .bind(format_datetime(&envelope.updated_at))
        .bind(format_optional(&envelope.deleted_at))
        .bind(envelope.id.to_string())
        .bind(expected_status.to_string())
        .bind(envelope.version)
        .execute(&mut *tx)
        .await
        .map_err(query_err)?;

        if result.rows_affected() == 0 {
            let current: Option<(String, i64)> = sqlx::query_as(
                "SELECT status, version FROM envelopes WHERE id = ? AND deleted_at IS NULL",
            )
            .bind(envelope.id.to_string())
            .fetch_optional(&mut *tx)
            .await
            .map_err(query_err)?;

            return Err(match current {
                None => RepositoryError::NotFound,
                Some((status, version)) if version != envelope.version => {
                    RepositoryError::Conflict(format!(
                        "envelope {} was modified concurrently (version {version}, expected {}, status {status})",
                        envelope.id, envelope.version
                    ))
                }
                Some((status, _)) => RepositoryError::Conflict(format!(
                    "envelope {} is {status}, expected {expected_status}",
                    envelope.id
                )),
            });
        }

        write_children(&mut tx, envelope).await?;
        tx.commit().await.map_err(query_err)?;

        let mut saved = envelope.clone();
        saved.version += 1;
        Ok(saved)
    }

    async fn list_due(&self, now: DateTime<Utc>) -> Result<Vec<EnvelopeId>, RepositoryError> {
        let now = format_datetime(&now);
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT DISTINCT e.id FROM envelopes e
             LEFT JOIN envelope_recipients r ON r.envelope_id = e.id
             WHERE e.deleted_at IS NULL AND (
                 (e.status = 'scheduled' AND e.scheduled_send_at <= ?)
                 OR (e.status IN ('sent', 'delivered', 'declined', 'completed')
                     AND r.status IN ('sent', 'delivered')
                     AND r.notified_at IS NULL
                     AND r.notify_at <= ?)
             )
             ORDER BY e.id",
        )
        .bind(&now)
        .bind(&now)
        .fetch_all(&self.pool.reader)
        .await
        .map_err(query_err)?;

        rows.into_iter()
            .map(|(id,)| {
                id.parse::<EnvelopeId>()
                    .map_err(|e| RepositoryError::Query(format!("invalid envelope id: {e}")))
            })
            .collect()
    }
}
