//! API key storage.
//!
//! Keys are shown once at creation; only their SHA-256 digest is persisted.
//! A resolved key yields the `AccountContext` every core operation takes.

use chrono::Utc;
use quillflow_types::access::{AccountContext, Capability};
use quillflow_types::error::RepositoryError;
use serde::Serialize;
use sha2::{Digest, Sha256};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;
use uuid::Uuid;

use super::pool::DatabasePool;

const KEY_PREFIX: &str = "qf_";

/// Stored metadata for an API key (never the key itself).
#[derive(Debug, Clone, Serialize)]
pub struct ApiKeyRecord {
    pub id: Uuid,
    pub name: String,
    pub account_id: Uuid,
    pub capabilities: Vec<Capability>,
    pub created_at: String,
    pub last_used_at: Option<String>,
}

/// Lowercase hex SHA-256 of a plaintext key.
pub fn hash_api_key(key: &str) -> String {
    format!("{:x}", Sha256::digest(key.as_bytes()))
}

fn generate_key() -> String {
    let bytes: [u8; 24] = rand::random();
    let hex: String = bytes.iter().map(|b| format!("{b:02x}")).collect();
    format!("{KEY_PREFIX}{hex}")
}

pub struct SqliteApiKeyStore {
    pool: DatabasePool,
}

impl SqliteApiKeyStore {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    /// Create a key and return `(record, plaintext)`. The plaintext is not
    /// recoverable afterwards.
    pub async fn create(
        &self,
        name: &str,
        account_id: Uuid,
        capabilities: &[Capability],
    ) -> Result<(ApiKeyRecord, String), RepositoryError> {
        let key = generate_key();
        let mut capabilities = capabilities.to_vec();
        capabilities.sort_by_key(|c| c.as_str());
        capabilities.dedup();

        let record = ApiKeyRecord {
            id: Uuid::now_v7(),
            name: name.to_string(),
            account_id,
            capabilities,
            created_at: Utc::now().to_rfc3339(),
            last_used_at: None,
        };
        let caps_json = serde_json::to_string(&record.capabilities)
            .map_err(|e| RepositoryError::Query(format!("capabilities: {e}")))?;

        sqlx::query(
            "INSERT INTO api_keys (id, key_hash, name, account_id, capabilities, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(record.id.to_string())
        .bind(hash_api_key(&key))
        .bind(&record.name)
        .bind(record.account_id.to_string())
        .bind(caps_json)
        .bind(&record.created_at)
        .execute(&self.pool.writer)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        tracing::info!(key_id = %record.id, account_id = %account_id, name, "API key created");
        Ok((record, key))
    }

    /// Resolve a plaintext key to its account context, stamping `last_used_at`.
    pub async fn resolve(&self, key: &str) -> Result<Option<AccountContext>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM api_keys WHERE key_hash = ?")
            .bind(hash_api_key(key))
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        let Some(row) = row else {
            return Ok(None);
        };
        let record = record_from_row(&row)?;

        sqlx::query("UPDATE api_keys SET last_used_at = ? WHERE id = ?")
            .bind(Utc::now().to_rfc3339())
            .bind(record.id.to_string())
            .execute(&self.pool.writer)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        Ok(Some(AccountContext::new(
            record.account_id,
            record.name,
            record.capabilities,
        )))
    }

    pub async fn list(&self, account_id: Option<Uuid>) -> Result<Vec<ApiKeyRecord>, RepositoryError> {
        let rows = match account_id {
            Some(account_id) => {
                sqlx::query("SELECT * FROM api_keys WHERE account_id = ? ORDER BY created_at")
                    .bind(account_id.to_string())
                    .fetch_all(&self.pool.reader)
                    .await
            }
            None => {
                sqlx::query("SELECT * FROM api_keys ORDER BY created_at")
                    .fetch_all(&self.pool.reader)
                    .await
            }
        }
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        rows.iter().map(record_from_row).collect()
    }

    pub async fn revoke(&self, id: &Uuid) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM api_keys WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool.writer)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        tracing::info!(key_id = %id, "API key revoked");
        Ok(())
    }
}

fn record_from_row(row: &SqliteRow) -> Result<ApiKeyRecord, RepositoryError> {
    let get = |e: sqlx::Error| RepositoryError::Query(e.to_string());
    let id: String = row.try_get("id").map_err(get)?;
    let account_id: String = row.try_get("account_id").map_err(get)?;
    let capabilities: String = row.try_get("capabilities").map_err(get)?;

    Ok(ApiKeyRecord {
        id: id
            .parse()
            .map_err(|e| RepositoryError::Query(format!("invalid key id: {e}")))?,
        name: row.try_get("name").map_err(get)?,
        account_id: account_id
            .parse()
            .map_err(|e| RepositoryError::Query(format!("invalid account id: {e}")))?,
        capabilities: serde_json::from_str(&capabilities)
            .map_err(|e| RepositoryError::Query(format!("capabilities: {e}")))?,
        created_at: row.try_get("created_at").map_err(get)?,
        last_used_at: row.try_get("last_used_at").map_err(get)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite::pool::test_pool;

    #[test]
    fn test_hash_known_value() {
        assert_eq!(
            hash_api_key(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_generated_keys_are_prefixed_and_distinct() {
        let a = generate_key();
        let b = generate_key();
        assert!(a.starts_with(KEY_PREFIX));
        assert_eq!(a.len(), KEY_PREFIX.len() + 48);
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_create_then_resolve() {
        let store = SqliteApiKeyStore::new(test_pool().await);
        let account = Uuid::now_v7();
        let (record, key) = store
            .create(
                "signing-portal",
                account,
                &[Capability::RecipientAct, Capability::EnvelopeRead],
            )
            .await
            .unwrap();
        assert_eq!(record.capabilities.len(), 2);

        let ctx = store.resolve(&key).await.unwrap().unwrap();
        assert_eq!(ctx.account_id, account);
        assert_eq!(ctx.actor, "signing-portal");
        assert!(ctx.has(Capability::RecipientAct));
        assert!(!ctx.has(Capability::EnvelopeVoid));

        let listed = store.list(Some(account)).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert!(listed[0].last_used_at.is_some());
    }

    #[tokio::test]
    async fn test_unknown_key_resolves_to_none() {
        let store = SqliteApiKeyStore::new(test_pool().await);
        assert!(store.resolve("qf_nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_revoked_key_stops_resolving() {
        let store = SqliteApiKeyStore::new(test_pool().await);
        let (record, key) = store
            .create("ops", Uuid::now_v7(), &Capability::ALL)
            .await
            .unwrap();

        store.revoke(&record.id).await.unwrap();
        assert!(store.resolve(&key).await.unwrap().is_none());
        assert!(matches!(
            store.revoke(&record.id).await,
            Err(RepositoryError::NotFound)
        ));
    }
}
