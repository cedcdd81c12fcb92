//! PostgreSQL [`KvBackend`] over the `kv_entries` table.
//!
//! Expiry is evaluated in the database (`expires_at > NOW()`), so every
//! process sharing the pool sees the same view of liveness.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::Row;

use crate::backend::{KeyStat, KvBackend};
use crate::error::StoreError;
use crate::DbPool;

/// Prefix match that does not treat `%`/`_` in keys as wildcards.
const PREFIX_MATCH: &str = "left(key, length($1)) = $1";

#[derive(Clone)]
pub struct PgBackend {
    pool: DbPool,
}

impl PgBackend {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

#[async_trait]
impl KvBackend for PgBackend {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let row = sqlx::query("SELECT value FROM kv_entries WHERE key = $1 AND expires_at > NOW()")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(match row {
            Some(row) => Some(row.try_get("value")?),
            None => None,
        })
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO kv_entries (key, value, created_at, expires_at) \
             VALUES ($1, $2, NOW(), NOW() + ($3::double precision * INTERVAL '1 second')) \
             ON CONFLICT (key) DO UPDATE \
             SET value = EXCLUDED.value, created_at = EXCLUDED.created_at, expires_at = EXCLUDED.expires_at",
        )
        .bind(key)
        .bind(value)
        .bind(ttl.as_secs_f64())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM kv_entries WHERE key = $1 AND expires_at > NOW()")
            .bind(key)
            .execute(&self.pool)
            .await?;
        // Expired rows with the same key are dropped regardless.
        sqlx::query("DELETE FROM kv_entries WHERE key = $1")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<u64, StoreError> {
        let result = sqlx::query(&format!(
            "DELETE FROM kv_entries WHERE {PREFIX_MATCH} AND expires_at > NOW()"
        ))
        .bind(prefix)
        .execute(&self.pool)
        .await?;
        sqlx::query(&format!("DELETE FROM kv_entries WHERE {PREFIX_MATCH}"))
            .bind(prefix)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<KeyStat>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT key, octet_length(value) AS bytes FROM kv_entries \
             WHERE {PREFIX_MATCH} AND expires_at > NOW() ORDER BY key"
        ))
        .bind(prefix)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                let bytes: i32 = row.try_get("bytes")?;
                Ok(KeyStat {
                    key: row.try_get("key")?,
                    bytes: bytes.max(0) as usize,
                })
            })
            .collect()
    }

    async fn purge_expired(&self) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM kv_entries WHERE expires_at <= NOW()")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        crate::health_check(&self.pool).await?;
        Ok(())
    }
}
