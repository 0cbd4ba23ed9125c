//! PostgreSQL storage implementation

use super::traits::*;
use crate::error::StorageError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, PgPool, Row};
use std::time::Duration;
use tokio::sync::watch;

/// PostgreSQL-backed key/value store, shareable across daemon processes
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Connect to PostgreSQL and initialize schema
    pub async fn new(
        url: &str,
        max_connections: u32,
        connect_timeout_secs: u64,
    ) -> Result<Self, StorageError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(connect_timeout_secs))
            .connect(url)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        let store = Self { pool };
        store.initialize_schema().await?;
        Ok(store)
    }

    async fn initialize_schema(&self) -> Result<(), StorageError> {
        let statements = [
            r#"
            CREATE TABLE IF NOT EXISTS handshake_kv (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                expires_at TIMESTAMPTZ
            );
            "#,
            r#"CREATE INDEX IF NOT EXISTS handshake_kv_expires_at ON handshake_kv(expires_at);"#,
        ];

        for stmt in statements {
            sqlx::query(stmt)
                .execute(&self.pool)
                .await
                .map_err(map_sqlx_error)?;
        }

        Ok(())
    }

    /// Delete expired rows; returns how many were removed
    pub async fn purge_expired(&self) -> StorageResult<u64> {
        let result = sqlx::query("DELETE FROM handshake_kv WHERE expires_at <= now()")
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(result.rows_affected())
    }

    /// Purge expired rows every `period` until shutdown is signalled
    pub async fn run_sweeper(self, period: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(period);
        loop {
            tokio::select! {
                _ = interval.tick() => match self.purge_expired().await {
                    Ok(0) => {}
                    Ok(purged) => tracing::debug!(purged, "Expired rows purged"),
                    Err(e) => tracing::warn!(error = %e, "Failed to purge expired rows"),
                },
                _ = shutdown.changed() => break,
            }
        }
    }
}

fn expiry(ttl: Option<Duration>) -> StorageResult<Option<DateTime<Utc>>> {
    ttl.map(|ttl| {
        chrono::Duration::from_std(ttl)
            .map(|ttl| Utc::now() + ttl)
            .map_err(|e| StorageError::InvalidData(format!("ttl out of range: {}", e)))
    })
    .transpose()
}

fn map_sqlx_error(e: sqlx::Error) -> StorageError {
    match e {
        sqlx::Error::Io(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::Tls(_) => StorageError::Connection(e.to_string()),
        other => StorageError::Query(other.to_string()),
    }
}

#[async_trait]
impl KvStore for PostgresStore {
    async fn put(&self, key: &str, value: &str, ttl: Option<Duration>) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO handshake_kv (key, value, expires_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value, expires_at = EXCLUDED.expires_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(expiry(ttl)?)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn get(&self, key: &str) -> StorageResult<Option<String>> {
        let row = sqlx::query(
            r#"
            SELECT value FROM handshake_kv
            WHERE key = $1 AND (expires_at IS NULL OR expires_at > now())
            "#,
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        row.map(|row| {
            row.try_get::<String, _>("value")
                .map_err(|e| StorageError::InvalidData(e.to_string()))
        })
        .transpose()
    }

    async fn delete(&self, key: &str) -> StorageResult<bool> {
        let result = sqlx::query(
            r#"
            DELETE FROM handshake_kv
            WHERE key = $1 AND (expires_at IS NULL OR expires_at > now())
            "#,
        )
        .bind(key)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        Ok(result.rows_affected() > 0)
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected: &str,
        new: &str,
        ttl: Option<Duration>,
    ) -> StorageResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE handshake_kv SET value = $3, expires_at = $4
            WHERE key = $1 AND value = $2 AND (expires_at IS NULL OR expires_at > now())
            "#,
        )
        .bind(key)
        .bind(expected)
        .bind(new)
        .bind(expiry(ttl)?)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        Ok(result.rows_affected() == 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expiry_is_in_the_future() {
        let at = expiry(Some(Duration::from_secs(60))).unwrap().unwrap();
        assert!(at > Utc::now());
        assert!(expiry(None).unwrap().is_none());
    }

    #[test]
    fn test_pool_errors_are_transient() {
        assert!(map_sqlx_error(sqlx::Error::PoolTimedOut).is_transient());
        assert!(matches!(
            map_sqlx_error(sqlx::Error::RowNotFound),
            StorageError::Query(_)
        ));
    }
}
