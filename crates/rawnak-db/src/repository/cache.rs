//! # Cache Repository
//!
//! SQLite-backed [`LocalCache`]. One row per key, value stored as JSON text.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;

use crate::cache::LocalCache;
use crate::error::DbResult;

/// Repository for the `local_cache` table.
#[derive(Debug, Clone)]
pub struct CacheRepository {
    pool: SqlitePool,
}

impl CacheRepository {
    pub fn new(pool: SqlitePool) -> Self {
        CacheRepository { pool }
    }

    /// Reads the raw value stored under `key`.
    pub async fn get(&self, key: &str) -> DbResult<Option<String>> {
        let value: Option<String> =
            sqlx::query_scalar("SELECT value FROM local_cache WHERE key = ?1")
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;

        Ok(value)
    }

    /// Inserts or replaces the value under `key`.
    pub async fn put(&self, key: &str, value: &str) -> DbResult<()> {
        debug!(key = %key, bytes = value.len(), "Writing cache entry");

        sqlx::query(
            r#"
            INSERT INTO local_cache (key, value, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Deletes `key`. Missing keys are not an error.
    pub async fn remove(&self, key: &str) -> DbResult<()> {
        sqlx::query("DELETE FROM local_cache WHERE key = ?1")
            .bind(key)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Keys starting with `prefix`, sorted.
    ///
    /// Uses `substr` rather than `LIKE` because keys contain `_`.
    pub async fn keys_with_prefix(&self, prefix: &str) -> DbResult<Vec<String>> {
        let keys: Vec<String> = sqlx::query_scalar(
            "SELECT key FROM local_cache WHERE substr(key, 1, length(?1)) = ?1 ORDER BY key",
        )
        .bind(prefix)
        .fetch_all(&self.pool)
        .await?;

        Ok(keys)
    }

    /// Total number of cached entries.
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM local_cache")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}

#[async_trait]
impl LocalCache for CacheRepository {
    async fn get_raw(&self, key: &str) -> DbResult<Option<String>> {
        self.get(key).await
    }

    async fn put_raw(&self, key: &str, value: &str) -> DbResult<()> {
        self.put(key, value).await
    }

    async fn remove(&self, key: &str) -> DbResult<()> {
        CacheRepository::remove(self, key).await
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{collection_key, read_json, write_json};
    use crate::{Database, DbConfig};

    async fn repo() -> CacheRepository {
        Database::new(DbConfig::in_memory()).await.unwrap().cache()
    }

    #[tokio::test]
    async fn test_put_get_overwrite() {
        let repo = repo().await;
        assert_eq!(repo.get("products_main").await.unwrap(), None);

        repo.put("products_main", "[]").await.unwrap();
        repo.put("products_main", "[1]").await.unwrap();
        assert_eq!(repo.get("products_main").await.unwrap().as_deref(), Some("[1]"));
        assert_eq!(repo.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_remove() {
        let repo = repo().await;
        repo.put("activeBranchId", "\"main\"").await.unwrap();
        CacheRepository::remove(&repo, "activeBranchId").await.unwrap();
        CacheRepository::remove(&repo, "activeBranchId").await.unwrap();
        assert_eq!(repo.get("activeBranchId").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_prefix_does_not_treat_underscore_as_wildcard() {
        let repo = repo().await;
        repo.put("products_main", "[]").await.unwrap();
        repo.put("productsXmain", "[]").await.unwrap();
        repo.put("products_b2", "[]").await.unwrap();

        let keys = repo.keys_with_prefix("products_").await.unwrap();
        assert_eq!(keys, vec!["products_b2".to_string(), "products_main".to_string()]);
    }

    #[tokio::test]
    async fn test_typed_helpers_through_trait() {
        let repo = repo().await;
        let key = collection_key("sales", "main");
        write_json(&repo, &key, &vec!["a".to_string()]).await.unwrap();

        let back: Option<Vec<String>> = read_json(&repo, &key).await;
        assert_eq!(back, Some(vec!["a".to_string()]));
    }
}
