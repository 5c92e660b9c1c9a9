//! # Local Cache
//!
//! The keyed, persisted store used for instant (possibly stale) reads.
//!
//! ## Key Scheme
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Key                        Value (JSON)              Writer            │
//! │  ─────────────────────────  ────────────────────────  ───────────────── │
//! │  products_{branch}          [Product, ...]            EntitySync        │
//! │  customers_{branch}         [Customer, ...]           EntitySync        │
//! │  sales_{branch}             [Sale, ...]               EntitySync        │
//! │  categories_{branch}        ["Bakery", ...]           CategoryRegistry  │
//! │  settings_{branch}          BranchSettings            SettingsStore     │
//! │  branches                   [Branch, ...]             BranchRegistry    │
//! │  activeBranchId             "main"                    BranchRegistry    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Each key has exactly one writer. Reads are non-fatal: a missing entry, a
//! failed read and an unparsable value all come back as `None`.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::warn;

use crate::error::{DbError, DbResult};

// =============================================================================
// Keys
// =============================================================================

/// Key of the persisted active branch selection.
pub const ACTIVE_BRANCH_KEY: &str = "activeBranchId";

/// Key of the cached branch list.
pub const BRANCHES_KEY: &str = "branches";

/// `{entityKind}_{branchId}`, e.g. `products_main`.
pub fn collection_key(kind: &str, branch_id: &str) -> String {
    format!("{}_{}", kind, branch_id)
}

/// `categories_{branchId}`
pub fn categories_key(branch_id: &str) -> String {
    collection_key("categories", branch_id)
}

/// `settings_{branchId}`
pub fn settings_key(branch_id: &str) -> String {
    collection_key("settings", branch_id)
}

// =============================================================================
// Trait
// =============================================================================

/// Raw string store behind every cache read and write.
///
/// Implemented by [`MemoryCache`] (tests, `[cache] backend = "memory"`) and
/// by [`CacheRepository`](crate::repository::cache::CacheRepository)
/// (SQLite).
#[async_trait]
pub trait LocalCache: Send + Sync + 'static {
    async fn get_raw(&self, key: &str) -> DbResult<Option<String>>;

    async fn put_raw(&self, key: &str, value: &str) -> DbResult<()>;

    async fn remove(&self, key: &str) -> DbResult<()>;
}

/// Reads and decodes `key`.
///
/// Never fails: read errors and parse errors are logged and reported as
/// "no cached value".
pub async fn read_json<T, C>(cache: &C, key: &str) -> Option<T>
where
    T: DeserializeOwned,
    C: LocalCache + ?Sized,
{
    let raw = match cache.get_raw(key).await {
        Ok(Some(raw)) => raw,
        Ok(None) => return None,
        Err(e) => {
            warn!(key = %key, error = %e, "Cache read failed, treating as empty");
            return None;
        }
    };

    match serde_json::from_str(&raw) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(key = %key, error = %e, "Cache entry unparsable, treating as empty");
            None
        }
    }
}

/// Encodes `value` and writes it under `key`.
pub async fn write_json<T, C>(cache: &C, key: &str, value: &T) -> DbResult<()>
where
    T: Serialize + ?Sized,
    C: LocalCache + ?Sized,
{
    let raw = serde_json::to_string(value).map_err(|e| DbError::serialization(key, e))?;
    cache.put_raw(key, &raw).await
}

// =============================================================================
// In-Memory Implementation
// =============================================================================

/// Process-local cache. Contents are lost on drop.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl LocalCache for MemoryCache {
    async fn get_raw(&self, key: &str) -> DbResult<Option<String>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn put_raw(&self, key: &str, value: &str) -> DbResult<()> {
        self.entries
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> DbResult<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
