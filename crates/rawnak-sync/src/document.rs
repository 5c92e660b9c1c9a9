//! # Document Sync
//!
//! Branch-scoped mirror of a singleton document under
//! `branches/{id}/data/{name}`: the category list and the settings.
//!
//! Same lifecycle as [`EntitySync`](crate::engine::EntitySync), through the
//! shared [`scoped`](crate::scoped) channel: cached value first, then every
//! remote snapshot, written through to the cache and published only while
//! the subscription generation is current.
//!
//! ```text
//! snapshot ── present ──► decode ──────────────────────┐
//!          └─ missing ──► create defaults if the kind  │
//!                         asks for it (create-if-absent)│
//!                         else publish the empty value ─┴─► cache ─► view
//! ```

use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use rawnak_core::category::CategoryList;
use rawnak_core::{seed, BranchScope, BranchSettings};
use rawnak_db::cache::{self, LocalCache};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{watch, Mutex};
use tracing::{info, warn};

use crate::engine::ViewSource;
use crate::error::{StoreError, StoreResult, SyncResult};
use crate::scoped::{ScopedChannel, ScopedView, SnapshotHandler};
use crate::store::{
    categories_path, settings_path, AtomicUpdate, Document, RemoteStore, WriteOp,
};

// =============================================================================
// Document Trait
// =============================================================================

/// A singleton document. `Self`'s serde form is what the cache holds.
pub trait SyncDocument:
    Serialize + DeserializeOwned + Clone + Default + PartialEq + Send + Sync + 'static
{
    /// Document name and cache key prefix.
    const NAME: &'static str;

    /// Whether a missing remote document is created from `Default`.
    const CREATE_WHEN_MISSING: bool;

    fn path(branch_id: &str) -> String;

    /// Value used when no remote store is configured.
    fn offline_seed() -> Self;

    fn from_body(body: Value) -> StoreResult<Self> {
        serde_json::from_value(body).map_err(|e| StoreError::serialization(Self::NAME, e))
    }

    fn to_body(&self) -> StoreResult<Value> {
        serde_json::to_value(self).map_err(|e| StoreError::serialization(Self::NAME, e))
    }
}

/// Category list. Cached as a bare array, stored as `{ list: [...] }`.
impl SyncDocument for Vec<String> {
    const NAME: &'static str = "categories";
    const CREATE_WHEN_MISSING: bool = false;

    fn path(branch_id: &str) -> String {
        categories_path(branch_id)
    }

    fn offline_seed() -> Self {
        seed::initial_categories()
    }

    fn from_body(body: Value) -> StoreResult<Self> {
        serde_json::from_value::<CategoryList>(body)
            .map(|doc| doc.list)
            .map_err(|e| StoreError::serialization(Self::NAME, e))
    }

    fn to_body(&self) -> StoreResult<Value> {
        serde_json::to_value(CategoryList { list: self.clone() })
            .map_err(|e| StoreError::serialization(Self::NAME, e))
    }
}

impl SyncDocument for BranchSettings {
    const NAME: &'static str = "settings";
    const CREATE_WHEN_MISSING: bool = true;

    fn path(branch_id: &str) -> String {
        settings_path(branch_id)
    }

    fn offline_seed() -> Self {
        BranchSettings::default()
    }
}

// =============================================================================
// View
// =============================================================================

#[derive(Debug, Clone, Default)]
pub struct DocumentView<D> {
    pub generation: u64,
    pub branch_id: Option<String>,
    pub source: ViewSource,
    pub value: D,
}

impl<D: SyncDocument> ScopedView for DocumentView<D> {
    type Payload = D;

    fn stamped(generation: u64, scope: &BranchScope, source: ViewSource, value: D) -> Self {
        DocumentView {
            generation,
            branch_id: Some(scope.branch_id().to_string()),
            source,
            value,
        }
    }

    fn generation(&self) -> u64 {
        self.generation
    }

    fn replace(&mut self, source: ViewSource, value: D) {
        self.source = source;
        self.value = value;
    }
}

// =============================================================================
// Engine
// =============================================================================

/// Observable, branch-scoped mirror of one singleton document.
pub struct DocumentSync<D: SyncDocument> {
    store: Option<Arc<dyn RemoteStore>>,
    max_attempts: u32,
    channel: ScopedChannel<DocumentView<D>>,
    offline: Mutex<HashMap<String, D>>,
}

impl<D: SyncDocument> DocumentSync<D> {
    pub fn new(store: Option<Arc<dyn RemoteStore>>, cache: Arc<dyn LocalCache>) -> Self {
        DocumentSync {
            store,
            max_attempts: 5,
            channel: ScopedChannel::new(D::NAME, cache),
            offline: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn watch(&self) -> watch::Receiver<DocumentView<D>> {
        self.channel.watch()
    }

    pub fn current(&self) -> DocumentView<D> {
        self.channel.current()
    }

    pub fn value(&self) -> D {
        self.channel.borrow().value.clone()
    }

    pub async fn subscribe(&self, scope: &BranchScope) -> SyncResult<()> {
        let rescope = self.channel.begin(scope).await;

        let Some(store) = self.store.clone() else {
            let value = self.offline_value(scope).await;
            rescope.finish_offline(value);
            return Ok(());
        };

        let subscription = store.watch_document(&D::path(scope.branch_id())).await;
        rescope.finish(
            subscription,
            DocumentSnapshots::<D> {
                store,
                scope: scope.clone(),
                max_attempts: self.max_attempts,
                create_attempted: false,
                document: PhantomData,
            },
        );
        Ok(())
    }

    pub async fn unsubscribe(&self) {
        self.channel.stop().await;
    }

    // =========================================================================
    // Crate-internal helpers
    // =========================================================================

    pub(crate) fn store(&self) -> Option<&Arc<dyn RemoteStore>> {
        self.store.as_ref()
    }

    pub(crate) fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Replaces the offline value of a branch and republishes.
    ///
    /// `f` returns `None` to leave the value unchanged.
    pub(crate) async fn modify_local<F>(&self, scope: &BranchScope, f: F) -> SyncResult<D>
    where
        F: FnOnce(&D) -> SyncResult<Option<D>>,
    {
        let value = {
            let mut offline = self.offline.lock().await;
            let current = offline
                .entry(scope.branch_id().to_string())
                .or_insert_with(D::offline_seed);
            match f(current)? {
                Some(next) => {
                    *current = next.clone();
                    next
                }
                None => return Ok(current.clone()),
            }
        };

        self.channel.publish_local(scope, value.clone()).await;
        Ok(value)
    }

    async fn offline_value(&self, scope: &BranchScope) -> D {
        let mut offline = self.offline.lock().await;
        if let Some(value) = offline.get(scope.branch_id()) {
            return value.clone();
        }

        let value = D::offline_seed();
        let key = cache::collection_key(D::NAME, scope.branch_id());
        if let Err(e) = cache::write_json(self.channel.cache(), &key, &value).await {
            warn!(document = D::NAME, key = %key, error = %e, "Failed to cache seed value");
        }
        offline.insert(scope.branch_id().to_string(), value.clone());
        value
    }
}

// =============================================================================
// Snapshots
// =============================================================================

/// Decodes document snapshots, creating a missing document once when the
/// kind asks for it.
struct DocumentSnapshots<D> {
    store: Arc<dyn RemoteStore>,
    scope: BranchScope,
    max_attempts: u32,
    create_attempted: bool,
    document: PhantomData<fn() -> D>,
}

#[async_trait]
impl<D: SyncDocument> SnapshotHandler for DocumentSnapshots<D> {
    type Payload = D;

    async fn resolve(&mut self, docs: Vec<Document>) -> Option<D> {
        match docs.into_iter().next() {
            Some(doc) => match D::from_body(doc.data) {
                Ok(value) => Some(value),
                Err(e) => {
                    warn!(document = D::NAME, branch_id = %self.scope, error = %e, "Undecodable document, keeping last value");
                    None
                }
            },
            None if D::CREATE_WHEN_MISSING && !self.create_attempted => {
                self.create_attempted = true;
                let path = D::path(self.scope.branch_id());
                match create_if_absent(self.store.as_ref(), &path, &D::default(), self.max_attempts).await {
                    Ok(true) => {
                        info!(document = D::NAME, branch_id = %self.scope, "Created default document");
                        None
                    }
                    Ok(false) => Some(D::default()),
                    Err(e) => {
                        warn!(document = D::NAME, error = %e, "Creating default document failed");
                        Some(D::default())
                    }
                }
            }
            None => Some(D::default()),
        }
    }
}

/// Writes `value` at `path` unless a document already exists there.
async fn create_if_absent<D: SyncDocument>(
    store: &dyn RemoteStore,
    path: &str,
    value: &D,
    max_attempts: u32,
) -> SyncResult<bool> {
    let body = value.to_body()?;
    AtomicUpdate::new(vec![path.to_string()])
        .max_attempts(max_attempts)
        .run(store, |snapshot| {
            if snapshot.exists(path) {
                Ok((Vec::new(), false))
            } else {
                Ok((vec![WriteOp::set(path, body.clone())], true))
            }
        })
        .await
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::testing::wait_for;
    use rawnak_db::MemoryCache;
    use serde_json::json;

    #[tokio::test]
    async fn test_missing_settings_are_created() {
        let store = Arc::new(MemoryStore::new());
        let cache = Arc::new(MemoryCache::new());
        let settings: DocumentSync<BranchSettings> =
            DocumentSync::new(Some(store.clone() as Arc<dyn RemoteStore>), cache.clone());

        let mut rx = settings.watch();
        settings.subscribe(&BranchScope::new("b2")).await.unwrap();
        let view = wait_for(&mut rx, |v| v.source == ViewSource::Remote).await;
        assert_eq!(view.value, BranchSettings::default());

        let doc = store.get("branches/b2/data/settings").await.unwrap().unwrap();
        assert_eq!(BranchSettings::from_body(doc.data).unwrap(), BranchSettings::default());

        let cached: Option<BranchSettings> = cache::read_json(cache.as_ref(), "settings_b2").await;
        assert_eq!(cached, Some(BranchSettings::default()));
    }

    #[tokio::test]
    async fn test_missing_categories_read_as_empty_and_are_not_created() {
        let store = Arc::new(MemoryStore::new());
        let cache = Arc::new(MemoryCache::new());
        let categories: DocumentSync<Vec<String>> =
            DocumentSync::new(Some(store.clone() as Arc<dyn RemoteStore>), cache.clone());

        let mut rx = categories.watch();
        categories.subscribe(&BranchScope::new("b2")).await.unwrap();
        let view = wait_for(&mut rx, |v| v.source == ViewSource::Remote).await;
        assert!(view.value.is_empty());
        assert!(store.is_empty().await);

        store
            .set("branches/b2/data/categories", json!({ "list": ["Bakery", "Dairy"] }))
            .await
            .unwrap();
        let view = wait_for(&mut rx, |v| v.value.len() == 2).await;
        assert_eq!(view.value, vec!["Bakery".to_string(), "Dairy".to_string()]);

        let cached: Option<Vec<String>> = cache::read_json(cache.as_ref(), "categories_b2").await;
        assert_eq!(cached.map(|c| c.len()), Some(2));
    }

    #[tokio::test]
    async fn test_offline_value_is_seed() {
        let categories: DocumentSync<Vec<String>> =
            DocumentSync::new(None, Arc::new(MemoryCache::new()));
        categories.subscribe(&BranchScope::new("b2")).await.unwrap();
        assert_eq!(categories.value(), seed::initial_categories());
        assert_eq!(categories.current().source, ViewSource::Seed);
    }
}
