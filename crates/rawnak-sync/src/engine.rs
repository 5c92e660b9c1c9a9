//! # Entity Sync Engine
//!
//! One generic engine mirrors a branch-scoped collection (products,
//! customers, sales) from the remote store into an observable view.
//!
//! ## Subscription Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     EntitySync::subscribe(scope)                        │
//! │                                                                         │
//! │  1. stop the previous pump (abort + join)                              │
//! │  2. generation += 1                                                    │
//! │  3. publish cache value   {source: Cache}      instant, maybe stale    │
//! │       │                                                                 │
//! │       ├── no remote store ─► publish seed     {source: Seed}           │
//! │       │                      (written to cache once per branch)         │
//! │       │                                                                 │
//! │       └── remote store ────► spawn pump                                 │
//! │                                 │                                       │
//! │                                 ▼                                       │
//! │               ┌──────────────────────────────────────┐                 │
//! │               │ for each snapshot:                   │                 │
//! │               │   empty + default branch + unseeded? │                 │
//! │               │       → create-if-absent seed, skip  │                 │
//! │               │   decode, sort newest first          │                 │
//! │               │   write cache                        │                 │
//! │               │   publish iff generation unchanged   │                 │
//! │               └──────────────────────────────────────┘                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Steps 1-3 and the guarded publish are [`scoped`](crate::scoped)'s; this
//! module decides what a snapshot becomes.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rawnak_core::{seed, BranchScope, Customer, Product, Sale};
use rawnak_db::cache::{self, LocalCache};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::{watch, Mutex};
use tracing::{info, warn};

use crate::error::{StoreError, SyncResult};
use crate::scoped::{ScopedChannel, ScopedView, SnapshotHandler};
use crate::store::{
    self, categories_path, collection_path, doc_path, AtomicUpdate, Document, RemoteStore,
    WriteOp,
};

// =============================================================================
// Entity Trait
// =============================================================================

/// A document type mirrored by [`EntitySync`].
pub trait SyncEntity: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Collection name and cache key prefix (`products`, ...).
    const KIND: &'static str;

    fn id(&self) -> &str;

    /// Views are ordered by this timestamp, newest first.
    fn sort_key(&self) -> DateTime<Utc>;

    /// Dataset used when no remote store is configured.
    fn seed() -> Vec<Self>;

    /// Written to the default branch when its collection is first seen
    /// empty.
    fn remote_seed() -> Vec<Self> {
        Vec::new()
    }

    /// Extra documents created alongside [`SyncEntity::remote_seed`].
    fn companion_seed(_branch_id: &str) -> Vec<(String, Value)> {
        Vec::new()
    }
}

impl SyncEntity for Product {
    const KIND: &'static str = "products";

    fn id(&self) -> &str {
        &self.id
    }

    fn sort_key(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn seed() -> Vec<Self> {
        seed::initial_products()
    }

    fn remote_seed() -> Vec<Self> {
        seed::initial_products()
    }

    fn companion_seed(branch_id: &str) -> Vec<(String, Value)> {
        vec![(
            categories_path(branch_id),
            json!({ "list": seed::initial_categories() }),
        )]
    }
}

impl SyncEntity for Customer {
    const KIND: &'static str = "customers";

    fn id(&self) -> &str {
        &self.id
    }

    fn sort_key(&self) -> DateTime<Utc> {
        self.customer_since
    }

    fn seed() -> Vec<Self> {
        seed::initial_customers(Utc::now().date_naive())
    }

    fn remote_seed() -> Vec<Self> {
        seed::initial_customers(Utc::now().date_naive())
    }
}

impl SyncEntity for Sale {
    const KIND: &'static str = "sales";

    fn id(&self) -> &str {
        &self.id
    }

    fn sort_key(&self) -> DateTime<Utc> {
        self.date
    }

    fn seed() -> Vec<Self> {
        Vec::new()
    }
}

// =============================================================================
// View
// =============================================================================

/// Where the items of a [`CollectionView`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ViewSource {
    /// Nothing subscribed yet.
    #[default]
    Empty,
    /// Local cache. Possibly stale, never final.
    Cache,
    /// Authoritative remote snapshot.
    Remote,
    /// Seed dataset (no remote store).
    Seed,
    /// In-memory edit made without a remote store.
    Local,
}

/// What subscribers of an engine observe.
#[derive(Debug, Clone)]
pub struct CollectionView<E> {
    pub generation: u64,
    pub branch_id: Option<String>,
    pub source: ViewSource,
    pub items: Vec<E>,
}

impl<E> Default for CollectionView<E> {
    fn default() -> Self {
        CollectionView {
            generation: 0,
            branch_id: None,
            source: ViewSource::Empty,
            items: Vec::new(),
        }
    }
}

impl<E> CollectionView<E> {
    /// True once the view no longer shows the cache placeholder.
    pub fn is_final(&self) -> bool {
        matches!(
            self.source,
            ViewSource::Remote | ViewSource::Seed | ViewSource::Local
        )
    }

    pub fn is_for(&self, scope: &BranchScope) -> bool {
        self.branch_id.as_deref() == Some(scope.branch_id())
    }
}

fn sort_newest_first<E: SyncEntity>(items: &mut [E]) {
    items.sort_by(|a, b| b.sort_key().cmp(&a.sort_key()));
}

/// Decodes every document, skipping (and logging) malformed ones.
fn decode_all<E: SyncEntity>(docs: &[Document]) -> Vec<E> {
    docs.iter()
        .filter_map(|doc| match store::decode::<E>(doc) {
            Ok(item) => Some(item),
            Err(e) => {
                warn!(kind = E::KIND, id = %doc.id, error = %e, "Skipping undecodable document");
                None
            }
        })
        .collect()
}

// =============================================================================
// Engine
// =============================================================================

impl<E: SyncEntity> ScopedView for CollectionView<E> {
    type Payload = Vec<E>;

    fn stamped(generation: u64, scope: &BranchScope, source: ViewSource, items: Vec<E>) -> Self {
        CollectionView {
            generation,
            branch_id: Some(scope.branch_id().to_string()),
            source,
            items,
        }
    }

    fn generation(&self) -> u64 {
        self.generation
    }

    fn replace(&mut self, source: ViewSource, items: Vec<E>) {
        self.source = source;
        self.items = items;
    }
}

/// Observable, branch-scoped mirror of one remote collection.
pub struct EntitySync<E: SyncEntity> {
    store: Option<Arc<dyn RemoteStore>>,
    max_attempts: u32,
    channel: ScopedChannel<CollectionView<E>>,
    /// Per-branch collections edited without a remote store.
    offline: Mutex<HashMap<String, Vec<E>>>,
}

impl<E: SyncEntity> EntitySync<E> {
    /// `store` is `None` in offline mode.
    pub fn new(store: Option<Arc<dyn RemoteStore>>, cache: Arc<dyn LocalCache>) -> Self {
        EntitySync {
            store,
            max_attempts: 5,
            channel: ScopedChannel::new(E::KIND, cache),
            offline: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// Receiver of every published view.
    pub fn watch(&self) -> watch::Receiver<CollectionView<E>> {
        self.channel.watch()
    }

    /// The latest published view.
    pub fn current(&self) -> CollectionView<E> {
        self.channel.current()
    }

    pub fn items(&self) -> Vec<E> {
        self.channel.borrow().items.clone()
    }

    pub fn is_offline(&self) -> bool {
        self.store.is_none()
    }

    /// The scope currently subscribed to, if any.
    pub async fn scope(&self) -> Option<BranchScope> {
        self.channel.scope().await
    }

    // =========================================================================
    // Subscription
    // =========================================================================

    /// Switches the view to `scope`. See the module docs for the sequence.
    pub async fn subscribe(&self, scope: &BranchScope) -> SyncResult<()> {
        let rescope = self.channel.begin(scope).await;

        let Some(store) = self.store.clone() else {
            let items = self.offline_items(scope).await;
            rescope.finish_offline(items);
            return Ok(());
        };

        let subscription = store
            .watch_collection(&collection_path(scope.branch_id(), E::KIND))
            .await;
        rescope.finish(
            subscription,
            EntitySnapshots::<E> {
                store,
                scope: scope.clone(),
                max_attempts: self.max_attempts,
                seed_attempted: false,
                kind: PhantomData,
            },
        );
        Ok(())
    }

    /// Stops delivery. The last view stays readable.
    pub async fn unsubscribe(&self) {
        self.channel.stop().await;
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Creates or replaces `item` in `scope`.
    pub async fn put(&self, scope: &BranchScope, item: E) -> SyncResult<()> {
        match &self.store {
            Some(store) => {
                let path = self.doc_path(scope, item.id());
                let data = store::encode(&path, &item)?;
                store.set(&path, data).await?;
            }
            None => {
                let items = {
                    let mut offline = self.offline.lock().await;
                    let items = offline
                        .entry(scope.branch_id().to_string())
                        .or_insert_with(E::seed);
                    match items.iter_mut().find(|i| i.id() == item.id()) {
                        Some(existing) => *existing = item,
                        None => items.push(item),
                    }
                    items.clone()
                };
                self.publish_local(scope, items).await;
            }
        }
        Ok(())
    }

    /// Merges `fields` into an existing document.
    ///
    /// ## Errors
    /// `NotFound` when the document does not exist.
    pub async fn patch(&self, scope: &BranchScope, id: &str, fields: Value) -> SyncResult<()> {
        match &self.store {
            Some(store) => {
                store.update(&self.doc_path(scope, id), fields).await?;
                Ok(())
            }
            None => {
                let path = self.doc_path(scope, id);
                self.modify_local(scope, id, |item| {
                    let mut data = store::encode(&path, &*item)?;
                    if let (Value::Object(base), Value::Object(patch)) = (&mut data, fields) {
                        base.extend(patch);
                    }
                    *item = store::decode_value(id, data)?;
                    Ok(())
                })
                .await
            }
        }
    }

    /// Deletes a document. Missing documents are not an error.
    pub async fn remove(&self, scope: &BranchScope, id: &str) -> SyncResult<()> {
        match &self.store {
            Some(store) => {
                store.delete(&self.doc_path(scope, id)).await?;
            }
            None => {
                let items = {
                    let mut offline = self.offline.lock().await;
                    let items = offline
                        .entry(scope.branch_id().to_string())
                        .or_insert_with(E::seed);
                    items.retain(|i| i.id() != id);
                    items.clone()
                };
                self.publish_local(scope, items).await;
            }
        }
        Ok(())
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

    pub(crate) fn doc_path(&self, scope: &BranchScope, id: &str) -> String {
        doc_path(&collection_path(scope.branch_id(), E::KIND), id)
    }

    /// Edits one offline item in place and republishes.
    pub(crate) async fn modify_local<T, F>(&self, scope: &BranchScope, id: &str, f: F) -> SyncResult<T>
    where
        F: FnOnce(&mut E) -> SyncResult<T>,
    {
        let (result, items) = {
            let mut offline = self.offline.lock().await;
            let items = offline
                .entry(scope.branch_id().to_string())
                .or_insert_with(E::seed);
            let item = items
                .iter_mut()
                .find(|i| i.id() == id)
                .ok_or_else(|| StoreError::not_found(self.doc_path(scope, id)))?;
            let result = f(item)?;
            (result, items.clone())
        };
        self.publish_local(scope, items).await;
        Ok(result)
    }

    /// Offline collection of a branch as last edited.
    pub(crate) async fn local_items(&self, scope: &BranchScope) -> Vec<E> {
        let mut offline = self.offline.lock().await;
        offline
            .entry(scope.branch_id().to_string())
            .or_insert_with(E::seed)
            .clone()
    }

    /// Offline collection of a branch, seeding it (and its cache entry)
    /// the first time the branch is seen.
    async fn offline_items(&self, scope: &BranchScope) -> Vec<E> {
        let mut offline = self.offline.lock().await;
        if let Some(items) = offline.get(scope.branch_id()) {
            let mut items = items.clone();
            sort_newest_first(&mut items);
            return items;
        }

        let mut items = E::seed();
        sort_newest_first(&mut items);
        let key = cache::collection_key(E::KIND, scope.branch_id());
        if let Err(e) = cache::write_json(self.channel.cache(), &key, &items).await {
            warn!(kind = E::KIND, key = %key, error = %e, "Failed to cache seed data");
        }
        info!(kind = E::KIND, branch_id = %scope, count = items.len(), "No remote store, using seed data");
        offline.insert(scope.branch_id().to_string(), items.clone());
        items
    }

    async fn publish_local(&self, scope: &BranchScope, mut items: Vec<E>) {
        sort_newest_first(&mut items);
        self.channel.publish_local(scope, items).await;
    }
}

// =============================================================================
// Snapshots
// =============================================================================

/// Decodes collection snapshots, seeding an empty default branch once.
struct EntitySnapshots<E> {
    store: Arc<dyn RemoteStore>,
    scope: BranchScope,
    max_attempts: u32,
    seed_attempted: bool,
    kind: PhantomData<fn() -> E>,
}

#[async_trait]
impl<E: SyncEntity> SnapshotHandler for EntitySnapshots<E> {
    type Payload = Vec<E>;

    async fn resolve(&mut self, docs: Vec<Document>) -> Option<Vec<E>> {
        let mut items: Vec<E> = decode_all(&docs);

        if items.is_empty() && self.scope.is_default() && !self.seed_attempted {
            self.seed_attempted = true;
            match seed_remote::<E>(self.store.as_ref(), self.scope.branch_id(), self.max_attempts).await {
                Ok(true) => return None,
                Ok(false) => {}
                Err(e) => {
                    warn!(kind = E::KIND, error = %e, "Seeding default branch failed");
                }
            }
        }

        sort_newest_first(&mut items);
        Some(items)
    }
}

/// Create-if-absent seed of the default branch.
///
/// Returns whether anything was written.
pub(crate) async fn seed_remote<E: SyncEntity>(
    store: &dyn RemoteStore,
    branch_id: &str,
    max_attempts: u32,
) -> SyncResult<bool> {
    let collection = collection_path(branch_id, E::KIND);

    let mut docs: Vec<(String, Value)> = Vec::new();
    for item in E::remote_seed() {
        let path = doc_path(&collection, item.id());
        let data = store::encode(&path, &item)?;
        docs.push((path, data));
    }
    if docs.is_empty() {
        return Ok(false);
    }
    docs.extend(E::companion_seed(branch_id));

    let reads: Vec<String> = docs.iter().map(|(path, _)| path.clone()).collect();
    let wrote = AtomicUpdate::new(reads)
        .max_attempts(max_attempts)
        .run(store, |snapshot| {
            let writes: Vec<WriteOp> = docs
                .iter()
                .filter(|(path, _)| !snapshot.exists(path))
                .map(|(path, data)| WriteOp::set(path.clone(), data.clone()))
                .collect();
            let wrote = !writes.is_empty();
            Ok((writes, wrote))
        })
        .await?;

    if wrote {
        info!(kind = E::KIND, branch_id, "Seeded default branch");
    }
    Ok(wrote)
}

/// Engine mirroring `branches/{id}/products`.
pub type ProductSync = EntitySync<Product>;
/// Engine mirroring `branches/{id}/customers`.
pub type CustomerSync = EntitySync<Customer>;
/// Engine mirroring `branches/{id}/sales`.
pub type SaleSync = EntitySync<Sale>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::testing::wait_for;
    use rawnak_db::MemoryCache;

    fn remote() -> (Arc<MemoryStore>, Arc<MemoryCache>) {
        (Arc::new(MemoryStore::new()), Arc::new(MemoryCache::new()))
    }

    fn engine<E: SyncEntity>(store: &Arc<MemoryStore>, cache: &Arc<MemoryCache>) -> EntitySync<E> {
        EntitySync::new(Some(store.clone() as Arc<dyn RemoteStore>), cache.clone())
    }

    #[tokio::test]
    async fn test_cache_first_then_remote() {
        let (store, cache) = remote();
        let stale = vec![seed::initial_products()[0].clone()];
        cache::write_json(cache.as_ref(), "products_b2", &stale).await.unwrap();

        let products: ProductSync = engine(&store, &cache);
        let mut rx = products.watch();
        products.subscribe(&BranchScope::new("b2")).await.unwrap();

        let first = rx.borrow_and_update().clone();
        assert!(first.source == ViewSource::Cache || first.source == ViewSource::Remote);

        let view = wait_for(&mut rx, |v| v.source == ViewSource::Remote).await;
        assert!(view.items.is_empty());
        assert_eq!(view.branch_id.as_deref(), Some("b2"));

        let cached: Option<Vec<Product>> = cache::read_json(cache.as_ref(), "products_b2").await;
        assert_eq!(cached, Some(Vec::new()));
    }

    #[tokio::test]
    async fn test_default_branch_seeds_remote_once() {
        let (store, cache) = remote();
        let products: ProductSync = engine(&store, &cache);
        let mut rx = products.watch();
        products.subscribe(&BranchScope::default_branch()).await.unwrap();

        let view = wait_for(&mut rx, |v| v.source == ViewSource::Remote && !v.items.is_empty()).await;
        assert_eq!(view.items.len(), 5);
        let newest_first: Vec<DateTime<Utc>> = view.items.iter().map(|p| p.created_at).collect();
        let mut sorted = newest_first.clone();
        sorted.sort_by(|a, b| b.cmp(a));
        assert_eq!(newest_first, sorted);

        assert!(store.get(&categories_path("main")).await.unwrap().is_some());

        let again = seed_remote::<Product>(store.as_ref(), "main", 5).await.unwrap();
        assert!(!again);
    }

    #[tokio::test]
    async fn test_other_branches_are_not_seeded() {
        let (store, cache) = remote();
        let customers: CustomerSync = engine(&store, &cache);
        let mut rx = customers.watch();
        customers.subscribe(&BranchScope::new("b2")).await.unwrap();

        let view = wait_for(&mut rx, |v| v.source == ViewSource::Remote).await;
        assert!(view.items.is_empty());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_switch_never_mixes_branches() {
        let (store, cache) = remote();
        let products: ProductSync = engine(&store, &cache);

        let mut in_b2 = seed::initial_products()[0].clone();
        in_b2.id = "only-b2".into();
        products.put(&BranchScope::new("b2"), in_b2).await.unwrap();

        let mut rx = products.watch();
        products.subscribe(&BranchScope::default_branch()).await.unwrap();
        products.subscribe(&BranchScope::new("b2")).await.unwrap();

        // Writes to main after the switch must not surface.
        let mut in_main = seed::initial_products()[1].clone();
        in_main.id = "late-main".into();
        products.put(&BranchScope::default_branch(), in_main).await.unwrap();

        let view = wait_for(&mut rx, |v| v.source == ViewSource::Remote).await;
        assert_eq!(view.branch_id.as_deref(), Some("b2"));
        assert!(view.items.iter().all(|p| p.id == "only-b2"));

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        let view = products.current();
        assert_eq!(view.branch_id.as_deref(), Some("b2"));
        assert_eq!(view.items.len(), 1);
        assert_eq!(view.items[0].id, "only-b2");
    }

    #[tokio::test]
    async fn test_unsubscribe_stops_delivery() {
        let (store, cache) = remote();
        let products: ProductSync = engine(&store, &cache);
        let mut rx = products.watch();
        products.subscribe(&BranchScope::new("b2")).await.unwrap();
        wait_for(&mut rx, |v| v.source == ViewSource::Remote).await;

        products.unsubscribe().await;
        let product = seed::initial_products()[0].clone();
        let path = "branches/b2/products/1";
        store.set(path, store::encode(path, &product).unwrap()).await.unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(products.items().is_empty());
        assert_eq!(products.scope().await, None);
    }

    #[tokio::test]
    async fn test_offline_uses_seed_and_local_edits() {
        let cache = Arc::new(MemoryCache::new());
        let products: ProductSync = EntitySync::new(None, cache.clone());
        let scope = BranchScope::default_branch();

        products.subscribe(&scope).await.unwrap();
        let view = products.current();
        assert_eq!(view.source, ViewSource::Seed);
        assert_eq!(view.items.len(), 5);

        let cached: Option<Vec<Product>> = cache::read_json(cache.as_ref(), "products_main").await;
        assert_eq!(cached.map(|c| c.len()), Some(5));

        products.patch(&scope, "1", json!({ "stock": 3 })).await.unwrap();
        products.remove(&scope, "2").await.unwrap();

        let view = products.current();
        assert_eq!(view.source, ViewSource::Local);
        assert_eq!(view.items.len(), 4);
        assert_eq!(view.items.iter().find(|p| p.id == "1").unwrap().stock, 3);

        // Edits do not touch the cache.
        let cached: Option<Vec<Product>> = cache::read_json(cache.as_ref(), "products_main").await;
        assert_eq!(cached.map(|c| c.len()), Some(5));

        let err = products.patch(&scope, "404", json!({ "stock": 1 })).await.unwrap_err();
        assert_eq!(err.kind(), rawnak_core::ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_remote_patch_of_missing_doc_is_not_found() {
        let (store, cache) = remote();
        let products: ProductSync = engine(&store, &cache);
        let err = products
            .patch(&BranchScope::new("b2"), "404", json!({ "stock": 1 }))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), rawnak_core::ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_unavailable_store_keeps_cached_view() {
        let (store, cache) = remote();
        let cached = seed::initial_products();
        cache::write_json(cache.as_ref(), "products_main", &cached).await.unwrap();
        store.set_available(false);

        let products: ProductSync = engine(&store, &cache);
        products.subscribe(&BranchScope::default_branch()).await.unwrap();

        let view = products.current();
        assert_eq!(view.source, ViewSource::Cache);
        assert_eq!(view.items.len(), 5);
        assert!(!view.is_final());
    }
}
