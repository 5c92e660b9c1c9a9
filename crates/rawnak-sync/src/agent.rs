//! # Sync Agent
//!
//! Owns every branch-scoped component and keeps them on the active branch.
//!
//! ## Agent Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        SyncAgent Architecture                           │
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                         SyncAgent                                │  │
//! │  │                                                                  │  │
//! │  │  • Builds the remote store and the local cache from config       │  │
//! │  │  • Follows the active branch and re-scopes every component       │  │
//! │  │  • Emits branch and error events to the UI                       │  │
//! │  └────────────────────────────┬─────────────────────────────────────┘  │
//! │                               │ BranchScope                             │
//! │     ┌──────────┬──────────────┼──────────────┬─────────────┐           │
//! │     ▼          ▼              ▼              ▼             ▼            │
//! │  Products   Customers       Sales       Categories     Settings        │
//! │  (EntitySync)                           (document)     (document)      │
//! │                                                                         │
//! │  BranchRegistry ── active scope ──► follower task ──► rescope()        │
//! │  SaleCoordinator ── record_sale(active scope)                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Re-scoping is serialized and idempotent: a scope already applied is not
//! subscribed again, so explicit switches and the follower never race.

use std::sync::Arc;

use rawnak_core::sale::SaleRequest;
use rawnak_core::{Branch, BranchPatch, BranchScope, Role, Sale};
use rawnak_db::{Database, DbConfig, LocalCache, MemoryCache};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::branch::BranchRegistry;
use crate::categories::CategoryRegistry;
use crate::config::{CacheBackend, StoreMode, SyncConfig};
use crate::coordinator::SaleCoordinator;
use crate::engine::{CustomerSync, ProductSync, SaleSync};
use crate::error::SyncResult;
use crate::settings::SettingsStore;
use crate::store::{MemoryStore, RemoteStore};

// =============================================================================
// Sync Status
// =============================================================================

/// Snapshot of the agent for external queries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncStatus {
    pub mode: StoreMode,
    /// Branch every component is currently subscribed to.
    pub active_branch: Option<BranchScope>,
    pub started: bool,
}

// =============================================================================
// Event Emitter Trait
// =============================================================================

/// Receives agent events (implemented by the UI integration).
pub trait SyncEventEmitter: Send + Sync {
    /// Every component now follows `scope`.
    fn emit_branch_changed(&self, scope: &BranchScope);

    fn emit_error(&self, message: &str, retryable: bool);
}

/// No-op event emitter for testing.
pub struct NoOpEmitter;

impl SyncEventEmitter for NoOpEmitter {
    fn emit_branch_changed(&self, _scope: &BranchScope) {}
    fn emit_error(&self, _message: &str, _retryable: bool) {}
}

// =============================================================================
// Components
// =============================================================================

struct Components {
    branches: Arc<BranchRegistry>,
    products: Arc<ProductSync>,
    customers: Arc<CustomerSync>,
    sales: Arc<SaleSync>,
    categories: Arc<CategoryRegistry>,
    settings: Arc<SettingsStore>,
    emitter: Arc<dyn SyncEventEmitter>,
    applied: Mutex<Option<BranchScope>>,
}

impl Components {
    /// Subscribes every component to the registry's active branch.
    ///
    /// The active scope is read under the lock, so a late caller can never
    /// re-apply an older branch.
    async fn rescope(&self) -> SyncResult<BranchScope> {
        let mut applied = self.applied.lock().await;
        let scope = self.branches.active();
        if applied.as_ref() == Some(&scope) {
            return Ok(scope);
        }

        self.products.subscribe(&scope).await?;
        self.customers.subscribe(&scope).await?;
        self.sales.subscribe(&scope).await?;
        self.categories.subscribe(&scope).await?;
        self.settings.subscribe(&scope).await?;

        *applied = Some(scope.clone());
        info!(branch_id = %scope, "Components re-scoped");
        self.emitter.emit_branch_changed(&scope);
        Ok(scope)
    }

    async fn unsubscribe(&self) {
        let mut applied = self.applied.lock().await;
        self.products.unsubscribe().await;
        self.customers.unsubscribe().await;
        self.sales.unsubscribe().await;
        self.categories.unsubscribe().await;
        self.settings.unsubscribe().await;
        *applied = None;
    }
}

// =============================================================================
// Sync Agent
// =============================================================================

pub struct SyncAgent {
    config: Arc<SyncConfig>,
    components: Arc<Components>,
    coordinator: SaleCoordinator,
    follower: Mutex<Option<JoinHandle<()>>>,
}

impl SyncAgent {
    /// Builds the store and the cache described by `config`.
    ///
    /// `[store] mode = "remote"` creates a fresh in-process [`MemoryStore`].
    /// Its documents live only as long as this process; only the local
    /// cache survives a restart. Use [`SyncAgent::from_config_with_store`]
    /// to share one store between agents or to plug in another backend.
    /// `[cache] backend = "sqlite"` opens (and migrates) the cache database.
    pub async fn from_config(config: SyncConfig) -> SyncResult<Self> {
        let store: Option<Arc<dyn RemoteStore>> = match config.mode() {
            StoreMode::Remote => Some(Arc::new(MemoryStore::new())),
            StoreMode::Offline => None,
        };
        Self::from_config_with_store(config, store).await
    }

    /// Like [`SyncAgent::from_config`], over a caller-owned store.
    ///
    /// `store` is used as given; `[store] mode` only picks the default
    /// when building through `from_config`.
    pub async fn from_config_with_store(
        config: SyncConfig,
        store: Option<Arc<dyn RemoteStore>>,
    ) -> SyncResult<Self> {
        config.validate()?;

        let cache: Arc<dyn LocalCache> = match config.cache.backend {
            CacheBackend::Sqlite => {
                let db = Database::new(DbConfig::new(config.cache.path.clone())).await?;
                Arc::new(db.cache())
            }
            CacheBackend::Memory => Arc::new(MemoryCache::new()),
        };

        Ok(Self::new(config, store, cache))
    }

    /// Creates an agent over an injected store and cache.
    pub fn new(config: SyncConfig, store: Option<Arc<dyn RemoteStore>>, cache: Arc<dyn LocalCache>) -> Self {
        Self::with_emitter(config, store, cache, Arc::new(NoOpEmitter))
    }

    pub fn with_emitter(
        config: SyncConfig,
        store: Option<Arc<dyn RemoteStore>>,
        cache: Arc<dyn LocalCache>,
        emitter: Arc<dyn SyncEventEmitter>,
    ) -> Self {
        let attempts = config.max_attempts();

        let products = Arc::new(ProductSync::new(store.clone(), cache.clone()).with_max_attempts(attempts));
        let customers = Arc::new(CustomerSync::new(store.clone(), cache.clone()).with_max_attempts(attempts));
        let sales = Arc::new(SaleSync::new(store.clone(), cache.clone()).with_max_attempts(attempts));
        let categories = Arc::new(
            CategoryRegistry::new(store.clone(), cache.clone(), products.clone()).with_max_attempts(attempts),
        );
        let settings = Arc::new(SettingsStore::new(store.clone(), cache.clone()).with_max_attempts(attempts));
        let branches = Arc::new(
            BranchRegistry::new(store.clone(), cache)
                .with_max_attempts(attempts)
                .with_startup_branch(config.default_branch_id()),
        );
        let coordinator = SaleCoordinator::new(store).with_max_attempts(attempts);

        SyncAgent {
            config: Arc::new(config),
            components: Arc::new(Components {
                branches,
                products,
                customers,
                sales,
                categories,
                settings,
                emitter,
                applied: Mutex::new(None),
            }),
            coordinator,
            follower: Mutex::new(None),
        }
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Restores the active branch, subscribes every component to it and
    /// starts following branch changes.
    pub async fn start(&self) -> SyncResult<BranchScope> {
        info!(mode = %self.config.mode(), "Starting sync agent");

        self.components.branches.start().await?;
        let scope = self.components.rescope().await?;

        let mut follower = self.follower.lock().await;
        if let Some(previous) = follower.take() {
            previous.abort();
        }
        let mut active = self.components.branches.watch_active();
        active.borrow_and_update();
        let components = self.components.clone();
        *follower = Some(tokio::spawn(async move {
            while active.changed().await.is_ok() {
                let scope = active.borrow_and_update().clone();
                debug!(branch_id = %scope, "Active branch changed");
                if let Err(e) = components.rescope().await {
                    error!(branch_id = %scope, error = %e, "Re-scoping failed");
                    components.emitter.emit_error(&e.to_string(), e.is_retryable());
                }
            }
        }));

        info!(branch_id = %scope, "Sync agent started");
        Ok(scope)
    }

    pub async fn shutdown(&self) {
        info!("Shutting down sync agent");
        if let Some(follower) = self.follower.lock().await.take() {
            follower.abort();
            let _ = follower.await;
        }
        self.components.unsubscribe().await;
        self.components.branches.stop().await;
        info!("Sync agent stopped");
    }

    pub async fn status(&self) -> SyncStatus {
        SyncStatus {
            mode: self.config.mode(),
            active_branch: self.components.applied.lock().await.clone(),
            started: self.follower.lock().await.is_some(),
        }
    }

    // =========================================================================
    // Components
    // =========================================================================

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// The active branch scope.
    pub fn scope(&self) -> BranchScope {
        self.components.branches.active()
    }

    pub fn products(&self) -> &ProductSync {
        &self.components.products
    }

    pub fn customers(&self) -> &CustomerSync {
        &self.components.customers
    }

    pub fn sales(&self) -> &SaleSync {
        &self.components.sales
    }

    pub fn categories(&self) -> &CategoryRegistry {
        &self.components.categories
    }

    pub fn settings(&self) -> &SettingsStore {
        &self.components.settings
    }

    pub fn branches(&self) -> &BranchRegistry {
        &self.components.branches
    }

    pub fn coordinator(&self) -> &SaleCoordinator {
        &self.coordinator
    }

    // =========================================================================
    // Branch Operations
    // =========================================================================

    pub async fn switch_branch(&self, branch_id: &str) -> SyncResult<BranchScope> {
        self.components.branches.switch(branch_id).await?;
        self.components.rescope().await
    }

    pub async fn add_branch(&self, name: &str) -> SyncResult<Branch> {
        let branch = self.components.branches.add(name).await?;
        self.components.rescope().await?;
        Ok(branch)
    }

    pub async fn update_branch_info(&self, patch: BranchPatch) -> SyncResult<()> {
        self.components.branches.update_active_info(patch).await
    }

    pub async fn delete_branch(&self, branch_id: &str, role: Role) -> SyncResult<BranchScope> {
        self.components.branches.delete(branch_id, role).await?;
        self.components.rescope().await
    }

    /// Records a sale in the active branch.
    pub async fn record_sale(&self, request: SaleRequest) -> SyncResult<Sale> {
        self.coordinator.record_sale(&self.scope(), request).await
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::ViewSource;
    use crate::testing::wait_for;
    use rawnak_core::sale::CustomerRef;
    use rawnak_core::{seed, ErrorKind, PaymentMethod, ProductDraft, SaleItem};
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct RecordingEmitter {
        branches: StdMutex<Vec<String>>,
    }

    impl SyncEventEmitter for RecordingEmitter {
        fn emit_branch_changed(&self, scope: &BranchScope) {
            self.branches.lock().unwrap().push(scope.branch_id().to_string());
        }
        fn emit_error(&self, _message: &str, _retryable: bool) {}
    }

    fn remote_agent(emitter: Arc<RecordingEmitter>) -> (Arc<MemoryStore>, SyncAgent) {
        let store = Arc::new(MemoryStore::new());
        let agent = SyncAgent::with_emitter(
            SyncConfig::new(),
            Some(store.clone() as Arc<dyn RemoteStore>),
            Arc::new(MemoryCache::new()),
            emitter,
        );
        (store, agent)
    }

    #[tokio::test]
    async fn test_offline_agent_uses_seed_data() {
        let agent = SyncAgent::from_config(SyncConfig::offline()).await.unwrap();
        let scope = agent.start().await.unwrap();
        assert!(scope.is_default());

        assert_eq!(agent.products().items().len(), 5);
        assert_eq!(agent.customers().items().len(), 3);
        assert!(agent.sales().items().is_empty());
        assert_eq!(agent.categories().list(), seed::initial_categories());
        assert_eq!(agent.settings().current().source, ViewSource::Seed);

        let err = agent
            .record_sale(SaleRequest {
                cart: vec![SaleItem::custom("Tea", rawnak_core::Money::from_cents(50), 1)],
                customer: CustomerRef {
                    id: "walk-in".into(),
                    name: "Walk-in".into(),
                    phone: None,
                },
                total: rawnak_core::Money::from_cents(50),
                payment_method: PaymentMethod::Paid,
                discount: None,
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StoreUnavailable);

        let status = agent.status().await;
        assert_eq!(status.mode, StoreMode::Offline);
        assert_eq!(status.active_branch, Some(scope));
        agent.shutdown().await;
    }

    #[tokio::test]
    async fn test_branch_lifecycle_rescopes_components() {
        let emitter = Arc::new(RecordingEmitter::default());
        let (_store, agent) = remote_agent(emitter.clone());
        agent.start().await.unwrap();

        let mut products = agent.products().watch();
        wait_for(&mut products, |v| v.source == ViewSource::Remote && v.items.len() == 5).await;
        let mut branches = agent.branches().watch_branches();
        wait_for(&mut branches, |v| v.source == ViewSource::Remote && !v.items.is_empty()).await;

        let added = agent.add_branch("Airport").await.unwrap();
        let new_scope = BranchScope::new(added.id.clone());
        let view = wait_for(&mut products, |v| v.is_for(&new_scope) && v.is_final()).await;
        assert!(view.items.is_empty());
        assert!(agent.categories().current().branch_id.as_deref() == Some(added.id.as_str()));

        wait_for(&mut branches, |v| v.items.len() == 2).await;
        let back = agent.delete_branch(&added.id, Role::Admin).await.unwrap();
        assert!(back.is_default());
        let view = wait_for(&mut products, |v| v.is_for(&back) && v.is_final()).await;
        assert_eq!(view.items.len(), 5);

        let seen = emitter.branches.lock().unwrap().clone();
        assert_eq!(seen, vec!["main".to_string(), added.id.clone(), "main".to_string()]);
        agent.shutdown().await;
    }

    #[tokio::test]
    async fn test_record_sale_uses_active_branch() {
        let (store, agent) = remote_agent(Arc::new(RecordingEmitter::default()));
        agent.start().await.unwrap();
        let mut products = agent.products().watch();
        let view = wait_for(&mut products, |v| v.source == ViewSource::Remote && v.items.len() == 5).await;

        let milk = view.items.iter().find(|p| p.id == "3").unwrap().clone();
        let sale = agent
            .record_sale(SaleRequest {
                cart: vec![SaleItem::from_product(&milk, 5)],
                customer: CustomerRef {
                    id: "walk-in".into(),
                    name: "Walk-in".into(),
                    phone: None,
                },
                total: milk.price.multiply_quantity(5),
                payment_method: PaymentMethod::Paid,
                discount: None,
            })
            .await
            .unwrap();

        let mut sales = agent.sales().watch();
        let view = wait_for(&mut sales, |v| v.items.len() == 1).await;
        assert_eq!(view.items[0].id, sale.id);
        wait_for(&mut products, |v| {
            v.items.iter().any(|p| p.id == "3" && p.stock == milk.stock - 5)
        })
        .await;
        assert!(store.get(&format!("branches/main/sales/{}", sale.id)).await.unwrap().is_some());
        agent.shutdown().await;
    }

    #[tokio::test]
    async fn test_injected_store_outlives_an_agent() {
        let store: Arc<dyn RemoteStore> = Arc::new(MemoryStore::new());
        let mut config = SyncConfig::new();
        config.cache.backend = CacheBackend::Memory;

        let first = SyncAgent::from_config_with_store(config.clone(), Some(store.clone()))
            .await
            .unwrap();
        let scope = first.start().await.unwrap();
        let mut products = first.products().watch();
        wait_for(&mut products, |v| v.source == ViewSource::Remote && v.items.len() == 5).await;
        let added = first
            .products()
            .add(
                &scope,
                ProductDraft {
                    name: "Dates".into(),
                    category: "Fruits".into(),
                    price: rawnak_core::Money::from_cents(900),
                    purchase_price: rawnak_core::Money::from_cents(600),
                    stock: 12,
                    description: None,
                    low_stock_threshold: None,
                },
            )
            .await
            .unwrap();
        first.shutdown().await;
        drop(first);

        let second = SyncAgent::from_config_with_store(config, Some(store)).await.unwrap();
        second.start().await.unwrap();
        let mut products = second.products().watch();
        let view = wait_for(&mut products, |v| v.source == ViewSource::Remote && v.items.len() == 6).await;
        assert!(view.items.iter().any(|p| p.id == added.id && p.stock == 12));
        second.shutdown().await;
    }

    #[tokio::test]
    async fn test_offline_mode_accepts_no_store() {
        let agent = SyncAgent::from_config_with_store(SyncConfig::offline(), None)
            .await
            .unwrap();
        assert_eq!(agent.status().await.mode, StoreMode::Offline);
    }
}
