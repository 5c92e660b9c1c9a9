//! # Branch Registry
//!
//! Owns the branch list and the active branch.
//!
//! ## Active Branch
//! ```text
//! start()
//!   │  cached list (key "branches")         → published immediately
//!   │  persisted id (key "activeBranchId")  → restored
//!   │       absent / empty / not in list    → default branch
//!   ▼
//! /branches snapshots
//!   │  empty → create branches/main (create-if-absent)
//!   │  active id vanished → default branch
//!   │  (unless it is a just-added branch not yet in any snapshot)
//!   ▼
//! watch::Sender<BranchScope>  ──► SyncAgent re-scopes every component
//! ```
//!
//! Only the registry writes `activeBranchId`.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use rawnak_core::validation::validate_branch_name;
use rawnak_core::{seed, Branch, BranchPatch, BranchScope, CoreError, Role, DEFAULT_BRANCH_ID};
use rawnak_db::cache::{self, LocalCache, ACTIVE_BRANCH_KEY, BRANCHES_KEY};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::engine::{CollectionView, ViewSource};
use crate::error::SyncResult;
use crate::store::{self, branch_path, AtomicUpdate, RemoteStore, Subscription, WriteOp, BRANCHES};

pub struct BranchRegistry {
    store: Option<Arc<dyn RemoteStore>>,
    cache: Arc<dyn LocalCache>,
    max_attempts: u32,
    /// Used when nothing usable is persisted.
    startup_id: String,
    list: Arc<watch::Sender<CollectionView<Branch>>>,
    active: Arc<watch::Sender<BranchScope>>,
    /// Branches added here whose documents no snapshot has shown yet.
    pending: Arc<Mutex<HashSet<String>>>,
    pump: Mutex<Option<JoinHandle<()>>>,
    offline: Mutex<Vec<Branch>>,
}

impl BranchRegistry {
    pub fn new(store: Option<Arc<dyn RemoteStore>>, cache: Arc<dyn LocalCache>) -> Self {
        let (list, _) = watch::channel(CollectionView::default());
        let (active, _) = watch::channel(BranchScope::default_branch());
        BranchRegistry {
            store,
            cache,
            max_attempts: 5,
            startup_id: DEFAULT_BRANCH_ID.to_string(),
            list: Arc::new(list),
            active: Arc::new(active),
            pending: Arc::new(Mutex::new(HashSet::new())),
            pump: Mutex::new(None),
            offline: Mutex::new(vec![seed::default_branch()]),
        }
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// Branch selected at start when no active id is persisted.
    pub fn with_startup_branch(mut self, branch_id: impl Into<String>) -> Self {
        self.startup_id = branch_id.into();
        self
    }

    pub fn branches(&self) -> Vec<Branch> {
        self.list.borrow().items.clone()
    }

    pub fn watch_branches(&self) -> watch::Receiver<CollectionView<Branch>> {
        self.list.subscribe()
    }

    pub fn active(&self) -> BranchScope {
        self.active.borrow().clone()
    }

    pub fn watch_active(&self) -> watch::Receiver<BranchScope> {
        self.active.subscribe()
    }

    /// The active branch document, once it is in the list.
    pub fn active_branch(&self) -> Option<Branch> {
        let active = self.active();
        self.branches()
            .into_iter()
            .find(|b| b.id == active.branch_id())
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Publishes the cached list, starts watching `/branches` and restores
    /// the active branch.
    pub async fn start(&self) -> SyncResult<BranchScope> {
        let mut pump = self.pump.lock().await;
        if let Some(previous) = pump.take() {
            previous.abort();
            let _ = previous.await;
        }

        let cached: Vec<Branch> = cache::read_json(self.cache.as_ref(), BRANCHES_KEY)
            .await
            .unwrap_or_default();
        self.list.send_replace(CollectionView {
            generation: 0,
            branch_id: None,
            source: ViewSource::Cache,
            items: sorted(cached),
        });

        match &self.store {
            None => {
                let items = self.offline.lock().await.clone();
                self.publish(ViewSource::Seed, items);
            }
            Some(store) => match store.watch_collection(BRANCHES).await {
                Ok(subscription) => {
                    let task = BranchPump {
                        store: store.clone(),
                        cache: self.cache.clone(),
                        list: self.list.clone(),
                        active: self.active.clone(),
                        pending: self.pending.clone(),
                        max_attempts: self.max_attempts,
                    };
                    *pump = Some(tokio::spawn(task.run(subscription)));
                }
                Err(e) => {
                    warn!(error = %e, "Branch subscription failed, keeping cached list");
                }
            },
        }
        drop(pump);

        let scope = self.restore_active().await;
        info!(branch_id = %scope, "Branch registry started");
        Ok(scope)
    }

    pub async fn stop(&self) {
        if let Some(pump) = self.pump.lock().await.take() {
            pump.abort();
            let _ = pump.await;
        }
    }

    async fn restore_active(&self) -> BranchScope {
        let persisted = match self.cache.get_raw(ACTIVE_BRANCH_KEY).await {
            Ok(value) => value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty()),
            Err(e) => {
                warn!(error = %e, "Active branch unreadable, using default");
                None
            }
        };

        let candidate = persisted.unwrap_or_else(|| self.startup_id.clone());
        let known = self.branches();
        let id = if known.is_empty() || known.iter().any(|b| b.id == candidate) {
            candidate
        } else {
            debug!(branch_id = %candidate, "Persisted branch unknown, using default");
            DEFAULT_BRANCH_ID.to_string()
        };

        let scope = BranchScope::new(id);
        self.set_active(scope.clone()).await;
        scope
    }

    // =========================================================================
    // Operations
    // =========================================================================

    /// Makes `branch_id` the active branch.
    ///
    /// ## Errors
    /// `BranchNotFound` when the authoritative list does not contain it.
    pub async fn switch(&self, branch_id: &str) -> SyncResult<BranchScope> {
        let branch_id = branch_id.trim();
        if self.is_known(branch_id) == Some(false) {
            return Err(CoreError::BranchNotFound(branch_id.to_string()).into());
        }

        let scope = BranchScope::new(branch_id);
        self.set_active(scope.clone()).await;
        info!(branch_id = %scope, "Switched branch");
        Ok(scope)
    }

    /// Creates a branch and switches to it.
    pub async fn add(&self, name: &str) -> SyncResult<Branch> {
        let name = validate_branch_name(name)?;

        let branch = match &self.store {
            Some(store) => {
                let branch = Branch {
                    id: Uuid::new_v4().to_string(),
                    name,
                    contact: String::new(),
                };
                let path = branch_path(&branch.id);
                let data = store::encode(&path, &branch)?;
                // Marked before the commit: every later snapshot contains it.
                self.pending.lock().await.insert(branch.id.clone());
                if let Err(e) = store.set(&path, data).await {
                    self.pending.lock().await.remove(&branch.id);
                    return Err(e.into());
                }
                branch
            }
            None => {
                let branch = Branch {
                    id: format!("local-{}", Utc::now().timestamp_millis()),
                    name,
                    contact: String::new(),
                };
                let items = {
                    let mut offline = self.offline.lock().await;
                    offline.push(branch.clone());
                    offline.clone()
                };
                self.publish(ViewSource::Local, items);
                branch
            }
        };

        self.set_active(BranchScope::new(branch.id.clone())).await;
        info!(branch_id = %branch.id, name = %branch.name, "Branch added");
        Ok(branch)
    }

    /// Merges name and contact into the active branch.
    pub async fn update_active_info(&self, patch: BranchPatch) -> SyncResult<()> {
        let mut patch = patch;
        if let Some(name) = &patch.name {
            patch.name = Some(validate_branch_name(name)?);
        }
        if patch.is_empty() {
            return Ok(());
        }

        let active = self.active();
        match &self.store {
            Some(store) => {
                store
                    .merge(&branch_path(active.branch_id()), serde_json::to_value(&patch)?)
                    .await?;
            }
            None => {
                let items = {
                    let mut offline = self.offline.lock().await;
                    let branch = offline
                        .iter_mut()
                        .find(|b| b.id == active.branch_id())
                        .ok_or_else(|| CoreError::BranchNotFound(active.branch_id().to_string()))?;
                    patch.apply(branch);
                    offline.clone()
                };
                self.publish(ViewSource::Local, items);
            }
        }

        info!(branch_id = %active, "Branch info updated");
        Ok(())
    }

    /// Deletes a branch document. Returns the active scope afterwards.
    ///
    /// ## Errors
    /// - `PermissionDenied` unless `role` is Admin
    /// - `DefaultBranchProtected` for the default branch
    /// - `BranchNotFound` when the authoritative list does not contain it
    pub async fn delete(&self, branch_id: &str, role: Role) -> SyncResult<BranchScope> {
        if !role.is_admin() {
            return Err(CoreError::PermissionDenied {
                action: "delete branch".to_string(),
            }
            .into());
        }
        if branch_id == DEFAULT_BRANCH_ID {
            return Err(CoreError::DefaultBranchProtected(branch_id.to_string()).into());
        }
        if self.is_known(branch_id) == Some(false) {
            return Err(CoreError::BranchNotFound(branch_id.to_string()).into());
        }

        match &self.store {
            Some(store) => {
                store.delete(&branch_path(branch_id)).await?;
                self.pending.lock().await.remove(branch_id);
            }
            None => {
                let items = {
                    let mut offline = self.offline.lock().await;
                    offline.retain(|b| b.id != branch_id);
                    offline.clone()
                };
                self.publish(ViewSource::Local, items);
            }
        }
        info!(branch_id, "Branch deleted");

        if self.active().branch_id() == branch_id {
            self.set_active(BranchScope::default_branch()).await;
            info!(branch_id = DEFAULT_BRANCH_ID, "Deleted branch was active, falling back");
        }
        Ok(self.active())
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    /// `None` while only the cached list is known.
    fn is_known(&self, branch_id: &str) -> Option<bool> {
        let view = self.list.borrow();
        view.is_final()
            .then(|| view.items.iter().any(|b| b.id == branch_id))
    }

    async fn set_active(&self, scope: BranchScope) {
        persist_active(self.cache.as_ref(), &scope).await;
        self.active.send_if_modified(|current| {
            if *current == scope {
                return false;
            }
            *current = scope;
            true
        });
    }

    fn publish(&self, source: ViewSource, items: Vec<Branch>) {
        let items = sorted(items);
        self.list.send_modify(|view| {
            view.source = source;
            view.items = items;
        });
    }
}

/// Default branch first, then by name.
fn sorted(mut branches: Vec<Branch>) -> Vec<Branch> {
    branches.sort_by(|a, b| {
        b.is_default()
            .cmp(&a.is_default())
            .then_with(|| a.name.cmp(&b.name))
    });
    branches
}

async fn persist_active(cache: &dyn LocalCache, scope: &BranchScope) {
    if let Err(e) = cache.put_raw(ACTIVE_BRANCH_KEY, scope.branch_id()).await {
        warn!(branch_id = %scope, error = %e, "Failed to persist active branch");
    }
}

// =============================================================================
// Pump
// =============================================================================

struct BranchPump {
    store: Arc<dyn RemoteStore>,
    cache: Arc<dyn LocalCache>,
    list: Arc<watch::Sender<CollectionView<Branch>>>,
    active: Arc<watch::Sender<BranchScope>>,
    pending: Arc<Mutex<HashSet<String>>>,
    max_attempts: u32,
}

impl BranchPump {
    async fn run(self, mut subscription: Subscription) {
        let mut create_attempted = false;

        while let Some(next) = subscription.next().await {
            let docs = match next {
                Ok(docs) => docs,
                Err(e) => {
                    warn!(error = %e, "Branch snapshot error, keeping last list");
                    continue;
                }
            };

            let branches: Vec<Branch> = docs
                .iter()
                .filter_map(|doc| match store::decode::<Branch>(doc) {
                    Ok(branch) => Some(branch),
                    Err(e) => {
                        warn!(id = %doc.id, error = %e, "Skipping undecodable branch");
                        None
                    }
                })
                .collect();

            if branches.is_empty() && !create_attempted {
                create_attempted = true;
                match create_default_branch(self.store.as_ref(), self.max_attempts).await {
                    Ok(true) => continue,
                    Ok(false) => {}
                    Err(e) => warn!(error = %e, "Creating default branch failed"),
                }
            }

            let branches = sorted(branches);
            if let Err(e) = cache::write_json(self.cache.as_ref(), BRANCHES_KEY, &branches).await {
                warn!(error = %e, "Branch cache write-through failed");
            }

            let active_id = self.active.borrow().branch_id().to_string();
            let active_known = branches.is_empty() || branches.iter().any(|b| b.id == active_id);
            let awaiting = self.settle_pending(&branches, &active_id).await;

            debug!(count = branches.len(), "Published branch list");
            self.list.send_modify(|view| {
                view.source = ViewSource::Remote;
                view.items = branches;
            });

            if !active_known && !awaiting {
                self.fall_back_from(&active_id).await;
            }
        }
    }

    /// Drops pending ids the snapshot contains. Returns whether the active
    /// branch is still pending, i.e. older than this snapshot can show.
    async fn settle_pending(&self, branches: &[Branch], active_id: &str) -> bool {
        let mut pending = self.pending.lock().await;
        pending.retain(|id| !branches.iter().any(|b| &b.id == id));
        pending.contains(active_id)
    }

    /// Switches to the default branch if `active_id` is still active.
    async fn fall_back_from(&self, active_id: &str) {
        let fallback = BranchScope::default_branch();
        persist_active(self.cache.as_ref(), &fallback).await;
        let replaced = self.active.send_if_modified(|current| {
            if current.branch_id() != active_id {
                return false;
            }
            *current = fallback.clone();
            true
        });

        if replaced {
            warn!(branch_id = %active_id, "Active branch no longer exists, falling back");
        } else {
            // An explicit switch won.
            let current = self.active.borrow().clone();
            persist_active(self.cache.as_ref(), &current).await;
        }
    }
}

async fn create_default_branch(store: &dyn RemoteStore, max_attempts: u32) -> SyncResult<bool> {
    let branch = seed::default_branch();
    let path = branch_path(&branch.id);
    let data = store::encode(&path, &branch)?;

    let created = AtomicUpdate::new(vec![path.clone()])
        .max_attempts(max_attempts)
        .run(store, |snapshot| {
            if snapshot.exists(&path) {
                Ok((Vec::new(), false))
            } else {
                Ok((vec![WriteOp::set(path.clone(), data.clone())], true))
            }
        })
        .await?;

    if created {
        info!(branch_id = %branch.id, "Created default branch");
    }
    Ok(created)
}

// =============================================================================
// Unit Tests
// =============================================================================
