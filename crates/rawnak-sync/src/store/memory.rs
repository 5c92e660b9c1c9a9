//! # In-Memory Store
//!
//! A complete [`RemoteStore`] held in process memory. Used in offline demos
//! and as the authoritative store in tests.
//!
//! ## Change Feed
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  commit / try_commit                                                   │
//! │       │                                                                 │
//! │       │ 1. apply every write under the state lock                       │
//! │       │ 2. broadcast the changed paths                                  │
//! │       ▼                                                                 │
//! │  broadcast::Sender<Arc<Vec<String>>>                                   │
//! │       │                                                                 │
//! │       ├──► watcher task (branches/main/products)                       │
//! │       │      path under collection? → re-list → mpsc → Subscription     │
//! │       │                                                                 │
//! │       └──► watcher task (branches/main/data/categories)                │
//! │              path equal? → re-read → mpsc → Subscription                │
//! │                                                                         │
//! │  Lagged receivers resend a fresh snapshot; nothing is lost because     │
//! │  every snapshot is complete.                                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{broadcast, mpsc, Mutex};
use tracing::{debug, trace};

use super::{
    split_doc_path, CommitOutcome, Document, ReadSnapshot, RemoteStore, Subscription, WriteOp,
};
use crate::error::{StoreError, StoreResult};

/// Capacity of the change feed before watchers start lagging.
const CHANGE_FEED_CAPACITY: usize = 256;

/// Capacity of each subscription's snapshot queue.
const SUBSCRIPTION_CAPACITY: usize = 64;

#[derive(Debug, Default)]
struct State {
    docs: BTreeMap<String, Value>,
    /// Survives deletion so a delete-then-recreate still looks changed.
    versions: HashMap<String, u64>,
}

impl State {
    fn version(&self, path: &str) -> u64 {
        self.versions.get(path).copied().unwrap_or(0)
    }

    fn read(&self, path: &str) -> Option<Document> {
        let (_, id) = split_doc_path(path)?;
        self.docs.get(path).map(|data| Document {
            id: id.to_string(),
            data: data.clone(),
            version: self.version(path),
        })
    }

    fn list(&self, collection: &str) -> Vec<Document> {
        let prefix = format!("{}/", collection);
        self.docs
            .range(prefix.clone()..)
            .take_while(|(path, _)| path.starts_with(&prefix))
            .filter(|(path, _)| !path[prefix.len()..].contains('/'))
            .map(|(path, data)| Document {
                id: path[prefix.len()..].to_string(),
                data: data.clone(),
                version: self.version(path),
            })
            .collect()
    }

    /// Validates the whole batch first, then applies it.
    fn apply(&mut self, writes: Vec<WriteOp>) -> StoreResult<Vec<String>> {
        let mut staged: HashMap<String, Option<Value>> = HashMap::new();
        let mut order: Vec<String> = Vec::new();

        for write in writes {
            let path = write.path().to_string();
            if split_doc_path(&path).is_none() {
                return Err(StoreError::InvalidRequest(format!(
                    "not a document path: '{}'",
                    path
                )));
            }

            let current = match staged.get(&path) {
                Some(v) => v.clone(),
                None => self.docs.get(&path).cloned(),
            };

            let next = match write {
                WriteOp::Set { data, .. } => Some(data),
                WriteOp::Merge { data, .. } => Some(merge_fields(current, data)),
                WriteOp::Update { data, .. } => match current {
                    Some(existing) => Some(merge_fields(Some(existing), data)),
                    None => return Err(StoreError::not_found(path)),
                },
                WriteOp::Delete { .. } => None,
            };

            if !staged.contains_key(&path) {
                order.push(path.clone());
            }
            staged.insert(path, next);
        }

        for path in &order {
            match staged.remove(path).flatten() {
                Some(data) => {
                    self.docs.insert(path.clone(), data);
                }
                None => {
                    self.docs.remove(path);
                }
            }
            *self.versions.entry(path.clone()).or_insert(0) += 1;
        }

        Ok(order)
    }
}

/// Shallow merge of top-level object fields.
fn merge_fields(current: Option<Value>, patch: Value) -> Value {
    match (current, patch) {
        (Some(Value::Object(mut base)), Value::Object(fields)) => {
            for (k, v) in fields {
                base.insert(k, v);
            }
            Value::Object(base)
        }
        (_, patch) => patch,
    }
}

#[derive(Debug)]
struct Shared {
    state: Mutex<State>,
    changes: broadcast::Sender<Arc<Vec<String>>>,
    available: AtomicBool,
    forced_conflicts: AtomicU32,
}

/// In-process authoritative store. Cheap to clone; clones share state.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    shared: Arc<Shared>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_FEED_CAPACITY);
        MemoryStore {
            shared: Arc::new(Shared {
                state: Mutex::new(State::default()),
                changes,
                available: AtomicBool::new(true),
                forced_conflicts: AtomicU32::new(0),
            }),
        }
    }

    /// Simulates losing (or regaining) the connection. While unavailable
    /// every call fails with [`StoreError::Unavailable`].
    pub fn set_available(&self, available: bool) {
        self.shared.available.store(available, Ordering::SeqCst);
    }

    /// Makes the next `n` optimistic commits report a conflict.
    pub fn inject_conflicts(&self, n: u32) {
        self.shared.forced_conflicts.store(n, Ordering::SeqCst);
    }

    /// Number of stored documents.
    pub async fn len(&self) -> usize {
        self.shared.state.lock().await.docs.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn ensure_available(&self) -> StoreResult<()> {
        if self.shared.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Unavailable("memory store offline".into()))
        }
    }

    fn take_forced_conflict(&self) -> bool {
        self.shared
            .forced_conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn publish(&self, changed: Vec<String>) {
        if changed.is_empty() {
            return;
        }
        trace!(paths = ?changed, "Publishing store changes");
        // No receivers is fine: nobody is watching.
        let _ = self.shared.changes.send(Arc::new(changed));
    }

    /// Spawns the task feeding one subscription.
    ///
    /// The change receiver is created before the first read, so no commit
    /// can slip between the initial snapshot and the feed.
    fn spawn_watch<F, M>(&self, read: F, matches: M) -> Subscription
    where
        F: Fn(&State) -> Vec<Document> + Send + Sync + 'static,
        M: Fn(&str) -> bool + Send + Sync + 'static,
    {
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_CAPACITY);
        let mut changes = self.shared.changes.subscribe();
        let shared = self.shared.clone();

        let task = tokio::spawn(async move {
            let snapshot = read(&*shared.state.lock().await);
            if tx.send(Ok(snapshot)).await.is_err() {
                return;
            }

            loop {
                let relevant = match changes.recv().await {
                    Ok(paths) => paths.iter().any(|p| matches(p)),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!(skipped, "Watcher lagged, resending full snapshot");
                        true
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                };

                if !relevant {
                    continue;
                }

                let snapshot = read(&*shared.state.lock().await);
                if tx.send(Ok(snapshot)).await.is_err() {
                    break;
                }
            }
        });

        Subscription::new(rx, task)
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn get(&self, path: &str) -> StoreResult<Option<Document>> {
        self.ensure_available()?;
        Ok(self.shared.state.lock().await.read(path))
    }

    async fn list(&self, collection: &str) -> StoreResult<Vec<Document>> {
        self.ensure_available()?;
        Ok(self.shared.state.lock().await.list(collection))
    }

    async fn commit(&self, writes: Vec<WriteOp>) -> StoreResult<()> {
        self.ensure_available()?;
        let changed = self.shared.state.lock().await.apply(writes)?;
        self.publish(changed);
        Ok(())
    }

    async fn read_versions(&self, paths: &[String]) -> StoreResult<ReadSnapshot> {
        self.ensure_available()?;
        let state = self.shared.state.lock().await;
        let mut snapshot = ReadSnapshot::default();
        for path in paths {
            snapshot.insert(path.clone(), state.docs.get(path).cloned(), state.version(path));
        }
        Ok(snapshot)
    }

    async fn try_commit(
        &self,
        snapshot: &ReadSnapshot,
        writes: Vec<WriteOp>,
    ) -> StoreResult<CommitOutcome> {
        self.ensure_available()?;
        if self.take_forced_conflict() {
            return Ok(CommitOutcome::Conflict);
        }

        let changed = {
            let mut state = self.shared.state.lock().await;
            let stale = snapshot
                .versions()
                .any(|(path, version)| state.version(path) != version);
            if stale {
                return Ok(CommitOutcome::Conflict);
            }
            state.apply(writes)?
        };

        self.publish(changed);
        Ok(CommitOutcome::Committed)
    }

    async fn watch_collection(&self, collection: &str) -> StoreResult<Subscription> {
        self.ensure_available()?;
        let read_from = collection.to_string();
        let watched = collection.to_string();
        Ok(self.spawn_watch(
            move |state| state.list(&read_from),
            move |path| split_doc_path(path).map(|(c, _)| c == watched).unwrap_or(false),
        ))
    }

    async fn watch_document(&self, path: &str) -> StoreResult<Subscription> {
        self.ensure_available()?;
        let read_from = path.to_string();
        let watched = path.to_string();
        Ok(self.spawn_watch(
            move |state| state.read(&read_from).into_iter().collect(),
            move |changed| changed == watched,
        ))
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_set_get_list() {
        let store = MemoryStore::new();
        store.set("branches/main/products/1", json!({ "name": "Rice" })).await.unwrap();
        store.set("branches/main/products/2", json!({ "name": "Apples" })).await.unwrap();
        store.set("branches/b2/products/9", json!({ "name": "Other" })).await.unwrap();
        store.set("branches/main/products/2/notes/x", json!({})).await.unwrap();

        let doc = store.get("branches/main/products/1").await.unwrap().unwrap();
        assert_eq!(doc.id, "1");
        assert_eq!(doc.version, 1);

        let ids: Vec<String> = store
            .list("branches/main/products")
            .await
            .unwrap()
            .into_iter()
            .map(|d| d.id)
            .collect();
        assert_eq!(ids, vec!["1".to_string(), "2".to_string()]);
    }

    #[tokio::test]
    async fn test_update_requires_existing_and_batch_is_atomic() {
        let store = MemoryStore::new();
        store.set("branches/main/products/1", json!({ "stock": 5, "name": "Rice" })).await.unwrap();

        let err = store
            .commit(vec![
                WriteOp::update("branches/main/products/1", json!({ "stock": 4 })),
                WriteOp::update("branches/main/products/404", json!({ "stock": 1 })),
            ])
            .await
            .unwrap_err();
        assert_eq!(err, StoreError::not_found("branches/main/products/404"));

        let doc = store.get("branches/main/products/1").await.unwrap().unwrap();
        assert_eq!(doc.data, json!({ "stock": 5, "name": "Rice" }));
    }

    #[tokio::test]
    async fn test_merge_keeps_other_fields() {
        let store = MemoryStore::new();
        store.merge("branches/main", json!({ "name": "Main" })).await.unwrap();
        store.merge("branches/main", json!({ "contact": "0770" })).await.unwrap();

        let doc = store.get("branches/main").await.unwrap().unwrap();
        assert_eq!(doc.data, json!({ "name": "Main", "contact": "0770" }));
    }

    #[tokio::test]
    async fn test_try_commit_detects_stale_reads() {
        let store = MemoryStore::new();
        let path = "branches/main/products/1".to_string();
        store.set(&path, json!({ "stock": 8 })).await.unwrap();

        let snapshot = store.read_versions(&[path.clone()]).await.unwrap();
        store.update(&path, json!({ "stock": 7 })).await.unwrap();

        let outcome = store
            .try_commit(&snapshot, vec![WriteOp::update(path.clone(), json!({ "stock": 0 }))])
            .await
            .unwrap();
        assert_eq!(outcome, CommitOutcome::Conflict);
        assert_eq!(store.get(&path).await.unwrap().unwrap().data, json!({ "stock": 7 }));
    }

    #[tokio::test]
    async fn test_missing_doc_read_conflicts_with_creation() {
        let store = MemoryStore::new();
        let path = "branches/main/data/categories".to_string();

        let snapshot = store.read_versions(&[path.clone()]).await.unwrap();
        assert!(!snapshot.exists(&path));
        store.set(&path, json!({ "list": ["Dairy"] })).await.unwrap();

        let outcome = store
            .try_commit(&snapshot, vec![WriteOp::set(path.clone(), json!({ "list": [] }))])
            .await
            .unwrap();
        assert_eq!(outcome, CommitOutcome::Conflict);
    }

    #[tokio::test]
    async fn test_collection_watch_sees_initial_and_changes_only() {
        let store = MemoryStore::new();
        store.set("branches/main/sales/s1", json!({ "total": 100 })).await.unwrap();

        let mut sub = store.watch_collection("branches/main/sales").await.unwrap();
        let first = sub.next().await.unwrap().unwrap();
        assert_eq!(first.len(), 1);

        store.set("branches/b2/sales/x", json!({ "total": 1 })).await.unwrap();
        store.set("branches/main/sales/s2", json!({ "total": 200 })).await.unwrap();

        let second = sub.next().await.unwrap().unwrap();
        assert_eq!(second.len(), 2);
    }

    #[tokio::test]
    async fn test_document_watch_reports_absence() {
        let store = MemoryStore::new();
        let mut sub = store.watch_document("branches/main/data/settings").await.unwrap();
        assert!(sub.next().await.unwrap().unwrap().is_empty());

        store.set("branches/main/data/settings", json!({})).await.unwrap();
        assert_eq!(sub.next().await.unwrap().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unavailable_and_forced_conflicts() {
        let store = MemoryStore::new();
        store.set_available(false);
        assert!(matches!(
            store.get("branches/main").await,
            Err(StoreError::Unavailable(_))
        ));
        store.set_available(true);

        store.inject_conflicts(1);
        let snapshot = store.read_versions(&[]).await.unwrap();
        assert_eq!(
            store.try_commit(&snapshot, vec![]).await.unwrap(),
            CommitOutcome::Conflict
        );
        assert_eq!(
            store.try_commit(&snapshot, vec![]).await.unwrap(),
            CommitOutcome::Committed
        );
    }
}
