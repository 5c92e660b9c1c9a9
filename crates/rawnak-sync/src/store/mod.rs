//! # Remote Store Adapter
//!
//! Abstracts the document-oriented authoritative store.
//!
//! ## Capabilities
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        RemoteStore Surface                              │
//! │                                                                         │
//! │  READ                  get(path), list(collection)                      │
//! │  WRITE                 commit(batch)      all-or-nothing WriteOp list   │
//! │  TRANSACTION           read_versions(paths) → ReadSnapshot              │
//! │                        try_commit(snapshot, writes)                     │
//! │                          Committed | Conflict (a read doc changed)      │
//! │  SUBSCRIBE             watch_collection / watch_document                │
//! │                          full snapshot now, then on every change        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Document Layout
//! ```text
//! branches/{id}
//! branches/{id}/products/{productId}
//! branches/{id}/customers/{customerId}
//! branches/{id}/sales/{saleId}
//! branches/{id}/data/categories      { list: [..] }
//! branches/{id}/data/settings        { notificationSettings, invoiceSettings }
//! ```
//!
//! Document bodies never contain their own `id`: [`encode`] strips it and
//! [`decode`] puts it back from the path.

pub mod memory;
pub mod transaction;

use std::collections::HashMap;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::{StoreError, StoreResult};

pub use memory::MemoryStore;
pub use transaction::AtomicUpdate;

// =============================================================================
// Paths
// =============================================================================

/// Collection holding every branch document.
pub const BRANCHES: &str = "branches";

/// `branches/{branch}/{kind}`
pub fn collection_path(branch_id: &str, kind: &str) -> String {
    format!("{}/{}/{}", BRANCHES, branch_id, kind)
}

/// `{collection}/{id}`
pub fn doc_path(collection: &str, id: &str) -> String {
    format!("{}/{}", collection, id)
}

/// `branches/{branch}`
pub fn branch_path(branch_id: &str) -> String {
    doc_path(BRANCHES, branch_id)
}

/// `branches/{branch}/data/categories`
pub fn categories_path(branch_id: &str) -> String {
    doc_path(&collection_path(branch_id, "data"), "categories")
}

/// `branches/{branch}/data/settings`
pub fn settings_path(branch_id: &str) -> String {
    doc_path(&collection_path(branch_id, "data"), "settings")
}

/// Splits a document path into `(collection, id)`.
pub fn split_doc_path(path: &str) -> Option<(&str, &str)> {
    path.rsplit_once('/')
        .filter(|(collection, id)| !collection.is_empty() && !id.is_empty())
}

// =============================================================================
// Documents
// =============================================================================

/// One stored document.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub data: Value,
    /// Bumped on every write. Missing documents read as version 0.
    pub version: u64,
}

/// Serializes `value` into a document body, dropping its `id` field.
pub fn encode<T: Serialize + ?Sized>(path: &str, value: &T) -> StoreResult<Value> {
    let mut data = serde_json::to_value(value).map_err(|e| StoreError::serialization(path, e))?;
    if let Value::Object(map) = &mut data {
        map.remove("id");
    }
    Ok(data)
}

/// Deserializes a document, restoring `id` from the document id.
pub fn decode<T: DeserializeOwned>(doc: &Document) -> StoreResult<T> {
    decode_value(&doc.id, doc.data.clone())
}

/// Same as [`decode`] for a bare body.
pub fn decode_value<T: DeserializeOwned>(id: &str, mut data: Value) -> StoreResult<T> {
    if let Value::Object(map) = &mut data {
        map.insert("id".to_string(), Value::String(id.to_string()));
    }
    serde_json::from_value(data).map_err(|e| StoreError::serialization(id, e))
}

// =============================================================================
// Writes
// =============================================================================

/// One write inside a batch or transaction.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    /// Create or replace.
    Set { path: String, data: Value },
    /// Create, or shallow-merge top-level fields into the existing body.
    Merge { path: String, data: Value },
    /// Shallow-merge top-level fields. Fails with `NotFound` if absent.
    Update { path: String, data: Value },
    Delete { path: String },
}

impl WriteOp {
    pub fn set(path: impl Into<String>, data: Value) -> Self {
        WriteOp::Set {
            path: path.into(),
            data,
        }
    }

    pub fn merge(path: impl Into<String>, data: Value) -> Self {
        WriteOp::Merge {
            path: path.into(),
            data,
        }
    }

    pub fn update(path: impl Into<String>, data: Value) -> Self {
        WriteOp::Update {
            path: path.into(),
            data,
        }
    }

    pub fn delete(path: impl Into<String>) -> Self {
        WriteOp::Delete { path: path.into() }
    }

    pub fn path(&self) -> &str {
        match self {
            WriteOp::Set { path, .. }
            | WriteOp::Merge { path, .. }
            | WriteOp::Update { path, .. }
            | WriteOp::Delete { path } => path,
        }
    }
}

// =============================================================================
// Transactions
// =============================================================================

/// Documents read at the start of a transaction attempt, with the versions
/// the commit is conditioned on.
#[derive(Debug, Clone, Default)]
pub struct ReadSnapshot {
    entries: HashMap<String, (Option<Value>, u64)>,
}

impl ReadSnapshot {
    pub fn insert(&mut self, path: impl Into<String>, data: Option<Value>, version: u64) {
        self.entries.insert(path.into(), (data, version));
    }

    /// Body read at `path`. `None` when the document did not exist.
    pub fn get(&self, path: &str) -> Option<&Value> {
        self.entries.get(path).and_then(|(data, _)| data.as_ref())
    }

    pub fn exists(&self, path: &str) -> bool {
        self.get(path).is_some()
    }

    /// Decodes the document at `path`.
    pub fn decode<T: DeserializeOwned>(&self, path: &str) -> StoreResult<Option<T>> {
        let Some(data) = self.get(path) else {
            return Ok(None);
        };
        let id = split_doc_path(path).map(|(_, id)| id).unwrap_or(path);
        decode_value(id, data.clone()).map(Some)
    }

    /// `(path, version)` for every read, the commit precondition.
    pub fn versions(&self) -> impl Iterator<Item = (&str, u64)> {
        self.entries.iter().map(|(path, (_, v))| (path.as_str(), *v))
    }
}

/// Result of an optimistic commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    Committed,
    /// A document in the read set changed since it was read. Nothing was
    /// written.
    Conflict,
}

// =============================================================================
// Subscriptions
// =============================================================================

/// A live stream of full snapshots.
///
/// Collection watches yield every document of the collection; document
/// watches yield zero or one document. Dropping the subscription stops the
/// feeding task.
#[derive(Debug)]
pub struct Subscription {
    rx: mpsc::Receiver<StoreResult<Vec<Document>>>,
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    pub fn new(rx: mpsc::Receiver<StoreResult<Vec<Document>>>, task: JoinHandle<()>) -> Self {
        Subscription {
            rx,
            task: Some(task),
        }
    }

    /// Next snapshot, or `None` once the store side has closed.
    pub async fn next(&mut self) -> Option<StoreResult<Vec<Document>>> {
        self.rx.recv().await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

// =============================================================================
// Trait
// =============================================================================

/// The authoritative store.
#[async_trait]
pub trait RemoteStore: Send + Sync + 'static {
    async fn get(&self, path: &str) -> StoreResult<Option<Document>>;

    /// Every document directly inside `collection`, ordered by id.
    async fn list(&self, collection: &str) -> StoreResult<Vec<Document>>;

    /// Applies all writes or none.
    async fn commit(&self, writes: Vec<WriteOp>) -> StoreResult<()>;

    /// Reads `paths` and records their versions.
    async fn read_versions(&self, paths: &[String]) -> StoreResult<ReadSnapshot>;

    /// Applies `writes` only if nothing in `snapshot` changed.
    async fn try_commit(
        &self,
        snapshot: &ReadSnapshot,
        writes: Vec<WriteOp>,
    ) -> StoreResult<CommitOutcome>;

    async fn watch_collection(&self, collection: &str) -> StoreResult<Subscription>;

    async fn watch_document(&self, path: &str) -> StoreResult<Subscription>;

    // =========================================================================
    // Single-document helpers
    // =========================================================================

    async fn set(&self, path: &str, data: Value) -> StoreResult<()> {
        self.commit(vec![WriteOp::set(path, data)]).await
    }

    async fn merge(&self, path: &str, data: Value) -> StoreResult<()> {
        self.commit(vec![WriteOp::merge(path, data)]).await
    }

    async fn update(&self, path: &str, data: Value) -> StoreResult<()> {
        self.commit(vec![WriteOp::update(path, data)]).await
    }

    async fn delete(&self, path: &str) -> StoreResult<()> {
        self.commit(vec![WriteOp::delete(path)]).await
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
