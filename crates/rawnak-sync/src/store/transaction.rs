//! # Atomic Updates
//!
//! Generic optimistic-retry driver over [`RemoteStore::read_versions`] and
//! [`RemoteStore::try_commit`].
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  attempt 1..=max_attempts                                              │
//! │     │                                                                   │
//! │     ├── read_versions(read set)          → ReadSnapshot                 │
//! │     ├── compute(&snapshot)               → Err: abort, nothing written  │
//! │     │                                    → Ok((writes, value))          │
//! │     └── try_commit(snapshot, writes)                                    │
//! │            Committed → return value                                     │
//! │            Conflict  → next attempt                                     │
//! │                                                                         │
//! │  attempts exhausted → SyncError::Contention                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! `compute` must be pure: it may run several times and only its last
//! successful result is committed.

use tracing::{debug, warn};

use super::{CommitOutcome, ReadSnapshot, RemoteStore, WriteOp};
use crate::error::{SyncError, SyncResult};

/// Read set plus retry budget of one atomic multi-document update.
#[derive(Debug, Clone)]
pub struct AtomicUpdate {
    reads: Vec<String>,
    max_attempts: u32,
}

impl AtomicUpdate {
    pub fn new(reads: Vec<String>) -> Self {
        AtomicUpdate {
            reads,
            max_attempts: 5,
        }
    }

    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn reads(&self) -> &[String] {
        &self.reads
    }

    /// Runs `compute` against fresh reads until a commit lands.
    pub async fn run<S, T, F>(&self, store: &S, mut compute: F) -> SyncResult<T>
    where
        S: RemoteStore + ?Sized,
        F: FnMut(&ReadSnapshot) -> SyncResult<(Vec<WriteOp>, T)> + Send,
        T: Send,
    {
        for attempt in 1..=self.max_attempts {
            let snapshot = store.read_versions(&self.reads).await?;
            let (writes, value) = compute(&snapshot)?;

            match store.try_commit(&snapshot, writes).await? {
                CommitOutcome::Committed => {
                    if attempt > 1 {
                        debug!(attempt, "Transaction committed after retry");
                    }
                    return Ok(value);
                }
                CommitOutcome::Conflict => {
                    debug!(attempt, reads = self.reads.len(), "Transaction conflict, retrying");
                }
            }
        }

        warn!(attempts = self.max_attempts, "Transaction retries exhausted");
        Err(SyncError::Contention {
            attempts: self.max_attempts,
        })
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use rawnak_core::{CoreError, ErrorKind};
    use serde_json::json;
    use std::sync::Arc;

    const COUNTER: &str = "branches/main/data/counter";

    fn increment(snapshot: &ReadSnapshot) -> SyncResult<(Vec<WriteOp>, i64)> {
        let current = snapshot
            .get(COUNTER)
            .and_then(|v| v.get("n"))
            .and_then(|n| n.as_i64())
            .unwrap_or(0);
        let next = current + 1;
        Ok((vec![WriteOp::set(COUNTER, json!({ "n": next }))], next))
    }

    #[tokio::test]
    async fn test_retries_through_conflicts() {
        let store = MemoryStore::new();
        store.inject_conflicts(2);

        let value = AtomicUpdate::new(vec![COUNTER.into()])
            .run(&store, increment)
            .await
            .unwrap();
        assert_eq!(value, 1);
    }

    #[tokio::test]
    async fn test_contention_after_max_attempts() {
        let store = MemoryStore::new();
        store.inject_conflicts(10);

        let err = AtomicUpdate::new(vec![COUNTER.into()])
            .max_attempts(3)
            .run(&store, increment)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert!(store.get(COUNTER).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_compute_error_writes_nothing() {
        let store = MemoryStore::new();
        let err = AtomicUpdate::new(vec![COUNTER.into()])
            .run(&store, |_: &ReadSnapshot| -> SyncResult<(Vec<WriteOp>, ())> {
                Err(CoreError::EmptyCart.into())
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert!(store.is_empty().await);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_increments_are_serialized() {
        let store = Arc::new(MemoryStore::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                AtomicUpdate::new(vec![COUNTER.into()])
                    .max_attempts(100)
                    .run(store.as_ref(), increment)
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let doc = store.get(COUNTER).await.unwrap().unwrap();
        assert_eq!(doc.data, json!({ "n": 8 }));
    }
}
