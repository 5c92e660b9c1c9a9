//! # Scoped Views
//!
//! Subscription machinery shared by [`EntitySync`](crate::engine::EntitySync)
//! and [`DocumentSync`](crate::document::DocumentSync): one watch channel,
//! a generation counter, the subscribed scope and its snapshot pump.
//!
//! ```text
//! begin(scope) ── lock active ── stop old pump ── generation += 1
//!      │                                            publish cache {Cache}
//!      ▼
//! Rescope ── finish_offline(payload)              publish {Seed}
//!         └─ finish(subscription, handler) ─────► spawn run_pump
//!
//! run_pump:  snapshot ─► handler.resolve ─► cache ─► publish {Remote}
//!                           None = skip          iff generation unchanged
//! ```
//!
//! The generation check and the publish run under the watch channel's
//! lock, so once `begin` has bumped the generation no snapshot of the
//! previous scope reaches the view.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use rawnak_core::BranchScope;
use rawnak_db::cache::{self, LocalCache};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::{watch, Mutex, MutexGuard};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::engine::ViewSource;
use crate::error::StoreResult;
use crate::store::{Document, Subscription};

// =============================================================================
// Traits
// =============================================================================

/// A published view stamped with its generation, branch and source.
pub(crate) trait ScopedView: Default + Clone + Send + Sync + 'static {
    /// What the cache holds and the view carries.
    type Payload: Serialize + DeserializeOwned + Default + Send + Sync + 'static;

    fn stamped(generation: u64, scope: &BranchScope, source: ViewSource, payload: Self::Payload) -> Self;

    fn generation(&self) -> u64;

    fn replace(&mut self, source: ViewSource, payload: Self::Payload);
}

/// Turns one remote snapshot into a payload.
#[async_trait]
pub(crate) trait SnapshotHandler: Send + 'static {
    type Payload: Send;

    /// `None` skips the snapshot; a write made here produces the next one.
    async fn resolve(&mut self, docs: Vec<Document>) -> Option<Self::Payload>;
}

// =============================================================================
// Channel
// =============================================================================

struct ActiveSubscription {
    scope: BranchScope,
    pump: Option<JoinHandle<()>>,
}

pub(crate) struct ScopedChannel<V: ScopedView> {
    /// Entity kind or document name, also the cache key prefix.
    label: &'static str,
    cache: Arc<dyn LocalCache>,
    view: Arc<watch::Sender<V>>,
    generation: AtomicU64,
    active: Mutex<Option<ActiveSubscription>>,
}

impl<V: ScopedView> ScopedChannel<V> {
    pub(crate) fn new(label: &'static str, cache: Arc<dyn LocalCache>) -> Self {
        let (view, _) = watch::channel(V::default());
        ScopedChannel {
            label,
            cache,
            view: Arc::new(view),
            generation: AtomicU64::new(0),
            active: Mutex::new(None),
        }
    }

    pub(crate) fn cache(&self) -> &dyn LocalCache {
        self.cache.as_ref()
    }

    pub(crate) fn watch(&self) -> watch::Receiver<V> {
        self.view.subscribe()
    }

    pub(crate) fn current(&self) -> V {
        self.view.borrow().clone()
    }

    pub(crate) fn borrow(&self) -> watch::Ref<'_, V> {
        self.view.borrow()
    }

    pub(crate) async fn scope(&self) -> Option<BranchScope> {
        self.active.lock().await.as_ref().map(|a| a.scope.clone())
    }

    /// Stops the previous subscription and publishes the cached payload of
    /// `scope`. The subscription is completed through the returned
    /// [`Rescope`].
    pub(crate) async fn begin(&self, scope: &BranchScope) -> Rescope<'_, V> {
        let mut active = self.active.lock().await;
        if let Some(previous) = active.take() {
            stop_pump(previous, self.label).await;
        }

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let key = cache::collection_key(self.label, scope.branch_id());
        let cached: V::Payload = cache::read_json(self.cache.as_ref(), &key)
            .await
            .unwrap_or_default();
        debug!(kind = self.label, branch_id = %scope, generation, "Publishing cached view");
        self.view
            .send_replace(V::stamped(generation, scope, ViewSource::Cache, cached));

        Rescope {
            channel: self,
            active,
            scope: scope.clone(),
            generation,
            key,
        }
    }

    /// Stops delivery. The last view stays readable.
    pub(crate) async fn stop(&self) {
        let mut active = self.active.lock().await;
        self.generation.fetch_add(1, Ordering::SeqCst);
        if let Some(previous) = active.take() {
            stop_pump(previous, self.label).await;
            debug!(kind = self.label, "Unsubscribed");
        }
    }

    /// Publishes an offline edit if `scope` is the subscribed branch.
    pub(crate) async fn publish_local(&self, scope: &BranchScope, payload: V::Payload) {
        let active = self.active.lock().await;
        if active.as_ref().map(|a| &a.scope) != Some(scope) {
            return;
        }
        self.view
            .send_modify(|view| view.replace(ViewSource::Local, payload));
    }
}

// =============================================================================
// Rescope
// =============================================================================

/// A subscription between its cached publish and its source.
///
/// Holds the channel's subscription lock until finished.
pub(crate) struct Rescope<'a, V: ScopedView> {
    channel: &'a ScopedChannel<V>,
    active: MutexGuard<'a, Option<ActiveSubscription>>,
    scope: BranchScope,
    generation: u64,
    key: String,
}

impl<'a, V: ScopedView> Rescope<'a, V> {
    /// Completes the subscription with a local payload (no remote store).
    pub(crate) fn finish_offline(mut self, payload: V::Payload) {
        self.channel.view.send_replace(V::stamped(
            self.generation,
            &self.scope,
            ViewSource::Seed,
            payload,
        ));
        *self.active = Some(ActiveSubscription {
            scope: self.scope,
            pump: None,
        });
    }

    /// Completes the subscription by pumping `subscription` through
    /// `handler`. A failed subscription keeps the cached view.
    pub(crate) fn finish<H>(mut self, subscription: StoreResult<Subscription>, handler: H)
    where
        H: SnapshotHandler<Payload = V::Payload>,
    {
        let label = self.channel.label;
        let pump = match subscription {
            Ok(subscription) => {
                let pump = Pump {
                    label,
                    cache: self.channel.cache.clone(),
                    view: self.channel.view.clone(),
                    scope: self.scope.clone(),
                    generation: self.generation,
                    key: self.key,
                };
                Some(tokio::spawn(pump.run(subscription, handler)))
            }
            Err(e) => {
                warn!(kind = label, branch_id = %self.scope, error = %e, "Subscribe failed, keeping cached view");
                None
            }
        };

        info!(kind = label, branch_id = %self.scope, generation = self.generation, "Subscribed");
        *self.active = Some(ActiveSubscription {
            scope: self.scope,
            pump,
        });
    }
}

async fn stop_pump(previous: ActiveSubscription, label: &str) {
    if let Some(pump) = previous.pump {
        pump.abort();
        if let Err(e) = pump.await {
            if e.is_panic() {
                error!(kind = label, branch_id = %previous.scope, "Snapshot pump panicked");
            }
        }
    }
}

// =============================================================================
// Pump
// =============================================================================

/// Background task moving remote snapshots into the cache and the view.
struct Pump<V: ScopedView> {
    label: &'static str,
    cache: Arc<dyn LocalCache>,
    view: Arc<watch::Sender<V>>,
    scope: BranchScope,
    generation: u64,
    key: String,
}

impl<V: ScopedView> Pump<V> {
    async fn run<H>(self, mut subscription: Subscription, mut handler: H)
    where
        H: SnapshotHandler<Payload = V::Payload>,
    {
        while let Some(next) = subscription.next().await {
            let docs = match next {
                Ok(docs) => docs,
                Err(e) => {
                    warn!(kind = self.label, branch_id = %self.scope, error = %e, "Snapshot error, keeping last view");
                    continue;
                }
            };

            let Some(payload) = handler.resolve(docs).await else {
                continue;
            };

            if let Err(e) = cache::write_json(self.cache.as_ref(), &self.key, &payload).await {
                warn!(kind = self.label, key = %self.key, error = %e, "Cache write-through failed");
            }

            let published = self.view.send_if_modified(|view| {
                if view.generation() != self.generation {
                    return false;
                }
                view.replace(ViewSource::Remote, payload);
                true
            });

            if !published {
                debug!(kind = self.label, branch_id = %self.scope, "Pump superseded, stopping");
                break;
            }
            debug!(kind = self.label, branch_id = %self.scope, "Published remote snapshot");
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::testing::wait_for;
    use rawnak_db::MemoryCache;
    use serde_json::json;
    use tokio::sync::mpsc;

    #[derive(Debug, Clone, Default)]
    struct CountView {
        generation: u64,
        branch_id: Option<String>,
        source: ViewSource,
        count: usize,
    }

    impl ScopedView for CountView {
        type Payload = usize;

        fn stamped(generation: u64, scope: &BranchScope, source: ViewSource, count: usize) -> Self {
            CountView {
                generation,
                branch_id: Some(scope.branch_id().to_string()),
                source,
                count,
            }
        }

        fn generation(&self) -> u64 {
            self.generation
        }

        fn replace(&mut self, source: ViewSource, count: usize) {
            self.source = source;
            self.count = count;
        }
    }

    /// Counts documents; empty snapshots are skipped.
    struct Counting;

    #[async_trait]
    impl SnapshotHandler for Counting {
        type Payload = usize;

        async fn resolve(&mut self, docs: Vec<Document>) -> Option<usize> {
            (!docs.is_empty()).then_some(docs.len())
        }
    }

    fn feed() -> (mpsc::Sender<StoreResult<Vec<Document>>>, Subscription) {
        let (tx, rx) = mpsc::channel(8);
        (tx, Subscription::new(rx, tokio::spawn(async {})))
    }

    fn docs(n: usize) -> Vec<Document> {
        (0..n)
            .map(|i| Document {
                id: i.to_string(),
                data: json!({}),
                version: 1,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_rescope_stops_the_old_pump() {
        let cache = Arc::new(MemoryCache::new());
        let channel: ScopedChannel<CountView> = ScopedChannel::new("counts", cache.clone());
        let mut rx = channel.watch();
        let (a, b) = (BranchScope::new("a"), BranchScope::new("b"));

        let (tx_a, sub_a) = feed();
        channel.begin(&a).await.finish(Ok(sub_a), Counting);
        tx_a.send(Ok(Vec::new())).await.unwrap();
        tx_a.send(Ok(docs(2))).await.unwrap();
        let view = wait_for(&mut rx, |v| v.source == ViewSource::Remote).await;
        assert_eq!(view.count, 2);

        let (tx_b, sub_b) = feed();
        channel.begin(&b).await.finish(Ok(sub_b), Counting);
        let _ = tx_a.send(Ok(docs(5))).await;
        tx_b.send(Ok(docs(1))).await.unwrap();
        let view = wait_for(&mut rx, |v| v.branch_id.as_deref() == Some("b") && v.source == ViewSource::Remote).await;
        assert_eq!(view.count, 1);

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(channel.current().count, 1);
        assert_eq!(cache::read_json::<usize, _>(cache.as_ref(), "counts_a").await, Some(2));
        assert_eq!(cache::read_json::<usize, _>(cache.as_ref(), "counts_b").await, Some(1));
    }

    #[tokio::test]
    async fn test_local_publish_only_reaches_the_subscribed_scope() {
        let channel: ScopedChannel<CountView> =
            ScopedChannel::new("counts", Arc::new(MemoryCache::new()));
        let b = BranchScope::new("b");
        channel.begin(&b).await.finish_offline(3);
        assert_eq!(channel.current().source, ViewSource::Seed);

        channel.publish_local(&BranchScope::new("a"), 9).await;
        assert_eq!(channel.current().count, 3);

        channel.publish_local(&b, 7).await;
        let view = channel.current();
        assert_eq!((view.source, view.count), (ViewSource::Local, 7));
    }

    #[tokio::test]
    async fn test_failed_subscription_keeps_cached_payload() {
        let cache = Arc::new(MemoryCache::new());
        cache::write_json(cache.as_ref(), "counts_c", &4usize).await.unwrap();
        let channel: ScopedChannel<CountView> = ScopedChannel::new("counts", cache);

        let c = BranchScope::new("c");
        channel
            .begin(&c)
            .await
            .finish(Err(StoreError::Unavailable("down".into())), Counting);
        let view = channel.current();
        assert_eq!((view.source, view.count), (ViewSource::Cache, 4));
        assert_eq!(channel.scope().await, Some(c));

        channel.stop().await;
        assert_eq!(channel.scope().await, None);
        assert_eq!(channel.current().count, 4);
    }
}
