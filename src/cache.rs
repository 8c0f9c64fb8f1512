//! Location-keyed aggregation cache
//!
//! Holds finished bundles for a TTL and makes sure only one build runs per
//! key at a time. The first caller for a key spawns the build as its own
//! task and registers a broadcast channel; every concurrent caller for the
//! same key subscribes to that channel instead of starting another build.
//! Because the build is a separate task, a caller that goes away does not
//! cancel it.
//!
//! Expired entries are kept for a grace period so a failed rebuild can fall
//! back to the last good bundle. Bundles missing an upstream are cached only
//! when that upstream failed for a non-transient reason (missing key,
//! rejected request).

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, broadcast};
use tokio::time::Instant;
use tracing::{debug, error, info, instrument, warn};

use crate::error::TideCastError;
use crate::models::{CacheStatus, CoordinateKey, TideWeatherBundle};

/// What a build produced
#[derive(Debug, Clone)]
pub enum BuildOutcome {
    /// Both upstreams contributed; the bundle is cacheable
    Complete(TideWeatherBundle),
    /// One upstream failed. Cached unless the failure was transient.
    Partial {
        bundle: TideWeatherBundle,
        /// The missing upstream failed transiently; a stale bundle may stand in
        /// and the partial result is not cached
        transient: bool,
    },
}

/// Bundle and how it was obtained, shared with every waiter on the same key
pub type SharedResult = Result<(Arc<TideWeatherBundle>, CacheStatus), TideCastError>;

#[derive(Debug)]
struct CacheEntry {
    value: Arc<TideWeatherBundle>,
    created_at: Instant,
    expires_at: Instant,
}

impl CacheEntry {
    fn is_fresh(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

#[derive(Debug, Default)]
struct CacheState {
    entries: HashMap<CoordinateKey, CacheEntry>,
    in_flight: HashMap<CoordinateKey, broadcast::Sender<SharedResult>>,
    /// Bumped by `clear()`; builds registered before a clear leave newer registrations alone
    generation: u64,
}

impl CacheState {
    fn prune(&mut self, now: Instant, grace: Duration) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| now < entry.expires_at + grace);
        before - self.entries.len()
    }

    /// Store a finished bundle. A build that outlived a `clear()` only fills
    /// an empty slot so it never shadows an entry built after the clear.
    fn store(
        &mut self,
        key: CoordinateKey,
        value: &Arc<TideWeatherBundle>,
        ttl: Duration,
        now: Instant,
        current: bool,
    ) {
        let entry = CacheEntry {
            value: Arc::clone(value),
            created_at: now,
            expires_at: now + ttl,
        };
        if current || !self.entries.contains_key(&key) {
            self.entries.insert(key, entry);
        } else {
            debug!(%key, "Discarding bundle from a build started before the last clear");
        }
    }

    fn settle(
        &mut self,
        key: CoordinateKey,
        outcome: Result<BuildOutcome, TideCastError>,
        ttl: Duration,
        now: Instant,
        current: bool,
    ) -> SharedResult {
        match outcome {
            Ok(BuildOutcome::Complete(bundle)) => {
                let value = Arc::new(bundle);
                self.store(key, &value, ttl, now, current);
                Ok((value, CacheStatus::Miss))
            }
            Ok(BuildOutcome::Partial { bundle, transient }) => {
                if transient {
                    if let Some(stale) = self.entries.get(&key) {
                        warn!(%key, "Serving stale bundle instead of a partial one");
                        return Ok((Arc::clone(&stale.value), CacheStatus::Stale));
                    }
                    return Ok((Arc::new(bundle), CacheStatus::Partial));
                }
                // Non-transient gaps are cached like complete bundles
                let value = Arc::new(bundle);
                self.store(key, &value, ttl, now, current);
                Ok((value, CacheStatus::Partial))
            }
            Err(error) => {
                if error.is_transient() {
                    if let Some(stale) = self.entries.get(&key) {
                        let age = now.saturating_duration_since(stale.created_at);
                        warn!(%key, %error, age_s = age.as_secs(), "Build failed, serving stale bundle");
                        return Ok((Arc::clone(&stale.value), CacheStatus::Stale));
                    }
                }
                Err(error)
            }
        }
    }

    fn count_fresh(&self, now: Instant) -> usize {
        self.entries.values().filter(|e| e.is_fresh(now)).count()
    }
}

/// TTL cache with single-flight builds and stale fallback
#[derive(Debug)]
pub struct AggregationCache {
    state: Arc<Mutex<CacheState>>,
    ttl: Duration,
    stale_grace: Duration,
}

impl AggregationCache {
    #[must_use]
    pub fn new(ttl: Duration, stale_grace: Duration) -> Self {
        Self {
            state: Arc::new(Mutex::new(CacheState::default())),
            ttl,
            stale_grace,
        }
    }

    /// Fresh bundle for `key`, or the result of a (possibly shared) build.
    ///
    /// `build` is only invoked when this caller starts a new build.
    #[instrument(name = "cache_get_or_build", level = "debug", skip(self, key, build), fields(key = %key))]
    pub async fn get_or_build<F, Fut>(&self, key: CoordinateKey, build: F) -> SharedResult
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<BuildOutcome, TideCastError>> + Send + 'static,
    {
        let mut receiver = {
            let mut state = self.state.lock().await;
            let now = Instant::now();

            let pruned = state.prune(now, self.stale_grace);
            if pruned > 0 {
                debug!(pruned, "Dropped expired bundles past their grace period");
            }

            if let Some(entry) = state.entries.get(&key) {
                if entry.is_fresh(now) {
                    debug!("Cache hit");
                    return Ok((Arc::clone(&entry.value), CacheStatus::Hit));
                }
                debug!("Cache entry expired");
            }

            if let Some(sender) = state.in_flight.get(&key) {
                debug!("Joining in-flight build");
                sender.subscribe()
            } else {
                let (sender, receiver) = broadcast::channel(1);
                state.in_flight.insert(key, sender.clone());
                let generation = state.generation;
                debug!(in_flight = state.in_flight.len(), "Starting build");

                // A panicking build surfaces below as a JoinError
                let build_task = tokio::spawn(build());
                let shared_state = Arc::clone(&self.state);
                let ttl = self.ttl;
                tokio::spawn(async move {
                    let outcome = build_task.await.unwrap_or_else(|e| {
                        error!(%key, error = %e, "Bundle build task failed");
                        Err(TideCastError::internal(format!("Bundle build for {key} failed: {e}")))
                    });
                    let result = {
                        let mut state = shared_state.lock().await;
                        let current = state.generation == generation;
                        let result = state.settle(key, outcome, ttl, Instant::now(), current);
                        if current {
                            state.in_flight.remove(&key);
                        }
                        result
                    };
                    // Nobody may be listening any more; that is fine
                    let _ = sender.send(result);
                });

                receiver
            }
        };

        receiver.recv().await.map_err(|e| {
            TideCastError::internal(format!("Build for {key} ended without a result: {e}"))
        })?
    }

    /// Evict every entry and forget in-flight builds; returns the number of entries removed
    #[instrument(name = "cache_clear", skip(self))]
    pub async fn clear(&self) -> usize {
        let mut state = self.state.lock().await;
        let cleared = state.entries.len();
        state.entries.clear();
        state.in_flight.clear();
        state.generation += 1;
        info!(cleared, "Cache cleared");
        cleared
    }

    /// Entries currently held, including expired ones kept for fallback
    pub async fn len(&self) -> usize {
        self.state.lock().await.entries.len()
    }

    /// Entries still within their TTL
    pub async fn fresh_len(&self) -> usize {
        self.state.lock().await.count_fresh(Instant::now())
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Fresh bundle for `key` without triggering a build
    pub async fn peek(&self, key: &CoordinateKey) -> Option<Arc<TideWeatherBundle>> {
        let state = self.state.lock().await;
        state
            .entries
            .get(key)
            .filter(|entry| entry.is_fresh(Instant::now()))
            .map(|entry| Arc::clone(&entry.value))
    }

    /// Drop entries past their grace period; returns how many were removed
    pub async fn prune(&self) -> usize {
        let mut state = self.state.lock().await;
        state.prune(Instant::now(), self.stale_grace)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Service;
    use crate::models::{BundleLocation, Coordinate, Recommendation};
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn key() -> CoordinateKey {
        Coordinate::new(40.7128, -74.006).unwrap().cache_key(3)
    }

    fn bundle(tag: &str) -> TideWeatherBundle {
        TideWeatherBundle {
            location: BundleLocation {
                lat: 40.713,
                lon: -74.006,
                name: Some(tag.to_string()),
            },
            next_tides: vec![],
            daily_summary: None,
            weather: None,
            marine_conditions: None,
            recommendations: Recommendation {
                best_activity: "beach walking".to_string(),
                best_time: None,
                tips: vec![],
            },
            unavailable: vec![],
            generated_at: Utc::now(),
        }
    }

    fn name(bundle: &TideWeatherBundle) -> &str {
        bundle.location.name.as_deref().unwrap_or_default()
    }

    #[tokio::test]
    async fn test_hit_after_miss() {
        let cache = AggregationCache::new(Duration::from_secs(60), Duration::from_secs(60));
        let (first, status) = cache
            .get_or_build(key(), || async { Ok(BuildOutcome::Complete(bundle("a"))) })
            .await
            .unwrap();
        assert_eq!(status, CacheStatus::Miss);
        assert_eq!(name(&first), "a");

        let (second, status) = cache
            .get_or_build(key(), || async { Ok(BuildOutcome::Complete(bundle("b"))) })
            .await
            .unwrap();
        assert_eq!(status, CacheStatus::Hit);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_build() {
        let cache = Arc::new(AggregationCache::new(
            Duration::from_secs(60),
            Duration::from_secs(60),
        ));
        let builds = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let builds = Arc::clone(&builds);
                tokio::spawn(async move {
                    cache
                        .get_or_build(key(), move || async move {
                            builds.fetch_add(1, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(50)).await;
                            Ok(BuildOutcome::Complete(bundle("shared")))
                        })
                        .await
                })
            })
            .collect();

        for task in tasks {
            let (bundle, _) = task.await.unwrap().unwrap();
            assert_eq!(name(&bundle), "shared");
        }
        assert_eq!(builds.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_errors_are_shared_and_not_cached() {
        let cache = AggregationCache::new(Duration::from_secs(60), Duration::from_secs(60));
        let err = cache
            .get_or_build(key(), || async {
                Err(TideCastError::rejected(Service::TidesApi, 401, "bad key"))
            })
            .await
            .unwrap_err();
        assert!(matches!(err, TideCastError::UpstreamRejected { .. }));
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_transient_partial_is_not_cached() {
        let cache = AggregationCache::new(Duration::from_secs(60), Duration::from_secs(60));
        let (_, status) = cache
            .get_or_build(key(), || async {
                Ok(BuildOutcome::Partial {
                    bundle: bundle("partial"),
                    transient: true,
                })
            })
            .await
            .unwrap();
        assert_eq!(status, CacheStatus::Partial);
        assert!(cache.peek(&key()).await.is_none());
    }

    #[tokio::test]
    async fn test_non_transient_partial_is_cached() {
        let cache = AggregationCache::new(Duration::from_secs(60), Duration::from_secs(60));
        let (first, status) = cache
            .get_or_build(key(), || async {
                Ok(BuildOutcome::Partial {
                    bundle: bundle("tides only"),
                    transient: false,
                })
            })
            .await
            .unwrap();
        assert_eq!(status, CacheStatus::Partial);

        let (second, status) = cache
            .get_or_build(key(), || async { Ok(BuildOutcome::Complete(bundle("unused"))) })
            .await
            .unwrap();
        assert_eq!(status, CacheStatus::Hit);
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn test_panicking_build_releases_key() {
        let cache = AggregationCache::new(Duration::from_secs(60), Duration::from_secs(60));
        let err = tokio::time::timeout(
            Duration::from_secs(2),
            cache.get_or_build(key(), || async {
                if name(&bundle("x")) == "x" {
                    panic!("provider bug");
                }
                Ok(BuildOutcome::Complete(bundle("unreachable")))
            }),
        )
        .await
        .expect("a panicking build must not hang its caller")
        .unwrap_err();
        assert!(matches!(err, TideCastError::Internal { .. }));

        let (bundle, status) = tokio::time::timeout(
            Duration::from_secs(2),
            cache.get_or_build(key(), || async { Ok(BuildOutcome::Complete(bundle("ok"))) }),
        )
        .await
        .expect("the key must accept a new build")
        .unwrap();
        assert_eq!(status, CacheStatus::Miss);
        assert_eq!(name(&bundle), "ok");
    }

    #[tokio::test]
    async fn test_fresh_len_excludes_expired_entries() {
        let cache = AggregationCache::new(Duration::from_millis(20), Duration::from_secs(60));
        cache
            .get_or_build(key(), || async { Ok(BuildOutcome::Complete(bundle("old"))) })
            .await
            .unwrap();
        assert_eq!(cache.fresh_len().await, 1);

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(cache.fresh_len().await, 0);
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn test_stale_fallback_on_transient_failure() {
        let cache = AggregationCache::new(Duration::from_millis(20), Duration::from_secs(60));
        cache
            .get_or_build(key(), || async { Ok(BuildOutcome::Complete(bundle("old"))) })
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(cache.peek(&key()).await.is_none());

        let (stale, status) = cache
            .get_or_build(key(), || async {
                Err(TideCastError::unavailable(Service::TidesApi, "timeout"))
            })
            .await
            .unwrap();
        assert_eq!(status, CacheStatus::Stale);
        assert!(status.is_degraded());
        assert_eq!(name(&stale), "old");

        // Rejections are not papered over
        let err = cache
            .get_or_build(key(), || async {
                Err(TideCastError::rejected(Service::TidesApi, 403, "forbidden"))
            })
            .await
            .unwrap_err();
        assert_eq!(err.service(), Some(Service::TidesApi));
    }

    #[tokio::test]
    async fn test_expired_entries_pruned_after_grace() {
        let cache = AggregationCache::new(Duration::from_millis(10), Duration::from_millis(10));
        cache
            .get_or_build(key(), || async { Ok(BuildOutcome::Complete(bundle("old"))) })
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(cache.prune().await, 1);
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_clear_forces_rebuild() {
        let cache = AggregationCache::new(Duration::from_secs(60), Duration::from_secs(60));
        cache
            .get_or_build(key(), || async { Ok(BuildOutcome::Complete(bundle("a"))) })
            .await
            .unwrap();
        assert_eq!(cache.clear().await, 1);
        assert_eq!(cache.len().await, 0);

        let (fresh, status) = cache
            .get_or_build(key(), || async { Ok(BuildOutcome::Complete(bundle("b"))) })
            .await
            .unwrap();
        assert_eq!(status, CacheStatus::Miss);
        assert_eq!(name(&fresh), "b");
    }

    #[tokio::test]
    async fn test_clear_during_build_starts_new_build() {
        let cache = Arc::new(AggregationCache::new(
            Duration::from_secs(60),
            Duration::from_secs(60),
        ));
        let (release, gate) = tokio::sync::oneshot::channel::<()>();

        let slow = {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move {
                cache
                    .get_or_build(key(), || async move {
                        let _ = gate.await;
                        Ok(BuildOutcome::Complete(bundle("slow")))
                    })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        cache.clear().await;
        let (fresh, status) = cache
            .get_or_build(key(), || async { Ok(BuildOutcome::Complete(bundle("fast"))) })
            .await
            .unwrap();
        assert_eq!(status, CacheStatus::Miss);
        assert_eq!(name(&fresh), "fast");

        release.send(()).unwrap();
        let (old, _) = slow.await.unwrap().unwrap();
        assert_eq!(name(&old), "slow");

        // The pre-clear build must not replace the entry built after the clear
        let current = cache.peek(&key()).await.unwrap();
        assert_eq!(name(&current), "fast");
    }

    #[tokio::test]
    async fn test_pre_clear_build_fills_empty_slot() {
        let cache = Arc::new(AggregationCache::new(
            Duration::from_secs(60),
            Duration::from_secs(60),
        ));
        let (release, gate) = tokio::sync::oneshot::channel::<()>();

        let slow = {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move {
                cache
                    .get_or_build(key(), || async move {
                        let _ = gate.await;
                        Ok(BuildOutcome::Complete(bundle("slow")))
                    })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        cache.clear().await;
        release.send(()).unwrap();
        slow.await.unwrap().unwrap();

        let stored = cache.peek(&key()).await.unwrap();
        assert_eq!(name(&stored), "slow");
    }
}
