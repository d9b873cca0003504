use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{Duration, Utc};
use dashmap::DashMap;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::data::persistence::KvStore;
use crate::data::types::{CachedResult, PriceObservation};

const SNAPSHOT_KEY: &str = "price_cache";

/// Query-result cache: canonical query string to timestamped result set.
///
/// Every mutation (insert, eviction, invalidation, sweep) is followed by a
/// snapshot write to the KV store so the map can be rehydrated at startup.
/// Persistence failures are logged and absorbed; the cache then runs
/// memory-only for that cycle.
pub struct QueryCache {
    entries: DashMap<String, CachedResult>,
    ttl: Duration,
    store: Option<Arc<KvStore>>,
}

impl QueryCache {
    pub fn new(ttl_minutes: i64) -> Self {
        Self::with_ttl(Duration::minutes(ttl_minutes))
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            store: None,
        }
    }

    /// Cache backed by durable storage; rehydrates any persisted snapshot,
    /// re-validating each entry's expiry before reinstating it.
    pub fn with_store(ttl_minutes: i64, store: Arc<KvStore>) -> Self {
        let cache = Self {
            entries: DashMap::new(),
            ttl: Duration::minutes(ttl_minutes),
            store: Some(store),
        };
        cache.rehydrate();
        cache
    }

    fn rehydrate(&self) {
        let Some(store) = &self.store else { return };

        match store.get(SNAPSHOT_KEY) {
            Ok(Some(bytes)) => {
                match serde_json::from_slice::<HashMap<String, CachedResult>>(&bytes) {
                    Ok(snapshot) => {
                        let mut restored = 0usize;
                        let mut expired = 0usize;
                        for (key, entry) in snapshot {
                            if entry.is_expired() {
                                expired += 1;
                            } else {
                                self.entries.insert(key, entry);
                                restored += 1;
                            }
                        }
                        info!(
                            "cache rehydrated: {} entries restored, {} already expired",
                            restored, expired
                        );
                    }
                    Err(e) => warn!("cache snapshot unreadable, starting cold: {}", e),
                }
            }
            Ok(None) => {}
            Err(e) => warn!("cache snapshot read failed, starting cold: {:#}", e),
        }
    }

    /// Get an unexpired result; expired entries are evicted on read.
    pub fn get(&self, key: &str) -> Option<Vec<PriceObservation>> {
        let entry = self.entries.get(key)?;
        if entry.is_expired() {
            drop(entry);
            self.entries.remove(key);
            self.persist();
            return None;
        }
        Some(entry.observations.clone())
    }

    pub fn insert(&self, key: String, observations: Vec<PriceObservation>) {
        let now = Utc::now();
        self.entries.insert(
            key.clone(),
            CachedResult {
                observations,
                cached_at: now,
                expires_at: now + self.ttl,
                key_query: key,
            },
        );
        self.persist();
    }

    /// Drop every entry whose canonical key references the commodity,
    /// forcing the next query for it to re-aggregate.
    pub fn invalidate_commodity(&self, commodity: &str) {
        let needle = format!("commodity={}|", commodity.trim().to_lowercase());
        let before = self.entries.len();
        self.entries.retain(|key, _| !key.contains(&needle));
        let dropped = before - self.entries.len();

        if dropped > 0 {
            debug!("invalidated {} cache entries for {}", dropped, commodity);
            self.persist();
        }
    }

    /// Evict expired entries and snapshot the survivors.
    pub fn sweep(&self) {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired());
        let evicted = before - self.entries.len();
        if evicted > 0 {
            debug!("cache sweep evicted {} expired entries", evicted);
        }
        self.persist();
    }

    pub fn persist(&self) {
        let Some(store) = &self.store else { return };

        let snapshot: HashMap<String, CachedResult> = self
            .entries
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();

        match serde_json::to_vec(&snapshot) {
            Ok(bytes) => {
                if let Err(e) = store.set(SNAPSHOT_KEY, &bytes) {
                    warn!("cache persist failed: {:#}", e);
                }
            }
            Err(e) => warn!("cache snapshot serialization failed: {}", e),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Handle to the periodic sweep task. Must be stopped at shutdown so the
/// timer does not leak.
pub struct SweepHandle {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SweepHandle {
    pub async fn stop(self) {
        let _ = self.stop.send(true);
        let _ = self.task.await;
    }
}

/// Spawn the background sweep on a fixed interval.
pub fn start_sweep(cache: Arc<QueryCache>, interval: StdDuration) -> SweepHandle {
    let (tx, mut rx) = watch::channel(false);

    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The first tick completes immediately; skip it.
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = ticker.tick() => cache.sweep(),
                changed = rx.changed() => {
                    if changed.is_err() || *rx.borrow() {
                        break;
                    }
                }
            }
        }
        debug!("cache sweep task stopped");
    });

    SweepHandle { stop: tx, task }
}
