//! Cache layer with deterministic keys and single-flight computation.
//!
//! The point of this layer is to keep upstream load bounded: overlapping
//! requests for the same query must trigger at most one upstream fan-out,
//! even when the requests land in separate processes. In-process callers
//! share one computation through an in-flight table; cross-process callers
//! are excluded through a lock held in the backing store for the duration
//! of the computation.

mod key;
mod store;

pub use key::{default_expiry, derive_key, round_to_hour, ARCHIVE_TTL, KEY_VERSION, RECENT_TTL, STATIC_TTL};
pub use store::{KeyValueStore, MemoryStore, RedisStore};

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use common::{Error, Result};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::watch;
use tracing::debug;

/// Safety-net TTL on the computation lock; a crashed holder frees the key
/// after this long.
const LOCK_TTL: Duration = Duration::from_secs(30);

/// How often a blocked caller re-checks the store while another process
/// computes.
const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Upper bound on how long a caller waits for someone else's computation.
const LOCK_WAIT_TIMEOUT: Duration = Duration::from_secs(60);

type Outcome = Option<std::result::Result<String, Error>>;

/// Single-flight cache over a [`KeyValueStore`].
pub struct Cache {
    store: Arc<dyn KeyValueStore>,
    inflight: DashMap<String, watch::Receiver<Outcome>>,
}

impl Cache {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            inflight: DashMap::new(),
        }
    }

    /// Typed read of a cached entry.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.store.get(key).await? {
            Some(raw) => decode(key, &raw).map(Some),
            None => Ok(None),
        }
    }

    /// Typed write with a TTL.
    pub async fn set<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) -> Result<()> {
        let raw = serde_json::to_string(value)
            .map_err(|e| Error::Json(format!("encoding value for {key}: {e}")))?;
        self.store.set(key, &raw, ttl).await
    }

    /// Returns the cached value for `key`, or runs `compute` to produce it.
    ///
    /// On a miss, exactly one caller across all concurrent callers (in this
    /// process or another) runs `compute`; the rest block and receive the
    /// freshly stored value. A failed computation propagates its error to
    /// every waiting caller in this process and leaves the key un-cached.
    pub async fn get_or_compute<T, F, Fut>(&self, key: &str, ttl: Duration, compute: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if let Some(raw) = self.store.get(key).await? {
            debug!("cache hit for {key}");
            return decode(key, &raw);
        }

        enum Role {
            Leader(watch::Sender<Outcome>),
            Follower(watch::Receiver<Outcome>),
        }

        let role = match self.inflight.entry(key.to_string()) {
            Entry::Occupied(entry) => Role::Follower(entry.get().clone()),
            Entry::Vacant(slot) => {
                let (tx, rx) = watch::channel(None);
                slot.insert(rx);
                Role::Leader(tx)
            }
        };

        match role {
            Role::Follower(mut rx) => loop {
                let published = rx.borrow().clone();
                if let Some(outcome) = published {
                    return outcome.and_then(|raw| decode(key, &raw));
                }
                if rx.changed().await.is_err() {
                    return Err(Error::Compute(format!(
                        "computation for {key} was abandoned"
                    )));
                }
            },
            Role::Leader(tx) => {
                let _guard = InflightGuard {
                    inflight: &self.inflight,
                    key,
                };
                let outcome = self.compute_with_lock(key, ttl, compute).await;
                let _ = tx.send(Some(outcome.clone()));
                outcome.and_then(|raw| decode(key, &raw))
            }
        }
    }

    /// Runs the computation under the store-level lock, or returns the
    /// value another process stored while we waited.
    async fn compute_with_lock<T, F, Fut>(
        &self,
        key: &str,
        ttl: Duration,
        compute: F,
    ) -> std::result::Result<String, Error>
    where
        T: Serialize,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let lock_key = format!("{key}.lock");
        let deadline = tokio::time::Instant::now() + LOCK_WAIT_TIMEOUT;

        loop {
            if self.store.acquire(&lock_key, LOCK_TTL).await? {
                break;
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(Error::CacheBackend(format!(
                    "timed out waiting for lock on {key}"
                )));
            }
            tokio::time::sleep(LOCK_POLL_INTERVAL).await;
            if let Some(raw) = self.store.get(key).await? {
                return Ok(raw);
            }
        }

        // Double-check after winning the lock: the previous holder may have
        // stored the value between our first miss and now.
        match self.store.get(key).await {
            Ok(Some(raw)) => {
                self.store.release(&lock_key).await?;
                return Ok(raw);
            }
            Ok(None) => {}
            Err(e) => {
                let _ = self.store.release(&lock_key).await;
                return Err(e);
            }
        }

        debug!("cache miss for {key}, computing");
        let computed = match compute().await {
            Ok(value) => serde_json::to_string(&value)
                .map_err(|e| Error::Json(format!("encoding value for {key}: {e}"))),
            Err(e) => Err(e),
        };
        // Failures are never cached; the key stays empty so a later caller
        // retries the computation.
        let stored = match &computed {
            Ok(raw) => self.store.set(key, raw, ttl).await,
            Err(_) => Ok(()),
        };
        self.store.release(&lock_key).await?;
        stored?;
        computed
    }

    /// Drop a single cache entry.
    pub async fn clear_key(&self, key: &str) -> Result<()> {
        self.store.delete(key).await
    }

    /// Drop every cache entry.
    pub async fn clear_all(&self) -> Result<()> {
        self.store.clear().await
    }
}

/// Removes the in-flight marker even when the leader unwinds, so the key
/// cannot be wedged by a panicked computation.
struct InflightGuard<'a> {
    inflight: &'a DashMap<String, watch::Receiver<Outcome>>,
    key: &'a str,
}

impl Drop for InflightGuard<'_> {
    fn drop(&mut self) {
        self.inflight.remove(self.key);
    }
}

fn decode<T: DeserializeOwned>(key: &str, raw: &str) -> Result<T> {
    serde_json::from_str(raw).map_err(|e| Error::Json(format!("cached value for {key}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn new_cache() -> Arc<Cache> {
        Arc::new(Cache::new(Arc::new(MemoryStore::new())))
    }

    const TTL: Duration = Duration::from_secs(60);

    #[tokio::test]
    async fn hit_skips_compute() {
        let cache = new_cache();
        cache.set("k", &7_u32, TTL).await.expect("set");
        let calls = AtomicUsize::new(0);
        let value: u32 = cache
            .get_or_compute("k", TTL, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<u32, Error>(99)
            })
            .await
            .expect("value");
        assert_eq!(value, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn miss_computes_then_later_calls_hit() {
        let cache = new_cache();
        let calls = AtomicUsize::new(0);
        for _ in 0..3 {
            let value: u32 = cache
                .get_or_compute("k", TTL, || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<u32, Error>(42)
                })
                .await
                .expect("value");
            assert_eq!(value, 42);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_misses_compute_once() {
        let cache = new_cache();
        let calls = Arc::new(AtomicUsize::new(0));
        let mut tasks = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            let calls = calls.clone();
            tasks.push(tokio::spawn(async move {
                cache
                    .get_or_compute("shared", TTL, || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(100)).await;
                        Ok::<u32, Error>(42)
                    })
                    .await
            }));
        }
        for task in tasks {
            let value = task.await.expect("join").expect("value");
            assert_eq!(value, 42);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn failed_compute_propagates_and_leaves_key_uncached() {
        let cache = new_cache();
        let mut tasks = Vec::new();
        for _ in 0..4 {
            let cache = cache.clone();
            tasks.push(tokio::spawn(async move {
                cache
                    .get_or_compute::<u32, _, _>("failing", TTL, || async {
                        tokio::time::sleep(Duration::from_millis(100)).await;
                        Err(Error::Http("boom".into()))
                    })
                    .await
            }));
        }
        for task in tasks {
            assert!(task.await.expect("join").is_err());
        }
        // The failure was not cached, so the next caller recomputes.
        let value: u32 = cache
            .get_or_compute("failing", TTL, || async { Ok::<u32, Error>(7) })
            .await
            .expect("value");
        assert_eq!(value, 7);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn lock_excludes_a_second_cache_on_the_same_store() {
        // Two Cache instances over one store stand in for two processes.
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let a = Arc::new(Cache::new(store.clone()));
        let b = Arc::new(Cache::new(store));
        let calls = Arc::new(AtomicUsize::new(0));

        let calls_a = calls.clone();
        let first = tokio::spawn(async move {
            a.get_or_compute("k", TTL, || async move {
                calls_a.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(300)).await;
                Ok::<u32, Error>(42)
            })
            .await
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        let calls_b = calls.clone();
        let second = tokio::spawn(async move {
            b.get_or_compute("k", TTL, || async move {
                calls_b.fetch_add(1, Ordering::SeqCst);
                Ok::<u32, Error>(42)
            })
            .await
        });

        assert_eq!(first.await.expect("join").expect("value"), 42);
        assert_eq!(second.await.expect("join").expect("value"), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn clear_key_forces_recompute() {
        let cache = new_cache();
        let calls = AtomicUsize::new(0);
        for _ in 0..2 {
            let _: u32 = cache
                .get_or_compute("k", TTL, || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<u32, Error>(1)
                })
                .await
                .expect("value");
            cache.clear_key("k").await.expect("clear");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
