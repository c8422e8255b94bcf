pub mod key;

use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, warn};

use crate::gateway::GatewayError;

pub use key::{ParamValue, Params, QueryKey};

type AnyValue = Arc<dyn Any + Send + Sync>;
type SharedFetch = Shared<BoxFuture<'static, Result<AnyValue, Arc<GatewayError>>>>;

/// Failures surfaced by [`QueryCache::fetch`].
#[derive(Debug, Clone, Error)]
pub enum CacheError {
    /// The underlying gateway fetch failed. Shared between coalesced callers.
    #[error("{0}")]
    Fetch(Arc<GatewayError>),
    /// The key was previously populated with a different payload type.
    #[error("cached value for {0} has unexpected type")]
    TypeMismatch(String),
}

impl CacheError {
    pub fn as_gateway(&self) -> Option<&GatewayError> {
        match self {
            CacheError::Fetch(e) => Some(e),
            CacheError::TypeMismatch(_) => None,
        }
    }
}

/// Per-fetch freshness and retention tuning.
#[derive(Debug, Clone, Copy)]
pub struct FetchOptions {
    /// Age under which a cached entry is served without refetching.
    pub stale_time: Duration,
    /// How long an unsubscribed entry survives after its last use.
    pub gc_time: Duration,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            stale_time: Duration::from_secs(30),
            gc_time: Duration::from_secs(300),
        }
    }
}

struct Entry {
    data: Option<AnyValue>,
    fetched_at: Instant,
    last_used: Instant,
    stale: bool,
    gc_time: Duration,
    last_error: Option<Arc<GatewayError>>,
}

struct InFlight {
    generation: u64,
    stale_on_commit: bool,
    future: SharedFetch,
}

#[derive(Default)]
struct Inner {
    entries: HashMap<QueryKey, Entry>,
    in_flight: HashMap<QueryKey, InFlight>,
    subscribers: HashMap<QueryKey, usize>,
    next_generation: u64,
}

/// Read-only view of one cache entry, for controllers and tests.
#[derive(Clone)]
pub struct EntrySnapshot {
    pub has_data: bool,
    pub is_stale: bool,
    pub fetched_at: Instant,
    pub last_error: Option<Arc<GatewayError>>,
}

/// Process-wide keyed cache of paged query results.
///
/// Serves stale-while-revalidate semantics: a fresh entry is returned without
/// touching the network, a stale entry is returned immediately while a
/// background refetch runs, a miss awaits the fetcher. At most one fetch is
/// in flight per key; concurrent callers share it. Constructed explicitly and
/// injected — never a hidden singleton.
pub struct QueryCache {
    inner: Arc<Mutex<Inner>>,
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl QueryCache {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
        }
    }

    /// Resolve `key` through the cache, calling `fetcher` only on a miss or
    /// to revalidate a stale entry.
    pub async fn fetch<T, F, Fut>(
        &self,
        key: QueryKey,
        options: FetchOptions,
        fetcher: F,
    ) -> Result<Arc<T>, CacheError>
    where
        T: Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, GatewayError>> + Send + 'static,
    {
        enum Plan {
            Hit(AnyValue),
            Await(SharedFetch),
        }

        let plan = {
            let mut inner = self.inner.lock();
            let now = Instant::now();

            let cached = match inner.entries.get_mut(&key) {
                Some(entry) => match &entry.data {
                    Some(data) => {
                        entry.last_used = now;
                        let fresh = !entry.stale
                            && now.duration_since(entry.fetched_at) < options.stale_time;
                        Some((data.clone(), fresh))
                    }
                    None => None,
                },
                None => None,
            };

            match cached {
                Some((data, true)) => {
                    debug!(key = %key, "cache hit");
                    Plan::Hit(data)
                }
                Some((data, false)) => {
                    // Stale-while-revalidate: hand back the old page now, let
                    // the committer task refresh the entry in the background.
                    debug!(key = %key, "cache hit (stale), revalidating");
                    self.begin_fetch(&mut inner, &key, options.gc_time, fetcher);
                    Plan::Hit(data)
                }
                None => {
                    debug!(key = %key, "cache miss");
                    let shared = self.begin_fetch(&mut inner, &key, options.gc_time, fetcher);
                    Plan::Await(shared)
                }
            }
        };

        match plan {
            Plan::Hit(data) => downcast(&key, data),
            Plan::Await(shared) => match shared.await {
                Ok(data) => downcast(&key, data),
                Err(e) => Err(CacheError::Fetch(e)),
            },
        }
    }

    /// Warm `key` without awaiting the result; no-op when fresh data or an
    /// in-flight fetch already exists.
    pub fn prefetch<T, F, Fut>(&self, key: QueryKey, options: FetchOptions, fetcher: F)
    where
        T: Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, GatewayError>> + Send + 'static,
    {
        let mut inner = self.inner.lock();
        if let Some(entry) = inner.entries.get(&key) {
            let fresh = entry.data.is_some()
                && !entry.stale
                && entry.fetched_at.elapsed() < options.stale_time;
            if fresh {
                return;
            }
        }
        if inner.in_flight.contains_key(&key) {
            return;
        }
        debug!(key = %key, "prefetching");
        self.begin_fetch(&mut inner, &key, options.gc_time, fetcher);
    }

    /// Mark every entry matching `predicate` stale. Matching in-flight
    /// fetches commit already-stale, so a mutation racing a read cannot pin
    /// pre-mutation data as fresh. Non-matching keys are untouched.
    pub fn invalidate<P>(&self, predicate: P)
    where
        P: Fn(&QueryKey) -> bool,
    {
        let mut inner = self.inner.lock();
        for (key, entry) in inner.entries.iter_mut() {
            if predicate(key) {
                debug!(key = %key, "invalidated");
                entry.stale = true;
            }
        }
        for (key, in_flight) in inner.in_flight.iter_mut() {
            if predicate(key) {
                in_flight.stale_on_commit = true;
            }
        }
    }

    /// Invalidate every key for one resource, regardless of params.
    pub fn invalidate_resource(&self, resource: &str) {
        self.invalidate(|key| key.resource() == resource);
    }

    /// Register interest in a key; the entry is exempt from garbage
    /// collection while any subscription guard is alive.
    pub fn subscribe(&self, key: QueryKey) -> Subscription {
        let mut inner = self.inner.lock();
        *inner.subscribers.entry(key.clone()).or_insert(0) += 1;
        Subscription {
            inner: Arc::clone(&self.inner),
            key,
        }
    }

    /// Cached data for `key`, if any, regardless of freshness.
    pub fn get<T: Send + Sync + 'static>(&self, key: &QueryKey) -> Option<Arc<T>> {
        let inner = self.inner.lock();
        let entry = inner.entries.get(key)?;
        let data = entry.data.clone()?;
        data.downcast::<T>().ok()
    }

    pub fn is_fetching(&self, key: &QueryKey) -> bool {
        self.inner.lock().in_flight.contains_key(key)
    }

    pub fn peek(&self, key: &QueryKey) -> Option<EntrySnapshot> {
        let inner = self.inner.lock();
        inner.entries.get(key).map(|entry| EntrySnapshot {
            has_data: entry.data.is_some(),
            is_stale: entry.stale,
            fetched_at: entry.fetched_at,
            last_error: entry.last_error.clone(),
        })
    }

    /// Evict entries with no live subscription whose last use is older than
    /// their gc_time.
    pub fn sweep(&self) {
        let mut inner = self.inner.lock();
        let now = Instant::now();
        let Inner {
            entries,
            in_flight,
            subscribers,
            ..
        } = &mut *inner;
        entries.retain(|key, entry| {
            let subscribed = subscribers.get(key).copied().unwrap_or(0) > 0;
            let expired = now.duration_since(entry.last_used) >= entry.gc_time;
            let keep = subscribed || !expired || in_flight.contains_key(key);
            if !keep {
                debug!(key = %key, "evicted");
            }
            keep
        });
    }

    /// Run [`sweep`](Self::sweep) on a fixed interval until the handle is
    /// aborted or the runtime shuts down.
    pub fn spawn_gc(&self, every: Duration) -> tokio::task::JoinHandle<()> {
        let cache = Self {
            inner: Arc::clone(&self.inner),
        };
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            interval.tick().await; // first tick fires immediately
            loop {
                interval.tick().await;
                cache.sweep();
            }
        })
    }

    fn begin_fetch<T, F, Fut>(
        &self,
        inner: &mut Inner,
        key: &QueryKey,
        gc_time: Duration,
        fetcher: F,
    ) -> SharedFetch
    where
        T: Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, GatewayError>> + Send + 'static,
    {
        if let Some(existing) = inner.in_flight.get(key) {
            return existing.future.clone();
        }

        let generation = inner.next_generation;
        inner.next_generation += 1;

        let fut = fetcher();
        let shared: SharedFetch = async move {
            fut.await
                .map(|value| Arc::new(value) as AnyValue)
                .map_err(Arc::new)
        }
        .boxed()
        .shared();

        inner.in_flight.insert(
            key.clone(),
            InFlight {
                generation,
                stale_on_commit: false,
                future: shared.clone(),
            },
        );

        // The committer drives the shared future to completion (so prefetches
        // and background revalidations progress without a waiter) and writes
        // the outcome back into the cache.
        let inner_handle = Arc::clone(&self.inner);
        let commit_key = key.clone();
        let commit_future = shared.clone();
        tokio::spawn(async move {
            let result = commit_future.await;
            let mut inner = inner_handle.lock();
            let stale_on_commit = match inner.in_flight.get(&commit_key) {
                Some(in_flight) if in_flight.generation == generation => {
                    in_flight.stale_on_commit
                }
                _ => {
                    warn!(key = %commit_key, "discarding superseded fetch result");
                    return;
                }
            };
            inner.in_flight.remove(&commit_key);
            let now = Instant::now();
            match result {
                Ok(data) => {
                    inner.entries.insert(
                        commit_key,
                        Entry {
                            data: Some(data),
                            fetched_at: now,
                            last_used: now,
                            stale: stale_on_commit,
                            gc_time,
                            last_error: None,
                        },
                    );
                }
                Err(error) => {
                    warn!(key = %commit_key, error = %error, "fetch failed");
                    let entry = inner.entries.entry(commit_key).or_insert(Entry {
                        data: None,
                        fetched_at: now,
                        last_used: now,
                        stale: true,
                        gc_time,
                        last_error: None,
                    });
                    // Keep any previously-good data; a failed refetch must
                    // not evict it or poison other keys.
                    entry.stale = true;
                    entry.last_error = Some(error);
                }
            }
        });

        shared
    }
}

fn downcast<T: Send + Sync + 'static>(
    key: &QueryKey,
    data: AnyValue,
) -> Result<Arc<T>, CacheError> {
    data.downcast::<T>()
        .map_err(|_| CacheError::TypeMismatch(key.resource().to_string()))
}

/// RAII guard returned by [`QueryCache::subscribe`].
pub struct Subscription {
    inner: Arc<Mutex<Inner>>,
    key: QueryKey,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let mut inner = self.inner.lock();
        if let Some(count) = inner.subscribers.get_mut(&self.key) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                inner.subscribers.remove(&self.key);
            }
        }
    }
}
