//! In-process query cache for the client data core.
//!
//! Entries are keyed by operation name plus the ordered argument tuple and
//! store JSON values, so one cache serves every response type.
//!
//! Per entry:
//! - younger than `stale_after`: served from memory, no network call
//! - between `stale_after` and `evict_after`: served stale while a background
//!   refetch runs
//! - older than `evict_after` with no subscriber: treated as a miss
//!
//! Concurrent requests for a key share a single in-flight fetch. Each fetch
//! is tagged with the entry's generation, and a response whose generation no
//! longer matches (the entry was invalidated or removed meanwhile) is
//! discarded.

use futures::future::{BoxFuture, FutureExt, Shared};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::{
    collections::HashMap,
    fmt::Display,
    future::Future,
    sync::{Arc, Mutex, MutexGuard, PoisonError, Weak},
    time::Duration,
};
use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time::{Instant, MissedTickBehavior},
};

use crate::client::retry::RetryPolicy;
use crate::error::FetchError;

/// Cache identity: operation name plus its ordered arguments
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryKey {
    operation: &'static str,
    args: String,
}

impl QueryKey {
    /// Fails for arguments JSON cannot represent, such as maps with non-string
    /// keys, rather than letting distinct arguments share a key.
    pub fn new<A: Serialize + ?Sized>(
        operation: &'static str,
        args: &A,
    ) -> Result<Self, FetchError> {
        Ok(Self {
            operation,
            args: serde_json::to_string(args)?,
        })
    }

    pub fn operation(&self) -> &'static str {
        self.operation
    }
}

impl Display for QueryKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", self.operation, self.args)
    }
}

/// Freshness tier for a data category
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// Rapidly changing listings (trending pages, the watch-later list)
    Short,
    /// Details and search results
    Medium,
    /// Reference data that changes occasionally (runtimes, ratings)
    Long,
    /// Near-static data (genre lists, external id mappings)
    VeryLong,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachePolicy {
    pub stale_after: Duration,
    pub evict_after: Duration,
}

const HOUR: Duration = Duration::from_secs(60 * 60);
const DAY: Duration = Duration::from_secs(24 * 60 * 60);

impl Freshness {
    pub const fn policy(self) -> CachePolicy {
        match self {
            Freshness::Short => CachePolicy {
                stale_after: Duration::from_secs(2 * 60),
                evict_after: Duration::from_secs(10 * 60),
            },
            Freshness::Medium => CachePolicy {
                stale_after: Duration::from_secs(10 * 60),
                evict_after: Duration::from_secs(30 * 60),
            },
            Freshness::Long => CachePolicy {
                stale_after: HOUR,
                evict_after: DAY,
            },
            Freshness::VeryLong => CachePolicy {
                stale_after: DAY,
                evict_after: Duration::from_secs(7 * 24 * 60 * 60),
            },
        }
    }
}

/// Snapshot of a query, safe to read from a render path
#[derive(Debug, Clone, PartialEq)]
pub struct QueryState<T> {
    pub data: Option<T>,
    /// No data yet and a fetch is running
    pub is_loading: bool,
    /// A fetch is running, with or without data
    pub is_fetching: bool,
    pub is_stale: bool,
    pub error: Option<FetchError>,
}

impl<T> QueryState<T> {
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

type SharedFetch = Shared<BoxFuture<'static, Result<Value, FetchError>>>;
type Entries = Mutex<HashMap<QueryKey, CacheEntry>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DataState {
    Fresh,
    Stale,
    Missing,
}

struct CacheEntry {
    data: Option<Value>,
    fetched_at: Option<Instant>,
    touched_at: Instant,
    policy: CachePolicy,
    invalidated: bool,
    error: Option<FetchError>,
    in_flight: Option<SharedFetch>,
    generation: u64,
    subscribers: usize,
}

impl CacheEntry {
    fn new(policy: CachePolicy, now: Instant) -> Self {
        Self {
            data: None,
            fetched_at: None,
            touched_at: now,
            policy,
            invalidated: false,
            error: None,
            in_flight: None,
            generation: 0,
            subscribers: 0,
        }
    }

    fn data_state(&self, now: Instant) -> DataState {
        let Some(fetched_at) = self.fetched_at.filter(|_| self.data.is_some()) else {
            return DataState::Missing;
        };

        let age = now.saturating_duration_since(fetched_at);
        if age >= self.policy.evict_after && self.subscribers == 0 {
            DataState::Missing
        } else if self.invalidated || age >= self.policy.stale_after {
            DataState::Stale
        } else {
            DataState::Fresh
        }
    }

    fn is_evictable(&self, now: Instant) -> bool {
        self.subscribers == 0
            && self.in_flight.is_none()
            && now.saturating_duration_since(self.touched_at) >= self.policy.evict_after
    }

    fn complete(&mut self, result: &Result<Value, FetchError>) {
        let now = Instant::now();
        self.in_flight = None;
        self.touched_at = now;

        match result {
            Ok(value) => {
                self.data = Some(value.clone());
                self.fetched_at = Some(now);
                self.invalidated = false;
                self.error = None;
            }
            Err(error) => self.error = Some(error.clone()),
        }
    }
}

fn lock(entries: &Entries) -> MutexGuard<'_, HashMap<QueryKey, CacheEntry>> {
    entries.lock().unwrap_or_else(PoisonError::into_inner)
}

fn decode<T: DeserializeOwned>(value: Value) -> Result<T, FetchError> {
    Ok(serde_json::from_value(value)?)
}

/// Query cache shared by every data hook of the client core.
///
/// Cloning is cheap and clones share state.
#[derive(Clone)]
pub struct QueryCache {
    entries: Arc<Entries>,
    retry: RetryPolicy,
    mutation_retry: RetryPolicy,
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl QueryCache {
    /// Queries retry with [`RetryPolicy::standard`], mutations never retry
    pub fn new() -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            retry: RetryPolicy::standard(),
            mutation_retry: RetryPolicy::none(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_mutation_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.mutation_retry = retry;
        self
    }

    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, key: &QueryKey) -> bool {
        lock(&self.entries).contains_key(key)
    }

    /// Returns the cached value for `key`, fetching it when needed.
    ///
    /// Fresh data returns immediately. Stale data returns immediately and
    /// starts a background refetch. Otherwise the caller waits for the
    /// (possibly already running) fetch.
    pub async fn fetch_query<T, F, Fut>(
        &self,
        key: QueryKey,
        freshness: Freshness,
        fetcher: F,
    ) -> Result<T, FetchError>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, FetchError>> + Send + 'static,
    {
        let policy = freshness.policy();
        let now = Instant::now();

        let pending = {
            let mut entries = lock(&self.entries);
            let entry = entries
                .entry(key.clone())
                .or_insert_with(|| CacheEntry::new(policy, now));
            entry.policy = policy;
            entry.touched_at = now;

            match entry.data_state(now) {
                DataState::Fresh => {
                    tracing::trace!(key = %key, "Query cache hit");
                    return decode(entry.data.clone().unwrap_or_default());
                }
                DataState::Stale => {
                    if entry.in_flight.is_none() {
                        tracing::debug!(key = %key, "Serving stale data, revalidating");
                        let _ = self.start_fetch(&key, entry, fetcher);
                    }
                    return decode(entry.data.clone().unwrap_or_default());
                }
                DataState::Missing => {
                    entry.data = None;
                    entry.fetched_at = None;
                    match &entry.in_flight {
                        Some(in_flight) => {
                            tracing::trace!(key = %key, "Joining in-flight query");
                            in_flight.clone()
                        }
                        None => self.start_fetch(&key, entry, fetcher),
                    }
                }
            }
        };

        decode(pending.await?)
    }

    /// Spawns the fetch for `entry` as a detached task shared by all waiters
    fn start_fetch<T, F, Fut>(&self, key: &QueryKey, entry: &mut CacheEntry, fetcher: F) -> SharedFetch
    where
        T: Serialize + Send + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, FetchError>> + Send + 'static,
    {
        entry.generation += 1;
        let generation = entry.generation;
        let entries: Weak<Entries> = Arc::downgrade(&self.entries);
        let retry = self.retry;
        let key = key.clone();

        let task = async move {
            let result = retry
                .run(|| {
                    let fut = fetcher();
                    async move {
                        let value = fut.await?;
                        Ok::<Value, FetchError>(serde_json::to_value(value)?)
                    }
                })
                .await;

            if let Some(entries) = entries.upgrade() {
                let mut entries = lock(&entries);
                match entries.get_mut(&key) {
                    Some(entry) if entry.generation == generation => entry.complete(&result),
                    _ => tracing::debug!(key = %key, "Discarding superseded query response"),
                }
            }

            result
        }
        .boxed()
        .shared();

        entry.in_flight = Some(task.clone());
        tokio::spawn(task.clone());
        task
    }

    /// Current state of a query without triggering a fetch
    pub fn query_state<T: DeserializeOwned>(&self, key: &QueryKey) -> QueryState<T> {
        let entries = lock(&self.entries);
        let Some(entry) = entries.get(key) else {
            return QueryState {
                data: None,
                is_loading: false,
                is_fetching: false,
                is_stale: true,
                error: None,
            };
        };

        let state = entry.data_state(Instant::now());
        let data = match state {
            DataState::Missing => None,
            _ => entry
                .data
                .clone()
                .and_then(|value| serde_json::from_value(value).ok()),
        };
        let is_fetching = entry.in_flight.is_some();

        QueryState {
            is_loading: is_fetching && data.is_none(),
            data,
            is_fetching,
            is_stale: state != DataState::Fresh,
            error: entry.error.clone(),
        }
    }

    /// Marks every entry of `operation` stale.
    ///
    /// A fetch already in flight for such an entry is superseded: its response
    /// will be discarded and the next request starts a new fetch.
    pub fn invalidate(&self, operation: &str) -> usize {
        let mut entries = lock(&self.entries);
        let mut count = 0;

        for entry in entries
            .iter_mut()
            .filter(|(key, _)| key.operation == operation)
            .map(|(_, entry)| entry)
        {
            entry.invalidated = true;
            if entry.in_flight.take().is_some() {
                entry.generation += 1;
            }
            count += 1;
        }

        tracing::debug!(operation, count, "Invalidated queries");
        count
    }

    /// Drops an entry; a response still in flight for it is discarded
    pub fn remove_query(&self, key: &QueryKey) -> bool {
        lock(&self.entries).remove(key).is_some()
    }

    /// Registers interest in a key. The entry is never garbage collected
    /// while a subscription is alive.
    pub fn subscribe(&self, key: &QueryKey) -> Subscription {
        let now = Instant::now();
        let mut entries = lock(&self.entries);
        let entry = entries
            .entry(key.clone())
            .or_insert_with(|| CacheEntry::new(Freshness::Medium.policy(), now));
        entry.subscribers += 1;
        entry.touched_at = now;

        Subscription {
            entries: Arc::downgrade(&self.entries),
            key: key.clone(),
        }
    }

    /// Runs a write with the mutation retry policy (no retry by default),
    /// then invalidates the listed operations whether or not it succeeded.
    pub async fn mutate<T, A, Fut>(&self, invalidates: &[&str], action: A) -> Result<T, FetchError>
    where
        A: FnMut() -> Fut,
        Fut: Future<Output = Result<T, FetchError>>,
    {
        let result = self.mutation_retry.run(action).await;
        for operation in invalidates {
            self.invalidate(operation);
        }
        result
    }

    /// Purges unsubscribed, idle entries past their eviction window
    pub fn collect_garbage(&self) -> usize {
        let now = Instant::now();
        let mut entries = lock(&self.entries);
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_evictable(now));
        let removed = before - entries.len();

        if removed > 0 {
            tracing::debug!(removed, remaining = entries.len(), "Query cache garbage collected");
        }
        removed
    }

    /// Runs [`collect_garbage`](Self::collect_garbage) every `interval` until
    /// the returned handle is shut down or dropped
    pub fn spawn_garbage_collector(&self, interval: Duration) -> GarbageCollectorHandle {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        let cache = self.clone();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        cache.collect_garbage();
                    }
                    _ = shutdown_rx.recv() => {
                        tracing::info!("Query cache collector stopped");
                        break;
                    }
                }
            }
        });

        GarbageCollectorHandle { shutdown_tx, task }
    }
}

/// Keeps a query entry alive while held
pub struct Subscription {
    entries: Weak<Entries>,
    key: QueryKey,
}

impl Subscription {
    pub fn key(&self) -> &QueryKey {
        &self.key
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(entries) = self.entries.upgrade() {
            let mut entries = lock(&entries);
            if let Some(entry) = entries.get_mut(&self.key) {
                entry.subscribers = entry.subscribers.saturating_sub(1);
                entry.touched_at = Instant::now();
            }
        }
    }
}

/// Handle for stopping the background garbage collector
pub struct GarbageCollectorHandle {
    shutdown_tx: mpsc::Sender<()>,
    task: JoinHandle<()>,
}

impl GarbageCollectorHandle {
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
        let _ = self.task.await;
    }
}
