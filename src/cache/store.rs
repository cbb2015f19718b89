use chrono::{DateTime, Utc};
use futures_util::{future::BoxFuture, FutureExt};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::{
    borrow::Cow,
    collections::HashMap,
    future::Future,
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};
use tokio::{sync::broadcast, task::JoinHandle};
use uuid::Uuid;

use crate::{
    api::error::ClientError,
    cache::key::QueryKey,
    constants::Env,
    mutation::{PlanStep, Updater},
};

const EVENT_CAPACITY: usize = 256;

pub type Fetcher = Arc<dyn Fn() -> BoxFuture<'static, Result<Value, ClientError>> + Send + Sync>;

/// Wraps a typed async loader as a cache fetcher.
pub fn fetcher<T, F, Fut>(load: F) -> Fetcher
where
    T: Serialize + Send + 'static,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, ClientError>> + Send + 'static,
{
    Arc::new(move || {
        let fut = load();
        async move { Ok(serde_json::to_value(fut.await?)?) }.boxed()
    })
}

#[derive(Debug, Clone, Copy)]
pub struct CacheConfig {
    pub stale_time: Duration,
    pub gc_window: Duration,
    /// Refetch stale keys in the background as soon as no mutation holds them.
    pub auto_refetch: bool,
}

impl CacheConfig {
    pub fn from_env(env: &Env) -> Self {
        CacheConfig { stale_time: env.stale_time(), gc_window: env.gc_window(), auto_refetch: true }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            stale_time: Duration::from_secs(30),
            gc_window: Duration::from_secs(300),
            auto_refetch: true,
        }
    }
}

/// Selects cache entries touched by a mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Key(QueryKey),
    /// Every cached key of the entity, resolved when the mutation begins.
    Entity(Cow<'static, str>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheEventKind {
    Updated,
    Invalidated,
    Removed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEvent {
    pub key: QueryKey,
    pub kind: CacheEventKind,
}

#[derive(Debug, Clone)]
pub struct CachedQueryResult {
    pub value: Value,
    pub stale: bool,
    pub updated_at: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
}

impl CachedQueryResult {
    fn fresh(value: Value) -> Self {
        let now = Utc::now();
        CachedQueryResult { value, stale: false, updated_at: now, last_accessed: now }
    }

    pub fn is_stale(&self, stale_time: Duration) -> bool {
        self.stale || (Utc::now() - self.updated_at).to_std().is_ok_and(|age| age > stale_time)
    }
}

struct InFlight {
    mutation_id: Uuid,
    generation: u64,
    /// Value this mutation restores on failure. Handed to the next newer mutation when this one
    /// fails out of order.
    snapshot: Option<CachedQueryResult>,
    /// Replayed on top of a restored snapshot when an older mutation on the key fails.
    updaters: Vec<Updater>,
}

#[derive(Default)]
struct KeyState {
    entry: Option<CachedQueryResult>,
    fetcher: Option<Fetcher>,
    /// Bumped by every mutation that begins on the key; fetches started under an older
    /// generation are discarded.
    generation: u64,
    /// Highest generation whose mutation succeeded.
    settled_generation: u64,
    in_flight: Vec<InFlight>,
}

impl KeyState {
    fn take_record(&mut self, mutation_id: Uuid) -> Option<InFlight> {
        let idx = self.in_flight.iter().position(|r| r.mutation_id == mutation_id)?;
        Some(self.in_flight.remove(idx))
    }

    fn mark_stale(&mut self) -> bool {
        match self.entry.as_mut() {
            Some(entry) => {
                entry.stale = true;
                true
            }
            None => false,
        }
    }

    /// Rebuilds the mutations newer than `generation` on top of `base`, as if the one at
    /// `generation` never ran. Nothing changes when an updater no longer applies.
    fn replay_newer(&mut self, generation: u64, base: &CachedQueryResult) -> bool {
        if self.entry.is_none() {
            return false;
        }
        let mut newer: Vec<&mut InFlight> =
            self.in_flight.iter_mut().filter(|r| r.generation > generation).collect();
        newer.sort_by_key(|r| r.generation);

        let mut value = base.value.clone();
        let mut snapshots = Vec::with_capacity(newer.len());
        for record in &newer {
            snapshots.push(value.clone());
            for update in &record.updaters {
                if let Err(e) = (**update)(&mut value) {
                    log::debug!("Replay stopped: {}", e);
                    return false;
                }
            }
        }

        for (record, snapshot) in newer.into_iter().zip(snapshots) {
            record.snapshot = Some(CachedQueryResult { value: snapshot, ..base.clone() });
        }
        if let Some(entry) = self.entry.as_mut() {
            entry.value = value;
        }
        true
    }

    fn ready_for_refetch(&self) -> bool {
        self.in_flight.is_empty()
            && self.fetcher.is_some()
            && self.entry.as_ref().is_some_and(|e| e.stale)
    }
}

#[derive(Default)]
struct Inner {
    keys: HashMap<QueryKey, KeyState>,
}

/// Keys and generations a mutation holds between begin and resolution.
pub(crate) struct MutationTicket {
    pub id: Uuid,
    pub label: &'static str,
    pub keys: Vec<(QueryKey, u64)>,
}

/// Client-side store of the last known server response per query key.
///
/// Cloning is cheap; every clone shares the same entries. Locks are held only for the
/// bookkeeping itself, never across a fetch.
#[derive(Clone)]
pub struct QueryCache {
    inner: Arc<Mutex<Inner>>,
    events: broadcast::Sender<CacheEvent>,
    config: CacheConfig,
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

impl QueryCache {
    pub fn new(config: CacheConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        QueryCache { inner: Arc::new(Mutex::new(Inner::default())), events, config }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn emit(&self, key: QueryKey, kind: CacheEventKind) {
        // No subscribers is fine.
        let _ = self.events.send(CacheEvent { key, kind });
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.events.subscribe()
    }

    pub fn get(&self, key: &QueryKey) -> Option<Value> {
        let mut inner = self.lock();
        let entry = inner.keys.get_mut(key)?.entry.as_mut()?;
        entry.last_accessed = Utc::now();
        Some(entry.value.clone())
    }

    pub fn get_as<T: DeserializeOwned>(&self, key: &QueryKey) -> Result<Option<T>, ClientError> {
        match self.get(key) {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    pub fn entry(&self, key: &QueryKey) -> Option<CachedQueryResult> {
        self.lock().keys.get(key).and_then(|s| s.entry.clone())
    }

    /// Installs a server-confirmed value.
    pub fn set(&self, key: QueryKey, value: Value) {
        let fresh = CachedQueryResult::fresh(value);
        self.lock().keys.entry(key.clone()).or_default().entry = Some(fresh);
        self.emit(key, CacheEventKind::Updated);
    }

    pub fn set_as<T: Serialize>(&self, key: QueryKey, value: &T) -> Result<(), ClientError> {
        self.set(key, serde_json::to_value(value)?);
        Ok(())
    }

    pub fn is_stale(&self, key: &QueryKey) -> bool {
        let inner = self.lock();
        match inner.keys.get(key).and_then(|s| s.entry.as_ref()) {
            Some(entry) => entry.is_stale(self.config.stale_time),
            None => true,
        }
    }

    pub fn keys(&self) -> Vec<QueryKey> {
        let inner = self.lock();
        let mut keys: Vec<QueryKey> =
            inner.keys.iter().filter(|(_, s)| s.entry.is_some()).map(|(k, _)| k.clone()).collect();
        keys.sort();
        keys
    }

    pub fn pending_mutations(&self, key: &QueryKey) -> usize {
        self.lock().keys.get(key).map_or(0, |s| s.in_flight.len())
    }

    pub fn invalidate(&self, key: &QueryKey) -> bool {
        let ready = {
            let mut inner = self.lock();
            let Some(state) = inner.keys.get_mut(key) else { return false };
            if !state.mark_stale() {
                return false;
            }
            state.ready_for_refetch()
        };

        log::debug!("Invalidated {}", key);
        self.emit(key.clone(), CacheEventKind::Invalidated);
        if ready && self.config.auto_refetch {
            self.spawn_refetch(key.clone());
        }
        true
    }

    pub fn invalidate_entity(&self, entity: &str) -> Vec<QueryKey> {
        let keys: Vec<QueryKey> =
            self.keys().into_iter().filter(|k| k.entity() == entity).collect();
        keys.into_iter().filter(|k| self.invalidate(k)).collect()
    }

    pub fn remove(&self, key: &QueryKey) -> bool {
        let removed = self.lock().keys.remove(key).is_some_and(|s| s.entry.is_some());
        if removed {
            self.emit(key.clone(), CacheEventKind::Removed);
        }
        removed
    }

    pub fn clear(&self) {
        let keys: Vec<QueryKey> = {
            let mut inner = self.lock();
            inner.keys.drain().filter(|(_, s)| s.entry.is_some()).map(|(k, _)| k).collect()
        };
        log::debug!("Cleared {} cached queries", keys.len());
        for key in keys {
            self.emit(key, CacheEventKind::Removed);
        }
    }

    /// Returns the cached value when it is fresh, otherwise loads it with `fetcher`.
    ///
    /// The fetcher is remembered for the key and reused by later refetches. While a mutation
    /// holds the key the cached value is returned as is.
    pub async fn fetch_query(&self, key: QueryKey, fetcher: Fetcher) -> Result<Value, ClientError> {
        let generation = {
            let mut inner = self.lock();
            let state = inner.keys.entry(key.clone()).or_default();
            state.fetcher = Some(fetcher.clone());
            if let Some(entry) = state.entry.as_mut() {
                entry.last_accessed = Utc::now();
                if !state.in_flight.is_empty() || !entry.is_stale(self.config.stale_time) {
                    return Ok(entry.value.clone());
                }
            }
            state.generation
        };

        log::debug!("Fetching {}", key);
        let value = fetcher().await?;
        Ok(self.install_fetched(&key, generation, value))
    }

    pub async fn fetch_query_as<T: DeserializeOwned>(
        &self,
        key: QueryKey,
        fetcher: Fetcher,
    ) -> Result<T, ClientError> {
        Ok(serde_json::from_value(self.fetch_query(key, fetcher).await?)?)
    }

    /// Re-runs the registered fetcher. Returns the value now cached for the key.
    pub async fn refetch(&self, key: &QueryKey) -> Result<Option<Value>, ClientError> {
        let (fetcher, generation) = {
            let inner = self.lock();
            let Some(state) = inner.keys.get(key) else { return Ok(None) };
            let current = state.entry.as_ref().map(|e| e.value.clone());
            let Some(fetcher) = state.fetcher.clone() else { return Ok(current) };
            if !state.in_flight.is_empty() {
                log::debug!("Refetch of {} suspended by a pending mutation", key);
                return Ok(current);
            }
            (fetcher, state.generation)
        };

        log::debug!("Refetching {}", key);
        let value = fetcher().await?;
        Ok(Some(self.install_fetched(key, generation, value)))
    }

    fn install_fetched(&self, key: &QueryKey, generation: u64, value: Value) -> Value {
        let installed = {
            let mut inner = self.lock();
            let state = inner.keys.entry(key.clone()).or_default();
            if state.generation != generation || !state.in_flight.is_empty() {
                log::debug!("Discarding fetched {}: a mutation began while it was loading", key);
                Err(state.entry.as_ref().map(|e| e.value.clone()).unwrap_or(value))
            } else {
                state.entry = Some(CachedQueryResult::fresh(value.clone()));
                Ok(value)
            }
        };

        match installed {
            Ok(value) => {
                self.emit(key.clone(), CacheEventKind::Updated);
                value
            }
            Err(current) => current,
        }
    }

    pub fn spawn_refetch(&self, key: QueryKey) {
        if tokio::runtime::Handle::try_current().is_err() {
            log::warn!("No async runtime; {} stays stale until its next read", key);
            return;
        }
        let cache = self.clone();
        tokio::spawn(async move {
            if let Err(e) = cache.refetch(&key).await {
                log::warn!("Background refetch of {} failed: {}", key, e);
            }
        });
    }

    pub(crate) fn schedule_refetch(&self, keys: Vec<QueryKey>) {
        if !self.config.auto_refetch {
            return;
        }
        for key in keys {
            self.spawn_refetch(key);
        }
    }

    /// Drops entries idle for longer than the gc window. Keys held by a mutation are kept.
    pub fn collect_garbage(&self) -> usize {
        let gc_window = self.config.gc_window;
        let now = Utc::now();
        let removed: Vec<QueryKey> = {
            let mut inner = self.lock();
            let expired: Vec<QueryKey> = inner
                .keys
                .iter()
                .filter(|(_, s)| s.in_flight.is_empty())
                .filter(|(_, s)| match &s.entry {
                    Some(entry) => {
                        (now - entry.last_accessed).to_std().is_ok_and(|idle| idle > gc_window)
                    }
                    None => true,
                })
                .map(|(k, _)| k.clone())
                .collect();
            expired
                .into_iter()
                .filter(|k| inner.keys.remove(k).is_some_and(|s| s.entry.is_some()))
                .collect()
        };

        if !removed.is_empty() {
            log::debug!("Garbage collected {} idle queries", removed.len());
        }
        let count = removed.len();
        for key in removed {
            self.emit(key, CacheEventKind::Removed);
        }
        count
    }

    /// Runs [`QueryCache::collect_garbage`] periodically. Returns `None` outside a runtime.
    pub fn spawn_gc(&self) -> Option<JoinHandle<()>> {
        if tokio::runtime::Handle::try_current().is_err() {
            log::warn!("No async runtime; idle queries are only collected on demand");
            return None;
        }
        let cache = self.clone();
        let period = (self.config.gc_window / 2).max(Duration::from_secs(1));
        Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                cache.collect_garbage();
            }
        }))
    }

    /// Snapshots every affected key and installs the optimistic values.
    ///
    /// All updaters run against copies first, so an updater failure leaves the cache untouched.
    pub(crate) fn begin_mutation(
        &self,
        mutation_id: Uuid,
        label: &'static str,
        steps: &[PlanStep],
    ) -> Result<MutationTicket, ClientError> {
        let mut updated = Vec::new();
        let ticket = {
            let mut inner = self.lock();

            let mut planned: Vec<(QueryKey, Vec<&PlanStep>)> = Vec::new();
            for step in steps {
                let keys: Vec<QueryKey> = match &step.target {
                    Target::Key(key) => vec![key.clone()],
                    Target::Entity(entity) => {
                        let mut keys: Vec<QueryKey> = inner
                            .keys
                            .iter()
                            .filter(|(k, s)| k.entity() == entity && s.entry.is_some())
                            .map(|(k, _)| k.clone())
                            .collect();
                        keys.sort();
                        keys
                    }
                };
                for key in keys {
                    let idx = match planned.iter().position(|(k, _)| *k == key) {
                        Some(idx) => idx,
                        None => {
                            planned.push((key, Vec::new()));
                            planned.len() - 1
                        }
                    };
                    planned[idx].1.push(step);
                }
            }

            let mut installs: Vec<Option<Value>> = Vec::with_capacity(planned.len());
            for (key, key_steps) in &planned {
                let current = inner.keys.get(key).and_then(|s| s.entry.as_ref());
                let updaters: Vec<_> =
                    key_steps.iter().filter_map(|s| s.updater.as_ref()).collect();
                let next = match current {
                    Some(entry) if !updaters.is_empty() => {
                        let mut value = entry.value.clone();
                        for update in updaters {
                            (**update)(&mut value)?;
                        }
                        Some(value)
                    }
                    _ => None,
                };
                installs.push(next);
            }

            let now = Utc::now();
            let mut ticket = MutationTicket { id: mutation_id, label, keys: Vec::new() };
            for ((key, key_steps), next) in planned.into_iter().zip(installs) {
                let updaters = key_steps.iter().filter_map(|s| s.updater.clone()).collect();
                let state = inner.keys.entry(key.clone()).or_default();
                state.generation += 1;
                state.in_flight.push(InFlight {
                    mutation_id,
                    generation: state.generation,
                    snapshot: state.entry.clone(),
                    updaters,
                });
                if let (Some(entry), Some(value)) = (state.entry.as_mut(), next) {
                    entry.value = value;
                    entry.last_accessed = now;
                    updated.push(key.clone());
                }
                ticket.keys.push((key, state.generation));
            }
            ticket
        };

        for key in updated {
            self.emit(key, CacheEventKind::Updated);
        }
        Ok(ticket)
    }

    /// Marks every key of a successful mutation stale. Returns keys ready for a refetch.
    pub(crate) fn settle_mutation(&self, ticket: &MutationTicket) -> Vec<QueryKey> {
        let mut invalidated = Vec::new();
        let mut ready = Vec::new();
        {
            let mut inner = self.lock();
            for (key, generation) in &ticket.keys {
                let Some(state) = inner.keys.get_mut(key) else { continue };
                if state.take_record(ticket.id).is_none() {
                    continue;
                }
                let superseded = state.settled_generation > *generation
                    || state.in_flight.iter().any(|r| r.generation > *generation);
                if superseded {
                    log::debug!(
                        "{} settled on {} after a newer mutation; reconciling instead",
                        ticket.label,
                        key
                    );
                }
                state.settled_generation = state.settled_generation.max(*generation);
                if state.mark_stale() {
                    invalidated.push(key.clone());
                }
                if state.ready_for_refetch() {
                    ready.push(key.clone());
                }
            }
        }

        for key in invalidated {
            self.emit(key, CacheEventKind::Invalidated);
        }
        ready
    }

    /// Undoes a failed mutation on every key it touched. Returns keys ready for a refetch.
    ///
    /// When newer mutations are still pending on a key, they are replayed on this one's
    /// snapshot so the failed change disappears at once. If a newer mutation already settled,
    /// or a replay does not apply, the next pending mutation inherits the snapshot and the key
    /// waits for reconciliation.
    pub(crate) fn rollback_mutation(&self, ticket: &MutationTicket) -> Vec<QueryKey> {
        let mut restored = Vec::new();
        let mut invalidated = Vec::new();
        let mut ready = Vec::new();
        {
            let mut inner = self.lock();
            let now = Utc::now();
            for (key, generation) in &ticket.keys {
                let Some(state) = inner.keys.get_mut(key) else { continue };
                let Some(record) = state.take_record(ticket.id) else { continue };

                let has_newer = state.in_flight.iter().any(|r| r.generation > *generation);
                let replayed = has_newer
                    && state.settled_generation < *generation
                    && record
                        .snapshot
                        .as_ref()
                        .is_some_and(|base| state.replay_newer(*generation, base));

                match has_newer {
                    true if replayed => {
                        restored.push(key.clone());
                        if state.mark_stale() {
                            invalidated.push(key.clone());
                        }
                    }
                    true => {
                        let next = state
                            .in_flight
                            .iter_mut()
                            .filter(|r| r.generation > *generation)
                            .min_by_key(|r| r.generation);
                        if let Some(next) = next {
                            next.snapshot = record.snapshot;
                        }
                        if state.mark_stale() {
                            invalidated.push(key.clone());
                        }
                    }
                    false if state.settled_generation > *generation => {
                        if state.mark_stale() {
                            invalidated.push(key.clone());
                        }
                    }
                    false => {
                        let was_stale = state.entry.as_ref().is_some_and(|e| e.stale);
                        state.entry = record.snapshot.map(|mut snapshot| {
                            snapshot.stale |= was_stale;
                            snapshot.last_accessed = now;
                            snapshot
                        });
                        restored.push(key.clone());
                    }
                }

                if state.ready_for_refetch() {
                    ready.push(key.clone());
                }
            }
        }

        for key in restored {
            log::debug!("Restored {} from snapshot", key);
            self.emit(key, CacheEventKind::Updated);
        }
        for key in invalidated {
            self.emit(key, CacheEventKind::Invalidated);
        }
        ready
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn key(id: &str) -> QueryKey {
        QueryKey::new("startup").param("id", id)
    }

    fn counting_fetcher(calls: Arc<AtomicUsize>, value: Value) -> Fetcher {
        fetcher(move || {
            let calls = calls.clone();
            let value = value.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(value)
            }
        })
    }

    #[tokio::test]
    async fn fresh_entries_are_served_from_cache() {
        let cache = QueryCache::default();
        let calls = Arc::new(AtomicUsize::new(0));
        let f = counting_fetcher(calls.clone(), json!({ "n": 1 }));

        assert_eq!(cache.fetch_query(key("a"), f.clone()).await.unwrap(), json!({ "n": 1 }));
        assert_eq!(cache.fetch_query(key("a"), f.clone()).await.unwrap(), json!({ "n": 1 }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        cache.invalidate(&key("a"));
        assert!(cache.is_stale(&key("a")));
        cache.fetch_query(key("a"), f).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(!cache.is_stale(&key("a")));
    }

    #[tokio::test]
    async fn zero_stale_time_always_refetches() {
        let cache = QueryCache::new(CacheConfig {
            stale_time: Duration::ZERO,
            auto_refetch: false,
            ..Default::default()
        });
        let calls = Arc::new(AtomicUsize::new(0));
        let f = counting_fetcher(calls.clone(), json!(1));
        cache.fetch_query(key("a"), f.clone()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        cache.fetch_query(key("a"), f).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn subscribers_see_updates_and_invalidations() {
        let cache = QueryCache::new(CacheConfig { auto_refetch: false, ..Default::default() });
        let mut events = cache.subscribe();

        cache.set(key("a"), json!(1));
        cache.invalidate(&key("a"));
        cache.remove(&key("a"));

        let kinds: Vec<CacheEventKind> = (0..3).map(|_| events.try_recv().unwrap().kind).collect();
        assert_eq!(
            kinds,
            vec![CacheEventKind::Updated, CacheEventKind::Invalidated, CacheEventKind::Removed]
        );
        assert!(!cache.invalidate(&key("missing")));
    }

    #[tokio::test]
    async fn invalidating_an_entity_hits_every_parameter_set() {
        let cache = QueryCache::new(CacheConfig { auto_refetch: false, ..Default::default() });
        cache.set(QueryKey::new("startups"), json!([]));
        cache.set(QueryKey::new("startups").param("category", "ai"), json!([]));
        cache.set(key("a"), json!({}));

        let hit = cache.invalidate_entity("startups");
        assert_eq!(hit.len(), 2);
        assert!(!cache.is_stale(&key("a")));
    }

    #[test]
    fn gc_is_not_spawned_without_a_runtime() {
        assert!(QueryCache::default().spawn_gc().is_none());
    }

    #[tokio::test]
    async fn idle_entries_are_collected() {
        let cache = QueryCache::new(CacheConfig {
            gc_window: Duration::from_millis(10),
            auto_refetch: false,
            ..Default::default()
        });
        cache.set(key("old"), json!(1));
        tokio::time::sleep(Duration::from_millis(30)).await;
        cache.set(key("new"), json!(2));

        assert_eq!(cache.collect_garbage(), 1);
        assert_eq!(cache.keys(), vec![key("new")]);
    }

    #[tokio::test]
    async fn fetch_started_before_a_mutation_is_discarded() {
        let cache = QueryCache::new(CacheConfig {
            stale_time: Duration::ZERO,
            auto_refetch: false,
            ..Default::default()
        });
        cache.set(key("a"), json!({ "v": "server-old" }));
        tokio::time::sleep(Duration::from_millis(2)).await;

        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();
        let release_rx = Arc::new(tokio::sync::Mutex::new(Some(release_rx)));
        let slow = fetcher(move || {
            let release_rx = release_rx.clone();
            async move {
                if let Some(rx) = release_rx.lock().await.take() {
                    let _ = rx.await;
                }
                Ok(json!({ "v": "server-late" }))
            }
        });

        let loading = tokio::spawn({
            let cache = cache.clone();
            async move { cache.fetch_query(key("a"), slow).await }
        });
        tokio::task::yield_now().await;

        let steps = vec![PlanStep::replace(Target::Key(key("a")), json!({ "v": "optimistic" }))];
        let ticket = cache.begin_mutation(Uuid::now_v7(), "test", &steps).unwrap();
        release_tx.send(()).unwrap();

        let returned = loading.await.unwrap().unwrap();
        assert_eq!(returned, json!({ "v": "optimistic" }));
        assert_eq!(cache.get(&key("a")), Some(json!({ "v": "optimistic" })));

        cache.rollback_mutation(&ticket);
        assert_eq!(cache.get(&key("a")), Some(json!({ "v": "server-old" })));
    }

    #[tokio::test]
    async fn pending_mutations_block_collection() {
        let cache = QueryCache::new(CacheConfig {
            gc_window: Duration::ZERO,
            auto_refetch: false,
            ..Default::default()
        });
        cache.set(key("a"), json!(1));
        let steps = vec![PlanStep::replace(Target::Key(key("a")), json!(2))];
        let ticket = cache.begin_mutation(Uuid::now_v7(), "test", &steps).unwrap();
        tokio::time::sleep(Duration::from_millis(2)).await;

        assert_eq!(cache.collect_garbage(), 0);
        assert_eq!(cache.pending_mutations(&key("a")), 1);
        cache.settle_mutation(&ticket);
        assert!(cache.is_stale(&key("a")));
    }
}
