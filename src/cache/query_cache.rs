use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use futures_util::{FutureExt, TryFutureExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use super::entry::{CacheEntry, CachedValue, EntryState, Inflight};
use super::{CacheError, CacheEvent, Observer, QueryKey};
use crate::config::CacheConfig;
use crate::remote::RemoteError;

const EVENT_CAPACITY: usize = 256;

/// Process-wide (or per-test) store of fetched query results.
///
/// Clone-friendly: clones share the same entries, like the in-memory stores
/// elsewhere in this crate. Locks are only taken for the synchronous part of
/// each operation and never held across an `.await`.
#[derive(Clone)]
pub struct QueryCache {
    entries: Arc<RwLock<HashMap<QueryKey, CacheEntry>>>,
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
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            events,
            config,
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Receive every change notification, for all keys.
    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.events.subscribe()
    }

    fn read_entries(
        &self,
        operation: &'static str,
    ) -> Result<RwLockReadGuard<'_, HashMap<QueryKey, CacheEntry>>, CacheError> {
        self.entries
            .read()
            .map_err(|_| CacheError::LockPoisoned(operation))
    }

    fn write_entries(
        &self,
        operation: &'static str,
    ) -> Result<RwLockWriteGuard<'_, HashMap<QueryKey, CacheEntry>>, CacheError> {
        self.entries
            .write()
            .map_err(|_| CacheError::LockPoisoned(operation))
    }

    fn emit(&self, events: Vec<CacheEvent>) {
        for event in events {
            // No receivers is not an error.
            let _ = self.events.send(event);
        }
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Return the cached value when it is fresh, otherwise fetch it.
    ///
    /// At most one request per key is in flight: a caller arriving while a
    /// fetch is outstanding awaits that fetch instead of calling `fetcher`.
    /// A result whose generation was superseded (by [`cancel`](Self::cancel)
    /// or [`invalidate`](Self::invalidate)) is discarded, and the caller gets
    /// whatever the cache holds now.
    pub async fn fetch<F, Fut>(&self, key: &QueryKey, fetcher: F) -> Result<CachedValue, CacheError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Value, RemoteError>> + Send + 'static,
    {
        let (generation, future) = {
            let mut entries = self.write_entries("fetch")?;
            let now = Instant::now();
            let entry = entries
                .entry(key.clone())
                .or_insert_with(|| CacheEntry::new(now));

            if let Some(data) = entry.servable(now, self.config.stale_time) {
                trace!(%key, "cache hit");
                return Ok(data);
            }

            match &entry.inflight {
                Some(inflight) => {
                    drop(fetcher);
                    debug!(%key, generation = inflight.generation, "joining in-flight fetch");
                    (inflight.generation, inflight.future.clone())
                }
                None => {
                    entry.generation += 1;
                    let future = fetcher().map_ok(Arc::new).boxed().shared();
                    entry.inflight = Some(Inflight {
                        generation: entry.generation,
                        future: future.clone(),
                    });
                    debug!(%key, generation = entry.generation, "fetch started");
                    (entry.generation, future)
                }
            }
        };

        let result = future.await;
        self.settle_fetch(key, generation, result)
    }

    fn settle_fetch(
        &self,
        key: &QueryKey,
        generation: u64,
        result: Result<CachedValue, RemoteError>,
    ) -> Result<CachedValue, CacheError> {
        let mut events = Vec::new();
        let outcome = {
            let mut entries = self.write_entries("fetch settle")?;
            match entries.get_mut(key) {
                None => result.map_err(CacheError::from),
                Some(entry) => {
                    let owns = entry
                        .inflight
                        .as_ref()
                        .is_some_and(|inflight| inflight.generation == generation);
                    if owns {
                        entry.inflight = None;
                        match result {
                            Ok(data) => {
                                let now = Instant::now();
                                entry.data = Some(Arc::clone(&data));
                                entry.fetched_at = Some(now);
                                entry.updated_at = now;
                                entry.invalidated = false;
                                events.push(CacheEvent::Updated(key.clone()));
                                Ok(data)
                            }
                            Err(err) => {
                                warn!(%key, error = %err, "fetch failed");
                                Err(err.into())
                            }
                        }
                    } else if entry.generation == generation {
                        // Another waiter on the same request already stored it.
                        result.map_err(CacheError::from)
                    } else {
                        debug!(
                            %key,
                            generation,
                            current = entry.generation,
                            "discarding superseded fetch result"
                        );
                        match &entry.data {
                            Some(data) => Ok(Arc::clone(data)),
                            None => result.map_err(CacheError::from),
                        }
                    }
                }
            }
        };
        self.emit(events);
        outcome
    }

    /// Typed [`fetch`](Self::fetch): the fetcher returns a domain value which
    /// is stored serialized and decoded again for the caller.
    pub async fn query<T, F, Fut>(&self, key: &QueryKey, fetcher: F) -> Result<T, CacheError>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, RemoteError>> + Send + 'static,
    {
        let value = self
            .fetch(key, move || {
                let request = fetcher();
                async move {
                    let fetched = request.await?;
                    serde_json::to_value(fetched).map_err(|e| RemoteError::Decode(e.to_string()))
                }
            })
            .await?;
        decode(&value)
    }

    /// Current data, fresh or not, without fetching.
    pub fn peek(&self, key: &QueryKey) -> Result<Option<CachedValue>, CacheError> {
        let entries = self.read_entries("peek")?;
        Ok(entries.get(key).and_then(|entry| entry.data.clone()))
    }

    /// Typed [`peek`](Self::peek).
    pub fn get<T: DeserializeOwned>(&self, key: &QueryKey) -> Result<Option<T>, CacheError> {
        match self.peek(key)? {
            Some(value) => decode(&value).map(Some),
            None => Ok(None),
        }
    }

    /// A missing entry counts as stale.
    pub fn is_stale(&self, key: &QueryKey) -> Result<bool, CacheError> {
        let entries = self.read_entries("is_stale")?;
        Ok(entries
            .get(key)
            .map_or(true, |entry| entry.is_stale(Instant::now(), self.config.stale_time)))
    }

    pub fn entry_state(&self, key: &QueryKey) -> Result<Option<EntryState>, CacheError> {
        let entries = self.read_entries("entry_state")?;
        Ok(entries
            .get(key)
            .map(|entry| entry.state(Instant::now(), self.config.stale_time)))
    }

    /// Keys starting with `prefix` that currently hold data, in key order.
    pub fn keys_with_prefix(&self, prefix: &QueryKey) -> Result<Vec<QueryKey>, CacheError> {
        let entries = self.read_entries("keys_with_prefix")?;
        let mut keys: Vec<QueryKey> = entries
            .iter()
            .filter(|(key, entry)| entry.data.is_some() && key.starts_with(prefix))
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        Ok(keys)
    }

    /// Every key holding data, with its value. Used to compare whole-cache states.
    pub fn dump(&self) -> Result<BTreeMap<QueryKey, CachedValue>, CacheError> {
        let entries = self.read_entries("dump")?;
        Ok(entries
            .iter()
            .filter_map(|(key, entry)| entry.data.clone().map(|data| (key.clone(), data)))
            .collect())
    }

    pub fn len(&self) -> Result<usize, CacheError> {
        Ok(self.read_entries("len")?.len())
    }

    pub fn is_empty(&self) -> Result<bool, CacheError> {
        Ok(self.len()? == 0)
    }

    // ========================================================================
    // Writes
    // ========================================================================

    /// Replace a key's data. The freshness timestamp is left alone, so a
    /// written value never postpones the next real fetch.
    pub fn write(&self, key: &QueryKey, data: CachedValue) -> Result<(), CacheError> {
        self.store(key, data, false)
    }

    /// Replace a key's data and mark it freshly fetched.
    pub fn write_fresh(&self, key: &QueryKey, data: CachedValue) -> Result<(), CacheError> {
        self.store(key, data, true)
    }

    fn store(&self, key: &QueryKey, data: CachedValue, fresh: bool) -> Result<(), CacheError> {
        {
            let mut entries = self.write_entries("write")?;
            let now = Instant::now();
            let entry = entries
                .entry(key.clone())
                .or_insert_with(|| CacheEntry::new(now));
            entry.data = Some(data);
            entry.updated_at = now;
            if fresh {
                entry.fetched_at = Some(now);
                entry.invalidated = false;
            }
        }
        trace!(%key, fresh, "cache write");
        self.emit(vec![CacheEvent::Updated(key.clone())]);
        Ok(())
    }

    /// Typed [`write`](Self::write).
    pub fn set<T: Serialize>(&self, key: &QueryKey, value: &T) -> Result<(), CacheError> {
        self.write(key, encode(value)?)
    }

    /// Typed [`write_fresh`](Self::write_fresh).
    pub fn set_fresh<T: Serialize>(&self, key: &QueryKey, value: &T) -> Result<(), CacheError> {
        self.write_fresh(key, encode(value)?)
    }

    /// Read-modify-write of a typed value under one lock acquisition.
    /// Returns `false` when the key holds no data.
    pub fn update<T, F>(&self, key: &QueryKey, f: F) -> Result<bool, CacheError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce(T) -> T,
    {
        {
            let mut entries = self.write_entries("update")?;
            let Some(entry) = entries.get_mut(key) else {
                return Ok(false);
            };
            let Some(current) = &entry.data else {
                return Ok(false);
            };
            let next = f(decode(current)?);
            entry.data = Some(encode(&next)?);
            entry.updated_at = Instant::now();
        }
        self.emit(vec![CacheEvent::Updated(key.clone())]);
        Ok(true)
    }

    /// Drop a key's data. The entry itself goes too unless it is observed or fetching.
    pub fn remove(&self, key: &QueryKey) -> Result<bool, CacheError> {
        let removed = {
            let mut entries = self.write_entries("remove")?;
            let Some(entry) = entries.get_mut(key) else {
                return Ok(false);
            };
            let had_data = entry.data.take().is_some();
            if entry.observers == 0 && entry.inflight.is_none() {
                entries.remove(key);
            }
            had_data
        };
        if removed {
            self.emit(vec![CacheEvent::Removed(key.clone())]);
        }
        Ok(removed)
    }

    /// Put back a previously captured value (`None` means "had no data").
    pub fn restore(&self, key: &QueryKey, data: Option<CachedValue>) -> Result<(), CacheError> {
        match data {
            Some(data) => self.write(key, data),
            None => self.remove(key).map(|_| ()),
        }
    }

    // ========================================================================
    // Staleness and cancellation
    // ========================================================================

    /// Mark every entry under `prefix` stale and discard fetches already in
    /// flight for them, since those may predate the change being reconciled.
    /// Idempotent. Returns the number of entries matched.
    pub fn invalidate(&self, prefix: &QueryKey) -> Result<usize, CacheError> {
        let mut events = Vec::new();
        {
            let mut entries = self.write_entries("invalidate")?;
            for (key, entry) in entries.iter_mut() {
                if !key.starts_with(prefix) {
                    continue;
                }
                entry.invalidated = true;
                if entry.inflight.take().is_some() {
                    entry.generation += 1;
                }
                events.push(CacheEvent::Invalidated(key.clone()));
            }
        }
        debug!(%prefix, matched = events.len(), "invalidated");
        let matched = events.len();
        self.emit(events);
        Ok(matched)
    }

    /// Abandon the in-flight fetch for `key`, if any. Its result will be
    /// discarded when it arrives. Returns whether a fetch was in flight.
    pub fn cancel(&self, key: &QueryKey) -> Result<bool, CacheError> {
        let mut entries = self.write_entries("cancel")?;
        let Some(entry) = entries.get_mut(key) else {
            return Ok(false);
        };
        entry.generation += 1;
        let cancelled = entry.inflight.take().is_some();
        if cancelled {
            debug!(%key, generation = entry.generation, "in-flight fetch cancelled");
        }
        Ok(cancelled)
    }

    /// [`cancel`](Self::cancel) every in-flight fetch under `prefix`.
    /// Returns the number of fetches abandoned.
    pub fn cancel_prefix(&self, prefix: &QueryKey) -> Result<usize, CacheError> {
        let mut entries = self.write_entries("cancel prefix")?;
        let mut cancelled = 0;
        for (key, entry) in entries.iter_mut() {
            if key.starts_with(prefix) && entry.inflight.take().is_some() {
                entry.generation += 1;
                cancelled += 1;
            }
        }
        if cancelled > 0 {
            debug!(%prefix, cancelled, "in-flight fetches cancelled");
        }
        Ok(cancelled)
    }

    pub(crate) fn hold(&self, key: &QueryKey) -> Result<(), CacheError> {
        let mut entries = self.write_entries("hold")?;
        let now = Instant::now();
        entries
            .entry(key.clone())
            .or_insert_with(|| CacheEntry::new(now))
            .holds += 1;
        Ok(())
    }

    pub(crate) fn release(&self, key: &QueryKey) -> Result<(), CacheError> {
        let mut entries = self.write_entries("release")?;
        if let Some(entry) = entries.get_mut(key) {
            entry.holds = entry.holds.saturating_sub(1);
            if entry.holds == 0
                && entry.data.is_none()
                && entry.observers == 0
                && entry.inflight.is_none()
            {
                entries.remove(key);
            }
        }
        Ok(())
    }

    // ========================================================================
    // Observers and lifecycle
    // ========================================================================

    /// Register interest in `key`. The entry is kept alive while the returned
    /// guard exists.
    pub fn observe(&self, key: &QueryKey) -> Result<Observer, CacheError> {
        {
            let mut entries = self.write_entries("observe")?;
            let now = Instant::now();
            entries
                .entry(key.clone())
                .or_insert_with(|| CacheEntry::new(now))
                .observers += 1;
        }
        Ok(Observer::new(key.clone(), self.clone(), self.events.subscribe()))
    }

    pub(crate) fn release_observer(&self, key: &QueryKey) -> Result<(), CacheError> {
        let mut entries = self.write_entries("release observer")?;
        if let Some(entry) = entries.get_mut(key) {
            entry.observers = entry.observers.saturating_sub(1);
        }
        Ok(())
    }

    /// Evict unobserved entries whose freshness window plus `gc_time` has
    /// elapsed. Returns the number evicted.
    pub fn collect_garbage(&self) -> Result<usize, CacheError> {
        let now = Instant::now();
        let evicted: Vec<QueryKey> = {
            let mut entries = self.write_entries("collect garbage")?;
            let victims: Vec<QueryKey> = entries
                .iter()
                .filter(|(_, entry)| {
                    entry.collectable(now, self.config.stale_time, self.config.gc_time)
                })
                .map(|(key, _)| key.clone())
                .collect();
            for key in &victims {
                entries.remove(key);
            }
            victims
        };
        if !evicted.is_empty() {
            debug!(evicted = evicted.len(), "garbage collected");
        }
        let count = evicted.len();
        self.emit(evicted.into_iter().map(CacheEvent::Removed).collect());
        Ok(count)
    }

    /// Drop every entry. In-flight fetches complete into the void.
    pub fn clear(&self) -> Result<(), CacheError> {
        let keys: Vec<QueryKey> = {
            let mut entries = self.write_entries("clear")?;
            entries.drain().map(|(key, _)| key).collect()
        };
        self.emit(keys.into_iter().map(CacheEvent::Removed).collect());
        Ok(())
    }
}

pub(crate) fn encode<T: Serialize>(value: &T) -> Result<CachedValue, CacheError> {
    serde_json::to_value(value)
        .map(Arc::new)
        .map_err(|e| CacheError::Serde(e.to_string()))
}

pub(crate) fn decode<T: DeserializeOwned>(value: &Value) -> Result<T, CacheError> {
    T::deserialize(value).map_err(|e| CacheError::Serde(e.to_string()))
}
