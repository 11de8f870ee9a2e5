use std::sync::Arc;
use std::time::Duration;

use futures_util::future::{BoxFuture, Shared};
use serde_json::Value;
use tokio::time::Instant;

use crate::remote::RemoteError;

/// Shared, immutable cached value.
pub type CachedValue = Arc<Value>;

pub(crate) type FetchFuture = Shared<BoxFuture<'static, Result<CachedValue, RemoteError>>>;

/// The single request allowed in flight for a key.
pub(crate) struct Inflight {
    pub(crate) generation: u64,
    pub(crate) future: FetchFuture,
}

pub(crate) struct CacheEntry {
    pub(crate) data: Option<CachedValue>,
    /// Last time a fetch (not a write) delivered data.
    pub(crate) fetched_at: Option<Instant>,
    pub(crate) updated_at: Instant,
    pub(crate) invalidated: bool,
    /// Bumped when a fetch starts and whenever in-flight results must be discarded.
    pub(crate) generation: u64,
    pub(crate) inflight: Option<Inflight>,
    pub(crate) observers: usize,
    /// Pending optimistic mutations that wrote this key.
    pub(crate) holds: usize,
}

impl CacheEntry {
    pub(crate) fn new(now: Instant) -> Self {
        CacheEntry {
            data: None,
            fetched_at: None,
            updated_at: now,
            invalidated: false,
            generation: 0,
            inflight: None,
            observers: 0,
            holds: 0,
        }
    }

    pub(crate) fn is_stale(&self, now: Instant, stale_time: Duration) -> bool {
        if self.invalidated {
            return true;
        }
        match self.fetched_at {
            Some(at) => now.saturating_duration_since(at) >= stale_time,
            None => true,
        }
    }

    /// Data that may be returned without a fetch. While a mutation holds the
    /// key its optimistic value is served as-is, so a read cannot clobber it.
    pub(crate) fn servable(&self, now: Instant, stale_time: Duration) -> Option<CachedValue> {
        let data = self.data.as_ref()?;
        if self.holds > 0 || !self.is_stale(now, stale_time) {
            Some(Arc::clone(data))
        } else {
            None
        }
    }

    pub(crate) fn collectable(&self, now: Instant, stale_time: Duration, gc_time: Duration) -> bool {
        if self.observers > 0 || self.holds > 0 || self.inflight.is_some() {
            return false;
        }
        let last = self.fetched_at.unwrap_or(self.updated_at);
        now.saturating_duration_since(last) >= stale_time.saturating_add(gc_time)
    }

    pub(crate) fn state(&self, now: Instant, stale_time: Duration) -> EntryState {
        EntryState {
            data: self.data.clone(),
            fetched_at: self.fetched_at,
            stale: self.is_stale(now, stale_time),
            fetching: self.inflight.is_some(),
            observers: self.observers,
            held: self.holds > 0,
        }
    }
}

/// Point-in-time view of one entry, for inspection and tests.
#[derive(Debug, Clone, PartialEq)]
pub struct EntryState {
    pub data: Option<CachedValue>,
    pub fetched_at: Option<Instant>,
    pub stale: bool,
    pub fetching: bool,
    pub observers: usize,
    pub held: bool,
}
