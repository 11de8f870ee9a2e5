use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};

use super::{CacheError, CacheEvent, CachedValue, QueryCache, QueryKey};

/// Interest in one cache key. Keeps the entry from being garbage collected
/// and delivers change notifications for that key only.
pub struct Observer {
    key: QueryKey,
    cache: QueryCache,
    events: broadcast::Receiver<CacheEvent>,
}

impl Observer {
    pub(crate) fn new(
        key: QueryKey,
        cache: QueryCache,
        events: broadcast::Receiver<CacheEvent>,
    ) -> Self {
        Observer { key, cache, events }
    }

    pub fn key(&self) -> &QueryKey {
        &self.key
    }

    pub fn current(&self) -> Result<Option<CachedValue>, CacheError> {
        self.cache.peek(&self.key)
    }

    /// Wait for the next change to this key. `None` once the cache is gone.
    ///
    /// If notifications were dropped because the receiver lagged, an
    /// `Updated` event is synthesised so the caller re-reads.
    pub async fn changed(&mut self) -> Option<CacheEvent> {
        loop {
            match self.events.recv().await {
                Ok(event) if event.key() == &self.key => return Some(event),
                Ok(_) => continue,
                Err(RecvError::Lagged(_)) => return Some(CacheEvent::Updated(self.key.clone())),
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Non-blocking variant of [`changed`](Self::changed).
    pub fn try_changed(&mut self) -> Option<CacheEvent> {
        loop {
            match self.events.try_recv() {
                Ok(event) if event.key() == &self.key => return Some(event),
                Ok(_) => continue,
                Err(TryRecvError::Lagged(_)) => {
                    return Some(CacheEvent::Updated(self.key.clone()))
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return None,
            }
        }
    }
}

impl Drop for Observer {
    fn drop(&mut self) {
        let _ = self.cache.release_observer(&self.key);
    }
}
