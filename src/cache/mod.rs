//! Query cache - the last known server result per query shape, shared by
//! every observer.
//!
//! Values are stored type-erased as `Arc<serde_json::Value>` and decoded on
//! read. Writes swap the `Arc`, so a value handed to one observer is never
//! mutated underneath it.
//!
//! ## Example
//!
//! ```
//! use optimistic_ledger::{
//!     Branch, BranchDraft, EntityKind, InMemoryBackend, QueryCache, QueryKey, ResourceApi,
//! };
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let backend = InMemoryBackend::new();
//! let harbor = backend.seed_branch(BranchDraft::new("Harbor"))?;
//! let cache = QueryCache::default();
//! let key = QueryKey::detail(EntityKind::Branch, &harbor.id);
//!
//! // Concurrent callers for the same key share one request.
//! let (api, id) = (backend.clone(), harbor.id.clone());
//! let branch: Branch = cache
//!     .query(&key, move || async move { ResourceApi::<Branch>::get(&api, &id).await })
//!     .await?;
//! assert_eq!(branch.name, "Harbor");
//!
//! // Mark every branch detail stale; the next read refetches.
//! cache.invalidate(&QueryKey::details(EntityKind::Branch))?;
//! assert!(cache.is_stale(&key)?);
//! # Ok(())
//! # }
//! ```

mod entry;
mod key;
mod observer;
mod query_cache;

use thiserror::Error;

use crate::remote::RemoteError;

pub use entry::{CachedValue, EntryState};
pub use key::{filter_signature, Aggregate, EntityKind, QueryKey};
pub use observer::Observer;
pub use query_cache::QueryCache;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    #[error("cache lock poisoned during {0}")]
    LockPoisoned(&'static str),
    #[error("cache serialization error: {0}")]
    Serde(String),
    #[error(transparent)]
    Fetch(#[from] RemoteError),
}

/// Change notification broadcast to observers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheEvent {
    /// Data replaced, by a fetch or a write.
    Updated(QueryKey),
    /// Marked stale; the next read refetches.
    Invalidated(QueryKey),
    /// Data dropped or entry evicted.
    Removed(QueryKey),
}

impl CacheEvent {
    pub fn key(&self) -> &QueryKey {
        match self {
            CacheEvent::Updated(key) | CacheEvent::Invalidated(key) | CacheEvent::Removed(key) => {
                key
            }
        }
    }
}
