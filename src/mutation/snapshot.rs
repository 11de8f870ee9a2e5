use std::collections::BTreeMap;

use crate::cache::{CacheError, CachedValue, QueryCache, QueryKey};

/// Data of every key a mutation touches, captured before the optimistic
/// write. `None` records that the key held no data.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MutationSnapshot {
    entries: BTreeMap<QueryKey, Option<CachedValue>>,
}

impl MutationSnapshot {
    pub fn capture(cache: &QueryCache, keys: &[QueryKey]) -> Result<Self, CacheError> {
        let mut entries = BTreeMap::new();
        for key in keys {
            if !entries.contains_key(key) {
                entries.insert(key.clone(), cache.peek(key)?);
            }
        }
        Ok(MutationSnapshot { entries })
    }

    /// Write every captured value back, removing keys that had no data.
    pub fn restore(&self, cache: &QueryCache) -> Result<(), CacheError> {
        for (key, data) in &self.entries {
            cache.restore(key, data.clone())?;
        }
        Ok(())
    }

    pub fn keys(&self) -> impl Iterator<Item = &QueryKey> {
        self.entries.keys()
    }

    pub fn get(&self, key: &QueryKey) -> Option<&Option<CachedValue>> {
        self.entries.get(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
