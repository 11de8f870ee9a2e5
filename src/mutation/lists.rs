//! Optimistic edits of cached list pages.
//!
//! Only pages already in the cache are touched. A page whose key cannot be
//! decoded back into a list query is left alone; the invalidation after the
//! mutation settles corrects it.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::cache::{CacheError, EntityKind, QueryCache, QueryKey};
use crate::ledger::{Obligation, ObligationFilter};
use crate::remote::{ListQuery, Page, PageMeta};
use crate::resource::{Branch, BranchFilter, InventoryFilter, InventoryItem, Resource};

/// A record that appears in filtered, paginated list views.
pub trait ListedRecord: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    type Filter: DeserializeOwned;

    fn record_id(&self) -> &str;

    fn in_filter(&self, filter: &Self::Filter) -> bool;
}

impl ListedRecord for Obligation {
    type Filter = ObligationFilter;

    fn record_id(&self) -> &str {
        &self.id
    }

    fn in_filter(&self, filter: &ObligationFilter) -> bool {
        filter.matches(self)
    }
}

impl ListedRecord for Branch {
    type Filter = BranchFilter;

    fn record_id(&self) -> &str {
        self.id()
    }

    fn in_filter(&self, filter: &BranchFilter) -> bool {
        self.matches(filter)
    }
}

impl ListedRecord for InventoryItem {
    type Filter = InventoryFilter;

    fn record_id(&self) -> &str {
        self.id()
    }

    fn in_filter(&self, filter: &InventoryFilter) -> bool {
        self.matches(filter)
    }
}

/// Cached list pages of `kind`.
pub(crate) fn list_keys(cache: &QueryCache, kind: EntityKind) -> Result<Vec<QueryKey>, CacheError> {
    cache.keys_with_prefix(&QueryKey::lists(kind))
}

fn edit_pages<T, F>(cache: &QueryCache, kind: EntityKind, mut edit: F) -> Result<(), CacheError>
where
    T: ListedRecord,
    F: FnMut(&ListQuery<T::Filter>, &mut Page<T>) -> bool,
{
    for key in list_keys(cache, kind)? {
        let Some(query) = key.list_query::<ListQuery<T::Filter>>() else {
            continue;
        };
        let Some(mut page) = cache.get::<Page<T>>(&key)? else {
            continue;
        };
        if edit(&query, &mut page) {
            cache.set(&key, &page)?;
        }
    }
    Ok(())
}

fn resize(meta: &PageMeta, total: u64) -> PageMeta {
    PageMeta::new(meta.page, meta.limit, total)
}

/// Count `record` into every list whose filter it matches; first pages also
/// show it at the top.
pub(crate) fn prepend<T: ListedRecord>(
    cache: &QueryCache,
    kind: EntityKind,
    record: &T,
) -> Result<(), CacheError> {
    edit_pages::<T, _>(cache, kind, |query, page| {
        if !record.in_filter(&query.filter) {
            return false;
        }
        if page.meta.page <= 1 {
            page.items.insert(0, record.clone());
            page.items.truncate(page.meta.limit as usize);
        }
        page.meta = resize(&page.meta, page.meta.total + 1);
        true
    })
}

/// Replace the record with `id` by `next` wherever it is listed. A page whose
/// filter `next` no longer matches drops it.
pub(crate) fn replace<T: ListedRecord>(
    cache: &QueryCache,
    kind: EntityKind,
    id: &str,
    next: &T,
) -> Result<(), CacheError> {
    edit_pages::<T, _>(cache, kind, |query, page| {
        let Some(index) = page.items.iter().position(|item| item.record_id() == id) else {
            return false;
        };
        if next.in_filter(&query.filter) {
            page.items[index] = next.clone();
        } else {
            page.items.remove(index);
            page.meta = resize(&page.meta, page.meta.total.saturating_sub(1));
        }
        true
    })
}

pub(crate) fn remove<T: ListedRecord>(
    cache: &QueryCache,
    kind: EntityKind,
    id: &str,
) -> Result<(), CacheError> {
    edit_pages::<T, _>(cache, kind, |_, page| {
        let before = page.items.len();
        page.items.retain(|item| item.record_id() != id);
        if page.items.len() == before {
            return false;
        }
        page.meta = resize(&page.meta, page.meta.total.saturating_sub(1));
        true
    })
}

/// First copy of the record with `id` found in the detail entry or any list.
pub(crate) fn find<T: ListedRecord>(
    cache: &QueryCache,
    kind: EntityKind,
    id: &str,
) -> Result<Option<T>, CacheError> {
    if let Some(record) = cache.get::<T>(&QueryKey::detail(kind, id))? {
        return Ok(Some(record));
    }
    for key in list_keys(cache, kind)? {
        if let Some(page) = cache.get::<Page<T>>(&key)? {
            if let Some(record) = page.items.into_iter().find(|item| item.record_id() == id) {
                return Ok(Some(record));
            }
        }
    }
    Ok(None)
}
