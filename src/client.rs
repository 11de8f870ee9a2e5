//! LedgerClient - read-through queries and optimistic mutations over one
//! cache instance and one remote.

use std::sync::Arc;

use tracing::debug;

use crate::cache::{Aggregate, CacheError, EntityKind, Observer, QueryCache, QueryKey};
use crate::config::CacheConfig;
use crate::error::MutationError;
use crate::ledger::{
    LedgerSummary, NewObligation, NewPayment, Obligation, ObligationFilter, ObligationKind,
    ObligationPatch, Payment,
};
use crate::mutation::{
    CreateObligation, CreateResource, DeleteObligation, DeleteResource, ListedRecord,
    MutationPipeline, RecordPayment, UpdateObligation, UpdateResource,
};
use crate::remote::{BranchComparisonRow, DashboardStats, LedgerApi, ListQuery, Page, ResourceApi};
use crate::resource::{Branch, BranchFilter, InventoryFilter, InventoryItem, Resource};

/// Client-side data layer for the ledger screens.
///
/// Every instance owns its own [`QueryCache`]; nothing is global, so tests
/// can run isolated clients side by side.
pub struct LedgerClient<A> {
    cache: QueryCache,
    pipeline: MutationPipeline<A>,
}

impl<A> Clone for LedgerClient<A> {
    fn clone(&self) -> Self {
        LedgerClient {
            cache: self.cache.clone(),
            pipeline: self.pipeline.clone(),
        }
    }
}

impl<A: LedgerApi + 'static> LedgerClient<A> {
    pub fn new(api: A, config: CacheConfig) -> Self {
        Self::with_cache(Arc::new(api), QueryCache::new(config))
    }

    pub fn with_cache(api: Arc<A>, cache: QueryCache) -> Self {
        LedgerClient {
            pipeline: MutationPipeline::new(api, cache.clone()),
            cache,
        }
    }

    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    pub fn pipeline(&self) -> &MutationPipeline<A> {
        &self.pipeline
    }

    pub fn api(&self) -> &Arc<A> {
        self.pipeline.api()
    }

    /// First page with the configured page size and an empty filter.
    pub fn first_page<F: Default>(&self) -> ListQuery<F> {
        ListQuery::first_page(self.cache.config().default_page_size)
    }

    pub fn observe(&self, key: &QueryKey) -> Result<Observer, CacheError> {
        self.cache.observe(key)
    }

    /// Evict unobserved expired entries and placeholder mappings past the
    /// same window. Returns the number of cache entries evicted.
    pub fn collect_garbage(&self) -> Result<usize, MutationError> {
        self.pipeline.pending().prune()?;
        Ok(self.cache.collect_garbage()?)
    }

    /// Teardown: drop every cached entry and every confirmed placeholder mapping.
    pub fn clear(&self) -> Result<(), MutationError> {
        let forgotten = self.pipeline.pending().forget_confirmed()?;
        debug!(forgotten, "client cache cleared");
        Ok(self.cache.clear()?)
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub async fn obligations(
        &self,
        kind: ObligationKind,
        query: &ListQuery<ObligationFilter>,
    ) -> Result<Page<Obligation>, CacheError> {
        let key = QueryKey::list(EntityKind::Obligation(kind), query)?;
        let api = Arc::clone(self.api());
        let query = query.clone();
        self.cache
            .query(&key, move || async move {
                api.list_obligations(kind, &query).await
            })
            .await
    }

    pub async fn obligation(&self, kind: ObligationKind, id: &str) -> Result<Obligation, CacheError> {
        let key = QueryKey::detail(EntityKind::Obligation(kind), id);
        let api = Arc::clone(self.api());
        let id = id.to_string();
        self.cache
            .query(&key, move || async move { api.get_obligation(kind, &id).await })
            .await
    }

    pub async fn payments(
        &self,
        kind: ObligationKind,
        obligation_id: &str,
    ) -> Result<Vec<Payment>, CacheError> {
        let key = QueryKey::payments(kind, obligation_id);
        let api = Arc::clone(self.api());
        let id = obligation_id.to_string();
        self.cache
            .query(&key, move || async move { api.list_payments(kind, &id).await })
            .await
    }

    pub async fn summary(&self, kind: ObligationKind) -> Result<LedgerSummary, CacheError> {
        let api = Arc::clone(self.api());
        self.cache
            .query(&QueryKey::summary(kind), move || async move {
                api.ledger_summary(kind).await
            })
            .await
    }

    pub async fn dashboard(&self) -> Result<DashboardStats, CacheError> {
        let api = Arc::clone(self.api());
        self.cache
            .query(&QueryKey::aggregate(Aggregate::Dashboard), move || async move {
                api.dashboard().await
            })
            .await
    }

    pub async fn branch_comparison(&self) -> Result<Vec<BranchComparisonRow>, CacheError> {
        let api = Arc::clone(self.api());
        self.cache
            .query(
                &QueryKey::aggregate(Aggregate::BranchComparison),
                move || async move { api.branch_comparison().await },
            )
            .await
    }

    pub async fn resources<R>(&self, query: &ListQuery<R::Filter>) -> Result<Page<R>, CacheError>
    where
        R: Resource,
        A: ResourceApi<R>,
    {
        let key = QueryKey::list(R::KIND, query)?;
        let api = Arc::clone(self.api());
        let query = query.clone();
        self.cache
            .query(&key, move || async move { ResourceApi::<R>::list(&*api, &query).await })
            .await
    }

    pub async fn resource<R>(&self, id: &str) -> Result<R, CacheError>
    where
        R: Resource,
        A: ResourceApi<R>,
    {
        let key = QueryKey::detail(R::KIND, id);
        let api = Arc::clone(self.api());
        let id = id.to_string();
        self.cache
            .query(&key, move || async move { ResourceApi::<R>::get(&*api, &id).await })
            .await
    }

    pub async fn branches(&self, query: &ListQuery<BranchFilter>) -> Result<Page<Branch>, CacheError> {
        self.resources::<Branch>(query).await
    }

    pub async fn inventory(
        &self,
        query: &ListQuery<InventoryFilter>,
    ) -> Result<Page<InventoryItem>, CacheError> {
        self.resources::<InventoryItem>(query).await
    }

    // ========================================================================
    // Mutations
    // ========================================================================

    pub async fn create_obligation(
        &self,
        kind: ObligationKind,
        input: NewObligation,
    ) -> Result<Obligation, MutationError> {
        self.pipeline.run(&CreateObligation::new(kind, input)).await
    }

    pub async fn update_obligation(
        &self,
        kind: ObligationKind,
        id: &str,
        patch: ObligationPatch,
    ) -> Result<Obligation, MutationError> {
        let id = self.pipeline.pending().resolve(id)?;
        self.pipeline.run(&UpdateObligation::new(kind, id, patch)).await
    }

    pub async fn record_payment(
        &self,
        kind: ObligationKind,
        id: &str,
        payment: NewPayment,
    ) -> Result<Obligation, MutationError> {
        let id = self.pipeline.pending().resolve(id)?;
        self.pipeline.run(&RecordPayment::new(kind, id, payment)).await
    }

    pub async fn delete_obligation(&self, kind: ObligationKind, id: &str) -> Result<(), MutationError> {
        let id = self.pipeline.pending().resolve(id)?;
        self.pipeline.run(&DeleteObligation::new(kind, id)).await
    }

    pub async fn create_resource<R>(&self, draft: R::Draft) -> Result<R, MutationError>
    where
        R: Resource + ListedRecord,
        A: ResourceApi<R>,
    {
        self.pipeline.run(&CreateResource::<R>::new(draft)).await
    }

    pub async fn update_resource<R>(&self, id: &str, patch: R::Patch) -> Result<R, MutationError>
    where
        R: Resource + ListedRecord,
        A: ResourceApi<R>,
    {
        let id = self.pipeline.pending().resolve(id)?;
        self.pipeline.run(&UpdateResource::<R>::new(id, patch)).await
    }

    pub async fn delete_resource<R>(&self, id: &str) -> Result<(), MutationError>
    where
        R: Resource + ListedRecord,
        A: ResourceApi<R>,
    {
        let id = self.pipeline.pending().resolve(id)?;
        self.pipeline.run(&DeleteResource::<R>::new(id)).await
    }
}
