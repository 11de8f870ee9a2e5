//! A backend whose responses can be held in transit.
//!
//! The wrapped [`InMemoryBackend`] handles the call immediately (the server
//! has decided); only the response is parked until the test opens the gate.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use optimistic_ledger::{
    BranchComparisonRow, DashboardStats, InMemoryBackend, LedgerSummary, ListQuery, NewObligation,
    NewPayment, Obligation, ObligationApi, ObligationFilter, ObligationKind, ObligationPatch,
    Page, Payment, RemoteError, ReportApi, Resource, ResourceApi,
};
use tokio::sync::{Notify, Semaphore};

#[derive(Clone)]
pub struct Gate {
    arrived: Arc<Notify>,
    release: Arc<Semaphore>,
}

impl Gate {
    fn new() -> Self {
        Gate {
            arrived: Arc::new(Notify::new()),
            release: Arc::new(Semaphore::new(0)),
        }
    }

    /// Wait until the gated call has been handled by the server.
    pub async fn arrived(&self) {
        self.arrived.notified().await;
    }

    /// Deliver the parked response.
    pub fn open(&self) {
        self.release.add_permits(1);
    }
}

#[derive(Clone, Default)]
pub struct GatedBackend {
    inner: InMemoryBackend,
    gates: Arc<Mutex<HashMap<String, VecDeque<Gate>>>>,
}

impl GatedBackend {
    pub fn new(inner: InMemoryBackend) -> Self {
        GatedBackend {
            inner,
            gates: Arc::default(),
        }
    }

    pub fn inner(&self) -> &InMemoryBackend {
        &self.inner
    }

    /// Park the response of the next call to `endpoint`.
    pub fn gate(&self, endpoint: &str) -> Gate {
        let gate = Gate::new();
        self.gates
            .lock()
            .unwrap()
            .entry(endpoint.to_string())
            .or_default()
            .push_back(gate.clone());
        gate
    }

    async fn pass<T>(&self, endpoint: &str, response: T) -> T {
        let gate = self
            .gates
            .lock()
            .unwrap()
            .get_mut(endpoint)
            .and_then(VecDeque::pop_front);
        if let Some(gate) = gate {
            gate.arrived.notify_one();
            gate.release.acquire().await.unwrap().forget();
        }
        response
    }
}

#[async_trait]
impl ObligationApi for GatedBackend {
    async fn list_obligations(
        &self,
        kind: ObligationKind,
        query: &ListQuery<ObligationFilter>,
    ) -> Result<Page<Obligation>, RemoteError> {
        let response = self.inner.list_obligations(kind, query).await;
        self.pass("list_obligations", response).await
    }

    async fn get_obligation(&self, kind: ObligationKind, id: &str) -> Result<Obligation, RemoteError> {
        let response = self.inner.get_obligation(kind, id).await;
        self.pass("get_obligation", response).await
    }

    async fn create_obligation(
        &self,
        kind: ObligationKind,
        input: &NewObligation,
    ) -> Result<Obligation, RemoteError> {
        let response = self.inner.create_obligation(kind, input).await;
        self.pass("create_obligation", response).await
    }

    async fn update_obligation(
        &self,
        kind: ObligationKind,
        id: &str,
        patch: &ObligationPatch,
    ) -> Result<Obligation, RemoteError> {
        let response = self.inner.update_obligation(kind, id, patch).await;
        self.pass("update_obligation", response).await
    }

    async fn pay_obligation(
        &self,
        kind: ObligationKind,
        id: &str,
        payment: &NewPayment,
    ) -> Result<Obligation, RemoteError> {
        let response = self.inner.pay_obligation(kind, id, payment).await;
        self.pass("pay_obligation", response).await
    }

    async fn delete_obligation(&self, kind: ObligationKind, id: &str) -> Result<(), RemoteError> {
        let response = self.inner.delete_obligation(kind, id).await;
        self.pass("delete_obligation", response).await
    }

    async fn list_payments(
        &self,
        kind: ObligationKind,
        obligation_id: &str,
    ) -> Result<Vec<Payment>, RemoteError> {
        let response = self.inner.list_payments(kind, obligation_id).await;
        self.pass("list_payments", response).await
    }
}

#[async_trait]
impl<R> ResourceApi<R> for GatedBackend
where
    R: Resource,
    InMemoryBackend: ResourceApi<R>,
{
    async fn list(&self, query: &ListQuery<R::Filter>) -> Result<Page<R>, RemoteError> {
        let response = ResourceApi::<R>::list(&self.inner, query).await;
        self.pass(&format!("list_{}", R::KIND.path()), response).await
    }

    async fn get(&self, id: &str) -> Result<R, RemoteError> {
        let response = ResourceApi::<R>::get(&self.inner, id).await;
        self.pass(&format!("get_{}", R::KIND.path()), response).await
    }

    async fn create(&self, draft: &R::Draft) -> Result<R, RemoteError> {
        let response = ResourceApi::<R>::create(&self.inner, draft).await;
        self.pass(&format!("create_{}", R::KIND.path()), response).await
    }

    async fn update(&self, id: &str, patch: &R::Patch) -> Result<R, RemoteError> {
        let response = ResourceApi::<R>::update(&self.inner, id, patch).await;
        self.pass(&format!("update_{}", R::KIND.path()), response).await
    }

    async fn delete(&self, id: &str) -> Result<(), RemoteError> {
        let response = ResourceApi::<R>::delete(&self.inner, id).await;
        self.pass(&format!("delete_{}", R::KIND.path()), response).await
    }
}

#[async_trait]
impl ReportApi for GatedBackend {
    async fn dashboard(&self) -> Result<DashboardStats, RemoteError> {
        let response = self.inner.dashboard().await;
        self.pass("dashboard", response).await
    }

    async fn branch_comparison(&self) -> Result<Vec<BranchComparisonRow>, RemoteError> {
        let response = self.inner.branch_comparison().await;
        self.pass("branch_comparison", response).await
    }

    async fn ledger_summary(&self, kind: ObligationKind) -> Result<LedgerSummary, RemoteError> {
        let response = self.inner.ledger_summary(kind).await;
        self.pass("ledger_summary", response).await
    }
}
