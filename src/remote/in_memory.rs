//! InMemoryBackend - authoritative server stand-in for tests and demos.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use tracing::{debug, trace, warn};

use super::{
    BranchComparisonRow, DashboardStats, ListQuery, ObligationApi, Page, PageMeta, RemoteError,
    ReportApi, ResourceApi, HAS_PAYMENTS_CODE, OVERPAYMENT_CODE,
};
use crate::ledger::{
    apply_patch, create_obligation, record_payment, LedgerError, LedgerSummary, NewObligation,
    NewPayment, Obligation, ObligationFilter, ObligationKind, ObligationPatch, Payment,
};
use crate::resource::{Branch, BranchDraft, InventoryDraft, InventoryItem, Resource, ResourceError};

const VALIDATION_CODE: &str = "VALIDATION";

#[derive(Default)]
struct Store {
    sequence: u64,
    /// Newest first, like the list endpoints.
    obligations: Vec<Obligation>,
    /// In recording order.
    payments: Vec<Payment>,
    branches: Vec<Branch>,
    inventory: Vec<InventoryItem>,
}

impl Store {
    fn next_id(&mut self, prefix: &str) -> String {
        self.sequence += 1;
        format!("{}-{}", prefix, self.sequence)
    }

    fn obligation(&self, kind: ObligationKind, id: &str) -> Result<&Obligation, RemoteError> {
        self.obligations
            .iter()
            .find(|o| o.kind == kind && o.id == id)
            .ok_or_else(|| RemoteError::not_found(kind.path(), id))
    }

    fn obligation_mut(
        &mut self,
        kind: ObligationKind,
        id: &str,
    ) -> Result<&mut Obligation, RemoteError> {
        self.obligations
            .iter_mut()
            .find(|o| o.kind == kind && o.id == id)
            .ok_or_else(|| RemoteError::not_found(kind.path(), id))
    }

    fn insert_obligation(
        &mut self,
        kind: ObligationKind,
        input: &NewObligation,
    ) -> Result<Obligation, RemoteError> {
        let id = self.next_id(kind.path());
        let created = create_obligation(id, kind, input.clone()).map_err(ledger_rejection)?;
        self.obligations.insert(0, created.clone());
        Ok(created)
    }

    fn pay(
        &mut self,
        kind: ObligationKind,
        id: &str,
        input: &NewPayment,
    ) -> Result<Obligation, RemoteError> {
        let payment_id = self.next_id("pay");
        let current = self.obligation_mut(kind, id)?;
        let (next, payment) =
            record_payment(current, payment_id, input).map_err(ledger_rejection)?;
        *current = next.clone();
        self.payments.push(payment);
        Ok(next)
    }

    fn insert_branch(&mut self, draft: &BranchDraft) -> Result<Branch, RemoteError> {
        let id = self.next_id("branch");
        let branch = Branch::create(&id, draft).map_err(resource_rejection)?;
        self.branches.insert(0, branch.clone());
        Ok(branch)
    }

    fn insert_item(&mut self, draft: &InventoryDraft) -> Result<InventoryItem, RemoteError> {
        if !self.branches.iter().any(|b| b.id == draft.branch_id) {
            return Err(RemoteError::with_code(
                422,
                VALIDATION_CODE,
                format!("unknown branch {}", draft.branch_id),
            ));
        }
        let id = self.next_id("item");
        let item = InventoryItem::create(&id, draft).map_err(resource_rejection)?;
        self.inventory.insert(0, item.clone());
        Ok(item)
    }

    fn outstanding(&self, kind: ObligationKind, branch: Option<&str>) -> Decimal {
        self.obligations
            .iter()
            .filter(|o| o.kind == kind)
            .filter(|o| branch.map_or(true, |b| o.branch_id.as_deref() == Some(b)))
            .map(Obligation::remaining_amount)
            .sum()
    }

    fn inventory_value(&self, branch: Option<&str>) -> Decimal {
        self.inventory
            .iter()
            .filter(|item| branch.map_or(true, |b| item.branch_id == b))
            .map(InventoryItem::value)
            .sum()
    }
}

/// Rows of one [`Resource`] family inside the store.
trait Rows: Resource {
    const PREFIX: &'static str;

    fn rows(store: &Store) -> &Vec<Self>;
    fn rows_mut(store: &mut Store) -> &mut Vec<Self>;
    fn insert(store: &mut Store, draft: &Self::Draft) -> Result<Self, RemoteError>;
    /// Cascade run after a row is deleted.
    fn on_delete(_store: &mut Store, _id: &str) {}
}

impl Rows for Branch {
    const PREFIX: &'static str = "branch";

    fn rows(store: &Store) -> &Vec<Self> {
        &store.branches
    }

    fn rows_mut(store: &mut Store) -> &mut Vec<Self> {
        &mut store.branches
    }

    fn insert(store: &mut Store, draft: &BranchDraft) -> Result<Self, RemoteError> {
        store.insert_branch(draft)
    }

    // Stock goes with the branch; obligations are detached from it.
    fn on_delete(store: &mut Store, id: &str) {
        store.inventory.retain(|item| item.branch_id != id);
        for obligation in store.obligations.iter_mut() {
            if obligation.branch_id.as_deref() == Some(id) {
                obligation.branch_id = None;
            }
        }
    }
}

impl Rows for InventoryItem {
    const PREFIX: &'static str = "item";

    fn rows(store: &Store) -> &Vec<Self> {
        &store.inventory
    }

    fn rows_mut(store: &mut Store) -> &mut Vec<Self> {
        &mut store.inventory
    }

    fn insert(store: &mut Store, draft: &InventoryDraft) -> Result<Self, RemoteError> {
        store.insert_item(draft)
    }
}

#[derive(Default)]
struct Faults {
    queued: VecDeque<RemoteError>,
    calls: HashMap<&'static str, usize>,
}

/// In-memory server. Applies the ledger rules authoritatively, assigns ids,
/// paginates lists and computes the aggregate reports.
///
/// Clone-friendly via Arc: clones share the same data, fault queue and call
/// counters.
#[derive(Clone)]
pub struct InMemoryBackend {
    store: Arc<RwLock<Store>>,
    faults: Arc<Mutex<Faults>>,
    latency: Duration,
    today: NaiveDate,
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self {
            store: Arc::new(RwLock::new(Store::default())),
            faults: Arc::new(Mutex::new(Faults::default())),
            latency: Duration::ZERO,
            today: Utc::now().date_naive(),
        }
    }

    /// Every call sleeps this long (on the tokio clock) before answering.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Reference date for overdue counts.
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = today;
        self
    }

    /// Make the next call, whichever endpoint it hits, fail with `error`.
    /// Queued failures are consumed in order.
    pub fn fail_next(&self, error: RemoteError) {
        self.faults().queued.push_back(error);
    }

    /// Number of calls made to `endpoint` (the trait method name).
    pub fn calls(&self, endpoint: &str) -> usize {
        self.faults().calls.get(endpoint).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.faults().calls.values().sum()
    }

    // Plain counters and a queue: a poisoned guard is still consistent.
    fn faults(&self) -> MutexGuard<'_, Faults> {
        self.faults.lock().unwrap_or_else(|poisoned| {
            warn!("fault registry lock poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn read_store(&self) -> Result<RwLockReadGuard<'_, Store>, RemoteError> {
        self.store
            .read()
            .map_err(|_| RemoteError::status(500, "store lock poisoned"))
    }

    fn write_store(&self) -> Result<RwLockWriteGuard<'_, Store>, RemoteError> {
        self.store
            .write()
            .map_err(|_| RemoteError::status(500, "store lock poisoned"))
    }

    /// Count the call, take any queued failure, then wait out the latency.
    async fn enter(&self, endpoint: &'static str) -> Result<(), RemoteError> {
        let fault = {
            let mut faults = self.faults();
            *faults.calls.entry(endpoint).or_insert(0) += 1;
            faults.queued.pop_front()
        };
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        match fault {
            Some(error) => {
                debug!(endpoint, error = %error, "injected failure");
                Err(error)
            }
            None => {
                trace!(endpoint, "call");
                Ok(())
            }
        }
    }

    // ========================================================================
    // Seeding and inspection (no call counting, no latency)
    // ========================================================================

    pub fn seed_obligation(
        &self,
        kind: ObligationKind,
        input: NewObligation,
    ) -> Result<Obligation, RemoteError> {
        self.write_store()?.insert_obligation(kind, &input)
    }

    pub fn seed_payment(
        &self,
        kind: ObligationKind,
        id: &str,
        input: NewPayment,
    ) -> Result<Obligation, RemoteError> {
        self.write_store()?.pay(kind, id, &input)
    }

    pub fn seed_branch(&self, draft: BranchDraft) -> Result<Branch, RemoteError> {
        self.write_store()?.insert_branch(&draft)
    }

    pub fn seed_item(&self, draft: InventoryDraft) -> Result<InventoryItem, RemoteError> {
        self.write_store()?.insert_item(&draft)
    }

    /// Server truth for one obligation.
    pub fn stored_obligation(&self, kind: ObligationKind, id: &str) -> Option<Obligation> {
        self.read_store()
            .ok()
            .and_then(|store| store.obligation(kind, id).ok().cloned())
    }

    pub fn stored_payments(&self, obligation_id: &str) -> Vec<Payment> {
        self.read_store()
            .map(|store| {
                store
                    .payments
                    .iter()
                    .filter(|p| p.obligation_id == obligation_id)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    fn list_rows<R: Rows>(&self, query: &ListQuery<R::Filter>) -> Result<Page<R>, RemoteError> {
        let store = self.read_store()?;
        let matching = R::rows(&store)
            .iter()
            .filter(|row| row.matches(&query.filter))
            .cloned();
        Ok(paginate(matching, query.page, query.limit))
    }

    fn get_row<R: Rows>(&self, id: &str) -> Result<R, RemoteError> {
        let store = self.read_store()?;
        R::rows(&store)
            .iter()
            .find(|row| row.id() == id)
            .cloned()
            .ok_or_else(|| RemoteError::not_found(R::PREFIX, id))
    }

    fn update_row<R: Rows>(&self, id: &str, patch: &R::Patch) -> Result<R, RemoteError> {
        let mut store = self.write_store()?;
        let row = R::rows_mut(&mut store)
            .iter_mut()
            .find(|row| row.id() == id)
            .ok_or_else(|| RemoteError::not_found(R::PREFIX, id))?;
        let next = row.apply_patch(patch).map_err(resource_rejection)?;
        *row = next.clone();
        Ok(next)
    }

    fn delete_row<R: Rows>(&self, id: &str) -> Result<(), RemoteError> {
        let mut store = self.write_store()?;
        let rows = R::rows_mut(&mut store);
        let before = rows.len();
        rows.retain(|row| row.id() != id);
        if rows.len() == before {
            return Err(RemoteError::not_found(R::PREFIX, id));
        }
        R::on_delete(&mut store, id);
        Ok(())
    }
}

fn paginate<T>(rows: impl Iterator<Item = T>, page: u32, limit: u32) -> Page<T> {
    let rows: Vec<T> = rows.collect();
    let total = rows.len() as u64;
    let page = page.max(1);
    let skip = (page as usize - 1).saturating_mul(limit as usize);
    let items = rows.into_iter().skip(skip).take(limit as usize).collect();
    Page {
        items,
        meta: PageMeta::new(page, limit, total),
    }
}

fn ledger_rejection(error: LedgerError) -> RemoteError {
    match &error {
        LedgerError::Overpayment { .. } => {
            RemoteError::with_code(400, OVERPAYMENT_CODE, error.to_string())
        }
        LedgerError::Inconsistent { .. } => RemoteError::status(500, error.to_string()),
        _ => RemoteError::with_code(400, VALIDATION_CODE, error.to_string()),
    }
}

fn resource_rejection(error: ResourceError) -> RemoteError {
    RemoteError::with_code(422, VALIDATION_CODE, error.to_string())
}

#[async_trait]
impl ObligationApi for InMemoryBackend {
    async fn list_obligations(
        &self,
        kind: ObligationKind,
        query: &ListQuery<ObligationFilter>,
    ) -> Result<Page<Obligation>, RemoteError> {
        self.enter("list_obligations").await?;
        let store = self.read_store()?;
        let matching = store
            .obligations
            .iter()
            .filter(|o| o.kind == kind && query.filter.matches(o))
            .cloned();
        Ok(paginate(matching, query.page, query.limit))
    }

    async fn get_obligation(
        &self,
        kind: ObligationKind,
        id: &str,
    ) -> Result<Obligation, RemoteError> {
        self.enter("get_obligation").await?;
        self.read_store()?.obligation(kind, id).cloned()
    }

    async fn create_obligation(
        &self,
        kind: ObligationKind,
        input: &NewObligation,
    ) -> Result<Obligation, RemoteError> {
        self.enter("create_obligation").await?;
        self.write_store()?.insert_obligation(kind, input)
    }

    async fn update_obligation(
        &self,
        kind: ObligationKind,
        id: &str,
        patch: &ObligationPatch,
    ) -> Result<Obligation, RemoteError> {
        self.enter("update_obligation").await?;
        let mut store = self.write_store()?;
        let current = store.obligation_mut(kind, id)?;
        let next = apply_patch(current, patch).map_err(ledger_rejection)?;
        *current = next.clone();
        Ok(next)
    }

    async fn pay_obligation(
        &self,
        kind: ObligationKind,
        id: &str,
        payment: &NewPayment,
    ) -> Result<Obligation, RemoteError> {
        self.enter("pay_obligation").await?;
        self.write_store()?.pay(kind, id, payment)
    }

    async fn delete_obligation(&self, kind: ObligationKind, id: &str) -> Result<(), RemoteError> {
        self.enter("delete_obligation").await?;
        let mut store = self.write_store()?;
        if store.obligation(kind, id)?.has_payments() {
            return Err(RemoteError::with_code(
                409,
                HAS_PAYMENTS_CODE,
                format!("{} {} has payments", kind.path(), id),
            ));
        }
        store.obligations.retain(|o| !(o.kind == kind && o.id == id));
        Ok(())
    }

    async fn list_payments(
        &self,
        kind: ObligationKind,
        obligation_id: &str,
    ) -> Result<Vec<Payment>, RemoteError> {
        self.enter("list_payments").await?;
        let store = self.read_store()?;
        store.obligation(kind, obligation_id)?;
        Ok(store
            .payments
            .iter()
            .filter(|p| p.obligation_id == obligation_id)
            .cloned()
            .collect())
    }
}

macro_rules! resource_api {
    ($resource:ty, $list:literal, $get:literal, $create:literal, $update:literal, $delete:literal) => {
        #[async_trait]
        impl ResourceApi<$resource> for InMemoryBackend {
            async fn list(
                &self,
                query: &ListQuery<<$resource as Resource>::Filter>,
            ) -> Result<Page<$resource>, RemoteError> {
                self.enter($list).await?;
                self.list_rows(query)
            }

            async fn get(&self, id: &str) -> Result<$resource, RemoteError> {
                self.enter($get).await?;
                self.get_row(id)
            }

            async fn create(
                &self,
                draft: &<$resource as Resource>::Draft,
            ) -> Result<$resource, RemoteError> {
                self.enter($create).await?;
                let mut store = self.write_store()?;
                <$resource as Rows>::insert(&mut store, draft)
            }

            async fn update(
                &self,
                id: &str,
                patch: &<$resource as Resource>::Patch,
            ) -> Result<$resource, RemoteError> {
                self.enter($update).await?;
                self.update_row::<$resource>(id, patch)
            }

            async fn delete(&self, id: &str) -> Result<(), RemoteError> {
                self.enter($delete).await?;
                self.delete_row::<$resource>(id)
            }
        }
    };
}

resource_api!(
    Branch,
    "list_branches",
    "get_branch",
    "create_branch",
    "update_branch",
    "delete_branch"
);
resource_api!(
    InventoryItem,
    "list_inventory",
    "get_inventory",
    "create_inventory",
    "update_inventory",
    "delete_inventory"
);

#[async_trait]
impl ReportApi for InMemoryBackend {
    async fn dashboard(&self) -> Result<DashboardStats, RemoteError> {
        self.enter("dashboard").await?;
        let store = self.read_store()?;
        let overdue_count = store
            .obligations
            .iter()
            .filter(|o| !o.remaining_amount().is_zero())
            .filter(|o| o.due_date.is_some_and(|due| due < self.today))
            .count() as u64;
        Ok(DashboardStats {
            debts_outstanding: store.outstanding(ObligationKind::Debt, None),
            payables_outstanding: store.outstanding(ObligationKind::Payable, None),
            receivables_outstanding: store.outstanding(ObligationKind::Receivable, None),
            overdue_count,
            branch_count: store.branches.len() as u64,
            inventory_value: store.inventory_value(None),
            low_stock_items: store.inventory.iter().filter(|i| i.is_low_stock()).count() as u64,
        })
    }

    async fn branch_comparison(&self) -> Result<Vec<BranchComparisonRow>, RemoteError> {
        self.enter("branch_comparison").await?;
        let store = self.read_store()?;
        Ok(store
            .branches
            .iter()
            .map(|branch| {
                let id = Some(branch.id.as_str());
                BranchComparisonRow {
                    branch_id: branch.id.clone(),
                    branch_name: branch.name.clone(),
                    debts_outstanding: store.outstanding(ObligationKind::Debt, id),
                    payables_outstanding: store.outstanding(ObligationKind::Payable, id),
                    receivables_outstanding: store.outstanding(ObligationKind::Receivable, id),
                    inventory_value: store.inventory_value(id),
                }
            })
            .collect())
    }

    async fn ledger_summary(&self, kind: ObligationKind) -> Result<LedgerSummary, RemoteError> {
        self.enter("ledger_summary").await?;
        let store = self.read_store()?;
        Ok(LedgerSummary::from_obligations(kind, &store.obligations))
    }
}
