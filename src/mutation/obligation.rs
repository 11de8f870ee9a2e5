use async_trait::async_trait;
use rust_decimal::Decimal;

use super::lists;
use super::{OptimisticMutation, PendingRecords};
use crate::cache::{EntityKind, QueryCache, QueryKey};
use crate::error::MutationError;
use crate::invalidation::{MutationEvent, MutationOp};
use crate::ledger::{
    apply_patch, create_obligation, record_payment, validate_new, LedgerSummary, NewObligation,
    NewPayment, Obligation, ObligationKind, ObligationPatch, Payment,
};
use crate::remote::{ObligationApi, RemoteError};

fn cached(
    cache: &QueryCache,
    kind: ObligationKind,
    id: &str,
) -> Result<Option<Obligation>, MutationError> {
    Ok(lists::find(cache, EntityKind::Obligation(kind), id)?)
}

fn adjust_summary(
    cache: &QueryCache,
    kind: ObligationKind,
    before: Option<&Obligation>,
    after: Option<&Obligation>,
) -> Result<(), MutationError> {
    cache.update(&QueryKey::summary(kind), |mut summary: LedgerSummary| {
        summary.apply_change(before, after);
        summary
    })?;
    Ok(())
}

/// Detail, list and summary keys of `kind` that currently hold data.
fn ledger_keys(
    cache: &QueryCache,
    kind: ObligationKind,
    id: Option<&str>,
) -> Result<Vec<QueryKey>, MutationError> {
    let entity = EntityKind::Obligation(kind);
    let mut keys = lists::list_keys(cache, entity)?;
    keys.push(QueryKey::summary(kind));
    if let Some(id) = id {
        keys.push(QueryKey::detail(entity, id));
    }
    Ok(keys)
}

/// Create an obligation under a placeholder id until the server assigns one.
#[derive(Debug, Clone)]
pub struct CreateObligation {
    kind: ObligationKind,
    input: NewObligation,
    placeholder: String,
}

impl CreateObligation {
    pub fn new(kind: ObligationKind, input: NewObligation) -> Self {
        CreateObligation {
            kind,
            input,
            placeholder: PendingRecords::placeholder_id(),
        }
    }

    pub fn placeholder_id(&self) -> &str {
        &self.placeholder
    }

    /// The record shown while the request is outstanding.
    pub fn predicted(&self) -> Result<Obligation, MutationError> {
        Ok(create_obligation(
            self.placeholder.clone(),
            self.kind,
            self.input.clone(),
        )?)
    }
}

#[async_trait]
impl<A: ObligationApi> OptimisticMutation<A> for CreateObligation {
    type Output = Obligation;

    fn event(&self) -> MutationEvent {
        MutationEvent::new(EntityKind::Obligation(self.kind), MutationOp::Create, None)
    }

    fn placeholder(&self) -> Option<&str> {
        Some(&self.placeholder)
    }

    fn validate(&self, _cache: &QueryCache) -> Result<(), MutationError> {
        Ok(validate_new(&self.input)?)
    }

    fn affected_keys(&self, cache: &QueryCache) -> Result<Vec<QueryKey>, MutationError> {
        ledger_keys(cache, self.kind, Some(&self.placeholder))
    }

    fn apply_optimistic(&self, cache: &QueryCache) -> Result<(), MutationError> {
        let predicted = self.predicted()?;
        let entity = EntityKind::Obligation(self.kind);
        lists::prepend(cache, entity, &predicted)?;
        adjust_summary(cache, self.kind, None, Some(&predicted))?;
        cache.set(&QueryKey::detail(entity, &self.placeholder), &predicted)?;
        Ok(())
    }

    async fn execute(&self, api: &A) -> Result<Obligation, RemoteError> {
        api.create_obligation(self.kind, &self.input).await
    }

    /// Swap the placeholder for the server record; never just drop it.
    fn reconcile(&self, cache: &QueryCache, created: &Obligation) -> Result<(), MutationError> {
        let entity = EntityKind::Obligation(self.kind);
        lists::replace(cache, entity, &self.placeholder, created)?;
        cache.remove(&QueryKey::detail(entity, &self.placeholder))?;
        cache.set(&QueryKey::detail(entity, &created.id), created)?;
        Ok(())
    }

    fn settled_id(&self, created: &Obligation) -> Option<String> {
        Some(created.id.clone())
    }
}

/// Patch descriptive fields. Amounts and status are not patchable.
#[derive(Debug, Clone)]
pub struct UpdateObligation {
    kind: ObligationKind,
    id: String,
    patch: ObligationPatch,
}

impl UpdateObligation {
    pub fn new(kind: ObligationKind, id: impl Into<String>, patch: ObligationPatch) -> Self {
        UpdateObligation {
            kind,
            id: id.into(),
            patch,
        }
    }
}

#[async_trait]
impl<A: ObligationApi> OptimisticMutation<A> for UpdateObligation {
    type Output = Obligation;

    fn event(&self) -> MutationEvent {
        MutationEvent::new(
            EntityKind::Obligation(self.kind),
            MutationOp::Update,
            Some(self.id.clone()),
        )
    }

    fn target(&self) -> Option<&str> {
        Some(&self.id)
    }

    fn validate(&self, cache: &QueryCache) -> Result<(), MutationError> {
        if self.patch.is_empty() {
            return Err(MutationError::Validation("empty patch".into()));
        }
        if let Some(current) = cached(cache, self.kind, &self.id)? {
            apply_patch(&current, &self.patch)?;
        }
        Ok(())
    }

    fn affected_keys(&self, cache: &QueryCache) -> Result<Vec<QueryKey>, MutationError> {
        let entity = EntityKind::Obligation(self.kind);
        let mut keys = lists::list_keys(cache, entity)?;
        keys.push(QueryKey::detail(entity, &self.id));
        Ok(keys)
    }

    fn apply_optimistic(&self, cache: &QueryCache) -> Result<(), MutationError> {
        let Some(current) = cached(cache, self.kind, &self.id)? else {
            return Ok(());
        };
        let next = apply_patch(&current, &self.patch)?;
        let entity = EntityKind::Obligation(self.kind);
        lists::replace(cache, entity, &self.id, &next)?;
        cache.set(&QueryKey::detail(entity, &self.id), &next)?;
        Ok(())
    }

    async fn execute(&self, api: &A) -> Result<Obligation, RemoteError> {
        api.update_obligation(self.kind, &self.id, &self.patch).await
    }

    fn reconcile(&self, cache: &QueryCache, updated: &Obligation) -> Result<(), MutationError> {
        let entity = EntityKind::Obligation(self.kind);
        lists::replace(cache, entity, &self.id, updated)?;
        cache.set(&QueryKey::detail(entity, &self.id), updated)?;
        Ok(())
    }
}

/// Record a payment. Overpayment against the cached balance is rejected
/// before anything is written.
#[derive(Debug, Clone)]
pub struct RecordPayment {
    kind: ObligationKind,
    id: String,
    payment: NewPayment,
    placeholder: String,
}

impl RecordPayment {
    pub fn new(kind: ObligationKind, id: impl Into<String>, payment: NewPayment) -> Self {
        RecordPayment {
            kind,
            id: id.into(),
            payment,
            placeholder: PendingRecords::placeholder_id(),
        }
    }

    pub fn amount(&self) -> Decimal {
        self.payment.amount
    }

    fn predict(&self, current: &Obligation) -> Result<(Obligation, Payment), MutationError> {
        Ok(record_payment(current, self.placeholder.clone(), &self.payment)?)
    }
}

#[async_trait]
impl<A: ObligationApi> OptimisticMutation<A> for RecordPayment {
    type Output = Obligation;

    fn event(&self) -> MutationEvent {
        MutationEvent::new(
            EntityKind::Obligation(self.kind),
            MutationOp::Pay,
            Some(self.id.clone()),
        )
    }

    fn target(&self) -> Option<&str> {
        Some(&self.id)
    }

    fn validate(&self, cache: &QueryCache) -> Result<(), MutationError> {
        if self.payment.amount <= Decimal::ZERO {
            return Err(MutationError::Validation(format!(
                "payment amount must be positive, got {}",
                self.payment.amount
            )));
        }
        if let Some(current) = cached(cache, self.kind, &self.id)? {
            self.predict(&current)?;
        }
        Ok(())
    }

    fn affected_keys(&self, cache: &QueryCache) -> Result<Vec<QueryKey>, MutationError> {
        let mut keys = ledger_keys(cache, self.kind, Some(&self.id))?;
        keys.push(QueryKey::payments(self.kind, &self.id));
        Ok(keys)
    }

    fn apply_optimistic(&self, cache: &QueryCache) -> Result<(), MutationError> {
        let Some(current) = cached(cache, self.kind, &self.id)? else {
            return Ok(());
        };
        let (next, payment) = self.predict(&current)?;
        let entity = EntityKind::Obligation(self.kind);
        lists::replace(cache, entity, &self.id, &next)?;
        cache.set(&QueryKey::detail(entity, &self.id), &next)?;
        adjust_summary(cache, self.kind, Some(&current), Some(&next))?;
        cache.update(
            &QueryKey::payments(self.kind, &self.id),
            |mut history: Vec<Payment>| {
                history.push(payment);
                history
            },
        )?;
        Ok(())
    }

    async fn execute(&self, api: &A) -> Result<Obligation, RemoteError> {
        api.pay_obligation(self.kind, &self.id, &self.payment).await
    }

    fn reconcile(&self, cache: &QueryCache, paid: &Obligation) -> Result<(), MutationError> {
        let entity = EntityKind::Obligation(self.kind);
        lists::replace(cache, entity, &self.id, paid)?;
        cache.set(&QueryKey::detail(entity, &self.id), paid)?;
        Ok(())
    }
}

/// Delete an obligation that has no payments.
#[derive(Debug, Clone)]
pub struct DeleteObligation {
    kind: ObligationKind,
    id: String,
}

impl DeleteObligation {
    pub fn new(kind: ObligationKind, id: impl Into<String>) -> Self {
        DeleteObligation {
            kind,
            id: id.into(),
        }
    }
}

#[async_trait]
impl<A: ObligationApi> OptimisticMutation<A> for DeleteObligation {
    type Output = ();

    fn event(&self) -> MutationEvent {
        MutationEvent::new(
            EntityKind::Obligation(self.kind),
            MutationOp::Delete,
            Some(self.id.clone()),
        )
    }

    fn target(&self) -> Option<&str> {
        Some(&self.id)
    }

    fn validate(&self, cache: &QueryCache) -> Result<(), MutationError> {
        match cached(cache, self.kind, &self.id)? {
            Some(current) if current.has_payments() => Err(MutationError::Conflict(format!(
                "{} {} has payments and cannot be deleted",
                self.kind, self.id
            ))),
            _ => Ok(()),
        }
    }

    fn affected_keys(&self, cache: &QueryCache) -> Result<Vec<QueryKey>, MutationError> {
        let mut keys = ledger_keys(cache, self.kind, Some(&self.id))?;
        keys.push(QueryKey::payments(self.kind, &self.id));
        Ok(keys)
    }

    fn apply_optimistic(&self, cache: &QueryCache) -> Result<(), MutationError> {
        let entity = EntityKind::Obligation(self.kind);
        let current = cached(cache, self.kind, &self.id)?;
        lists::remove::<Obligation>(cache, entity, &self.id)?;
        if let Some(current) = &current {
            adjust_summary(cache, self.kind, Some(current), None)?;
        }
        cache.remove(&QueryKey::detail(entity, &self.id))?;
        cache.remove(&QueryKey::payments(self.kind, &self.id))?;
        Ok(())
    }

    async fn execute(&self, api: &A) -> Result<(), RemoteError> {
        api.delete_obligation(self.kind, &self.id).await
    }
}
