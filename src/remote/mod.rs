//! Remote - the server contract consumed by the cache and the mutation
//! pipeline, plus an authoritative in-memory implementation.
//!
//! The server is the source of truth. Nothing in this crate persists
//! ledger data; it only caches what these traits return.

mod in_memory;
mod reports;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ledger::{
    LedgerSummary, NewObligation, NewPayment, Obligation, ObligationFilter, ObligationKind,
    ObligationPatch, Payment,
};
use crate::resource::{Branch, InventoryItem, Resource};

pub use in_memory::InMemoryBackend;
pub use reports::{BranchComparisonRow, DashboardStats};

/// Error code the server attaches to a 400 when a payment exceeds the balance.
pub const OVERPAYMENT_CODE: &str = "OVERPAYMENT";
/// Error code attached to a 409 when deleting an obligation that has payments.
pub const HAS_PAYMENTS_CODE: &str = "HAS_PAYMENTS";

/// Failure of a remote call, as reported by the transport or the server.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    #[error("network error: {0}")]
    Network(String),
    #[error("request timed out")]
    Timeout,
    #[error("server responded {status}: {message}")]
    Status {
        status: u16,
        code: Option<String>,
        message: String,
    },
    #[error("invalid response body: {0}")]
    Decode(String),
}

impl RemoteError {
    pub fn status(status: u16, message: impl Into<String>) -> Self {
        RemoteError::Status {
            status,
            code: None,
            message: message.into(),
        }
    }

    pub fn with_code(status: u16, code: &str, message: impl Into<String>) -> Self {
        RemoteError::Status {
            status,
            code: Some(code.to_string()),
            message: message.into(),
        }
    }

    pub fn not_found(what: &str, id: &str) -> Self {
        RemoteError::status(404, format!("{} {} not found", what, id))
    }

    pub fn status_code(&self) -> Option<u16> {
        match self {
            RemoteError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn code(&self) -> Option<&str> {
        match self {
            RemoteError::Status { code, .. } => code.as_deref(),
            _ => None,
        }
    }
}

/// List request: filter fields flattened next to the pagination fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery<F> {
    #[serde(flatten)]
    pub filter: F,
    pub page: u32,
    pub limit: u32,
}

impl<F: Default> ListQuery<F> {
    pub fn first_page(limit: u32) -> Self {
        ListQuery {
            filter: F::default(),
            page: 1,
            limit,
        }
    }
}

impl<F> ListQuery<F> {
    pub fn new(filter: F, page: u32, limit: u32) -> Self {
        ListQuery {
            filter,
            page,
            limit,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageMeta {
    pub page: u32,
    pub limit: u32,
    pub total: u64,
    pub total_pages: u32,
}

impl PageMeta {
    pub fn new(page: u32, limit: u32, total: u64) -> Self {
        let total_pages = if limit == 0 {
            0
        } else {
            u32::try_from(total.div_ceil(u64::from(limit))).unwrap_or(u32::MAX)
        };
        PageMeta {
            page,
            limit,
            total,
            total_pages,
        }
    }
}

/// One page of a list response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    pub meta: PageMeta,
}

/// Obligation endpoints, shared by `debts`, `payables` and `receivables`.
#[async_trait]
pub trait ObligationApi: Send + Sync {
    async fn list_obligations(
        &self,
        kind: ObligationKind,
        query: &ListQuery<ObligationFilter>,
    ) -> Result<Page<Obligation>, RemoteError>;

    async fn get_obligation(&self, kind: ObligationKind, id: &str)
        -> Result<Obligation, RemoteError>;

    /// Server assigns the id; the result has `remaining == original` and status `ACTIVE`.
    async fn create_obligation(
        &self,
        kind: ObligationKind,
        input: &NewObligation,
    ) -> Result<Obligation, RemoteError>;

    async fn update_obligation(
        &self,
        kind: ObligationKind,
        id: &str,
        patch: &ObligationPatch,
    ) -> Result<Obligation, RemoteError>;

    /// Fails with 400 / `OVERPAYMENT` when the amount exceeds the remaining balance.
    async fn pay_obligation(
        &self,
        kind: ObligationKind,
        id: &str,
        payment: &NewPayment,
    ) -> Result<Obligation, RemoteError>;

    /// Fails with 409 / `HAS_PAYMENTS` when payments exist.
    async fn delete_obligation(&self, kind: ObligationKind, id: &str) -> Result<(), RemoteError>;

    async fn list_payments(
        &self,
        kind: ObligationKind,
        obligation_id: &str,
    ) -> Result<Vec<Payment>, RemoteError>;
}

/// CRUD endpoints for a [`Resource`] family.
#[async_trait]
pub trait ResourceApi<R: Resource>: Send + Sync {
    async fn list(&self, query: &ListQuery<R::Filter>) -> Result<Page<R>, RemoteError>;
    async fn get(&self, id: &str) -> Result<R, RemoteError>;
    async fn create(&self, draft: &R::Draft) -> Result<R, RemoteError>;
    async fn update(&self, id: &str, patch: &R::Patch) -> Result<R, RemoteError>;
    async fn delete(&self, id: &str) -> Result<(), RemoteError>;
}

/// Server-computed aggregates.
#[async_trait]
pub trait ReportApi: Send + Sync {
    async fn dashboard(&self) -> Result<DashboardStats, RemoteError>;
    async fn branch_comparison(&self) -> Result<Vec<BranchComparisonRow>, RemoteError>;
    async fn ledger_summary(&self, kind: ObligationKind) -> Result<LedgerSummary, RemoteError>;
}

/// The full server surface.
pub trait LedgerApi:
    ObligationApi + ResourceApi<Branch> + ResourceApi<InventoryItem> + ReportApi
{
}

impl<T> LedgerApi for T where
    T: ObligationApi + ResourceApi<Branch> + ResourceApi<InventoryItem> + ReportApi
{
}
