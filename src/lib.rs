mod cache;
mod client;
mod config;
mod error;
mod invalidation;
mod ledger;
mod mutation;
mod patch;
mod remote;
mod resource;

pub use cache::{
    filter_signature, Aggregate, CacheError, CacheEvent, CachedValue, EntityKind, EntryState,
    Observer, QueryCache, QueryKey,
};
pub use client::LedgerClient;
pub use config::{CacheConfig, ConfigError};
pub use error::MutationError;
pub use invalidation::{
    standard_targets, InvalidationDispatcher, InvalidationMap, InvalidationReport, MutationEvent,
    MutationOp, Target,
};
pub use ledger::{
    apply_patch, apply_payment, create_obligation, record_payment, validate_new, verify_balance,
    LedgerError, LedgerSummary, NewObligation, NewPayment, Obligation, ObligationFilter,
    ObligationKind, ObligationPatch, ObligationStatus, Payment,
};
pub use mutation::{
    CreateObligation, CreateResource, DeleteObligation, DeleteResource, ListedRecord,
    MutationAttempt, MutationPhase, MutationPipeline, MutationSnapshot, OptimisticMutation,
    PendingRecords, RecordPayment, UpdateObligation, UpdateResource, PLACEHOLDER_PREFIX,
};
pub use patch::FieldPatch;
pub use remote::{
    BranchComparisonRow, DashboardStats, InMemoryBackend, LedgerApi, ListQuery, ObligationApi,
    Page, PageMeta, RemoteError, ReportApi, ResourceApi, HAS_PAYMENTS_CODE, OVERPAYMENT_CODE,
};
pub use resource::{
    Branch, BranchDraft, BranchFilter, BranchPatch, InventoryDraft, InventoryFilter,
    InventoryItem, InventoryPatch, Resource, ResourceError,
};

// Re-exported so callers can build tokens without depending on tokio-util.
pub use tokio_util::sync::CancellationToken;
