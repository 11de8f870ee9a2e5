//! Optimistic mutation pipeline.
//!
//! Every create, update, pay and delete runs the same sequence:
//!
//! 1. **Cancel** in-flight fetches for the keys about to be rewritten, so a
//!    stale read cannot land on top of the optimistic write.
//! 2. **Snapshot** the data of every key the mutation will touch.
//! 3. **Apply** the locally predicted result, using the same ledger rules
//!    the server applies.
//! 4. **Execute** the remote call.
//! 5. **Settle**: on success discard the snapshot and invalidate every
//!    affected view; on failure restore the snapshot and surface the error
//!    without invalidating.
//!
//! A mutation is a value implementing [`OptimisticMutation`]; the
//! [`MutationPipeline`] drives it through the phases of a
//! [`MutationAttempt`].
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use chrono::NaiveDate;
//! use optimistic_ledger::{
//!     InMemoryBackend, MutationPipeline, NewObligation, NewPayment, ObligationKind, QueryCache,
//!     RecordPayment,
//! };
//! use rust_decimal::Decimal;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let date = NaiveDate::from_ymd_opt(2024, 1, 10).unwrap();
//! let backend = InMemoryBackend::new();
//! let debt = backend.seed_obligation(
//!     ObligationKind::Debt,
//!     NewObligation::new("Acme", Decimal::from(1000), date),
//! )?;
//!
//! let pipeline = MutationPipeline::new(Arc::new(backend), QueryCache::default());
//! let payment = NewPayment::new(Decimal::from(400), date);
//! let paid = pipeline
//!     .run(&RecordPayment::new(ObligationKind::Debt, debt.id.clone(), payment))
//!     .await?;
//! assert_eq!(paid.remaining_amount(), Decimal::from(600));
//! # Ok(())
//! # }
//! ```

mod attempt;
mod lists;
mod obligation;
mod pending;
mod pipeline;
mod resource;
mod snapshot;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::cache::{QueryCache, QueryKey};
use crate::error::MutationError;
use crate::invalidation::MutationEvent;
use crate::remote::RemoteError;

pub use attempt::MutationAttempt;
pub use lists::ListedRecord;
pub use obligation::{CreateObligation, DeleteObligation, RecordPayment, UpdateObligation};
pub use pending::{PendingRecords, PLACEHOLDER_PREFIX};
pub use pipeline::MutationPipeline;
pub use resource::{CreateResource, DeleteResource, UpdateResource};
pub use snapshot::MutationSnapshot;

/// Lifecycle of one mutation attempt.
///
/// ```text
/// Idle -> Pending -> Committed
///                 \-> RolledBack
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MutationPhase {
    Idle,
    Pending,
    Committed,
    RolledBack,
}

impl MutationPhase {
    pub fn can_transition(self, to: MutationPhase) -> bool {
        matches!(
            (self, to),
            (MutationPhase::Idle, MutationPhase::Pending)
                | (MutationPhase::Pending, MutationPhase::Committed)
                | (MutationPhase::Pending, MutationPhase::RolledBack)
        )
    }

    pub fn transition(self, to: MutationPhase) -> Result<MutationPhase, MutationError> {
        if self.can_transition(to) {
            Ok(to)
        } else {
            Err(MutationError::IllegalTransition { from: self, to })
        }
    }

    pub fn is_settled(self) -> bool {
        matches!(self, MutationPhase::Committed | MutationPhase::RolledBack)
    }
}

/// A mutation that can be predicted locally.
///
/// `validate`, `affected_keys` and `apply_optimistic` are synchronous and
/// only touch the cache; `execute` is the single suspension point.
#[async_trait]
pub trait OptimisticMutation<A: Send + Sync>: Send + Sync {
    type Output: Send;

    /// Entity, operation and (server) id, for logging and invalidation.
    fn event(&self) -> MutationEvent;

    /// Existing record the mutation targets, if any. Placeholder ids are
    /// rejected before anything else runs.
    fn target(&self) -> Option<&str> {
        None
    }

    /// Placeholder id this mutation introduces, for creates.
    fn placeholder(&self) -> Option<&str> {
        None
    }

    /// Checks against the local rules and cached state. A failure here
    /// leaves the cache untouched.
    fn validate(&self, cache: &QueryCache) -> Result<(), MutationError>;

    /// Every key `apply_optimistic` may write.
    fn affected_keys(&self, cache: &QueryCache) -> Result<Vec<QueryKey>, MutationError>;

    fn apply_optimistic(&self, cache: &QueryCache) -> Result<(), MutationError>;

    async fn execute(&self, api: &A) -> Result<Self::Output, RemoteError>;

    /// Write what the server returned where that is exact (e.g. swapping a
    /// placeholder for the real record). Invalidation follows regardless.
    fn reconcile(&self, _cache: &QueryCache, _output: &Self::Output) -> Result<(), MutationError> {
        Ok(())
    }

    /// Server id of the settled record, when it differs from `event().id`.
    fn settled_id(&self, _output: &Self::Output) -> Option<String> {
        self.event().id
    }
}
