//! Resources - the non-ledger entity families that still take the optimistic
//! path: branches and inventory items.

mod branch;
mod inventory;

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

use crate::cache::EntityKind;

pub use branch::{Branch, BranchDraft, BranchFilter, BranchPatch};
pub use inventory::{InventoryDraft, InventoryFilter, InventoryItem, InventoryPatch};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResourceError {
    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl ResourceError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        ResourceError::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

/// A cached entity with typed creation input, patch and list filter.
///
/// `create` and `apply_patch` are pure, like the ledger functions: they
/// predict the server's result for the optimistic write.
pub trait Resource: Serialize + DeserializeOwned + Clone + PartialEq + Send + Sync + 'static {
    const KIND: EntityKind;

    type Draft: Serialize + Clone + Send + Sync + 'static;
    type Patch: Serialize + Clone + Send + Sync + 'static;
    type Filter: Serialize + DeserializeOwned + Clone + Default + Send + Sync + 'static;

    fn id(&self) -> &str;

    fn create(id: &str, draft: &Self::Draft) -> Result<Self, ResourceError>;

    fn apply_patch(&self, patch: &Self::Patch) -> Result<Self, ResourceError>;

    fn matches(&self, filter: &Self::Filter) -> bool;
}
