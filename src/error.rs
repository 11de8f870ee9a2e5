use thiserror::Error;

use crate::cache::CacheError;
use crate::ledger::LedgerError;
use crate::mutation::MutationPhase;
use crate::remote::{RemoteError, OVERPAYMENT_CODE};
use crate::resource::ResourceError;

/// Failure surfaced to the caller of a mutation (or a query, for transport
/// and status failures). Semantic content of server failures is preserved.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MutationError {
    /// Detectable before any remote call; nothing was written.
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("overpayment: {0}")]
    Overpayment(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("not authorized: {0}")]
    Auth(String),
    #[error("not found: {0}")]
    NotFound(String),
    /// The target still carries a placeholder id awaiting server confirmation.
    #[error("record {id} is not confirmed by the server yet")]
    Unconfirmed { id: String },
    #[error("mutation cancelled")]
    Cancelled,
    #[error("illegal mutation transition {from:?} -> {to:?}")]
    IllegalTransition {
        from: MutationPhase,
        to: MutationPhase,
    },
    #[error(transparent)]
    Cache(CacheError),
    #[error("placeholder registry lock poisoned during {0}")]
    LockPoisoned(&'static str),
    /// Any other server failure.
    #[error("server error: {0}")]
    Server(String),
}

impl MutationError {
    /// Whether the failure came from the local rules, before the pipeline ran.
    pub fn is_local(&self) -> bool {
        matches!(
            self,
            MutationError::Validation(_) | MutationError::Unconfirmed { .. }
        )
    }
}

impl From<RemoteError> for MutationError {
    fn from(err: RemoteError) -> Self {
        match &err {
            RemoteError::Network(_) | RemoteError::Timeout => {
                MutationError::Transport(err.to_string())
            }
            RemoteError::Decode(_) => MutationError::Server(err.to_string()),
            RemoteError::Status {
                status,
                code,
                message,
            } => match status {
                400 if code.as_deref() == Some(OVERPAYMENT_CODE) => {
                    MutationError::Overpayment(message.clone())
                }
                400 | 422 => MutationError::Validation(message.clone()),
                401 | 403 => MutationError::Auth(message.clone()),
                404 => MutationError::NotFound(message.clone()),
                409 => MutationError::Conflict(message.clone()),
                _ => MutationError::Server(err.to_string()),
            },
        }
    }
}

impl From<CacheError> for MutationError {
    fn from(err: CacheError) -> Self {
        match err {
            CacheError::Fetch(remote) => remote.into(),
            other => MutationError::Cache(other),
        }
    }
}

impl From<LedgerError> for MutationError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::Overpayment { .. } => MutationError::Overpayment(err.to_string()),
            other => MutationError::Validation(other.to_string()),
        }
    }
}

impl From<ResourceError> for MutationError {
    fn from(err: ResourceError) -> Self {
        MutationError::Validation(err.to_string())
    }
}
