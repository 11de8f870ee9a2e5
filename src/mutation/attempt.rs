use tracing::{debug, warn};

use super::{MutationPhase, MutationSnapshot};
use crate::cache::{QueryCache, QueryKey};
use crate::error::MutationError;

/// The cache side of one mutation: cancel, snapshot, apply, then commit or
/// roll back. Holds every written key while pending so that reads serve the
/// optimistic data instead of refetching over it.
pub struct MutationAttempt {
    cache: QueryCache,
    phase: MutationPhase,
    snapshot: MutationSnapshot,
    held: Vec<QueryKey>,
}

impl MutationAttempt {
    pub fn new(cache: &QueryCache) -> Self {
        MutationAttempt {
            cache: cache.clone(),
            phase: MutationPhase::Idle,
            snapshot: MutationSnapshot::default(),
            held: Vec::new(),
        }
    }

    pub fn phase(&self) -> MutationPhase {
        self.phase
    }

    pub fn snapshot(&self) -> &MutationSnapshot {
        &self.snapshot
    }

    fn advance(&mut self, to: MutationPhase) -> Result<(), MutationError> {
        self.phase = self.phase.transition(to)?;
        debug!(phase = ?self.phase, "mutation phase");
        Ok(())
    }

    /// Idle -> Pending. Cancels fetches under `cancel` and on `keys`,
    /// snapshots `keys`, then runs `apply`. If `apply` fails the snapshot is
    /// restored and the attempt ends rolled back.
    pub fn begin<F>(
        &mut self,
        keys: &[QueryKey],
        cancel: &[QueryKey],
        apply: F,
    ) -> Result<(), MutationError>
    where
        F: FnOnce(&QueryCache) -> Result<(), MutationError>,
    {
        self.advance(MutationPhase::Pending)?;

        for prefix in cancel {
            self.cache.cancel_prefix(prefix)?;
        }
        for key in keys {
            self.cache.cancel(key)?;
        }
        self.snapshot = MutationSnapshot::capture(&self.cache, keys)?;
        for key in self.snapshot.keys() {
            self.cache.hold(key)?;
            self.held.push(key.clone());
        }

        if let Err(err) = apply(&self.cache) {
            warn!(error = %err, "optimistic apply failed");
            self.rollback()?;
            return Err(err);
        }
        Ok(())
    }

    /// Pending -> Committed. The snapshot is discarded; invalidation is the
    /// caller's next step.
    pub fn commit(&mut self) -> Result<(), MutationError> {
        self.advance(MutationPhase::Committed)?;
        self.release()?;
        self.snapshot = MutationSnapshot::default();
        Ok(())
    }

    /// Pending -> RolledBack. Every touched key gets its snapshot data back.
    pub fn rollback(&mut self) -> Result<(), MutationError> {
        self.advance(MutationPhase::RolledBack)?;
        self.snapshot.restore(&self.cache)?;
        self.release()
    }

    fn release(&mut self) -> Result<(), MutationError> {
        for key in self.held.drain(..) {
            self.cache.release(&key)?;
        }
        Ok(())
    }
}

impl Drop for MutationAttempt {
    // A pending attempt dropped mid-flight (its future was dropped) must not
    // leave optimistic data or holds behind.
    fn drop(&mut self) {
        if self.phase == MutationPhase::Pending {
            if let Err(err) = self.rollback() {
                warn!(error = %err, "rollback of abandoned mutation failed");
            }
        }
    }
}
