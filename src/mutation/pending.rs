use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;
use uuid::Uuid;

use crate::error::MutationError;

/// Prefix of every client-generated id.
pub const PLACEHOLDER_PREFIX: &str = "tmp-";

#[derive(Debug, Clone)]
enum Placeholder {
    Pending,
    Confirmed { server_id: String, at: Instant },
}

/// Placeholder ids of optimistic creates, and the server ids they resolved to.
///
/// A placeholder never reaches the server: a second mutation against it
/// (a rapid double submit, say) is rejected with
/// [`MutationError::Unconfirmed`] until the create settles. Once it has,
/// [`resolve`](Self::resolve) maps the placeholder to the real id for the
/// retention window, after which the mapping is pruned.
#[derive(Clone)]
pub struct PendingRecords {
    records: Arc<Mutex<HashMap<String, Placeholder>>>,
    retention: Duration,
}

impl Default for PendingRecords {
    fn default() -> Self {
        Self::new()
    }
}

impl PendingRecords {
    pub fn new() -> Self {
        Self::with_retention(Duration::from_secs(5 * 60))
    }

    /// Confirmed mappings older than `retention` are dropped.
    pub fn with_retention(retention: Duration) -> Self {
        PendingRecords {
            records: Arc::new(Mutex::new(HashMap::new())),
            retention,
        }
    }

    pub fn placeholder_id() -> String {
        format!("{}{}", PLACEHOLDER_PREFIX, Uuid::new_v4())
    }

    pub fn is_placeholder(id: &str) -> bool {
        id.starts_with(PLACEHOLDER_PREFIX)
    }

    fn lock(
        &self,
        operation: &'static str,
    ) -> Result<MutexGuard<'_, HashMap<String, Placeholder>>, MutationError> {
        self.records
            .lock()
            .map_err(|_| MutationError::LockPoisoned(operation))
    }

    pub(crate) fn register(&self, placeholder: &str) -> Result<(), MutationError> {
        self.lock("register")?
            .insert(placeholder.to_string(), Placeholder::Pending);
        Ok(())
    }

    pub(crate) fn confirm(
        &self,
        placeholder: &str,
        server_id: Option<String>,
    ) -> Result<(), MutationError> {
        let now = Instant::now();
        let mut records = self.lock("confirm")?;
        match server_id {
            Some(server_id) => {
                records.insert(
                    placeholder.to_string(),
                    Placeholder::Confirmed { server_id, at: now },
                );
            }
            None => {
                records.remove(placeholder);
            }
        }
        Self::expire(&mut records, now, self.retention);
        Ok(())
    }

    /// The create failed; the placeholder will never resolve.
    pub(crate) fn abandon(&self, placeholder: &str) -> Result<(), MutationError> {
        self.lock("abandon")?.remove(placeholder);
        Ok(())
    }

    pub fn is_pending(&self, id: &str) -> Result<bool, MutationError> {
        Ok(matches!(
            self.lock("is_pending")?.get(id),
            Some(Placeholder::Pending)
        ))
    }

    pub fn pending_count(&self) -> Result<usize, MutationError> {
        Ok(self
            .lock("pending_count")?
            .values()
            .filter(|record| matches!(record, Placeholder::Pending))
            .count())
    }

    /// Placeholders still remembered, pending or confirmed.
    pub fn len(&self) -> Result<usize, MutationError> {
        Ok(self.lock("len")?.len())
    }

    pub fn is_empty(&self) -> Result<bool, MutationError> {
        Ok(self.len()? == 0)
    }

    /// Server id for `id`. Real ids pass through unchanged.
    pub fn resolve(&self, id: &str) -> Result<String, MutationError> {
        if !Self::is_placeholder(id) {
            return Ok(id.to_string());
        }
        match self.lock("resolve")?.get(id) {
            Some(Placeholder::Confirmed { server_id, .. }) => Ok(server_id.clone()),
            _ => Err(MutationError::Unconfirmed { id: id.to_string() }),
        }
    }

    /// Fail with [`MutationError::Unconfirmed`] if `id` is a placeholder.
    pub fn ensure_confirmed(&self, id: &str) -> Result<(), MutationError> {
        if Self::is_placeholder(id) {
            return Err(MutationError::Unconfirmed { id: id.to_string() });
        }
        Ok(())
    }

    /// Drop the mapping of a confirmed placeholder.
    pub fn forget(&self, placeholder: &str) -> Result<(), MutationError> {
        let mut records = self.lock("forget")?;
        if matches!(records.get(placeholder), Some(Placeholder::Confirmed { .. })) {
            records.remove(placeholder);
        }
        Ok(())
    }

    /// Drop every confirmed mapping. Pending placeholders are kept, their
    /// creates are still in flight.
    pub fn forget_confirmed(&self) -> Result<usize, MutationError> {
        let mut records = self.lock("forget_confirmed")?;
        let before = records.len();
        records.retain(|_, record| matches!(record, Placeholder::Pending));
        Ok(before - records.len())
    }

    /// Drop confirmed mappings older than the retention window.
    pub fn prune(&self) -> Result<usize, MutationError> {
        let mut records = self.lock("prune")?;
        Ok(Self::expire(&mut records, Instant::now(), self.retention))
    }

    fn expire(
        records: &mut HashMap<String, Placeholder>,
        now: Instant,
        retention: Duration,
    ) -> usize {
        let before = records.len();
        records.retain(|_, record| match record {
            Placeholder::Pending => true,
            Placeholder::Confirmed { at, .. } => now.duration_since(*at) < retention,
        });
        let expired = before - records.len();
        if expired > 0 {
            debug!(expired, "placeholder mappings pruned");
        }
        expired
    }
}
