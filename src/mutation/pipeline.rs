use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info_span, warn, Instrument};

use super::{MutationAttempt, MutationPhase, OptimisticMutation, PendingRecords};
use crate::cache::QueryCache;
use crate::error::MutationError;
use crate::invalidation::{InvalidationDispatcher, MutationEvent};

/// Drives [`OptimisticMutation`]s against one cache and one remote.
///
/// Two mutations on overlapping keys are not serialized: each snapshots
/// what it sees, and the invalidation after each settle brings the cache
/// back to server truth.
pub struct MutationPipeline<A> {
    api: Arc<A>,
    cache: QueryCache,
    dispatcher: InvalidationDispatcher,
    pending: PendingRecords,
}

impl<A> Clone for MutationPipeline<A> {
    fn clone(&self) -> Self {
        MutationPipeline {
            api: Arc::clone(&self.api),
            cache: self.cache.clone(),
            dispatcher: self.dispatcher.clone(),
            pending: self.pending.clone(),
        }
    }
}

impl<A: Send + Sync + 'static> MutationPipeline<A> {
    pub fn new(api: Arc<A>, cache: QueryCache) -> Self {
        MutationPipeline {
            api,
            pending: PendingRecords::with_retention(cache.config().gc_time),
            cache,
            dispatcher: InvalidationDispatcher::default(),
        }
    }

    pub fn with_dispatcher(mut self, dispatcher: InvalidationDispatcher) -> Self {
        self.dispatcher = dispatcher;
        self
    }

    pub fn api(&self) -> &Arc<A> {
        &self.api
    }

    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    pub fn pending(&self) -> &PendingRecords {
        &self.pending
    }

    pub fn dispatcher(&self) -> &InvalidationDispatcher {
        &self.dispatcher
    }

    pub async fn run<M>(&self, mutation: &M) -> Result<M::Output, MutationError>
    where
        M: OptimisticMutation<A>,
    {
        self.run_with_cancel(mutation, &CancellationToken::new()).await
    }

    /// Run `mutation`, abandoning the remote call if `token` fires first.
    ///
    /// A cancelled mutation is rolled back, but because the server may or
    /// may not have applied it, its views are invalidated as well.
    pub async fn run_with_cancel<M>(
        &self,
        mutation: &M,
        token: &CancellationToken,
    ) -> Result<M::Output, MutationError>
    where
        M: OptimisticMutation<A>,
    {
        let event = mutation.event();
        let span = info_span!(
            "mutation",
            kind = event.entity.path(),
            op = event.op.as_str(),
            id = mutation
                .target()
                .or(mutation.placeholder())
                .unwrap_or_default(),
        );
        self.drive(mutation, event, token).instrument(span).await
    }

    async fn drive<M>(
        &self,
        mutation: &M,
        event: MutationEvent,
        token: &CancellationToken,
    ) -> Result<M::Output, MutationError>
    where
        M: OptimisticMutation<A>,
    {
        if let Some(target) = mutation.target() {
            self.pending.ensure_confirmed(target)?;
        }
        if let Err(err) = mutation.validate(&self.cache) {
            debug!(error = %err, "rejected before the pipeline");
            return Err(err);
        }
        if token.is_cancelled() {
            return Err(MutationError::Cancelled);
        }

        let keys = mutation.affected_keys(&self.cache)?;
        let cancel = self.dispatcher.map().prefixes(&event);
        let placeholder = mutation.placeholder();
        if let Some(placeholder) = placeholder {
            self.pending.register(placeholder)?;
        }

        let mut attempt = MutationAttempt::new(&self.cache);
        if let Err(err) = attempt.begin(&keys, &cancel, |cache| mutation.apply_optimistic(cache)) {
            self.abandon(placeholder);
            return Err(err);
        }

        let outcome = tokio::select! {
            biased;
            _ = token.cancelled() => None,
            result = mutation.execute(&self.api) => Some(result),
        };

        match outcome {
            Some(Ok(output)) => {
                if let Err(err) = mutation.reconcile(&self.cache, &output) {
                    // Invalidation below still corrects whatever was left behind.
                    warn!(error = %err, "reconcile failed");
                }
                attempt.commit()?;
                let settled_id = mutation.settled_id(&output);
                if let Some(placeholder) = placeholder {
                    self.pending.confirm(placeholder, settled_id.clone())?;
                }
                let settled = MutationEvent {
                    id: settled_id,
                    ..event
                };
                self.dispatcher.dispatch(&self.cache, &settled, &keys)?;
                debug!(phase = ?MutationPhase::Committed, "mutation settled");
                Ok(output)
            }
            Some(Err(remote)) => {
                let err = MutationError::from(remote);
                warn!(error = %err, "remote call failed, rolling back");
                attempt.rollback()?;
                self.abandon(placeholder);
                Err(err)
            }
            None => {
                warn!("mutation cancelled, rolling back");
                attempt.rollback()?;
                self.abandon(placeholder);
                self.dispatcher.dispatch(&self.cache, &event, &keys)?;
                Err(MutationError::Cancelled)
            }
        }
    }

    // Failure paths only: the original error is the one returned.
    fn abandon(&self, placeholder: Option<&str>) {
        if let Some(placeholder) = placeholder {
            if let Err(err) = self.pending.abandon(placeholder) {
                warn!(error = %err, placeholder, "placeholder not released");
            }
        }
    }
}
