use std::marker::PhantomData;

use async_trait::async_trait;

use super::lists::{self, ListedRecord};
use super::{OptimisticMutation, PendingRecords};
use crate::cache::{QueryCache, QueryKey};
use crate::error::MutationError;
use crate::invalidation::{MutationEvent, MutationOp};
use crate::remote::{RemoteError, ResourceApi};
use crate::resource::Resource;

fn resource_keys<R: Resource>(cache: &QueryCache, id: &str) -> Result<Vec<QueryKey>, MutationError> {
    let mut keys = lists::list_keys(cache, R::KIND)?;
    keys.push(QueryKey::detail(R::KIND, id));
    Ok(keys)
}

pub struct CreateResource<R: Resource> {
    draft: R::Draft,
    placeholder: String,
}

impl<R: Resource> CreateResource<R> {
    pub fn new(draft: R::Draft) -> Self {
        CreateResource {
            draft,
            placeholder: PendingRecords::placeholder_id(),
        }
    }

    pub fn placeholder_id(&self) -> &str {
        &self.placeholder
    }
}

#[async_trait]
impl<R, A> OptimisticMutation<A> for CreateResource<R>
where
    R: Resource + ListedRecord,
    A: ResourceApi<R>,
{
    type Output = R;

    fn event(&self) -> MutationEvent {
        MutationEvent::new(R::KIND, MutationOp::Create, None)
    }

    fn placeholder(&self) -> Option<&str> {
        Some(&self.placeholder)
    }

    fn validate(&self, _cache: &QueryCache) -> Result<(), MutationError> {
        R::create(&self.placeholder, &self.draft)?;
        Ok(())
    }

    fn affected_keys(&self, cache: &QueryCache) -> Result<Vec<QueryKey>, MutationError> {
        resource_keys::<R>(cache, &self.placeholder)
    }

    fn apply_optimistic(&self, cache: &QueryCache) -> Result<(), MutationError> {
        let predicted = R::create(&self.placeholder, &self.draft)?;
        lists::prepend(cache, R::KIND, &predicted)?;
        cache.set(&QueryKey::detail(R::KIND, &self.placeholder), &predicted)?;
        Ok(())
    }

    async fn execute(&self, api: &A) -> Result<R, RemoteError> {
        api.create(&self.draft).await
    }

    fn reconcile(&self, cache: &QueryCache, created: &R) -> Result<(), MutationError> {
        lists::replace(cache, R::KIND, &self.placeholder, created)?;
        cache.remove(&QueryKey::detail(R::KIND, &self.placeholder))?;
        cache.set(&QueryKey::detail(R::KIND, created.id()), created)?;
        Ok(())
    }

    fn settled_id(&self, created: &R) -> Option<String> {
        Some(created.id().to_string())
    }
}

pub struct UpdateResource<R: Resource> {
    id: String,
    patch: R::Patch,
}

impl<R: Resource> UpdateResource<R> {
    pub fn new(id: impl Into<String>, patch: R::Patch) -> Self {
        UpdateResource {
            id: id.into(),
            patch,
        }
    }
}

#[async_trait]
impl<R, A> OptimisticMutation<A> for UpdateResource<R>
where
    R: Resource + ListedRecord,
    A: ResourceApi<R>,
{
    type Output = R;

    fn event(&self) -> MutationEvent {
        MutationEvent::new(R::KIND, MutationOp::Update, Some(self.id.clone()))
    }

    fn target(&self) -> Option<&str> {
        Some(&self.id)
    }

    fn validate(&self, cache: &QueryCache) -> Result<(), MutationError> {
        if let Some(current) = lists::find::<R>(cache, R::KIND, &self.id)? {
            current.apply_patch(&self.patch)?;
        }
        Ok(())
    }

    fn affected_keys(&self, cache: &QueryCache) -> Result<Vec<QueryKey>, MutationError> {
        resource_keys::<R>(cache, &self.id)
    }

    fn apply_optimistic(&self, cache: &QueryCache) -> Result<(), MutationError> {
        let Some(current) = lists::find::<R>(cache, R::KIND, &self.id)? else {
            return Ok(());
        };
        let next = current.apply_patch(&self.patch)?;
        lists::replace(cache, R::KIND, &self.id, &next)?;
        cache.set(&QueryKey::detail(R::KIND, &self.id), &next)?;
        Ok(())
    }

    async fn execute(&self, api: &A) -> Result<R, RemoteError> {
        api.update(&self.id, &self.patch).await
    }

    fn reconcile(&self, cache: &QueryCache, updated: &R) -> Result<(), MutationError> {
        lists::replace(cache, R::KIND, &self.id, updated)?;
        cache.set(&QueryKey::detail(R::KIND, &self.id), updated)?;
        Ok(())
    }
}

pub struct DeleteResource<R: Resource> {
    id: String,
    resource: PhantomData<fn() -> R>,
}

impl<R: Resource> DeleteResource<R> {
    pub fn new(id: impl Into<String>) -> Self {
        DeleteResource {
            id: id.into(),
            resource: PhantomData,
        }
    }
}

#[async_trait]
impl<R, A> OptimisticMutation<A> for DeleteResource<R>
where
    R: Resource + ListedRecord,
    A: ResourceApi<R>,
{
    type Output = ();

    fn event(&self) -> MutationEvent {
        MutationEvent::new(R::KIND, MutationOp::Delete, Some(self.id.clone()))
    }

    fn target(&self) -> Option<&str> {
        Some(&self.id)
    }

    fn validate(&self, _cache: &QueryCache) -> Result<(), MutationError> {
        Ok(())
    }

    fn affected_keys(&self, cache: &QueryCache) -> Result<Vec<QueryKey>, MutationError> {
        resource_keys::<R>(cache, &self.id)
    }

    fn apply_optimistic(&self, cache: &QueryCache) -> Result<(), MutationError> {
        lists::remove::<R>(cache, R::KIND, &self.id)?;
        cache.remove(&QueryKey::detail(R::KIND, &self.id))?;
        Ok(())
    }

    async fn execute(&self, api: &A) -> Result<(), RemoteError> {
        ResourceApi::<R>::delete(api, &self.id).await
    }
}
