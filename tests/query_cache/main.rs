//! Query cache behaviour: coalescing, staleness, cancellation, observers and
//! garbage collection.

#[path = "../support/mod.rs"]
mod support;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use optimistic_ledger::{
    CacheConfig, CacheError, CacheEvent, EntityKind, ListQuery, ObligationFilter, ObligationKind,
    QueryCache, QueryKey, RemoteError,
};
use serde_json::{json, Value};
use tokio::sync::oneshot;

fn debts() -> EntityKind {
    EntityKind::Obligation(ObligationKind::Debt)
}

fn counted(calls: &Arc<AtomicUsize>, value: Value) -> impl std::future::Future<Output = Result<Value, RemoteError>> + Send + 'static {
    calls.fetch_add(1, Ordering::SeqCst);
    async move {
        tokio::task::yield_now().await;
        Ok(value)
    }
}

#[tokio::test]
async fn concurrent_reads_share_one_request() {
    support::init_tracing();
    let cache = QueryCache::default();
    let key = QueryKey::detail(debts(), "debts-1");
    let calls = Arc::new(AtomicUsize::new(0));

    let (a, b) = tokio::join!(
        cache.fetch(&key, || counted(&calls, json!({"n": 1}))),
        cache.fetch(&key, || counted(&calls, json!({"n": 2}))),
    );

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    let (a, b) = (a.unwrap(), b.unwrap());
    assert_eq!(*a, json!({"n": 1}));
    assert!(Arc::ptr_eq(&a, &b));
}

#[tokio::test(start_paused = true)]
async fn fresh_data_is_served_until_stale_time() {
    let cache = QueryCache::new(CacheConfig::default().with_stale_time(Duration::from_secs(10)));
    let key = QueryKey::detail(debts(), "debts-1");
    let calls = Arc::new(AtomicUsize::new(0));

    cache.fetch(&key, || counted(&calls, json!(1))).await.unwrap();
    tokio::time::advance(Duration::from_secs(5)).await;
    cache.fetch(&key, || counted(&calls, json!(2))).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(!cache.is_stale(&key).unwrap());

    tokio::time::advance(Duration::from_secs(6)).await;
    assert!(cache.is_stale(&key).unwrap());
    let refetched = cache.fetch(&key, || counted(&calls, json!(2))).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(*refetched, json!(2));
}

#[tokio::test]
async fn invalidated_fetch_result_is_discarded() {
    support::init_tracing();
    let cache = QueryCache::default();
    let key = QueryKey::detail(debts(), "debts-1");
    let (respond, response) = oneshot::channel::<()>();

    let slow = cache.fetch(&key, || async move {
        let _ = response.await;
        Ok(json!({"notes": "old"}))
    });
    let interfere = async {
        tokio::task::yield_now().await;
        cache.set(&key, &json!({"notes": "new"})).unwrap();
        assert_eq!(cache.invalidate(&key).unwrap(), 1);
        let _ = respond.send(());
    };
    let (fetched, ()) = tokio::join!(slow, interfere);

    assert_eq!(*fetched.unwrap(), json!({"notes": "new"}));
    assert_eq!(*cache.peek(&key).unwrap().unwrap(), json!({"notes": "new"}));
    assert!(cache.is_stale(&key).unwrap());
}

#[tokio::test]
async fn cancelled_fetch_does_not_store() {
    let cache = QueryCache::default();
    let key = QueryKey::aggregate(optimistic_ledger::Aggregate::Dashboard);
    let (respond, response) = oneshot::channel::<()>();

    let slow = cache.fetch(&key, || async move {
        let _ = response.await;
        Ok(json!("late"))
    });
    let cancel = async {
        tokio::task::yield_now().await;
        assert!(cache.cancel(&key).unwrap());
        let _ = respond.send(());
    };
    let (fetched, ()) = tokio::join!(slow, cancel);

    // Nothing was cached, so the caller still gets the response, but the
    // cache does not keep it.
    assert_eq!(*fetched.unwrap(), json!("late"));
    assert_eq!(cache.peek(&key).unwrap(), None);
}

#[tokio::test]
async fn failed_fetch_keeps_previous_data() {
    let cache = QueryCache::default();
    let key = QueryKey::summary(ObligationKind::Payable);
    cache.set(&key, &json!({"total": 1})).unwrap();
    cache.invalidate(&key).unwrap();

    let err = cache
        .fetch(&key, || async { Err(RemoteError::Timeout) })
        .await
        .unwrap_err();

    assert_eq!(err, CacheError::Fetch(RemoteError::Timeout));
    assert_eq!(*cache.peek(&key).unwrap().unwrap(), json!({"total": 1}));
    assert!(!cache.entry_state(&key).unwrap().unwrap().fetching);
}

#[test]
fn invalidation_is_idempotent() {
    let cache = QueryCache::default();
    let list = QueryKey::list(debts(), &ListQuery::<ObligationFilter>::first_page(20)).unwrap();
    let detail = QueryKey::detail(debts(), "debts-1");
    cache.set_fresh(&list, &json!({"items": []})).unwrap();
    cache.set_fresh(&detail, &json!({"id": "debts-1"})).unwrap();

    cache.invalidate(&QueryKey::entity(debts())).unwrap();
    let once = (
        cache.dump().unwrap(),
        cache.entry_state(&list).unwrap(),
        cache.entry_state(&detail).unwrap(),
    );
    cache.invalidate(&QueryKey::entity(debts())).unwrap();
    let twice = (
        cache.dump().unwrap(),
        cache.entry_state(&list).unwrap(),
        cache.entry_state(&detail).unwrap(),
    );

    assert_eq!(once, twice);
}

#[test]
fn readers_never_see_a_half_written_page() {
    let cache = QueryCache::default();
    let key = QueryKey::list(debts(), &ListQuery::<ObligationFilter>::first_page(20)).unwrap();
    cache.set(&key, &json!({"items": [1, 2, 3]})).unwrap();

    let first = cache.peek(&key).unwrap().unwrap();
    let second = cache.peek(&key).unwrap().unwrap();
    assert!(Arc::ptr_eq(&first, &second));

    cache
        .update(&key, |mut page: Value| {
            page["items"] = json!([4, 5, 6, 7]);
            page
        })
        .unwrap();

    // The earlier readers still hold the complete old page.
    assert_eq!(*first, json!({"items": [1, 2, 3]}));
    assert_eq!(*cache.peek(&key).unwrap().unwrap(), json!({"items": [4, 5, 6, 7]}));
}

#[test]
fn equal_filters_share_a_key() {
    let built = ListQuery::new(ObligationFilter::branch("b1"), 1, 20);
    let literal = ListQuery::new(
        ObligationFilter {
            status: None,
            branch_id: Some("b1".to_string()),
            date_from: None,
            date_to: None,
        },
        1,
        20,
    );
    let other_page = ListQuery::new(ObligationFilter::branch("b1"), 2, 20);

    assert_eq!(
        QueryKey::list(debts(), &built).unwrap(),
        QueryKey::list(debts(), &literal).unwrap()
    );
    assert_ne!(
        QueryKey::list(debts(), &built).unwrap(),
        QueryKey::list(debts(), &other_page).unwrap()
    );
    assert!(QueryKey::list(debts(), &built)
        .unwrap()
        .starts_with(&QueryKey::lists(debts())));
}

#[tokio::test]
async fn observers_see_changes_to_their_key_only() {
    let cache = QueryCache::default();
    let watched = QueryKey::detail(debts(), "debts-1");
    let other = QueryKey::detail(debts(), "debts-2");
    let mut observer = cache.observe(&watched).unwrap();

    cache.set(&other, &json!(0)).unwrap();
    cache.set(&watched, &json!(1)).unwrap();
    cache.invalidate(&watched).unwrap();

    assert_eq!(observer.changed().await, Some(CacheEvent::Updated(watched.clone())));
    assert_eq!(observer.try_changed(), Some(CacheEvent::Invalidated(watched.clone())));
    assert_eq!(observer.try_changed(), None);
    assert_eq!(*observer.current().unwrap().unwrap(), json!(1));
}

#[tokio::test(start_paused = true)]
async fn garbage_collection_spares_observed_entries() {
    let config = CacheConfig::default()
        .with_stale_time(Duration::from_secs(1))
        .with_gc_time(Duration::from_secs(1));
    let cache = QueryCache::new(config);
    let kept = QueryKey::detail(debts(), "debts-1");
    let dropped = QueryKey::detail(debts(), "debts-2");
    cache.set_fresh(&kept, &json!("kept")).unwrap();
    cache.set_fresh(&dropped, &json!("dropped")).unwrap();
    let observer = cache.observe(&kept).unwrap();

    tokio::time::advance(Duration::from_millis(1500)).await;
    assert_eq!(cache.collect_garbage().unwrap(), 0);

    tokio::time::advance(Duration::from_secs(1)).await;
    assert_eq!(cache.collect_garbage().unwrap(), 1);
    assert_eq!(cache.peek(&dropped).unwrap(), None);
    assert!(cache.peek(&kept).unwrap().is_some());

    drop(observer);
    assert_eq!(cache.collect_garbage().unwrap(), 1);
    assert!(cache.is_empty().unwrap());
}

#[test]
fn separate_instances_are_isolated() {
    let a = QueryCache::default();
    let b = QueryCache::default();
    let key = QueryKey::summary(ObligationKind::Debt);
    a.set(&key, &json!(1)).unwrap();

    assert_eq!(b.peek(&key).unwrap(), None);
    a.clear().unwrap();
    assert!(a.is_empty().unwrap());
}
