//! The payment lifecycle walked through the client, plus the two
//! interleavings that matter most: a failed call and a stale list fetch.

#[path = "../support/mod.rs"]
mod support;

use optimistic_ledger::{
    EntityKind, InMemoryBackend, ListQuery, MutationError, Obligation, ObligationFilter,
    ObligationPatch, ObligationStatus, Page, Payment, QueryKey, RemoteError,
};
use support::{client, gated_client, money, obligation, payment, GatedBackend, DEBT};

fn detail(id: &str) -> QueryKey {
    QueryKey::detail(EntityKind::Obligation(DEBT), id)
}

fn first_page() -> ListQuery<ObligationFilter> {
    ListQuery::first_page(20)
}

#[tokio::test]
async fn payment_lifecycle_from_active_to_paid() {
    let backend = InMemoryBackend::new();
    let client = client(backend.clone());

    // Created with the full amount outstanding.
    let created = client
        .create_obligation(DEBT, obligation("Acme", 1000))
        .await
        .unwrap();
    assert_eq!(created.remaining_amount(), money(1000));
    assert_eq!(created.status(), ObligationStatus::Active);

    // Half paid.
    let partial = client
        .record_payment(DEBT, &created.id, payment(500))
        .await
        .unwrap();
    assert_eq!(partial.remaining_amount(), money(500));
    assert_eq!(partial.status(), ObligationStatus::Partial);

    // Fully paid.
    let paid = client
        .record_payment(DEBT, &created.id, payment(500))
        .await
        .unwrap();
    assert_eq!(paid.remaining_amount(), money(0));
    assert_eq!(paid.status(), ObligationStatus::Paid);

    // Nothing left to pay: rejected, cache untouched.
    client.obligation(DEBT, &created.id).await.unwrap();
    let err = client
        .record_payment(DEBT, &created.id, payment(1))
        .await
        .unwrap_err();
    assert!(matches!(err, MutationError::Overpayment(_)));
    let cached: Obligation = client.cache().get(&detail(&created.id)).unwrap().unwrap();
    assert_eq!(cached.remaining_amount(), money(0));
    assert_eq!(cached.status(), ObligationStatus::Paid);
    assert_eq!(backend.stored_payments(&created.id).len(), 2);
}

#[tokio::test]
async fn transport_failure_rolls_back_the_payment() {
    let backend = InMemoryBackend::new();
    let debt = backend.seed_obligation(DEBT, obligation("Acme", 1000)).unwrap();
    let client = client(backend.clone());
    client.obligations(DEBT, &first_page()).await.unwrap();
    client.obligation(DEBT, &debt.id).await.unwrap();
    client.payments(DEBT, &debt.id).await.unwrap();

    backend.fail_next(RemoteError::Network("unreachable".into()));
    let err = client
        .record_payment(DEBT, &debt.id, payment(300))
        .await
        .unwrap_err();
    assert!(matches!(err, MutationError::Transport(_)));

    let cached: Obligation = client.cache().get(&detail(&debt.id)).unwrap().unwrap();
    assert_eq!(cached.remaining_amount(), money(1000));
    let listed: Page<Obligation> = client
        .cache()
        .get(&QueryKey::list(EntityKind::Obligation(DEBT), &first_page()).unwrap())
        .unwrap()
        .unwrap();
    assert_eq!(listed.items[0].remaining_amount(), money(1000));

    let payment_lists = client
        .cache()
        .keys_with_prefix(&QueryKey::entity(EntityKind::Obligation(DEBT)))
        .unwrap()
        .into_iter()
        .filter(|key| key.segments().get(1).map(String::as_str) == Some("payments"));
    for key in payment_lists {
        let history: Vec<Payment> = client.cache().get(&key).unwrap().unwrap();
        assert!(history.is_empty(), "{} still lists a payment", key);
    }
}

#[tokio::test]
async fn stale_list_fetch_cannot_overwrite_an_optimistic_update() {
    let backend = GatedBackend::default();
    let debt = backend
        .inner()
        .seed_obligation(DEBT, obligation("Acme", 1000))
        .unwrap();
    let client = gated_client(&backend);
    let list = QueryKey::list(EntityKind::Obligation(DEBT), &first_page()).unwrap();
    client.obligations(DEBT, &first_page()).await.unwrap();
    client.cache().invalidate(&list).unwrap();

    // A refetch of the list leaves the server before the update does.
    let list_gate = backend.gate("list_obligations");
    let reading = tokio::spawn({
        let client = client.clone();
        async move { client.obligations(DEBT, &first_page()).await }
    });
    list_gate.arrived().await;

    let update_gate = backend.gate("update_obligation");
    let updating = tokio::spawn({
        let client = client.clone();
        let id = debt.id.clone();
        async move {
            client
                .update_obligation(DEBT, &id, ObligationPatch::notes("call on Friday"))
                .await
        }
    });
    update_gate.arrived().await;

    let notes = |page: &Page<Obligation>| page.items[0].notes.clone();
    let optimistic: Page<Obligation> = client.cache().get(&list).unwrap().unwrap();
    assert_eq!(notes(&optimistic), Some("call on Friday".to_string()));

    // The old response arrives after the optimistic write and is dropped.
    list_gate.open();
    let read = reading.await.unwrap().unwrap();
    assert_eq!(notes(&read), Some("call on Friday".to_string()));
    let cached: Page<Obligation> = client.cache().get(&list).unwrap().unwrap();
    assert_eq!(notes(&cached), Some("call on Friday".to_string()));

    update_gate.open();
    updating.await.unwrap().unwrap();
    assert!(client.cache().is_stale(&list).unwrap());

    // Invalidation, not the stale fetch, brings in the server's value.
    let settled = client.obligations(DEBT, &first_page()).await.unwrap();
    assert_eq!(notes(&settled), Some("call on Friday".to_string()));
    assert_eq!(backend.inner().calls("list_obligations"), 3);
}
