//! Branches and inventory through the generic resource path.

#[path = "../support/mod.rs"]
mod support;

use optimistic_ledger::{
    Aggregate, Branch, BranchDraft, BranchFilter, BranchPatch, EntityKind, FieldPatch,
    InMemoryBackend, InventoryDraft, InventoryFilter, InventoryItem, InventoryPatch, ListQuery,
    CacheError, MutationError, Obligation, ObligationFilter, ObligationKind, Page, QueryKey,
    RemoteError,
};
use support::{client, money, obligation, DEBT};

fn draft_item(branch_id: &str, quantity: i64) -> InventoryDraft {
    InventoryDraft {
        branch_id: branch_id.to_string(),
        name: "Widget".to_string(),
        sku: "W-1".to_string(),
        quantity,
        unit_cost: money(5),
        reorder_level: 2,
    }
}

fn branch_list() -> QueryKey {
    QueryKey::list(EntityKind::Branch, &ListQuery::<BranchFilter>::first_page(20)).unwrap()
}

#[tokio::test]
async fn branch_create_and_rename() {
    let backend = InMemoryBackend::new();
    let client = client(backend.clone());
    client.branches(&client.first_page()).await.unwrap();

    let north = client
        .create_resource::<Branch>(BranchDraft::new("North"))
        .await
        .unwrap();
    assert!(north.is_active);
    let cached: Page<Branch> = client.cache().get(&branch_list()).unwrap().unwrap();
    assert_eq!(cached.items[0].id, north.id);

    let renamed = client
        .update_resource::<Branch>(
            &north.id,
            BranchPatch {
                name: Some("North Side".to_string()),
                phone: FieldPatch::Set("555-0100".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(renamed.name, "North Side");
    assert_eq!(renamed.phone.as_deref(), Some("555-0100"));

    let listed = client.branches(&client.first_page()).await.unwrap();
    assert_eq!(listed.items, vec![renamed]);
}

#[tokio::test]
async fn empty_branch_name_is_rejected_locally() {
    let backend = InMemoryBackend::new();
    let client = client(backend.clone());

    let err = client
        .create_resource::<Branch>(BranchDraft::new("  "))
        .await
        .unwrap_err();
    assert!(matches!(err, MutationError::Validation(_)));
    assert_eq!(backend.total_calls(), 0);
}

#[tokio::test]
async fn stock_adjustments_compose() {
    let backend = InMemoryBackend::new();
    let branch = backend.seed_branch(BranchDraft::new("North")).unwrap();
    let item = backend.seed_item(draft_item(&branch.id, 10)).unwrap();
    let client = client(backend.clone());
    client.inventory(&client.first_page()).await.unwrap();

    let adjusted = client
        .update_resource::<InventoryItem>(&item.id, InventoryPatch::adjust(-3))
        .await
        .unwrap();
    assert_eq!(adjusted.quantity, 7);

    // The cached quantity is 7 now, so taking 8 is caught before the call.
    client.resource::<InventoryItem>(&item.id).await.unwrap();
    let calls = backend.calls("update_inventory");
    let err = client
        .update_resource::<InventoryItem>(&item.id, InventoryPatch::adjust(-8))
        .await
        .unwrap_err();
    assert!(matches!(err, MutationError::Validation(_)));
    assert_eq!(backend.calls("update_inventory"), calls);
}

#[tokio::test]
async fn item_for_unknown_branch_is_rejected_by_the_server() {
    let backend = InMemoryBackend::new();
    let client = client(backend.clone());
    client.inventory(&client.first_page()).await.unwrap();
    let before = client.cache().dump().unwrap();

    let err = client
        .create_resource::<InventoryItem>(draft_item("branch-404", 1))
        .await
        .unwrap_err();

    assert!(matches!(err, MutationError::Validation(_)));
    assert_eq!(client.cache().dump().unwrap(), before);
}

#[tokio::test]
async fn branch_delete_reconciles_dependent_views() {
    let backend = InMemoryBackend::new();
    let branch = backend.seed_branch(BranchDraft::new("North")).unwrap();
    backend.seed_item(draft_item(&branch.id, 4)).unwrap();
    let debt = backend
        .seed_obligation(DEBT, obligation("Acme", 100).with_branch(branch.id.clone()))
        .unwrap();
    let client = client(backend.clone());

    let by_branch = ListQuery::new(ObligationFilter::branch(branch.id.clone()), 1, 20);
    let stock = ListQuery::new(
        InventoryFilter {
            branch_id: Some(branch.id.clone()),
            low_stock: None,
        },
        1,
        20,
    );
    client.branches(&client.first_page()).await.unwrap();
    assert_eq!(client.obligations(DEBT, &by_branch).await.unwrap().items.len(), 1);
    assert_eq!(client.inventory(&stock).await.unwrap().items.len(), 1);
    client
        .obligations(ObligationKind::Receivable, &client.first_page())
        .await
        .unwrap();
    assert_eq!(client.branch_comparison().await.unwrap().len(), 1);
    assert_eq!(client.dashboard().await.unwrap().branch_count, 1);

    client.delete_resource::<Branch>(&branch.id).await.unwrap();

    let cache = client.cache();
    let cached: Page<Branch> = cache.get(&branch_list()).unwrap().unwrap();
    assert!(cached.items.is_empty());
    for key in [
        QueryKey::list(EntityKind::Obligation(DEBT), &by_branch).unwrap(),
        QueryKey::list(EntityKind::Inventory, &stock).unwrap(),
        QueryKey::list(
            EntityKind::Obligation(ObligationKind::Receivable),
            &ListQuery::<ObligationFilter>::first_page(20),
        )
        .unwrap(),
        QueryKey::aggregate(Aggregate::Dashboard),
        QueryKey::aggregate(Aggregate::BranchComparison),
    ] {
        assert!(cache.is_stale(&key).unwrap(), "{} should be stale", key);
    }

    assert!(client.obligations(DEBT, &by_branch).await.unwrap().items.is_empty());
    assert!(client.inventory(&stock).await.unwrap().items.is_empty());
    assert!(client.branch_comparison().await.unwrap().is_empty());
    assert_eq!(client.dashboard().await.unwrap().branch_count, 0);
    assert_eq!(
        client.obligation(DEBT, &debt.id).await.unwrap().branch_id,
        None
    );
}

#[tokio::test]
async fn branch_delete_refreshes_cached_details() {
    let backend = InMemoryBackend::new();
    let branch = backend.seed_branch(BranchDraft::new("North")).unwrap();
    let item = backend.seed_item(draft_item(&branch.id, 4)).unwrap();
    let debt = backend
        .seed_obligation(DEBT, obligation("Acme", 100).with_branch(branch.id.clone()))
        .unwrap();
    let client = client(backend.clone());

    let cached = client.obligation(DEBT, &debt.id).await.unwrap();
    assert_eq!(cached.branch_id.as_deref(), Some(branch.id.as_str()));
    client.resource::<InventoryItem>(&item.id).await.unwrap();

    client.delete_resource::<Branch>(&branch.id).await.unwrap();

    let debt_detail = QueryKey::detail(EntityKind::Obligation(DEBT), &debt.id);
    let item_detail = QueryKey::detail(EntityKind::Inventory, &item.id);
    let cache = client.cache();
    assert!(cache.is_stale(&debt_detail).unwrap());
    assert!(cache.is_stale(&item_detail).unwrap());

    let refetched = client.obligation(DEBT, &debt.id).await.unwrap();
    assert_eq!(refetched.branch_id, None);
    let cached: Obligation = cache.get(&debt_detail).unwrap().unwrap();
    assert_eq!(cached.branch_id, None);

    let err = client.resource::<InventoryItem>(&item.id).await.unwrap_err();
    assert!(matches!(err, CacheError::Fetch(ref remote) if remote.status_code() == Some(404)));
}

#[tokio::test]
async fn failed_branch_delete_puts_it_back() {
    let backend = InMemoryBackend::new();
    let branch = backend.seed_branch(BranchDraft::new("North")).unwrap();
    let client = client(backend.clone());
    client.branches(&client.first_page()).await.unwrap();
    client.resource::<Branch>(&branch.id).await.unwrap();
    let before = client.cache().dump().unwrap();

    backend.fail_next(RemoteError::status(403, "read only"));
    let err = client.delete_resource::<Branch>(&branch.id).await.unwrap_err();

    assert!(matches!(err, MutationError::Auth(_)));
    assert_eq!(client.cache().dump().unwrap(), before);
}
