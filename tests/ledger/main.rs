//! Balance and status rules of the obligation ledger, checked against the
//! local model and the in-memory server.

#[path = "../support/mod.rs"]
mod support;

use optimistic_ledger::{
    apply_payment, create_obligation, record_payment, verify_balance, InMemoryBackend,
    LedgerError, LedgerSummary, ObligationApi, ObligationKind, ObligationStatus, ReportApi,
};
use support::{date, money, obligation, payment, DEBT};

fn assert_consistent(o: &optimistic_ledger::Obligation) {
    assert!(o.remaining_amount() >= money(0));
    assert!(o.remaining_amount() <= o.original_amount());
    let expected = if o.remaining_amount() == o.original_amount() {
        ObligationStatus::Active
    } else if o.remaining_amount() == money(0) {
        ObligationStatus::Paid
    } else {
        ObligationStatus::Partial
    };
    assert_eq!(o.status(), expected);
}

#[test]
fn payments_walk_the_status_machine() {
    let mut current = create_obligation("debts-1", DEBT, obligation("Acme", 900)).unwrap();
    assert_consistent(&current);
    assert_eq!(current.status(), ObligationStatus::Active);

    let mut history = Vec::new();
    for (n, amount) in [200, 300, 400].into_iter().enumerate() {
        let (next, paid) = record_payment(&current, format!("pay-{}", n), &payment(amount)).unwrap();
        history.push(paid);
        current = next;
        assert_consistent(&current);
        verify_balance(&current, &history).unwrap();
    }

    assert_eq!(current.remaining_amount(), money(0));
    assert_eq!(current.status(), ObligationStatus::Paid);
}

#[test]
fn rejected_payments_leave_the_obligation_untouched() {
    let debt = create_obligation("debts-1", DEBT, obligation("Acme", 100)).unwrap();

    assert!(matches!(
        apply_payment(&debt, money(0)),
        Err(LedgerError::InvalidAmount { .. })
    ));
    assert!(matches!(
        apply_payment(&debt, money(101)),
        Err(LedgerError::Overpayment { .. })
    ));
    assert_eq!(debt.remaining_amount(), money(100));
    assert_eq!(debt.status(), ObligationStatus::Active);
}

#[test]
fn verify_balance_detects_missing_payments() {
    let debt = create_obligation("debts-1", DEBT, obligation("Acme", 100)).unwrap();
    let (paid, _) = record_payment(&debt, "pay-1", &payment(40)).unwrap();

    let err = verify_balance(&paid, &[]).unwrap_err();
    assert!(matches!(err, LedgerError::Inconsistent { .. }));
}

#[test]
fn creation_rejects_due_date_before_date() {
    let input = obligation("Acme", 100).with_due_date(date(1, 1));
    assert!(matches!(
        create_obligation("debts-1", DEBT, input),
        Err(LedgerError::DueBeforeDate { .. })
    ));
}

#[test]
fn inconsistent_records_do_not_deserialize() {
    let body = serde_json::json!({
        "id": "debts-9",
        "kind": "debt",
        "counterpartyName": "Acme",
        "originalAmount": "100",
        "remainingAmount": "40",
        "status": "ACTIVE",
        "currency": "USD",
        "date": "2024-01-15",
    });
    assert!(serde_json::from_value::<optimistic_ledger::Obligation>(body).is_err());
}

#[tokio::test]
async fn server_balances_match_payment_history() {
    let backend = InMemoryBackend::new();
    let debt = backend.seed_obligation(DEBT, obligation("Acme", 1000)).unwrap();

    backend.pay_obligation(DEBT, &debt.id, &payment(250)).await.unwrap();
    backend.pay_obligation(DEBT, &debt.id, &payment(250)).await.unwrap();

    let stored = backend.get_obligation(DEBT, &debt.id).await.unwrap();
    let history = backend.list_payments(DEBT, &debt.id).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(stored.remaining_amount(), money(500));
    assert_eq!(stored.status(), ObligationStatus::Partial);
    verify_balance(&stored, &history).unwrap();
}

#[tokio::test]
async fn summary_agrees_with_the_records() {
    let backend = InMemoryBackend::new();
    let kind = ObligationKind::Receivable;
    let a = backend.seed_obligation(kind, obligation("A", 100)).unwrap();
    let b = backend.seed_obligation(kind, obligation("B", 300)).unwrap();
    backend.seed_obligation(DEBT, obligation("Other ledger", 50)).unwrap();
    backend.seed_payment(kind, &a.id, payment(100)).unwrap();
    backend.seed_payment(kind, &b.id, payment(120)).unwrap();

    let records = [
        backend.stored_obligation(kind, &a.id).unwrap(),
        backend.stored_obligation(kind, &b.id).unwrap(),
    ];
    let summary = backend.ledger_summary(kind).await.unwrap();
    assert_eq!(summary, LedgerSummary::from_obligations(kind, records.iter()));
    assert_eq!(summary.total_original, money(400));
    assert_eq!(summary.total_remaining, money(180));
    assert_eq!((summary.active, summary.partial, summary.paid), (0, 1, 1));
}
