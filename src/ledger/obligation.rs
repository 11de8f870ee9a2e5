use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{LedgerError, ObligationKind};
use crate::patch::FieldPatch;

/// Derived from the balance, never assigned by a client operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ObligationStatus {
    Active,
    Partial,
    Paid,
}

impl ObligationStatus {
    pub fn derive(original: Decimal, remaining: Decimal) -> Self {
        if remaining.is_zero() {
            ObligationStatus::Paid
        } else if remaining == original {
            ObligationStatus::Active
        } else {
            ObligationStatus::Partial
        }
    }
}

/// A debt, payable or receivable.
///
/// `original_amount`, `remaining_amount` and `status` are private: the
/// original amount is fixed at creation and the other two only move through
/// [`apply_payment`]. Deserialization re-checks the balance invariants, so a
/// value read from the server or the cache is always consistent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "ObligationRecord")]
pub struct Obligation {
    pub id: String,
    pub kind: ObligationKind,
    pub counterparty_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact_id: Option<String>,
    original_amount: Decimal,
    remaining_amount: Decimal,
    status: ObligationStatus,
    pub currency: String,
    pub date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl Obligation {
    pub fn original_amount(&self) -> Decimal {
        self.original_amount
    }

    pub fn remaining_amount(&self) -> Decimal {
        self.remaining_amount
    }

    pub fn status(&self) -> ObligationStatus {
        self.status
    }

    /// Sum of all payments applied so far.
    pub fn paid_amount(&self) -> Decimal {
        self.original_amount - self.remaining_amount
    }

    pub fn has_payments(&self) -> bool {
        self.remaining_amount < self.original_amount
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ObligationRecord {
    id: String,
    kind: ObligationKind,
    counterparty_name: String,
    #[serde(default)]
    contact_id: Option<String>,
    original_amount: Decimal,
    remaining_amount: Decimal,
    status: ObligationStatus,
    currency: String,
    date: NaiveDate,
    #[serde(default)]
    due_date: Option<NaiveDate>,
    #[serde(default)]
    branch_id: Option<String>,
    #[serde(default)]
    notes: Option<String>,
}

impl TryFrom<ObligationRecord> for Obligation {
    type Error = LedgerError;

    fn try_from(record: ObligationRecord) -> Result<Self, Self::Error> {
        let inconsistent = |reason: String| LedgerError::Inconsistent {
            id: record.id.clone(),
            reason,
        };
        if record.remaining_amount.is_sign_negative()
            || record.remaining_amount > record.original_amount
        {
            return Err(inconsistent(format!(
                "remaining {} outside 0..={}",
                record.remaining_amount, record.original_amount
            )));
        }
        let derived = ObligationStatus::derive(record.original_amount, record.remaining_amount);
        if derived != record.status {
            return Err(inconsistent(format!(
                "status {:?} does not match balance (expected {:?})",
                record.status, derived
            )));
        }

        Ok(Obligation {
            id: record.id,
            kind: record.kind,
            counterparty_name: record.counterparty_name,
            contact_id: record.contact_id,
            original_amount: record.original_amount,
            remaining_amount: record.remaining_amount,
            status: record.status,
            currency: record.currency,
            date: record.date,
            due_date: record.due_date,
            branch_id: record.branch_id,
            notes: record.notes,
        })
    }
}

/// Creation input: no id, no remaining amount, no status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewObligation {
    pub counterparty_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact_id: Option<String>,
    pub original_amount: Decimal,
    pub currency: String,
    pub date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl NewObligation {
    pub fn new(counterparty: impl Into<String>, amount: Decimal, date: NaiveDate) -> Self {
        NewObligation {
            counterparty_name: counterparty.into(),
            contact_id: None,
            original_amount: amount,
            currency: "USD".to_string(),
            date,
            due_date: None,
            branch_id: None,
            notes: None,
        }
    }

    pub fn with_currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = currency.into();
        self
    }

    pub fn with_due_date(mut self, due: NaiveDate) -> Self {
        self.due_date = Some(due);
        self
    }

    pub fn with_branch(mut self, branch_id: impl Into<String>) -> Self {
        self.branch_id = Some(branch_id.into());
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }
}

/// Fields an update may touch. Amounts and status are deliberately absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObligationPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub counterparty_name: Option<String>,
    #[serde(default, skip_serializing_if = "FieldPatch::is_keep")]
    pub contact_id: FieldPatch<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "FieldPatch::is_keep")]
    pub due_date: FieldPatch<NaiveDate>,
    #[serde(default, skip_serializing_if = "FieldPatch::is_keep")]
    pub branch_id: FieldPatch<String>,
    #[serde(default, skip_serializing_if = "FieldPatch::is_keep")]
    pub notes: FieldPatch<String>,
}

impl ObligationPatch {
    pub fn notes(notes: impl Into<String>) -> Self {
        ObligationPatch {
            notes: FieldPatch::Set(notes.into()),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self == &ObligationPatch::default()
    }
}

fn check_dates(date: NaiveDate, due: Option<NaiveDate>) -> Result<(), LedgerError> {
    match due {
        Some(due) if due < date => Err(LedgerError::DueBeforeDate { date, due }),
        _ => Ok(()),
    }
}

/// Client-detectable validation of a creation input.
pub fn validate_new(input: &NewObligation) -> Result<(), LedgerError> {
    if input.counterparty_name.trim().is_empty() {
        return Err(LedgerError::MissingCounterparty);
    }
    if input.original_amount <= Decimal::ZERO {
        return Err(LedgerError::InvalidOriginalAmount {
            amount: input.original_amount,
        });
    }
    check_dates(input.date, input.due_date)
}

/// Build a new obligation: the whole amount outstanding, status `Active`.
pub fn create_obligation(
    id: impl Into<String>,
    kind: ObligationKind,
    input: NewObligation,
) -> Result<Obligation, LedgerError> {
    validate_new(&input)?;
    Ok(Obligation {
        id: id.into(),
        kind,
        counterparty_name: input.counterparty_name,
        contact_id: input.contact_id,
        original_amount: input.original_amount,
        remaining_amount: input.original_amount,
        status: ObligationStatus::Active,
        currency: input.currency,
        date: input.date,
        due_date: input.due_date,
        branch_id: input.branch_id,
        notes: input.notes,
    })
}

/// Apply a payment and recompute the status.
pub fn apply_payment(obligation: &Obligation, amount: Decimal) -> Result<Obligation, LedgerError> {
    if amount <= Decimal::ZERO {
        return Err(LedgerError::InvalidAmount { amount });
    }
    if amount > obligation.remaining_amount {
        return Err(LedgerError::Overpayment {
            id: obligation.id.clone(),
            amount,
            remaining: obligation.remaining_amount,
        });
    }

    let remaining = obligation.remaining_amount - amount;
    Ok(Obligation {
        remaining_amount: remaining,
        status: ObligationStatus::derive(obligation.original_amount, remaining),
        ..obligation.clone()
    })
}

/// Merge a patch onto an obligation. The balance is carried over untouched.
pub fn apply_patch(
    obligation: &Obligation,
    patch: &ObligationPatch,
) -> Result<Obligation, LedgerError> {
    let mut next = obligation.clone();
    if let Some(name) = &patch.counterparty_name {
        if name.trim().is_empty() {
            return Err(LedgerError::MissingCounterparty);
        }
        next.counterparty_name = name.clone();
    }
    if let Some(currency) = &patch.currency {
        next.currency = currency.clone();
    }
    if let Some(date) = patch.date {
        next.date = date;
    }
    next.contact_id = patch.contact_id.clone().apply(next.contact_id);
    next.due_date = patch.due_date.clone().apply(next.due_date);
    next.branch_id = patch.branch_id.clone().apply(next.branch_id);
    next.notes = patch.notes.clone().apply(next.notes);

    check_dates(next.date, next.due_date)?;
    Ok(next)
}
