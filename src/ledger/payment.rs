use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{apply_payment, LedgerError, Obligation};

/// A payment against exactly one obligation. The obligation does not own its
/// payments; it only carries their sum as `original - remaining`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    pub id: String,
    pub obligation_id: String,
    pub amount: Decimal,
    pub payment_date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// Body of a pay request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPayment {
    pub amount: Decimal,
    pub payment_date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl NewPayment {
    pub fn new(amount: Decimal, payment_date: NaiveDate) -> Self {
        NewPayment {
            amount,
            payment_date,
            notes: None,
        }
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }
}

/// Apply `input` to `obligation`, returning the new obligation state and the
/// payment record that accounts for the difference.
pub fn record_payment(
    obligation: &Obligation,
    payment_id: impl Into<String>,
    input: &NewPayment,
) -> Result<(Obligation, Payment), LedgerError> {
    let next = apply_payment(obligation, input.amount)?;
    let payment = Payment {
        id: payment_id.into(),
        obligation_id: obligation.id.clone(),
        amount: input.amount,
        payment_date: input.payment_date,
        notes: input.notes.clone(),
    };
    Ok((next, payment))
}

/// Check `remaining == original - sum(payments)` for one obligation.
///
/// Payments belonging to other obligations are ignored.
pub fn verify_balance(obligation: &Obligation, payments: &[Payment]) -> Result<(), LedgerError> {
    let paid: Decimal = payments
        .iter()
        .filter(|p| p.obligation_id == obligation.id)
        .map(|p| p.amount)
        .sum();
    if paid != obligation.paid_amount() {
        return Err(LedgerError::Inconsistent {
            id: obligation.id.clone(),
            reason: format!(
                "payments sum to {} but balance implies {}",
                paid,
                obligation.paid_amount()
            ),
        });
    }
    Ok(())
}
