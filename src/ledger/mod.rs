//! Obligation ledger - the money-owed records (debts, payables, receivables)
//! and the payment rules that derive their balance and status.
//!
//! Every function here is pure. The same functions are used to predict the
//! outcome of a mutation locally and by the in-memory backend to decide it
//! authoritatively, so the two can never drift apart.
//!
//! ## Example
//!
//! ```
//! use chrono::NaiveDate;
//! use optimistic_ledger::{apply_payment, create_obligation, NewObligation, ObligationKind, ObligationStatus};
//! use rust_decimal::Decimal;
//!
//! let date = NaiveDate::from_ymd_opt(2024, 1, 10).unwrap();
//! let debt = create_obligation("d-1", ObligationKind::Debt, NewObligation::new("Acme", Decimal::from(1000), date)).unwrap();
//! assert_eq!(debt.status(), ObligationStatus::Active);
//!
//! let debt = apply_payment(&debt, Decimal::from(400)).unwrap();
//! assert_eq!(debt.remaining_amount(), Decimal::from(600));
//! assert_eq!(debt.status(), ObligationStatus::Partial);
//! ```

mod filter;
mod obligation;
mod payment;
mod summary;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use filter::ObligationFilter;
pub use obligation::{
    apply_patch, apply_payment, create_obligation, validate_new, NewObligation, Obligation,
    ObligationPatch, ObligationStatus,
};
pub use payment::{record_payment, verify_balance, NewPayment, Payment};
pub use summary::LedgerSummary;

/// The three parallel money-owed ledgers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObligationKind {
    /// Money the business owes to a supplier.
    Debt,
    Payable,
    /// Money owed to the business.
    Receivable,
}

impl ObligationKind {
    pub const ALL: [ObligationKind; 3] = [
        ObligationKind::Debt,
        ObligationKind::Payable,
        ObligationKind::Receivable,
    ];

    /// Resource path used both on the wire and as the first cache key segment.
    pub fn path(self) -> &'static str {
        match self {
            ObligationKind::Debt => "debts",
            ObligationKind::Payable => "payables",
            ObligationKind::Receivable => "receivables",
        }
    }
}

impl std::fmt::Display for ObligationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.path())
    }
}

/// Violations of the ledger rules.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("payment amount must be positive, got {amount}")]
    InvalidAmount { amount: Decimal },
    #[error("payment of {amount} exceeds remaining balance {remaining} on {id}")]
    Overpayment {
        id: String,
        amount: Decimal,
        remaining: Decimal,
    },
    #[error("original amount must be positive, got {amount}")]
    InvalidOriginalAmount { amount: Decimal },
    #[error("due date {due} precedes date {date}")]
    DueBeforeDate { date: NaiveDate, due: NaiveDate },
    #[error("counterparty name is required")]
    MissingCounterparty,
    #[error("inconsistent obligation {id}: {reason}")]
    Inconsistent { id: String, reason: String },
}
