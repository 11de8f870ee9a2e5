use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{Obligation, ObligationKind, ObligationStatus};

/// Per-kind totals. Unlike the dashboard, this aggregate can be recomputed
/// exactly from a single record change, so mutations update it in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerSummary {
    pub kind: ObligationKind,
    pub total_original: Decimal,
    pub total_remaining: Decimal,
    pub active: u64,
    pub partial: u64,
    pub paid: u64,
}

impl LedgerSummary {
    pub fn empty(kind: ObligationKind) -> Self {
        LedgerSummary {
            kind,
            total_original: Decimal::ZERO,
            total_remaining: Decimal::ZERO,
            active: 0,
            partial: 0,
            paid: 0,
        }
    }

    pub fn from_obligations<'a>(
        kind: ObligationKind,
        obligations: impl IntoIterator<Item = &'a Obligation>,
    ) -> Self {
        let mut summary = LedgerSummary::empty(kind);
        for obligation in obligations {
            summary.apply_change(None, Some(obligation));
        }
        summary
    }

    pub fn count(&self) -> u64 {
        self.active + self.partial + self.paid
    }

    /// Replace `before` with `after` in the totals. `None` on either side
    /// models a creation or a deletion. Records of another kind are ignored.
    pub fn apply_change(&mut self, before: Option<&Obligation>, after: Option<&Obligation>) {
        if let Some(old) = before.filter(|o| o.kind == self.kind) {
            self.total_original -= old.original_amount();
            self.total_remaining -= old.remaining_amount();
            let slot = self.slot(old.status());
            *slot = slot.saturating_sub(1);
        }
        if let Some(new) = after.filter(|o| o.kind == self.kind) {
            self.total_original += new.original_amount();
            self.total_remaining += new.remaining_amount();
            *self.slot(new.status()) += 1;
        }
    }

    fn slot(&mut self, status: ObligationStatus) -> &mut u64 {
        match status {
            ObligationStatus::Active => &mut self.active,
            ObligationStatus::Partial => &mut self.partial,
            ObligationStatus::Paid => &mut self.paid,
        }
    }
}
