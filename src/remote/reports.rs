use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Home-screen totals. Depends on every ledger, every branch and the inventory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub debts_outstanding: Decimal,
    pub payables_outstanding: Decimal,
    pub receivables_outstanding: Decimal,
    pub overdue_count: u64,
    pub branch_count: u64,
    pub inventory_value: Decimal,
    pub low_stock_items: u64,
}

/// One row of the branch comparison report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BranchComparisonRow {
    pub branch_id: String,
    pub branch_name: String,
    pub debts_outstanding: Decimal,
    pub payables_outstanding: Decimal,
    pub receivables_outstanding: Decimal,
    pub inventory_value: Decimal,
}
