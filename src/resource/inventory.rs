use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{Resource, ResourceError};
use crate::cache::EntityKind;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryItem {
    pub id: String,
    pub branch_id: String,
    pub name: String,
    pub sku: String,
    pub quantity: i64,
    pub unit_cost: Decimal,
    pub reorder_level: i64,
}

impl InventoryItem {
    /// Stock value at cost.
    pub fn value(&self) -> Decimal {
        Decimal::from(self.quantity) * self.unit_cost
    }

    pub fn is_low_stock(&self) -> bool {
        self.quantity <= self.reorder_level
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryDraft {
    pub branch_id: String,
    pub name: String,
    pub sku: String,
    pub quantity: i64,
    pub unit_cost: Decimal,
    pub reorder_level: i64,
}

/// Inventory update. Stock moves by delta so concurrent adjustments compose.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sku: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit_cost: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reorder_level: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantity_delta: Option<i64>,
}

impl InventoryPatch {
    pub fn adjust(delta: i64) -> Self {
        InventoryPatch {
            quantity_delta: Some(delta),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryFilter {
    pub branch_id: Option<String>,
    pub low_stock: Option<bool>,
}

fn check_levels(quantity: i64, unit_cost: Decimal, reorder_level: i64) -> Result<(), ResourceError> {
    if quantity < 0 {
        return Err(ResourceError::invalid("quantity", format!("{} is negative", quantity)));
    }
    if unit_cost.is_sign_negative() {
        return Err(ResourceError::invalid("unitCost", format!("{} is negative", unit_cost)));
    }
    if reorder_level < 0 {
        return Err(ResourceError::invalid(
            "reorderLevel",
            format!("{} is negative", reorder_level),
        ));
    }
    Ok(())
}

impl Resource for InventoryItem {
    const KIND: EntityKind = EntityKind::Inventory;

    type Draft = InventoryDraft;
    type Patch = InventoryPatch;
    type Filter = InventoryFilter;

    fn id(&self) -> &str {
        &self.id
    }

    fn create(id: &str, draft: &InventoryDraft) -> Result<Self, ResourceError> {
        if draft.name.trim().is_empty() {
            return Err(ResourceError::invalid("name", "must not be empty"));
        }
        check_levels(draft.quantity, draft.unit_cost, draft.reorder_level)?;
        Ok(InventoryItem {
            id: id.to_string(),
            branch_id: draft.branch_id.clone(),
            name: draft.name.clone(),
            sku: draft.sku.clone(),
            quantity: draft.quantity,
            unit_cost: draft.unit_cost,
            reorder_level: draft.reorder_level,
        })
    }

    fn apply_patch(&self, patch: &InventoryPatch) -> Result<Self, ResourceError> {
        let mut next = self.clone();
        if let Some(name) = &patch.name {
            next.name = name.clone();
        }
        if let Some(sku) = &patch.sku {
            next.sku = sku.clone();
        }
        if let Some(cost) = patch.unit_cost {
            next.unit_cost = cost;
        }
        if let Some(level) = patch.reorder_level {
            next.reorder_level = level;
        }
        if let Some(delta) = patch.quantity_delta {
            next.quantity = next
                .quantity
                .checked_add(delta)
                .ok_or_else(|| ResourceError::invalid("quantity", "overflow"))?;
        }
        check_levels(next.quantity, next.unit_cost, next.reorder_level)?;
        Ok(next)
    }

    fn matches(&self, filter: &InventoryFilter) -> bool {
        if let Some(branch) = &filter.branch_id {
            if &self.branch_id != branch {
                return false;
            }
        }
        match filter.low_stock {
            Some(low) => self.is_low_stock() == low,
            None => true,
        }
    }
}
