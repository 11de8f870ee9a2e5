use serde::{Deserialize, Serialize};

use super::{Resource, ResourceError};
use crate::cache::EntityKind;
use crate::patch::FieldPatch;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Branch {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BranchDraft {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

impl BranchDraft {
    pub fn new(name: impl Into<String>) -> Self {
        BranchDraft {
            name: name.into(),
            address: None,
            phone: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BranchPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "FieldPatch::is_keep")]
    pub address: FieldPatch<String>,
    #[serde(default, skip_serializing_if = "FieldPatch::is_keep")]
    pub phone: FieldPatch<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BranchFilter {
    pub is_active: Option<bool>,
    /// Case-insensitive substring of the name.
    pub search: Option<String>,
}

fn check_name(name: &str) -> Result<(), ResourceError> {
    if name.trim().is_empty() {
        return Err(ResourceError::invalid("name", "must not be empty"));
    }
    Ok(())
}

impl Resource for Branch {
    const KIND: EntityKind = EntityKind::Branch;

    type Draft = BranchDraft;
    type Patch = BranchPatch;
    type Filter = BranchFilter;

    fn id(&self) -> &str {
        &self.id
    }

    fn create(id: &str, draft: &BranchDraft) -> Result<Self, ResourceError> {
        check_name(&draft.name)?;
        Ok(Branch {
            id: id.to_string(),
            name: draft.name.clone(),
            address: draft.address.clone(),
            phone: draft.phone.clone(),
            is_active: true,
        })
    }

    fn apply_patch(&self, patch: &BranchPatch) -> Result<Self, ResourceError> {
        let mut next = self.clone();
        if let Some(name) = &patch.name {
            check_name(name)?;
            next.name = name.clone();
        }
        next.address = patch.address.clone().apply(next.address);
        next.phone = patch.phone.clone().apply(next.phone);
        if let Some(active) = patch.is_active {
            next.is_active = active;
        }
        Ok(next)
    }

    fn matches(&self, filter: &BranchFilter) -> bool {
        if let Some(active) = filter.is_active {
            if self.is_active != active {
                return false;
            }
        }
        match &filter.search {
            Some(needle) => self.name.to_lowercase().contains(&needle.to_lowercase()),
            None => true,
        }
    }
}
