use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::{Obligation, ObligationStatus};

/// Filters accepted by the obligation list endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObligationFilter {
    pub status: Option<ObligationStatus>,
    pub branch_id: Option<String>,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
}

impl ObligationFilter {
    pub fn status(status: ObligationStatus) -> Self {
        ObligationFilter {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn branch(branch_id: impl Into<String>) -> Self {
        ObligationFilter {
            branch_id: Some(branch_id.into()),
            ..Default::default()
        }
    }

    pub fn matches(&self, obligation: &Obligation) -> bool {
        if let Some(status) = self.status {
            if obligation.status() != status {
                return false;
            }
        }
        if let Some(branch) = &self.branch_id {
            if obligation.branch_id.as_ref() != Some(branch) {
                return false;
            }
        }
        if let Some(from) = self.date_from {
            if obligation.date < from {
                return false;
            }
        }
        if let Some(to) = self.date_to {
            if obligation.date > to {
                return false;
            }
        }
        true
    }
}
