use std::fmt;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

use super::CacheError;
use crate::ledger::ObligationKind;

/// Entity families that own cache keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityKind {
    Obligation(ObligationKind),
    Branch,
    Inventory,
}

impl EntityKind {
    pub const ALL: [EntityKind; 5] = [
        EntityKind::Obligation(ObligationKind::Debt),
        EntityKind::Obligation(ObligationKind::Payable),
        EntityKind::Obligation(ObligationKind::Receivable),
        EntityKind::Branch,
        EntityKind::Inventory,
    ];

    pub fn path(self) -> &'static str {
        match self {
            EntityKind::Obligation(kind) => kind.path(),
            EntityKind::Branch => "branches",
            EntityKind::Inventory => "inventory",
        }
    }

    fn from_path(path: &str) -> Option<EntityKind> {
        EntityKind::ALL.into_iter().find(|kind| kind.path() == path)
    }
}

/// Cross-entity views computed server-side from several ledgers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Aggregate {
    Dashboard,
    BranchComparison,
}

impl Aggregate {
    pub const ALL: [Aggregate; 2] = [Aggregate::Dashboard, Aggregate::BranchComparison];

    pub fn path(self) -> &'static str {
        match self {
            Aggregate::Dashboard => "dashboard",
            Aggregate::BranchComparison => "branch-comparison",
        }
    }
}

const LIST: &str = "list";
const DETAIL: &str = "detail";
const PAYMENTS: &str = "payments";
const SUMMARY: &str = "summary";

/// Structured cache key: a path of segments, matched by prefix.
///
/// ```text
/// debts/list/{"branchId":"b1","limit":20,"page":1}
/// debts/detail/d-42
/// debts/payments/d-42
/// debts/summary
/// dashboard
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueryKey(Vec<String>);

impl QueryKey {
    pub fn from_segments<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        QueryKey(segments.into_iter().map(Into::into).collect())
    }

    /// Every key owned by `kind`.
    pub fn entity(kind: EntityKind) -> Self {
        QueryKey::from_segments([kind.path()])
    }

    /// Prefix of every list view of `kind`, whatever the filter.
    pub fn lists(kind: EntityKind) -> Self {
        QueryKey::from_segments([kind.path(), LIST])
    }

    /// One list view. `query` is encoded with [`filter_signature`], so
    /// logically equal filters share a key.
    pub fn list<Q: Serialize>(kind: EntityKind, query: &Q) -> Result<Self, CacheError> {
        let signature = filter_signature(query)?;
        Ok(QueryKey(vec![
            kind.path().to_string(),
            LIST.to_string(),
            signature,
        ]))
    }

    pub fn details(kind: EntityKind) -> Self {
        QueryKey::from_segments([kind.path(), DETAIL])
    }

    pub fn detail(kind: EntityKind, id: &str) -> Self {
        QueryKey::from_segments([kind.path(), DETAIL, id])
    }

    pub fn payments(kind: ObligationKind, obligation_id: &str) -> Self {
        QueryKey::from_segments([kind.path(), PAYMENTS, obligation_id])
    }

    pub fn summary(kind: ObligationKind) -> Self {
        QueryKey::from_segments([kind.path(), SUMMARY])
    }

    pub fn aggregate(aggregate: Aggregate) -> Self {
        QueryKey::from_segments([aggregate.path()])
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn starts_with(&self, prefix: &QueryKey) -> bool {
        self.0.starts_with(&prefix.0)
    }

    pub fn entity_kind(&self) -> Option<EntityKind> {
        self.0.first().and_then(|path| EntityKind::from_path(path))
    }

    pub fn is_list(&self) -> bool {
        self.0.get(1).map(String::as_str) == Some(LIST)
    }

    /// Decode the list query a list key was built from.
    pub fn list_query<Q: DeserializeOwned>(&self) -> Option<Q> {
        if !self.is_list() {
            return None;
        }
        self.0
            .get(2)
            .and_then(|signature| serde_json::from_str(signature).ok())
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("/"))
    }
}

/// Canonical, order-independent encoding of a filter object: object keys
/// sorted at every depth, `null` members dropped.
pub fn filter_signature<Q: Serialize>(query: &Q) -> Result<String, CacheError> {
    let value = serde_json::to_value(query).map_err(|e| CacheError::Serde(e.to_string()))?;
    serde_json::to_string(&canonicalize(value)).map_err(|e| CacheError::Serde(e.to_string()))
}

fn canonicalize(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut members: Vec<(String, Value)> = map
                .into_iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| (k, canonicalize(v)))
                .collect();
            members.sort_by(|a, b| a.0.cmp(&b.0));
            Value::Object(members.into_iter().collect::<Map<String, Value>>())
        }
        Value::Array(items) => Value::Array(items.into_iter().map(canonicalize).collect()),
        other => other,
    }
}
