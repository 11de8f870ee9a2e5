//! Reconciliation dispatcher - turns "this mutation settled" into "these
//! cached views may now be wrong" and marks them stale.
//!
//! The mapping is a declarative table keyed by (entity kind, operation). It
//! is built from [`standard_targets`], whose `match` has no wildcard arm, so
//! adding an entity kind or an operation does not compile until its
//! staleness rules are written down.

use std::collections::{BTreeSet, HashMap};

use tracing::debug;

use crate::cache::{Aggregate, CacheError, EntityKind, QueryCache, QueryKey};
use crate::ledger::ObligationKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MutationOp {
    Create,
    Update,
    Pay,
    Delete,
}

impl MutationOp {
    pub const ALL: [MutationOp; 4] = [
        MutationOp::Create,
        MutationOp::Update,
        MutationOp::Pay,
        MutationOp::Delete,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            MutationOp::Create => "create",
            MutationOp::Update => "update",
            MutationOp::Pay => "pay",
            MutationOp::Delete => "delete",
        }
    }
}

/// A settled mutation, as far as staleness is concerned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationEvent {
    pub entity: EntityKind,
    pub op: MutationOp,
    /// Server id of the record, when known.
    pub id: Option<String>,
}

impl MutationEvent {
    pub fn new(entity: EntityKind, op: MutationOp, id: Option<String>) -> Self {
        MutationEvent { entity, op, id }
    }
}

/// A family of keys, resolved against a concrete event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Target {
    /// Every list of the mutated entity kind, whatever the filter.
    Lists,
    /// Every list of another entity kind.
    ListsOf(EntityKind),
    /// Detail key of the mutated record.
    Detail,
    /// Every detail key of another entity kind.
    DetailsOf(EntityKind),
    /// Payment history of the mutated obligation.
    Payments,
    /// Per-kind ledger summary of the mutated obligation kind.
    Summary,
    Aggregate(Aggregate),
}

/// Staleness rules for every (entity kind, operation) pair.
///
/// `Pay` only exists for obligations; for other kinds it resolves to the
/// `Update` rules so that the table stays total.
pub fn standard_targets(entity: EntityKind, op: MutationOp) -> Vec<Target> {
    use crate::cache::Aggregate::{BranchComparison, Dashboard};
    use Target::*;

    match entity {
        EntityKind::Obligation(_) => match op {
            MutationOp::Create => vec![
                Lists,
                Detail,
                Summary,
                Aggregate(Dashboard),
                Aggregate(BranchComparison),
            ],
            // Patches never touch amounts, so the summary survives. Due date
            // and branch changes still move overdue counts and branch totals.
            MutationOp::Update => vec![
                Lists,
                Detail,
                Aggregate(Dashboard),
                Aggregate(BranchComparison),
            ],
            MutationOp::Pay | MutationOp::Delete => vec![
                Lists,
                Detail,
                Payments,
                Summary,
                Aggregate(Dashboard),
                Aggregate(BranchComparison),
            ],
        },
        EntityKind::Branch => match op {
            MutationOp::Create => vec![
                Lists,
                Detail,
                Aggregate(Dashboard),
                Aggregate(BranchComparison),
            ],
            MutationOp::Update | MutationOp::Pay => {
                vec![Lists, Detail, Aggregate(BranchComparison)]
            }
            // The server drops the branch's stock and detaches its
            // obligations, so their lists and details change too.
            MutationOp::Delete => {
                let mut targets = vec![
                    Lists,
                    Detail,
                    Aggregate(Dashboard),
                    Aggregate(BranchComparison),
                    ListsOf(EntityKind::Inventory),
                    DetailsOf(EntityKind::Inventory),
                ];
                for kind in ObligationKind::ALL {
                    targets.push(ListsOf(EntityKind::Obligation(kind)));
                    targets.push(DetailsOf(EntityKind::Obligation(kind)));
                }
                targets
            }
        },
        EntityKind::Inventory => match op {
            MutationOp::Create
            | MutationOp::Update
            | MutationOp::Pay
            | MutationOp::Delete => vec![
                Lists,
                Detail,
                Aggregate(Dashboard),
                Aggregate(BranchComparison),
            ],
        },
    }
}

/// Declarative table from (entity kind, operation) to invalidation targets.
#[derive(Debug, Clone)]
pub struct InvalidationMap {
    rules: HashMap<(EntityKind, MutationOp), Vec<Target>>,
}

impl Default for InvalidationMap {
    fn default() -> Self {
        Self::standard()
    }
}

impl InvalidationMap {
    pub fn standard() -> Self {
        let mut rules = HashMap::new();
        for entity in EntityKind::ALL {
            for op in MutationOp::ALL {
                rules.insert((entity, op), standard_targets(entity, op));
            }
        }
        InvalidationMap { rules }
    }

    /// Add a target to one rule, e.g. a view introduced by the application.
    pub fn with_target(mut self, entity: EntityKind, op: MutationOp, target: Target) -> Self {
        let targets = self.rules.entry((entity, op)).or_default();
        if !targets.contains(&target) {
            targets.push(target);
        }
        self
    }

    pub fn targets(&self, entity: EntityKind, op: MutationOp) -> &[Target] {
        self.rules
            .get(&(entity, op))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Concrete key prefixes for `event`, deduplicated and ordered.
    pub fn prefixes(&self, event: &MutationEvent) -> Vec<QueryKey> {
        let mut prefixes = BTreeSet::new();
        for target in self.targets(event.entity, event.op) {
            let key = match (*target, event.entity, event.id.as_deref()) {
                (Target::Lists, entity, _) => Some(QueryKey::lists(entity)),
                (Target::ListsOf(other), _, _) => Some(QueryKey::lists(other)),
                (Target::Detail, entity, Some(id)) => Some(QueryKey::detail(entity, id)),
                (Target::DetailsOf(other), _, _) => Some(QueryKey::details(other)),
                (Target::Payments, EntityKind::Obligation(kind), Some(id)) => {
                    Some(QueryKey::payments(kind, id))
                }
                (Target::Summary, EntityKind::Obligation(kind), _) => {
                    Some(QueryKey::summary(kind))
                }
                (Target::Aggregate(aggregate), _, _) => Some(QueryKey::aggregate(aggregate)),
                // Detail and payments need an id; summaries only exist for obligations.
                (Target::Detail, _, None)
                | (Target::Payments, _, _)
                | (Target::Summary, _, _) => None,
            };
            if let Some(key) = key {
                prefixes.insert(key);
            }
        }
        prefixes.into_iter().collect()
    }
}

/// Result of one dispatch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InvalidationReport {
    pub prefixes: Vec<QueryKey>,
    /// Entries marked stale, summed over prefixes.
    pub matched: usize,
}

/// Applies an [`InvalidationMap`] to a cache.
#[derive(Debug, Clone, Default)]
pub struct InvalidationDispatcher {
    map: InvalidationMap,
}

impl InvalidationDispatcher {
    pub fn new(map: InvalidationMap) -> Self {
        InvalidationDispatcher { map }
    }

    pub fn map(&self) -> &InvalidationMap {
        &self.map
    }

    /// Mark every view affected by `event` stale, plus any `extra` keys the
    /// caller touched optimistically. Idempotent and order-independent.
    pub fn dispatch(
        &self,
        cache: &QueryCache,
        event: &MutationEvent,
        extra: &[QueryKey],
    ) -> Result<InvalidationReport, CacheError> {
        let mut prefixes: BTreeSet<QueryKey> = self.map.prefixes(event).into_iter().collect();
        // An extra key already covered by a prefix adds nothing.
        for key in extra {
            if !prefixes.iter().any(|prefix| key.starts_with(prefix)) {
                prefixes.insert(key.clone());
            }
        }

        let mut report = InvalidationReport::default();
        for prefix in prefixes {
            report.matched += cache.invalidate(&prefix)?;
            report.prefixes.push(prefix);
        }
        debug!(
            entity = event.entity.path(),
            op = event.op.as_str(),
            prefixes = report.prefixes.len(),
            matched = report.matched,
            "reconciliation dispatched"
        );
        Ok(report)
    }
}
