//! Query planning: start selection, base queries, join shapes and ON
//! restrictions.

use crate::aliases::AliasRegistry;
use crate::analyzer::Stats;
use crate::catalog::MappingCatalog;
use crate::conditions::{MatchCondition, Predicate, SqlComparison};
use crate::error::{ConversionError, ErrorCode};
use crate::flags::ConversionFlags;
use crate::skeleton::WhereNode;
use crate::types::JoinType;
use std::collections::BTreeSet;
#[cfg(feature = "tracing")]
use tracing::debug;

/// What the main query selects from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum StartSelection {
    /// A physical table.
    Table(String),
    /// A single alias promoted to the base query.
    Alias(usize),
    /// `base AS (SELECT ID FROM a UNION SELECT ID FROM b ...)`.
    BaseUnion(Vec<usize>),
    /// `base AS (SELECT id FROM t1 UNION SELECT id FROM t2 ...)` over every
    /// configured table.
    UniverseUnion(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum JoinTarget {
    Alias(usize),
    Table(String),
}

/// One join of the main query.
#[derive(Debug, Clone)]
pub(crate) struct JoinSpec {
    pub target: JoinTarget,
    pub join_type: JoinType,
    /// Conditions restricting the joined rows, OR-combined inside the ON
    /// clause.
    pub restrictions: Vec<(MatchCondition, bool)>,
}

/// The finished plan handed to the emitter.
#[derive(Debug)]
pub(crate) struct QueryPlan {
    pub start: StartSelection,
    pub joins: Vec<JoinSpec>,
    pub where_root: Option<WhereNode>,
    /// Aliases that need WITH entries, in creation (and name) order.
    pub with_aliases: Vec<usize>,
}

/// Decides start selection, joins and join types.
pub(crate) fn plan(
    catalog: &MappingCatalog,
    stats: &Stats,
    aliases: &AliasRegistry,
    where_root: WhereNode,
    flags: ConversionFlags,
    base_combination_cap: usize,
) -> Result<QueryPlan, ConversionError> {
    let (start, where_root) =
        decide_start(catalog, stats, aliases, where_root, flags, base_combination_cap)?;

    let mut with_aliases: BTreeSet<usize> = BTreeSet::new();
    if let Some(node) = &where_root {
        node.alias_refs(&mut with_aliases);
    }
    match &start {
        StartSelection::Alias(idx) => {
            with_aliases.insert(*idx);
        }
        StartSelection::BaseUnion(members) => {
            with_aliases.extend(members.iter().copied());
        }
        _ => {}
    }

    let joins = build_joins(catalog, stats, aliases, &start, where_root.as_ref(), flags);

    #[cfg(feature = "tracing")]
    debug!(?start, join_count = joins.len(), "query planned");
    Ok(QueryPlan {
        start,
        joins,
        where_root,
        with_aliases: with_aliases.into_iter().collect(),
    })
}

fn decide_start(
    catalog: &MappingCatalog,
    stats: &Stats,
    aliases: &AliasRegistry,
    where_root: WhereNode,
    flags: ConversionFlags,
    cap: usize,
) -> Result<(StartSelection, Option<WhereNode>), ConversionError> {
    // The primary-table directive wins over everything, clearing any
    // primary alias.
    if flags.contains(ConversionFlags::ENFORCE_PRIMARY_TABLE) {
        if let Some(primary) = catalog.primary_table() {
            return Ok((StartSelection::Table(primary.name.clone()), Some(where_root)));
        }
    }

    if flags.contains(ConversionFlags::SIMPLE_CONDITION) {
        if let Some(table) = stats.required_tables.iter().next() {
            return Ok((StartSelection::Table(table.clone()), Some(where_root)));
        }
    }

    let mut direct = Vec::new();
    where_root.direct_conditions(&mut direct);

    if flags.contains(ConversionFlags::SINGLE_TABLE_CONTAINING_ALL_ROWS) {
        if let Some(table) = stats.required_tables.iter().next() {
            let referenced = direct.iter().any(|(cond, _)| &cond.table == table);
            if referenced {
                return Ok((StartSelection::Table(table.clone()), Some(where_root)));
            }
        }
    }

    if let Some(primary) = aliases.determine_primary(catalog, stats.separate_base_table_required) {
        // When the whole WHERE is the primary alias's positive check, the
        // alias itself becomes the base query and the check is dropped.
        if where_root.as_single_alias_not_null() == Some(primary) {
            return Ok((StartSelection::Alias(primary), None));
        }
        return Ok((
            StartSelection::Table(aliases.get(primary).table.clone()),
            Some(where_root),
        ));
    }

    let unions_allowed = !flags.contains(ConversionFlags::DISABLE_UNION);
    if let Some(combination) = base_cover(&where_root, aliases, cap) {
        if combination.len() == 1 {
            // Late promotion of a single covering alias.
            let single = combination[0];
            if where_root.as_single_alias_not_null() == Some(single) {
                return Ok((StartSelection::Alias(single), None));
            }
            return Ok((
                StartSelection::Table(aliases.get(single).table.clone()),
                Some(where_root),
            ));
        }
        if unions_allowed {
            return Ok((StartSelection::BaseUnion(combination), Some(where_root)));
        }
    }

    if unions_allowed && catalog.table_count() > 1 && catalog.tables_with_all_ids().is_empty() {
        let names: Vec<String> = catalog
            .table_names_sorted()
            .into_iter()
            .map(str::to_string)
            .collect();
        return Ok((StartSelection::UniverseUnion(names), Some(where_root)));
    }

    // Auxiliary fallback: primary table, then a referenced all-ids table,
    // then any all-ids table.
    if let Some(primary) = catalog.primary_table() {
        return Ok((StartSelection::Table(primary.name.clone()), Some(where_root)));
    }
    let all_ids = catalog.tables_with_all_ids();
    if let Some(table) = all_ids
        .iter()
        .find(|t| stats.required_tables.contains(&t.name))
        .or_else(|| all_ids.first())
    {
        return Ok((StartSelection::Table(table.name.clone()), Some(where_root)));
    }

    Err(ConversionError::new(
        ErrorCode::MappingFailed,
        "no viable base table: no primary table, no table containing all ids, \
         and no union-based start selection available",
    ))
}

/// Finds a minimum-size OR-combination of union-eligible aliases whose
/// union is a superset of the root. The search is heuristic: any direct
/// predicate makes the enclosing branch uncoverable.
fn base_cover(node: &WhereNode, aliases: &AliasRegistry, cap: usize) -> Option<Vec<usize>> {
    let set = cover(node, aliases)?;
    if set.is_empty() || set.len() > cap {
        return None;
    }
    Some(set.into_iter().collect())
}

fn cover(node: &WhereNode, aliases: &AliasRegistry) -> Option<BTreeSet<usize>> {
    use crate::skeleton::LeafSql;
    match node {
        WhereNode::Leaf(LeafSql::AliasNotNull { alias }) => {
            if aliases.union_eligible(*alias) {
                Some(BTreeSet::from([*alias]))
            } else {
                None
            }
        }
        WhereNode::Leaf(_) => None,
        WhereNode::Or(children) => {
            let mut union = BTreeSet::new();
            for child in children {
                union.extend(cover(child, aliases)?);
            }
            Some(union)
        }
        WhereNode::And(children) => children
            .iter()
            .filter_map(|child| cover(child, aliases))
            .min_by_key(BTreeSet::len),
    }
}

fn build_joins(
    catalog: &MappingCatalog,
    stats: &Stats,
    aliases: &AliasRegistry,
    start: &StartSelection,
    where_root: Option<&WhereNode>,
    flags: ConversionFlags,
) -> Vec<JoinSpec> {
    let left_required = flags.contains(ConversionFlags::LEFT_OUTER_JOINS_REQUIRED);
    let main_table = match start {
        StartSelection::Table(name) => Some(name.as_str()),
        _ => None,
    };
    let start_alias = match start {
        StartSelection::Alias(idx) => Some(*idx),
        _ => None,
    };

    let mut referenced: BTreeSet<usize> = BTreeSet::new();
    let mut direct: Vec<(&MatchCondition, bool)> = Vec::new();
    if let Some(node) = where_root {
        node.alias_refs(&mut referenced);
        node.direct_conditions(&mut direct);
    }

    let mut joins: Vec<JoinSpec> = Vec::new();
    for idx in referenced {
        if Some(idx) == start_alias {
            continue;
        }
        joins.push(JoinSpec {
            target: JoinTarget::Alias(idx),
            join_type: if left_required {
                JoinType::LeftOuter
            } else {
                JoinType::Inner
            },
            restrictions: Vec::new(),
        });
    }

    let mut tables: BTreeSet<&str> = BTreeSet::new();
    for (cond, _) in &direct {
        if Some(cond.table.as_str()) != main_table {
            tables.insert(cond.table.as_str());
        }
        if let Some(right) = &cond.right {
            if Some(right.table.as_str()) != main_table {
                tables.insert(right.table.as_str());
            }
        }
    }
    for table in tables {
        let all_ids = catalog
            .table(table)
            .map(|t| t.nature.contains_all_ids())
            .unwrap_or(false);
        // A joined table covering all ids cannot drop audience ids, so it
        // may stay inner even when left-outer joins are required.
        let join_type = if left_required && !all_ids {
            JoinType::LeftOuter
        } else {
            JoinType::Inner
        };
        let restrictions = if join_type == JoinType::LeftOuter {
            on_restrictions(stats, &direct, table)
        } else {
            Vec::new()
        };
        joins.push(JoinSpec {
            target: JoinTarget::Table(table.to_string()),
            join_type,
            restrictions,
        });
    }

    joins.sort_by(|a, b| {
        let name = |spec: &JoinSpec| match &spec.target {
            JoinTarget::Alias(idx) => aliases.get(*idx).name.to_lowercase(),
            JoinTarget::Table(name) => name.to_lowercase(),
        };
        let rank = |spec: &JoinSpec| u8::from(spec.join_type == JoinType::LeftOuter);
        name(a).cmp(&name(b)).then(rank(a).cmp(&rank(b)))
    });
    joins
}

/// Conditions restricting the joined rows of `table`, composed as a
/// disjunction in the ON clause. Restrictions collapse away entirely when a
/// NULL test on the table needs the unmatched left-join row, and presence
/// checks on always-known arguments are suppressed.
fn on_restrictions(
    stats: &Stats,
    direct: &[(&MatchCondition, bool)],
    table: &str,
) -> Vec<(MatchCondition, bool)> {
    let on_table = |cond: &MatchCondition| {
        cond.table == table
            || cond
                .right
                .as_ref()
                .map(|r| r.table == table)
                .unwrap_or(false)
    };

    let needs_null_row = direct.iter().any(|(cond, negated)| {
        on_table(cond)
            && matches!(
                (&cond.predicate, *negated),
                (
                    Predicate::Compare {
                        op: SqlComparison::IsNull,
                        ..
                    },
                    false
                ) | (
                    Predicate::Compare {
                        op: SqlComparison::IsNotNull,
                        ..
                    },
                    true
                )
            )
    });
    if needs_null_row {
        return Vec::new();
    }

    direct
        .iter()
        .filter(|(cond, negated)| {
            if !on_table(cond) {
                return false;
            }
            let presence_check = matches!(
                (&cond.predicate, *negated),
                (
                    Predicate::Compare {
                        op: SqlComparison::IsNotNull,
                        ..
                    },
                    false
                )
            );
            !(presence_check && stats.assignment(&cond.arg).arg.always_known)
        })
        .map(|(cond, negated)| ((*cond).clone(), *negated))
        .collect()
}
