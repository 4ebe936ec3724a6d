//! Expression analysis: argument usage statistics and planner hints.

mod sensitivity;

pub(crate) use sensitivity::is_multi_row_reference;

use crate::catalog::{ArgAssignment, MappingCatalog};
use crate::error::ConversionError;
use crate::expr::{Expression, ExpressionTree, MatchOperator, Operand};
use crate::flags::ConversionFlags;
use std::collections::{BTreeMap, BTreeSet};
#[cfg(feature = "tracing")]
use tracing::debug;

/// Derived statistics of one expression against one catalog.
#[derive(Debug, Default)]
pub struct Stats {
    pub args_in_positive_value_matches: BTreeSet<String>,
    pub args_in_negative_value_matches: BTreeSet<String>,
    pub args_in_positive_is_unknown_matches: BTreeSet<String>,
    pub args_in_negative_is_unknown_matches: BTreeSet<String>,
    /// Arguments whose column is multi-row (explicitly, via a sparse table,
    /// or via a collection attribute).
    pub args_marked_multi_row: BTreeSet<String>,
    /// Closure of arguments that must be evaluated through existence
    /// checks.
    pub args_multi_row_sensitive: BTreeSet<String>,
    /// Tables referenced by any argument, including reference targets.
    pub required_tables: BTreeSet<String>,
    /// True when missing rows could be mistaken for matches and no
    /// referenced table covers all ids.
    pub separate_base_table_required: bool,
    /// Derived planner hints.
    pub hints: ConversionFlags,
    /// Resolved assignments of every argument in the expression.
    pub(crate) args: BTreeMap<String, ArgAssignment>,
}

impl Stats {
    pub(crate) fn assignment(&self, arg: &str) -> &ArgAssignment {
        &self.args[arg]
    }

    pub(crate) fn is_sensitive(&self, arg: &str) -> bool {
        self.args_multi_row_sensitive.contains(arg)
    }
}

/// Analyzes the expression and derives [`Stats`].
pub fn analyze(
    tree: &ExpressionTree<'_>,
    catalog: &MappingCatalog,
) -> Result<Stats, ConversionError> {
    let leaves = tree.leaf_matches();

    // Argument resolution pass, including reference targets.
    let mut args: BTreeMap<String, ArgAssignment> = BTreeMap::new();
    for leaf in &leaves {
        if !args.contains_key(leaf.arg) {
            args.insert(leaf.arg.to_string(), catalog.lookup(leaf.arg)?);
        }
        if let Some(Operand::Reference(other)) = leaf.operand {
            if !args.contains_key(other.as_str()) {
                args.insert(other.clone(), catalog.lookup(other)?);
            }
        }
    }

    let mut stats = Stats::default();
    let mut has_reference = false;
    let mut has_multi_row_reference = false;
    let mut has_is_unknown = false;
    let mut negative_value_tables: BTreeSet<String> = BTreeSet::new();

    for leaf in &leaves {
        match leaf.op {
            MatchOperator::IsUnknown => {
                has_is_unknown = true;
                let set = if leaf.negated {
                    &mut stats.args_in_negative_is_unknown_matches
                } else {
                    &mut stats.args_in_positive_is_unknown_matches
                };
                set.insert(leaf.arg.to_string());
            }
            _ => {
                let set = if leaf.negated {
                    &mut stats.args_in_negative_value_matches
                } else {
                    &mut stats.args_in_positive_value_matches
                };
                set.insert(leaf.arg.to_string());
                if leaf.negated {
                    negative_value_tables.insert(args[leaf.arg].column.table.clone());
                }
                if matches!(leaf.operand, Some(Operand::Reference(_))) {
                    has_reference = true;
                    if is_multi_row_reference(leaf, &args) {
                        has_multi_row_reference = true;
                    }
                }
            }
        }
    }

    for (arg, assignment) in &args {
        if assignment.marked_multi_row() {
            stats.args_marked_multi_row.insert(arg.clone());
        }
        stats.required_tables.insert(assignment.column.table.clone());
    }

    stats.args_multi_row_sensitive = sensitivity::multi_row_sensitive(tree, &leaves, &args)?;

    let any_all_ids = stats
        .required_tables
        .iter()
        .any(|name| {
            catalog
                .table(name)
                .map(|t| t.nature.contains_all_ids())
                .unwrap_or(false)
        });
    stats.separate_base_table_required =
        catalog.table_count() > 1 && !any_all_ids && has_is_unknown;

    // Hints.
    let mut hints = ConversionFlags::empty();
    if !has_is_unknown {
        hints |= ConversionFlags::NO_IS_UNKNOWN;
    }
    if !has_reference {
        hints |= ConversionFlags::NO_REFERENCE_MATCH;
    }
    let has_and = !tree.collect(|e| matches!(e, Expression::And(_))).is_empty();
    let has_or = !tree.collect(|e| matches!(e, Expression::Or(_))).is_empty();
    if !has_and {
        hints |= ConversionFlags::NO_AND;
    }
    if !has_or {
        hints |= ConversionFlags::NO_OR;
    }
    if stats.args_multi_row_sensitive.is_empty() {
        hints |= ConversionFlags::NO_MULTI_ROW_SENSITIVITY;
    }
    if !has_multi_row_reference {
        hints |= ConversionFlags::NO_MULTI_ROW_REFERENCE_MATCH;
    }
    if args.len() == 1 {
        hints |= ConversionFlags::SINGLE_ATTRIBUTE;
    }

    let single_table = stats.required_tables.len() == 1;
    let single_all_ids = single_table && any_all_ids;
    if single_table {
        hints |= ConversionFlags::SINGLE_TABLE;
    }
    if single_all_ids {
        hints |= ConversionFlags::SINGLE_TABLE_CONTAINING_ALL_ROWS;
    }

    let no_sensitivity = stats.args_multi_row_sensitive.is_empty();
    // A simple condition must never bypass the separate-base requirement:
    // missing rows of a non-covering table would change IS UNKNOWN results.
    let simple = single_table
        && !stats.separate_base_table_required
        && (no_sensitivity
            || (single_all_ids && !has_and && !has_is_unknown && !has_multi_row_reference));
    if simple {
        hints |= ConversionFlags::SIMPLE_CONDITION;
    }

    // Direct IS NULL checks are only reliable on unfiltered columns of
    // all-ids tables without multi-row kinship.
    let unknown_needs_helper = leaves.iter().any(|leaf| {
        if leaf.op != MatchOperator::IsUnknown {
            return false;
        }
        let assignment = &args[leaf.arg];
        let all_ids = catalog
            .table(&assignment.column.table)
            .map(|t| t.nature.contains_all_ids())
            .unwrap_or(false);
        !all_ids
            || !assignment.column.filters.is_empty()
            || stats.args_multi_row_sensitive.contains(leaf.arg)
    });
    if simple && no_sensitivity && !unknown_needs_helper {
        hints |= ConversionFlags::NO_JOINS_REQUIRED;
    }

    // Inner joins are only possible in narrow circumstances; everything
    // else joins left-outer so missing rows cannot drop audience ids.
    let inner_possible = no_sensitivity
        && !has_or
        && !has_is_unknown
        && !has_multi_row_reference
        && negative_value_tables.iter().all(|name| {
            catalog
                .table(name)
                .map(|t| t.nature.id_unique())
                .unwrap_or(false)
        });
    if !inner_possible {
        hints |= ConversionFlags::LEFT_OUTER_JOINS_REQUIRED;
    }

    stats.hints = hints;
    stats.args = args;

    #[cfg(feature = "tracing")]
    debug!(hints = ?stats.hints, tables = ?stats.required_tables, "expression analyzed");
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{AssignmentConfig, CatalogBuilder, TableNature};
    use crate::types::{AdlType, SqlType};

    fn catalog() -> MappingCatalog {
        CatalogBuilder::new()
            .table("T_BASE", "ID", TableNature::PrimaryUnique)
            .table("T_FACTS", "UID", TableNature::Sparse)
            .assign(
                AssignmentConfig::new("provider", AdlType::String, "T_BASE", "PROVIDER", SqlType::Varchar)
                    .always_known(),
            )
            .assign(AssignmentConfig::new("country", AdlType::String, "T_BASE", "COUNTRY", SqlType::Varchar))
            .assign(
                AssignmentConfig::new("fact.hasCat.flg", AdlType::Bool, "T_FACTS", "F_VALUE_FLG", SqlType::Bool)
                    .filter("F_KEY", SqlType::Varchar, "${argName.local}"),
            )
            .assign(
                AssignmentConfig::new("fact.hasBird.flg", AdlType::Bool, "T_FACTS", "F_VALUE_FLG", SqlType::Bool)
                    .filter("F_KEY", SqlType::Varchar, "${argName.local}"),
            )
            .assign(AssignmentConfig::new("fact.provider", AdlType::String, "T_FACTS", "PROVIDER", SqlType::Varchar))
            .build()
            .unwrap()
    }

    fn stats_for(expr: &Expression) -> Stats {
        let catalog = catalog();
        let tree = ExpressionTree::build(expr).unwrap();
        analyze(&tree, &catalog).unwrap()
    }

    #[test]
    fn single_table_conjunction_is_simple() {
        let expr = Expression::and(vec![
            Expression::eq_value("provider", "LOGMOTH"),
            Expression::eq_value("country", "USA"),
        ]);
        let stats = stats_for(&expr);
        assert!(stats.hints.contains(ConversionFlags::SIMPLE_CONDITION));
        assert!(stats.hints.contains(ConversionFlags::SINGLE_TABLE_CONTAINING_ALL_ROWS));
        assert!(stats.hints.contains(ConversionFlags::NO_JOINS_REQUIRED));
        assert!(!stats.hints.contains(ConversionFlags::LEFT_OUTER_JOINS_REQUIRED));
        assert!(stats.hints.contains(ConversionFlags::NO_MULTI_ROW_SENSITIVITY));
        assert_eq!(stats.required_tables.len(), 1);
    }

    #[test]
    fn sparse_conjunction_requires_left_outer_joins() {
        let expr = Expression::and(vec![
            Expression::eq_value("fact.hasCat.flg", "1"),
            Expression::eq_value("fact.hasBird.flg", "1"),
        ]);
        let stats = stats_for(&expr);
        assert!(!stats.hints.contains(ConversionFlags::SIMPLE_CONDITION));
        assert!(stats.hints.contains(ConversionFlags::LEFT_OUTER_JOINS_REQUIRED));
        assert!(stats.is_sensitive("fact.hasCat.flg"));
        assert!(stats.is_sensitive("fact.hasBird.flg"));
        assert!(stats.hints.contains(ConversionFlags::SINGLE_TABLE));
        assert!(!stats.hints.contains(ConversionFlags::SINGLE_TABLE_CONTAINING_ALL_ROWS));
    }

    #[test]
    fn usage_sets_track_polarity() {
        let expr = Expression::and(vec![
            Expression::eq_value("provider", "LOGMOTH"),
            Expression::negated(Expression::eq_value("country", "MX")),
            Expression::is_unknown("country"),
        ]);
        let stats = stats_for(&expr);
        assert!(stats.args_in_positive_value_matches.contains("provider"));
        assert!(stats.args_in_negative_value_matches.contains("country"));
        assert!(stats.args_in_positive_is_unknown_matches.contains("country"));
        assert!(stats.args_in_negative_is_unknown_matches.is_empty());
    }

    #[test]
    fn inner_joins_allowed_for_unique_table_negation() {
        let expr = Expression::and(vec![
            Expression::eq_value("provider", "LOGMOTH"),
            Expression::negated(Expression::eq_value("country", "MX")),
        ]);
        let stats = stats_for(&expr);
        assert!(!stats.hints.contains(ConversionFlags::LEFT_OUTER_JOINS_REQUIRED));
    }

    #[test]
    fn separate_base_table_detection() {
        let expr = Expression::is_unknown("fact.hasCat.flg");
        let stats = stats_for(&expr);
        assert!(stats.separate_base_table_required);

        let expr = Expression::is_unknown("country");
        let stats = stats_for(&expr);
        assert!(!stats.separate_base_table_required);
    }

    #[test]
    fn unmapped_argument_fails_analysis() {
        let catalog = catalog();
        let expr = Expression::eq_value("nope", "1");
        let tree = ExpressionTree::build(&expr).unwrap();
        assert!(analyze(&tree, &catalog).is_err());
    }

    #[test]
    fn single_attribute_hint() {
        let stats = stats_for(&Expression::eq_value("provider", "X"));
        assert!(stats.hints.contains(ConversionFlags::SINGLE_ATTRIBUTE));
        assert!(stats.hints.contains(ConversionFlags::NO_AND));
        assert!(stats.hints.contains(ConversionFlags::NO_OR));
        assert!(stats.hints.contains(ConversionFlags::NO_IS_UNKNOWN));
        assert!(stats.hints.contains(ConversionFlags::NO_REFERENCE_MATCH));
    }
}
