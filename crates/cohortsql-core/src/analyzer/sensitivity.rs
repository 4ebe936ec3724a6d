//! Multi-row sensitivity closure.
//!
//! An argument is multi-row sensitive when evaluating its condition on a
//! joined row directly could pin the row and produce a false-empty result,
//! or when missing-row effects make NULL semantics unreliable. Sensitive
//! arguments are evaluated through existence-check aliases instead of
//! direct predicates.

use crate::catalog::ArgAssignment;
use crate::error::{ConversionError, ErrorCode};
use crate::expr::{ExpressionTree, LeafMatch, MatchOperator, Operand};
use std::collections::{BTreeMap, BTreeSet};
#[cfg(feature = "tracing")]
use tracing::trace;

/// Upper bound on pair visits of the implication scan. The scan is
/// quadratic in leaf count; exceeding the bound fails the conversion
/// instead of stalling it.
pub(crate) const SENSITIVITY_SCAN_LIMIT: usize = 1_000_000;

fn marked(args: &BTreeMap<String, ArgAssignment>, arg: &str) -> bool {
    args.get(arg).map(ArgAssignment::marked_multi_row).unwrap_or(false)
}

fn has_filters(args: &BTreeMap<String, ArgAssignment>, arg: &str) -> bool {
    args.get(arg)
        .map(|a| !a.column.filters.is_empty())
        .unwrap_or(false)
}

fn leaf_tables<'a>(
    leaf: &LeafMatch<'_>,
    args: &'a BTreeMap<String, ArgAssignment>,
) -> Vec<&'a str> {
    let mut tables = Vec::new();
    if let Some(assignment) = args.get(leaf.arg) {
        tables.push(assignment.column.table.as_str());
    }
    if let Some(Operand::Reference(other)) = leaf.operand {
        if let Some(assignment) = args.get(other.as_str()) {
            tables.push(assignment.column.table.as_str());
        }
    }
    tables
}

/// True for a same-table reference match that would require a self-join.
pub(crate) fn is_multi_row_reference(
    leaf: &LeafMatch<'_>,
    args: &BTreeMap<String, ArgAssignment>,
) -> bool {
    let Some(Operand::Reference(other)) = leaf.operand else {
        return false;
    };
    let (Some(left), Some(right)) = (args.get(leaf.arg), args.get(other.as_str())) else {
        return false;
    };
    left.column.table == right.column.table
        && (left.marked_multi_row() || right.marked_multi_row())
}

/// Computes the closure of multi-row sensitive arguments.
pub(crate) fn multi_row_sensitive(
    tree: &ExpressionTree<'_>,
    leaves: &[LeafMatch<'_>],
    args: &BTreeMap<String, ArgAssignment>,
) -> Result<BTreeSet<String>, ConversionError> {
    let mut sensitive: BTreeSet<String> = BTreeSet::new();

    // Direct causes.
    for leaf in leaves {
        match leaf.op {
            MatchOperator::IsUnknown => {
                // Missing-row semantics; NULL checks on filtered columns are
                // unreliable regardless of multi-row marking.
                if marked(args, leaf.arg) || has_filters(args, leaf.arg) {
                    sensitive.insert(leaf.arg.to_string());
                }
            }
            _ => {
                if leaf.negated && marked(args, leaf.arg) {
                    sensitive.insert(leaf.arg.to_string());
                }
                if is_multi_row_reference(leaf, args) {
                    sensitive.insert(leaf.arg.to_string());
                    if let Some(Operand::Reference(other)) = leaf.operand {
                        sensitive.insert(other.clone());
                    }
                }
            }
        }
    }

    // Implication rule, iterated to a fixed point: two non-identical leaves
    // sharing an AND ancestor whose tables overlap make every marked
    // argument among them sensitive.
    let mut visits: usize = 0;
    loop {
        let mut changed = false;
        for (i, a) in leaves.iter().enumerate() {
            for b in leaves.iter().skip(i + 1) {
                visits += 1;
                if visits > SENSITIVITY_SCAN_LIMIT {
                    return Err(ConversionError::on_expression(
                        ErrorCode::MappingFailed,
                        "multi-row sensitivity scan exceeded its safety bound",
                        &tree.root(),
                    ));
                }
                let tables_a = leaf_tables(a, args);
                let tables_b = leaf_tables(b, args);
                let overlap = tables_a.iter().any(|t| tables_b.contains(t));
                if !overlap || !tree.shares_and_ancestor(a.node, b.node) {
                    continue;
                }
                for leaf in [a, b] {
                    if marked(args, leaf.arg) && sensitive.insert(leaf.arg.to_string()) {
                        changed = true;
                    }
                    if let Some(Operand::Reference(other)) = leaf.operand {
                        if marked(args, other) && sensitive.insert(other.clone()) {
                            changed = true;
                        }
                    }
                }
            }
        }
        if !changed {
            break;
        }
    }

    #[cfg(feature = "tracing")]
    trace!(?sensitive, "multi-row sensitivity closure complete");
    Ok(sensitive)
}
