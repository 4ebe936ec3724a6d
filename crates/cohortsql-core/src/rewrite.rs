//! Always-known rewriting.
//!
//! `IS UNKNOWN` on an effective always-known argument can never hold; its
//! negation always holds. Folding those leaves may collapse whole branches,
//! and a collapsed root is a conversion error (the caller decides whether
//! an always-false expression maps to an empty result).

use crate::catalog::MappingCatalog;
use crate::error::{ConversionError, ErrorCode};
use crate::expr::{Expression, MatchOperator};

enum Folded {
    True,
    False,
    Keep(Expression),
}

/// Applies always-known rewriting and returns the reduced expression, or
/// the ALWAYS_TRUE/ALWAYS_FALSE error when the root collapses.
pub(crate) fn collapse(
    expr: &Expression,
    catalog: &MappingCatalog,
) -> Result<Expression, ConversionError> {
    match fold(expr, catalog)? {
        Folded::True => Err(ConversionError::on_expression(
            ErrorCode::AlwaysTrue,
            "expression matches every record after always-known rewriting",
            expr,
        )),
        Folded::False => Err(ConversionError::on_expression(
            ErrorCode::AlwaysFalse,
            "expression matches no record after always-known rewriting",
            expr,
        )),
        Folded::Keep(reduced) => Ok(reduced),
    }
}

fn fold(expr: &Expression, catalog: &MappingCatalog) -> Result<Folded, ConversionError> {
    match expr {
        Expression::Match { arg, op, .. } => {
            if *op == MatchOperator::IsUnknown {
                let assignment = catalog.lookup(arg)?;
                if assignment.arg.always_known {
                    return Ok(Folded::False);
                }
            }
            Ok(Folded::Keep(expr.clone()))
        }
        Expression::Negation(inner) => Ok(match fold(inner, catalog)? {
            Folded::True => Folded::False,
            Folded::False => Folded::True,
            Folded::Keep(kept) => Folded::Keep(Expression::Negation(Box::new(kept))),
        }),
        Expression::And(members) => {
            let mut kept = Vec::new();
            for member in members {
                match fold(member, catalog)? {
                    Folded::False => return Ok(Folded::False),
                    Folded::True => {}
                    Folded::Keep(m) => kept.push(m),
                }
            }
            Ok(match kept.len() {
                0 => Folded::True,
                1 => Folded::Keep(kept.swap_remove(0)),
                _ => Folded::Keep(Expression::And(kept)),
            })
        }
        Expression::Or(members) => {
            let mut kept = Vec::new();
            for member in members {
                match fold(member, catalog)? {
                    Folded::True => return Ok(Folded::True),
                    Folded::False => {}
                    Folded::Keep(m) => kept.push(m),
                }
            }
            Ok(match kept.len() {
                0 => Folded::False,
                1 => Folded::Keep(kept.swap_remove(0)),
                _ => Folded::Keep(Expression::Or(kept)),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{AssignmentConfig, CatalogBuilder, TableNature};
    use crate::types::{AdlType, SqlType};

    fn catalog() -> MappingCatalog {
        CatalogBuilder::new()
            .table("T_BASE", "ID", TableNature::PrimaryUnique)
            .assign(
                AssignmentConfig::new("provider", AdlType::String, "T_BASE", "PROVIDER", SqlType::Varchar)
                    .always_known(),
            )
            .assign(AssignmentConfig::new("country", AdlType::String, "T_BASE", "COUNTRY", SqlType::Varchar))
            .build()
            .unwrap()
    }

    #[test]
    fn unknown_on_always_known_collapses_to_false() {
        let catalog = catalog();
        let err = collapse(&Expression::is_unknown("provider"), &catalog).unwrap_err();
        assert_eq!(err.code, ErrorCode::AlwaysFalse);
    }

    #[test]
    fn negated_unknown_on_always_known_collapses_to_true() {
        let catalog = catalog();
        let expr = Expression::negated(Expression::is_unknown("provider"));
        let err = collapse(&expr, &catalog).unwrap_err();
        assert_eq!(err.code, ErrorCode::AlwaysTrue);
    }

    #[test]
    fn and_drops_true_members() {
        let catalog = catalog();
        let expr = Expression::and(vec![
            Expression::eq_value("country", "USA"),
            Expression::negated(Expression::is_unknown("provider")),
        ]);
        let reduced = collapse(&expr, &catalog).unwrap();
        assert_eq!(reduced, Expression::eq_value("country", "USA"));
    }

    #[test]
    fn or_with_collapsed_member_keeps_the_rest() {
        let catalog = catalog();
        let expr = Expression::or(vec![
            Expression::is_unknown("provider"),
            Expression::eq_value("country", "USA"),
            Expression::eq_value("country", "MX"),
        ]);
        let reduced = collapse(&expr, &catalog).unwrap();
        assert_eq!(
            reduced,
            Expression::or(vec![
                Expression::eq_value("country", "USA"),
                Expression::eq_value("country", "MX"),
            ])
        );
    }

    #[test]
    fn unknown_on_nullable_column_is_kept() {
        let catalog = catalog();
        let expr = Expression::is_unknown("country");
        assert_eq!(collapse(&expr, &catalog).unwrap(), expr);
    }

    #[test]
    fn and_of_false_member_collapses_entirely() {
        let catalog = catalog();
        let expr = Expression::and(vec![
            Expression::eq_value("country", "USA"),
            Expression::is_unknown("provider"),
        ]);
        let err = collapse(&expr, &catalog).unwrap_err();
        assert_eq!(err.code, ErrorCode::AlwaysFalse);
    }
}
