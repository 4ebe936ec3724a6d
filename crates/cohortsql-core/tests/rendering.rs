//! Snapshot checks of canonical renderings.

mod common;

use cohortsql_core::{
    ConversionRequest, ErrorCode, Expression, MatchOperator, SqlConverter,
};
use insta::assert_snapshot;
use std::sync::Arc;

#[test]
fn canonical_expression_rendering() {
    let expr = Expression::and(vec![
        Expression::eq_value("provider", "LOGMOTH"),
        Expression::or(vec![
            Expression::negated(Expression::eq_value("home-country", "MX")),
            Expression::is_unknown("home-country"),
            Expression::reference("fact.provider", MatchOperator::Eq, "provider"),
        ]),
    ]);
    assert_snapshot!(
        expr.to_string(),
        @r#"(provider = "LOGMOTH" AND (NOT home-country = "MX" OR home-country IS UNKNOWN OR fact.provider = @provider))"#
    );
}

#[test]
fn conversion_error_rendering_names_the_expression() {
    let mut converter = SqlConverter::new(Arc::new(common::audience_catalog()));
    let err = converter
        .convert(&ConversionRequest::new(Expression::is_unknown("provider")))
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::AlwaysFalse);
    assert_snapshot!(
        err.to_string(),
        @"ERR_1002_ALWAYS_FALSE: expression matches no record after always-known rewriting [expression: provider IS UNKNOWN]"
    );
}

#[test]
fn single_line_where_clause_rendering() {
    let mut converter = SqlConverter::new(Arc::new(common::audience_catalog()));
    let result = converter
        .convert(&ConversionRequest::new(Expression::eq_value(
            "om_score", "42.5",
        )))
        .unwrap();
    let where_line = result
        .sql
        .lines()
        .find(|line| line.starts_with("WHERE "))
        .expect("WHERE clause present")
        .to_string();
    assert_snapshot!(where_line, @"WHERE T_BASE.OM_SCORE = ${p1}");
}
