#![no_main]

use cohortsql_core::{
    AdlType, AssignmentConfig, CatalogBuilder, ConversionRequest, Expression, MappingCatalog,
    MatchOperator, SqlConverter, SqlType, TableNature,
};
use libfuzzer_sys::fuzz_target;
use std::sync::{Arc, OnceLock};

fn catalog() -> Arc<MappingCatalog> {
    static CATALOG: OnceLock<Arc<MappingCatalog>> = OnceLock::new();
    Arc::clone(CATALOG.get_or_init(|| {
        Arc::new(
            CatalogBuilder::new()
                .table("T_BASE", "ID", TableNature::PrimaryUnique)
                .table("T_FACTS", "UID", TableNature::Sparse)
                .assign(AssignmentConfig::new(
                    "provider",
                    AdlType::String,
                    "T_BASE",
                    "PROVIDER",
                    SqlType::Varchar,
                ))
                .assign(AssignmentConfig::new(
                    "score",
                    AdlType::Integer,
                    "T_BASE",
                    "SCORE",
                    SqlType::Int,
                ))
                .assign(
                    AssignmentConfig::new(
                        "fact.value",
                        AdlType::String,
                        "T_FACTS",
                        "F_VALUE",
                        SqlType::Varchar,
                    )
                    .filter("F_KEY", SqlType::Varchar, "${argName}"),
                )
                .build()
                .expect("valid fuzz catalog"),
        )
    }))
}

fn next(bytes: &mut impl Iterator<Item = u8>) -> u8 {
    bytes.next().unwrap_or(0)
}

fn build_expr(bytes: &mut impl Iterator<Item = u8>, depth: u8) -> Expression {
    let selector = next(bytes);
    let value = format!("v{}", next(bytes));
    match selector % 8 {
        0 => Expression::eq_value("provider", value),
        1 => Expression::eq_value("fact.value", value),
        2 => Expression::gt_value("score", format!("{}", next(bytes))),
        3 => Expression::is_unknown("fact.value"),
        4 => Expression::reference("fact.value", MatchOperator::Eq, "provider"),
        5 => Expression::negated(Expression::eq_value("provider", value)),
        6 if depth < 4 => Expression::and(vec![
            build_expr(bytes, depth + 1),
            build_expr(bytes, depth + 1),
        ]),
        _ if depth < 4 => Expression::or(vec![
            build_expr(bytes, depth + 1),
            build_expr(bytes, depth + 1),
        ]),
        _ => Expression::eq_value("provider", value),
    }
}

fuzz_target!(|data: &[u8]| {
    let mut bytes = data.iter().copied();
    let expression = build_expr(&mut bytes, 0);
    let mut converter = SqlConverter::new(catalog());
    let _ = converter.convert(&ConversionRequest::new(expression));
});
