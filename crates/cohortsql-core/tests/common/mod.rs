//! Shared fixtures and helpers for the integration tests.

use cohortsql_core::{
    AdlType, AssignmentConfig, AutoMappingConfig, CatalogBuilder, ColumnTemplateConfig,
    ConversionResult, FilterConfig, LocalNameExtractor, MappingCatalog, SqlType, TableNature,
};
use regex::Regex;
use std::collections::BTreeSet;

/// The audience landscape used throughout the scenario tests: a unique
/// primary base table, a sparse key-value fact table and a multi-row
/// position table.
pub fn audience_catalog() -> MappingCatalog {
    CatalogBuilder::new()
        .table("T_BASE", "ID", TableNature::PrimaryUnique)
        .table("T_FACTS", "UID", TableNature::Sparse)
        .table("T_POSDATA", "UID", TableNature::Plain)
        .assign(
            AssignmentConfig::new("provider", AdlType::String, "T_BASE", "PROVIDER", SqlType::Varchar)
                .always_known(),
        )
        .assign(AssignmentConfig::new(
            "home-country",
            AdlType::String,
            "T_BASE",
            "COUNTRY",
            SqlType::Varchar,
        ))
        .assign(AssignmentConfig::new(
            "om_score",
            AdlType::Decimal,
            "T_BASE",
            "OM_SCORE",
            SqlType::Decimal,
        ))
        .assign(AssignmentConfig::new(
            "upd1",
            AdlType::Date,
            "T_BASE",
            "UPD_TIME",
            SqlType::Timestamp,
        ))
        .assign(AssignmentConfig::new(
            "fact.provider",
            AdlType::String,
            "T_FACTS",
            "PROVIDER",
            SqlType::Varchar,
        ))
        .assign(
            AssignmentConfig::new("pos.country", AdlType::String, "T_POSDATA", "COUNTRY", SqlType::Varchar)
                .multi_row(),
        )
        .assign(
            AssignmentConfig::new("pos.date", AdlType::Date, "T_POSDATA", "POS_DATE", SqlType::Date)
                .multi_row(),
        )
        .auto_map(AutoMappingConfig {
            table: "T_FACTS".to_string(),
            extractor: LocalNameExtractor::Affix {
                prefix: "fact.".to_string(),
                suffix: Some(".flg".to_string()),
            },
            template: ColumnTemplateConfig {
                table: None,
                column: "F_VALUE_FLG".to_string(),
                sql_type: SqlType::Bool,
                arg_type: AdlType::Bool,
                always_known: false,
                multi_row: true,
                filters: vec![FilterConfig {
                    column: "F_KEY".to_string(),
                    sql_type: SqlType::Varchar,
                    value: "${argName.local}".to_string(),
                }],
                caster: None,
            },
        })
        .auto_map(AutoMappingConfig {
            table: "T_FACTS".to_string(),
            extractor: LocalNameExtractor::Affix {
                prefix: "fact.".to_string(),
                suffix: Some(".str".to_string()),
            },
            template: ColumnTemplateConfig {
                table: None,
                column: "F_VALUE_STR".to_string(),
                sql_type: SqlType::Varchar,
                arg_type: AdlType::String,
                always_known: false,
                multi_row: true,
                filters: vec![FilterConfig {
                    column: "F_KEY".to_string(),
                    sql_type: SqlType::Varchar,
                    value: "${argName.local}".to_string(),
                }],
                caster: None,
            },
        })
        .build()
        .expect("valid audience catalog")
}

/// Flat key-value landscape without a primary table; values live in a text
/// column matched through an INT caster.
pub fn cflat_catalog() -> MappingCatalog {
    CatalogBuilder::new()
        .table("T_CFLAT", "CID", TableNature::Sparse)
        .assign(
            AssignmentConfig::new("sizeCM", AdlType::Integer, "T_CFLAT", "C_VALUE", SqlType::Varchar)
                .filter("C_KEY", SqlType::Varchar, "${argName}")
                .caster("CAST(${column} AS INT)", SqlType::Int),
        )
        .build()
        .expect("valid flat catalog")
}

/// Asserts the template parses as a single statement once placeholders are
/// substituted with literals.
pub fn assert_parses(sql: &str) {
    let substituted = Regex::new(r"\$\{p\d+\}")
        .expect("valid pattern")
        .replace_all(sql, "'x'");
    let dialect = sqlparser::dialect::GenericDialect {};
    let statements = sqlparser::parser::Parser::parse_sql(&dialect, &substituted)
        .unwrap_or_else(|err| panic!("emitted SQL does not parse: {err}\n{sql}"));
    assert_eq!(statements.len(), 1, "expected a single statement:\n{sql}");
}

/// Placeholder names referenced by the template.
pub fn referenced_placeholders(sql: &str) -> BTreeSet<String> {
    Regex::new(r"\$\{(p\d+)\}")
        .expect("valid pattern")
        .captures_iter(sql)
        .map(|caps| caps[1].to_string())
        .collect()
}

/// Asserts the 1:1 correspondence between `${pN}` references and the
/// parameter list.
pub fn assert_parameter_completeness(result: &ConversionResult) {
    let referenced = referenced_placeholders(&result.sql);
    let declared: BTreeSet<String> = result
        .parameters
        .iter()
        .map(|p| p.name.clone())
        .collect();
    assert_eq!(referenced, declared, "template/parameter mismatch:\n{}", result.sql);
    for (i, parameter) in result.parameters.iter().enumerate() {
        assert_eq!(parameter.id as usize, i + 1, "parameter ids must be sequential");
    }
}

pub fn param_values(result: &ConversionResult) -> Vec<&str> {
    result.parameters.iter().map(|p| p.value.as_str()).collect()
}
