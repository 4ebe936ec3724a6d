//! Catalog configuration via JSON.

mod common;

use cohortsql_core::{
    CatalogConfig, ConversionRequest, Expression, MappingCatalog, SqlConverter,
};
use common::assert_parses;
use std::sync::Arc;

const CONFIG: &str = r#"
{
  "tables": [
    { "name": "T_BASE", "idColumn": "ID", "nature": "primaryUnique" },
    { "name": "T_FACTS", "idColumn": "UID", "nature": "sparse" }
  ],
  "assignments": [
    {
      "arg": "provider",
      "type": "string",
      "table": "T_BASE",
      "column": "PROVIDER",
      "sqlType": "varchar",
      "alwaysKnown": true
    },
    {
      "arg": "sizeCM",
      "type": "integer",
      "table": "T_FACTS",
      "column": "F_VALUE",
      "sqlType": "varchar",
      "filters": [
        { "column": "F_KEY", "sqlType": "varchar", "value": "${argName}" }
      ],
      "caster": { "template": "CAST(${column} AS INT)", "target": "int" }
    }
  ],
  "autoMapping": [
    {
      "table": "T_FACTS",
      "extractor": { "affix": { "prefix": "fact.", "suffix": ".flg" } },
      "template": {
        "column": "F_VALUE_FLG",
        "sqlType": "bool",
        "argType": "bool",
        "multiRow": true,
        "filters": [
          { "column": "F_KEY", "sqlType": "varchar", "value": "${argName.local}" }
        ]
      }
    }
  ]
}
"#;

fn catalog_from_json() -> MappingCatalog {
    let config = CatalogConfig::from_json(CONFIG).expect("valid JSON configuration");
    MappingCatalog::from_config(&config).expect("valid catalog")
}

#[test]
fn json_catalog_supports_explicit_and_auto_mapped_arguments() {
    let mut converter = SqlConverter::new(Arc::new(catalog_from_json()));

    let result = converter
        .convert(&ConversionRequest::new(Expression::eq_value(
            "provider", "LOGMOTH",
        )))
        .unwrap();
    assert_parses(&result.sql);
    assert!(result.sql.contains("WHERE T_BASE.PROVIDER = ${p1}"));

    let result = converter
        .convert(&ConversionRequest::new(Expression::eq_value(
            "fact.hasCat.flg",
            "1",
        )))
        .unwrap();
    assert_parses(&result.sql);
    assert!(result
        .sql
        .contains("WHERE T_FACTS.F_KEY = ${p1} AND T_FACTS.F_VALUE_FLG = ${p2}"));
    assert_eq!(result.parameters[0].value, "hasCat");
}

#[test]
fn json_catalog_applies_native_casters() {
    let mut converter = SqlConverter::new(Arc::new(catalog_from_json()));
    let result = converter
        .convert(&ConversionRequest::new(Expression::gt_value("sizeCM", "185")))
        .unwrap();
    assert!(result.sql.contains("CAST(T_FACTS.F_VALUE AS INT) > ${p2}"));
}

#[test]
fn config_round_trips_through_serde() {
    let config = CatalogConfig::from_json(CONFIG).unwrap();
    let json = serde_json::to_string(&config).unwrap();
    let back = CatalogConfig::from_json(&json).unwrap();
    assert_eq!(config, back);
}

#[test]
fn config_exposes_a_json_schema() {
    let schema = schemars::schema_for!(CatalogConfig);
    let value = serde_json::to_value(&schema).unwrap();
    assert!(value.get("$schema").is_some() || value.get("title").is_some());
}
