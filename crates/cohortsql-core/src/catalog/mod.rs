//! The mapping catalog: tables, columns, filter columns, natures and
//! argument assignments.
//!
//! The catalog is the single source of truth for the physical landscape
//! during a conversion. It is immutable after construction and safe to share
//! across converters. Construction validates the whole configuration; no
//! partial catalog is ever produced.
//!
//! Argument resolution is a two-step process: explicit assignments always
//! win, then auto-mapping policies are probed in configuration order. The
//! first policy whose extractor yields a non-empty local name produces a
//! synthetic assignment from its column template.

mod automap;
pub mod config;

pub use config::{
    AssignmentConfig, AutoMappingConfig, CatalogBuilder, CatalogConfig, ColumnTemplateConfig,
    FilterConfig, LocalNameExtractor, NativeTypeCaster, TableConfig, TableNature,
};

use crate::error::{CatalogError, ConversionError, ErrorCode};
use crate::types::{AdlType, SqlType};
use automap::AutoMappingPolicy;
use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;

/// Runtime table metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableMeta {
    pub name: String,
    pub id_column: String,
    pub nature: TableNature,
    pub filters: Vec<FilterConfig>,
}

/// Runtime column metadata with effective flags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataColumn {
    pub table: String,
    pub name: String,
    pub sql_type: SqlType,
    pub always_known: bool,
    /// Effective: configured multi-row or located on a sparse table.
    pub multi_row: bool,
    pub filters: Vec<FilterConfig>,
    pub caster: Option<NativeTypeCaster>,
}

impl DataColumn {
    /// SQL type parameters bind with: the caster target when present.
    pub fn effective_sql_type(&self) -> SqlType {
        self.caster.as_ref().map(|c| c.target).unwrap_or(self.sql_type)
    }
}

/// Effective argument metadata after applying column overrides.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgMeta {
    pub name: String,
    pub adl_type: AdlType,
    pub always_known: bool,
    pub is_collection: bool,
}

/// A resolved argument-to-column assignment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgAssignment {
    pub arg: ArgMeta,
    pub column: DataColumn,
    /// Local name extracted by an auto-mapping policy, if any.
    pub local_name: Option<String>,
}

impl ArgAssignment {
    /// True when the argument counts as multi-row for sensitivity analysis.
    pub fn marked_multi_row(&self) -> bool {
        self.column.multi_row || self.arg.is_collection
    }
}

/// Immutable catalog shared by all conversions.
#[derive(Debug)]
pub struct MappingCatalog {
    tables: HashMap<String, TableMeta>,
    assignments: HashMap<String, ArgAssignment>,
    policies: Vec<AutoMappingPolicy>,
    primary: Option<String>,
}

fn identifier_regex() -> &'static Regex {
    static IDENTIFIER: OnceLock<Regex> = OnceLock::new();
    IDENTIFIER.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid pattern"))
}

fn check_identifier(name: &str) -> Result<(), CatalogError> {
    if identifier_regex().is_match(name) {
        Ok(())
    } else {
        Err(CatalogError::InvalidIdentifier(name.to_string()))
    }
}

/// Derives the default `argName.local` value for explicitly assigned
/// arguments: the middle segments of a dotted name (`fact.hasCat.flg` yields
/// `hasCat`, `pos.country` yields `country`), or the full name when undotted.
pub(crate) fn derive_local_name(arg: &str) -> String {
    let segments: Vec<&str> = arg.split('.').collect();
    match segments.len() {
        0 | 1 => arg.to_string(),
        2 => segments[1].to_string(),
        n => segments[1..n - 1].join("."),
    }
}

impl MappingCatalog {
    /// Validates the configuration and builds the catalog.
    pub fn from_config(config: &CatalogConfig) -> Result<Self, CatalogError> {
        let mut tables: HashMap<String, TableMeta> = HashMap::new();
        let mut primary: Option<String> = None;

        for table in &config.tables {
            check_identifier(&table.name)?;
            check_identifier(&table.id_column)?;
            if tables.contains_key(&table.name) {
                return Err(CatalogError::DuplicateTable(table.name.clone()));
            }
            if table.nature.is_primary() {
                if let Some(existing) = &primary {
                    return Err(CatalogError::DuplicatePrimaryTable(
                        existing.clone(),
                        table.name.clone(),
                    ));
                }
                primary = Some(table.name.clone());
            }
            for filter in &table.filters {
                check_identifier(&filter.column)?;
                if filter.column == table.id_column {
                    return Err(CatalogError::FilterColumnCollision {
                        table: table.name.clone(),
                        filter: filter.column.clone(),
                        role: "id",
                        column: table.id_column.clone(),
                    });
                }
            }
            tables.insert(
                table.name.clone(),
                TableMeta {
                    name: table.name.clone(),
                    id_column: table.id_column.clone(),
                    nature: table.nature,
                    filters: table.filters.clone(),
                },
            );
        }

        let mut assignments: HashMap<String, ArgAssignment> = HashMap::new();
        for assignment in &config.assignments {
            if assignment.arg.is_empty() {
                return Err(CatalogError::InvalidIdentifier(assignment.arg.clone()));
            }
            check_identifier(&assignment.column)?;
            let table = tables
                .get(&assignment.table)
                .ok_or_else(|| CatalogError::UnknownTable {
                    arg: assignment.arg.clone(),
                    table: assignment.table.clone(),
                })?;
            if assignments.contains_key(&assignment.arg) {
                return Err(CatalogError::DuplicateArgument(assignment.arg.clone()));
            }
            Self::check_column_rules(
                table,
                &assignment.column,
                assignment.always_known,
                assignment.multi_row,
                &assignment.filters,
            )?;
            let multi_row = assignment.multi_row || table.nature.is_sparse();
            assignments.insert(
                assignment.arg.clone(),
                ArgAssignment {
                    arg: ArgMeta {
                        name: assignment.arg.clone(),
                        adl_type: assignment.adl_type,
                        always_known: assignment.always_known,
                        is_collection: assignment.is_collection,
                    },
                    column: DataColumn {
                        table: table.name.clone(),
                        name: assignment.column.clone(),
                        sql_type: assignment.sql_type,
                        always_known: assignment.always_known,
                        multi_row,
                        filters: assignment.filters.clone(),
                        caster: assignment.caster.clone(),
                    },
                    local_name: None,
                },
            );
        }

        let mut policies = Vec::new();
        for policy_config in &config.auto_mapping {
            let table = tables.get(&policy_config.table).ok_or_else(|| {
                CatalogError::UnknownTable {
                    arg: format!("<auto-mapping on {}>", policy_config.table),
                    table: policy_config.table.clone(),
                }
            })?;
            check_identifier(&policy_config.template.column)?;
            Self::check_column_rules(
                table,
                &policy_config.template.column,
                policy_config.template.always_known,
                policy_config.template.multi_row,
                &policy_config.template.filters,
            )?;
            policies.push(AutoMappingPolicy::compile(policy_config)?);
        }

        Ok(Self {
            tables,
            assignments,
            policies,
            primary,
        })
    }

    fn check_column_rules(
        table: &TableMeta,
        column: &str,
        always_known: bool,
        multi_row: bool,
        filters: &[FilterConfig],
    ) -> Result<(), CatalogError> {
        if table.nature.id_unique() && multi_row {
            return Err(CatalogError::UniqueMultiRowContradiction {
                table: table.name.clone(),
                column: column.to_string(),
            });
        }
        if always_known && !table.nature.contains_all_ids() {
            return Err(CatalogError::AlwaysKnownRequiresAllIds {
                table: table.name.clone(),
                column: column.to_string(),
            });
        }
        for filter in filters {
            check_identifier(&filter.column)?;
            if filter.column == table.id_column {
                return Err(CatalogError::FilterColumnCollision {
                    table: table.name.clone(),
                    filter: filter.column.clone(),
                    role: "id",
                    column: table.id_column.clone(),
                });
            }
            if filter.column == column {
                return Err(CatalogError::FilterColumnCollision {
                    table: table.name.clone(),
                    filter: filter.column.clone(),
                    role: "data",
                    column: column.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Resolves an argument to its assignment, probing auto-mapping policies
    /// when no explicit assignment exists.
    pub fn lookup(&self, arg: &str) -> Result<ArgAssignment, ConversionError> {
        if let Some(assignment) = self.assignments.get(arg) {
            return Ok(assignment.clone());
        }
        for policy in &self.policies {
            if let Some(local) = policy.extractor.extract(arg) {
                let table = &self.tables[&policy.table];
                let template = &policy.template;
                let multi_row = template.multi_row || table.nature.is_sparse();
                return Ok(ArgAssignment {
                    arg: ArgMeta {
                        name: arg.to_string(),
                        adl_type: template.arg_type,
                        always_known: template.always_known,
                        is_collection: false,
                    },
                    column: DataColumn {
                        table: table.name.clone(),
                        name: template.column.clone(),
                        sql_type: template.sql_type,
                        always_known: template.always_known,
                        multi_row,
                        filters: template.filters.clone(),
                        caster: template.caster.clone(),
                    },
                    local_name: Some(local),
                });
            }
        }
        Err(ConversionError::new(
            ErrorCode::MappingFailed,
            format!("argument '{arg}' is not mapped to any column"),
        ))
    }

    pub fn table(&self, name: &str) -> Result<&TableMeta, ConversionError> {
        self.tables.get(name).ok_or_else(|| {
            ConversionError::new(ErrorCode::MappingFailed, format!("unknown table '{name}'"))
        })
    }

    pub fn primary_table(&self) -> Option<&TableMeta> {
        self.primary.as_deref().and_then(|name| self.tables.get(name))
    }

    /// Tables guaranteed to contain every id, sorted by name.
    pub fn tables_with_all_ids(&self) -> Vec<&TableMeta> {
        let mut found: Vec<&TableMeta> = self
            .tables
            .values()
            .filter(|t| t.nature.contains_all_ids())
            .collect();
        found.sort_by(|a, b| a.name.cmp(&b.name));
        found
    }

    /// All table names in alphabetical order.
    pub fn table_names_sorted(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tables.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn table_count(&self) -> usize {
        self.tables.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_builder() -> CatalogBuilder {
        CatalogBuilder::new()
            .table("T_BASE", "ID", TableNature::PrimaryUnique)
            .table("T_FACTS", "UID", TableNature::Sparse)
    }

    #[test]
    fn explicit_lookup_wins() {
        let catalog = base_builder()
            .assign(AssignmentConfig::new(
                "provider",
                AdlType::String,
                "T_BASE",
                "PROVIDER",
                SqlType::Varchar,
            ))
            .build()
            .unwrap();
        let assignment = catalog.lookup("provider").unwrap();
        assert_eq!(assignment.column.table, "T_BASE");
        assert_eq!(assignment.column.name, "PROVIDER");
        assert!(assignment.local_name.is_none());
    }

    #[test]
    fn sparse_table_marks_columns_multi_row() {
        let catalog = base_builder()
            .assign(AssignmentConfig::new(
                "fact.provider",
                AdlType::String,
                "T_FACTS",
                "PROVIDER",
                SqlType::Varchar,
            ))
            .build()
            .unwrap();
        let assignment = catalog.lookup("fact.provider").unwrap();
        assert!(assignment.column.multi_row);
        assert!(assignment.marked_multi_row());
    }

    #[test]
    fn auto_mapping_probes_in_order() {
        let catalog = base_builder()
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
            .build()
            .unwrap();
        let assignment = catalog.lookup("fact.hasCat.flg").unwrap();
        assert_eq!(assignment.local_name.as_deref(), Some("hasCat"));
        assert_eq!(assignment.column.name, "F_VALUE_FLG");
        assert!(catalog.lookup("unrelated").is_err());
    }

    #[test]
    fn duplicate_primary_is_rejected() {
        let err = CatalogBuilder::new()
            .table("T_A", "ID", TableNature::Primary)
            .table("T_B", "ID", TableNature::PrimaryUnique)
            .build()
            .unwrap_err();
        assert!(matches!(err, CatalogError::DuplicatePrimaryTable(_, _)));
    }

    #[test]
    fn duplicate_argument_is_rejected() {
        let err = base_builder()
            .assign(AssignmentConfig::new("a", AdlType::String, "T_BASE", "C1", SqlType::Varchar))
            .assign(AssignmentConfig::new("a", AdlType::String, "T_BASE", "C2", SqlType::Varchar))
            .build()
            .unwrap_err();
        assert!(matches!(err, CatalogError::DuplicateArgument(_)));
    }

    #[test]
    fn filter_colliding_with_id_column_is_rejected() {
        let err = base_builder()
            .assign(
                AssignmentConfig::new("a", AdlType::String, "T_FACTS", "F_VALUE", SqlType::Varchar)
                    .filter("UID", SqlType::Varchar, "x"),
            )
            .build()
            .unwrap_err();
        assert!(matches!(err, CatalogError::FilterColumnCollision { role: "id", .. }));
    }

    #[test]
    fn multi_row_on_unique_table_is_rejected() {
        let err = base_builder()
            .assign(
                AssignmentConfig::new("a", AdlType::String, "T_BASE", "C1", SqlType::Varchar)
                    .multi_row(),
            )
            .build()
            .unwrap_err();
        assert!(matches!(err, CatalogError::UniqueMultiRowContradiction { .. }));
    }

    #[test]
    fn always_known_requires_all_ids() {
        let err = base_builder()
            .assign(
                AssignmentConfig::new("a", AdlType::String, "T_FACTS", "F_VALUE", SqlType::Varchar)
                    .always_known(),
            )
            .build()
            .unwrap_err();
        assert!(matches!(err, CatalogError::AlwaysKnownRequiresAllIds { .. }));
    }

    #[test]
    fn cross_table_policy_is_rejected() {
        let err = base_builder()
            .auto_map(AutoMappingConfig {
                table: "T_FACTS".to_string(),
                extractor: LocalNameExtractor::Affix {
                    prefix: "fact.".to_string(),
                    suffix: None,
                },
                template: ColumnTemplateConfig {
                    table: Some("T_BASE".to_string()),
                    column: "PROVIDER".to_string(),
                    sql_type: SqlType::Varchar,
                    arg_type: AdlType::String,
                    always_known: false,
                    multi_row: false,
                    filters: Vec::new(),
                    caster: None,
                },
            })
            .build()
            .unwrap_err();
        assert!(matches!(err, CatalogError::CrossTablePolicy { .. }));
    }

    #[test]
    fn local_name_derivation() {
        assert_eq!(derive_local_name("fact.hasCat.flg"), "hasCat");
        assert_eq!(derive_local_name("pos.country"), "country");
        assert_eq!(derive_local_name("provider"), "provider");
        assert_eq!(derive_local_name("q.a.b.value"), "a.b");
    }

    #[test]
    fn sorted_accessors_are_deterministic() {
        let catalog = base_builder().build().unwrap();
        assert_eq!(catalog.table_names_sorted(), vec!["T_BASE", "T_FACTS"]);
        let all_ids: Vec<&str> = catalog
            .tables_with_all_ids()
            .iter()
            .map(|t| t.name.as_str())
            .collect();
        assert_eq!(all_ids, vec!["T_BASE"]);
        assert_eq!(catalog.primary_table().unwrap().name, "T_BASE");
    }
}
