//! Serializable catalog configuration and the programmatic builder.
//!
//! Embedders either deserialize a [`CatalogConfig`] from JSON or assemble one
//! through [`CatalogBuilder`]; both paths funnel through the same validation
//! in [`super::MappingCatalog::from_config`].

use crate::catalog::MappingCatalog;
use crate::error::CatalogError;
use crate::types::{AdlType, SqlType};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Physical nature of a table: the valid combinations of containing all ids,
/// being the primary table, being sparse, and having a unique id column.
///
/// Primary implies containing all ids; sparse excludes id uniqueness, so the
/// enum spans nine variants instead of the full cross product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub enum TableNature {
    /// No guarantees: ids may be missing or repeated.
    #[default]
    Plain,
    /// At most one row per id; ids may be missing.
    IdUnique,
    /// Key-value style: every column's values are spread across rows.
    Sparse,
    /// Every id of the audience has at least one row.
    AllIds,
    /// Every id has exactly one row.
    AllIdsUnique,
    /// Contains all ids, values spread across rows.
    AllIdsSparse,
    /// Preferred starting point; contains all ids.
    Primary,
    /// Primary with exactly one row per id.
    PrimaryUnique,
    /// Primary, values spread across rows.
    PrimarySparse,
}

impl TableNature {
    pub fn contains_all_ids(self) -> bool {
        !matches!(self, Self::Plain | Self::IdUnique | Self::Sparse)
    }

    pub fn is_primary(self) -> bool {
        matches!(self, Self::Primary | Self::PrimaryUnique | Self::PrimarySparse)
    }

    pub fn is_sparse(self) -> bool {
        matches!(self, Self::Sparse | Self::AllIdsSparse | Self::PrimarySparse)
    }

    pub fn id_unique(self) -> bool {
        matches!(self, Self::IdUnique | Self::AllIdsUnique | Self::PrimaryUnique)
    }
}

/// A filter column attached to a data column or a table.
///
/// The value template may be a literal or contain `${...}` variables
/// (`argName`, `argName.local`, or caller-defined globals) resolved at
/// condition-build time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FilterConfig {
    pub column: String,
    #[serde(default)]
    pub sql_type: SqlType,
    pub value: String,
}

/// Vendor cast wrapped around a column before comparison, e.g.
/// `CAST(${column} AS INT)` for numeric matching on a flat text column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NativeTypeCaster {
    /// Template containing the `${column}` placeholder.
    pub template: String,
    /// Effective SQL type of the cast result; parameters bind with it.
    pub target: SqlType,
}

impl NativeTypeCaster {
    pub fn new(template: impl Into<String>, target: SqlType) -> Self {
        Self {
            template: template.into(),
            target,
        }
    }
}

/// One table of the physical landscape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TableConfig {
    pub name: String,
    pub id_column: String,
    #[serde(default)]
    pub nature: TableNature,
    /// Filters applied to every query touching this table.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub filters: Vec<FilterConfig>,
}

/// Explicit assignment of one argument to one physical column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentConfig {
    pub arg: String,
    #[serde(rename = "type")]
    pub adl_type: AdlType,
    pub table: String,
    pub column: String,
    #[serde(default)]
    pub sql_type: SqlType,
    #[serde(default)]
    pub always_known: bool,
    #[serde(default)]
    pub multi_row: bool,
    #[serde(default)]
    pub is_collection: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub filters: Vec<FilterConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caster: Option<NativeTypeCaster>,
}

impl AssignmentConfig {
    pub fn new(
        arg: impl Into<String>,
        adl_type: AdlType,
        table: impl Into<String>,
        column: impl Into<String>,
        sql_type: SqlType,
    ) -> Self {
        Self {
            arg: arg.into(),
            adl_type,
            table: table.into(),
            column: column.into(),
            sql_type,
            always_known: false,
            multi_row: false,
            is_collection: false,
            filters: Vec::new(),
            caster: None,
        }
    }

    pub fn always_known(mut self) -> Self {
        self.always_known = true;
        self
    }

    pub fn multi_row(mut self) -> Self {
        self.multi_row = true;
        self
    }

    pub fn collection(mut self) -> Self {
        self.is_collection = true;
        self
    }

    pub fn filter(
        mut self,
        column: impl Into<String>,
        sql_type: SqlType,
        value: impl Into<String>,
    ) -> Self {
        self.filters.push(FilterConfig {
            column: column.into(),
            sql_type,
            value: value.into(),
        });
        self
    }

    pub fn caster(mut self, template: impl Into<String>, target: SqlType) -> Self {
        self.caster = Some(NativeTypeCaster::new(template, target));
        self
    }
}

/// Extraction of a policy-local name from an argument name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum LocalNameExtractor {
    /// Strips a fixed prefix and optional suffix; the non-empty remainder is
    /// the local name (`fact.hasCat.flg` with prefix `fact.` and suffix
    /// `.flg` yields `hasCat`).
    Affix {
        prefix: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        suffix: Option<String>,
    },
    /// First capture group of a regular expression, when non-empty.
    Pattern { regex: String },
}

/// Column template instantiated for every argument an auto-mapping policy
/// accepts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ColumnTemplateConfig {
    /// Owning table; must be the policy's table when given.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
    pub column: String,
    #[serde(default)]
    pub sql_type: SqlType,
    pub arg_type: AdlType,
    #[serde(default)]
    pub always_known: bool,
    #[serde(default)]
    pub multi_row: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub filters: Vec<FilterConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caster: Option<NativeTypeCaster>,
}

/// One ordered auto-mapping policy of a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AutoMappingConfig {
    pub table: String,
    pub extractor: LocalNameExtractor,
    pub template: ColumnTemplateConfig,
}

/// The complete serializable catalog configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct CatalogConfig {
    pub tables: Vec<TableConfig>,
    pub assignments: Vec<AssignmentConfig>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub auto_mapping: Vec<AutoMappingConfig>,
}

impl CatalogConfig {
    /// Deserializes a configuration from JSON.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Fluent builder assembling a [`CatalogConfig`] and validating it into a
/// [`MappingCatalog`].
#[derive(Debug, Default)]
pub struct CatalogBuilder {
    config: CatalogConfig,
}

impl CatalogBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn table(
        mut self,
        name: impl Into<String>,
        id_column: impl Into<String>,
        nature: TableNature,
    ) -> Self {
        self.config.tables.push(TableConfig {
            name: name.into(),
            id_column: id_column.into(),
            nature,
            filters: Vec::new(),
        });
        self
    }

    /// Appends a table-level filter to the most recently added table.
    pub fn table_filter(
        mut self,
        column: impl Into<String>,
        sql_type: SqlType,
        value: impl Into<String>,
    ) -> Self {
        if let Some(table) = self.config.tables.last_mut() {
            table.filters.push(FilterConfig {
                column: column.into(),
                sql_type,
                value: value.into(),
            });
        }
        self
    }

    pub fn assign(mut self, assignment: AssignmentConfig) -> Self {
        self.config.assignments.push(assignment);
        self
    }

    pub fn auto_map(mut self, policy: AutoMappingConfig) -> Self {
        self.config.auto_mapping.push(policy);
        self
    }

    pub fn into_config(self) -> CatalogConfig {
        self.config
    }

    pub fn build(self) -> Result<MappingCatalog, CatalogError> {
        MappingCatalog::from_config(&self.config)
    }
}
