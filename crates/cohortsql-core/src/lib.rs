//! Core engine converting boolean audience expressions over named
//! attributes into parameterized SQL against a configured table landscape.
//!
//! The pipeline runs catalog lookup, expression analysis, condition
//! building, alias management, query planning and SQL emission:
//!
//! ```text
//! catalog + expression
//!     -> analyzer (stats, hints)
//!     -> condition builder + alias registry (WHERE skeleton)
//!     -> planner (start selection, joins)
//!     -> emitter (WITH / SELECT / JOIN / WHERE / ORDER BY)
//!     -> (sql template, parameters)
//! ```
//!
//! The emitted template references bound values as `${pN}`; the execution
//! layer binds them by name using the SQL type carried on each
//! [`Parameter`]. Query execution, schema migration and cost-based
//! optimization are out of scope.
//!
//! # Example
//!
//! ```
//! use cohortsql_core::{
//!     AdlType, AssignmentConfig, CatalogBuilder, ConversionRequest, Expression, SqlConverter,
//!     SqlType, TableNature,
//! };
//! use std::sync::Arc;
//!
//! let catalog = CatalogBuilder::new()
//!     .table("T_BASE", "ID", TableNature::PrimaryUnique)
//!     .assign(AssignmentConfig::new(
//!         "provider",
//!         AdlType::String,
//!         "T_BASE",
//!         "PROVIDER",
//!         SqlType::Varchar,
//!     ))
//!     .build()
//!     .unwrap();
//!
//! let mut converter = SqlConverter::new(Arc::new(catalog));
//! let request = ConversionRequest::new(Expression::eq_value("provider", "LOGMOTH"));
//! let result = converter.convert(&request).unwrap();
//!
//! assert_eq!(
//!     result.sql,
//!     "SELECT DISTINCT T_BASE.ID\nFROM T_BASE\nWHERE T_BASE.PROVIDER = ${p1}\nORDER BY ID"
//! );
//! assert_eq!(result.parameters[0].value, "LOGMOTH");
//! ```

mod aliases;
pub mod analyzer;
pub mod augment;
pub mod catalog;
pub mod conditions;
pub mod converter;
mod emitter;
pub mod error;
pub mod expr;
pub mod flags;
pub mod params;
mod planner;
mod rewrite;
mod skeleton;
pub mod types;

pub use analyzer::{analyze, Stats};
pub use augment::{AugmentationContext, AugmentationListener, NoAugmentation, SqlWriter};
pub use catalog::{
    AssignmentConfig, AutoMappingConfig, CatalogBuilder, CatalogConfig, ColumnTemplateConfig,
    FilterConfig, LocalNameExtractor, MappingCatalog, NativeTypeCaster, TableConfig, TableNature,
};
pub use conditions::{ContainsPolicy, ContainsStyle};
pub use converter::{
    ConversionRequest, ConversionResult, SqlConverter, DEFAULT_BASE_COMBINATION_CAP,
};
pub use error::{CatalogError, ConversionError, ErrorCode};
pub use expr::{Expression, MatchOperator, Operand};
pub use flags::ConversionFlags;
pub use params::Parameter;
pub use types::{AdlType, JoinType, QueryKind, SqlType};
