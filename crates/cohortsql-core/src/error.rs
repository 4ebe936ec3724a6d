//! Error types for catalog construction and expression conversion.
//!
//! Two complementary error families exist:
//!
//! - [`CatalogError`]: configuration-time failures raised while building a
//!   [`crate::catalog::MappingCatalog`]. No partial catalog is ever produced.
//!
//! - [`ConversionError`]: per-conversion failures carrying a machine-readable
//!   [`ErrorCode`] plus, where available, the offending expression rendered
//!   in its canonical pretty form. No partial SQL is ever returned.

use std::fmt;
use thiserror::Error;

/// Machine-readable codes surfaced to callers for conversion failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// Expression collapsed to a universal match after analysis.
    AlwaysTrue,
    /// Expression collapsed to the empty set.
    AlwaysFalse,
    /// Argument-to-argument comparison rejected or unsupported.
    ReferenceMatchNotSupported,
    /// CONTAINS rejected or unsupported for the target column.
    ContainsNotSupported,
    /// `<` / `>` rejected by directive.
    LessThanGreaterThanNotSupported,
    /// No viable mapping, base table, or type coalescence.
    MappingFailed,
}

impl ErrorCode {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::AlwaysTrue => "ERR_1001_ALWAYS_TRUE",
            Self::AlwaysFalse => "ERR_1002_ALWAYS_FALSE",
            Self::ReferenceMatchNotSupported => "ERR_2101_REFERENCE_MATCH_NOT_SUPPORTED",
            Self::ContainsNotSupported => "ERR_2200_CONTAINS_NOT_SUPPORTED",
            Self::LessThanGreaterThanNotSupported => "ERR_2201_LTGT_NOT_SUPPORTED",
            Self::MappingFailed => "ERR_3000_MAPPING_FAILED",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fatal error of a single conversion run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionError {
    /// Machine-readable failure code.
    pub code: ErrorCode,
    /// Human-readable message.
    pub message: String,
    /// The offending expression in canonical pretty form, when known.
    pub expression: Option<String>,
}

impl ConversionError {
    /// Creates an error without expression context.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            expression: None,
        }
    }

    /// Creates an error attributed to a concrete (sub-)expression.
    pub fn on_expression(
        code: ErrorCode,
        message: impl Into<String>,
        expression: &impl fmt::Display,
    ) -> Self {
        Self {
            code,
            message: message.into(),
            expression: Some(expression.to_string()),
        }
    }
}

impl fmt::Display for ConversionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)?;
        if let Some(expr) = &self.expression {
            write!(f, " [expression: {expr}]")?;
        }
        Ok(())
    }
}

impl std::error::Error for ConversionError {}

/// Configuration-time failure raised while building a mapping catalog.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    #[error("table '{0}' is configured more than once")]
    DuplicateTable(String),

    #[error("argument '{0}' is assigned more than once")]
    DuplicateArgument(String),

    #[error("assignment for argument '{arg}' references unknown table '{table}'")]
    UnknownTable { arg: String, table: String },

    #[error("more than one primary table configured: '{0}' and '{1}'")]
    DuplicatePrimaryTable(String, String),

    #[error(
        "filter column '{filter}' on table '{table}' collides with the {role} column '{column}'"
    )]
    FilterColumnCollision {
        table: String,
        filter: String,
        role: &'static str,
        column: String,
    },

    #[error("table '{table}' has an id-unique nature but column '{column}' is multi-row")]
    UniqueMultiRowContradiction { table: String, column: String },

    #[error(
        "column '{column}' is declared always-known but table '{table}' does not contain all ids"
    )]
    AlwaysKnownRequiresAllIds { table: String, column: String },

    #[error(
        "auto-mapping policy for table '{table}' references column '{column}' of table '{other}'"
    )]
    CrossTablePolicy {
        table: String,
        column: String,
        other: String,
    },

    #[error("invalid identifier '{0}'")]
    InvalidIdentifier(String),

    #[error("invalid extractor pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },
}
