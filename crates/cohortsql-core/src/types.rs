//! Shared value and type enums used across the conversion pipeline.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Abstract attribute type of an audience argument.
///
/// Every argument carries one of these types; the catalog maps it onto the
/// SQL type of the physical column, subject to the coalescence rules in
/// [`crate::conditions`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum AdlType {
    String,
    Integer,
    Decimal,
    Bool,
    Date,
}

impl AdlType {
    /// Stable display name used in diagnostics.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "STRING",
            Self::Integer => "INTEGER",
            Self::Decimal => "DECIMAL",
            Self::Bool => "BOOL",
            Self::Date => "DATE",
        }
    }
}

/// SQL type of a physical column or bound parameter.
///
/// The set is deliberately small: it is the vocabulary the binding layer
/// needs to pick a driver-side setter, not a full vendor type system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "lowercase")]
pub enum SqlType {
    #[default]
    Varchar,
    Char,
    Int,
    Bigint,
    Decimal,
    Bool,
    Bit,
    Date,
    Timestamp,
}

impl SqlType {
    /// SQL keyword for diagnostics and cast rendering.
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Varchar => "VARCHAR",
            Self::Char => "CHAR",
            Self::Int => "INTEGER",
            Self::Bigint => "BIGINT",
            Self::Decimal => "DECIMAL",
            Self::Bool => "BOOLEAN",
            Self::Bit => "BIT",
            Self::Date => "DATE",
            Self::Timestamp => "TIMESTAMP",
        }
    }

    /// True for types storing date information at a finer resolution than a
    /// calendar day. Comparisons of a DATE argument against such a column go
    /// through date alignment unless the caller disabled it.
    pub fn is_finer_than_date(&self) -> bool {
        matches!(self, Self::Timestamp | Self::Int | Self::Bigint)
    }
}

/// The kind of statement the converter emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub enum QueryKind {
    /// `SELECT DISTINCT <id> ... ORDER BY <id>` (default).
    #[default]
    SelectDistinctIdOrdered,
    /// `SELECT COUNT(DISTINCT <id>) ...` without ordering.
    SelectDistinctCount,
}

/// Join shape decided by the planner for a joined table or alias.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum JoinType {
    Inner,
    LeftOuter,
}

impl JoinType {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Inner => "INNER JOIN",
            Self::LeftOuter => "LEFT OUTER JOIN",
        }
    }
}
