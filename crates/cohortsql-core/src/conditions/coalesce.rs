//! Type coalescence: mapping the abstract attribute types onto each
//! column's SQL type, including date alignment to finer resolutions.

use crate::error::{ConversionError, ErrorCode};
use crate::expr::MatchOperator;
use crate::types::{AdlType, SqlType};
use chrono::NaiveDate;

/// The accepted attribute-type/SQL-type pairs.
///
/// STRING coalesces with anything as long as the value parses for the
/// target; the remaining rows follow the default compatibility table.
pub fn is_compatible(adl: AdlType, sql: SqlType) -> bool {
    match adl {
        AdlType::String => true,
        AdlType::Integer => matches!(
            sql,
            SqlType::Int | SqlType::Bigint | SqlType::Decimal | SqlType::Varchar | SqlType::Char
        ),
        AdlType::Decimal => matches!(
            sql,
            SqlType::Decimal | SqlType::Int | SqlType::Bigint | SqlType::Varchar | SqlType::Char
        ),
        AdlType::Bool => matches!(
            sql,
            SqlType::Bool | SqlType::Bit | SqlType::Int | SqlType::Varchar | SqlType::Char
        ),
        AdlType::Date => matches!(
            sql,
            SqlType::Date | SqlType::Timestamp | SqlType::Int | SqlType::Bigint
        ),
    }
}

fn value_error(arg: &str, value: &str, expected: &str) -> ConversionError {
    ConversionError::new(
        ErrorCode::MappingFailed,
        format!("value '{value}' of argument '{arg}' is not a valid {expected}"),
    )
}

/// Normalizes a literal for binding against the effective SQL type,
/// validating that the string form actually parses where required.
pub(crate) fn normalize_value(
    arg: &str,
    adl: AdlType,
    sql: SqlType,
    raw: &str,
) -> Result<String, ConversionError> {
    match (adl, sql) {
        (AdlType::Integer, _) | (AdlType::String, SqlType::Int | SqlType::Bigint) => {
            raw.trim()
                .parse::<i64>()
                .map(|v| v.to_string())
                .map_err(|_| value_error(arg, raw, "integer"))
        }
        (AdlType::Decimal, _) | (AdlType::String, SqlType::Decimal) => {
            raw.trim()
                .parse::<f64>()
                .map(|_| raw.trim().to_string())
                .map_err(|_| value_error(arg, raw, "decimal"))
        }
        (AdlType::Bool, _) | (AdlType::String, SqlType::Bool | SqlType::Bit) => {
            match raw.trim().to_ascii_lowercase().as_str() {
                "1" | "true" => Ok("1".to_string()),
                "0" | "false" => Ok("0".to_string()),
                _ => Err(value_error(arg, raw, "boolean")),
            }
        }
        (AdlType::Date, _) | (AdlType::String, SqlType::Date | SqlType::Timestamp) => {
            parse_date(arg, raw)?;
            Ok(raw.trim().to_string())
        }
        (AdlType::String, _) => Ok(raw.to_string()),
    }
}

pub(crate) fn parse_date(arg: &str, raw: &str) -> Result<NaiveDate, ConversionError> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|_| value_error(arg, raw, "date (YYYY-MM-DD)"))
}

/// Result of aligning a DATE comparison to a finer-resolution column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum AlignedDate {
    /// `col >= lower AND col < upper` (whole-day equality).
    Range { lower: String, upper: String },
    /// `col >= lower` (strictly after the given day).
    AfterStart { lower: String },
    /// `col < upper` (strictly before the given day).
    BeforeStart { upper: String },
}

/// Rewrites a DATE comparison against a TIMESTAMP/INTEGER/BIGINT column to
/// day-boundary semantics.
pub(crate) fn align_date(
    arg: &str,
    op: MatchOperator,
    raw: &str,
    sql: SqlType,
) -> Result<AlignedDate, ConversionError> {
    let day = parse_date(arg, raw)?;
    let next = day.succ_opt().ok_or_else(|| {
        ConversionError::new(
            ErrorCode::MappingFailed,
            format!("date '{raw}' of argument '{arg}' is out of range"),
        )
    })?;
    let aligned = match op {
        MatchOperator::Eq => AlignedDate::Range {
            lower: day_boundary(day, sql),
            upper: day_boundary(next, sql),
        },
        MatchOperator::Gt => AlignedDate::AfterStart {
            lower: day_boundary(next, sql),
        },
        MatchOperator::Lt => AlignedDate::BeforeStart {
            upper: day_boundary(day, sql),
        },
        MatchOperator::Contains | MatchOperator::IsUnknown => {
            return Err(ConversionError::new(
                ErrorCode::MappingFailed,
                format!("operator not applicable to DATE argument '{arg}'"),
            ))
        }
    };
    Ok(aligned)
}

/// Start-of-day value formatted for the target column type: a timestamp
/// literal for TIMESTAMP columns, UTC epoch seconds for integer columns.
fn day_boundary(day: NaiveDate, sql: SqlType) -> String {
    let start = day.and_hms_opt(0, 0, 0).expect("midnight is always valid");
    match sql {
        SqlType::Int | SqlType::Bigint => start.and_utc().timestamp().to_string(),
        _ => start.format("%Y-%m-%d %H:%M:%S").to_string(),
    }
}
