//! The configurable CONTAINS policy.
//!
//! A policy consists of a search-snippet preprocessor (wildcard stripping)
//! and a fragment emitter for the vendor's concatenation style.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Vendor style for assembling the LIKE pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub enum ContainsStyle {
    /// ANSI concatenation: `col LIKE '%' || ${p} || '%'`.
    #[default]
    ConcatOperator,
    /// Function style: `col LIKE CONCAT('%', ${p}, '%')`.
    ConcatFunction,
}

/// Policy applied to every CONTAINS match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct ContainsPolicy {
    #[serde(default)]
    pub style: ContainsStyle,
    /// Keep `%` and `_` in the snippet instead of stripping them.
    #[serde(default)]
    pub keep_wildcards: bool,
}

impl ContainsPolicy {
    /// Preprocesses the raw search snippet.
    pub fn prepare_snippet(&self, raw: &str) -> String {
        if self.keep_wildcards {
            raw.to_string()
        } else {
            raw.chars().filter(|c| *c != '%' && *c != '_').collect()
        }
    }

    /// Renders the LIKE fragment for a column expression and a bound
    /// parameter placeholder.
    pub fn render(&self, column_expr: &str, placeholder: &str, negated: bool) -> String {
        let like = if negated { "NOT LIKE" } else { "LIKE" };
        match self.style {
            ContainsStyle::ConcatOperator => {
                format!("{column_expr} {like} '%' || {placeholder} || '%'")
            }
            ContainsStyle::ConcatFunction => {
                format!("{column_expr} {like} CONCAT('%', {placeholder}, '%')")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcards_are_stripped_by_default() {
        let policy = ContainsPolicy::default();
        assert_eq!(policy.prepare_snippet("a%b_c"), "abc");
    }

    #[test]
    fn wildcards_can_be_kept() {
        let policy = ContainsPolicy {
            keep_wildcards: true,
            ..ContainsPolicy::default()
        };
        assert_eq!(policy.prepare_snippet("a%b"), "a%b");
    }

    #[test]
    fn ansi_style_fragment() {
        let policy = ContainsPolicy::default();
        assert_eq!(
            policy.render("T.NAME", "${p1}", false),
            "T.NAME LIKE '%' || ${p1} || '%'"
        );
        assert_eq!(
            policy.render("T.NAME", "${p1}", true),
            "T.NAME NOT LIKE '%' || ${p1} || '%'"
        );
    }

    #[test]
    fn concat_function_fragment() {
        let policy = ContainsPolicy {
            style: ContainsStyle::ConcatFunction,
            keep_wildcards: false,
        };
        assert_eq!(
            policy.render("T.NAME", "${p2}", false),
            "T.NAME LIKE CONCAT('%', ${p2}, '%')"
        );
    }
}
