//! Compiled auto-mapping policies.
//!
//! A policy turns an unmapped argument into a column assignment when its
//! extractor yields a non-empty local name. Policies are probed in
//! configuration order; explicit assignments always win.

use crate::catalog::config::{AutoMappingConfig, ColumnTemplateConfig, LocalNameExtractor};
use crate::error::CatalogError;
use regex::Regex;

#[derive(Debug)]
pub(crate) enum CompiledExtractor {
    Affix {
        prefix: String,
        suffix: Option<String>,
    },
    Pattern(Regex),
}

impl CompiledExtractor {
    pub(crate) fn compile(extractor: &LocalNameExtractor) -> Result<Self, CatalogError> {
        match extractor {
            LocalNameExtractor::Affix { prefix, suffix } => Ok(Self::Affix {
                prefix: prefix.clone(),
                suffix: suffix.clone(),
            }),
            LocalNameExtractor::Pattern { regex } => {
                let compiled = Regex::new(regex).map_err(|err| CatalogError::InvalidPattern {
                    pattern: regex.clone(),
                    message: err.to_string(),
                })?;
                Ok(Self::Pattern(compiled))
            }
        }
    }

    /// Extracts the local name, or `None` when the policy does not apply.
    pub(crate) fn extract(&self, arg: &str) -> Option<String> {
        match self {
            Self::Affix { prefix, suffix } => {
                let rest = arg.strip_prefix(prefix.as_str())?;
                let local = match suffix {
                    Some(suffix) => rest.strip_suffix(suffix.as_str())?,
                    None => rest,
                };
                if local.is_empty() {
                    None
                } else {
                    Some(local.to_string())
                }
            }
            Self::Pattern(regex) => {
                let captures = regex.captures(arg)?;
                let local = captures.get(1)?.as_str();
                if local.is_empty() {
                    None
                } else {
                    Some(local.to_string())
                }
            }
        }
    }
}

/// A compiled policy bound to its table.
#[derive(Debug)]
pub(crate) struct AutoMappingPolicy {
    pub(crate) table: String,
    pub(crate) extractor: CompiledExtractor,
    pub(crate) template: ColumnTemplateConfig,
}

impl AutoMappingPolicy {
    pub(crate) fn compile(config: &AutoMappingConfig) -> Result<Self, CatalogError> {
        if let Some(template_table) = &config.template.table {
            if template_table != &config.table {
                return Err(CatalogError::CrossTablePolicy {
                    table: config.table.clone(),
                    column: config.template.column.clone(),
                    other: template_table.clone(),
                });
            }
        }
        Ok(Self {
            table: config.table.clone(),
            extractor: CompiledExtractor::compile(&config.extractor)?,
            template: config.template.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("fact.", Some(".flg"), "fact.hasCat.flg", Some("hasCat"))]
    #[case("fact.", Some(".flg"), "fact.hasCat.str", None)]
    #[case("fact.", Some(".flg"), "other.hasCat.flg", None)]
    #[case("fact.", Some(".flg"), "fact..flg", None)]
    #[case("pos.", None, "pos.country", Some("country"))]
    fn affix_extraction(
        #[case] prefix: &str,
        #[case] suffix: Option<&str>,
        #[case] arg: &str,
        #[case] expected: Option<&str>,
    ) {
        let extractor = CompiledExtractor::Affix {
            prefix: prefix.to_string(),
            suffix: suffix.map(str::to_string),
        };
        assert_eq!(extractor.extract(arg).as_deref(), expected);
    }

    #[test]
    fn pattern_extraction_uses_first_group() {
        let extractor = CompiledExtractor::compile(&LocalNameExtractor::Pattern {
            regex: r"^q\.([a-zA-Z0-9]+)\.value$".to_string(),
        })
        .unwrap();
        assert_eq!(extractor.extract("q.monthlyIncome.value").as_deref(), Some("monthlyIncome"));
        assert_eq!(extractor.extract("q.monthlyIncome"), None);
    }

    #[test]
    fn invalid_pattern_is_a_catalog_error() {
        let err = CompiledExtractor::compile(&LocalNameExtractor::Pattern {
            regex: "(".to_string(),
        })
        .unwrap_err();
        assert!(matches!(err, CatalogError::InvalidPattern { .. }));
    }
}
