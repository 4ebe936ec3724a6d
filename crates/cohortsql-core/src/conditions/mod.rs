//! Match-condition construction with bound parameters.
//!
//! Every expression leaf becomes a [`MatchCondition`]: a main column
//! predicate plus the filter predicates disambiguating the column, all
//! literals bound through the parameter registry. Conditions are memoized by
//! the canonical rendering of their source leaf so identical sub-expressions
//! reuse parameters.

pub mod coalesce;
pub mod contains;

pub use contains::{ContainsPolicy, ContainsStyle};

use crate::catalog::{derive_local_name, ArgAssignment, MappingCatalog, NativeTypeCaster};
use crate::error::{ConversionError, ErrorCode};
use crate::expr::{Expression, MatchOperator, Operand};
use crate::flags::ConversionFlags;
use crate::params::ParameterRegistry;
use crate::types::{AdlType, SqlType};
use coalesce::{align_date, is_compatible, normalize_value, AlignedDate};
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;

/// SQL comparison operator of a column condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlComparison {
    Eq,
    Neq,
    Lt,
    Le,
    Gt,
    Ge,
    IsNull,
    IsNotNull,
}

impl SqlComparison {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Neq => "<>",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::IsNull => "IS NULL",
            Self::IsNotNull => "IS NOT NULL",
        }
    }

    pub fn negate(&self) -> Self {
        match self {
            Self::Eq => Self::Neq,
            Self::Neq => Self::Eq,
            Self::Lt => Self::Ge,
            Self::Ge => Self::Lt,
            Self::Gt => Self::Le,
            Self::Le => Self::Gt,
            Self::IsNull => Self::IsNotNull,
            Self::IsNotNull => Self::IsNull,
        }
    }
}

/// Category of a column condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionKind {
    Single,
    In,
    FilterLeft,
    FilterRight,
    AfterToday,
    DateRange,
    Reference,
}

/// Structural shape of a match condition, deciding how an alias body is
/// assembled for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchShape {
    Simple,
    /// Column-vs-column on one table, one row at a time.
    ReferenceSingleTable,
    /// Column-vs-column on one multi-row table; needs a self-join.
    ReferenceSelfJoin,
    /// Column-vs-column across two tables.
    ReferenceDualTable,
}

/// A reference to a physical column, optionally wrapped by a native caster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnRef {
    pub table: String,
    pub column: String,
    pub caster: Option<NativeTypeCaster>,
}

impl ColumnRef {
    fn new(table: &str, column: &str, caster: Option<NativeTypeCaster>) -> Self {
        Self {
            table: table.to_string(),
            column: column.to_string(),
            caster,
        }
    }

    /// Renders the comparison expression, qualified by the owning table (or
    /// an explicit qualifier such as a self-join alias).
    pub fn render(&self, qualifier: Option<&str>) -> String {
        let qualified = format!("{}.{}", qualifier.unwrap_or(&self.table), self.column);
        match &self.caster {
            Some(caster) => caster.template.replace("${column}", &qualified),
            None => qualified,
        }
    }
}

/// How a rendered fragment combines internally; parents use this to decide
/// parenthesization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Junction {
    Atom,
    And,
    Or,
}

/// A rendered SQL fragment.
#[derive(Debug, Clone)]
pub struct SqlFragment {
    pub sql: String,
    pub junction: Junction,
}

impl SqlFragment {
    pub fn atom(sql: String) -> Self {
        Self {
            sql,
            junction: Junction::Atom,
        }
    }

    /// The fragment wrapped in parentheses unless atomic.
    pub fn grouped(&self) -> String {
        match self.junction {
            Junction::Atom => self.sql.clone(),
            _ => format!("({})", self.sql),
        }
    }

    /// Joins fragments with a connective, parenthesizing members of the
    /// opposite connective.
    pub fn join(parts: &[SqlFragment], junction: Junction) -> SqlFragment {
        if parts.len() == 1 {
            return parts[0].clone();
        }
        let word = match junction {
            Junction::And => " AND ",
            Junction::Or => " OR ",
            Junction::Atom => " AND ",
        };
        let sql = parts
            .iter()
            .map(|p| {
                if p.junction == Junction::Atom || p.junction == junction {
                    p.sql.clone()
                } else {
                    format!("({})", p.sql)
                }
            })
            .collect::<Vec<_>>()
            .join(word);
        SqlFragment { sql, junction }
    }
}

/// One column predicate with bound parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    Compare {
        col: ColumnRef,
        op: SqlComparison,
        placeholder: Option<String>,
    },
    In {
        col: ColumnRef,
        placeholders: Vec<String>,
    },
    /// `col >= lower AND col < upper`
    Range {
        col: ColumnRef,
        lower: String,
        upper: String,
    },
    Like {
        col: ColumnRef,
        placeholder: String,
        policy: ContainsPolicy,
    },
    Reference {
        left: ColumnRef,
        op: SqlComparison,
        right: ColumnRef,
    },
}

impl Predicate {
    /// The driving (left) column of this predicate.
    pub fn column(&self) -> &ColumnRef {
        match self {
            Self::Compare { col, .. }
            | Self::In { col, .. }
            | Self::Range { col, .. }
            | Self::Like { col, .. } => col,
            Self::Reference { left, .. } => left,
        }
    }

    pub fn render(&self, negated: bool) -> SqlFragment {
        self.render_requalified(None, None, negated)
    }

    /// Renders with explicit qualifiers, used inside self-join alias bodies.
    pub fn render_requalified(
        &self,
        left: Option<&str>,
        right: Option<&str>,
        negated: bool,
    ) -> SqlFragment {
        match self {
            Self::Compare {
                col,
                op,
                placeholder,
            } => {
                let op = if negated { op.negate() } else { *op };
                let sql = match placeholder {
                    Some(ph) => format!("{} {} {ph}", col.render(left), op.as_sql()),
                    None => format!("{} {}", col.render(left), op.as_sql()),
                };
                SqlFragment::atom(sql)
            }
            Self::In { col, placeholders } => {
                let word = if negated { "NOT IN" } else { "IN" };
                SqlFragment::atom(format!(
                    "{} {word} ({})",
                    col.render(left),
                    placeholders.join(", ")
                ))
            }
            Self::Range { col, lower, upper } => {
                let rendered = col.render(left);
                if negated {
                    SqlFragment {
                        sql: format!("{rendered} < {lower} OR {rendered} >= {upper}"),
                        junction: Junction::Or,
                    }
                } else {
                    SqlFragment {
                        sql: format!("{rendered} >= {lower} AND {rendered} < {upper}"),
                        junction: Junction::And,
                    }
                }
            }
            Self::Like {
                col,
                placeholder,
                policy,
            } => SqlFragment::atom(policy.render(&col.render(left), placeholder, negated)),
            Self::Reference {
                left: lcol,
                op,
                right: rcol,
            } => {
                let op = if negated { op.negate() } else { *op };
                SqlFragment::atom(format!(
                    "{} {} {}",
                    lcol.render(left),
                    op.as_sql(),
                    rcol.render(right)
                ))
            }
        }
    }
}

/// The right side of a reference match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RightSide {
    pub arg: String,
    pub table: String,
    pub id_column: String,
    pub filters: Vec<Predicate>,
}

/// The complete condition of one expression leaf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchCondition {
    pub arg: String,
    /// Canonical rendering of the source leaf; memoization key.
    pub key: String,
    /// Driving table.
    pub table: String,
    pub kind: ConditionKind,
    pub predicate: Predicate,
    /// Filter predicates of the driving side, including table filters.
    pub filters: Vec<Predicate>,
    pub right: Option<RightSide>,
    pub shape: MatchShape,
}

impl MatchCondition {
    /// Renders the condition for direct use in WHERE or ON: filters stay
    /// positive, only the main predicate is negated.
    pub fn render_inline(&self, negated: bool) -> SqlFragment {
        let mut parts: Vec<SqlFragment> = Vec::new();
        for filter in &self.filters {
            parts.push(filter.render(false));
        }
        if let Some(right) = &self.right {
            for filter in &right.filters {
                parts.push(filter.render(false));
            }
        }
        parts.push(self.predicate.render(negated));
        SqlFragment::join(&parts, Junction::And)
    }

    /// Number of bound placeholders; used as the complexity measure when
    /// picking the most row-reducing alias.
    pub fn complexity(&self) -> usize {
        let main = match &self.predicate {
            Predicate::Compare { placeholder, .. } => usize::from(placeholder.is_some()),
            Predicate::In { placeholders, .. } => placeholders.len(),
            Predicate::Range { .. } => 2,
            Predicate::Like { .. } => 1,
            Predicate::Reference { .. } => 0,
        };
        let right = self.right.as_ref().map(|r| r.filters.len()).unwrap_or(0);
        main + self.filters.len() + right
    }

    /// The IS-NOT-NULL companion of this condition: same driving column and
    /// filters, testing for the presence of any value.
    pub fn to_is_not_null(&self) -> MatchCondition {
        MatchCondition {
            arg: self.arg.clone(),
            key: format!("{} IS NOT NULL", self.arg),
            table: self.table.clone(),
            kind: ConditionKind::Single,
            predicate: Predicate::Compare {
                col: self.predicate.column().clone(),
                op: SqlComparison::IsNotNull,
                placeholder: None,
            },
            filters: self.filters.clone(),
            right: None,
            shape: MatchShape::Simple,
        }
    }
}

fn template_regex() -> &'static Regex {
    static TEMPLATE: OnceLock<Regex> = OnceLock::new();
    TEMPLATE.get_or_init(|| Regex::new(r"\$\{([^}]+)\}").expect("valid pattern"))
}

/// Substitutes `${name}` placeholders from the variable map. An unresolved
/// variable is a conversion error naming the placeholder.
pub(crate) fn resolve_template(
    template: &str,
    variables: &HashMap<String, String>,
) -> Result<String, ConversionError> {
    let regex = template_regex();
    let mut resolved = String::with_capacity(template.len());
    let mut last = 0usize;
    for captures in regex.captures_iter(template) {
        let whole = captures.get(0).expect("match group");
        let name = captures.get(1).expect("capture group").as_str();
        resolved.push_str(&template[last..whole.start()]);
        match variables.get(name) {
            Some(value) => resolved.push_str(value),
            None => {
                return Err(ConversionError::new(
                    ErrorCode::MappingFailed,
                    format!("unresolved variable '${{{name}}}' in filter value template"),
                ))
            }
        }
        last = whole.end();
    }
    resolved.push_str(&template[last..]);
    Ok(resolved)
}

fn comparison_for(op: MatchOperator) -> SqlComparison {
    match op {
        MatchOperator::Eq => SqlComparison::Eq,
        MatchOperator::Lt => SqlComparison::Lt,
        MatchOperator::Gt => SqlComparison::Gt,
        MatchOperator::Contains | MatchOperator::IsUnknown => SqlComparison::Eq,
    }
}

fn leaf_key(arg: &str, op: MatchOperator, operand: Option<&Operand>) -> String {
    Expression::Match {
        arg: arg.to_string(),
        op,
        operand: operand.cloned(),
    }
    .to_string()
}

/// Builds match conditions for expression leaves, memoized per run.
pub(crate) struct ConditionBuilder<'a> {
    catalog: &'a MappingCatalog,
    pub(crate) params: &'a mut ParameterRegistry,
    variables: &'a mut HashMap<String, String>,
    flags: ConversionFlags,
    contains_policy: ContainsPolicy,
    cache: HashMap<String, MatchCondition>,
}

impl<'a> ConditionBuilder<'a> {
    pub(crate) fn new(
        catalog: &'a MappingCatalog,
        params: &'a mut ParameterRegistry,
        variables: &'a mut HashMap<String, String>,
        flags: ConversionFlags,
        contains_policy: ContainsPolicy,
    ) -> Self {
        Self {
            catalog,
            params,
            variables,
            flags,
            contains_policy,
            cache: HashMap::new(),
        }
    }

    /// Builds the condition of a single (non-folded) leaf.
    pub(crate) fn build_leaf(
        &mut self,
        arg: &str,
        op: MatchOperator,
        operand: Option<&Operand>,
    ) -> Result<MatchCondition, ConversionError> {
        self.check_directives(arg, op, operand)?;
        let key = leaf_key(arg, op, operand);
        if let Some(cached) = self.cache.get(&key) {
            return Ok(cached.clone());
        }

        let assignment = self.catalog.lookup(arg)?;
        self.check_types(&assignment)?;
        let condition = match (op, operand) {
            (MatchOperator::IsUnknown, _) => self.build_is_unknown(&key, &assignment)?,
            (MatchOperator::Contains, Some(Operand::Value(snippet))) => {
                self.build_contains(&key, &assignment, snippet)?
            }
            (op, Some(Operand::Value(value))) => {
                self.build_value_compare(&key, &assignment, op, value)?
            }
            (op, Some(Operand::Reference(other))) => {
                self.build_reference(&key, &assignment, op, other)?
            }
            (_, None) => {
                return Err(ConversionError::new(
                    ErrorCode::MappingFailed,
                    format!("match on argument '{arg}' has no operand"),
                ))
            }
        };
        self.cache.insert(key, condition.clone());
        Ok(condition)
    }

    /// Builds a folded IN condition from same-argument equality values.
    /// Downgrades to a single comparison when only one distinct value
    /// remains.
    pub(crate) fn build_in(
        &mut self,
        arg: &str,
        values: &[&str],
    ) -> Result<MatchCondition, ConversionError> {
        let assignment = self.catalog.lookup(arg)?;
        self.check_types(&assignment)?;
        let sql_type = assignment.column.effective_sql_type();

        let mut distinct: Vec<String> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        for raw in values {
            let normalized = normalize_value(arg, assignment.arg.adl_type, sql_type, raw)?;
            if seen.insert(normalized.clone()) {
                distinct.push(normalized);
            }
        }
        if distinct.len() == 1 {
            let value = distinct.remove(0);
            let operand = Operand::Value(value);
            return self.build_leaf(arg, MatchOperator::Eq, Some(&operand));
        }

        let key = format!(
            "({})",
            distinct
                .iter()
                .map(|v| format!("{arg} = \"{v}\""))
                .collect::<Vec<_>>()
                .join(" OR ")
        );
        if let Some(cached) = self.cache.get(&key) {
            return Ok(cached.clone());
        }

        let filters = self.build_filters(&assignment)?;
        let placeholders: Vec<String> = distinct
            .into_iter()
            .map(|value| {
                self.params
                    .register(Some(arg), Some(assignment.arg.adl_type), value, sql_type)
            })
            .collect();
        let condition = MatchCondition {
            arg: arg.to_string(),
            key: key.clone(),
            table: assignment.column.table.clone(),
            kind: ConditionKind::In,
            predicate: Predicate::In {
                col: self.column_ref(&assignment),
                placeholders,
            },
            filters,
            right: None,
            shape: MatchShape::Simple,
        };
        self.cache.insert(key, condition.clone());
        Ok(condition)
    }

    fn check_directives(
        &self,
        arg: &str,
        op: MatchOperator,
        operand: Option<&Operand>,
    ) -> Result<(), ConversionError> {
        if matches!(op, MatchOperator::Contains)
            && self.flags.contains(ConversionFlags::DISABLE_CONTAINS)
        {
            return Err(ConversionError::new(
                ErrorCode::ContainsNotSupported,
                format!("CONTAINS is disabled for this conversion (argument '{arg}')"),
            ));
        }
        if matches!(op, MatchOperator::Lt | MatchOperator::Gt)
            && self
                .flags
                .contains(ConversionFlags::DISABLE_LESS_THAN_GREATER_THAN)
        {
            return Err(ConversionError::new(
                ErrorCode::LessThanGreaterThanNotSupported,
                format!("less-than/greater-than is disabled for this conversion (argument '{arg}')"),
            ));
        }
        if matches!(operand, Some(Operand::Reference(_)))
            && self
                .flags
                .contains(ConversionFlags::DISABLE_REFERENCE_MATCHING)
        {
            return Err(ConversionError::new(
                ErrorCode::ReferenceMatchNotSupported,
                format!("reference matching is disabled for this conversion (argument '{arg}')"),
            ));
        }
        Ok(())
    }

    fn check_types(&self, assignment: &ArgAssignment) -> Result<(), ConversionError> {
        let sql_type = assignment.column.effective_sql_type();
        if !is_compatible(assignment.arg.adl_type, sql_type) {
            return Err(ConversionError::new(
                ErrorCode::MappingFailed,
                format!(
                    "attribute type {} of argument '{}' cannot be compared with SQL type {} of column {}.{}",
                    assignment.arg.adl_type.as_str(),
                    assignment.arg.name,
                    sql_type.as_sql(),
                    assignment.column.table,
                    assignment.column.name
                ),
            ));
        }
        Ok(())
    }

    fn column_ref(&self, assignment: &ArgAssignment) -> ColumnRef {
        ColumnRef::new(
            &assignment.column.table,
            &assignment.column.name,
            assignment.column.caster.clone(),
        )
    }

    /// Publishes `argName` / `argName.local` and materializes the filter
    /// predicates of the assignment plus its table.
    fn build_filters(
        &mut self,
        assignment: &ArgAssignment,
    ) -> Result<Vec<Predicate>, ConversionError> {
        let arg = &assignment.arg.name;
        let local = assignment
            .local_name
            .clone()
            .unwrap_or_else(|| derive_local_name(arg));
        self.variables.insert("argName".to_string(), arg.clone());
        self.variables.insert("argName.local".to_string(), local);

        let table = self.catalog.table(&assignment.column.table)?;
        let mut filters = Vec::new();
        for filter in assignment.column.filters.iter().chain(table.filters.iter()) {
            let value = resolve_template(&filter.value, self.variables)?;
            let placeholder = self.params.register(Some(arg), None, value, filter.sql_type);
            filters.push(Predicate::Compare {
                col: ColumnRef::new(&assignment.column.table, &filter.column, None),
                op: SqlComparison::Eq,
                placeholder: Some(placeholder),
            });
        }
        Ok(filters)
    }

    fn build_is_unknown(
        &mut self,
        key: &str,
        assignment: &ArgAssignment,
    ) -> Result<MatchCondition, ConversionError> {
        let filters = self.build_filters(assignment)?;
        Ok(MatchCondition {
            arg: assignment.arg.name.clone(),
            key: key.to_string(),
            table: assignment.column.table.clone(),
            kind: ConditionKind::Single,
            predicate: Predicate::Compare {
                col: self.column_ref(assignment),
                op: SqlComparison::IsNull,
                placeholder: None,
            },
            filters,
            right: None,
            shape: MatchShape::Simple,
        })
    }

    fn build_contains(
        &mut self,
        key: &str,
        assignment: &ArgAssignment,
        snippet: &str,
    ) -> Result<MatchCondition, ConversionError> {
        let sql_type = assignment.column.effective_sql_type();
        let text_capable = matches!(sql_type, SqlType::Varchar | SqlType::Char)
            && assignment.arg.adl_type == AdlType::String;
        if !text_capable {
            return Err(ConversionError::new(
                ErrorCode::ContainsNotSupported,
                format!(
                    "CONTAINS is not supported on column {}.{} ({})",
                    assignment.column.table,
                    assignment.column.name,
                    sql_type.as_sql()
                ),
            ));
        }
        let filters = self.build_filters(assignment)?;
        let prepared = self.contains_policy.prepare_snippet(snippet);
        let placeholder = self.params.register(
            Some(&assignment.arg.name),
            Some(assignment.arg.adl_type),
            prepared,
            sql_type,
        );
        Ok(MatchCondition {
            arg: assignment.arg.name.clone(),
            key: key.to_string(),
            table: assignment.column.table.clone(),
            kind: ConditionKind::Single,
            predicate: Predicate::Like {
                col: self.column_ref(assignment),
                placeholder,
                policy: self.contains_policy.clone(),
            },
            filters,
            right: None,
            shape: MatchShape::Simple,
        })
    }

    fn build_value_compare(
        &mut self,
        key: &str,
        assignment: &ArgAssignment,
        op: MatchOperator,
        raw: &str,
    ) -> Result<MatchCondition, ConversionError> {
        let arg = &assignment.arg.name;
        let sql_type = assignment.column.effective_sql_type();
        let aligned = assignment.arg.adl_type == AdlType::Date
            && sql_type.is_finer_than_date()
            && !self
                .flags
                .contains(ConversionFlags::DISABLE_DATE_TIME_ALIGNMENT);

        let filters = self.build_filters(assignment)?;
        let col = self.column_ref(assignment);
        let (kind, predicate) = if aligned {
            match align_date(arg, op, raw, sql_type)? {
                AlignedDate::Range { lower, upper } => {
                    let lower =
                        self.params
                            .register(Some(arg), Some(AdlType::Date), lower, sql_type);
                    let upper =
                        self.params
                            .register(Some(arg), Some(AdlType::Date), upper, sql_type);
                    (ConditionKind::DateRange, Predicate::Range { col, lower, upper })
                }
                AlignedDate::AfterStart { lower } => {
                    let placeholder =
                        self.params
                            .register(Some(arg), Some(AdlType::Date), lower, sql_type);
                    (
                        ConditionKind::AfterToday,
                        Predicate::Compare {
                            col,
                            op: SqlComparison::Ge,
                            placeholder: Some(placeholder),
                        },
                    )
                }
                AlignedDate::BeforeStart { upper } => {
                    let placeholder =
                        self.params
                            .register(Some(arg), Some(AdlType::Date), upper, sql_type);
                    (
                        ConditionKind::Single,
                        Predicate::Compare {
                            col,
                            op: SqlComparison::Lt,
                            placeholder: Some(placeholder),
                        },
                    )
                }
            }
        } else {
            let value = normalize_value(arg, assignment.arg.adl_type, sql_type, raw)?;
            let placeholder =
                self.params
                    .register(Some(arg), Some(assignment.arg.adl_type), value, sql_type);
            (
                ConditionKind::Single,
                Predicate::Compare {
                    col,
                    op: comparison_for(op),
                    placeholder: Some(placeholder),
                },
            )
        };
        Ok(MatchCondition {
            arg: arg.clone(),
            key: key.to_string(),
            table: assignment.column.table.clone(),
            kind,
            predicate,
            filters,
            right: None,
            shape: MatchShape::Simple,
        })
    }

    fn build_reference(
        &mut self,
        key: &str,
        assignment: &ArgAssignment,
        op: MatchOperator,
        other: &str,
    ) -> Result<MatchCondition, ConversionError> {
        if matches!(op, MatchOperator::Contains | MatchOperator::IsUnknown) {
            return Err(ConversionError::new(
                ErrorCode::ReferenceMatchNotSupported,
                format!(
                    "operator not applicable to a reference match on argument '{}'",
                    assignment.arg.name
                ),
            ));
        }
        let right = self.catalog.lookup(other)?;
        self.check_types(&right)?;
        if assignment.arg.adl_type != right.arg.adl_type {
            return Err(ConversionError::new(
                ErrorCode::ReferenceMatchNotSupported,
                format!(
                    "arguments '{}' ({}) and '{}' ({}) share no common attribute type",
                    assignment.arg.name,
                    assignment.arg.adl_type.as_str(),
                    right.arg.name,
                    right.arg.adl_type.as_str()
                ),
            ));
        }

        let filters = self.build_filters(assignment)?;
        let right_filters = self.build_filters(&right)?;
        let same_table = assignment.column.table == right.column.table;
        let shape = if same_table {
            if assignment.column.multi_row || right.column.multi_row {
                MatchShape::ReferenceSelfJoin
            } else {
                MatchShape::ReferenceSingleTable
            }
        } else {
            MatchShape::ReferenceDualTable
        };
        let right_table = self.catalog.table(&right.column.table)?;
        Ok(MatchCondition {
            arg: assignment.arg.name.clone(),
            key: key.to_string(),
            table: assignment.column.table.clone(),
            kind: ConditionKind::Reference,
            predicate: Predicate::Reference {
                left: self.column_ref(assignment),
                op: comparison_for(op),
                right: self.column_ref(&right),
            },
            filters,
            right: Some(RightSide {
                arg: right.arg.name.clone(),
                table: right.column.table.clone(),
                id_column: right_table.id_column.clone(),
                filters: right_filters,
            }),
            shape,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{AssignmentConfig, CatalogBuilder, TableNature};

    fn catalog() -> MappingCatalog {
        CatalogBuilder::new()
            .table("T_BASE", "ID", TableNature::PrimaryUnique)
            .table("T_FACTS", "UID", TableNature::Sparse)
            .assign(
                AssignmentConfig::new("provider", AdlType::String, "T_BASE", "PROVIDER", SqlType::Varchar)
                    .always_known(),
            )
            .assign(AssignmentConfig::new(
                "upd1",
                AdlType::Date,
                "T_BASE",
                "UPD_TIME",
                SqlType::Timestamp,
            ))
            .assign(
                AssignmentConfig::new("fact.hasCat.flg", AdlType::Bool, "T_FACTS", "F_VALUE_FLG", SqlType::Bool)
                    .filter("F_KEY", SqlType::Varchar, "${argName.local}"),
            )
            .assign(AssignmentConfig::new(
                "sizeCM",
                AdlType::Integer,
                "T_FACTS",
                "F_VALUE",
                SqlType::Varchar,
            ).caster("CAST(${column} AS INT)", SqlType::Int))
            .build()
            .unwrap()
    }

    fn build_ctx(
        catalog: &MappingCatalog,
        params: &mut ParameterRegistry,
        variables: &mut HashMap<String, String>,
        flags: ConversionFlags,
    ) -> MatchCondition {
        let mut builder = ConditionBuilder::new(
            catalog,
            params,
            variables,
            flags,
            ContainsPolicy::default(),
        );
        let operand = Operand::Value("LOGMOTH".to_string());
        builder
            .build_leaf("provider", MatchOperator::Eq, Some(&operand))
            .unwrap()
    }

    #[test]
    fn simple_value_condition_binds_one_parameter() {
        let catalog = catalog();
        let mut params = ParameterRegistry::new();
        let mut variables = HashMap::new();
        let condition = build_ctx(&catalog, &mut params, &mut variables, ConversionFlags::empty());
        assert_eq!(condition.render_inline(false).sql, "T_BASE.PROVIDER = ${p1}");
        assert_eq!(condition.render_inline(true).sql, "T_BASE.PROVIDER <> ${p1}");
        assert_eq!(params.len(), 1);
        assert_eq!(params.parameters()[0].value, "LOGMOTH");
    }

    #[test]
    fn filters_are_materialized_before_the_main_predicate() {
        let catalog = catalog();
        let mut params = ParameterRegistry::new();
        let mut variables = HashMap::new();
        let mut builder = ConditionBuilder::new(
            &catalog,
            &mut params,
            &mut variables,
            ConversionFlags::empty(),
            ContainsPolicy::default(),
        );
        let operand = Operand::Value("1".to_string());
        let condition = builder
            .build_leaf("fact.hasCat.flg", MatchOperator::Eq, Some(&operand))
            .unwrap();
        assert_eq!(
            condition.render_inline(false).sql,
            "T_FACTS.F_KEY = ${p1} AND T_FACTS.F_VALUE_FLG = ${p2}"
        );
        assert_eq!(params.parameters()[0].value, "hasCat");
        assert_eq!(params.parameters()[1].value, "1");
        assert_eq!(variables.get("argName.local").map(String::as_str), Some("hasCat"));
    }

    #[test]
    fn memoization_reuses_parameters() {
        let catalog = catalog();
        let mut params = ParameterRegistry::new();
        let mut variables = HashMap::new();
        let mut builder = ConditionBuilder::new(
            &catalog,
            &mut params,
            &mut variables,
            ConversionFlags::empty(),
            ContainsPolicy::default(),
        );
        let operand = Operand::Value("LOGMOTH".to_string());
        let first = builder
            .build_leaf("provider", MatchOperator::Eq, Some(&operand))
            .unwrap();
        let second = builder
            .build_leaf("provider", MatchOperator::Eq, Some(&operand))
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(params.len(), 1);
    }

    #[test]
    fn date_equality_becomes_a_range() {
        let catalog = catalog();
        let mut params = ParameterRegistry::new();
        let mut variables = HashMap::new();
        let mut builder = ConditionBuilder::new(
            &catalog,
            &mut params,
            &mut variables,
            ConversionFlags::empty(),
            ContainsPolicy::default(),
        );
        let operand = Operand::Value("2024-09-24".to_string());
        let condition = builder
            .build_leaf("upd1", MatchOperator::Eq, Some(&operand))
            .unwrap();
        assert_eq!(condition.kind, ConditionKind::DateRange);
        assert_eq!(
            condition.render_inline(false).sql,
            "T_BASE.UPD_TIME >= ${p1} AND T_BASE.UPD_TIME < ${p2}"
        );
        assert_eq!(params.parameters()[0].value, "2024-09-24 00:00:00");
        assert_eq!(params.parameters()[1].value, "2024-09-25 00:00:00");
    }

    #[test]
    fn date_alignment_honors_the_directive() {
        let catalog = catalog();
        let mut params = ParameterRegistry::new();
        let mut variables = HashMap::new();
        let mut builder = ConditionBuilder::new(
            &catalog,
            &mut params,
            &mut variables,
            ConversionFlags::DISABLE_DATE_TIME_ALIGNMENT,
            ContainsPolicy::default(),
        );
        let operand = Operand::Value("2024-09-24".to_string());
        let condition = builder
            .build_leaf("upd1", MatchOperator::Eq, Some(&operand))
            .unwrap();
        assert_eq!(condition.kind, ConditionKind::Single);
        assert_eq!(condition.render_inline(false).sql, "T_BASE.UPD_TIME = ${p1}");
    }

    #[test]
    fn caster_wraps_the_comparison_expression() {
        let catalog = catalog();
        let mut params = ParameterRegistry::new();
        let mut variables = HashMap::new();
        let mut builder = ConditionBuilder::new(
            &catalog,
            &mut params,
            &mut variables,
            ConversionFlags::empty(),
            ContainsPolicy::default(),
        );
        let operand = Operand::Value("185".to_string());
        let condition = builder
            .build_leaf("sizeCM", MatchOperator::Gt, Some(&operand))
            .unwrap();
        assert_eq!(
            condition.render_inline(false).sql,
            "CAST(T_FACTS.F_VALUE AS INT) > ${p1}"
        );
        assert_eq!(params.parameters()[0].sql_type, SqlType::Int);
    }

    #[test]
    fn in_folding_dedupes_and_downgrades() {
        let catalog = catalog();
        let mut params = ParameterRegistry::new();
        let mut variables = HashMap::new();
        let mut builder = ConditionBuilder::new(
            &catalog,
            &mut params,
            &mut variables,
            ConversionFlags::empty(),
            ContainsPolicy::default(),
        );
        let condition = builder
            .build_in("provider", &["A", "B", "A"])
            .unwrap();
        assert_eq!(condition.kind, ConditionKind::In);
        assert_eq!(
            condition.render_inline(false).sql,
            "T_BASE.PROVIDER IN (${p1}, ${p2})"
        );
        let single = builder.build_in("provider", &["C", "C"]).unwrap();
        assert_eq!(single.kind, ConditionKind::Single);
    }

    #[test]
    fn disabled_operations_are_rejected() {
        let catalog = catalog();
        let mut params = ParameterRegistry::new();
        let mut variables = HashMap::new();
        let mut builder = ConditionBuilder::new(
            &catalog,
            &mut params,
            &mut variables,
            ConversionFlags::DISABLE_CONTAINS | ConversionFlags::DISABLE_LESS_THAN_GREATER_THAN,
            ContainsPolicy::default(),
        );
        let snippet = Operand::Value("x".to_string());
        let err = builder
            .build_leaf("provider", MatchOperator::Contains, Some(&snippet))
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::ContainsNotSupported);
        let operand = Operand::Value("A".to_string());
        let err = builder
            .build_leaf("provider", MatchOperator::Lt, Some(&operand))
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::LessThanGreaterThanNotSupported);
    }

    #[test]
    fn unresolved_template_variable_is_an_error() {
        let variables = HashMap::new();
        let err = resolve_template("${tenant}", &variables).unwrap_err();
        assert_eq!(err.code, ErrorCode::MappingFailed);
        assert!(err.message.contains("${tenant}"));
    }

    #[test]
    fn template_mixes_literals_and_variables() {
        let mut variables = HashMap::new();
        variables.insert("argName.local".to_string(), "hasCat".to_string());
        assert_eq!(
            resolve_template("k:${argName.local}", &variables).unwrap(),
            "k:hasCat"
        );
        assert_eq!(resolve_template("literal", &variables).unwrap(), "literal");
    }
}
