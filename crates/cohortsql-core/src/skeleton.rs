//! WHERE-skeleton construction.
//!
//! The skeleton mirrors the boolean structure of the expression with each
//! leaf resolved to its rendering: a direct predicate, or an existence
//! check against an alias. Multi-row sensitive leaves and IS UNKNOWN on
//! unreliable columns never become direct predicates; they turn into
//! `alias.ID IS [NOT] NULL` checks so a single pinned row cannot falsify
//! the condition.

use crate::aliases::{AliasKind, AliasRegistry};
use crate::analyzer::Stats;
use crate::conditions::{ConditionBuilder, MatchCondition};
use crate::error::ConversionError;
use crate::expr::{Expression, MatchOperator, Operand};
use std::collections::BTreeSet;

/// One leaf of the WHERE skeleton.
#[derive(Debug, Clone)]
pub(crate) enum LeafSql {
    /// Condition evaluated directly on a joined row.
    Direct { cond: MatchCondition, negated: bool },
    /// `alias.ID IS NOT NULL`
    AliasNotNull { alias: usize },
    /// `alias.ID IS NULL`
    AliasIsNull { alias: usize },
    /// Strict negation: `helper.ID IS NOT NULL AND alias.ID IS NULL`.
    HelperPair { helper: usize, alias: usize },
}

/// The WHERE clause before rendering.
#[derive(Debug, Clone)]
pub(crate) enum WhereNode {
    And(Vec<WhereNode>),
    Or(Vec<WhereNode>),
    Leaf(LeafSql),
}

impl WhereNode {
    /// Collects every alias index referenced by an existence check.
    pub(crate) fn alias_refs(&self, out: &mut BTreeSet<usize>) {
        match self {
            Self::And(children) | Self::Or(children) => {
                for child in children {
                    child.alias_refs(out);
                }
            }
            Self::Leaf(LeafSql::AliasNotNull { alias }) | Self::Leaf(LeafSql::AliasIsNull { alias }) => {
                out.insert(*alias);
            }
            Self::Leaf(LeafSql::HelperPair { helper, alias }) => {
                out.insert(*helper);
                out.insert(*alias);
            }
            Self::Leaf(LeafSql::Direct { .. }) => {}
        }
    }

    /// Collects direct conditions together with their polarity.
    pub(crate) fn direct_conditions<'a>(&'a self, out: &mut Vec<(&'a MatchCondition, bool)>) {
        match self {
            Self::And(children) | Self::Or(children) => {
                for child in children {
                    child.direct_conditions(out);
                }
            }
            Self::Leaf(LeafSql::Direct { cond, negated }) => out.push((cond, *negated)),
            Self::Leaf(_) => {}
        }
    }

    /// When the whole skeleton is a single positive existence check,
    /// returns the alias index.
    pub(crate) fn as_single_alias_not_null(&self) -> Option<usize> {
        match self {
            Self::Leaf(LeafSql::AliasNotNull { alias }) => Some(*alias),
            _ => None,
        }
    }
}

/// Builds the WHERE skeleton, creating aliases and reference counts as a
/// side effect.
pub(crate) struct SkeletonBuilder<'a, 'b> {
    pub(crate) stats: &'a Stats,
    pub(crate) conditions: &'a mut ConditionBuilder<'b>,
    pub(crate) aliases: &'a mut AliasRegistry,
    pub(crate) all_ids_tables: BTreeSet<String>,
}

impl<'a, 'b> SkeletonBuilder<'a, 'b> {
    pub(crate) fn build(&mut self, root: &Expression) -> Result<WhereNode, ConversionError> {
        self.walk(root, true)
    }

    fn walk(&mut self, expr: &Expression, required: bool) -> Result<WhereNode, ConversionError> {
        match expr {
            Expression::Match { arg, op, operand } => {
                self.leaf(arg, *op, operand.as_ref(), false, required)
            }
            Expression::Negation(inner) => match inner.as_ref() {
                Expression::Match { arg, op, operand } => {
                    self.leaf(arg, *op, operand.as_ref(), true, required)
                }
                other => self.walk(other, false),
            },
            Expression::And(members) => self.walk_and(members, required),
            Expression::Or(members) => self.walk_or(members, required),
        }
    }

    fn walk_and(
        &mut self,
        members: &[Expression],
        required: bool,
    ) -> Result<WhereNode, ConversionError> {
        // Full AND-of-negations on one argument folds to a NOT IN check.
        if let Some((arg, values)) = full_group(members, Expression::as_negated_eq_value) {
            return self.in_leaf(arg, &values, true, required);
        }
        let mut children = Vec::new();
        let mut folded: BTreeSet<&str> = BTreeSet::new();
        for member in members {
            if let Some((arg, _)) = member.as_negated_eq_value() {
                if group_size(members, arg, Expression::as_negated_eq_value) >= 2 {
                    if folded.insert(arg) {
                        let values = group_values(members, arg, Expression::as_negated_eq_value);
                        children.push(self.in_leaf(arg, &values, true, required)?);
                    }
                    continue;
                }
            }
            children.push(self.walk(member, required)?);
        }
        Ok(unwrap_single(children, WhereNode::And))
    }

    fn walk_or(
        &mut self,
        members: &[Expression],
        required: bool,
    ) -> Result<WhereNode, ConversionError> {
        // Full OR of positive equalities on one argument folds to IN.
        if let Some((arg, values)) = full_group(members, Expression::as_positive_eq_value) {
            return self.in_leaf(arg, &values, false, required);
        }
        let mut children = Vec::new();
        let mut folded: BTreeSet<&str> = BTreeSet::new();
        for member in members {
            if let Some((arg, _)) = member.as_positive_eq_value() {
                if group_size(members, arg, Expression::as_positive_eq_value) >= 2 {
                    if folded.insert(arg) {
                        let values = group_values(members, arg, Expression::as_positive_eq_value);
                        children.push(self.in_leaf(arg, &values, false, false)?);
                    }
                    continue;
                }
            }
            children.push(self.walk(member, false)?);
        }
        Ok(unwrap_single(children, WhereNode::Or))
    }

    fn in_leaf(
        &mut self,
        arg: &str,
        values: &[&str],
        negated: bool,
        required: bool,
    ) -> Result<WhereNode, ConversionError> {
        let cond = self.conditions.build_in(arg, values)?;
        self.place(cond, arg, negated, required, false)
    }

    fn leaf(
        &mut self,
        arg: &str,
        op: MatchOperator,
        operand: Option<&Operand>,
        negated: bool,
        required: bool,
    ) -> Result<WhereNode, ConversionError> {
        let cond = self.conditions.build_leaf(arg, op, operand)?;
        let is_unknown = op == MatchOperator::IsUnknown;
        self.place(cond, arg, negated, required, is_unknown)
    }

    /// Decides direct rendering versus existence checks for a built
    /// condition.
    fn place(
        &mut self,
        cond: MatchCondition,
        arg: &str,
        negated: bool,
        required: bool,
        is_unknown: bool,
    ) -> Result<WhereNode, ConversionError> {
        let assignment = self.stats.assignment(arg);
        let sensitive = self.sensitive(&cond);

        if is_unknown {
            let direct_ok = self.all_ids_tables.contains(&cond.table)
                && cond.filters.is_empty()
                && !sensitive;
            if direct_ok {
                return Ok(WhereNode::Leaf(LeafSql::Direct { cond, negated }));
            }
            // Missing-row semantics via the IS-NOT-NULL companion.
            let helper = self
                .aliases
                .get_or_create(cond.to_is_not_null(), AliasKind::NotNullHelper);
            return Ok(if negated {
                self.aliases.register_pos(helper);
                if required {
                    self.aliases.mark_required(helper);
                }
                WhereNode::Leaf(LeafSql::AliasNotNull { alias: helper })
            } else {
                self.aliases.register_neg(helper);
                WhereNode::Leaf(LeafSql::AliasIsNull { alias: helper })
            });
        }

        if !sensitive {
            return Ok(WhereNode::Leaf(LeafSql::Direct { cond, negated }));
        }

        let kind = if matches!(cond.predicate, crate::conditions::Predicate::In { .. }) {
            AliasKind::In
        } else {
            AliasKind::Plain
        };
        let helper_cond = cond.to_is_not_null();
        let alias = self.aliases.get_or_create(cond, kind);
        if !negated {
            self.aliases.register_pos(alias);
            if required {
                self.aliases.mark_required(alias);
            }
            return Ok(WhereNode::Leaf(LeafSql::AliasNotNull { alias }));
        }

        self.aliases.register_neg(alias);
        if assignment.arg.always_known {
            return Ok(WhereNode::Leaf(LeafSql::AliasIsNull { alias }));
        }
        let helper = self
            .aliases
            .get_or_create(helper_cond, AliasKind::NotNullHelper);
        self.aliases.register_pos(helper);
        if required {
            self.aliases.mark_required(helper);
        }
        Ok(WhereNode::Leaf(LeafSql::HelperPair { helper, alias }))
    }

    fn sensitive(&self, cond: &MatchCondition) -> bool {
        self.stats.is_sensitive(&cond.arg)
            || cond
                .right
                .as_ref()
                .map(|right| self.stats.is_sensitive(&right.arg))
                .unwrap_or(false)
    }
}

fn unwrap_single(mut children: Vec<WhereNode>, combiner: fn(Vec<WhereNode>) -> WhereNode) -> WhereNode {
    if children.len() == 1 {
        children.remove(0)
    } else {
        combiner(children)
    }
}

fn full_group<'e>(
    members: &'e [Expression],
    extract: fn(&Expression) -> Option<(&str, &str)>,
) -> Option<(&'e str, Vec<&'e str>)> {
    let mut arg: Option<&str> = None;
    let mut values = Vec::new();
    for member in members {
        let (a, v) = extract(member)?;
        match arg {
            None => arg = Some(a),
            Some(existing) if existing != a => return None,
            _ => {}
        }
        values.push(v);
    }
    if values.len() >= 2 {
        arg.map(|a| (a, values))
    } else {
        None
    }
}

fn group_size(
    members: &[Expression],
    arg: &str,
    extract: fn(&Expression) -> Option<(&str, &str)>,
) -> usize {
    members
        .iter()
        .filter(|m| extract(m).map(|(a, _)| a == arg).unwrap_or(false))
        .count()
}

fn group_values<'e>(
    members: &'e [Expression],
    arg: &str,
    extract: fn(&Expression) -> Option<(&str, &str)>,
) -> Vec<&'e str> {
    members
        .iter()
        .filter_map(extract)
        .filter(|(a, _)| *a == arg)
        .map(|(_, v)| v)
        .collect()
}
