//! The normalized audience expression model.
//!
//! An expression is an immutable DAG of matches, negations and combiners.
//! The upstream parser/normalizer guarantees the shape this crate relies on:
//! combined expressions are non-empty, not singletons, not directly
//! sub-nested in the same combiner, and negations wrap plain matches only.
//!
//! [`ExpressionTree`] attaches node ids and a child-to-parent index computed
//! once per conversion; the analyzer uses it for the AND-ancestor sharing
//! test behind the accidental row-pinning detection.

use crate::error::{ConversionError, ErrorCode};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Maximum nesting depth accepted for an expression tree. Exceeding it is a
/// conversion error rather than a stack overflow.
pub const MAX_EXPRESSION_DEPTH: usize = 100;

/// Comparison operator of a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum MatchOperator {
    Eq,
    Lt,
    Gt,
    Contains,
    IsUnknown,
}

/// Right-hand side of a match: a literal value in string form, or a
/// reference to another argument (column-vs-column comparison).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum Operand {
    Value(String),
    Reference(String),
}

/// A node of the normalized boolean expression DAG.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum Expression {
    Match {
        arg: String,
        op: MatchOperator,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        operand: Option<Operand>,
    },
    Negation(Box<Expression>),
    And(Vec<Expression>),
    Or(Vec<Expression>),
}

impl Expression {
    /// `arg = "value"`
    pub fn eq_value(arg: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Match {
            arg: arg.into(),
            op: MatchOperator::Eq,
            operand: Some(Operand::Value(value.into())),
        }
    }

    /// `arg < "value"`
    pub fn lt_value(arg: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Match {
            arg: arg.into(),
            op: MatchOperator::Lt,
            operand: Some(Operand::Value(value.into())),
        }
    }

    /// `arg > "value"`
    pub fn gt_value(arg: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Match {
            arg: arg.into(),
            op: MatchOperator::Gt,
            operand: Some(Operand::Value(value.into())),
        }
    }

    /// `arg CONTAINS "snippet"`
    pub fn contains(arg: impl Into<String>, snippet: impl Into<String>) -> Self {
        Self::Match {
            arg: arg.into(),
            op: MatchOperator::Contains,
            operand: Some(Operand::Value(snippet.into())),
        }
    }

    /// `arg IS UNKNOWN`
    pub fn is_unknown(arg: impl Into<String>) -> Self {
        Self::Match {
            arg: arg.into(),
            op: MatchOperator::IsUnknown,
            operand: None,
        }
    }

    /// `arg <op> @other` (reference match).
    pub fn reference(arg: impl Into<String>, op: MatchOperator, other: impl Into<String>) -> Self {
        Self::Match {
            arg: arg.into(),
            op,
            operand: Some(Operand::Reference(other.into())),
        }
    }

    /// `NOT <inner>`
    pub fn negated(inner: Expression) -> Self {
        Self::Negation(Box::new(inner))
    }

    pub fn and(members: Vec<Expression>) -> Self {
        Self::And(members)
    }

    pub fn or(members: Vec<Expression>) -> Self {
        Self::Or(members)
    }

    /// Returns `(arg, value)` when this is a positive `arg = "value"` match.
    pub fn as_positive_eq_value(&self) -> Option<(&str, &str)> {
        match self {
            Self::Match {
                arg,
                op: MatchOperator::Eq,
                operand: Some(Operand::Value(value)),
            } => Some((arg, value)),
            _ => None,
        }
    }

    /// Returns `(arg, value)` when this is `NOT arg = "value"`.
    pub fn as_negated_eq_value(&self) -> Option<(&str, &str)> {
        match self {
            Self::Negation(inner) => inner.as_positive_eq_value(),
            _ => None,
        }
    }
}

impl fmt::Display for Expression {
    /// Renders the canonical pretty form used in error messages and as the
    /// memoization key for leaf conditions.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Match { arg, op, operand } => match (op, operand) {
                (MatchOperator::IsUnknown, _) => write!(f, "{arg} IS UNKNOWN"),
                (op, Some(Operand::Value(value))) => {
                    write!(f, "{arg} {} \"{value}\"", op_symbol(*op))
                }
                (op, Some(Operand::Reference(other))) => {
                    write!(f, "{arg} {} @{other}", op_symbol(*op))
                }
                (op, None) => write!(f, "{arg} {} ?", op_symbol(*op)),
            },
            Self::Negation(inner) => write!(f, "NOT {inner}"),
            Self::And(members) => write_combined(f, members, "AND"),
            Self::Or(members) => write_combined(f, members, "OR"),
        }
    }
}

fn op_symbol(op: MatchOperator) -> &'static str {
    match op {
        MatchOperator::Eq => "=",
        MatchOperator::Lt => "<",
        MatchOperator::Gt => ">",
        MatchOperator::Contains => "CONTAINS",
        MatchOperator::IsUnknown => "IS UNKNOWN",
    }
}

fn write_combined(f: &mut fmt::Formatter<'_>, members: &[Expression], word: &str) -> fmt::Result {
    write!(f, "(")?;
    for (idx, member) in members.iter().enumerate() {
        if idx > 0 {
            write!(f, " {word} ")?;
        }
        write!(f, "{member}")?;
    }
    write!(f, ")")
}

/// Node id within an [`ExpressionTree`].
pub type NodeId = usize;

/// A leaf of the expression: a match, possibly wrapped in a negation.
///
/// For negated matches, `node` refers to the negation node so that ancestor
/// queries see the full leaf.
#[derive(Debug, Clone, Copy)]
pub struct LeafMatch<'e> {
    pub node: NodeId,
    pub negated: bool,
    pub arg: &'e str,
    pub op: MatchOperator,
    pub operand: Option<&'e Operand>,
}

#[derive(Debug)]
struct Node<'e> {
    expr: &'e Expression,
    parent: Option<NodeId>,
}

/// An expression root with node ids and a child-to-parent index.
#[derive(Debug)]
pub struct ExpressionTree<'e> {
    nodes: Vec<Node<'e>>,
}

impl<'e> ExpressionTree<'e> {
    /// Indexes the expression with pre-order node ids. Fails on excessive
    /// depth or a negation wrapping anything but a match.
    pub fn build(root: &'e Expression) -> Result<Self, ConversionError> {
        let mut nodes: Vec<Node<'e>> = Vec::new();
        // Explicit worklist; children pushed in reverse for pre-order ids.
        let mut stack: Vec<(&'e Expression, Option<NodeId>, usize)> = vec![(root, None, 0)];
        while let Some((expr, parent, depth)) = stack.pop() {
            if depth > MAX_EXPRESSION_DEPTH {
                return Err(ConversionError::on_expression(
                    ErrorCode::MappingFailed,
                    format!("expression exceeds the maximum depth of {MAX_EXPRESSION_DEPTH}"),
                    root,
                ));
            }
            let id = nodes.len();
            nodes.push(Node { expr, parent });
            match expr {
                Expression::Match { .. } => {}
                Expression::Negation(inner) => {
                    if !matches!(inner.as_ref(), Expression::Match { .. }) {
                        return Err(ConversionError::on_expression(
                            ErrorCode::MappingFailed,
                            "negation of a combined expression; normalized input expected",
                            root,
                        ));
                    }
                    stack.push((inner, Some(id), depth + 1));
                }
                Expression::And(members) | Expression::Or(members) => {
                    for member in members.iter().rev() {
                        stack.push((member, Some(id), depth + 1));
                    }
                }
            }
        }
        Ok(Self { nodes })
    }

    pub fn root(&self) -> &'e Expression {
        self.nodes[0].expr
    }

    pub fn node(&self, id: NodeId) -> &'e Expression {
        self.nodes[id].expr
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id].parent
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// All match arguments appearing in the expression (reference targets
    /// are not included; they are resolved by the analyzer).
    pub fn all_args(&self) -> BTreeSet<&'e str> {
        self.leaf_matches()
            .into_iter()
            .map(|leaf| leaf.arg)
            .collect()
    }

    /// All leaves in pre-order: plain matches and negated matches.
    pub fn leaf_matches(&self) -> Vec<LeafMatch<'e>> {
        let mut leaves = Vec::new();
        for (id, node) in self.nodes.iter().enumerate() {
            match node.expr {
                Expression::Match { arg, op, operand } => {
                    let negated_parent = node
                        .parent
                        .map(|p| matches!(self.nodes[p].expr, Expression::Negation(_)))
                        .unwrap_or(false);
                    if !negated_parent {
                        leaves.push(LeafMatch {
                            node: id,
                            negated: false,
                            arg,
                            op: *op,
                            operand: operand.as_ref(),
                        });
                    }
                }
                Expression::Negation(inner) => {
                    if let Expression::Match { arg, op, operand } = inner.as_ref() {
                        leaves.push(LeafMatch {
                            node: id,
                            negated: true,
                            arg,
                            op: *op,
                            operand: operand.as_ref(),
                        });
                    }
                }
                _ => {}
            }
        }
        leaves
    }

    /// Collects node ids whose expression satisfies the predicate,
    /// depth-first in pre-order.
    pub fn collect(&self, mut predicate: impl FnMut(&Expression) -> bool) -> Vec<NodeId> {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, node)| predicate(node.expr))
            .map(|(id, _)| id)
            .collect()
    }

    fn ancestors(&self, mut id: NodeId) -> Vec<NodeId> {
        let mut chain = Vec::new();
        while let Some(parent) = self.nodes[id].parent {
            chain.push(parent);
            id = parent;
        }
        chain
    }

    /// True when the nearest common ancestor of the two nodes is an AND
    /// combiner, i.e. the two leaves can be jointly required.
    pub fn shares_and_ancestor(&self, a: NodeId, b: NodeId) -> bool {
        if a == b {
            return false;
        }
        let of_a: BTreeSet<NodeId> = self.ancestors(a).into_iter().collect();
        for candidate in self.ancestors(b) {
            if of_a.contains(&candidate) {
                return matches!(self.nodes[candidate].expr, Expression::And(_));
            }
        }
        false
    }

    /// True when fulfillment of this node is required for the root to hold:
    /// every ancestor on the path to the root is an AND combiner.
    pub fn is_required(&self, id: NodeId) -> bool {
        self.ancestors(id)
            .into_iter()
            .all(|ancestor| matches!(self.nodes[ancestor].expr, Expression::And(_)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Expression {
        Expression::and(vec![
            Expression::eq_value("provider", "LOGMOTH"),
            Expression::or(vec![
                Expression::eq_value("country", "USA"),
                Expression::negated(Expression::eq_value("country", "MX")),
            ]),
        ])
    }

    #[test]
    fn canonical_rendering() {
        assert_eq!(
            sample().to_string(),
            "(provider = \"LOGMOTH\" AND (country = \"USA\" OR NOT country = \"MX\"))"
        );
        assert_eq!(
            Expression::is_unknown("color").to_string(),
            "color IS UNKNOWN"
        );
        assert_eq!(
            Expression::reference("home", MatchOperator::Eq, "work").to_string(),
            "home = @work"
        );
        assert_eq!(
            Expression::contains("name", "mo").to_string(),
            "name CONTAINS \"mo\""
        );
    }

    #[test]
    fn tree_assigns_preorder_ids() {
        let expr = sample();
        let tree = ExpressionTree::build(&expr).unwrap();
        assert_eq!(tree.len(), 6);
        assert!(matches!(tree.node(0), Expression::And(_)));
        assert!(matches!(tree.node(1), Expression::Match { .. }));
        assert!(matches!(tree.node(2), Expression::Or(_)));
        assert_eq!(tree.parent(1), Some(0));
        assert_eq!(tree.parent(2), Some(0));
    }

    #[test]
    fn leaf_matches_fold_negations() {
        let expr = sample();
        let tree = ExpressionTree::build(&expr).unwrap();
        let leaves = tree.leaf_matches();
        assert_eq!(leaves.len(), 3);
        assert!(!leaves[0].negated);
        assert!(!leaves[1].negated);
        assert!(leaves[2].negated);
        assert_eq!(leaves[2].arg, "country");
    }

    #[test]
    fn and_ancestor_sharing() {
        let expr = sample();
        let tree = ExpressionTree::build(&expr).unwrap();
        let leaves = tree.leaf_matches();
        // provider vs country="USA": nearest common ancestor is the root AND.
        assert!(tree.shares_and_ancestor(leaves[0].node, leaves[1].node));
        // the two country leaves only share the OR.
        assert!(!tree.shares_and_ancestor(leaves[1].node, leaves[2].node));
    }

    #[test]
    fn required_tracks_and_only_paths() {
        let expr = sample();
        let tree = ExpressionTree::build(&expr).unwrap();
        let leaves = tree.leaf_matches();
        assert!(tree.is_required(leaves[0].node));
        assert!(!tree.is_required(leaves[1].node));
    }

    #[test]
    fn excessive_depth_is_rejected() {
        let mut expr = Expression::eq_value("a", "1");
        for _ in 0..(MAX_EXPRESSION_DEPTH + 2) {
            expr = Expression::and(vec![expr, Expression::eq_value("a", "2")]);
        }
        let err = ExpressionTree::build(&expr).unwrap_err();
        assert_eq!(err.code, ErrorCode::MappingFailed);
    }

    #[test]
    fn denormalized_negation_is_rejected() {
        let expr = Expression::negated(Expression::and(vec![
            Expression::eq_value("a", "1"),
            Expression::eq_value("b", "2"),
        ]));
        assert!(ExpressionTree::build(&expr).is_err());
    }

    #[test]
    fn serde_round_trip() {
        let expr = sample();
        let json = serde_json::to_string(&expr).unwrap();
        let back: Expression = serde_json::from_str(&json).unwrap();
        assert_eq!(expr, back);
    }
}
