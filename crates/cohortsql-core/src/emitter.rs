//! SQL rendering: WITH clauses, the main SELECT, joins, WHERE and ORDER BY.
//!
//! The emitter is a straight-line writer over the finished plan. All
//! augmentation callbacks fire from here, observing and possibly mutating
//! the buffer as it grows.

use crate::aliases::AliasRegistry;
use crate::augment::{AugmentationContext, AugmentationListener, SqlWriter};
use crate::catalog::MappingCatalog;
use crate::conditions::{resolve_template, Junction, MatchShape, SqlFragment};
use crate::error::{ConversionError, ErrorCode};
use crate::flags::ConversionFlags;
use crate::params::ParameterRegistry;
use crate::planner::{JoinTarget, QueryPlan, StartSelection};
use crate::skeleton::{LeafSql, WhereNode};
use crate::types::QueryKind;
use std::collections::HashMap;
use std::mem;

macro_rules! aug_ctx {
    ($self:ident) => {
        &mut AugmentationContext {
            sql: &mut $self.writer,
            params: &mut *$self.params,
            variables: $self.variables,
            flags: $self.flags,
        }
    };
}

pub(crate) struct Emitter<'a> {
    pub(crate) catalog: &'a MappingCatalog,
    pub(crate) aliases: &'a AliasRegistry,
    pub(crate) plan: &'a QueryPlan,
    pub(crate) kind: QueryKind,
    pub(crate) id_name: &'a str,
    pub(crate) flags: ConversionFlags,
    pub(crate) variables: &'a HashMap<String, String>,
    pub(crate) params: &'a mut ParameterRegistry,
    pub(crate) listener: &'a mut dyn AugmentationListener,
    pub(crate) writer: SqlWriter,
}

impl<'a> Emitter<'a> {
    pub(crate) fn emit(mut self) -> Result<String, ConversionError> {
        self.listener.on_script_start(aug_ctx!(self));
        self.write_with_clauses()?;
        self.listener.on_before_main_select(aug_ctx!(self));
        self.write_main_select()?;
        self.write_joins()?;
        self.write_where()?;
        if self.kind == QueryKind::SelectDistinctIdOrdered {
            let order = format!("\nORDER BY {}", self.id_name);
            self.writer.append(order);
        }
        self.listener.on_script_end(aug_ctx!(self));
        Ok(mem::take(&mut self.writer).into_string())
    }

    fn write_with_clauses(&mut self) -> Result<(), ConversionError> {
        let mut entries: Vec<(String, String)> = Vec::new();
        for &idx in &self.plan.with_aliases {
            let name = self.aliases.get(idx).name.clone();
            let body = self.alias_body(idx)?;
            entries.push((name, body));
        }
        match &self.plan.start {
            StartSelection::BaseUnion(members) => {
                let body = members
                    .iter()
                    .map(|&m| format!("SELECT {} FROM {}", self.id_name, self.aliases.get(m).name))
                    .collect::<Vec<_>>()
                    .join(" UNION ");
                entries.push(("base".to_string(), body));
            }
            StartSelection::UniverseUnion(tables) => {
                let mut parts = Vec::new();
                for table in tables {
                    parts.push(self.universe_member(table)?);
                }
                entries.push(("base".to_string(), parts.join(" UNION ")));
            }
            _ => {}
        }
        if entries.is_empty() {
            return Ok(());
        }
        self.writer.append("WITH ");
        for (i, (name, body)) in entries.iter().enumerate() {
            if i > 0 {
                self.writer.append(",\n");
            }
            self.writer.append(format!("{name} AS ({body}"));
            self.listener.on_after_with_select(name, aug_ctx!(self));
            self.writer.append(")");
        }
        self.writer.append("\n");
        Ok(())
    }

    /// `table.idcol` aliased to the configured output name when it differs.
    fn id_select(&self, qualifier: &str, id_column: &str) -> String {
        if id_column == self.id_name {
            format!("{qualifier}.{id_column}")
        } else {
            format!("{qualifier}.{id_column} AS {}", self.id_name)
        }
    }

    fn alias_body(&mut self, idx: usize) -> Result<String, ConversionError> {
        let alias = self.aliases.get(idx);
        let cond = &alias.condition;
        let table = self.catalog.table(&cond.table)?;
        match cond.shape {
            MatchShape::Simple | MatchShape::ReferenceSingleTable => Ok(format!(
                "SELECT {} FROM {} WHERE {}",
                self.id_select(&table.name, &table.id_column),
                table.name,
                cond.render_inline(false).sql
            )),
            MatchShape::ReferenceDualTable => {
                let right = cond.right.as_ref().ok_or_else(|| {
                    ConversionError::new(
                        ErrorCode::MappingFailed,
                        "reference condition without a right side",
                    )
                })?;
                Ok(format!(
                    "SELECT {} FROM {} INNER JOIN {} ON {}.{} = {}.{} WHERE {}",
                    self.id_select(&table.name, &table.id_column),
                    table.name,
                    right.table,
                    table.name,
                    table.id_column,
                    right.table,
                    right.id_column,
                    cond.render_inline(false).sql
                ))
            }
            MatchShape::ReferenceSelfJoin => {
                let right = cond.right.as_ref().ok_or_else(|| {
                    ConversionError::new(
                        ErrorCode::MappingFailed,
                        "reference condition without a right side",
                    )
                })?;
                let mut parts: Vec<SqlFragment> = Vec::new();
                for filter in &cond.filters {
                    parts.push(filter.render_requalified(Some("s1"), None, false));
                }
                for filter in &right.filters {
                    parts.push(filter.render_requalified(Some("s2"), None, false));
                }
                parts.push(cond.predicate.render_requalified(Some("s1"), Some("s2"), false));
                Ok(format!(
                    "SELECT {} FROM {} s1 INNER JOIN {} s2 ON s1.{} = s2.{} WHERE {}",
                    self.id_select("s1", &table.id_column),
                    table.name,
                    table.name,
                    table.id_column,
                    table.id_column,
                    SqlFragment::join(&parts, Junction::And).sql
                ))
            }
        }
    }

    fn universe_member(&mut self, name: &str) -> Result<String, ConversionError> {
        let table = self.catalog.table(name)?;
        let mut sql = format!(
            "SELECT {} FROM {}",
            self.id_select(&table.name, &table.id_column),
            table.name
        );
        if !table.filters.is_empty() {
            let mut parts = Vec::new();
            for filter in &table.filters {
                let value = resolve_template(&filter.value, self.variables)?;
                let placeholder = self.params.register(None, None, value, filter.sql_type);
                parts.push(format!("{}.{} = {placeholder}", table.name, filter.column));
            }
            sql.push_str(" WHERE ");
            sql.push_str(&parts.join(" AND "));
        }
        Ok(sql)
    }

    fn main_id_expr(&self) -> Result<String, ConversionError> {
        match &self.plan.start {
            StartSelection::Table(name) => {
                let table = self.catalog.table(name)?;
                Ok(format!("{}.{}", name, table.id_column))
            }
            StartSelection::Alias(idx) => Ok(format!(
                "{}.{}",
                self.aliases.get(*idx).name,
                self.id_name
            )),
            StartSelection::BaseUnion(_) | StartSelection::UniverseUnion(_) => {
                Ok(format!("base.{}", self.id_name))
            }
        }
    }

    fn from_name(&self) -> String {
        match &self.plan.start {
            StartSelection::Table(name) => name.clone(),
            StartSelection::Alias(idx) => self.aliases.get(*idx).name.clone(),
            StartSelection::BaseUnion(_) | StartSelection::UniverseUnion(_) => "base".to_string(),
        }
    }

    fn write_main_select(&mut self) -> Result<(), ConversionError> {
        let id_expr = self.main_id_expr()?;
        let select = match self.kind {
            QueryKind::SelectDistinctIdOrdered => {
                let rename = match &self.plan.start {
                    StartSelection::Table(name) => {
                        let table = self.catalog.table(name)?;
                        if table.id_column == self.id_name {
                            String::new()
                        } else {
                            format!(" AS {}", self.id_name)
                        }
                    }
                    _ => String::new(),
                };
                format!("SELECT DISTINCT {id_expr}{rename}")
            }
            QueryKind::SelectDistinctCount => {
                format!("SELECT COUNT(DISTINCT {id_expr})")
            }
        };
        self.writer.append(select);
        let from = format!("\nFROM {}", self.from_name());
        self.writer.append(from);
        Ok(())
    }

    fn write_joins(&mut self) -> Result<(), ConversionError> {
        if self.plan.joins.is_empty() {
            return Ok(());
        }
        let main_id = self.main_id_expr()?;
        for spec in &self.plan.joins {
            let (name, target_id) = match &spec.target {
                JoinTarget::Alias(idx) => {
                    let alias_name = self.aliases.get(*idx).name.clone();
                    let target_id = format!("{alias_name}.{}", self.id_name);
                    (alias_name, target_id)
                }
                JoinTarget::Table(table_name) => {
                    let table = self.catalog.table(table_name)?;
                    let target_id = format!("{table_name}.{}", table.id_column);
                    (table_name.clone(), target_id)
                }
            };
            let join_type = self.listener.join_type(&name, spec.join_type, aug_ctx!(self));
            self.writer
                .append(format!("\n{} {name} ON ", join_type.as_sql()));
            self.listener.on_before_on_clause(&name, aug_ctx!(self));
            self.writer.append(format!("{main_id} = {target_id}"));
            if !spec.restrictions.is_empty() {
                self.writer.append(" AND (");
                self.listener.on_before_on_conditions(&name, aug_ctx!(self));
                let parts: Vec<SqlFragment> = spec
                    .restrictions
                    .iter()
                    .map(|(cond, negated)| cond.render_inline(*negated))
                    .collect();
                self.writer
                    .append(SqlFragment::join(&parts, Junction::Or).sql);
                self.listener.on_after_on_conditions(&name, aug_ctx!(self));
                self.writer.append(")");
            }
        }
        Ok(())
    }

    fn render_where(&self, node: &WhereNode) -> SqlFragment {
        match node {
            WhereNode::And(children) => {
                let parts: Vec<SqlFragment> =
                    children.iter().map(|c| self.render_where(c)).collect();
                SqlFragment::join(&parts, Junction::And)
            }
            WhereNode::Or(children) => {
                let parts: Vec<SqlFragment> =
                    children.iter().map(|c| self.render_where(c)).collect();
                SqlFragment::join(&parts, Junction::Or)
            }
            WhereNode::Leaf(LeafSql::Direct { cond, negated }) => cond.render_inline(*negated),
            WhereNode::Leaf(LeafSql::AliasNotNull { alias }) => SqlFragment::atom(format!(
                "{}.{} IS NOT NULL",
                self.aliases.get(*alias).name,
                self.id_name
            )),
            WhereNode::Leaf(LeafSql::AliasIsNull { alias }) => SqlFragment::atom(format!(
                "{}.{} IS NULL",
                self.aliases.get(*alias).name,
                self.id_name
            )),
            WhereNode::Leaf(LeafSql::HelperPair { helper, alias }) => SqlFragment {
                sql: format!(
                    "{}.{} IS NOT NULL AND {}.{} IS NULL",
                    self.aliases.get(*helper).name,
                    self.id_name,
                    self.aliases.get(*alias).name,
                    self.id_name
                ),
                junction: Junction::And,
            },
        }
    }

    fn write_where(&mut self) -> Result<(), ConversionError> {
        let mut parts: Vec<SqlFragment> = Vec::new();
        if let Some(node) = &self.plan.where_root {
            parts.push(self.render_where(node));
        }
        // Table filters of the main table are appended when not already
        // present through one of the conditions.
        if let StartSelection::Table(name) = &self.plan.start {
            let table = self.catalog.table(name)?;
            for filter in &table.filters {
                let column_ref = format!("{}.{}", name, filter.column);
                if parts.iter().any(|p| p.sql.contains(&column_ref)) {
                    continue;
                }
                let value = resolve_template(&filter.value, self.variables)?;
                let placeholder = self.params.register(None, None, value, filter.sql_type);
                parts.push(SqlFragment::atom(format!("{column_ref} = {placeholder}")));
            }
        }
        if parts.is_empty() {
            return Ok(());
        }
        let clause = format!("\nWHERE {}", SqlFragment::join(&parts, Junction::And).sql);
        self.writer.append(clause);
        Ok(())
    }
}
