//! The converter: per-run orchestration of analysis, planning and emission.
//!
//! A [`SqlConverter`] owns the immutable configuration (catalog, listener,
//! policies, initial variables and directives). All mutable per-run state
//! (parameters, aliases, variables, the WHERE skeleton) is created inside
//! [`SqlConverter::convert`] and dropped on exit, so repeated conversions
//! cannot interfere and the emitted SQL is deterministic for equal inputs.

use crate::aliases::AliasRegistry;
use crate::analyzer;
use crate::augment::{AugmentationListener, NoAugmentation, SqlWriter};
use crate::catalog::MappingCatalog;
use crate::conditions::{ConditionBuilder, ContainsPolicy};
use crate::rewrite::collapse;
use crate::emitter::Emitter;
use crate::error::ConversionError;
use crate::expr::{Expression, ExpressionTree};
use crate::flags::ConversionFlags;
use crate::params::{Parameter, ParameterRegistry};
use crate::planner;
use crate::skeleton::SkeletonBuilder;
use crate::types::QueryKind;
use schemars::JsonSchema;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
#[cfg(feature = "tracing")]
use tracing::debug;

/// Default cap of the heuristic base-combination search.
pub const DEFAULT_BASE_COMBINATION_CAP: usize = 5;

/// One conversion request.
#[derive(Debug, Clone)]
pub struct ConversionRequest {
    pub expression: Expression,
    pub query_kind: QueryKind,
    /// Caller directives; hint bits are ignored.
    pub directives: ConversionFlags,
    /// Run variables merged over the converter's initial variables.
    pub variables: HashMap<String, String>,
}

impl ConversionRequest {
    pub fn new(expression: Expression) -> Self {
        Self {
            expression,
            query_kind: QueryKind::default(),
            directives: ConversionFlags::empty(),
            variables: HashMap::new(),
        }
    }

    pub fn with_query_kind(mut self, kind: QueryKind) -> Self {
        self.query_kind = kind;
        self
    }

    pub fn with_directive(mut self, directive: ConversionFlags) -> Self {
        self.directives |= directive;
        self
    }

    pub fn with_variable(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.variables.insert(name.into(), value.into());
        self
    }
}

/// The emitted SQL template plus its bound parameters.
#[derive(Debug, Clone, PartialEq, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConversionResult {
    /// SQL with `${pN}` parameter references.
    pub sql: String,
    pub parameters: Vec<Parameter>,
}

/// Converts audience expressions into parameterized SQL.
///
/// The catalog is shared and immutable; the converter instance itself is
/// single-conversion-at-a-time.
pub struct SqlConverter {
    catalog: Arc<MappingCatalog>,
    listener: Box<dyn AugmentationListener + Send>,
    contains_policy: ContainsPolicy,
    id_name: String,
    base_combination_cap: usize,
    initial_variables: HashMap<String, String>,
    initial_directives: ConversionFlags,
}

impl SqlConverter {
    pub fn new(catalog: Arc<MappingCatalog>) -> Self {
        Self::with_listener(catalog, Box::new(NoAugmentation))
    }

    pub fn with_listener(
        catalog: Arc<MappingCatalog>,
        listener: Box<dyn AugmentationListener + Send>,
    ) -> Self {
        Self {
            catalog,
            listener,
            contains_policy: ContainsPolicy::default(),
            id_name: "ID".to_string(),
            base_combination_cap: DEFAULT_BASE_COMBINATION_CAP,
            initial_variables: HashMap::new(),
            initial_directives: ConversionFlags::empty(),
        }
    }

    pub fn with_contains_policy(mut self, policy: ContainsPolicy) -> Self {
        self.contains_policy = policy;
        self
    }

    /// Output name of the id column (`ID` by default).
    pub fn with_id_name(mut self, name: impl Into<String>) -> Self {
        self.id_name = name.into();
        self
    }

    pub fn with_base_combination_cap(mut self, cap: usize) -> Self {
        self.base_combination_cap = cap.max(1);
        self
    }

    pub fn with_initial_variable(
        mut self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.initial_variables.insert(name.into(), value.into());
        self
    }

    pub fn with_initial_directives(mut self, directives: ConversionFlags) -> Self {
        self.initial_directives = directives.directives();
        self
    }

    /// Converts one expression. Per-run state is freshly created from the
    /// immutable templates, so repeated calls never leak state into each
    /// other.
    pub fn convert(
        &mut self,
        request: &ConversionRequest,
    ) -> Result<ConversionResult, ConversionError> {
        self.convert_inner(request)
            .map_err(|err| err.with_expression_context(&request.expression))
    }

    fn convert_inner(
        &mut self,
        request: &ConversionRequest,
    ) -> Result<ConversionResult, ConversionError> {
        let mut flags = self.initial_directives | request.directives.directives();
        let mut variables = self.initial_variables.clone();
        variables.extend(
            request
                .variables
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );

        let collapsed = collapse(&request.expression, &self.catalog)?;
        let tree = ExpressionTree::build(&collapsed)?;
        let stats = analyzer::analyze(&tree, &self.catalog)?;
        flags |= stats.hints;
        #[cfg(feature = "tracing")]
        debug!(?flags, "conversion flags resolved");

        let mut params = ParameterRegistry::new();
        let mut aliases = AliasRegistry::new();
        let all_ids_tables: BTreeSet<String> = self
            .catalog
            .tables_with_all_ids()
            .iter()
            .map(|t| t.name.clone())
            .collect();

        let where_root = {
            let mut conditions = ConditionBuilder::new(
                &self.catalog,
                &mut params,
                &mut variables,
                flags,
                self.contains_policy.clone(),
            );
            let mut skeleton = SkeletonBuilder {
                stats: &stats,
                conditions: &mut conditions,
                aliases: &mut aliases,
                all_ids_tables,
            };
            skeleton.build(tree.root())?
        };

        let plan = planner::plan(
            &self.catalog,
            &stats,
            &aliases,
            where_root,
            flags,
            self.base_combination_cap,
        )?;

        let emitter = Emitter {
            catalog: &*self.catalog,
            aliases: &aliases,
            plan: &plan,
            kind: request.query_kind,
            id_name: &self.id_name,
            flags,
            variables: &variables,
            params: &mut params,
            listener: self.listener.as_mut(),
            writer: SqlWriter::new(),
        };
        let sql = emitter.emit()?;

        Ok(ConversionResult {
            sql,
            parameters: params.into_parameters(),
        })
    }
}

impl ConversionError {
    /// Attaches the root expression to errors raised without one.
    pub(crate) fn with_expression_context(mut self, expression: &Expression) -> Self {
        if self.expression.is_none() {
            self.expression = Some(expression.to_string());
        }
        self
    }
}
