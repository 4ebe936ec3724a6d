//! The per-conversion parameter registry.
//!
//! Every literal that ends up in the emitted SQL is bound as a named
//! parameter. The template references parameters as `${pN}`; the execution
//! layer binds them by name using the carried SQL type.

use crate::types::{AdlType, SqlType};
use schemars::JsonSchema;
use serde::Serialize;

/// A bound parameter of the emitted SQL template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Parameter {
    /// Ordinal id, assigned in registration order starting at 1.
    pub id: u32,
    /// Name referenced by the template (`p1`, `p2`, ...).
    pub name: String,
    /// The argument this value belongs to, if any (filter values carry the
    /// argument they disambiguate).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arg: Option<String>,
    /// Declared type of the argument, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adl_type: Option<AdlType>,
    /// Value in string form, normalized for the target SQL type.
    pub value: String,
    /// SQL type the execution layer should bind with.
    pub sql_type: SqlType,
}

/// Registry owned by a single conversion run.
#[derive(Debug, Default)]
pub struct ParameterRegistry {
    params: Vec<Parameter>,
}

impl ParameterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a parameter and returns its template placeholder (`${pN}`).
    pub fn register(
        &mut self,
        arg: Option<&str>,
        adl_type: Option<AdlType>,
        value: impl Into<String>,
        sql_type: SqlType,
    ) -> String {
        let id = self.params.len() as u32 + 1;
        let name = format!("p{id}");
        let placeholder = format!("${{{name}}}");
        self.params.push(Parameter {
            id,
            name,
            arg: arg.map(str::to_string),
            adl_type,
            value: value.into(),
            sql_type,
        });
        placeholder
    }

    pub fn parameters(&self) -> &[Parameter] {
        &self.params
    }

    pub fn into_parameters(self) -> Vec<Parameter> {
        self.params
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }
}
