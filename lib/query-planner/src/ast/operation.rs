use std::fmt::Display;

use serde::{Deserialize, Serialize};

use crate::schema::type_node::TypeNode;

use super::selection_set::SelectionSet;
use super::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Query,
    Mutation,
    Subscription,
}

impl Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OperationKind::Query => write!(f, "query"),
            OperationKind::Mutation => write!(f, "mutation"),
            OperationKind::Subscription => write!(f, "subscription"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariableDefinition {
    pub name: String,
    pub variable_type: TypeNode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_value: Option<Value>,
}

impl Display for VariableDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.default_value {
            Some(default_value) => write!(
                f,
                "${}: {} = {}",
                self.name, self.variable_type, default_value
            ),
            None => write!(f, "${}: {}", self.name, self.variable_type),
        }
    }
}

/// A client operation after the `@skip`/`@include` rewrite: guards are already
/// evaluated, the directives are gone, fragment spreads carry their
/// definitions. See [`crate::ast::rewrite`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationDefinition {
    pub name: Option<String>,
    pub operation_kind: OperationKind,
    pub variable_definitions: Vec<VariableDefinition>,
    pub selection_set: SelectionSet,
}

impl Display for OperationDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.operation_kind)?;
        if let Some(name) = &self.name {
            write!(f, " {}", name)?;
        }
        if !self.variable_definitions.is_empty() {
            let defs: Vec<String> = self
                .variable_definitions
                .iter()
                .map(|def| def.to_string())
                .collect();
            write!(f, "({})", defs.join(", "))?;
        }
        write!(f, " {}", self.selection_set)
    }
}
