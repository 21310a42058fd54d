use serde::{Serialize, Serializer};

use crate::ast::operation::{OperationKind, VariableDefinition};
use crate::ast::selection_set::SelectionSet;

/// One sub-query against one backend, immutable once planned.
///
/// `insertion_point` is the path of response keys from the response root to
/// the objects this step's output must be grafted onto; it is empty for root
/// steps. `then` lists the steps that need this step's boundary IDs.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryPlanStep {
    pub service_url: String,
    pub service_name: String,
    pub parent_type: String,
    #[serde(serialize_with = "serialize_selection_set_as_source")]
    pub selection_set: SelectionSet,
    pub insertion_point: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub then: Vec<QueryPlanStep>,
}

/// A forest of root steps plus the introspection selection resolved locally.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryPlan {
    pub operation_kind: OperationKind,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub variable_definitions: Vec<VariableDefinition>,
    pub root_steps: Vec<QueryPlanStep>,
    #[serde(
        skip_serializing_if = "SelectionSet::is_empty",
        serialize_with = "serialize_selection_set_as_source"
    )]
    pub introspection_selection: SelectionSet,
}

impl QueryPlan {
    pub fn is_empty(&self) -> bool {
        self.root_steps.is_empty() && self.introspection_selection.is_empty()
    }
}

fn serialize_selection_set_as_source<S: Serializer>(
    selection_set: &SelectionSet,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&selection_set.to_string())
}
