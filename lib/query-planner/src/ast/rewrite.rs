use std::collections::HashMap;

use graphql_parser::query::{
    Definition, Directive, FragmentDefinition, OperationDefinition as ParserOperation, Selection,
    SelectionSet as ParserSelectionSet, TypeCondition, Value as ParserValue,
};
use serde_json::{Map as JsonMap, Value as JsonValue};

use super::operation::{OperationDefinition, OperationKind, VariableDefinition};
use super::selection_item::SelectionItem;
use super::selection_set::{
    FieldSelection, FragmentSpreadSelection, InlineFragmentSelection, SelectionSet,
};
use super::value::Value;
use crate::schema::type_node::TypeNode;

#[derive(Debug, thiserror::Error)]
pub enum RewriteError {
    #[error("document contains no executable operation")]
    MissingOperation,
    #[error("operation '{0}' not found in document")]
    OperationNotFound(String),
    #[error("unknown fragment '{0}'")]
    UnknownFragment(String),
    #[error("fragment '{0}' spreads itself, directly or transitively")]
    CircularFragmentSpread(String),
    #[error("@{0}: argument 'if' is missing or not a boolean")]
    MalformedConditionalDirective(String),
}

/// Rewrites a parsed client operation into the owned AST the planner works
/// on: `@skip`/`@include` guards are evaluated against the request variables,
/// the directives are stripped from survivors, and named fragments are
/// resolved into their spreads. The parsed document is left untouched.
pub fn rewrite_operation<'a>(
    document: &graphql_parser::query::Document<'a, String>,
    operation_name: Option<&str>,
    variables: &JsonMap<String, JsonValue>,
) -> Result<OperationDefinition, RewriteError> {
    let fragments: HashMap<&str, &FragmentDefinition<'a, String>> = document
        .definitions
        .iter()
        .filter_map(|def| match def {
            Definition::Fragment(fragment) => Some((fragment.name.as_str(), fragment)),
            _ => None,
        })
        .collect();

    let operation = select_operation(document, operation_name)?;

    let ctx = RewriteContext {
        fragments,
        variables,
    };
    let mut spread_stack = Vec::new();

    let (kind, name, variable_definitions, selection_set) = match operation {
        ParserOperation::SelectionSet(selection_set) => {
            (OperationKind::Query, None, Vec::new(), selection_set)
        }
        ParserOperation::Query(query) => (
            OperationKind::Query,
            query.name.clone(),
            convert_variable_definitions(&query.variable_definitions),
            &query.selection_set,
        ),
        ParserOperation::Mutation(mutation) => (
            OperationKind::Mutation,
            mutation.name.clone(),
            convert_variable_definitions(&mutation.variable_definitions),
            &mutation.selection_set,
        ),
        ParserOperation::Subscription(subscription) => (
            OperationKind::Subscription,
            subscription.name.clone(),
            convert_variable_definitions(&subscription.variable_definitions),
            &subscription.selection_set,
        ),
    };

    Ok(OperationDefinition {
        name,
        operation_kind: kind,
        variable_definitions,
        selection_set: ctx.rewrite_selection_set(selection_set, &mut spread_stack)?,
    })
}

fn select_operation<'d, 'a>(
    document: &'d graphql_parser::query::Document<'a, String>,
    operation_name: Option<&str>,
) -> Result<&'d ParserOperation<'a, String>, RewriteError> {
    let mut operations = document.definitions.iter().filter_map(|def| match def {
        Definition::Operation(op) => Some(op),
        _ => None,
    });

    match operation_name {
        Some(wanted) => operations
            .find(|op| match op {
                ParserOperation::Query(q) => q.name.as_deref() == Some(wanted),
                ParserOperation::Mutation(m) => m.name.as_deref() == Some(wanted),
                ParserOperation::Subscription(s) => s.name.as_deref() == Some(wanted),
                ParserOperation::SelectionSet(_) => false,
            })
            .ok_or_else(|| RewriteError::OperationNotFound(wanted.to_string())),
        None => operations.next().ok_or(RewriteError::MissingOperation),
    }
}

fn convert_variable_definitions(
    definitions: &[graphql_parser::query::VariableDefinition<'_, String>],
) -> Vec<VariableDefinition> {
    definitions
        .iter()
        .map(|def| VariableDefinition {
            name: def.name.clone(),
            variable_type: TypeNode::from(&def.var_type),
            default_value: def.default_value.as_ref().map(Value::from),
        })
        .collect()
}

struct RewriteContext<'d, 'a> {
    fragments: HashMap<&'d str, &'d FragmentDefinition<'a, String>>,
    variables: &'d JsonMap<String, JsonValue>,
}

impl<'d, 'a> RewriteContext<'d, 'a> {
    fn rewrite_selection_set(
        &self,
        selection_set: &ParserSelectionSet<'a, String>,
        spread_stack: &mut Vec<String>,
    ) -> Result<SelectionSet, RewriteError> {
        let mut items = Vec::with_capacity(selection_set.items.len());

        for selection in &selection_set.items {
            match selection {
                Selection::Field(field) => {
                    if !self.should_keep(&field.directives)? {
                        continue;
                    }
                    items.push(SelectionItem::Field(FieldSelection {
                        name: field.name.clone(),
                        alias: field.alias.clone(),
                        arguments: field
                            .arguments
                            .iter()
                            .map(|(name, value)| (name.clone(), Value::from(value)))
                            .collect(),
                        selections: self.rewrite_selection_set(&field.selection_set, spread_stack)?,
                    }));
                }
                Selection::InlineFragment(fragment) => {
                    if !self.should_keep(&fragment.directives)? {
                        continue;
                    }
                    let selections =
                        self.rewrite_selection_set(&fragment.selection_set, spread_stack)?;
                    match &fragment.type_condition {
                        Some(TypeCondition::On(type_condition)) => {
                            items.push(SelectionItem::InlineFragment(InlineFragmentSelection {
                                type_condition: type_condition.clone(),
                                selections,
                            }));
                        }
                        // A condition-less fragment only groups directives;
                        // once the guards are evaluated it dissolves.
                        None => items.extend(selections.items),
                    }
                }
                Selection::FragmentSpread(spread) => {
                    if !self.should_keep(&spread.directives)? {
                        continue;
                    }
                    let fragment = self
                        .fragments
                        .get(spread.fragment_name.as_str())
                        .ok_or_else(|| {
                            RewriteError::UnknownFragment(spread.fragment_name.clone())
                        })?;
                    if spread_stack.contains(&spread.fragment_name) {
                        return Err(RewriteError::CircularFragmentSpread(
                            spread.fragment_name.clone(),
                        ));
                    }
                    spread_stack.push(spread.fragment_name.clone());
                    let selections =
                        self.rewrite_selection_set(&fragment.selection_set, spread_stack)?;
                    spread_stack.pop();

                    let TypeCondition::On(type_condition) = &fragment.type_condition;
                    items.push(SelectionItem::FragmentSpread(FragmentSpreadSelection {
                        name: spread.fragment_name.clone(),
                        type_condition: type_condition.clone(),
                        selections,
                    }));
                }
            }
        }

        Ok(SelectionSet { items })
    }

    fn should_keep(&self, directives: &[Directive<'a, String>]) -> Result<bool, RewriteError> {
        if let Some(skip) = self.resolve_condition("skip", directives)? {
            if skip {
                return Ok(false);
            }
        }
        if let Some(include) = self.resolve_condition("include", directives)? {
            if !include {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn resolve_condition(
        &self,
        directive_name: &str,
        directives: &[Directive<'a, String>],
    ) -> Result<Option<bool>, RewriteError> {
        let directive = match directives.iter().find(|d| d.name == directive_name) {
            Some(directive) => directive,
            None => return Ok(None),
        };
        let condition = directive
            .arguments
            .iter()
            .find_map(|(name, value)| (name == "if").then_some(value))
            .ok_or_else(|| {
                RewriteError::MalformedConditionalDirective(directive_name.to_string())
            })?;
        match condition {
            ParserValue::Boolean(b) => Ok(Some(*b)),
            ParserValue::Variable(variable_name) => {
                match self.variables.get(variable_name.as_str()) {
                    Some(JsonValue::Bool(b)) => Ok(Some(*b)),
                    _ => Err(RewriteError::MalformedConditionalDirective(
                        directive_name.to_string(),
                    )),
                }
            }
            _ => Err(RewriteError::MalformedConditionalDirective(
                directive_name.to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn variables(value: JsonValue) -> JsonMap<String, JsonValue> {
        match value {
            JsonValue::Object(map) => map,
            _ => panic!("expected an object"),
        }
    }

    fn rewrite(query: &str, vars: JsonValue) -> OperationDefinition {
        let document = graphql_parser::parse_query::<String>(query).unwrap();
        rewrite_operation(&document, None, &variables(vars)).unwrap()
    }

    #[test]
    fn drops_skipped_fields_and_strips_directives() {
        let op = rewrite(
            r#"{ gizmos { id color @skip(if: true) name @skip(if: false) } }"#,
            json!({}),
        );
        assert_eq!(op.to_string(), "query {gizmos{id name}}");
    }

    #[test]
    fn resolves_guards_against_variables() {
        let op = rewrite(
            r#"query($withColor: Boolean!) { gizmos { id color @include(if: $withColor) } }"#,
            json!({ "withColor": false }),
        );
        assert_eq!(
            op.to_string(),
            "query($withColor: Boolean!) {gizmos{id}}"
        );
    }

    #[test]
    fn resolves_fragment_spreads_with_guards_inside() {
        let op = rewrite(
            r#"
            fragment GizmoDetails on Gizmo { id color @skip(if: true) }
            { gizmos { ...GizmoDetails } }
            "#,
            json!({}),
        );
        let SelectionItem::Field(gizmos) = &op.selection_set.items[0] else {
            panic!("expected a field");
        };
        let SelectionItem::FragmentSpread(spread) = &gizmos.selections.items[0] else {
            panic!("expected a fragment spread");
        };
        assert_eq!(spread.name, "GizmoDetails");
        assert_eq!(spread.type_condition, "Gizmo");
        assert_eq!(spread.selections.to_string(), "{id}");
    }

    #[test]
    fn skipped_inline_fragment_is_removed() {
        let op = rewrite(
            r#"{ critters { id ... on Gizmo @skip(if: true) { color } } }"#,
            json!({}),
        );
        assert_eq!(op.to_string(), "query {critters{id}}");
    }

    #[test]
    fn unknown_fragment_is_an_error() {
        let document = graphql_parser::parse_query::<String>("{ gizmos { ...Missing } }").unwrap();
        let err = rewrite_operation(&document, None, &JsonMap::new()).unwrap_err();
        assert!(matches!(err, RewriteError::UnknownFragment(name) if name == "Missing"));
    }

    #[test]
    fn missing_condition_variable_is_an_error() {
        let document =
            graphql_parser::parse_query::<String>("{ gizmos @skip(if: $nope) { id } }").unwrap();
        let err = rewrite_operation(&document, None, &JsonMap::new()).unwrap_err();
        assert!(matches!(
            err,
            RewriteError::MalformedConditionalDirective(name) if name == "skip"
        ));
    }
}
