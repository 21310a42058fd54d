use serde_json::{Map, Value};

use quilt_query_planner::ast::selection_item::SelectionItem;
use quilt_query_planner::ast::selection_set::SelectionSet;
use quilt_query_planner::schema::metadata::SchemaMetadata;
use quilt_query_planner::schema::type_node::TypeNode;

use crate::execution_result::GraphQLError;

pub const FIELD_FAILED_TO_RESOLVE: &str = "field failed to resolve";

const TYPENAME_FIELD: &str = "__typename";

#[derive(Debug, thiserror::Error)]
pub enum BubbleUpError {
    /// A non-null violation reached the response root; the carried errors are
    /// the field-level violations collected on the way.
    #[error("a non-null field resolved to null all the way to the response root")]
    NullBubbledToRoot(Vec<GraphQLError>),
}

/// Enforces non-null obligations over the merged tree, in place.
///
/// A null under a non-null field records an error at the alias path and
/// bubbles: nullable ancestors absorb the bubble by becoming null, non-null
/// ancestors pass it on. List elements bubble individually unless the element
/// type itself is non-null, in which case the whole list bubbles.
pub fn bubble_up_null_values_in_place(
    metadata: &SchemaMetadata,
    root_type: &str,
    selection_set: &SelectionSet,
    data: &mut Value,
) -> Result<Vec<GraphQLError>, BubbleUpError> {
    let mut errors = Vec::new();
    let mut path = Vec::new();
    let bubbled = match data {
        Value::Object(object) => walk_object(
            metadata,
            root_type,
            selection_set,
            object,
            &mut path,
            &mut errors,
        ),
        _ => false,
    };
    if bubbled {
        Err(BubbleUpError::NullBubbledToRoot(errors))
    } else {
        Ok(errors)
    }
}

fn walk_object(
    metadata: &SchemaMetadata,
    static_type: &str,
    selection_set: &SelectionSet,
    object: &mut Map<String, Value>,
    path: &mut Vec<Value>,
    errors: &mut Vec<GraphQLError>,
) -> bool {
    let type_name = object
        .get(TYPENAME_FIELD)
        .and_then(Value::as_str)
        .unwrap_or(static_type)
        .to_string();

    for item in &selection_set.items {
        match item {
            SelectionItem::Field(field) => {
                // Meta fields are never null-checked.
                if field.name.starts_with("__") {
                    continue;
                }
                let field_type = match metadata
                    .field_type(&type_name, &field.name)
                    .or_else(|| metadata.field_type(static_type, &field.name))
                {
                    Some(field_type) => field_type,
                    // Unknown type, e.g. under an introspection subtree.
                    None => continue,
                };
                let key = field.response_key().to_string();
                path.push(Value::String(key.clone()));
                let bubbled = match object.get_mut(&key) {
                    Some(value) => walk_value(
                        metadata,
                        field_type,
                        &field.selections,
                        value,
                        path,
                        errors,
                    ),
                    // A field nothing resolved behaves like an explicit null.
                    None => {
                        if field_type.is_non_null() {
                            errors.push(unexpected_null(path));
                            true
                        } else {
                            false
                        }
                    }
                };
                path.pop();
                if bubbled {
                    if field_type.is_non_null() {
                        return true;
                    }
                    object.insert(key, Value::Null);
                }
            }
            SelectionItem::InlineFragment(fragment) => {
                if metadata.entity_satisfies_type_condition(&type_name, &fragment.type_condition)
                    && walk_object(
                        metadata,
                        &fragment.type_condition,
                        &fragment.selections,
                        object,
                        path,
                        errors,
                    )
                {
                    return true;
                }
            }
            SelectionItem::FragmentSpread(spread) => {
                if metadata.entity_satisfies_type_condition(&type_name, &spread.type_condition)
                    && walk_object(
                        metadata,
                        &spread.type_condition,
                        &spread.selections,
                        object,
                        path,
                        errors,
                    )
                {
                    return true;
                }
            }
        }
    }

    false
}

fn walk_value(
    metadata: &SchemaMetadata,
    type_node: &TypeNode,
    selections: &SelectionSet,
    value: &mut Value,
    path: &mut Vec<Value>,
    errors: &mut Vec<GraphQLError>,
) -> bool {
    match type_node {
        TypeNode::NonNull(inner) => {
            if value.is_null() {
                errors.push(unexpected_null(path));
                return true;
            }
            walk_value(metadata, inner, selections, value, path, errors)
        }
        TypeNode::List(element_type) => {
            let Value::Array(elements) = value else {
                return false;
            };
            for (index, element) in elements.iter_mut().enumerate() {
                path.push(Value::Number(index.into()));
                let bubbled =
                    walk_value(metadata, element_type, selections, element, path, errors);
                path.pop();
                if bubbled {
                    if element_type.is_non_null() {
                        return true;
                    }
                    *element = Value::Null;
                }
            }
            false
        }
        TypeNode::Named(name) => {
            if selections.is_empty() {
                return false;
            }
            match value {
                Value::Object(object) => {
                    walk_object(metadata, name, selections, object, path, errors)
                }
                _ => false,
            }
        }
    }
}

fn unexpected_null(path: &[Value]) -> GraphQLError {
    GraphQLError::new(FIELD_FAILED_TO_RESOLVE).with_path(path.to_vec())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use quilt_query_planner::ast::rewrite::rewrite_operation;
    use quilt_query_planner::parse_schema;

    use super::*;

    const GIZMOS_SDL: &str = r#"
    type Gizmo {
        id: ID!
        color: String!
        owner: Owner
    }

    type Owner {
        id: ID!
        name: String!
    }

    type Query {
        gizmos: [Gizmo!]!
    }
    "#;

    fn bubble(
        sdl: &str,
        query: &str,
        data: &mut Value,
    ) -> Result<Vec<GraphQLError>, BubbleUpError> {
        let schema = parse_schema(sdl).unwrap();
        let metadata = SchemaMetadata::new(&schema);
        let document = graphql_parser::parse_query::<String>(query).unwrap();
        let operation = rewrite_operation(&document, None, &serde_json::Map::new()).unwrap();
        bubble_up_null_values_in_place(&metadata, "Query", &operation.selection_set, data)
    }

    #[test]
    fn no_nulls_no_errors() {
        let mut data = json!({
            "gizmos": [ { "id": "GIZMO1" }, { "id": "GIZMO2" }, { "id": "GIZMO3" } ]
        });
        let errors = bubble(GIZMOS_SDL, "{ gizmos { id } }", &mut data).unwrap();
        assert!(errors.is_empty());
    }

    #[test]
    fn non_null_violation_bubbles_to_root() {
        let mut data = json!({
            "gizmos": [
                { "id": "GIZMO1", "color": "RED" },
                { "id": "GIZMO2", "color": "GREEN" },
                { "id": "GIZMO3", "color": null }
            ]
        });
        let err = bubble(GIZMOS_SDL, "{ gizmos { id color } }", &mut data).unwrap_err();
        let BubbleUpError::NullBubbledToRoot(errors) = err;
        assert_eq!(
            errors,
            vec![GraphQLError::new(FIELD_FAILED_TO_RESOLVE)
                .with_path(vec![json!("gizmos"), json!(2), json!("color")])]
        );
    }

    #[test]
    fn nullable_list_absorbs_the_bubble() {
        let sdl = GIZMOS_SDL.replace("gizmos: [Gizmo!]!", "gizmos: [Gizmo!]");
        let mut data = json!({
            "gizmos": [
                { "id": "GIZMO1", "color": "RED" },
                { "id": "GIZMO2", "color": "GREEN" },
                { "id": "GIZMO3", "color": null }
            ]
        });
        let errors = bubble(&sdl, "{ gizmos { id color } }", &mut data).unwrap();
        assert_eq!(
            errors,
            vec![GraphQLError::new(FIELD_FAILED_TO_RESOLVE)
                .with_path(vec![json!("gizmos"), json!(2), json!("color")])]
        );
        assert_eq!(data, json!({ "gizmos": null }));
    }

    #[test]
    fn nullable_element_absorbs_the_bubble_at_its_index() {
        let sdl = GIZMOS_SDL.replace("gizmos: [Gizmo!]!", "gizmos: [Gizmo]!");
        let mut data = json!({
            "gizmos": [
                { "id": "GIZMO1", "color": "RED" },
                { "id": "GIZMO3", "color": null },
                { "id": "GIZMO2", "color": "GREEN" }
            ]
        });
        let errors = bubble(&sdl, "{ gizmos { id color } }", &mut data).unwrap();
        assert_eq!(
            errors,
            vec![GraphQLError::new(FIELD_FAILED_TO_RESOLVE)
                .with_path(vec![json!("gizmos"), json!(1), json!("color")])]
        );
        assert_eq!(
            data,
            json!({
                "gizmos": [
                    { "id": "GIZMO1", "color": "RED" },
                    null,
                    { "id": "GIZMO2", "color": "GREEN" }
                ]
            })
        );
    }

    #[test]
    fn nullable_field_with_null_is_not_a_violation() {
        let sdl = GIZMOS_SDL.replace("color: String!", "color: String");
        let mut data = json!({
            "gizmos": [
                { "id": "GIZMO1", "color": "RED" },
                { "id": "GIZMO3", "color": null }
            ]
        });
        let before = data.clone();
        let errors = bubble(&sdl, "{ gizmos { id color } }", &mut data).unwrap();
        assert!(errors.is_empty());
        assert_eq!(data, before);
    }

    #[test]
    fn works_through_fragment_spreads() {
        let sdl = GIZMOS_SDL.replace("gizmos: [Gizmo!]!", "gizmos: [Gizmo]!");
        let mut data = json!({
            "gizmos": [
                { "id": "GIZMO1", "color": "RED", "__typename": "Gizmo" },
                { "id": "GIZMO2", "color": "GREEN", "__typename": "Gizmo" },
                { "id": "GIZMO3", "color": null, "__typename": "Gizmo" }
            ]
        });
        let errors = bubble(
            &sdl,
            r#"
            fragment GizmoDetails on Gizmo { id color __typename }
            { gizmos { ...GizmoDetails } }
            "#,
            &mut data,
        )
        .unwrap();
        assert_eq!(
            errors,
            vec![GraphQLError::new(FIELD_FAILED_TO_RESOLVE)
                .with_path(vec![json!("gizmos"), json!(2), json!("color")])]
        );
        assert_eq!(data["gizmos"][2], json!(null));
    }

    const CRITTERS_SDL: &str = r#"
    interface Critter {
        id: ID!
    }

    type Gizmo implements Critter {
        id: ID!
        color: String!
    }

    type Gremlin implements Critter {
        id: ID!
        name: String!
    }

    type Query {
        critters: [Critter]!
    }
    "#;

    #[test]
    fn inline_fragments_apply_only_to_matching_typenames() {
        let mut data = json!({
            "critters": [
                { "id": "GIZMO1", "color": "RED", "__typename": "Gizmo" },
                { "id": "GREMLIN1", "name": "Spikey", "__typename": "Gremlin" },
                { "id": "GIZMO2", "color": null, "__typename": "Gizmo" }
            ]
        });
        let errors = bubble(
            CRITTERS_SDL,
            r#"
            {
                critters {
                    id
                    ... on Gizmo { color __typename }
                    ... on Gremlin { name __typename }
                }
            }
            "#,
            &mut data,
        )
        .unwrap();
        assert_eq!(
            errors,
            vec![GraphQLError::new(FIELD_FAILED_TO_RESOLVE)
                .with_path(vec![json!("critters"), json!(2), json!("color")])]
        );
        assert_eq!(data["critters"][1]["name"], json!("Spikey"));
        assert_eq!(data["critters"][2], json!(null));
    }
}
