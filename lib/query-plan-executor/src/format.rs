use serde_json::{Map, Value};

use quilt_query_planner::ast::selection_item::SelectionItem;
use quilt_query_planner::ast::selection_set::SelectionSet;
use quilt_query_planner::schema::metadata::SchemaMetadata;

use crate::json_writer::write_escaped_string;

const TYPENAME_FIELD: &str = "__typename";

/// Serializes the `data` tree against the client selection set: object keys
/// appear in selection order under their aliases, fragments are inlined and
/// filtered by `__typename`, and anything the client did not request (the
/// `_id`/`_result`/`_<n>` bookkeeping keys included) is never written.
pub fn format_response_body(
    metadata: &SchemaMetadata,
    root_type: &str,
    selection_set: &SelectionSet,
    data: &Value,
) -> String {
    let mut out = String::with_capacity(1024);
    write_value(&mut out, metadata, Some(root_type), selection_set, data);
    out
}

fn write_value(
    out: &mut String,
    metadata: &SchemaMetadata,
    type_name: Option<&str>,
    selection_set: &SelectionSet,
    value: &Value,
) {
    match value {
        Value::Array(elements) => {
            out.push('[');
            for (index, element) in elements.iter().enumerate() {
                if index > 0 {
                    out.push(',');
                }
                write_value(out, metadata, type_name, selection_set, element);
            }
            out.push(']');
        }
        Value::Object(object) if !selection_set.is_empty() => {
            write_object(out, metadata, type_name, selection_set, object);
        }
        // Leaves (and custom scalars with object values) pass through as-is.
        other => write_raw(out, other),
    }
}

fn write_object(
    out: &mut String,
    metadata: &SchemaMetadata,
    static_type: Option<&str>,
    selection_set: &SelectionSet,
    object: &Map<String, Value>,
) {
    let type_name = object
        .get(TYPENAME_FIELD)
        .and_then(Value::as_str)
        .or(static_type);

    out.push('{');
    let mut first = true;
    write_object_items(out, metadata, type_name, selection_set, object, &mut first);
    out.push('}');
}

fn write_object_items(
    out: &mut String,
    metadata: &SchemaMetadata,
    type_name: Option<&str>,
    selection_set: &SelectionSet,
    object: &Map<String, Value>,
    first: &mut bool,
) {
    for item in &selection_set.items {
        match item {
            SelectionItem::Field(field) => {
                if !*first {
                    out.push(',');
                }
                *first = false;
                write_escaped_string(out, field.response_key());
                out.push(':');

                if field.name == TYPENAME_FIELD {
                    match object
                        .get(TYPENAME_FIELD)
                        .and_then(Value::as_str)
                        .or(type_name)
                    {
                        Some(type_name) => write_escaped_string(out, type_name),
                        None => out.push_str("null"),
                    }
                    continue;
                }

                match object.get(field.response_key()) {
                    Some(value) => {
                        let field_type = type_name.and_then(|type_name| {
                            metadata
                                .field_type(type_name, &field.name)
                                .map(|type_node| type_node.inner_name())
                        });
                        write_value(out, metadata, field_type, &field.selections, value);
                    }
                    None => out.push_str("null"),
                }
            }
            SelectionItem::InlineFragment(fragment) => {
                if fragment_applies(metadata, type_name, &fragment.type_condition) {
                    write_object_items(
                        out,
                        metadata,
                        type_name,
                        &fragment.selections,
                        object,
                        first,
                    );
                }
            }
            SelectionItem::FragmentSpread(spread) => {
                if fragment_applies(metadata, type_name, &spread.type_condition) {
                    write_object_items(out, metadata, type_name, &spread.selections, object, first);
                }
            }
        }
    }
}

/// With a known object type the condition must hold; without one (an
/// introspection subtree, say) the fragment applies unconditionally.
fn fragment_applies(
    metadata: &SchemaMetadata,
    type_name: Option<&str>,
    type_condition: &str,
) -> bool {
    match type_name {
        Some(type_name) => metadata.entity_satisfies_type_condition(type_name, type_condition),
        None => true,
    }
}

fn write_raw(out: &mut String, value: &Value) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(true) => out.push_str("true"),
        Value::Bool(false) => out.push_str("false"),
        Value::Number(number) => out.push_str(&number.to_string()),
        Value::String(string) => write_escaped_string(out, string),
        // Custom scalar values keep their own shape.
        other => out.push_str(&other.to_string()),
    }
}
