use std::collections::HashMap;

use graphql_parser::schema::{
    Definition, Directive, DirectiveDefinition, Document, EnumValue, Field, InputValue, Type,
    TypeDefinition,
};
use serde_json::{json, Map as JsonMap, Value as JsonValue};

use quilt_query_planner::ast::selection_item::SelectionItem;
use quilt_query_planner::ast::selection_set::{FieldSelection, SelectionSet};
use quilt_query_planner::ast::value::Value as AstValue;
use quilt_query_planner::schema::metadata::SchemaMetadata;

/// Resolves the `__schema`/`__type` selection split off by the planner
/// against the merged (possibly authorization-filtered) schema. The output is
/// keyed by response alias and feeds the pipeline as a synthetic execution
/// result at insertion point `[]`.
pub fn resolve_introspection_fields(
    schema: &Document<'static, String>,
    metadata: &SchemaMetadata,
    selection_set: &SelectionSet,
    variables: &JsonMap<String, JsonValue>,
) -> JsonValue {
    let resolver = IntrospectionResolver::new(schema, metadata, variables);
    let mut result = JsonMap::new();
    for field in fields_of(selection_set) {
        match field.name.as_str() {
            "__schema" => {
                result.insert(
                    field.response_key().to_string(),
                    resolver.resolve_schema(&field.selections),
                );
            }
            "__type" => {
                result.insert(
                    field.response_key().to_string(),
                    resolver.resolve_type_field(field),
                );
            }
            _ => {}
        }
    }
    JsonValue::Object(result)
}

struct IntrospectionResolver<'a> {
    metadata: &'a SchemaMetadata,
    variables: &'a JsonMap<String, JsonValue>,
    types: HashMap<&'a str, &'a TypeDefinition<'static, String>>,
    /// Definition order of the SDL, for a stable `__schema { types }` list.
    ordered_types: Vec<&'a TypeDefinition<'static, String>>,
    directives: Vec<&'a DirectiveDefinition<'static, String>>,
}

impl<'a> IntrospectionResolver<'a> {
    fn new(
        schema: &'a Document<'static, String>,
        metadata: &'a SchemaMetadata,
        variables: &'a JsonMap<String, JsonValue>,
    ) -> Self {
        let mut types = HashMap::new();
        let mut ordered_types = Vec::new();
        let mut directives = Vec::new();
        for definition in &schema.definitions {
            match definition {
                Definition::TypeDefinition(type_def) => {
                    types.insert(type_definition_name(type_def), type_def);
                    ordered_types.push(type_def);
                }
                Definition::DirectiveDefinition(directive_def) => {
                    directives.push(directive_def);
                }
                _ => {}
            }
        }
        IntrospectionResolver {
            metadata,
            variables,
            types,
            ordered_types,
            directives,
        }
    }

    fn resolve_type_field(&self, field: &FieldSelection) -> JsonValue {
        let name = field
            .arguments
            .iter()
            .find_map(|(name, value)| (name == "name").then_some(value))
            .and_then(|value| self.string_argument(value));
        match name {
            Some(name) => self.resolve_named_type(&name, &field.selections),
            None => JsonValue::Null,
        }
    }

    fn resolve_schema(&self, selections: &SelectionSet) -> JsonValue {
        let mut result = JsonMap::new();
        for field in fields_of(selections) {
            let value = match field.name.as_str() {
                "types" => JsonValue::Array(
                    self.ordered_types
                        .iter()
                        .map(|type_def| self.resolve_type_definition(type_def, &field.selections))
                        .collect(),
                ),
                "queryType" => {
                    self.resolve_named_type(&self.metadata.query_type, &field.selections)
                }
                "mutationType" => match &self.metadata.mutation_type {
                    Some(name) => self.resolve_named_type(name, &field.selections),
                    None => JsonValue::Null,
                },
                "subscriptionType" => match &self.metadata.subscription_type {
                    Some(name) => self.resolve_named_type(name, &field.selections),
                    None => JsonValue::Null,
                },
                "directives" => JsonValue::Array(
                    self.directives
                        .iter()
                        .map(|directive| self.resolve_directive(directive, &field.selections))
                        .collect(),
                ),
                "__typename" => json!("__Schema"),
                _ => JsonValue::Null,
            };
            result.insert(field.response_key().to_string(), value);
        }
        JsonValue::Object(result)
    }

    fn resolve_named_type(&self, name: &str, selections: &SelectionSet) -> JsonValue {
        match self.types.get(name) {
            Some(type_def) => self.resolve_type_definition(type_def, selections),
            // Built-in scalars are not part of the SDL document.
            None => self.resolve_synthetic_scalar(name, selections),
        }
    }

    fn resolve_synthetic_scalar(&self, name: &str, selections: &SelectionSet) -> JsonValue {
        let mut result = JsonMap::new();
        for field in fields_of(selections) {
            let value = match field.name.as_str() {
                "kind" => json!("SCALAR"),
                "name" => json!(name),
                "__typename" => json!("__Type"),
                _ => JsonValue::Null,
            };
            result.insert(field.response_key().to_string(), value);
        }
        JsonValue::Object(result)
    }

    fn resolve_type_definition(
        &self,
        type_def: &TypeDefinition<'static, String>,
        selections: &SelectionSet,
    ) -> JsonValue {
        let mut result = JsonMap::new();
        for field in fields_of(selections) {
            let value = match field.name.as_str() {
                "kind" => json!(type_kind(type_def)),
                "name" => json!(type_definition_name(type_def)),
                "description" => json_or_null(type_description(type_def)),
                "fields" => self.resolve_fields(type_def, field),
                "interfaces" => self.resolve_interfaces(type_def, &field.selections),
                "possibleTypes" => self.resolve_possible_types(type_def, &field.selections),
                "enumValues" => self.resolve_enum_values(type_def, field),
                "inputFields" => self.resolve_input_fields(type_def, &field.selections),
                "__typename" => json!("__Type"),
                _ => JsonValue::Null,
            };
            result.insert(field.response_key().to_string(), value);
        }
        JsonValue::Object(result)
    }

    fn resolve_fields(
        &self,
        type_def: &TypeDefinition<'static, String>,
        field: &FieldSelection,
    ) -> JsonValue {
        let fields = match type_def {
            TypeDefinition::Object(object_type) => &object_type.fields,
            TypeDefinition::Interface(interface_type) => &interface_type.fields,
            _ => return JsonValue::Null,
        };
        let include_deprecated = self.include_deprecated(field);
        JsonValue::Array(
            fields
                .iter()
                .filter(|type_field| {
                    include_deprecated || !is_deprecated(&type_field.directives)
                })
                .map(|type_field| self.resolve_field(type_field, &field.selections))
                .collect(),
        )
    }

    fn resolve_interfaces(
        &self,
        type_def: &TypeDefinition<'static, String>,
        selections: &SelectionSet,
    ) -> JsonValue {
        let interfaces = match type_def {
            TypeDefinition::Object(object_type) => &object_type.implements_interfaces,
            TypeDefinition::Interface(interface_type) => &interface_type.implements_interfaces,
            _ => return JsonValue::Null,
        };
        JsonValue::Array(
            interfaces
                .iter()
                .map(|name| self.resolve_named_type(name, selections))
                .collect(),
        )
    }

    fn resolve_possible_types(
        &self,
        type_def: &TypeDefinition<'static, String>,
        selections: &SelectionSet,
    ) -> JsonValue {
        let name = type_definition_name(type_def);
        match self.metadata.possible_types.get(name) {
            Some(members) => {
                let mut members: Vec<&String> = members.iter().collect();
                members.sort();
                JsonValue::Array(
                    members
                        .into_iter()
                        .map(|member| self.resolve_named_type(member, selections))
                        .collect(),
                )
            }
            None => JsonValue::Null,
        }
    }

    fn resolve_enum_values(
        &self,
        type_def: &TypeDefinition<'static, String>,
        field: &FieldSelection,
    ) -> JsonValue {
        let TypeDefinition::Enum(enum_type) = type_def else {
            return JsonValue::Null;
        };
        let include_deprecated = self.include_deprecated(field);
        JsonValue::Array(
            enum_type
                .values
                .iter()
                .filter(|value| include_deprecated || !is_deprecated(&value.directives))
                .map(|value| self.resolve_enum_value(value, &field.selections))
                .collect(),
        )
    }

    fn resolve_input_fields(
        &self,
        type_def: &TypeDefinition<'static, String>,
        selections: &SelectionSet,
    ) -> JsonValue {
        let TypeDefinition::InputObject(input_type) = type_def else {
            return JsonValue::Null;
        };
        JsonValue::Array(
            input_type
                .fields
                .iter()
                .map(|input_value| self.resolve_input_value(input_value, selections))
                .collect(),
        )
    }

    fn resolve_field(
        &self,
        type_field: &Field<'static, String>,
        selections: &SelectionSet,
    ) -> JsonValue {
        let mut result = JsonMap::new();
        for field in fields_of(selections) {
            let value = match field.name.as_str() {
                "name" => json!(type_field.name),
                "description" => json_or_null(type_field.description.as_deref()),
                "args" => JsonValue::Array(
                    type_field
                        .arguments
                        .iter()
                        .map(|argument| self.resolve_input_value(argument, &field.selections))
                        .collect(),
                ),
                "type" => self.resolve_type_reference(&type_field.field_type, &field.selections),
                "isDeprecated" => json!(is_deprecated(&type_field.directives)),
                "deprecationReason" => {
                    json_or_null(deprecation_reason(&type_field.directives))
                }
                "__typename" => json!("__Field"),
                _ => JsonValue::Null,
            };
            result.insert(field.response_key().to_string(), value);
        }
        JsonValue::Object(result)
    }

    fn resolve_input_value(
        &self,
        input_value: &InputValue<'static, String>,
        selections: &SelectionSet,
    ) -> JsonValue {
        let mut result = JsonMap::new();
        for field in fields_of(selections) {
            let value = match field.name.as_str() {
                "name" => json!(input_value.name),
                "description" => json_or_null(input_value.description.as_deref()),
                "type" => self.resolve_type_reference(&input_value.value_type, &field.selections),
                "defaultValue" => match &input_value.default_value {
                    Some(default_value) => json!(default_value.to_string()),
                    None => JsonValue::Null,
                },
                "__typename" => json!("__InputValue"),
                _ => JsonValue::Null,
            };
            result.insert(field.response_key().to_string(), value);
        }
        JsonValue::Object(result)
    }

    fn resolve_enum_value(
        &self,
        enum_value: &EnumValue<'static, String>,
        selections: &SelectionSet,
    ) -> JsonValue {
        let mut result = JsonMap::new();
        for field in fields_of(selections) {
            let value = match field.name.as_str() {
                "name" => json!(enum_value.name),
                "description" => json_or_null(enum_value.description.as_deref()),
                "isDeprecated" => json!(is_deprecated(&enum_value.directives)),
                "deprecationReason" => {
                    json_or_null(deprecation_reason(&enum_value.directives))
                }
                "__typename" => json!("__EnumValue"),
                _ => JsonValue::Null,
            };
            result.insert(field.response_key().to_string(), value);
        }
        JsonValue::Object(result)
    }

    fn resolve_directive(
        &self,
        directive: &DirectiveDefinition<'static, String>,
        selections: &SelectionSet,
    ) -> JsonValue {
        let mut result = JsonMap::new();
        for field in fields_of(selections) {
            let value = match field.name.as_str() {
                "name" => json!(directive.name),
                "description" => json_or_null(directive.description.as_deref()),
                "locations" => JsonValue::Array(
                    directive
                        .locations
                        .iter()
                        .map(|location| json!(location.as_str()))
                        .collect(),
                ),
                "args" => JsonValue::Array(
                    directive
                        .arguments
                        .iter()
                        .map(|argument| self.resolve_input_value(argument, &field.selections))
                        .collect(),
                ),
                "__typename" => json!("__Directive"),
                _ => JsonValue::Null,
            };
            result.insert(field.response_key().to_string(), value);
        }
        JsonValue::Object(result)
    }

    /// `NON_NULL` and `LIST` wrappers first, then the named type.
    fn resolve_type_reference(
        &self,
        type_reference: &Type<'static, String>,
        selections: &SelectionSet,
    ) -> JsonValue {
        match type_reference {
            Type::NamedType(name) => self.resolve_named_type(name, selections),
            Type::NonNullType(inner) => self.resolve_wrapper("NON_NULL", inner, selections),
            Type::ListType(inner) => self.resolve_wrapper("LIST", inner, selections),
        }
    }

    fn resolve_wrapper(
        &self,
        kind: &str,
        inner: &Type<'static, String>,
        selections: &SelectionSet,
    ) -> JsonValue {
        let mut result = JsonMap::new();
        for field in fields_of(selections) {
            let value = match field.name.as_str() {
                "kind" => json!(kind),
                "ofType" => self.resolve_type_reference(inner, &field.selections),
                "__typename" => json!("__Type"),
                _ => JsonValue::Null,
            };
            result.insert(field.response_key().to_string(), value);
        }
        JsonValue::Object(result)
    }

    fn include_deprecated(&self, field: &FieldSelection) -> bool {
        field
            .arguments
            .iter()
            .find_map(|(name, value)| (name == "includeDeprecated").then_some(value))
            .and_then(|value| match value {
                AstValue::Boolean(b) => Some(*b),
                AstValue::Variable(name) => self.variables.get(name).and_then(JsonValue::as_bool),
                _ => None,
            })
            .unwrap_or(false)
    }

    fn string_argument(&self, value: &AstValue) -> Option<String> {
        match value {
            AstValue::String(s) => Some(s.clone()),
            AstValue::Variable(name) => self
                .variables
                .get(name)
                .and_then(JsonValue::as_str)
                .map(str::to_string),
            _ => None,
        }
    }
}

/// Flattens a selection set to its fields; introspection fragments always
/// condition on the meta-type they sit on, so they apply unconditionally.
fn fields_of(selection_set: &SelectionSet) -> Vec<&FieldSelection> {
    let mut fields = Vec::with_capacity(selection_set.items.len());
    for item in &selection_set.items {
        match item {
            SelectionItem::Field(field) => fields.push(field),
            SelectionItem::InlineFragment(fragment) => {
                fields.extend(fields_of(&fragment.selections))
            }
            SelectionItem::FragmentSpread(spread) => fields.extend(fields_of(&spread.selections)),
        }
    }
    fields
}

fn type_definition_name<'a>(type_def: &'a TypeDefinition<'static, String>) -> &'a str {
    match type_def {
        TypeDefinition::Scalar(t) => &t.name,
        TypeDefinition::Object(t) => &t.name,
        TypeDefinition::Interface(t) => &t.name,
        TypeDefinition::Union(t) => &t.name,
        TypeDefinition::Enum(t) => &t.name,
        TypeDefinition::InputObject(t) => &t.name,
    }
}

fn type_kind(type_def: &TypeDefinition<'static, String>) -> &'static str {
    match type_def {
        TypeDefinition::Scalar(_) => "SCALAR",
        TypeDefinition::Object(_) => "OBJECT",
        TypeDefinition::Interface(_) => "INTERFACE",
        TypeDefinition::Union(_) => "UNION",
        TypeDefinition::Enum(_) => "ENUM",
        TypeDefinition::InputObject(_) => "INPUT_OBJECT",
    }
}

fn type_description<'a>(type_def: &'a TypeDefinition<'static, String>) -> Option<&'a str> {
    match type_def {
        TypeDefinition::Scalar(t) => t.description.as_deref(),
        TypeDefinition::Object(t) => t.description.as_deref(),
        TypeDefinition::Interface(t) => t.description.as_deref(),
        TypeDefinition::Union(t) => t.description.as_deref(),
        TypeDefinition::Enum(t) => t.description.as_deref(),
        TypeDefinition::InputObject(t) => t.description.as_deref(),
    }
}

fn is_deprecated(directives: &[Directive<'static, String>]) -> bool {
    directives.iter().any(|d| d.name == "deprecated")
}

fn deprecation_reason<'a>(directives: &'a [Directive<'static, String>]) -> Option<&'a str> {
    directives
        .iter()
        .find(|d| d.name == "deprecated")?
        .arguments
        .iter()
        .find_map(|(name, value)| {
            if name != "reason" {
                return None;
            }
            match value {
                graphql_parser::query::Value::String(reason) => Some(reason.as_str()),
                _ => None,
            }
        })
}

fn json_or_null(value: Option<&str>) -> JsonValue {
    match value {
        Some(value) => json!(value),
        None => JsonValue::Null,
    }
}
