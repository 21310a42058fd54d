use std::collections::{HashMap, HashSet};

use graphql_parser::schema::{Definition, Document, TypeDefinition};

use crate::ast::operation::OperationKind;

use super::type_node::TypeNode;

/// Lookup tables derived from the merged schema, shared by the planner, the
/// null-bubbler and the response formatter.
#[derive(Debug, Default)]
pub struct SchemaMetadata {
    /// type name -> field name -> field type
    pub type_fields: HashMap<String, HashMap<String, TypeNode>>,
    /// abstract type name -> concrete (or nested abstract) member names,
    /// transitively closed
    pub possible_types: HashMap<String, HashSet<String>>,
    pub query_type: String,
    pub mutation_type: Option<String>,
    pub subscription_type: Option<String>,
}

impl SchemaMetadata {
    pub fn new(schema: &Document<'_, String>) -> Self {
        let mut direct_members: HashMap<String, Vec<String>> = HashMap::new();
        let mut type_fields: HashMap<String, HashMap<String, TypeNode>> = HashMap::new();
        let mut query_type = "Query".to_string();
        let mut mutation_type = None;
        let mut subscription_type = None;

        for definition in &schema.definitions {
            match definition {
                Definition::SchemaDefinition(schema_def) => {
                    if let Some(query) = &schema_def.query {
                        query_type = query.clone();
                    }
                    mutation_type = schema_def.mutation.clone();
                    subscription_type = schema_def.subscription.clone();
                }
                Definition::TypeDefinition(TypeDefinition::Object(object_type)) => {
                    let fields = type_fields.entry(object_type.name.clone()).or_default();
                    for field in &object_type.fields {
                        fields.insert(field.name.clone(), TypeNode::from(&field.field_type));
                    }
                    for interface in &object_type.implements_interfaces {
                        direct_members
                            .entry(interface.clone())
                            .or_default()
                            .push(object_type.name.clone());
                    }
                }
                Definition::TypeDefinition(TypeDefinition::Interface(interface_type)) => {
                    let fields = type_fields.entry(interface_type.name.clone()).or_default();
                    for field in &interface_type.fields {
                        fields.insert(field.name.clone(), TypeNode::from(&field.field_type));
                    }
                    for interface in &interface_type.implements_interfaces {
                        direct_members
                            .entry(interface.clone())
                            .or_default()
                            .push(interface_type.name.clone());
                    }
                }
                Definition::TypeDefinition(TypeDefinition::Union(union_type)) => {
                    direct_members.insert(union_type.name.clone(), union_type.types.clone());
                }
                _ => {}
            }
        }

        // Close the membership relation so a type condition on an interface
        // matches members of interfaces that implement it.
        let mut possible_types: HashMap<String, HashSet<String>> = HashMap::new();
        for (abstract_name, members) in &direct_members {
            let mut closure: HashSet<String> = HashSet::new();
            for member in members {
                closure.insert(member.clone());
                if let Some(nested) = direct_members.get(member) {
                    for nested_member in nested {
                        closure.insert(nested_member.clone());
                    }
                }
            }
            possible_types.insert(abstract_name.clone(), closure);
        }

        SchemaMetadata {
            type_fields,
            possible_types,
            query_type,
            mutation_type,
            subscription_type,
        }
    }

    pub fn field_type(&self, type_name: &str, field_name: &str) -> Option<&TypeNode> {
        self.type_fields.get(type_name)?.get(field_name)
    }

    pub fn is_composite(&self, type_name: &str) -> bool {
        self.type_fields.contains_key(type_name) || self.possible_types.contains_key(type_name)
    }

    /// Whether an object whose concrete type is `type_name` matches a
    /// fragment condition on `type_condition`.
    pub fn entity_satisfies_type_condition(&self, type_name: &str, type_condition: &str) -> bool {
        if type_name == type_condition {
            return true;
        }
        self.possible_types
            .get(type_condition)
            .is_some_and(|members| members.contains(type_name))
    }

    pub fn root_type_name(&self, kind: OperationKind) -> Option<&str> {
        match kind {
            OperationKind::Query => Some(self.query_type.as_str()),
            OperationKind::Mutation => self.mutation_type.as_deref(),
            OperationKind::Subscription => self.subscription_type.as_deref(),
        }
    }
}
