use std::collections::{HashMap, HashSet};

use graphql_parser::schema::{Definition, Document, Type, TypeDefinition};

pub const BOUNDARY_DIRECTIVE: &str = "boundary";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceInfo {
    pub name: String,
    pub url: String,
}

/// Which backend(s) own each `(parent type, field)` pair. A field present on
/// several services keeps every owner, in registration order.
#[derive(Debug, Default)]
pub struct FieldUrlMap {
    locations: HashMap<(String, String), Vec<String>>,
}

impl FieldUrlMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, parent_type: &str, field: &str, service_url: &str) {
        let owners = self
            .locations
            .entry((parent_type.to_string(), field.to_string()))
            .or_default();
        if !owners.iter().any(|owner| owner == service_url) {
            owners.push(service_url.to_string());
        }
    }

    /// Registers every field of every object and interface type in a
    /// service's schema, except boundary queries (which are internal join
    /// points, not client-facing fields).
    pub fn register_service_schema(&mut self, service_url: &str, schema: &Document<'_, String>) {
        for definition in &schema.definitions {
            let (type_name, fields) = match definition {
                Definition::TypeDefinition(TypeDefinition::Object(object_type)) => {
                    (&object_type.name, &object_type.fields)
                }
                Definition::TypeDefinition(TypeDefinition::Interface(interface_type)) => {
                    (&interface_type.name, &interface_type.fields)
                }
                _ => continue,
            };
            for field in fields {
                let is_boundary_query = field
                    .directives
                    .iter()
                    .any(|directive| directive.name == BOUNDARY_DIRECTIVE);
                if is_boundary_query {
                    continue;
                }
                self.register(type_name, &field.name, service_url);
            }
        }
    }

    pub fn owners(&self, parent_type: &str, field: &str) -> Option<&[String]> {
        self.locations
            .get(&(parent_type.to_string(), field.to_string()))
            .map(|owners| owners.as_slice())
    }

    /// The service to send `(parent_type, field)` to, preferring the service
    /// that produced the enclosing object so no join is needed.
    pub fn url_for<'a>(&'a self, parent_type: &str, field: &str, preferred: Option<&'a str>) -> Option<&'a str> {
        let owners = self.owners(parent_type, field)?;
        if let Some(preferred) = preferred {
            if owners.iter().any(|owner| owner == preferred) {
                return Some(preferred);
            }
        }
        owners.first().map(String::as_str)
    }
}

/// How one service resolves one boundary type by ID.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundaryQuery {
    pub query: String,
    /// Array form takes `ids: [ID!]!` and returns a list; the singular form
    /// takes a single `id` and is called once per ID.
    pub array: bool,
}

#[derive(Debug, Default)]
pub struct BoundaryQueryMap {
    queries: HashMap<String, HashMap<String, BoundaryQuery>>,
}

impl BoundaryQueryMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, service_url: &str, type_name: &str, query: BoundaryQuery) {
        self.queries
            .entry(service_url.to_string())
            .or_default()
            .insert(type_name.to_string(), query);
    }

    /// Scans a service schema for `@boundary` query fields and registers one
    /// entry per resolved type. The array form is recognized by a list
    /// return type.
    pub fn register_service_schema(
        &mut self,
        service_url: &str,
        query_type: &str,
        schema: &Document<'_, String>,
    ) {
        for definition in &schema.definitions {
            let Definition::TypeDefinition(TypeDefinition::Object(object_type)) = definition else {
                continue;
            };
            if object_type.name != query_type {
                continue;
            }
            for field in &object_type.fields {
                let is_boundary = field
                    .directives
                    .iter()
                    .any(|directive| directive.name == BOUNDARY_DIRECTIVE);
                if !is_boundary {
                    continue;
                }
                self.register(
                    service_url,
                    innermost_name(&field.field_type),
                    BoundaryQuery {
                        query: field.name.clone(),
                        array: is_list(&field.field_type),
                    },
                );
            }
        }
    }

    pub fn query_for(&self, service_url: &str, type_name: &str) -> Option<&BoundaryQuery> {
        self.queries.get(service_url)?.get(type_name)
    }
}

/// The set of object types shared across services and fetchable by ID.
#[derive(Debug, Default)]
pub struct BoundaryTypes {
    types: HashSet<String>,
}

impl BoundaryTypes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, type_name: &str) {
        self.types.insert(type_name.to_string());
    }

    pub fn register_service_schema(&mut self, schema: &Document<'_, String>) {
        for definition in &schema.definitions {
            if let Definition::TypeDefinition(TypeDefinition::Object(object_type)) = definition {
                let is_boundary = object_type
                    .directives
                    .iter()
                    .any(|directive| directive.name == BOUNDARY_DIRECTIVE);
                if is_boundary {
                    self.types.insert(object_type.name.clone());
                }
            }
        }
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.types.contains(type_name)
    }
}

fn innermost_name<'a>(field_type: &'a Type<'_, String>) -> &'a str {
    match field_type {
        Type::NamedType(name) => name,
        Type::NonNullType(inner) | Type::ListType(inner) => innermost_name(inner),
    }
}

fn is_list(field_type: &Type<'_, String>) -> bool {
    match field_type {
        Type::NamedType(_) => false,
        Type::ListType(_) => true,
        Type::NonNullType(inner) => is_list(inner),
    }
}
