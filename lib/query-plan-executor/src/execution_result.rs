use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const SERVICE_URL_EXTENSION: &str = "serviceUrl";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct GraphQLErrorLocation {
    pub line: usize,
    pub column: usize,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct GraphQLError {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locations: Option<Vec<GraphQLErrorLocation>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<Vec<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Map<String, Value>>,
}

impl GraphQLError {
    pub fn new(message: impl Into<String>) -> Self {
        GraphQLError {
            message: message.into(),
            locations: None,
            path: None,
            extensions: None,
        }
    }

    pub fn with_path(mut self, path: Vec<Value>) -> Self {
        self.path = Some(path);
        self
    }

    /// Tags the error with the backend it came from.
    pub fn with_service_url(mut self, service_url: &str) -> Self {
        self.extensions.get_or_insert_with(Map::new).insert(
            SERVICE_URL_EXTENSION.to_string(),
            Value::String(service_url.to_string()),
        );
        self
    }
}

/// The wire shape of one backend's GraphQL response body.
#[derive(Deserialize, Debug, Clone, Default)]
pub struct ServiceResponse {
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub errors: Option<Vec<GraphQLError>>,
}

impl ServiceResponse {
    pub fn from_error_message(message: String) -> Self {
        ServiceResponse {
            data: None,
            errors: Some(vec![GraphQLError::new(message)]),
        }
    }
}

/// One sub-request's outcome, tagged with where it grafts into the response
/// tree. The synthetic introspection result has no service URL and an empty
/// insertion point.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub service_url: Option<String>,
    pub insertion_point: Vec<String>,
    pub data: Value,
    pub errors: Vec<GraphQLError>,
}

impl ExecutionResult {
    pub fn introspection(data: Value) -> Self {
        ExecutionResult {
            service_url: None,
            insertion_point: Vec::new(),
            data,
            errors: Vec::new(),
        }
    }
}
