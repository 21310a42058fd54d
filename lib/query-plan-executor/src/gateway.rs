use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use graphql_parser::query::Document;
use graphql_parser::schema::Document as SchemaDocument;
use reqwest::header::HeaderMap;
use serde_json::{Map as JsonMap, Value as JsonValue};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{instrument, warn};

use quilt_query_planner::ast::operation::OperationDefinition;
use quilt_query_planner::ast::rewrite::rewrite_operation;
use quilt_query_planner::planner::{plan, PlanningContext};
use quilt_query_planner::routing::{BoundaryQueryMap, BoundaryTypes, FieldUrlMap, ServiceInfo};
use quilt_query_planner::schema::metadata::SchemaMetadata;

use crate::bubbling::{bubble_up_null_values_in_place, BubbleUpError};
use crate::execution_result::{ExecutionResult, GraphQLError};
use crate::executors::map::ServiceExecutorMap;
use crate::format::format_response_body;
use crate::introspection::resolve_introspection_fields;
use crate::merge::merge_execution_results;
use crate::plan_executor::QueryExecution;

const DEFAULT_BOUNDARY_BATCH_SIZE: usize = 100;

/// Which debug extensions to attach to a response.
#[derive(Debug, Clone, Copy, Default)]
pub struct DebugInfo {
    pub query: bool,
    pub variables: bool,
    pub plan: bool,
    pub timing: bool,
}

/// Mutates the response extensions before emission. Failures are logged and
/// never fail the request.
pub trait ExtensionsPlugin: Send + Sync {
    fn id(&self) -> &str;
    fn modify_extensions(&self, extensions: &mut JsonMap<String, JsonValue>)
        -> Result<(), String>;
}

/// Drops forbidden fields from the operation before planning (contributing
/// one error per removed field) and optionally narrows the schema that
/// introspection sees.
pub trait AuthorizationHook: Send + Sync {
    fn filter_operation(&self, operation: &mut OperationDefinition) -> Vec<GraphQLError>;

    fn filter_schema(
        &self,
        _schema: &SchemaDocument<'static, String>,
    ) -> Option<SchemaDocument<'static, String>> {
        None
    }
}

/// The read-only routing state one request runs against. Refreshes swap the
/// whole snapshot; a request keeps the one it started with.
pub struct RoutingSnapshot {
    pub schema: SchemaDocument<'static, String>,
    pub metadata: SchemaMetadata,
    pub locations: FieldUrlMap,
    pub boundary_types: BoundaryTypes,
    pub boundary_queries: BoundaryQueryMap,
    pub services: HashMap<String, ServiceInfo>,
}

impl RoutingSnapshot {
    pub fn new(
        schema: SchemaDocument<'static, String>,
        locations: FieldUrlMap,
        boundary_types: BoundaryTypes,
        boundary_queries: BoundaryQueryMap,
        services: HashMap<String, ServiceInfo>,
    ) -> Self {
        let metadata = SchemaMetadata::new(&schema);
        RoutingSnapshot {
            schema,
            metadata,
            locations,
            boundary_types,
            boundary_queries,
            services,
        }
    }
}

pub struct GatewayRequest<'a> {
    pub document: &'a Document<'static, String>,
    pub operation_name: Option<&'a str>,
    pub variables: JsonMap<String, JsonValue>,
    pub headers: HeaderMap,
    pub debug: Option<DebugInfo>,
    pub cancellation: CancellationToken,
}

impl<'a> GatewayRequest<'a> {
    pub fn new(document: &'a Document<'static, String>) -> Self {
        GatewayRequest {
            document,
            operation_name: None,
            variables: JsonMap::new(),
            headers: HeaderMap::new(),
            debug: None,
            cancellation: CancellationToken::new(),
        }
    }
}

#[derive(Debug)]
pub struct GatewayResponse {
    /// The formatted `data` object as raw JSON, or `None` for `data: null`.
    pub data: Option<String>,
    pub errors: Vec<GraphQLError>,
    pub extensions: JsonMap<String, JsonValue>,
}

impl GatewayResponse {
    fn from_errors(errors: Vec<GraphQLError>) -> Self {
        GatewayResponse {
            data: None,
            errors,
            extensions: JsonMap::new(),
        }
    }

    /// The full response body.
    pub fn to_body(&self) -> String {
        let mut body = String::with_capacity(256);
        body.push_str("{\"data\":");
        match &self.data {
            Some(data) => body.push_str(data),
            None => body.push_str("null"),
        }
        if !self.errors.is_empty() {
            body.push_str(",\"errors\":");
            body.push_str(&serde_json::to_string(&self.errors).unwrap_or_else(|_| "[]".into()));
        }
        if !self.extensions.is_empty() {
            body.push_str(",\"extensions\":");
            body.push_str(
                &serde_json::to_string(&self.extensions).unwrap_or_else(|_| "{}".into()),
            );
        }
        body.push('}');
        body
    }
}

/// Ties the pipeline together for one request: directive rewrite,
/// authorization, planning, plan execution, introspection, merging,
/// null-bubbling and response shaping.
pub struct Gateway {
    snapshot: RwLock<Arc<RoutingSnapshot>>,
    executors: ServiceExecutorMap,
    plugins: Vec<Box<dyn ExtensionsPlugin>>,
    authorization: Option<Box<dyn AuthorizationHook>>,
    max_requests_per_query: i64,
    boundary_batch_size: usize,
}

impl Gateway {
    pub fn new(snapshot: RoutingSnapshot, executors: ServiceExecutorMap) -> Self {
        Gateway {
            snapshot: RwLock::new(Arc::new(snapshot)),
            executors,
            plugins: Vec::new(),
            authorization: None,
            max_requests_per_query: 0,
            boundary_batch_size: DEFAULT_BOUNDARY_BATCH_SIZE,
        }
    }

    /// Zero or negative disables the budget.
    pub fn with_max_requests_per_query(mut self, max_requests_per_query: i64) -> Self {
        self.max_requests_per_query = max_requests_per_query;
        self
    }

    pub fn with_boundary_batch_size(mut self, boundary_batch_size: usize) -> Self {
        self.boundary_batch_size = boundary_batch_size.max(1);
        self
    }

    pub fn with_plugin(mut self, plugin: Box<dyn ExtensionsPlugin>) -> Self {
        self.plugins.push(plugin);
        self
    }

    pub fn with_authorization(mut self, hook: Box<dyn AuthorizationHook>) -> Self {
        self.authorization = Some(hook);
        self
    }

    /// Swaps the routing snapshot; in-flight requests finish on the one they
    /// started with.
    pub async fn update_routing(&self, snapshot: RoutingSnapshot) {
        *self.snapshot.write().await = Arc::new(snapshot);
    }

    #[instrument(level = "debug", skip_all)]
    pub async fn execute_operation(&self, request: GatewayRequest<'_>) -> GatewayResponse {
        let started = Instant::now();
        // Held until the response is built, so a concurrent routing refresh
        // cannot change the tables under a running request.
        let snapshot = self.snapshot.read().await;

        let mut operation =
            match rewrite_operation(request.document, request.operation_name, &request.variables)
            {
                Ok(operation) => operation,
                Err(err) => {
                    return GatewayResponse::from_errors(vec![GraphQLError::new(err.to_string())])
                }
            };

        let mut errors = Vec::new();
        if let Some(authorization) = &self.authorization {
            errors.extend(authorization.filter_operation(&mut operation));
        }

        let query_plan = match plan(&PlanningContext {
            operation: &operation,
            metadata: &snapshot.metadata,
            locations: &snapshot.locations,
            boundary_types: &snapshot.boundary_types,
            boundary_queries: &snapshot.boundary_queries,
            services: &snapshot.services,
        }) {
            Ok(query_plan) => query_plan,
            Err(err) => {
                errors.push(GraphQLError::new(err.to_string()));
                return GatewayResponse::from_errors(errors);
            }
        };

        let execution = QueryExecution::new(
            &self.executors,
            &snapshot.metadata,
            &snapshot.boundary_types,
            &snapshot.boundary_queries,
            self.max_requests_per_query,
            self.boundary_batch_size,
            request.cancellation.clone(),
        );
        let (mut results, execution_errors) = execution
            .execute(&query_plan, Some(&request.variables), &request.headers)
            .await;

        if request.cancellation.is_cancelled() {
            errors.extend(execution_errors);
            return GatewayResponse::from_errors(errors);
        }
        errors.extend(execution_errors);
        for result in &mut results {
            errors.append(&mut result.errors);
        }

        let introspection_data = if query_plan.introspection_selection.is_empty() {
            JsonValue::Object(JsonMap::new())
        } else {
            let filtered_schema = self
                .authorization
                .as_ref()
                .and_then(|authorization| authorization.filter_schema(&snapshot.schema));
            match &filtered_schema {
                Some(schema) => resolve_introspection_fields(
                    schema,
                    &SchemaMetadata::new(schema),
                    &query_plan.introspection_selection,
                    &request.variables,
                ),
                None => resolve_introspection_fields(
                    &snapshot.schema,
                    &snapshot.metadata,
                    &query_plan.introspection_selection,
                    &request.variables,
                ),
            }
        };
        let mut all_results = Vec::with_capacity(results.len() + 1);
        all_results.push(ExecutionResult::introspection(introspection_data));
        all_results.extend(results);

        let mut merged = match merge_execution_results(all_results) {
            Ok(merged) => merged,
            Err(err) => {
                errors.push(GraphQLError::new(err.to_string()));
                return GatewayResponse::from_errors(errors);
            }
        };

        let root_type = snapshot
            .metadata
            .root_type_name(operation.operation_kind)
            .unwrap_or("Query")
            .to_string();
        let data = match bubble_up_null_values_in_place(
            &snapshot.metadata,
            &root_type,
            &operation.selection_set,
            &mut merged,
        ) {
            Ok(mut bubble_errors) => {
                errors.append(&mut bubble_errors);
                Some(format_response_body(
                    &snapshot.metadata,
                    &root_type,
                    &operation.selection_set,
                    &merged,
                ))
            }
            Err(BubbleUpError::NullBubbledToRoot(mut bubble_errors)) => {
                errors.append(&mut bubble_errors);
                None
            }
        };

        let mut extensions = JsonMap::new();
        if let Some(debug) = request.debug {
            if debug.query {
                extensions.insert("query".to_string(), JsonValue::String(operation.to_string()));
            }
            if debug.variables {
                extensions.insert(
                    "variables".to_string(),
                    JsonValue::Object(request.variables.clone()),
                );
            }
            if debug.plan {
                extensions.insert(
                    "plan".to_string(),
                    serde_json::to_value(&query_plan).unwrap_or(JsonValue::Null),
                );
            }
            if debug.timing {
                extensions.insert(
                    "timing".to_string(),
                    JsonValue::String(format!("{}ms", started.elapsed().as_millis())),
                );
            }
        }
        for plugin in &self.plugins {
            if let Err(err) = plugin.modify_extensions(&mut extensions) {
                warn!("plugin {} failed to modify extensions: {}", plugin.id(), err);
            }
        }

        GatewayResponse {
            data,
            errors,
            extensions,
        }
    }
}
