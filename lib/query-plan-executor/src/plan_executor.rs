use std::sync::atomic::{AtomicI64, Ordering};

use futures::future::BoxFuture;
use futures::stream::FuturesUnordered;
use futures::StreamExt;
use reqwest::header::HeaderMap;
use serde_json::{Map as JsonMap, Value as JsonValue};
use tokio_util::sync::CancellationToken;
use tracing::{instrument, trace};

use quilt_query_planner::ast::operation::OperationKind;
use quilt_query_planner::planner::plan_nodes::{QueryPlan, QueryPlanStep};
use quilt_query_planner::printer::SelectionPrinter;
use quilt_query_planner::routing::{BoundaryQueryMap, BoundaryTypes};
use quilt_query_planner::schema::metadata::SchemaMetadata;

use crate::boundary::{
    boundary_field_results, build_boundary_query_documents, extract_boundary_ids, BoundaryError,
};
use crate::execution_result::{ExecutionResult, GraphQLError, ServiceResponse};
use crate::executors::common::ServiceRequest;
use crate::executors::map::ServiceExecutorMap;

pub const EXCEEDED_MAX_REQUESTS: &str = "exceeded max requests per query";
pub const EXECUTION_CANCELED: &str = "query execution canceled";

type StepCompletion<'p> = (&'p QueryPlanStep, ExecutionResult);

/// Walks a query plan: all root steps fan out at once, each completed step
/// schedules its `then` children from the IDs its data yields, and results
/// are collected in completion order. The request budget is a shared atomic
/// counter; each dispatched document costs one unit.
pub struct QueryExecution<'a> {
    executors: &'a ServiceExecutorMap,
    metadata: &'a SchemaMetadata,
    boundary_types: &'a BoundaryTypes,
    boundary_queries: &'a BoundaryQueryMap,
    remaining_requests: AtomicI64,
    budget_enabled: bool,
    boundary_batch_size: usize,
    cancellation: CancellationToken,
}

impl<'a> QueryExecution<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        executors: &'a ServiceExecutorMap,
        metadata: &'a SchemaMetadata,
        boundary_types: &'a BoundaryTypes,
        boundary_queries: &'a BoundaryQueryMap,
        max_requests_per_query: i64,
        boundary_batch_size: usize,
        cancellation: CancellationToken,
    ) -> Self {
        QueryExecution {
            executors,
            metadata,
            boundary_types,
            boundary_queries,
            remaining_requests: AtomicI64::new(max_requests_per_query),
            budget_enabled: max_requests_per_query > 0,
            boundary_batch_size: boundary_batch_size.max(1),
            cancellation,
        }
    }

    #[instrument(level = "debug", skip_all, fields(root_steps = plan.root_steps.len()))]
    pub async fn execute<'p>(
        &'p self,
        plan: &'p QueryPlan,
        variables: Option<&'p JsonMap<String, JsonValue>>,
        headers: &'p HeaderMap,
    ) -> (Vec<ExecutionResult>, Vec<GraphQLError>) {
        let printer = SelectionPrinter::new(self.metadata, self.boundary_types);
        let mut jobs: FuturesUnordered<BoxFuture<'p, StepCompletion<'p>>> = FuturesUnordered::new();
        let mut top_errors = Vec::new();

        for step in &plan.root_steps {
            if !self.try_reserve() {
                top_errors.push(budget_error(step));
                continue;
            }
            let document = self.root_document(plan, step, &printer);
            jobs.push(self.dispatch(step, document, variables, headers));
        }

        let mut results = Vec::new();
        while let Some((step, result)) = jobs.next().await {
            if self.cancellation.is_cancelled() {
                break;
            }
            for child in &step.then {
                self.schedule_child(
                    plan,
                    step,
                    child,
                    &result.data,
                    &printer,
                    variables,
                    headers,
                    &mut jobs,
                    &mut top_errors,
                );
            }
            results.push(result);
        }

        if self.cancellation.is_cancelled() {
            return (Vec::new(), vec![GraphQLError::new(EXECUTION_CANCELED)]);
        }
        (results, top_errors)
    }

    #[allow(clippy::too_many_arguments)]
    fn schedule_child<'p>(
        &'p self,
        plan: &'p QueryPlan,
        parent: &'p QueryPlanStep,
        child: &'p QueryPlanStep,
        parent_data: &JsonValue,
        printer: &SelectionPrinter<'_>,
        variables: Option<&'p JsonMap<String, JsonValue>>,
        headers: &'p HeaderMap,
        jobs: &mut FuturesUnordered<BoxFuture<'p, StepCompletion<'p>>>,
        top_errors: &mut Vec<GraphQLError>,
    ) {
        let ids = match child_boundary_ids(parent, parent_data, child) {
            Ok(ids) => ids,
            Err(err) => {
                top_errors.push(
                    GraphQLError::new(format!("failed to extract boundary ids: {}", err))
                        .with_service_url(&parent.service_url),
                );
                return;
            }
        };
        if ids.is_empty() {
            return;
        }

        let Some(boundary_query) = self
            .boundary_queries
            .query_for(&child.service_url, &child.parent_type)
        else {
            // The planner guarantees this; a refreshed routing snapshot is
            // the only way to get here.
            top_errors.push(GraphQLError::new(format!(
                "no boundary query for type {} on service {}",
                child.parent_type, child.service_url
            )));
            return;
        };

        let documents = build_boundary_query_documents(
            printer,
            child,
            &ids,
            boundary_query,
            self.boundary_batch_size,
        );
        trace!(
            "scheduling {} document(s) for {} ids at {:?}",
            documents.len(),
            ids.len(),
            child.insertion_point
        );
        for body in documents {
            if !self.try_reserve() {
                top_errors.push(budget_error(child));
                break;
            }
            let document = self.child_document(plan, child, body);
            jobs.push(self.dispatch(child, document, variables, headers));
        }
    }

    fn dispatch<'p>(
        &'p self,
        step: &'p QueryPlanStep,
        document: String,
        variables: Option<&'p JsonMap<String, JsonValue>>,
        headers: &'p HeaderMap,
    ) -> BoxFuture<'p, StepCompletion<'p>> {
        Box::pin(async move {
            let request = ServiceRequest {
                query: &document,
                variables,
                headers,
            };
            let response = tokio::select! {
                _ = self.cancellation.cancelled() => {
                    ServiceResponse::from_error_message(EXECUTION_CANCELED.to_string())
                }
                response = self.executors.execute(&step.service_url, request) => response,
            };

            let errors = response
                .errors
                .unwrap_or_default()
                .into_iter()
                .map(|mut error| {
                    if error.path.is_none() && !step.insertion_point.is_empty() {
                        error.path = Some(
                            step.insertion_point
                                .iter()
                                .map(|segment| JsonValue::String(segment.clone()))
                                .collect(),
                        );
                    }
                    error.with_service_url(&step.service_url)
                })
                .collect();

            let result = ExecutionResult {
                service_url: Some(step.service_url.clone()),
                insertion_point: step.insertion_point.clone(),
                data: response.data.unwrap_or(JsonValue::Null),
                errors,
            };
            (step, result)
        })
    }

    fn root_document(
        &self,
        plan: &QueryPlan,
        step: &QueryPlanStep,
        printer: &SelectionPrinter<'_>,
    ) -> String {
        let body = printer.print(&step.parent_type, &step.selection_set);
        let prefix = operation_prefix(plan, step, plan.operation_kind);
        match prefix {
            Some(prefix) => format!("{} {}", prefix, body),
            None => body,
        }
    }

    fn child_document(&self, plan: &QueryPlan, step: &QueryPlanStep, body: String) -> String {
        // Boundary documents are always queries, whatever the client
        // operation was.
        match operation_prefix(plan, step, OperationKind::Query) {
            Some(prefix) => format!("{} {}", prefix, body),
            None => body,
        }
    }

    /// One atomic check-and-decrement, so concurrent dispatches cannot
    /// overdraw the budget.
    fn try_reserve(&self) -> bool {
        if !self.budget_enabled {
            return true;
        }
        self.remaining_requests.fetch_sub(1, Ordering::SeqCst) > 0
    }
}

/// The operation head for a sub-request document: the operation kind plus
/// declarations for the variables the selection actually uses. A plain query
/// with no variables needs no head at all. Operation names are never sent.
fn operation_prefix(
    plan: &QueryPlan,
    step: &QueryPlanStep,
    kind: OperationKind,
) -> Option<String> {
    let usages = step.selection_set.variable_usages();
    let declarations: Vec<String> = plan
        .variable_definitions
        .iter()
        .filter(|definition| usages.contains(&definition.name))
        .map(|definition| definition.to_string())
        .collect();

    match (kind, declarations.is_empty()) {
        (OperationKind::Query, true) => None,
        (kind, true) => Some(kind.to_string()),
        (kind, false) => Some(format!("{} ({})", kind, declarations.join(", "))),
    }
}

/// The IDs a child step must resolve, read from its parent's data. A root
/// parent is walked from the response root; a boundary parent exposes its
/// objects under `_result`/`_0`… and the child path is relative to them.
fn child_boundary_ids(
    parent: &QueryPlanStep,
    parent_data: &JsonValue,
    child: &QueryPlanStep,
) -> Result<Vec<String>, BoundaryError> {
    let relative = &child.insertion_point[parent.insertion_point.len()..];
    if parent.insertion_point.is_empty() {
        return extract_boundary_ids(parent_data, relative);
    }
    let JsonValue::Object(source) = parent_data else {
        return Ok(Vec::new());
    };
    let mut ids = Vec::new();
    for object in boundary_field_results(source) {
        ids.extend(extract_boundary_ids(object, relative)?);
    }
    Ok(ids)
}

fn budget_error(step: &QueryPlanStep) -> GraphQLError {
    GraphQLError::new(EXCEEDED_MAX_REQUESTS).with_path(
        step.insertion_point
            .iter()
            .map(|segment| JsonValue::String(segment.clone()))
            .collect(),
    )
}
