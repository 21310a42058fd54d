use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::{json, Value as JsonValue};
use tokio_util::sync::CancellationToken;

use quilt_query_planner::routing::{BoundaryQueryMap, BoundaryTypes, FieldUrlMap, ServiceInfo};
use quilt_query_planner::{parse_operation, parse_schema};

use crate::execution_result::ServiceResponse;
use crate::executors::common::{ServiceExecutor, ServiceRequest};
use crate::executors::map::ServiceExecutorMap;
use crate::gateway::{DebugInfo, Gateway, GatewayRequest, RoutingSnapshot};
use crate::plan_executor::{EXCEEDED_MAX_REQUESTS, EXECUTION_CANCELED};

const MOVIES_URL: &str = "http://movies.example";
const COMPS_URL: &str = "http://comps.example";

const MOVIES_SDL: &str = r#"
directive @boundary on OBJECT | FIELD_DEFINITION

type Movie @boundary {
    id: ID!
    title: String
}

type Query {
    randomMovie: Movie!
    movie(id: ID!): Movie!
    movies(ids: [ID!]!): [Movie]! @boundary
}
"#;

const COMPS_SDL: &str = r#"
directive @boundary on OBJECT | FIELD_DEFINITION

type Movie @boundary {
    id: ID!
    compTitles: [Movie!]!
}

type Query {
    topMovie: Movie
    movies(ids: [ID!]): [Movie]! @boundary
}
"#;

const MERGED_SDL: &str = r#"
type Movie {
    id: ID!
    title: String
    compTitles: [Movie!]!
}

type Query {
    randomMovie: Movie!
    movie(id: ID!): Movie!
    topMovie: Movie
}
"#;

/// Answers each sub-request with the first canned response whose pattern
/// occurs in the document.
struct CannedExecutor {
    responses: Vec<(&'static str, ServiceResponse)>,
}

impl CannedExecutor {
    fn with_data(responses: Vec<(&'static str, JsonValue)>) -> Self {
        CannedExecutor {
            responses: responses
                .into_iter()
                .map(|(pattern, data)| {
                    (
                        pattern,
                        ServiceResponse {
                            data: Some(data),
                            errors: None,
                        },
                    )
                })
                .collect(),
        }
    }
}

#[async_trait]
impl ServiceExecutor for CannedExecutor {
    async fn execute(&self, _service_url: &str, request: ServiceRequest<'_>) -> ServiceResponse {
        for (pattern, response) in &self.responses {
            if request.query.contains(pattern) {
                return response.clone();
            }
        }
        ServiceResponse::from_error_message(format!("unexpected query: {}", request.query))
    }
}

fn snapshot() -> RoutingSnapshot {
    let movies_schema = parse_schema(MOVIES_SDL).unwrap();
    let comps_schema = parse_schema(COMPS_SDL).unwrap();

    let mut locations = FieldUrlMap::new();
    locations.register_service_schema(MOVIES_URL, &movies_schema);
    locations.register_service_schema(COMPS_URL, &comps_schema);

    let mut boundary_types = BoundaryTypes::new();
    boundary_types.register_service_schema(&movies_schema);
    boundary_types.register_service_schema(&comps_schema);

    let mut boundary_queries = BoundaryQueryMap::new();
    boundary_queries.register_service_schema(MOVIES_URL, "Query", &movies_schema);
    boundary_queries.register_service_schema(COMPS_URL, "Query", &comps_schema);

    let services = HashMap::from([
        (
            MOVIES_URL.to_string(),
            ServiceInfo {
                name: "movies".to_string(),
                url: MOVIES_URL.to_string(),
            },
        ),
        (
            COMPS_URL.to_string(),
            ServiceInfo {
                name: "comps".to_string(),
                url: COMPS_URL.to_string(),
            },
        ),
    ]);

    RoutingSnapshot::new(
        parse_schema(MERGED_SDL).unwrap(),
        locations,
        boundary_types,
        boundary_queries,
        services,
    )
}

fn gateway_with(
    movies: CannedExecutor,
    comps: CannedExecutor,
) -> Gateway {
    let mut executors = ServiceExecutorMap::new();
    executors.insert_boxed_arc(MOVIES_URL.to_string(), movies.to_boxed_arc());
    executors.insert_boxed_arc(COMPS_URL.to_string(), comps.to_boxed_arc());
    Gateway::new(snapshot(), executors)
}

#[test]
fn single_service_single_object() {
    let gateway = gateway_with(
        CannedExecutor::with_data(vec![(
            "movie(id: \"1\")",
            json!({ "movie": { "id": "1", "title": "Test title" } }),
        )]),
        CannedExecutor::with_data(vec![]),
    );

    let document = parse_operation(r#"{ movie(id: "1") { id title } }"#).unwrap();
    let response =
        tokio_test::block_on(gateway.execute_operation(GatewayRequest::new(&document)));

    assert!(response.errors.is_empty(), "errors: {:?}", response.errors);
    assert_eq!(
        response.data.as_deref(),
        Some(r#"{"movie":{"id":"1","title":"Test title"}}"#)
    );
}

#[test]
fn array_boundary_across_two_services_with_a_second_cut() {
    let gateway = gateway_with(
        CannedExecutor::with_data(vec![
            (
                "randomMovie",
                json!({ "randomMovie": { "id": "1", "title": "Movie 1" } }),
            ),
            (
                "_result",
                json!({
                    "_result": [
                        { "id": 2, "title": "Movie 2" },
                        { "id": 3, "title": "Movie 3" },
                        { "id": 4, "title": "Movie 4" }
                    ]
                }),
            ),
        ]),
        CannedExecutor::with_data(vec![(
            "_result",
            json!({
                "_result": [
                    {
                        "_id": "1",
                        "compTitles": [ { "id": "2" }, { "id": "3" }, { "id": "4" } ]
                    }
                ]
            }),
        )]),
    );

    let document =
        parse_operation(r#"{ randomMovie { id title compTitles { id title } } }"#).unwrap();
    let response =
        tokio_test::block_on(gateway.execute_operation(GatewayRequest::new(&document)));

    assert!(response.errors.is_empty(), "errors: {:?}", response.errors);
    assert_eq!(
        response.data.as_deref(),
        Some(
            r#"{"randomMovie":{"id":"1","title":"Movie 1","compTitles":[{"id":2,"title":"Movie 2"},{"id":3,"title":"Movie 3"},{"id":4,"title":"Movie 4"}]}}"#
        )
    );
}

#[test]
fn budget_exhaustion_nulls_the_starved_subtree() {
    let gateway = gateway_with(
        CannedExecutor::with_data(vec![("a: randomMovie", json!({ "a": { "id": "1" } }))]),
        CannedExecutor::with_data(vec![("b: topMovie", json!({ "b": { "id": "9" } }))]),
    )
    .with_max_requests_per_query(1);

    let document = parse_operation(r#"{ a: randomMovie { id } b: topMovie { id } }"#).unwrap();
    let response =
        tokio_test::block_on(gateway.execute_operation(GatewayRequest::new(&document)));

    assert_eq!(response.data.as_deref(), Some(r#"{"a":{"id":"1"},"b":null}"#));
    assert!(response
        .errors
        .iter()
        .any(|error| error.message == EXCEEDED_MAX_REQUESTS));
}

#[test]
fn backend_errors_carry_the_service_url() {
    let gateway = gateway_with(
        CannedExecutor::with_data(vec![]),
        CannedExecutor {
            responses: vec![(
                "topMovie",
                ServiceResponse {
                    data: None,
                    errors: Some(vec![crate::GraphQLError::new("boom")]),
                },
            )],
        },
    );

    let document = parse_operation(r#"{ topMovie { id } }"#).unwrap();
    let response =
        tokio_test::block_on(gateway.execute_operation(GatewayRequest::new(&document)));

    assert_eq!(response.data.as_deref(), Some(r#"{"topMovie":null}"#));
    assert_eq!(response.errors.len(), 1);
    assert_eq!(response.errors[0].message, "boom");
    assert_eq!(
        response.errors[0]
            .extensions
            .as_ref()
            .and_then(|extensions| extensions.get("serviceUrl")),
        Some(&json!(COMPS_URL))
    );
}

#[test]
fn introspection_resolves_locally_without_sub_requests() {
    let gateway = gateway_with(
        CannedExecutor::with_data(vec![]),
        CannedExecutor::with_data(vec![]),
    );

    let document = parse_operation(r#"{ __schema { queryType { name } } }"#).unwrap();
    let response =
        tokio_test::block_on(gateway.execute_operation(GatewayRequest::new(&document)));

    assert!(response.errors.is_empty(), "errors: {:?}", response.errors);
    assert_eq!(
        response.data.as_deref(),
        Some(r#"{"__schema":{"queryType":{"name":"Query"}}}"#)
    );
}

#[test]
fn debug_marker_attaches_extensions() {
    let gateway = gateway_with(
        CannedExecutor::with_data(vec![(
            "movie(id: \"1\")",
            json!({ "movie": { "id": "1", "title": "Test title" } }),
        )]),
        CannedExecutor::with_data(vec![]),
    );

    let document = parse_operation(r#"{ movie(id: "1") { id title } }"#).unwrap();
    let mut request = GatewayRequest::new(&document);
    request.debug = Some(DebugInfo {
        query: true,
        variables: true,
        plan: true,
        timing: true,
    });
    let response = tokio_test::block_on(gateway.execute_operation(request));

    assert!(response.extensions.contains_key("query"));
    assert!(response.extensions.contains_key("variables"));
    assert!(response.extensions.contains_key("plan"));
    assert!(response.extensions.contains_key("timing"));
    let body = response.to_body();
    assert!(body.contains("\"extensions\""));
}

#[test]
fn cancellation_discards_partial_results() {
    let gateway = gateway_with(
        CannedExecutor::with_data(vec![(
            "movie(id: \"1\")",
            json!({ "movie": { "id": "1", "title": "Test title" } }),
        )]),
        CannedExecutor::with_data(vec![]),
    );

    let document = parse_operation(r#"{ movie(id: "1") { id title } }"#).unwrap();
    let mut request = GatewayRequest::new(&document);
    let cancellation = CancellationToken::new();
    cancellation.cancel();
    request.cancellation = cancellation;
    let response = tokio_test::block_on(gateway.execute_operation(request));

    assert!(response.data.is_none());
    assert!(response
        .errors
        .iter()
        .any(|error| error.message == EXECUTION_CANCELED));
}

#[test]
fn variables_are_declared_and_forwarded() {
    let gateway = gateway_with(
        CannedExecutor::with_data(vec![(
            "query ($movieId: ID!) { movie(id: $movieId)",
            json!({ "movie": { "id": "1", "title": "Test title" } }),
        )]),
        CannedExecutor::with_data(vec![]),
    );

    let document =
        parse_operation(r#"query($movieId: ID!) { movie(id: $movieId) { id title } }"#).unwrap();
    let mut request = GatewayRequest::new(&document);
    request.variables = match json!({ "movieId": "1" }) {
        JsonValue::Object(map) => map,
        _ => unreachable!(),
    };
    let response = tokio_test::block_on(gateway.execute_operation(request));

    assert!(response.errors.is_empty(), "errors: {:?}", response.errors);
    assert_eq!(
        response.data.as_deref(),
        Some(r#"{"movie":{"id":"1","title":"Test title"}}"#)
    );
}
