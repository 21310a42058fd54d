use std::collections::HashMap;

use serde_json::Map;

use crate::ast::operation::OperationDefinition;
use crate::ast::rewrite::rewrite_operation;
use crate::planner::{plan, PlanError, PlanningContext};
use crate::routing::{BoundaryQueryMap, BoundaryTypes, FieldUrlMap, ServiceInfo};
use crate::schema::metadata::SchemaMetadata;
use crate::{parse_operation, parse_schema};

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
    topMovie: Movie!
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
    topMovie: Movie!
}
"#;

struct Fixture {
    metadata: SchemaMetadata,
    locations: FieldUrlMap,
    boundary_types: BoundaryTypes,
    boundary_queries: BoundaryQueryMap,
    services: HashMap<String, ServiceInfo>,
}

impl Fixture {
    fn new() -> Self {
        let movies_schema = parse_schema(MOVIES_SDL).unwrap();
        let comps_schema = parse_schema(COMPS_SDL).unwrap();
        let merged_schema = parse_schema(MERGED_SDL).unwrap();

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

        Fixture {
            metadata: SchemaMetadata::new(&merged_schema),
            locations,
            boundary_types,
            boundary_queries,
            services,
        }
    }

    fn operation(&self, query: &str) -> OperationDefinition {
        let document = parse_operation(query).unwrap();
        rewrite_operation(&document, None, &Map::new()).unwrap()
    }

    fn plan(&self, query: &str) -> Result<crate::planner::plan_nodes::QueryPlan, PlanError> {
        let operation = self.operation(query);
        plan(&PlanningContext {
            operation: &operation,
            metadata: &self.metadata,
            locations: &self.locations,
            boundary_types: &self.boundary_types,
            boundary_queries: &self.boundary_queries,
            services: &self.services,
        })
    }
}

#[test]
fn single_service_query_plans_one_root_step() {
    let fixture = Fixture::new();
    let plan = fixture.plan(r#"{ movie(id: "1") { id title } }"#).unwrap();

    assert_eq!(plan.root_steps.len(), 1);
    let step = &plan.root_steps[0];
    assert_eq!(step.service_url, MOVIES_URL);
    assert_eq!(step.service_name, "movies");
    assert_eq!(step.parent_type, "Query");
    assert!(step.insertion_point.is_empty());
    assert!(step.then.is_empty());
    assert_eq!(
        step.selection_set.to_string(),
        r#"{movie(id: "1"){id title}}"#
    );
}

#[test]
fn cross_service_field_becomes_a_child_step() {
    let fixture = Fixture::new();
    let plan = fixture
        .plan(r#"{ randomMovie { id title compTitles { id title } } }"#)
        .unwrap();

    assert_eq!(plan.root_steps.len(), 1);
    let root = &plan.root_steps[0];
    assert_eq!(root.service_url, MOVIES_URL);
    assert_eq!(root.selection_set.to_string(), "{randomMovie{id title}}");

    assert_eq!(root.then.len(), 1);
    let child = &root.then[0];
    assert_eq!(child.service_url, COMPS_URL);
    assert_eq!(child.parent_type, "Movie");
    assert_eq!(child.insertion_point, vec!["randomMovie".to_string()]);
    assert_eq!(child.selection_set.to_string(), "{compTitles{id}}");

    assert_eq!(child.then.len(), 1);
    let grandchild = &child.then[0];
    assert_eq!(grandchild.service_url, MOVIES_URL);
    assert_eq!(grandchild.parent_type, "Movie");
    assert_eq!(
        grandchild.insertion_point,
        vec!["randomMovie".to_string(), "compTitles".to_string()]
    );
    assert_eq!(grandchild.selection_set.to_string(), "{title}");
    assert!(grandchild.then.is_empty());
}

#[test]
fn root_fields_group_by_owning_service() {
    let fixture = Fixture::new();
    let plan = fixture
        .plan(r#"{ randomMovie { id } topMovie { id } }"#)
        .unwrap();

    assert_eq!(plan.root_steps.len(), 2);
    assert_eq!(plan.root_steps[0].service_url, MOVIES_URL);
    assert_eq!(plan.root_steps[0].selection_set.to_string(), "{randomMovie{id}}");
    assert_eq!(plan.root_steps[1].service_url, COMPS_URL);
    assert_eq!(plan.root_steps[1].selection_set.to_string(), "{topMovie{id}}");
}

#[test]
fn aliased_cut_uses_the_alias_as_insertion_point() {
    let fixture = Fixture::new();
    let plan = fixture
        .plan(r#"{ feature: randomMovie { id compTitles { id } } }"#)
        .unwrap();

    let child = &plan.root_steps[0].then[0];
    assert_eq!(child.insertion_point, vec!["feature".to_string()]);
}

#[test]
fn introspection_fields_split_from_backend_steps() {
    let fixture = Fixture::new();
    let plan = fixture
        .plan(r#"{ __schema { types { name } } movie(id: "1") { id } }"#)
        .unwrap();

    assert_eq!(
        plan.introspection_selection.to_string(),
        "{__schema{types{name}}}"
    );
    assert_eq!(plan.root_steps.len(), 1);
    assert_eq!(
        plan.root_steps[0].selection_set.to_string(),
        r#"{movie(id: "1"){id}}"#
    );
}

#[test]
fn unknown_field_fails_planning() {
    let fixture = Fixture::new();
    let err = fixture.plan(r#"{ movie(id: "1") { rating } }"#).unwrap_err();
    assert!(matches!(
        err,
        PlanError::UnknownField { parent_type, field }
            if parent_type == "Movie" && field == "rating"
    ));
}

#[test]
fn reserved_root_alias_fails_planning() {
    let fixture = Fixture::new();
    let err = fixture
        .plan(r#"{ _result: randomMovie { id } }"#)
        .unwrap_err();
    assert!(matches!(err, PlanError::ReservedAlias(alias) if alias == "_result"));
}

#[test]
fn subscriptions_are_rejected() {
    let fixture = Fixture::new();
    let err = fixture.plan(r#"subscription { movieAdded }"#).unwrap_err();
    assert!(matches!(err, PlanError::SubscriptionsUnsupported));
}
