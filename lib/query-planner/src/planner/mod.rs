use std::collections::HashMap;

use tracing::instrument;

use crate::ast::operation::{OperationDefinition, OperationKind};
use crate::ast::selection_item::SelectionItem;
use crate::ast::selection_set::SelectionSet;
use crate::routing::{BoundaryQueryMap, BoundaryTypes, FieldUrlMap, ServiceInfo};
use crate::schema::metadata::SchemaMetadata;

pub mod plan_nodes;

use plan_nodes::{QueryPlan, QueryPlanStep};

pub const TYPENAME_FIELD: &str = "__typename";
const SCHEMA_FIELD: &str = "__schema";
const TYPE_FIELD: &str = "__type";

#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    #[error("subscriptions are not supported")]
    SubscriptionsUnsupported,
    #[error("schema defines no root type for {0} operations")]
    MissingRootType(OperationKind),
    #[error("unknown field '{field}' on type '{parent_type}'")]
    UnknownField { parent_type: String, field: String },
    #[error("no service owns field '{field}' on type '{parent_type}'")]
    NoServiceForField { parent_type: String, field: String },
    #[error(
        "field '{field}' requires a cut on type '{parent_type}', which is not a boundary type"
    )]
    NotBoundaryType { parent_type: String, field: String },
    #[error("service '{service_url}' exposes no boundary query for type '{type_name}'")]
    MissingBoundaryQuery {
        type_name: String,
        service_url: String,
    },
    #[error("boundary cuts cycle through type '{type_name}' on service '{service_url}'")]
    CyclicBoundaryCut {
        type_name: String,
        service_url: String,
    },
    #[error("alias '{0}' is reserved for boundary bookkeeping")]
    ReservedAlias(String),
}

pub struct PlanningContext<'a> {
    pub operation: &'a OperationDefinition,
    pub metadata: &'a SchemaMetadata,
    pub locations: &'a FieldUrlMap,
    pub boundary_types: &'a BoundaryTypes,
    pub boundary_queries: &'a BoundaryQueryMap,
    /// Keyed by service URL; supplies display names for plan steps.
    pub services: &'a HashMap<String, ServiceInfo>,
}

/// Compiles a rewritten client operation into a tree of per-backend steps.
///
/// Root fields are grouped by owning service; inside a step, a field owned by
/// another service becomes a child step joined through the enclosing boundary
/// type. `__schema`/`__type` never reach a backend.
#[instrument(level = "debug", skip_all, fields(operation = ?ctx.operation.name))]
pub fn plan(ctx: &PlanningContext<'_>) -> Result<QueryPlan, PlanError> {
    if ctx.operation.operation_kind == OperationKind::Subscription {
        return Err(PlanError::SubscriptionsUnsupported);
    }
    let root_type = ctx
        .metadata
        .root_type_name(ctx.operation.operation_kind)
        .ok_or(PlanError::MissingRootType(ctx.operation.operation_kind))?
        .to_string();

    let root_items = flatten_root_fragments(&ctx.operation.selection_set, &root_type);
    reject_reserved_aliases(&root_items)?;

    enum RootRoute {
        Introspection,
        Local,
        Backend(String),
    }

    let mut introspection_items = Vec::new();
    let mut groups: Vec<(String, Vec<SelectionItem>)> = Vec::new();

    for item in root_items {
        let route = match &item {
            SelectionItem::Field(field) => match field.name.as_str() {
                SCHEMA_FIELD | TYPE_FIELD => RootRoute::Introspection,
                // Resolved locally; any position knows its own type name.
                TYPENAME_FIELD => RootRoute::Local,
                _ => {
                    if ctx.metadata.field_type(&root_type, &field.name).is_none() {
                        return Err(PlanError::UnknownField {
                            parent_type: root_type.clone(),
                            field: field.name.clone(),
                        });
                    }
                    let service_url = ctx
                        .locations
                        .url_for(&root_type, &field.name, None)
                        .ok_or_else(|| PlanError::NoServiceForField {
                            parent_type: root_type.clone(),
                            field: field.name.clone(),
                        })?
                        .to_string();
                    RootRoute::Backend(service_url)
                }
            },
            // Fragments were flattened above.
            _ => RootRoute::Local,
        };
        match route {
            RootRoute::Introspection => introspection_items.push(item),
            RootRoute::Local => {}
            RootRoute::Backend(service_url) => {
                match groups.iter_mut().find(|(url, _)| *url == service_url) {
                    Some((_, items)) => items.push(item),
                    None => groups.push((service_url, vec![item])),
                }
            }
        }
    }

    let mut root_steps = Vec::with_capacity(groups.len());
    for (service_url, items) in groups {
        let mut chain = Vec::new();
        let (selection_set, then) =
            extract_selection_set(ctx, &service_url, &root_type, &items, &[], &mut chain)?;
        root_steps.push(new_step(ctx, service_url, &root_type, selection_set, vec![], then));
    }

    Ok(QueryPlan {
        operation_kind: ctx.operation.operation_kind,
        variable_definitions: ctx.operation.variable_definitions.clone(),
        root_steps,
        introspection_selection: SelectionSet {
            items: introspection_items,
        },
    })
}

fn new_step(
    ctx: &PlanningContext<'_>,
    service_url: String,
    parent_type: &str,
    selection_set: SelectionSet,
    insertion_point: Vec<String>,
    then: Vec<QueryPlanStep>,
) -> QueryPlanStep {
    let service_name = ctx
        .services
        .get(&service_url)
        .map(|service| service.name.clone())
        .unwrap_or_else(|| service_url.clone());
    QueryPlanStep {
        service_url,
        service_name,
        parent_type: parent_type.to_string(),
        selection_set,
        insertion_point,
        then,
    }
}

/// Splits the selections of `parent_type` into what `service_url` can answer
/// itself and child steps for everything owned elsewhere.
fn extract_selection_set(
    ctx: &PlanningContext<'_>,
    service_url: &str,
    parent_type: &str,
    items: &[SelectionItem],
    insertion_point: &[String],
    chain: &mut Vec<(String, String)>,
) -> Result<(SelectionSet, Vec<QueryPlanStep>), PlanError> {
    let mut kept = Vec::with_capacity(items.len());
    let mut children = Vec::new();

    for item in items {
        match item {
            SelectionItem::Field(field) => {
                if field.name == TYPENAME_FIELD {
                    kept.push(item.clone());
                    continue;
                }
                let field_type = ctx
                    .metadata
                    .field_type(parent_type, &field.name)
                    .ok_or_else(|| PlanError::UnknownField {
                        parent_type: parent_type.to_string(),
                        field: field.name.clone(),
                    })?
                    .inner_name()
                    .to_string();
                let owners = ctx.locations.owners(parent_type, &field.name).ok_or_else(
                    || PlanError::NoServiceForField {
                        parent_type: parent_type.to_string(),
                        field: field.name.clone(),
                    },
                )?;

                if owners.iter().any(|owner| owner == service_url) {
                    if field.selections.is_empty() {
                        kept.push(item.clone());
                    } else {
                        let mut child_point = insertion_point.to_vec();
                        child_point.push(field.response_key().to_string());
                        let (sub, sub_children) = extract_selection_set(
                            ctx,
                            service_url,
                            &field_type,
                            &field.selections.items,
                            &child_point,
                            chain,
                        )?;
                        let mut field = field.clone();
                        field.selections = sub;
                        kept.push(SelectionItem::Field(field));
                        children.extend(sub_children);
                    }
                } else {
                    children.push(cut_to_child_step(
                        ctx,
                        parent_type,
                        item,
                        field.name.as_str(),
                        insertion_point,
                        chain,
                    )?);
                }
            }
            SelectionItem::InlineFragment(fragment) => {
                let (sub, sub_children) = extract_selection_set(
                    ctx,
                    service_url,
                    &fragment.type_condition,
                    &fragment.selections.items,
                    insertion_point,
                    chain,
                )?;
                if !sub.is_empty() {
                    let mut fragment = fragment.clone();
                    fragment.selections = sub;
                    kept.push(SelectionItem::InlineFragment(fragment));
                }
                children.extend(sub_children);
            }
            SelectionItem::FragmentSpread(spread) => {
                let (sub, sub_children) = extract_selection_set(
                    ctx,
                    service_url,
                    &spread.type_condition,
                    &spread.selections.items,
                    insertion_point,
                    chain,
                )?;
                if !sub.is_empty() {
                    let mut spread = spread.clone();
                    spread.selections = sub;
                    kept.push(SelectionItem::FragmentSpread(spread));
                }
                children.extend(sub_children);
            }
        }
    }

    Ok((SelectionSet { items: kept }, children))
}

/// A field owned by another service: the enclosing object must be a boundary
/// type the other service can resolve by ID, and the field travels to a child
/// step grafted back at the enclosing object's path.
fn cut_to_child_step(
    ctx: &PlanningContext<'_>,
    parent_type: &str,
    item: &SelectionItem,
    field_name: &str,
    insertion_point: &[String],
    chain: &mut Vec<(String, String)>,
) -> Result<QueryPlanStep, PlanError> {
    let child_url = ctx
        .locations
        .url_for(parent_type, field_name, None)
        .ok_or_else(|| PlanError::NoServiceForField {
            parent_type: parent_type.to_string(),
            field: field_name.to_string(),
        })?
        .to_string();

    if !ctx.boundary_types.contains(parent_type) {
        return Err(PlanError::NotBoundaryType {
            parent_type: parent_type.to_string(),
            field: field_name.to_string(),
        });
    }
    if ctx
        .boundary_queries
        .query_for(&child_url, parent_type)
        .is_none()
    {
        return Err(PlanError::MissingBoundaryQuery {
            type_name: parent_type.to_string(),
            service_url: child_url,
        });
    }

    let chain_key = (child_url.clone(), parent_type.to_string());
    if chain.contains(&chain_key) {
        return Err(PlanError::CyclicBoundaryCut {
            type_name: parent_type.to_string(),
            service_url: child_url,
        });
    }
    chain.push(chain_key);
    let extracted = extract_selection_set(
        ctx,
        &child_url,
        parent_type,
        std::slice::from_ref(item),
        insertion_point,
        chain,
    );
    chain.pop();
    let (selection_set, grandchildren) = extracted?;

    Ok(new_step(
        ctx,
        child_url,
        parent_type,
        selection_set,
        insertion_point.to_vec(),
        grandchildren,
    ))
}

fn flatten_root_fragments(selection_set: &SelectionSet, root_type: &str) -> Vec<SelectionItem> {
    let mut items = Vec::with_capacity(selection_set.items.len());
    for item in &selection_set.items {
        match item {
            SelectionItem::Field(_) => items.push(item.clone()),
            SelectionItem::InlineFragment(fragment) => {
                if fragment.type_condition == root_type {
                    items.extend(flatten_root_fragments(&fragment.selections, root_type));
                }
            }
            SelectionItem::FragmentSpread(spread) => {
                if spread.type_condition == root_type {
                    items.extend(flatten_root_fragments(&spread.selections, root_type));
                }
            }
        }
    }
    items
}

fn reject_reserved_aliases(items: &[SelectionItem]) -> Result<(), PlanError> {
    for item in items {
        if let SelectionItem::Field(field) = item {
            let key = field.response_key();
            if is_reserved_alias(key) {
                return Err(PlanError::ReservedAlias(key.to_string()));
            }
        }
    }
    Ok(())
}

fn is_reserved_alias(key: &str) -> bool {
    match key.strip_prefix('_') {
        Some("id") | Some("result") => true,
        Some(rest) => !rest.is_empty() && rest.bytes().all(|b| b.is_ascii_digit()),
        None => false,
    }
}
