use serde_json::{Map, Value};

use quilt_query_planner::ast::value::Value as AstValue;
use quilt_query_planner::planner::plan_nodes::QueryPlanStep;
use quilt_query_planner::printer::SelectionPrinter;
use quilt_query_planner::routing::BoundaryQuery;

pub const RESULT_ALIAS: &str = "_result";
pub const ID_KEY: &str = "_id";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum BoundaryError {
    #[error("boundary object is missing both '_id' and 'id'")]
    MissingBoundaryId,
    #[error("missing insertion point segment '{0}'")]
    MissingPathSegment(String),
    #[error("cannot extract boundary ids from a non-object value")]
    UnexpectedValue,
}

/// The identity of a boundary object: `_id` wins over `id`; numbers are
/// normalized to their decimal rendering so `2` and `"2"` align.
pub fn boundary_id(object: &Map<String, Value>) -> Option<String> {
    let value = object.get(ID_KEY).or_else(|| object.get("id"))?;
    match value {
        Value::String(id) => Some(id.clone()),
        Value::Number(id) => Some(id.to_string()),
        _ => None,
    }
}

/// Collects the boundary IDs found at `insertion_point` under `data`,
/// depth-first, recursing through every element of intervening lists so the
/// ID order mirrors the parent tree. An explicitly null node yields nothing.
pub fn extract_boundary_ids(
    data: &Value,
    insertion_point: &[String],
) -> Result<Vec<String>, BoundaryError> {
    let mut ids = Vec::new();
    collect_boundary_ids(data, insertion_point, &mut ids)?;
    Ok(ids)
}

fn collect_boundary_ids(
    data: &Value,
    insertion_point: &[String],
    ids: &mut Vec<String>,
) -> Result<(), BoundaryError> {
    if let Value::Null = data {
        return Ok(());
    }
    if insertion_point.is_empty() {
        return match data {
            Value::Object(object) => {
                ids.push(boundary_id(object).ok_or(BoundaryError::MissingBoundaryId)?);
                Ok(())
            }
            Value::Array(elements) => {
                for element in elements {
                    collect_boundary_ids(element, insertion_point, ids)?;
                }
                Ok(())
            }
            _ => Err(BoundaryError::UnexpectedValue),
        };
    }

    match data {
        Value::Object(object) => {
            let segment = &insertion_point[0];
            let next = object
                .get(segment)
                .ok_or_else(|| BoundaryError::MissingPathSegment(segment.clone()))?;
            collect_boundary_ids(next, &insertion_point[1..], ids)
        }
        Value::Array(elements) => {
            for element in elements {
                collect_boundary_ids(element, insertion_point, ids)?;
            }
            Ok(())
        }
        _ => Err(BoundaryError::UnexpectedValue),
    }
}

/// Builds the sub-query documents that resolve `ids` through a boundary
/// query.
///
/// The array form batches every ID into one `_result:`-aliased call. The
/// singular form is chunked to `batch_size` calls per document, with the
/// `_<i>` alias counter increasing across chunks so every alias in the
/// combined output maps back to its input index.
pub fn build_boundary_query_documents(
    printer: &SelectionPrinter<'_>,
    step: &QueryPlanStep,
    ids: &[String],
    boundary_query: &BoundaryQuery,
    batch_size: usize,
) -> Vec<String> {
    let selection = printer.print(&step.parent_type, &step.selection_set);

    if boundary_query.array {
        let quoted: Vec<String> = ids.iter().map(|id| quote_id(id)).collect();
        return vec![format!(
            "{{ {}: {}(ids: [{}]) {} }}",
            RESULT_ALIAS,
            boundary_query.query,
            quoted.join(", "),
            selection
        )];
    }

    let batch_size = batch_size.max(1);
    ids.chunks(batch_size)
        .enumerate()
        .map(|(chunk_index, chunk)| {
            let calls: Vec<String> = chunk
                .iter()
                .enumerate()
                .map(|(offset, id)| {
                    format!(
                        "_{}: {}(id: {}) {}",
                        chunk_index * batch_size + offset,
                        boundary_query.query,
                        quote_id(id),
                        selection
                    )
                })
                .collect();
            format!("{{ {} }}", calls.join(" "))
        })
        .collect()
}

/// The boundary objects a child step returned: the `_result` array in array
/// form, or `_0`, `_1`, … in singular form, read from 0 until the next alias
/// is absent so short batches are tolerated.
pub fn boundary_field_results(source: &Map<String, Value>) -> Vec<&Value> {
    if let Some(Value::Array(elements)) = source.get(RESULT_ALIAS) {
        return elements.iter().collect();
    }
    let mut results = Vec::new();
    for index in 0.. {
        match source.get(&format!("_{}", index)) {
            Some(value) => results.push(value),
            None => break,
        }
    }
    results
}

fn quote_id(id: &str) -> String {
    AstValue::String(id.to_string()).to_string()
}
