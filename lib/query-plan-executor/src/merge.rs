use serde_json::{Map, Value};
use tracing::instrument;

use crate::boundary::{boundary_id, RESULT_ALIAS};
use crate::execution_result::ExecutionResult;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum MergeError {
    #[error("merge: nothing to merge")]
    NothingToMerge,
    #[error("merge: result for insertion point '{0}' is not a map")]
    ResultNotAMap(String),
    #[error("merge: insertion point segment '{0}' is missing from the response tree")]
    MissingInsertionPoint(String),
    #[error("merge: expected a map at insertion point segment '{0}'")]
    ExpectedMap(String),
    #[error("merge: boundary object at '{0}' is missing both '_id' and 'id'")]
    MissingBoundaryId(String),
}

/// Folds a list of execution results into one response tree. The first
/// result seeds the tree; every later one is grafted at its insertion point,
/// aligned by boundary ID. Peer results touch disjoint subtrees (or disjoint
/// fields of the same objects), so the fold is order-insensitive.
#[instrument(level = "trace", skip_all, fields(results = results.len()))]
pub fn merge_execution_results(results: Vec<ExecutionResult>) -> Result<Value, MergeError> {
    let mut iter = results.into_iter();
    let first = iter.next().ok_or(MergeError::NothingToMerge)?;
    let mut base = match first.data {
        Value::Null => Value::Object(Map::new()),
        data => data,
    };
    for result in iter {
        merge_result(&mut base, result)?;
    }
    Ok(base)
}

fn merge_result(base: &mut Value, result: ExecutionResult) -> Result<(), MergeError> {
    // A failed sub-request has no data; its subtree stays missing and
    // null-bubbling takes over from there.
    if result.data.is_null() {
        return Ok(());
    }

    let point = result.insertion_point;
    if point.is_empty() {
        let Value::Object(source) = result.data else {
            return Err(MergeError::ResultNotAMap(String::new()));
        };
        let Value::Object(target) = base else {
            return Err(MergeError::ExpectedMap(String::new()));
        };
        merge_maps(target, source);
        return Ok(());
    }

    let Value::Object(source_map) = &result.data else {
        return Err(MergeError::ResultNotAMap(point.join(".")));
    };
    let source = BoundarySource::from_map(source_map);
    graft(base, &point, &source)
}

/// Root-level merge: disjoint keys append, shared maps merge recursively,
/// scalar collisions take the later value.
fn merge_maps(target: &mut Map<String, Value>, source: Map<String, Value>) {
    for (key, source_value) in source {
        match (target.get_mut(&key), source_value) {
            (Some(Value::Object(target_child)), Value::Object(source_child)) => {
                merge_maps(target_child, source_child);
            }
            (Some(slot), source_value) => *slot = source_value,
            (None, source_value) => {
                target.insert(key, source_value);
            }
        }
    }
}

/// A child step's output, in either boundary shape.
struct BoundarySource<'a> {
    singular: bool,
    items: Vec<&'a Map<String, Value>>,
}

impl<'a> BoundarySource<'a> {
    fn from_map(source: &'a Map<String, Value>) -> Self {
        if let Some(Value::Array(elements)) = source.get(RESULT_ALIAS) {
            return BoundarySource {
                singular: false,
                items: elements
                    .iter()
                    .filter_map(|element| element.as_object())
                    .collect(),
            };
        }
        let mut items = Vec::new();
        for index in 0.. {
            match source.get(&format!("_{}", index)) {
                Some(Value::Object(object)) => items.push(object),
                Some(_) | None => break,
            }
        }
        BoundarySource {
            singular: true,
            items,
        }
    }

    fn by_id(&self, id: &str) -> Option<&'a Map<String, Value>> {
        self.items
            .iter()
            .find(|item| boundary_id(item).as_deref() == Some(id))
            .copied()
    }
}

fn graft(node: &mut Value, path: &[String], source: &BoundarySource<'_>) -> Result<(), MergeError> {
    if let Some(segment) = path.first() {
        return match node {
            // A nullable parent resolved to null; there is nothing to graft
            // onto and nothing was fetched for it.
            Value::Null => Ok(()),
            Value::Object(map) => {
                let child = map
                    .get_mut(segment)
                    .ok_or_else(|| MergeError::MissingInsertionPoint(segment.clone()))?;
                graft(child, &path[1..], source)
            }
            Value::Array(elements) => {
                for element in elements {
                    graft(element, path, source)?;
                }
                Ok(())
            }
            _ => Err(MergeError::ExpectedMap(segment.clone())),
        };
    }

    match node {
        Value::Null => Ok(()),
        Value::Object(target) => {
            if source.singular {
                if let Some(item) = source.items.first() {
                    copy_fields(target, item);
                }
            } else {
                let id = boundary_id(target)
                    .ok_or_else(|| MergeError::MissingBoundaryId(String::new()))?;
                if let Some(item) = source.by_id(&id) {
                    copy_fields(target, item);
                }
            }
            Ok(())
        }
        Value::Array(elements) => {
            for element in elements {
                let target = match element {
                    Value::Null => continue,
                    Value::Object(target) => target,
                    _ => return Err(MergeError::ExpectedMap(String::new())),
                };
                let id = boundary_id(target)
                    .ok_or_else(|| MergeError::MissingBoundaryId(String::new()))?;
                // A chunk that did not cover this ID simply leaves the
                // element alone; another result will.
                if let Some(item) = source.by_id(&id) {
                    copy_fields(target, item);
                }
            }
            Ok(())
        }
        _ => Err(MergeError::ExpectedMap(String::new())),
    }
}

/// Shallow field copy; deeper merges happen through later results. The child
/// value wins on collision.
fn copy_fields(target: &mut Map<String, Value>, source: &Map<String, Value>) {
    for (key, value) in source {
        target.insert(key.clone(), value.clone());
    }
}
