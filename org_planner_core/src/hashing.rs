/// Planner Kernel — Canonical Hashing
///
/// Deterministic canonical serialization + SHA-256 hashing of a
/// `PlannerState`. Produces byte-identical output across platforms.
///
/// Rules:
///   - Every collection sorted by id (UTF-8 byte order)
///   - Activities sorted by id within their phase
///   - Object keys sorted at every depth
///   - UTF-8 JSON, no whitespace, no float

use sha2::{Digest, Sha256};
use serde_json::{Map, Value};

use crate::domain::Entity;
use crate::errors::{PlannerError, PlannerResult};
use crate::state::{Collection, PlannerState};
use crate::DATASET_VERSION;

/// Canonical serialization of PlannerState to UTF-8 JSON bytes.
/// `dataset_version` is the first field, binding the hash to the format.
pub fn canonical_serialize(state: &PlannerState) -> PlannerResult<Vec<u8>> {
    let obj = build_canonical_value(state)?;
    serde_json::to_vec(&obj)
        .map_err(|e| PlannerError::validation(format!("canonical serialization failed: {}", e)))
}

/// SHA-256 of canonical serialization. Lowercase hex string.
pub fn canonical_hash(state: &PlannerState) -> PlannerResult<String> {
    let bytes = canonical_serialize(state)?;
    let digest = Sha256::digest(&bytes);
    Ok(digest.iter().map(|b| format!("{:02x}", b)).collect::<String>())
}

/// Build the canonical value in strict field order.
///
/// Field order: dataset_version, roles, personnel, factories, timeline,
///              scenarios
fn build_canonical_value(state: &PlannerState) -> PlannerResult<Value> {
    let mut root = Map::new();
    root.insert(
        "dataset_version".to_string(),
        Value::Number(DATASET_VERSION.into()),
    );
    root.insert("roles".to_string(), canonical_collection(&state.roles)?);
    root.insert("personnel".to_string(), canonical_collection(&state.personnel)?);
    root.insert("factories".to_string(), canonical_collection(&state.factories)?);

    // -- timeline: activities are an unordered set for identity purposes ---
    let mut phases = state.phases.clone();
    for phase in phases.iter_mut() {
        phase.activities.sort_by(|a, b| a.id.cmp(&b.id));
    }
    root.insert("timeline".to_string(), canonical_collection(&phases)?);

    root.insert("scenarios".to_string(), canonical_collection(&state.scenarios)?);
    Ok(Value::Object(root))
}

fn canonical_collection<T: Entity>(collection: &Collection<T>) -> PlannerResult<Value> {
    let mut items: Vec<&T> = collection.iter().collect();
    items.sort_by(|a, b| a.id().cmp(b.id()));
    let mut list = Vec::with_capacity(items.len());
    for item in items {
        let v = serde_json::to_value(item)
            .map_err(|e| PlannerError::validation(format!("canonical serialization failed: {}", e)))?;
        list.push(sort_keys(v));
    }
    Ok(Value::Array(list))
}

/// Rebuild every object with its keys in byte order.
fn sort_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            let mut sorted = Map::new();
            for (k, v) in entries {
                sorted.insert(k, sort_keys(v));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sort_keys).collect()),
        other => other,
    }
}
