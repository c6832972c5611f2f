//! Dataset snapshots — whole-dataset export and import.
//!
//! A snapshot carries the dataset plus the SHA-256 of its canonical
//! serialization. Import re-derives the hash and re-checks invariants
//! before anything is written, and only into an empty store.

use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use org_planner_core::hashing::canonical_hash;
use org_planner_core::invariants::try_validate_invariants;
use org_planner_core::state::PlannerState;
use org_planner_core::{PlannerError, PlannerResult, DATASET_VERSION};

use crate::document_store::StoreError;
use crate::entity_store::EntityStore;

/// Snapshot on-disk format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetSnapshot {
    /// Dataset format the state was written with.
    pub dataset_version: u32,
    pub exported_at: DateTime<Utc>,
    /// SHA-256 of the canonical serialization of `state`.
    pub hash: String,
    pub state: PlannerState,
}

impl DatasetSnapshot {
    pub fn of(state: PlannerState, exported_at: DateTime<Utc>) -> PlannerResult<Self> {
        let hash = canonical_hash(&state)?;
        Ok(Self {
            dataset_version: DATASET_VERSION,
            exported_at,
            hash,
            state,
        })
    }
}

/// Capture the store's current dataset.
pub fn export_snapshot(store: &EntityStore) -> PlannerResult<DatasetSnapshot> {
    let snap = DatasetSnapshot::of(store.snapshot(), Utc::now())?;
    info!(hash = %snap.hash, "dataset exported");
    Ok(snap)
}

/// Check version, hash and invariants.
pub fn verify_snapshot(snap: &DatasetSnapshot) -> PlannerResult<()> {
    if snap.dataset_version != DATASET_VERSION {
        return Err(PlannerError::validation(format!(
            "unsupported dataset version {} (expected {})",
            snap.dataset_version, DATASET_VERSION
        )));
    }
    let computed = canonical_hash(&snap.state)?;
    if computed != snap.hash {
        return Err(PlannerError::validation(format!(
            "snapshot hash mismatch: recorded {}, computed {}",
            snap.hash, computed
        )));
    }
    try_validate_invariants(&snap.state).map_err(PlannerError::Validation)
}

/// Seed an empty store from a verified snapshot. Returns the record count.
pub async fn import_snapshot(store: &EntityStore, snap: DatasetSnapshot) -> PlannerResult<usize> {
    verify_snapshot(&snap).map_err(|e| {
        warn!(error = %e, "snapshot rejected");
        e
    })?;
    if !store.is_empty() {
        return Err(PlannerError::Conflict(
            "import requires an empty dataset".to_string(),
        ));
    }
    let count = store.seed(snap.state).await?;
    info!(hash = %snap.hash, records = count, "dataset imported");
    Ok(count)
}

pub fn save_snapshot(path: &Path, snap: &DatasetSnapshot) -> PlannerResult<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir).map_err(StoreError::from)?;
    }
    let content = serde_json::to_vec_pretty(snap).map_err(StoreError::from)?;
    let mut file = File::create(path).map_err(StoreError::from)?;
    file.write_all(&content).map_err(StoreError::from)?;
    file.sync_all().map_err(StoreError::from)?;
    Ok(())
}

/// Read a snapshot file. Does not verify it.
pub fn load_snapshot(path: &Path) -> PlannerResult<DatasetSnapshot> {
    let content = fs::read(path).map_err(StoreError::from)?;
    serde_json::from_slice(&content)
        .map_err(|e| PlannerError::validation(format!("bad snapshot {}: {}", path.display(), e)))
}
