//! Assignment manager — the sole executor of assign / unassign.
//!
//! Execution order per operation:
//!   1. claim the person, their current role, the target role, its
//!      occupant and its factory (Busy if any is already claimed)
//!   2. plan against the snapshot taken under that claim
//!      (kernel `plan_assign` / `plan_unassign`)
//!   3. commit displaced + assigned records in one batch
//!   4. update the cache, then broadcast the events
//!
//! The claims live in the entity store, so role and personnel edits or
//! deletes contend with assignments for the same ids. They are released
//! when the operation returns, success or not.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use org_planner_core::domain::{AssignmentState, EntityKind, Level, Personnel, Role};
use org_planner_core::events::EventEnvelope;
use org_planner_core::interaction::Intent;
use org_planner_core::state::{FieldFilter, PlannerState};
use org_planner_core::transitions::{plan_assign, plan_unassign, TransitionResult};
use org_planner_core::{PlannerError, PlannerResult};

use crate::claims::claim_key;
use crate::document_store::WriteBatch;
use crate::entity_store::{EntityIter, EntityStore, StoredEntity};

// ── Manager ────────────────────────────────────────────────────────

pub struct AssignmentManager {
    store: Arc<EntityStore>,
}

impl AssignmentManager {
    pub fn new(store: Arc<EntityStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<EntityStore> {
        &self.store
    }

    /// Observe committed assignment changes, in sequence order.
    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.store.events().subscribe()
    }

    /// Put `personnel_id` in `role_id`, displacing any other occupant.
    /// Assigning to the role already held is a successful no-op.
    pub async fn assign(&self, personnel_id: &str, role_id: &str) -> PlannerResult<Personnel> {
        self.store.auth().require_edit("assign")?;
        let (claim, snapshot) = self
            .store
            .hold(|state| assign_keys(state, personnel_id, role_id))
            .map_err(|e| {
                debug!(personnel_id, role_id, error = %e, "assign rejected");
                e
            })?;

        let now = Utc::now();
        let (next, result) = plan_assign(&snapshot, personnel_id, role_id, now)?;

        let person = self.execute(next, &result, personnel_id, now).await?;
        if !result.is_noop() {
            info!(
                personnel_id,
                role_id,
                factory = ?person.assigned_factory,
                displaced = ?result.displaced,
                "assigned"
            );
        }
        drop(claim);
        Ok(person)
    }

    /// Clear the person's role and factory. Already unassigned is a no-op.
    pub async fn unassign(&self, personnel_id: &str) -> PlannerResult<Personnel> {
        self.store.auth().require_edit("unassign")?;
        let (claim, snapshot) = self
            .store
            .hold(|state| Personnel::claim_keys(state, personnel_id))?;

        let now = Utc::now();
        let (next, result) = plan_unassign(&snapshot, personnel_id, now)?;

        let person = self.execute(next, &result, personnel_id, now).await?;
        if !result.is_noop() {
            info!(personnel_id, "unassigned");
        }
        drop(claim);
        Ok(person)
    }

    /// Run a resolved drag-and-drop intent.
    pub async fn dispatch(&self, intent: &Intent) -> PlannerResult<Personnel> {
        match intent {
            Intent::Assign {
                personnel_id,
                role_id,
            } => self.assign(personnel_id, role_id).await,
            Intent::Unassign { personnel_id } => self.unassign(personnel_id).await,
        }
    }

    async fn execute(
        &self,
        next: PlannerState,
        result: &TransitionResult,
        personnel_id: &str,
        now: DateTime<Utc>,
    ) -> PlannerResult<Personnel> {
        let person = next
            .personnel
            .get(personnel_id)
            .cloned()
            .ok_or_else(|| PlannerError::not_found(EntityKind::Personnel, personnel_id))?;
        if result.is_noop() {
            debug!(personnel_id, "assignment unchanged");
            return Ok(person);
        }
        self.store
            .commit_transition(WriteBatch::new(), &next, result, now, |_| {})
            .await
            .map_err(|e| {
                warn!(personnel_id, error = %e, "assignment not committed");
                e
            })?;
        Ok(person)
    }

    // ── Queries ──

    pub fn occupant_of(&self, role_id: &str) -> Option<Personnel> {
        self.store.read(|s| s.occupant_of(role_id).cloned())
    }

    /// Lazy sequence of personnel without a role.
    pub fn unassigned_personnel(&self) -> EntityIter<Personnel> {
        self.store
            .list(Some(FieldFilter::equals("assignedRole", Value::Null)))
    }

    pub fn assignment_state(&self, personnel_id: &str) -> PlannerResult<AssignmentState> {
        self.store
            .read(|s| s.personnel.get(personnel_id).map(Personnel::assignment_state))
            .ok_or_else(|| PlannerError::not_found(EntityKind::Personnel, personnel_id))
    }

    /// Every level present, each with its roles in insertion order.
    pub fn roles_by_level(&self) -> BTreeMap<Level, Vec<Role>> {
        self.store.read(|s| {
            Level::ALL
                .into_iter()
                .map(|level| (level, s.roles_at_level(level).cloned().collect()))
                .collect()
        })
    }

    pub fn unfilled_roles(&self) -> Vec<Role> {
        self.store.read(|s| s.unfilled_roles().cloned().collect())
    }
}

/// The person and their held role, the target role and its occupant,
/// and the factory the role places people at.
fn assign_keys(state: &PlannerState, personnel_id: &str, role_id: &str) -> Vec<String> {
    let mut keys = Personnel::claim_keys(state, personnel_id);
    keys.extend(Role::claim_keys(state, role_id));
    if let Some(factory) = state.roles.get(role_id).and_then(Role::factory_id) {
        keys.push(claim_key(EntityKind::Factory, factory));
    }
    keys
}
