/// Planner Kernel — Centralized Assignment Transitions
///
/// ALL mutation of `assignedRole` / `assignedFactory` lives here.
/// Every transition takes a state, returns `(new_state, result)`, and
/// never mutates its input. The runtime persists the records named in
/// `result.touched` and only then adopts the new state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{EntityKind, Personnel, Role};
use crate::errors::{PlannerError, PlannerResult};
use crate::events::{AssignmentEvent, UnassignCause};
use crate::state::PlannerState;

/// What deleting an occupied role does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleDeletionPolicy {
    /// Refuse with `Conflict` while the role has an occupant.
    #[default]
    Reject,
    /// Unassign the occupant and delete the role in one step.
    CascadeUnassign,
}

/// Structured outcome of one transition.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransitionResult {
    /// Personnel whose records changed, in write order.
    pub touched: Vec<String>,
    /// Personnel removed by the transition.
    pub removed_personnel: Option<String>,
    /// Role removed by the transition.
    pub removed_role: Option<String>,
    /// Previous occupant cleared by an assign.
    pub displaced: Option<String>,
    pub events: Vec<AssignmentEvent>,
}

impl TransitionResult {
    /// True when the transition left the state untouched.
    pub fn is_noop(&self) -> bool {
        self.touched.is_empty() && self.removed_personnel.is_none() && self.removed_role.is_none()
    }
}

// ---------------------------------------------------------------------------
// Public transitions
// ---------------------------------------------------------------------------

/// Assign `personnel_id` to `role_id`.
///
/// Displaces any other occupant of the role, releases the person's
/// previous role, and places the person at the role's factory when the
/// role is factory-specific. Re-assigning to the held role is a no-op.
pub fn plan_assign(
    state: &PlannerState,
    personnel_id: &str,
    role_id: &str,
    now: DateTime<Utc>,
) -> PlannerResult<(PlannerState, TransitionResult)> {
    let person = lookup_personnel(state, personnel_id)?;
    let role = lookup_role(state, role_id)?;
    let factory = role.factory_id().map(str::to_string);

    let mut result = TransitionResult::default();
    if person.assigned_role.as_deref() == Some(role_id) && person.assigned_factory == factory {
        return Ok((state.clone(), result));
    }

    let mut new_state = state.clone();

    if let Some(occupant) = state.occupant_of(role_id) {
        if occupant.id != personnel_id {
            let displaced_id = occupant.id.clone();
            clear_assignment(&mut new_state, &displaced_id, now);
            result.events.push(AssignmentEvent::Unassigned {
                personnel_id: displaced_id.clone(),
                role_id: role_id.to_string(),
                cause: UnassignCause::Displaced,
            });
            result.touched.push(displaced_id.clone());
            result.displaced = Some(displaced_id);
        }
    }

    if let Some(previous) = person.assigned_role.as_deref() {
        if previous != role_id {
            result.events.push(AssignmentEvent::Unassigned {
                personnel_id: personnel_id.to_string(),
                role_id: previous.to_string(),
                cause: UnassignCause::Requested,
            });
        }
    }

    if let Some(p) = new_state.personnel.get_mut(personnel_id) {
        p.assigned_role = Some(role_id.to_string());
        p.assigned_factory = factory.clone();
        p.updated_at = now;
    }
    result.events.push(AssignmentEvent::Assigned {
        personnel_id: personnel_id.to_string(),
        role_id: role_id.to_string(),
        factory_id: factory,
    });
    result.touched.push(personnel_id.to_string());

    Ok((new_state, result))
}

/// Clear the person's role and factory. Unassigned people are a no-op.
pub fn plan_unassign(
    state: &PlannerState,
    personnel_id: &str,
    now: DateTime<Utc>,
) -> PlannerResult<(PlannerState, TransitionResult)> {
    let person = lookup_personnel(state, personnel_id)?;
    let mut result = TransitionResult::default();

    let Some(role_id) = person.assigned_role.clone() else {
        if person.assigned_factory.is_none() {
            return Ok((state.clone(), result));
        }
        // Stray factory without a role: repair it.
        let mut new_state = state.clone();
        clear_assignment(&mut new_state, personnel_id, now);
        result.touched.push(personnel_id.to_string());
        return Ok((new_state, result));
    };

    let mut new_state = state.clone();
    clear_assignment(&mut new_state, personnel_id, now);
    result.touched.push(personnel_id.to_string());
    result.events.push(AssignmentEvent::Unassigned {
        personnel_id: personnel_id.to_string(),
        role_id,
        cause: UnassignCause::Requested,
    });
    Ok((new_state, result))
}

/// Delete a role under the given policy.
pub fn plan_role_delete(
    state: &PlannerState,
    role_id: &str,
    policy: RoleDeletionPolicy,
    now: DateTime<Utc>,
) -> PlannerResult<(PlannerState, TransitionResult)> {
    lookup_role(state, role_id)?;
    let mut new_state = state.clone();
    let mut result = TransitionResult::default();

    if let Some(occupant) = state.occupant_of(role_id) {
        match policy {
            RoleDeletionPolicy::Reject => {
                return Err(PlannerError::Conflict(format!(
                    "role {:?} is held by personnel {:?}",
                    role_id, occupant.id
                )));
            }
            RoleDeletionPolicy::CascadeUnassign => {
                let occupant_id = occupant.id.clone();
                clear_assignment(&mut new_state, &occupant_id, now);
                result.events.push(AssignmentEvent::Unassigned {
                    personnel_id: occupant_id.clone(),
                    role_id: role_id.to_string(),
                    cause: UnassignCause::RoleDeleted,
                });
                result.touched.push(occupant_id);
            }
        }
    }

    new_state.roles.remove(role_id);
    result.removed_role = Some(role_id.to_string());
    Ok((new_state, result))
}

/// Replace a role record, re-placing its occupant if the role's factory moved.
pub fn plan_role_replace(
    state: &PlannerState,
    updated: Role,
    now: DateTime<Utc>,
) -> PlannerResult<(PlannerState, TransitionResult)> {
    lookup_role(state, &updated.id)?;
    let mut new_state = state.clone();
    let mut result = TransitionResult::default();

    let factory = updated.factory_id().map(str::to_string);
    if let Some(occupant) = state.occupant_of(&updated.id) {
        if occupant.assigned_factory != factory {
            let occupant_id = occupant.id.clone();
            if let Some(p) = new_state.personnel.get_mut(&occupant_id) {
                p.assigned_factory = factory.clone();
                p.updated_at = now;
            }
            result.events.push(AssignmentEvent::Assigned {
                personnel_id: occupant_id.clone(),
                role_id: updated.id.clone(),
                factory_id: factory,
            });
            result.touched.push(occupant_id);
        }
    }

    new_state.roles.upsert(updated);
    Ok((new_state, result))
}

/// Remove a personnel record; its link to a role goes with it.
pub fn plan_personnel_delete(
    state: &PlannerState,
    personnel_id: &str,
) -> PlannerResult<(PlannerState, TransitionResult)> {
    let person = lookup_personnel(state, personnel_id)?;
    let mut new_state = state.clone();
    let mut result = TransitionResult::default();

    if let Some(role_id) = person.assigned_role.clone() {
        result.events.push(AssignmentEvent::Unassigned {
            personnel_id: personnel_id.to_string(),
            role_id,
            cause: UnassignCause::Requested,
        });
    }
    new_state.personnel.remove(personnel_id);
    result.removed_personnel = Some(personnel_id.to_string());
    Ok((new_state, result))
}

/// Refuse to remove a factory while personnel are placed there.
pub fn check_factory_delete(state: &PlannerState, factory_id: &str) -> PlannerResult<()> {
    if !state.factories.contains(factory_id) {
        return Err(PlannerError::not_found(EntityKind::Factory, factory_id));
    }
    if let Some(p) = state
        .personnel
        .iter()
        .find(|p| p.assigned_factory.as_deref() == Some(factory_id))
    {
        return Err(PlannerError::Conflict(format!(
            "factory {:?} still has personnel {:?} assigned",
            factory_id, p.id
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Helpers (private)
// ---------------------------------------------------------------------------

fn lookup_personnel<'a>(state: &'a PlannerState, id: &str) -> PlannerResult<&'a Personnel> {
    state
        .personnel
        .get(id)
        .ok_or_else(|| PlannerError::not_found(EntityKind::Personnel, id))
}

fn lookup_role<'a>(state: &'a PlannerState, id: &str) -> PlannerResult<&'a Role> {
    state
        .roles
        .get(id)
        .ok_or_else(|| PlannerError::not_found(EntityKind::Role, id))
}

fn clear_assignment(state: &mut PlannerState, personnel_id: &str, now: DateTime<Utc>) {
    if let Some(p) = state.personnel.get_mut(personnel_id) {
        p.assigned_role = None;
        p.assigned_factory = None;
        p.updated_at = now;
    }
}
