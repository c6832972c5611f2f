/// Planner Kernel — Invariant Checks
///
/// `validate_invariants` panics on the first failure and guards kernel
/// post-conditions. `try_validate_invariants` is the non-panicking form
/// used when accepting data from outside (snapshot import, seeding).

use std::collections::{BTreeMap, BTreeSet};

use crate::domain::Entity;
use crate::state::{Collection, PlannerState};

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Run every invariant check. Panics on the first failure.
pub fn validate_invariants(state: &PlannerState) {
    if let Err(msg) = try_validate_invariants(state) {
        panic!("Invariant violation: {}", msg);
    }
}

/// Non-panicking variant of `validate_invariants`.
/// Returns `Err(message)` on the first failure, `Ok(())` if all pass.
pub fn try_validate_invariants(state: &PlannerState) -> Result<(), String> {
    try_check_unique_ids(state)?;
    try_check_entity_fields(state)?;
    try_check_single_occupant(state)?;
    try_check_factory_requires_role(state)?;
    try_check_assignment_refs(state)?;
    try_check_factory_matches_role(state)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Individual checks (private)
// ---------------------------------------------------------------------------

fn unique_ids<T: Entity>(collection: &Collection<T>) -> Result<(), String> {
    let mut seen: BTreeSet<&str> = BTreeSet::new();
    for item in collection.iter() {
        if !seen.insert(item.id()) {
            return Err(format!(
                "[INVARIANT:unique_ids] Duplicate {} id {:?}",
                T::KIND,
                item.id()
            ));
        }
    }
    Ok(())
}

/// No id appears twice within one collection.
fn try_check_unique_ids(state: &PlannerState) -> Result<(), String> {
    unique_ids(&state.roles)?;
    unique_ids(&state.personnel)?;
    unique_ids(&state.factories)?;
    unique_ids(&state.phases)?;
    unique_ids(&state.scenarios)?;
    Ok(())
}

fn fields_valid<T: Entity>(collection: &Collection<T>) -> Result<(), String> {
    for item in collection.iter() {
        item.validate()
            .map_err(|e| format!("[INVARIANT:entity_fields] {}", e))?;
    }
    Ok(())
}

/// Every record passes its own field validation.
fn try_check_entity_fields(state: &PlannerState) -> Result<(), String> {
    fields_valid(&state.roles)?;
    fields_valid(&state.personnel)?;
    fields_valid(&state.factories)?;
    fields_valid(&state.phases)?;
    fields_valid(&state.scenarios)?;
    Ok(())
}

/// At most one personnel references a given role.
fn try_check_single_occupant(state: &PlannerState) -> Result<(), String> {
    let mut holders: BTreeMap<&str, &str> = BTreeMap::new();
    for person in state.personnel.iter() {
        if let Some(role_id) = person.assigned_role.as_deref() {
            if let Some(other) = holders.insert(role_id, person.id.as_str()) {
                return Err(format!(
                    "[INVARIANT:single_occupant] Role {:?} is held by both {:?} and {:?}",
                    role_id, other, person.id
                ));
            }
        }
    }
    Ok(())
}

/// A person is only at a factory through a role.
fn try_check_factory_requires_role(state: &PlannerState) -> Result<(), String> {
    for person in state.personnel.iter() {
        if person.assigned_factory.is_some() && person.assigned_role.is_none() {
            return Err(format!(
                "[INVARIANT:factory_requires_role] Personnel {:?} has assignedFactory without assignedRole",
                person.id
            ));
        }
    }
    Ok(())
}

/// Every assignedRole resolves to an existing role.
fn try_check_assignment_refs(state: &PlannerState) -> Result<(), String> {
    for person in state.personnel.iter() {
        if let Some(role_id) = person.assigned_role.as_deref() {
            if !state.roles.contains(role_id) {
                return Err(format!(
                    "[INVARIANT:assignment_refs] Personnel {:?} references missing role {:?}",
                    person.id, role_id
                ));
            }
        }
    }
    Ok(())
}

/// assignedFactory mirrors the held role's factory (null for shared roles).
fn try_check_factory_matches_role(state: &PlannerState) -> Result<(), String> {
    for person in state.personnel.iter() {
        let Some(role) = person
            .assigned_role
            .as_deref()
            .and_then(|rid| state.roles.get(rid))
        else {
            continue;
        };
        if person.assigned_factory.as_deref() != role.factory_id() {
            return Err(format!(
                "[INVARIANT:factory_matches_role] Personnel {:?} is at factory {:?} but role {:?} places it at {:?}",
                person.id,
                person.assigned_factory,
                role.id,
                role.factory_id()
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Level, Personnel, PersonnelDraft, Role, RoleDraft, SalaryRange};
    use chrono::Utc;

    fn fixture() -> PlannerState {
        let now = Utc::now();
        let mut state = PlannerState::new();
        state.roles.upsert(Role::from_draft(
            "r1".into(),
            RoleDraft::new("Director", Level::Leadership, SalaryRange::new(1, 2)),
            now,
        ));
        state.roles.upsert(Role::from_draft(
            "r2".into(),
            RoleDraft::new("Manager", Level::Leadership, SalaryRange::new(1, 2)).at_factory("f1"),
            now,
        ));
        for id in ["p1", "p2"] {
            state
                .personnel
                .upsert(Personnel::from_draft(id.into(), PersonnelDraft::named(id), now));
        }
        state
    }

    #[test]
    fn test_clean_state_passes() {
        let state = fixture();
        assert!(try_validate_invariants(&state).is_ok());
        validate_invariants(&state);
    }

    #[test]
    fn test_double_occupancy_rejected() {
        let mut state = fixture();
        for id in ["p1", "p2"] {
            state.personnel.get_mut(id).unwrap().assigned_role = Some("r1".into());
        }
        let err = try_validate_invariants(&state).unwrap_err();
        assert!(err.contains("single_occupant"), "{}", err);
    }

    #[test]
    fn test_factory_without_role_rejected() {
        let mut state = fixture();
        state.personnel.get_mut("p1").unwrap().assigned_factory = Some("f1".into());
        let err = try_validate_invariants(&state).unwrap_err();
        assert!(err.contains("entity_fields") || err.contains("factory_requires_role"));
    }

    #[test]
    fn test_dangling_role_reference_rejected() {
        let mut state = fixture();
        state.personnel.get_mut("p1").unwrap().assigned_role = Some("gone".into());
        let err = try_validate_invariants(&state).unwrap_err();
        assert!(err.contains("assignment_refs"), "{}", err);
    }

    #[test]
    fn test_factory_must_follow_role() {
        let mut state = fixture();
        let p = state.personnel.get_mut("p1").unwrap();
        p.assigned_role = Some("r2".into());
        let err = try_validate_invariants(&state).unwrap_err();
        assert!(err.contains("factory_matches_role"), "{}", err);

        state.personnel.get_mut("p1").unwrap().assigned_factory = Some("f1".into());
        assert!(try_validate_invariants(&state).is_ok());
    }

    #[test]
    #[should_panic(expected = "Invariant violation")]
    fn test_validate_invariants_panics() {
        let mut state = fixture();
        state.personnel.get_mut("p1").unwrap().assigned_role = Some("gone".into());
        validate_invariants(&state);
    }
}
