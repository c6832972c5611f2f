//! In-flight claims — ids held by write operations that have not resolved.
//!
//! Every write that can move an assignment claims the records it reads
//! before planning, so a second operation on any of them is rejected with
//! `Busy` instead of planning against a snapshot that is about to go stale.
//! Claims are released when the owning operation returns, success or not.

use std::collections::BTreeSet;
use std::sync::{Mutex, PoisonError};

use org_planner_core::domain::EntityKind;
use org_planner_core::{PlannerError, PlannerResult};

/// `"<kind>:<id>"`, e.g. `role:r-eng`.
pub(crate) fn claim_key(kind: EntityKind, id: &str) -> String {
    format!("{}:{}", kind, id)
}

#[derive(Debug, Default)]
pub(crate) struct InFlight {
    keys: Mutex<BTreeSet<String>>,
}

impl InFlight {
    pub(crate) fn claim(&self, keys: &[String]) -> PlannerResult<Claim<'_>> {
        let mut claim = Claim {
            owner: self,
            keys: Vec::with_capacity(keys.len()),
        };
        for key in keys {
            claim.add(key)?;
        }
        Ok(claim)
    }
}

/// RAII set of claimed ids.
pub(crate) struct Claim<'a> {
    owner: &'a InFlight,
    keys: Vec<String>,
}

impl Claim<'_> {
    pub(crate) fn add(&mut self, key: &str) -> PlannerResult<()> {
        if self.holds(key) {
            return Ok(());
        }
        let mut held = self.owner.keys.lock().unwrap_or_else(PoisonError::into_inner);
        if !held.insert(key.to_string()) {
            return Err(PlannerError::Busy(key.to_string()));
        }
        self.keys.push(key.to_string());
        Ok(())
    }

    pub(crate) fn holds(&self, key: &str) -> bool {
        self.keys.iter().any(|k| k == key)
    }
}

impl Drop for Claim<'_> {
    fn drop(&mut self) {
        let mut held = self.owner.keys.lock().unwrap_or_else(PoisonError::into_inner);
        for key in &self.keys {
            held.remove(key);
        }
    }
}
