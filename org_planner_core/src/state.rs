/// Planner Kernel — State Container
///
/// Insertion-ordered collections of every entity kind. The state is a
/// plain value: transitions clone it, mutate the clone, and hand it back.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::{Entity, Factory, Level, Personnel, Phase, Role, Scenario};

/// Insertion-ordered records keyed by their id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Collection<T> {
    items: Vec<T>,
}

impl<T> Default for Collection<T> {
    fn default() -> Self {
        Self { items: Vec::new() }
    }
}

impl<T: Entity> Collection<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&T> {
        self.items.iter().find(|item| item.id() == id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut T> {
        self.items.iter_mut().find(|item| item.id() == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    /// Insert or replace. A replaced record keeps its insertion slot.
    pub fn upsert(&mut self, item: T) {
        match self.items.iter().position(|existing| existing.id() == item.id()) {
            Some(pos) => self.items[pos] = item,
            None => self.items.push(item),
        }
    }

    pub fn remove(&mut self, id: &str) -> Option<T> {
        let pos = self.items.iter().position(|item| item.id() == id)?;
        Some(self.items.remove(pos))
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, T> {
        self.items.iter_mut()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.items
    }
}

impl<T: Entity> FromIterator<T> for Collection<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut collection = Collection::new();
        for item in iter {
            collection.upsert(item);
        }
        collection
    }
}

/// Exact-match filter on one top-level document field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldFilter {
    pub field: String,
    pub value: Value,
}

impl FieldFilter {
    pub fn equals(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Match against a serialized document. A missing field matches `null`.
    pub fn matches_value(&self, doc: &Value) -> bool {
        match doc {
            Value::Object(fields) => self.matches_fields(fields),
            _ => self.value.is_null(),
        }
    }

    /// Match against a document's field map.
    pub fn matches_fields(&self, fields: &Map<String, Value>) -> bool {
        let actual = fields.get(&self.field).unwrap_or(&Value::Null);
        actual == &self.value
    }

    pub fn matches<T: Entity>(&self, entity: &T) -> bool {
        match serde_json::to_value(entity) {
            Ok(doc) => self.matches_value(&doc),
            Err(_) => false,
        }
    }
}

/// Complete in-memory planner snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlannerState {
    pub roles: Collection<Role>,
    pub personnel: Collection<Personnel>,
    pub factories: Collection<Factory>,
    pub phases: Collection<Phase>,
    #[serde(default)]
    pub scenarios: Collection<Scenario>,
}

impl PlannerState {
    pub fn new() -> Self {
        Self::default()
    }

    /// The personnel currently holding `role_id`, if any.
    pub fn occupant_of(&self, role_id: &str) -> Option<&Personnel> {
        self.personnel
            .iter()
            .find(|p| p.assigned_role.as_deref() == Some(role_id))
    }

    pub fn unassigned_personnel(&self) -> impl Iterator<Item = &Personnel> + '_ {
        self.personnel.iter().filter(|p| !p.is_assigned())
    }

    pub fn roles_at_level(&self, level: Level) -> impl Iterator<Item = &Role> + '_ {
        self.roles.iter().filter(move |r| r.level == level)
    }

    /// Roles with no occupant, in insertion order.
    pub fn unfilled_roles(&self) -> impl Iterator<Item = &Role> + '_ {
        self.roles.iter().filter(move |r| self.occupant_of(&r.id).is_none())
    }

    /// Timeline phases in display order: by `order`, ties by insertion.
    pub fn ordered_phases(&self) -> Vec<&Phase> {
        let mut phases: Vec<&Phase> = self.phases.iter().collect();
        phases.sort_by_key(|p| p.order);
        phases
    }
}
