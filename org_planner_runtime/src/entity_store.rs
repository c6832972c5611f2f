//! Entity store — typed CRUD over the document store.
//!
//! Persist-then-cache order:
//!   1. plan the change against a cloned snapshot (kernel, pure)
//!   2. commit every touched document in one `WriteBatch`
//!   3. only if step 2 succeeded, apply the change to the cache
//!   4. publish assignment events
//!
//! Every write first claims the records it will rewrite (see `claims`)
//! and only then takes the snapshot it plans against, so a second write
//! touching the same role or person is rejected with `Busy` rather than
//! committing over a stale plan.
//!
//! The cache lock is never held across an `.await`. Concurrent edits
//! from separate processes are last-write-wins at the backend.

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use org_planner_core::domain::{
    validate_entity_id, Activity, ActivityDraft, Entity, EntityKind, Factory, Personnel, Phase,
    Role, Scenario,
};
use org_planner_core::events::EventEnvelope;
use org_planner_core::invariants::try_validate_invariants;
use org_planner_core::state::{Collection, FieldFilter, PlannerState};
use org_planner_core::transitions::{
    check_factory_delete, plan_personnel_delete, plan_role_delete, plan_role_replace,
    RoleDeletionPolicy, TransitionResult,
};
use org_planner_core::{PlannerError, PlannerResult};

use crate::auth::AuthCapability;
use crate::claims::{claim_key, Claim, InFlight};
use crate::document_store::{Document, DocumentStore, Fields, WriteBatch};
use crate::event_bus::EventBus;

/// Fields an update patch may not change.
const PROTECTED_FIELDS: [&str; 4] = ["id", "createdAt", "assignedRole", "assignedFactory"];

// ── Per-kind lifecycle ─────────────────────────────────────────────

/// How replacing or removing a record of this kind affects the rest of
/// the dataset. Defaults touch only the record itself.
pub trait StoredEntity: Entity {
    /// Claim keys a change to record `id` must hold: the record itself
    /// plus every record the change may rewrite.
    fn claim_keys(_state: &PlannerState, id: &str) -> Vec<String> {
        vec![claim_key(Self::KIND, id)]
    }

    /// Keys implied by the record's content once written.
    fn content_keys(&self) -> Vec<String> {
        Vec::new()
    }

    fn plan_replace(
        state: &PlannerState,
        updated: Self,
        _now: DateTime<Utc>,
    ) -> PlannerResult<(PlannerState, TransitionResult)> {
        let mut next = state.clone();
        Self::collection_mut(&mut next).upsert(updated);
        Ok((next, TransitionResult::default()))
    }

    fn plan_remove(
        state: &PlannerState,
        id: &str,
        _policy: RoleDeletionPolicy,
        _now: DateTime<Utc>,
    ) -> PlannerResult<(PlannerState, TransitionResult)> {
        if !Self::collection(state).contains(id) {
            return Err(PlannerError::not_found(Self::KIND, id));
        }
        let mut next = state.clone();
        Self::collection_mut(&mut next).remove(id);
        Ok((next, TransitionResult::default()))
    }
}

impl StoredEntity for Role {
    fn claim_keys(state: &PlannerState, id: &str) -> Vec<String> {
        let mut keys = vec![claim_key(EntityKind::Role, id)];
        if let Some(occupant) = state.occupant_of(id) {
            keys.push(claim_key(EntityKind::Personnel, &occupant.id));
        }
        keys
    }

    /// The occupant follows the role to its factory.
    fn content_keys(&self) -> Vec<String> {
        self.factory_id()
            .map(|factory| claim_key(EntityKind::Factory, factory))
            .into_iter()
            .collect()
    }

    fn plan_replace(
        state: &PlannerState,
        updated: Self,
        now: DateTime<Utc>,
    ) -> PlannerResult<(PlannerState, TransitionResult)> {
        plan_role_replace(state, updated, now)
    }

    fn plan_remove(
        state: &PlannerState,
        id: &str,
        policy: RoleDeletionPolicy,
        now: DateTime<Utc>,
    ) -> PlannerResult<(PlannerState, TransitionResult)> {
        plan_role_delete(state, id, policy, now)
    }
}

impl StoredEntity for Personnel {
    fn claim_keys(state: &PlannerState, id: &str) -> Vec<String> {
        let mut keys = vec![claim_key(EntityKind::Personnel, id)];
        if let Some(role_id) = state
            .personnel
            .get(id)
            .and_then(|p| p.assigned_role.as_deref())
        {
            keys.push(claim_key(EntityKind::Role, role_id));
        }
        keys
    }

    fn plan_remove(
        state: &PlannerState,
        id: &str,
        _policy: RoleDeletionPolicy,
        _now: DateTime<Utc>,
    ) -> PlannerResult<(PlannerState, TransitionResult)> {
        plan_personnel_delete(state, id)
    }
}

impl StoredEntity for Factory {
    fn plan_remove(
        state: &PlannerState,
        id: &str,
        _policy: RoleDeletionPolicy,
        _now: DateTime<Utc>,
    ) -> PlannerResult<(PlannerState, TransitionResult)> {
        check_factory_delete(state, id)?;
        let mut next = state.clone();
        next.factories.remove(id);
        Ok((next, TransitionResult::default()))
    }
}

impl StoredEntity for Phase {}

impl StoredEntity for Scenario {}

// ── Document codec ─────────────────────────────────────────────────

/// Entity → stored field map (`id` lives beside the fields, not in them).
pub(crate) fn to_fields<T: Entity>(entity: &T) -> PlannerResult<Fields> {
    match serde_json::to_value(entity) {
        Ok(Value::Object(mut fields)) => {
            fields.remove("id");
            Ok(fields)
        }
        Ok(_) => Err(PlannerError::validation(format!(
            "{} did not serialize to an object",
            T::KIND
        ))),
        Err(e) => Err(PlannerError::validation(format!(
            "{} serialization failed: {}",
            T::KIND,
            e
        ))),
    }
}

pub(crate) fn from_document<T: Entity>(doc: Document) -> Result<T, serde_json::Error> {
    let mut obj = Map::new();
    obj.insert("id".to_string(), Value::String(doc.id));
    obj.extend(doc.fields);
    serde_json::from_value(Value::Object(obj))
}

fn to_object<S: serde::Serialize>(value: &S, what: &str) -> PlannerResult<Map<String, Value>> {
    match serde_json::to_value(value) {
        Ok(Value::Object(m)) => Ok(m),
        _ => Err(PlannerError::validation(format!("{} is not an object", what))),
    }
}

/// Overlay `patch` onto `current`, refusing changes to `protected` keys.
fn merge_patch<T>(current: &T, patch: &Fields, protected: &[&str], what: &str) -> PlannerResult<T>
where
    T: serde::Serialize + serde::de::DeserializeOwned,
{
    let mut doc = to_object(current, what)?;
    for key in protected {
        if let Some(requested) = patch.get(*key) {
            let existing = doc.get(*key).unwrap_or(&Value::Null);
            if existing != requested {
                return Err(PlannerError::validation(format!(
                    "{}.{} cannot be changed by update",
                    what, key
                )));
            }
        }
    }
    for (key, value) in patch {
        doc.insert(key.clone(), value.clone());
    }
    serde_json::from_value(Value::Object(doc))
        .map_err(|e| PlannerError::validation(format!("{} patch rejected: {}", what, e)))
}

// ── Lazy listing ───────────────────────────────────────────────────

/// Lazy, finite iterator over a snapshot of one collection.
/// Call `list` again for a fresh sequence.
pub struct EntityIter<T> {
    items: std::vec::IntoIter<T>,
    filter: Option<FieldFilter>,
}

impl<T: Entity> Iterator for EntityIter<T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        loop {
            let item = self.items.next()?;
            match &self.filter {
                Some(f) if !f.matches(&item) => continue,
                _ => return Some(item),
            }
        }
    }
}

// ── Store ──────────────────────────────────────────────────────────

pub struct EntityStore {
    backend: Arc<dyn DocumentStore>,
    auth: Arc<dyn AuthCapability>,
    policy: RoleDeletionPolicy,
    cache: RwLock<PlannerState>,
    events: EventBus,
    in_flight: InFlight,
}

impl EntityStore {
    /// An empty store. Call `load` to hydrate from the backend.
    pub fn new(
        backend: Arc<dyn DocumentStore>,
        auth: Arc<dyn AuthCapability>,
        policy: RoleDeletionPolicy,
    ) -> Self {
        Self {
            backend,
            auth,
            policy,
            cache: RwLock::new(PlannerState::new()),
            events: EventBus::default(),
            in_flight: InFlight::default(),
        }
    }

    pub async fn open(
        backend: Arc<dyn DocumentStore>,
        auth: Arc<dyn AuthCapability>,
        policy: RoleDeletionPolicy,
    ) -> PlannerResult<Self> {
        let store = Self::new(backend, auth, policy);
        store.load().await?;
        Ok(store)
    }

    /// Replace the cache with the backend's contents. Malformed documents
    /// are skipped with a warning. Returns the number of records loaded.
    pub async fn load(&self) -> PlannerResult<usize> {
        let state = PlannerState {
            roles: self.load_collection::<Role>().await?,
            personnel: self.load_collection::<Personnel>().await?,
            factories: self.load_collection::<Factory>().await?,
            phases: self.load_collection::<Phase>().await?,
            scenarios: self.load_collection::<Scenario>().await?,
        };
        if let Err(msg) = try_validate_invariants(&state) {
            warn!(%msg, "loaded dataset violates an invariant");
        }
        let count = record_count(&state);
        info!(
            roles = state.roles.len(),
            personnel = state.personnel.len(),
            factories = state.factories.len(),
            phases = state.phases.len(),
            scenarios = state.scenarios.len(),
            "entity store loaded"
        );
        *self.write_cache() = state;
        Ok(count)
    }

    async fn load_collection<T: Entity>(&self) -> PlannerResult<Collection<T>> {
        let docs = self.backend.list(T::KIND.collection_name(), None).await?;
        let mut out = Collection::new();
        for doc in docs {
            let id = doc.id.clone();
            match from_document::<T>(doc) {
                Ok(entity) => out.upsert(entity),
                Err(e) => warn!(kind = %T::KIND, %id, error = %e, "skipping malformed document"),
            }
        }
        Ok(out)
    }

    pub fn policy(&self) -> RoleDeletionPolicy {
        self.policy
    }

    pub fn auth(&self) -> &Arc<dyn AuthCapability> {
        &self.auth
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Owned copy of the whole dataset.
    pub fn snapshot(&self) -> PlannerState {
        self.read_cache().clone()
    }

    /// Run `f` against the cached dataset without cloning it.
    pub fn read<R>(&self, f: impl FnOnce(&PlannerState) -> R) -> R {
        f(&self.read_cache())
    }

    pub fn is_empty(&self) -> bool {
        record_count(&self.read_cache()) == 0
    }

    // ── Reads ──

    pub fn get<T: Entity>(&self, id: &str) -> PlannerResult<T> {
        self.read(|state| T::collection(state).get(id).cloned())
            .ok_or_else(|| PlannerError::not_found(T::KIND, id))
    }

    /// Records of `T` in insertion order, optionally exact-matched on one field.
    pub fn list<T: Entity>(&self, filter: Option<FieldFilter>) -> EntityIter<T> {
        let items: Vec<T> = T::collection(&self.read_cache()).iter().cloned().collect();
        EntityIter {
            items: items.into_iter(),
            filter,
        }
    }

    // ── Writes ──

    pub async fn create<T: StoredEntity>(&self, draft: T::Draft) -> PlannerResult<T> {
        self.create_with_id(&Uuid::new_v4().to_string(), draft).await
    }

    /// Create under a caller-chosen id (seeding, imports).
    pub async fn create_with_id<T: StoredEntity>(&self, id: &str, draft: T::Draft) -> PlannerResult<T> {
        self.auth.require_edit(&format!("create {}", T::KIND))?;
        validate_entity_id(T::KIND, id)?;
        let (claim, snapshot) = self.hold(|_| vec![claim_key(T::KIND, id)])?;
        if T::collection(&snapshot).contains(id) {
            return Err(PlannerError::Conflict(format!("{} {:?} already exists", T::KIND, id)));
        }

        let now = Utc::now();
        let entity = T::from_draft(id.to_string(), draft, now);
        entity.validate()?;

        let mut batch = WriteBatch::new();
        batch.put(T::KIND.collection_name(), id, to_fields(&entity)?);
        let cached = entity.clone();
        self.commit_transition(batch, &PlannerState::new(), &TransitionResult::default(), now, move |cache| {
            T::collection_mut(cache).upsert(cached);
        })
        .await?;
        drop(claim);

        info!(kind = %T::KIND, id, "created");
        Ok(entity)
    }

    /// Merge a JSON object patch into the record and persist it.
    pub async fn update<T: StoredEntity>(&self, id: &str, patch: Fields) -> PlannerResult<T> {
        self.auth.require_edit(&format!("update {}", T::KIND))?;
        let what = T::KIND.to_string();
        let saved = self
            .modify(id, |current: &T| merge_patch(current, &patch, &PROTECTED_FIELDS, &what))
            .await?;
        info!(kind = %T::KIND, id, fields = patch.len(), "updated");
        Ok(saved)
    }

    /// Remove a record. Role removal follows the configured deletion policy.
    pub async fn delete<T: StoredEntity>(&self, id: &str) -> PlannerResult<()> {
        self.auth.require_edit(&format!("delete {}", T::KIND))?;
        let (claim, snapshot) = self.hold(|state| T::claim_keys(state, id))?;
        let now = Utc::now();
        let (next, result) = T::plan_remove(&snapshot, id, self.policy, now)?;

        let mut batch = WriteBatch::new();
        batch.delete(T::KIND.collection_name(), id);
        let removed = id.to_string();
        self.commit_transition(batch, &next, &result, now, move |cache| {
            T::collection_mut(cache).remove(&removed);
        })
        .await?;
        drop(claim);

        info!(kind = %T::KIND, id, unassigned = result.touched.len(), "deleted");
        Ok(())
    }

    /// Claim record `id` and everything its change rewrites, then persist
    /// `edit` applied to the claimed copy. `edit` may run more than once.
    async fn modify<T, F>(&self, id: &str, edit: F) -> PlannerResult<T>
    where
        T: StoredEntity,
        F: Fn(&T) -> PlannerResult<T> + Send + Sync,
    {
        let (claim, snapshot) = self.hold(|state| {
            let mut keys = T::claim_keys(state, id);
            if let Some(edited) = T::collection(state).get(id).and_then(|current| edit(current).ok()) {
                keys.extend(edited.content_keys());
            }
            keys
        })?;
        let current = T::collection(&snapshot)
            .get(id)
            .ok_or_else(|| PlannerError::not_found(T::KIND, id))?;
        let mut entity = edit(current)?;
        let now = Utc::now();
        entity.touch(now);
        entity.validate()?;

        let (next, result) = T::plan_replace(&snapshot, entity.clone(), now)?;

        let mut batch = WriteBatch::new();
        batch.put(T::KIND.collection_name(), entity.id(), to_fields(&entity)?);
        let cached = entity.clone();
        self.commit_transition(batch, &next, &result, now, move |cache| {
            T::collection_mut(cache).upsert(cached);
        })
        .await?;
        drop(claim);
        Ok(entity)
    }

    /// Write every record of `state` in one batch and adopt it as the cache.
    pub async fn seed(&self, state: PlannerState) -> PlannerResult<usize> {
        self.auth.require_edit("seed dataset")?;
        let mut batch = WriteBatch::new();
        put_all(&mut batch, &state.roles)?;
        put_all(&mut batch, &state.personnel)?;
        put_all(&mut batch, &state.factories)?;
        put_all(&mut batch, &state.phases)?;
        put_all(&mut batch, &state.scenarios)?;
        let count = batch.len();

        self.backend.commit(batch).await.map_err(|e| {
            warn!(error = %e, "seed commit failed");
            PlannerError::from(e)
        })?;
        *self.write_cache() = state;
        info!(records = count, "dataset seeded");
        Ok(count)
    }

    // ── Timeline ──

    pub async fn add_activity(&self, phase_id: &str, draft: ActivityDraft) -> PlannerResult<Activity> {
        self.auth.require_edit("add activity")?;
        let activity = Activity {
            id: Uuid::new_v4().to_string(),
            title: draft.title,
            description: draft.description,
            order: draft.order,
        };
        self.modify(phase_id, |phase: &Phase| {
            let mut phase = phase.clone();
            phase.activities.push(activity.clone());
            Ok(phase)
        })
        .await?;
        debug!(phase_id, activity_id = %activity.id, "activity added");
        Ok(activity)
    }

    pub async fn update_activity(
        &self,
        phase_id: &str,
        activity_id: &str,
        patch: Fields,
    ) -> PlannerResult<Activity> {
        self.auth.require_edit("update activity")?;
        let phase = self
            .modify(phase_id, |phase: &Phase| {
                let mut phase = phase.clone();
                let slot = phase
                    .activities
                    .iter_mut()
                    .find(|a| a.id == activity_id)
                    .ok_or_else(|| activity_not_found(phase_id, activity_id))?;
                *slot = merge_patch(&*slot, &patch, &["id"], "activity")?;
                Ok(phase)
            })
            .await?;
        let merged = phase
            .activities
            .into_iter()
            .find(|a| a.id == activity_id)
            .ok_or_else(|| activity_not_found(phase_id, activity_id))?;
        debug!(phase_id, activity_id, "activity updated");
        Ok(merged)
    }

    pub async fn remove_activity(&self, phase_id: &str, activity_id: &str) -> PlannerResult<()> {
        self.auth.require_edit("remove activity")?;
        self.modify(phase_id, |phase: &Phase| {
            let mut phase = phase.clone();
            let before = phase.activities.len();
            phase.activities.retain(|a| a.id != activity_id);
            if phase.activities.len() == before {
                return Err(activity_not_found(phase_id, activity_id));
            }
            Ok(phase)
        })
        .await?;
        debug!(phase_id, activity_id, "activity removed");
        Ok(())
    }

    /// Phases by `order` (ties by insertion), each with its activities by `order`.
    pub fn ordered_phases(&self) -> Vec<Phase> {
        self.read(|state| {
            state
                .ordered_phases()
                .into_iter()
                .map(|phase| {
                    let mut phase = phase.clone();
                    phase.activities.sort_by_key(|a| a.order);
                    phase
                })
                .collect()
        })
    }

    // ── Commit path ──

    /// Claim every key `needed` reports for the cache, re-reading until the
    /// claimed set covers the snapshot it was computed from. The returned
    /// snapshot stays valid for the claimed records while the claim lives.
    pub(crate) fn hold<F>(&self, needed: F) -> PlannerResult<(Claim<'_>, PlannerState)>
    where
        F: Fn(&PlannerState) -> Vec<String>,
    {
        let mut claim = self.in_flight.claim(&[])?;
        loop {
            let snapshot = self.snapshot();
            let keys = needed(&snapshot);
            if keys.iter().all(|key| claim.holds(key)) {
                return Ok((claim, snapshot));
            }
            for key in &keys {
                claim.add(key)?;
            }
        }
    }

    /// Commit `batch` plus every personnel record `result` touched, then
    /// apply `cache_edit` and the touched records to the cache, then
    /// publish the events. The cache is untouched if the commit fails.
    pub(crate) async fn commit_transition<F>(
        &self,
        mut batch: WriteBatch,
        next: &PlannerState,
        result: &TransitionResult,
        now: DateTime<Utc>,
        cache_edit: F,
    ) -> PlannerResult<Vec<EventEnvelope>>
    where
        F: FnOnce(&mut PlannerState) + Send,
    {
        let mut touched = Vec::with_capacity(result.touched.len());
        for pid in &result.touched {
            let Some(person) = next.personnel.get(pid) else {
                continue;
            };
            batch.put(EntityKind::Personnel.collection_name(), pid, to_fields(person)?);
            touched.push(person.clone());
        }

        if !batch.is_empty() {
            let ops = batch.len();
            self.backend.commit(batch).await.map_err(|e| {
                warn!(error = %e, ops, "commit failed; cache left unchanged");
                PlannerError::from(e)
            })?;
        }

        {
            let mut cache = self.write_cache();
            cache_edit(&mut cache);
            for person in touched {
                cache.personnel.upsert(person);
            }
        }
        Ok(self.events.publish(result.events.clone(), now))
    }

    fn read_cache(&self) -> RwLockReadGuard<'_, PlannerState> {
        self.cache.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_cache(&self) -> RwLockWriteGuard<'_, PlannerState> {
        self.cache.write().unwrap_or_else(PoisonError::into_inner)
    }
}

fn put_all<T: Entity>(batch: &mut WriteBatch, collection: &Collection<T>) -> PlannerResult<()> {
    for entity in collection.iter() {
        batch.put(T::KIND.collection_name(), entity.id(), to_fields(entity)?);
    }
    Ok(())
}

fn record_count(state: &PlannerState) -> usize {
    state.roles.len()
        + state.personnel.len()
        + state.factories.len()
        + state.phases.len()
        + state.scenarios.len()
}

fn activity_not_found(phase_id: &str, activity_id: &str) -> PlannerError {
    PlannerError::not_found(EntityKind::Phase, format!("{}/activities/{}", phase_id, activity_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Capability;
    use crate::document_store::MemoryDocumentStore;
    use org_planner_core::domain::{Level, PersonnelDraft, PhaseDraft, RoleDraft, SalaryRange};
    use serde_json::json;

    fn patch(v: Value) -> Fields {
        match v {
            Value::Object(m) => m,
            _ => Fields::new(),
        }
    }

    fn store() -> EntityStore {
        EntityStore::new(
            Arc::new(MemoryDocumentStore::new()),
            Arc::new(Capability::EDITOR),
            RoleDeletionPolicy::Reject,
        )
    }

    #[tokio::test]
    async fn test_create_generates_id_and_timestamps() {
        let store = store();
        let p: Personnel = store.create(PersonnelDraft::named("Ada")).await.unwrap();
        assert!(Uuid::parse_str(&p.id).is_ok());
        assert_eq!(p.created_at, p.updated_at);
        assert_eq!(store.get::<Personnel>(&p.id).unwrap(), p);
    }

    #[tokio::test]
    async fn test_create_rejects_empty_name() {
        let store = store();
        let err = store.create::<Personnel>(PersonnelDraft::named(" ")).await.unwrap_err();
        assert!(matches!(err, PlannerError::Validation(_)));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_update_merges_and_protects_fields() {
        let store = store();
        let role: Role = store
            .create(RoleDraft::new("Inspector", Level::Associate, SalaryRange::new(40_000, 50_000)))
            .await
            .unwrap();

        let updated: Role = store
            .update(&role.id, patch(json!({"title": "Senior Inspector", "costCenter": "Q-7"})))
            .await
            .unwrap();
        assert_eq!(updated.title, "Senior Inspector");
        assert_eq!(updated.extra["costCenter"], json!("Q-7"));
        assert!(updated.updated_at >= role.updated_at);
        assert_eq!(updated.created_at, role.created_at);

        let err = store
            .update::<Role>(&role.id, patch(json!({"id": "other"})))
            .await
            .unwrap_err();
        assert!(matches!(err, PlannerError::Validation(_)));

        let same_id = store.update::<Role>(&role.id, patch(json!({"id": role.id}))).await;
        assert!(same_id.is_ok());
    }

    #[tokio::test]
    async fn test_update_cannot_touch_assignment_fields() {
        let store = store();
        let p: Personnel = store.create(PersonnelDraft::named("Ada")).await.unwrap();
        let err = store
            .update::<Personnel>(&p.id, patch(json!({"assignedRole": "r1"})))
            .await
            .unwrap_err();
        assert!(matches!(err, PlannerError::Validation(msg) if msg.contains("assignedRole")));
    }

    #[tokio::test]
    async fn test_missing_ids_are_not_found() {
        let store = store();
        assert!(matches!(store.get::<Factory>("nope"), Err(PlannerError::NotFound { .. })));
        assert!(matches!(
            store.update::<Factory>("nope", Fields::new()).await,
            Err(PlannerError::NotFound { .. })
        ));
        assert!(matches!(
            store.delete::<Scenario>("nope").await,
            Err(PlannerError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_list_is_lazy_filtered_and_restartable() {
        let store = store();
        for name in ["Ada", "Bo", "Cy"] {
            store.create::<Personnel>(PersonnelDraft::named(name)).await.unwrap();
        }
        let names: Vec<String> = store.list::<Personnel>(None).map(|p| p.name).collect();
        assert_eq!(names, vec!["Ada", "Bo", "Cy"]);

        let mut only_bo = store.list::<Personnel>(Some(FieldFilter::equals("name", "Bo")));
        assert_eq!(only_bo.next().map(|p| p.name), Some("Bo".to_string()));
        assert!(only_bo.next().is_none());
        assert_eq!(store.list::<Personnel>(None).count(), 3);
    }

    #[tokio::test]
    async fn test_writes_require_edit_capability() {
        let store = EntityStore::new(
            Arc::new(MemoryDocumentStore::new()),
            Arc::new(Capability { read_only: true, ..Capability::EDITOR }),
            RoleDeletionPolicy::Reject,
        );
        let err = store.create::<Personnel>(PersonnelDraft::named("Ada")).await.unwrap_err();
        assert!(matches!(err, PlannerError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn test_timeline_helpers() {
        let store = store();
        let phase: Phase = store
            .create(PhaseDraft {
                title: "Foundation".into(),
                order: 1,
                ..Default::default()
            })
            .await
            .unwrap();
        let later = store
            .add_activity(&phase.id, ActivityDraft { title: "Audit".into(), order: 2, ..Default::default() })
            .await
            .unwrap();
        let first = store
            .add_activity(&phase.id, ActivityDraft { title: "Hire".into(), order: 1, ..Default::default() })
            .await
            .unwrap();

        let phases = store.ordered_phases();
        let titles: Vec<&str> = phases[0].activities.iter().map(|a| a.title.as_str()).collect();
        assert_eq!(titles, vec!["Hire", "Audit"]);

        let renamed = store
            .update_activity(&phase.id, &later.id, patch(json!({"title": "External audit"})))
            .await
            .unwrap();
        assert_eq!(renamed.order, 2);

        store.remove_activity(&phase.id, &first.id).await.unwrap();
        assert!(matches!(
            store.remove_activity(&phase.id, &first.id).await,
            Err(PlannerError::NotFound { .. })
        ));
        assert_eq!(store.get::<Phase>(&phase.id).unwrap().activities.len(), 1);
    }

    #[tokio::test]
    async fn test_writes_on_claimed_records_are_busy() {
        let store = store();
        let role: Role = store
            .create(RoleDraft::new("Inspector", Level::Associate, SalaryRange::new(40_000, 50_000)))
            .await
            .unwrap();
        let p: Personnel = store.create(PersonnelDraft::named("Ada")).await.unwrap();

        let role_key = claim_key(EntityKind::Role, &role.id);
        let held = store.in_flight.claim(&[role_key.clone()]).unwrap();
        assert!(matches!(
            store.update::<Role>(&role.id, patch(json!({"title": "Lead"}))).await,
            Err(PlannerError::Busy(key)) if key == role_key
        ));
        assert!(matches!(
            store.delete::<Role>(&role.id).await,
            Err(PlannerError::Busy(key)) if key == role_key
        ));
        // other records are free, and nothing leaked from the rejected writes
        assert!(store.update::<Personnel>(&p.id, patch(json!({"position": "QA"}))).await.is_ok());
        drop(held);

        store.delete::<Role>(&role.id).await.unwrap();
    }

    #[tokio::test]
    async fn test_hold_covers_records_found_under_the_claim() {
        let store = store();
        let role: Role = store
            .create(RoleDraft::new("Inspector", Level::Associate, SalaryRange::new(40_000, 50_000)))
            .await
            .unwrap();
        let mut ada = Personnel::from_draft("p1".into(), PersonnelDraft::named("Ada"), Utc::now());
        ada.assigned_role = Some(role.id.clone());
        store.write_cache().personnel.upsert(ada);

        let (claim, snapshot) = store.hold(|s| Role::claim_keys(s, &role.id)).unwrap();
        assert!(claim.holds(&claim_key(EntityKind::Role, &role.id)));
        assert!(claim.holds("personnel:p1"));
        assert_eq!(snapshot.occupant_of(&role.id).map(|p| p.id.as_str()), Some("p1"));
        assert!(matches!(
            store.delete::<Personnel>("p1").await,
            Err(PlannerError::Busy(key)) if key == "personnel:p1"
        ));
    }

    #[tokio::test]
    async fn test_load_rehydrates_and_skips_malformed() {
        let backend = Arc::new(MemoryDocumentStore::new());
        let mut batch = WriteBatch::new();
        batch
            .put("personnel", "p1", patch(json!({"name": "Ada", "badgeNo": 7})))
            .put("roles", "broken", patch(json!({"title": "No level"})));
        backend.commit(batch).await.unwrap();

        let store = EntityStore::open(backend, Arc::new(Capability::EDITOR), RoleDeletionPolicy::Reject)
            .await
            .unwrap();
        let p: Personnel = store.get("p1").unwrap();
        assert_eq!(p.extra["badgeNo"], json!(7));
        assert!(store.get::<Role>("broken").is_err());
    }
}
