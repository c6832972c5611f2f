//! Shared fixtures for the runtime integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Notify;

use org_planner_core::domain::{
    Factory, FactoryDraft, Level, Personnel, PersonnelDraft, Role, RoleDraft, SalaryRange,
};
use org_planner_core::state::FieldFilter;
use org_planner_core::transitions::RoleDeletionPolicy;

use org_planner_runtime::assignment::AssignmentManager;
use org_planner_runtime::auth::{AuthCapability, AuthSession, Capability};
use org_planner_runtime::document_store::{
    Document, DocumentStore, MemoryDocumentStore, StoreError, WriteBatch,
};
use org_planner_runtime::entity_store::EntityStore;

pub const ADMIN_EMAIL: &str = "admin@example.com";

/// Memory store whose next commit can be made to fail.
#[derive(Default)]
pub struct FlakyStore {
    pub inner: MemoryDocumentStore,
    fail_next: AtomicBool,
}

impl FlakyStore {
    pub fn fail_next_commit(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl DocumentStore for FlakyStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError> {
        self.inner.get(collection, id).await
    }

    async fn list(
        &self,
        collection: &str,
        filter: Option<&FieldFilter>,
    ) -> Result<Vec<Document>, StoreError> {
        self.inner.list(collection, filter).await
    }

    async fn commit(&self, batch: WriteBatch) -> Result<(), StoreError> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(StoreError::Unavailable("injected failure".to_string()));
        }
        self.inner.commit(batch).await
    }
}

/// Memory store that parks the next commit until released.
#[derive(Default)]
pub struct GatedStore {
    pub inner: MemoryDocumentStore,
    armed: AtomicBool,
    pub entered: Notify,
    pub release: Notify,
}

impl GatedStore {
    pub fn hold_next_commit(&self) {
        self.armed.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl DocumentStore for GatedStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError> {
        self.inner.get(collection, id).await
    }

    async fn list(
        &self,
        collection: &str,
        filter: Option<&FieldFilter>,
    ) -> Result<Vec<Document>, StoreError> {
        self.inner.list(collection, filter).await
    }

    async fn commit(&self, batch: WriteBatch) -> Result<(), StoreError> {
        if self.armed.swap(false, Ordering::SeqCst) {
            self.entered.notify_one();
            self.release.notified().await;
        }
        self.inner.commit(batch).await
    }
}

/// A session with an administrator signed in.
pub fn admin_session() -> Arc<AuthSession> {
    let auth = Arc::new(AuthSession::new([ADMIN_EMAIL]));
    auth.sign_in("u-admin", ADMIN_EMAIL, Some("Admin"));
    auth
}

pub fn entity_store(
    backend: Arc<dyn DocumentStore>,
    auth: Arc<dyn AuthCapability>,
    policy: RoleDeletionPolicy,
) -> Arc<EntityStore> {
    Arc::new(EntityStore::new(backend, auth, policy))
}

pub fn editor_store(backend: Arc<dyn DocumentStore>, policy: RoleDeletionPolicy) -> Arc<EntityStore> {
    entity_store(backend, Arc::new(Capability::EDITOR), policy)
}

/// Seeds:
///   f1 "Plant A"
///   r-lead  leadership, 90000..110000, foundation
///   r-eng   specialist, 60000..80000, at f1
///   r-assoc associate,  40000..50000, foundation
///   p1 Ada, p2 Bo, p3 Cy (all unassigned)
pub async fn seed_basic(store: &EntityStore) {
    store
        .create_with_id::<Factory>("f1", FactoryDraft::named("Plant A"))
        .await
        .unwrap();
    store
        .create_with_id::<Role>(
            "r-lead",
            RoleDraft::new("Plant Director", Level::Leadership, SalaryRange::new(90_000, 110_000)),
        )
        .await
        .unwrap();
    store
        .create_with_id::<Role>(
            "r-eng",
            RoleDraft::new("Quality Engineer", Level::Specialist, SalaryRange::new(60_000, 80_000))
                .at_factory("f1"),
        )
        .await
        .unwrap();
    store
        .create_with_id::<Role>(
            "r-assoc",
            RoleDraft::new("Inspector", Level::Associate, SalaryRange::new(40_000, 50_000))
                .in_department("Quality"),
        )
        .await
        .unwrap();
    for (id, name) in [("p1", "Ada"), ("p2", "Bo"), ("p3", "Cy")] {
        store
            .create_with_id::<Personnel>(id, PersonnelDraft::named(name))
            .await
            .unwrap();
    }
}

pub async fn seeded_manager(policy: RoleDeletionPolicy) -> Arc<AssignmentManager> {
    let store = editor_store(Arc::new(MemoryDocumentStore::new()), policy);
    seed_basic(&store).await;
    Arc::new(AssignmentManager::new(store))
}
