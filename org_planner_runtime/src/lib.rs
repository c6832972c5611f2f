#![forbid(unsafe_code)]

//! Org Planner — Runtime
//!
//! Wraps the pure planner kernel with document persistence, the
//! write-through entity cache, assignment execution, auth gating,
//! gesture dispatch, reporting and dataset snapshots.
//!
//! Domain rules live in the kernel. This crate decides ordering:
//! plan, persist, update the cache, then notify.

pub mod assignment;
pub mod auth;
mod claims;
pub mod config;
pub mod document_store;
pub mod entity_store;
pub mod event_bus;
pub mod export;
pub mod file_store;
pub mod interaction;
pub mod snapshot;
pub mod telemetry;

use std::sync::Arc;

use tracing::info;

use org_planner_core::PlannerResult;

use crate::assignment::AssignmentManager;
use crate::auth::AuthSession;
use crate::config::PlannerConfig;
use crate::entity_store::EntityStore;
use crate::interaction::InteractionController;

/// One wired-up planner: session, store, assignment manager, controller.
pub struct Planner {
    pub auth: Arc<AuthSession>,
    pub store: Arc<EntityStore>,
    pub assignments: Arc<AssignmentManager>,
    pub interaction: InteractionController,
}

impl Planner {
    /// Open the configured backend and hydrate the cache from it.
    pub async fn open(config: &PlannerConfig) -> PlannerResult<Self> {
        let auth = Arc::new(AuthSession::new(&config.admin_emails));
        let backend = config.open_backend()?;
        let store = Arc::new(EntityStore::open(backend, auth.clone(), config.role_deletion).await?);
        let assignments = Arc::new(AssignmentManager::new(store.clone()));
        let interaction = InteractionController::new(assignments.clone());
        info!(backend = ?config.backend, policy = ?config.role_deletion, "planner ready");
        Ok(Self {
            auth,
            store,
            assignments,
            interaction,
        })
    }
}
