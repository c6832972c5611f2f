//! Interaction controller — feeds resolved gestures to the assignment manager.
//!
//! The drag session is re-gated from the auth capability on every event,
//! so a read-only toggle mid-drag makes the drop inert. `Unauthorized`
//! from the manager is also treated as inert, never surfaced.

use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, info};

use org_planner_core::domain::Personnel;
use org_planner_core::interaction::{
    DragSession, GestureAdapter, GestureOutcome, Intent, PointerAdapter, PointerEvent,
    TouchAdapter, TouchEvent,
};
use org_planner_core::{PlannerError, PlannerResult};

use crate::assignment::AssignmentManager;

/// What a handled input event amounted to.
#[derive(Debug, Clone, PartialEq)]
pub enum ControllerOutcome {
    /// The gesture is still in progress.
    Pending,
    /// An intent ran; carries the dragged person's resulting record.
    Applied { intent: Intent, personnel: Personnel },
    /// Recognised but not permitted; nothing changed.
    Inert,
    /// Aborted or dropped outside any target; nothing changed.
    Cancelled,
}

pub struct InteractionController {
    manager: Arc<AssignmentManager>,
    session: Mutex<DragSession>,
}

impl InteractionController {
    pub fn new(manager: Arc<AssignmentManager>) -> Self {
        let enabled = manager.store().auth().can_edit();
        Self {
            manager,
            session: Mutex::new(DragSession::new(enabled)),
        }
    }

    /// Whether drag affordances are currently live.
    pub fn is_enabled(&self) -> bool {
        self.manager.store().auth().can_edit()
    }

    pub fn session(&self) -> DragSession {
        self.lock().clone()
    }

    pub async fn pointer(&self, event: PointerEvent) -> PlannerResult<ControllerOutcome> {
        let outcome = self.feed(|session| PointerAdapter.handle(session, event));
        self.finish(outcome).await
    }

    pub async fn touch(&self, event: TouchEvent) -> PlannerResult<ControllerOutcome> {
        let outcome = self.feed(|session| TouchAdapter.handle(session, event));
        self.finish(outcome).await
    }

    fn feed(
        &self,
        handle: impl FnOnce(&mut DragSession) -> Option<GestureOutcome>,
    ) -> Option<GestureOutcome> {
        let enabled = self.is_enabled();
        let mut session = self.lock();
        session.set_enabled(enabled);
        handle(&mut session)
    }

    async fn finish(&self, outcome: Option<GestureOutcome>) -> PlannerResult<ControllerOutcome> {
        match outcome {
            None => Ok(ControllerOutcome::Pending),
            Some(GestureOutcome::Cancelled) => {
                debug!("drag cancelled");
                Ok(ControllerOutcome::Cancelled)
            }
            Some(GestureOutcome::Inert) => {
                info!("drop ignored: editing disabled");
                Ok(ControllerOutcome::Inert)
            }
            Some(GestureOutcome::Dispatch(intent)) => match self.manager.dispatch(&intent).await {
                Ok(personnel) => Ok(ControllerOutcome::Applied { intent, personnel }),
                Err(PlannerError::Unauthorized(reason)) => {
                    info!(%reason, "drop ignored: unauthorized");
                    Ok(ControllerOutcome::Inert)
                }
                Err(e) => Err(e),
            },
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, DragSession> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
