/// Planner Kernel — Interaction Surface
///
/// Gesture-to-intent translation. Holds only transient drag state
/// (what is dragged, what is hovered); never authoritative data.
///
/// Pointer and touch input are normalized by two thin adapters that
/// drive the same `DragSession`, so both reach `resolve_intent`
/// through one path.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Payloads, targets, intents
// ---------------------------------------------------------------------------

/// What is being dragged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DragPayload {
    Personnel { id: String },
}

/// Where a drag can land.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DropTarget {
    Role { id: String },
    UnassignedPool,
}

/// A resolved assignment request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "intent", rename_all = "snake_case")]
pub enum Intent {
    Assign { personnel_id: String, role_id: String },
    Unassign { personnel_id: String },
}

impl Intent {
    pub fn personnel_id(&self) -> &str {
        match self {
            Intent::Assign { personnel_id, .. } => personnel_id,
            Intent::Unassign { personnel_id } => personnel_id,
        }
    }
}

/// The one shared gesture-to-intent function.
pub fn resolve_intent(dragged: &DragPayload, target: &DropTarget) -> Intent {
    match (dragged, target) {
        (DragPayload::Personnel { id }, DropTarget::Role { id: role_id }) => Intent::Assign {
            personnel_id: id.clone(),
            role_id: role_id.clone(),
        },
        (DragPayload::Personnel { id }, DropTarget::UnassignedPool) => Intent::Unassign {
            personnel_id: id.clone(),
        },
    }
}

/// Result of finishing a gesture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GestureOutcome {
    /// The caller should hand this intent to the assignment manager.
    Dispatch(Intent),
    /// Recognised, but the session is disabled; nothing is dispatched.
    Inert,
    /// Aborted, dropped outside any target, or nothing was dragged.
    Cancelled,
}

// ---------------------------------------------------------------------------
// Drag session
// ---------------------------------------------------------------------------

/// Transient drag state shared by every input adapter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DragSession {
    enabled: bool,
    dragged: Option<DragPayload>,
    hovered: Option<DropTarget>,
}

impl DragSession {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            dragged: None,
            hovered: None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Gate affordances. Takes effect for the drop of an in-progress drag too.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn dragged(&self) -> Option<&DragPayload> {
        self.dragged.as_ref()
    }

    pub fn hovered(&self) -> Option<&DropTarget> {
        self.hovered.as_ref()
    }

    pub fn is_dragging(&self) -> bool {
        self.dragged.is_some()
    }

    /// Start a drag. A new drag replaces any unfinished one.
    pub fn begin(&mut self, payload: DragPayload) {
        self.dragged = Some(payload);
        self.hovered = None;
    }

    /// Update the hovered target; `None` means over no valid target.
    /// Ignored when nothing is being dragged.
    pub fn hover(&mut self, target: Option<DropTarget>) {
        if self.dragged.is_some() {
            self.hovered = target;
        }
    }

    /// Abort the drag. Produces no intent.
    pub fn cancel(&mut self) {
        self.dragged = None;
        self.hovered = None;
    }

    /// Finish the drag on the currently hovered target.
    pub fn drop_here(&mut self) -> GestureOutcome {
        let dragged = self.dragged.take();
        let hovered = self.hovered.take();
        match (dragged, hovered) {
            (Some(payload), Some(target)) => {
                if self.enabled {
                    GestureOutcome::Dispatch(resolve_intent(&payload, &target))
                } else {
                    GestureOutcome::Inert
                }
            }
            _ => GestureOutcome::Cancelled,
        }
    }
}

// ---------------------------------------------------------------------------
// Input adapters
// ---------------------------------------------------------------------------

/// Normalizes one input family onto a `DragSession`.
/// Returns `Some(outcome)` on the event that ends a gesture.
pub trait GestureAdapter {
    type Event;

    fn handle(&mut self, session: &mut DragSession, event: Self::Event) -> Option<GestureOutcome>;
}

/// Desktop drag-and-drop events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PointerEvent {
    DragStart(DragPayload),
    DragOver(Option<DropTarget>),
    DragLeave,
    Drop(DropTarget),
    /// Drag ended without a drop on a target.
    DragEnd,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PointerAdapter;

impl GestureAdapter for PointerAdapter {
    type Event = PointerEvent;

    fn handle(&mut self, session: &mut DragSession, event: PointerEvent) -> Option<GestureOutcome> {
        match event {
            PointerEvent::DragStart(payload) => {
                session.begin(payload);
                None
            }
            PointerEvent::DragOver(target) => {
                session.hover(target);
                None
            }
            PointerEvent::DragLeave => {
                session.hover(None);
                None
            }
            PointerEvent::Drop(target) => {
                session.hover(Some(target));
                Some(session.drop_here())
            }
            PointerEvent::DragEnd => {
                if !session.is_dragging() {
                    // dragend after a completed drop
                    return None;
                }
                session.cancel();
                Some(GestureOutcome::Cancelled)
            }
        }
    }
}

/// Mobile touch events. The drop target is whatever lies under the
/// finger at the last move.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TouchEvent {
    Start(DragPayload),
    Move(Option<DropTarget>),
    End,
    Cancel,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TouchAdapter;

impl GestureAdapter for TouchAdapter {
    type Event = TouchEvent;

    fn handle(&mut self, session: &mut DragSession, event: TouchEvent) -> Option<GestureOutcome> {
        match event {
            TouchEvent::Start(payload) => {
                session.begin(payload);
                None
            }
            TouchEvent::Move(target) => {
                session.hover(target);
                None
            }
            TouchEvent::End => Some(session.drop_here()),
            TouchEvent::Cancel => {
                session.cancel();
                Some(GestureOutcome::Cancelled)
            }
        }
    }
}
