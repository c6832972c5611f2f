/// Planner Kernel — Assignment Events
///
/// Events are pure data describing a committed change to the
/// assignment relation. They carry no transition logic. Observers
/// receive them wrapped in a sequenced envelope.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Event schema version carried by every envelope.
pub const SCHEMA_VERSION: u32 = 1;

/// Why a personnel record left a role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnassignCause {
    /// An explicit unassign, or the person moving to another role.
    Requested,
    /// Another person was assigned to the role.
    Displaced,
    /// The role was deleted under the cascading policy.
    RoleDeleted,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum AssignmentEvent {
    Assigned {
        personnel_id: String,
        role_id: String,
        factory_id: Option<String>,
    },
    Unassigned {
        personnel_id: String,
        role_id: String,
        cause: UnassignCause,
    },
}

impl AssignmentEvent {
    pub fn personnel_id(&self) -> &str {
        match self {
            AssignmentEvent::Assigned { personnel_id, .. } => personnel_id,
            AssignmentEvent::Unassigned { personnel_id, .. } => personnel_id,
        }
    }

    pub fn role_id(&self) -> &str {
        match self {
            AssignmentEvent::Assigned { role_id, .. } => role_id,
            AssignmentEvent::Unassigned { role_id, .. } => role_id,
        }
    }
}

/// Event envelope handed to observers. `sequence` is strictly increasing
/// per manager; events of one operation share one `timestamp`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub sequence: u64,
    pub timestamp: DateTime<Utc>,
    pub schema_version: u32,
    pub event: AssignmentEvent,
}

impl EventEnvelope {
    pub fn new(sequence: u64, timestamp: DateTime<Utc>, event: AssignmentEvent) -> Self {
        Self {
            sequence,
            timestamp,
            schema_version: SCHEMA_VERSION,
            event,
        }
    }
}
