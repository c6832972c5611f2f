//! Authentication capability — a boolean gate for writes.
//!
//! Login mechanics live elsewhere; this module only tracks who is signed
//! in, whether they are an administrator, and the client-side read-only
//! toggle. Capability changes are announced on a `watch` channel.

use std::collections::BTreeSet;
use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::info;

use org_planner_core::{PlannerError, PlannerResult};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub uid: String,
    pub email: String,
    pub display_name: Option<String>,
    pub is_admin: bool,
}

/// Snapshot of what the current caller may do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Capability {
    pub signed_in: bool,
    pub is_admin: bool,
    pub read_only: bool,
}

impl Capability {
    /// Signed-in administrator with read-only off.
    pub const EDITOR: Capability = Capability {
        signed_in: true,
        is_admin: true,
        read_only: false,
    };

    pub const ANONYMOUS: Capability = Capability {
        signed_in: false,
        is_admin: false,
        read_only: false,
    };

    pub fn can_edit(&self) -> bool {
        self.signed_in && self.is_admin && !self.read_only
    }
}

/// Source of the current capability, injected into every writer.
pub trait AuthCapability: Send + Sync {
    fn capability(&self) -> Capability;

    fn can_edit(&self) -> bool {
        self.capability().can_edit()
    }

    /// `Unauthorized` unless the caller may edit.
    fn require_edit(&self, action: &str) -> PlannerResult<()> {
        let cap = self.capability();
        if cap.can_edit() {
            return Ok(());
        }
        let reason = if !cap.signed_in {
            "not signed in"
        } else if cap.read_only {
            "read-only mode is on"
        } else {
            "administrator rights required"
        };
        Err(PlannerError::Unauthorized(format!("{}: {}", action, reason)))
    }
}

/// A fixed capability; handy for seeding tools and tests.
impl AuthCapability for Capability {
    fn capability(&self) -> Capability {
        *self
    }
}

#[derive(Debug, Default)]
struct SessionState {
    user: Option<User>,
    read_only: bool,
}

impl SessionState {
    fn capability(&self) -> Capability {
        Capability {
            signed_in: self.user.is_some(),
            is_admin: self.user.as_ref().map_or(false, |u| u.is_admin),
            read_only: self.read_only,
        }
    }
}

/// The signed-in user plus the read-only toggle.
pub struct AuthSession {
    admin_emails: BTreeSet<String>,
    state: Mutex<SessionState>,
    tx: watch::Sender<Capability>,
}

impl AuthSession {
    /// `admin_emails` grant administrator rights at sign-in (case-insensitive).
    pub fn new<I, S>(admin_emails: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let (tx, _rx) = watch::channel(Capability::ANONYMOUS);
        Self {
            admin_emails: admin_emails
                .into_iter()
                .map(|e| normalize_email(e.as_ref()))
                .filter(|e| !e.is_empty())
                .collect(),
            state: Mutex::new(SessionState::default()),
            tx,
        }
    }

    pub fn is_admin_email(&self, email: &str) -> bool {
        self.admin_emails.contains(&normalize_email(email))
    }

    /// Record an authenticated identity. Returns the stored user.
    pub fn sign_in(&self, uid: &str, email: &str, display_name: Option<&str>) -> User {
        let user = User {
            uid: uid.to_string(),
            email: email.to_string(),
            display_name: display_name.map(str::to_string),
            is_admin: self.is_admin_email(email),
        };
        info!(uid, is_admin = user.is_admin, "user signed in");
        self.update(|s| s.user = Some(user.clone()));
        user
    }

    pub fn sign_out(&self) {
        info!("user signed out");
        self.update(|s| s.user = None);
    }

    pub fn set_read_only(&self, read_only: bool) {
        self.update(|s| s.read_only = read_only);
    }

    /// Flip read-only mode. Returns the new value.
    pub fn toggle_read_only(&self) -> bool {
        let mut now = false;
        self.update(|s| {
            s.read_only = !s.read_only;
            now = s.read_only;
        });
        now
    }

    pub fn current_user(&self) -> Option<User> {
        self.lock().user.clone()
    }

    pub fn is_read_only(&self) -> bool {
        self.lock().read_only
    }

    /// Receiver that observes every capability change.
    pub fn subscribe(&self) -> watch::Receiver<Capability> {
        self.tx.subscribe()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply `f` and publish the resulting capability under the same lock,
    /// so watchers see changes in the order they were made.
    fn update(&self, f: impl FnOnce(&mut SessionState)) {
        let mut state = self.lock();
        f(&mut state);
        let cap = state.capability();
        self.tx.send_if_modified(|current| {
            if *current == cap {
                return false;
            }
            *current = cap;
            true
        });
    }
}

impl AuthCapability for AuthSession {
    fn capability(&self) -> Capability {
        self.lock().capability()
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_ascii_lowercase()
}
