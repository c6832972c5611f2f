//! Runtime configuration.
//!
//! Precedence: defaults < JSON file < `ORG_PLANNER_*` environment variables.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use org_planner_core::transitions::RoleDeletionPolicy;
use org_planner_core::{PlannerError, PlannerResult};

use crate::document_store::{DocumentStore, MemoryDocumentStore};
use crate::file_store::FileDocumentStore;

pub const ENV_BACKEND: &str = "ORG_PLANNER_BACKEND";
pub const ENV_DATA_DIR: &str = "ORG_PLANNER_DATA_DIR";
pub const ENV_ROLE_DELETE: &str = "ORG_PLANNER_ROLE_DELETE";
pub const ENV_ADMINS: &str = "ORG_PLANNER_ADMINS";
pub const ENV_LOG: &str = "ORG_PLANNER_LOG";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    #[default]
    Memory,
    File,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    pub backend: BackendKind,
    pub data_dir: PathBuf,
    pub role_deletion: RoleDeletionPolicy,
    pub admin_emails: Vec<String>,
    pub log_filter: String,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Memory,
            data_dir: PathBuf::from("data"),
            role_deletion: RoleDeletionPolicy::Reject,
            admin_emails: Vec::new(),
            log_filter: "info".to_string(),
        }
    }
}

impl PlannerConfig {
    /// Defaults, then `path` if it exists, then the process environment.
    pub fn load(path: Option<&Path>) -> PlannerResult<Self> {
        let mut config = match path {
            Some(p) if p.exists() => Self::from_file(p)?,
            _ => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> PlannerResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            PlannerError::validation(format!("cannot read config {}: {}", path.display(), e))
        })?;
        serde_json::from_str(&content).map_err(|e| {
            PlannerError::validation(format!("bad config {}: {}", path.display(), e))
        })
    }

    /// Apply `ORG_PLANNER_*` overrides from `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> PlannerResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup(ENV_BACKEND) {
            self.backend = match v.trim() {
                "memory" => BackendKind::Memory,
                "file" => BackendKind::File,
                other => {
                    return Err(PlannerError::validation(format!(
                        "{}: unknown backend {:?}",
                        ENV_BACKEND, other
                    )))
                }
            };
        }
        if let Some(v) = lookup(ENV_DATA_DIR) {
            self.data_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup(ENV_ROLE_DELETE) {
            self.role_deletion = match v.trim() {
                "reject" => RoleDeletionPolicy::Reject,
                "cascade_unassign" => RoleDeletionPolicy::CascadeUnassign,
                other => {
                    return Err(PlannerError::validation(format!(
                        "{}: unknown role deletion policy {:?}",
                        ENV_ROLE_DELETE, other
                    )))
                }
            };
        }
        if let Some(v) = lookup(ENV_ADMINS) {
            self.admin_emails = v
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(v) = lookup(ENV_LOG) {
            self.log_filter = v;
        }
        Ok(())
    }

    /// Build the configured document store.
    pub fn open_backend(&self) -> PlannerResult<Arc<dyn DocumentStore>> {
        match self.backend {
            BackendKind::Memory => Ok(Arc::new(MemoryDocumentStore::new())),
            BackendKind::File => Ok(Arc::new(FileDocumentStore::open(&self.data_dir)?)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_env_overrides() {
        let mut config = PlannerConfig::default();
        config
            .apply_overrides(env(&[
                (ENV_BACKEND, "file"),
                (ENV_DATA_DIR, "/var/lib/planner"),
                (ENV_ROLE_DELETE, "cascade_unassign"),
                (ENV_ADMINS, "a@x.com, b@x.com,,"),
            ]))
            .unwrap();
        assert_eq!(config.backend, BackendKind::File);
        assert_eq!(config.data_dir, PathBuf::from("/var/lib/planner"));
        assert_eq!(config.role_deletion, RoleDeletionPolicy::CascadeUnassign);
        assert_eq!(config.admin_emails, vec!["a@x.com", "b@x.com"]);
        assert_eq!(config.log_filter, "info");
    }

    #[test]
    fn test_unknown_values_rejected() {
        let mut config = PlannerConfig::default();
        let err = config
            .apply_overrides(env(&[(ENV_ROLE_DELETE, "shrug")]))
            .unwrap_err();
        assert!(matches!(err, PlannerError::Validation(_)));
    }

    #[test]
    fn test_file_then_partial_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("planner.json");
        fs::write(&path, r#"{"role_deletion": "cascade_unassign", "log_filter": "debug"}"#).unwrap();
        let config = PlannerConfig::from_file(&path).unwrap();
        assert_eq!(config.role_deletion, RoleDeletionPolicy::CascadeUnassign);
        assert_eq!(config.backend, BackendKind::Memory);
        assert_eq!(config.log_filter, "debug");
    }
}
