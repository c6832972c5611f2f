//! Reports, snapshots and the file backend.

mod common;

use std::sync::Arc;

use org_planner_core::aggregation::FactoryFilter;
use org_planner_core::domain::{Personnel, Role};
use org_planner_core::hashing::canonical_hash;
use org_planner_core::transitions::RoleDeletionPolicy;
use org_planner_core::PlannerError;

use org_planner_runtime::assignment::AssignmentManager;
use org_planner_runtime::config::{BackendKind, PlannerConfig};
use org_planner_runtime::document_store::MemoryDocumentStore;
use org_planner_runtime::export::budget_csv;
use org_planner_runtime::file_store::FileDocumentStore;
use org_planner_runtime::snapshot::{export_snapshot, import_snapshot, load_snapshot, save_snapshot};
use org_planner_runtime::{telemetry, Planner};

use common::{editor_store, seed_basic, seeded_manager, ADMIN_EMAIL};

// ─────────────────────────────────────────────────────────────
// Budget CSV
// ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn budget_csv_all_factories() {
    let manager = seeded_manager(RoleDeletionPolicy::Reject).await;
    manager.assign("p1", "r-eng").await.unwrap();
    manager.assign("p2", "r-lead").await.unwrap();

    let csv = manager.store().read(|s| budget_csv(s, &FactoryFilter::All));
    let expected = "\
Category,Description,Personnel Count,Budget Amount
Total,All Factories,3,170000
Level,Leadership,1,100000
Level,Specialist,1,70000
Level,Associate,0,0
Factory,Foundation,1,100000
Factory,Plant A,1,70000

Role Breakdown
Role,Level,Department,Personnel Count,Total Cost
Plant Director,leadership,Foundation,1,100000
Quality Engineer,specialist,Plant A,1,70000
Inspector,associate,Foundation,0,0
";
    assert_eq!(csv, expected);
}

#[tokio::test]
async fn budget_csv_single_factory_view() {
    let manager = seeded_manager(RoleDeletionPolicy::Reject).await;
    manager.assign("p1", "r-eng").await.unwrap();
    manager.assign("p2", "r-lead").await.unwrap();

    let csv = manager
        .store()
        .read(|s| budget_csv(s, &FactoryFilter::Factory("f1".into())));
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(lines[1], "Total,Plant A,1,70000");
    assert!(!csv.contains("Factory,"));
    assert!(csv.ends_with("Quality Engineer,specialist,Plant A,1,70000\n"));
    assert!(!csv.contains("Plant Director"));
}

// ─────────────────────────────────────────────────────────────
// Snapshots
// ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn snapshot_round_trip_into_empty_store() {
    let manager = seeded_manager(RoleDeletionPolicy::Reject).await;
    manager.assign("p1", "r-eng").await.unwrap();
    let snap = export_snapshot(manager.store()).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("dataset.json");
    save_snapshot(&path, &snap).unwrap();
    let loaded = load_snapshot(&path).unwrap();

    let target = editor_store(Arc::new(MemoryDocumentStore::new()), RoleDeletionPolicy::Reject);
    let count = import_snapshot(&target, loaded).await.unwrap();
    assert_eq!(count, 7);
    assert_eq!(canonical_hash(&target.snapshot()).unwrap(), snap.hash);
    assert_eq!(target.get::<Personnel>("p1").unwrap().assigned_factory.as_deref(), Some("f1"));

    // importing again would overwrite live data
    let again = export_snapshot(manager.store()).unwrap();
    assert!(matches!(import_snapshot(&target, again).await, Err(PlannerError::Conflict(_))));
}

#[tokio::test]
async fn tampered_snapshot_is_rejected() {
    let manager = seeded_manager(RoleDeletionPolicy::Reject).await;
    let mut snap = export_snapshot(manager.store()).unwrap();
    if let Some(role) = snap.state.roles.get_mut("r-lead") {
        role.salary.max = 999_999;
    }

    let target = editor_store(Arc::new(MemoryDocumentStore::new()), RoleDeletionPolicy::Reject);
    let err = import_snapshot(&target, snap).await.unwrap_err();
    assert!(matches!(err, PlannerError::Validation(_)));
    assert!(target.is_empty());
}

// ─────────────────────────────────────────────────────────────
// File backend
// ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn file_backend_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    {
        let backend = Arc::new(FileDocumentStore::open(dir.path()).unwrap());
        let store = editor_store(backend, RoleDeletionPolicy::Reject);
        seed_basic(&store).await;
        let manager = AssignmentManager::new(store);
        manager.assign("p1", "r-eng").await.unwrap();
        manager.assign("p2", "r-eng").await.unwrap();
    }

    let backend = Arc::new(FileDocumentStore::open(dir.path()).unwrap());
    let store = editor_store(backend, RoleDeletionPolicy::Reject);
    assert_eq!(store.load().await.unwrap(), 7);
    assert_eq!(store.get::<Personnel>("p1").unwrap().assigned_role, None);
    assert_eq!(store.get::<Personnel>("p2").unwrap().assigned_role.as_deref(), Some("r-eng"));
    assert_eq!(store.get::<Role>("r-eng").unwrap().title, "Quality Engineer");
}

#[tokio::test]
async fn planner_bootstrap_from_config() {
    let dir = tempfile::tempdir().unwrap();
    let config = PlannerConfig {
        backend: BackendKind::File,
        data_dir: dir.path().join("data"),
        admin_emails: vec![ADMIN_EMAIL.to_string()],
        ..PlannerConfig::default()
    };

    telemetry::init_from_config(&config);
    let planner = Planner::open(&config).await.unwrap();
    assert!(planner.store.is_empty());
    assert!(!planner.interaction.is_enabled());

    planner.auth.sign_in("u-1", "Admin@Example.com", None);
    assert!(planner.interaction.is_enabled());
    seed_basic(&planner.store).await;
    planner.assignments.assign("p3", "r-lead").await.unwrap();

    let reopened = Planner::open(&config).await.unwrap();
    assert_eq!(
        reopened.assignments.occupant_of("r-lead").map(|p| p.id),
        Some("p3".to_string())
    );
}
