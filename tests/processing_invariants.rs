//! Processing invariant tests
//!
//! End-to-end runs over an on-disk input tree and the in-memory
//! database capability:
//! - A completed run persists exactly the last fully-applied version
//! - Failures leave the prior version in place; re-runs converge
//! - Re-running a successful run performs no writes
//! - Migrations with `$merge` rewrite documents in place

use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde_json::json;
use tempfile::TempDir;

use mongoconf::config::ServiceConfig;
use mongoconf::db::{DbError, FaultPoint, MemoryDatabase};
use mongoconf::loader::FileLoader;
use mongoconf::processor::{OperationStatus, Processor, RunContext, Step};
use mongoconf::version::VersionNumber;
use mongoconf::version_store::VersionStore;

// =============================================================================
// Helper Functions
// =============================================================================

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn enumerators(root: &Path) {
    write(
        root,
        "data/enumerators.json",
        r#"[
  {"name": "Enumerations", "status": "Active", "version": 1, "enumerators": {}},
  {"name": "Enumerations", "status": "Active", "version": 2, "enumerators": {}},
  {"name": "Enumerations", "status": "Active", "version": 3, "enumerators": {}}
]"#,
    );
}

fn user_schema(root: &Path, schema_version: &str) {
    write(
        root,
        &format!("dictionary/users.{}.yaml", schema_version),
        r#"description: A user
type: object
properties:
  userName:
    description: Login name
    type: object
    properties: {}
"#,
    );
}

/// The two-version tree from a cold start: 1.0.0.1 adds two indexes,
/// 1.0.0.2 drops one of them again.
fn two_version_tree() -> TempDir {
    let tmp = TempDir::new().unwrap();
    write(
        tmp.path(),
        "collections/users.yaml",
        r#"name: users
versions:
  - version: 1.0.0.1
    add_indexes:
      - name: nameIdx
        key: {userName: 1}
        options: {unique: true}
      - name: statusIdx
        key: {status: 1}
  - version: 1.0.0.2
    drop_indexes:
      - statusIdx
"#,
    );
    user_schema(tmp.path(), "1.0.0");
    enumerators(tmp.path());
    tmp
}

fn build_processor(tree: &TempDir, db: Arc<MemoryDatabase>) -> Processor {
    let sources = FileLoader::new(tree.path()).load();
    Processor::new(db, sources, ServiceConfig::default()).expect("tree validates")
}

fn stored_version(db: &MemoryDatabase, name: &str) -> VersionNumber {
    VersionStore::new(db, "CollectionVersions").read(name).unwrap()
}

// =============================================================================
// Cold Start
// =============================================================================

/// Fresh database, two declared versions. The run lands on the latest
/// version with only the surviving index and the final validator.
#[test]
fn test_cold_start_two_versions() {
    let tree = two_version_tree();
    let db = Arc::new(MemoryDatabase::new());
    let processor = build_processor(&tree, Arc::clone(&db));

    let reports = processor.process_all(&RunContext::new());
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].status, OperationStatus::Ok);

    assert_eq!(stored_version(&db, "users"), VersionNumber::parse("1.0.0.2").unwrap());
    assert_eq!(db.index_names("users"), vec!["_id_", "nameIdx"]);

    let validator = db.validator("users").expect("validator installed");
    assert_eq!(validator.schema["bsonType"], json!("object"));
    assert_eq!(validator.schema["properties"]["userName"]["bsonType"], json!("object"));
}

/// Exactly one transition per declared version, ascending.
#[test]
fn test_one_transition_per_declared_version() {
    let tree = two_version_tree();
    let db = Arc::new(MemoryDatabase::new());
    let processor = build_processor(&tree, Arc::clone(&db));

    let report = processor.process_collection("users", &RunContext::new());

    let version_writes: Vec<&str> = report
        .operations
        .iter()
        .filter(|r| r.step == Step::WriteVersion)
        .map(|r| r.version.as_str())
        .collect();
    assert_eq!(version_writes, vec!["1.0.0.1", "1.0.0.2"]);
}

/// A collection already at the latest version processes as a pure
/// no-op: zero database writes.
#[test]
fn test_rerun_after_success_is_pure_noop() {
    let tree = two_version_tree();
    let db = Arc::new(MemoryDatabase::new());
    let processor = build_processor(&tree, Arc::clone(&db));

    processor.process_collection("users", &RunContext::new());
    let writes = db.write_op_count();

    let report = processor.process_collection("users", &RunContext::new());
    assert_eq!(report.status, OperationStatus::Ok);
    assert!(report.operations.is_empty());
    assert_eq!(db.write_op_count(), writes);
}

// =============================================================================
// Resume After Failure
// =============================================================================

/// `createIndex(nameIdx)` fails once. The first run commits nothing;
/// the second run converges to the same end state as an untroubled
/// cold start.
#[test]
fn test_resume_after_index_failure() {
    let tree = two_version_tree();
    let db = Arc::new(MemoryDatabase::new());
    db.fail_once(FaultPoint::CreateIndex, DbError::Unavailable("injected".into()));
    let processor = build_processor(&tree, Arc::clone(&db));

    let report = processor.process_collection("users", &RunContext::new());
    assert_eq!(report.status, OperationStatus::Failed);
    assert_eq!(stored_version(&db, "users"), VersionNumber::ZERO);
    assert!(db.validator("users").is_none());

    let report = processor.process_collection("users", &RunContext::new());
    assert_eq!(report.status, OperationStatus::Ok);
    assert_eq!(stored_version(&db, "users"), VersionNumber::parse("1.0.0.2").unwrap());
    assert_eq!(db.index_names("users"), vec!["_id_", "nameIdx"]);
    assert!(db.validator("users").is_some());
}

/// A failure in the second transition keeps the first version's marker.
/// `drop_index` is only reached in the second transition, so the
/// injected fault fires there.
#[test]
fn test_mid_run_failure_keeps_prior_version() {
    let tree = two_version_tree();
    let db = Arc::new(MemoryDatabase::new());
    db.fail_once(FaultPoint::DropIndex, DbError::Unavailable("injected".into()));
    let processor = build_processor(&tree, Arc::clone(&db));

    let report = processor.process_collection("users", &RunContext::new());
    assert_eq!(report.status, OperationStatus::Failed);
    assert_eq!(stored_version(&db, "users"), VersionNumber::parse("1.0.0.1").unwrap());

    let report = processor.process_collection("users", &RunContext::new());
    assert_eq!(report.status, OperationStatus::Ok);
    assert_eq!(stored_version(&db, "users"), VersionNumber::parse("1.0.0.2").unwrap());
    assert_eq!(db.index_names("users"), vec!["_id_", "nameIdx"]);
}

// =============================================================================
// Migrations
// =============================================================================

/// A `$merge` pipeline renames `userName` to `full_name` across the
/// existing documents, then the version marker commits.
#[test]
fn test_merge_migration_renames_field() {
    let tmp = TempDir::new().unwrap();
    write(
        tmp.path(),
        "collections/users.yaml",
        r#"name: users
versions:
  - version: 1.0.1.3
    aggregations:
      - - {$addFields: {full_name: $userName}}
        - {$unset: userName}
        - {$merge: {into: users, on: _id, whenMatched: replace, whenNotMatched: insert}}
"#,
    );
    user_schema(tmp.path(), "1.0.1");
    enumerators(tmp.path());

    let db = Arc::new(MemoryDatabase::new());
    db.seed_documents(
        "users",
        vec![
            json!({"_id": 1, "userName": "a b"}),
            json!({"_id": 2, "userName": "c d"}),
        ],
    );
    let processor = build_processor(&tmp, Arc::clone(&db));

    let report = processor.process_collection("users", &RunContext::new());
    assert_eq!(report.status, OperationStatus::Ok, "{:?}", report);

    let docs = db.documents("users");
    assert_eq!(docs[0], json!({"_id": 1, "full_name": "a b"}));
    assert_eq!(docs[1], json!({"_id": 2, "full_name": "c d"}));
    assert_eq!(stored_version(&db, "users"), VersionNumber::parse("1.0.1.3").unwrap());
}

/// A failing pipeline aborts with its zero-based index and does not
/// record the version.
#[test]
fn test_failed_pipeline_aborts_with_index() {
    let tmp = TempDir::new().unwrap();
    write(
        tmp.path(),
        "collections/users.yaml",
        r#"name: users
versions:
  - version: 1.0.0.1
    aggregations:
      - - {$merge: users}
      - - {$notAStage: {}}
"#,
    );
    user_schema(tmp.path(), "1.0.0");
    enumerators(tmp.path());

    let db = Arc::new(MemoryDatabase::new());
    let processor = build_processor(&tmp, Arc::clone(&db));

    let report = processor.process_collection("users", &RunContext::new());
    assert_eq!(report.status, OperationStatus::Failed);
    assert!(report.error.as_deref().unwrap().contains("pipeline 1"));
    assert_eq!(stored_version(&db, "users"), VersionNumber::ZERO);
}

// =============================================================================
// Boundary Behaviors
// =============================================================================

/// Corrupt (duplicated) version markers process from `0.0.0.0`.
#[test]
fn test_duplicate_version_records_process_from_zero() {
    let tree = two_version_tree();
    let db = Arc::new(MemoryDatabase::new());
    db.seed_documents(
        "CollectionVersions",
        vec![
            json!({"collection_name": "users", "current_version": "1.0.0.1"}),
            json!({"collection_name": "users", "current_version": "1.0.0.2"}),
        ],
    );
    let processor = build_processor(&tree, Arc::clone(&db));

    let report = processor.process_collection("users", &RunContext::new());
    assert_eq!(report.status, OperationStatus::Ok);

    // Both transitions ran again.
    let version_writes = report
        .operations
        .iter()
        .filter(|r| r.step == Step::WriteVersion)
        .count();
    assert_eq!(version_writes, 2);
}

/// A version spec with no indexes, migrations or test data still drops
/// and reinstalls the validator and records the version.
#[test]
fn test_bare_version_spec_performs_core_steps() {
    let tmp = TempDir::new().unwrap();
    write(
        tmp.path(),
        "collections/orders.yaml",
        "name: orders\nversions:\n  - version: 2.0.0.1\n",
    );
    write(
        tmp.path(),
        "dictionary/orders.2.0.0.yaml",
        "description: An order\ntype: object\nproperties: {}\n",
    );
    enumerators(tmp.path());

    let db = Arc::new(MemoryDatabase::new());
    let processor = build_processor(&tmp, Arc::clone(&db));

    let report = processor.process_collection("orders", &RunContext::new());
    assert_eq!(report.status, OperationStatus::Ok);

    let steps: Vec<Step> = report.operations.iter().map(|r| r.step).collect();
    assert_eq!(steps, vec![Step::DropValidator, Step::AddValidator, Step::WriteVersion]);
}

/// Two independent collections: one failing never blocks the other.
#[test]
fn test_failed_collection_does_not_block_others() {
    let tmp = TempDir::new().unwrap();
    write(
        tmp.path(),
        "collections/users.yaml",
        r#"name: users
versions:
  - version: 1.0.0.1
    aggregations:
      - - {$notAStage: {}}
"#,
    );
    write(
        tmp.path(),
        "collections/orders.yaml",
        "name: orders\nversions:\n  - version: 1.0.0.1\n",
    );
    user_schema(tmp.path(), "1.0.0");
    write(
        tmp.path(),
        "dictionary/orders.1.0.0.yaml",
        "description: An order\ntype: object\nproperties: {}\n",
    );
    enumerators(tmp.path());

    let db = Arc::new(MemoryDatabase::new());
    let processor = build_processor(&tmp, Arc::clone(&db));

    let reports = processor.process_all(&RunContext::new());
    assert_eq!(reports.len(), 2);

    let users = reports.iter().find(|r| r.collection == "users").unwrap();
    let orders = reports.iter().find(|r| r.collection == "orders").unwrap();
    assert_eq!(users.status, OperationStatus::Failed);
    assert_eq!(orders.status, OperationStatus::Ok);
    assert_eq!(stored_version(&db, "orders"), VersionNumber::parse("1.0.0.1").unwrap());
}
