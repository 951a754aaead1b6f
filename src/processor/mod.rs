//! Configuration processor
//!
//! The orchestration state machine. Per collection, the processor reads
//! the persisted current version and advances through every declared
//! version above it, executing the fixed transition:
//!
//! ```text
//! drop validator → drop indexes → run migrations → add indexes
//!   → add validator → write version → [load test data]
//! ```
//!
//! Steps within one collection are strictly sequential; collections fan
//! out across a bounded pool of workers, serialized per collection by a
//! keyed lock. A failed step aborts that collection immediately and
//! leaves the previously committed version in place; other collections
//! are unaffected. Cancellation and deadlines are checked between steps
//! and between versions, never mid-step.

mod applier;

pub use applier::{ApplyError, SchemaApplier};

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::collections::{CollectionConfig, VersionSpec};
use crate::config::ServiceConfig;
use crate::db::Database;
use crate::enumerators::EnumeratorRegistry;
use crate::index::{CreateOutcome, DropOutcome, IndexError, IndexManager};
use crate::loader::SourceTree;
use crate::migration::{MigrationError, MigrationManager};
use crate::observability::LogEvent;
use crate::schema::{render_bson_schema, SchemaResolver};
use crate::types::TypeDictionary;
use crate::validation::{ValidationIssue, ValidationPass};
use crate::version::VersionNumber;
use crate::version_store::{CollectionVersion, VersionStore};

/// The steps of one version transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    DropValidator,
    DropIndexes,
    Migrate,
    AddIndexes,
    AddValidator,
    WriteVersion,
    LoadTestData,
}

impl Step {
    pub fn as_str(&self) -> &'static str {
        match self {
            Step::DropValidator => "drop_validator",
            Step::DropIndexes => "drop_indexes",
            Step::Migrate => "migrate",
            Step::AddIndexes => "add_indexes",
            Step::AddValidator => "add_validator",
            Step::WriteVersion => "write_version",
            Step::LoadTestData => "load_test_data",
        }
    }
}

/// A step-level failure; aborts the current collection.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StepError {
    #[error("index conflict on '{0}'")]
    IndexConflict(String),

    #[error("invalid index '{name}': {reason}")]
    IndexInvalid { name: String, reason: String },

    #[error("migration pipeline {index} failed: {reason}")]
    MigrationFailed { index: usize, reason: String },

    #[error("validator rejected: {0}")]
    ValidatorRejected(String),

    #[error("test data load failed: {0}")]
    TestDataFailed(String),

    #[error("database unavailable: {0}")]
    DatabaseUnavailable(String),

    #[error("run cancelled")]
    Cancelled,

    #[error("deadline exceeded")]
    DeadlineExceeded,
}

impl StepError {
    /// Stable code used in logs and operation records.
    pub fn code(&self) -> &'static str {
        match self {
            StepError::IndexConflict(_) => "INDEX_CONFLICT",
            StepError::IndexInvalid { .. } => "INDEX_INVALID",
            StepError::MigrationFailed { .. } => "MIGRATION_FAILED",
            StepError::ValidatorRejected(_) => "VALIDATOR_REJECTED",
            StepError::TestDataFailed(_) => "TEST_DATA_FAILED",
            StepError::DatabaseUnavailable(_) => "DATABASE_UNAVAILABLE",
            StepError::Cancelled => "CANCELLED",
            StepError::DeadlineExceeded => "DEADLINE_EXCEEDED",
        }
    }
}

impl From<IndexError> for StepError {
    fn from(e: IndexError) -> Self {
        match e {
            IndexError::Conflict { name } => StepError::IndexConflict(name),
            IndexError::Invalid { name, reason } => StepError::IndexInvalid { name, reason },
            IndexError::Unavailable(message) => StepError::DatabaseUnavailable(message),
        }
    }
}

impl From<MigrationError> for StepError {
    fn from(e: MigrationError) -> Self {
        match e {
            MigrationError::Failed { index, reason } => StepError::MigrationFailed { index, reason },
            MigrationError::Unavailable(message) => StepError::DatabaseUnavailable(message),
        }
    }
}

impl From<ApplyError> for StepError {
    fn from(e: ApplyError) -> Self {
        match e {
            ApplyError::Rejected(message) => StepError::ValidatorRejected(message),
            ApplyError::Unavailable(message) => StepError::DatabaseUnavailable(message),
        }
    }
}

impl From<crate::db::DbError> for StepError {
    fn from(e: crate::db::DbError) -> Self {
        StepError::DatabaseUnavailable(e.to_string())
    }
}

/// Terminal status of an operation or a whole collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationStatus {
    Ok,
    Failed,
}

/// One executed step, for the processing report.
#[derive(Debug, Clone, Serialize)]
pub struct OperationRecord {
    pub id: Uuid,
    pub at: DateTime<Utc>,
    pub collection: String,
    pub version: String,
    pub step: Step,
    pub status: OperationStatus,
    pub message: String,
}

/// The full outcome for one collection.
#[derive(Debug, Clone, Serialize)]
pub struct CollectionReport {
    pub collection: String,
    pub status: OperationStatus,
    pub operations: Vec<OperationRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CollectionReport {
    fn new(collection: &str) -> Self {
        Self {
            collection: collection.to_string(),
            status: OperationStatus::Ok,
            operations: Vec::new(),
            error: None,
        }
    }
}

/// Cancellation and deadline for one processing run. Checked between
/// steps and between versions only.
#[derive(Debug, Clone, Default)]
pub struct RunContext {
    cancel: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl RunContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_deadline(timeout: Duration) -> Self {
        Self {
            cancel: Arc::new(AtomicBool::new(false)),
            deadline: Some(Instant::now() + timeout),
        }
    }

    /// Handle another thread can use to cancel the run.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    fn check(&self) -> Result<(), StepError> {
        if self.cancel.load(Ordering::Relaxed) {
            return Err(StepError::Cancelled);
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return Err(StepError::DeadlineExceeded);
            }
        }
        Ok(())
    }
}

/// Non-reentrant per-collection locks. Concurrent processing requests
/// for the same collection serialize here.
#[derive(Debug, Default)]
struct CollectionLocks {
    inner: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl CollectionLocks {
    fn handle(&self, name: &str) -> Arc<Mutex<()>> {
        let mut table = self.inner.lock().unwrap();
        Arc::clone(table.entry(name.to_string()).or_default())
    }
}

/// The composed root: configuration graph, registries, and the injected
/// database capability. Built once per run; read-only afterwards except
/// for the version markers it writes through the store.
pub struct Processor {
    db: Arc<dyn Database>,
    config: ServiceConfig,
    collections: Vec<CollectionConfig>,
    dictionary: BTreeMap<String, Value>,
    types: TypeDictionary,
    enumerators: EnumeratorRegistry,
    test_data: BTreeMap<String, Value>,
    locks: CollectionLocks,
}

impl std::fmt::Debug for Processor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Processor")
            .field("config", &self.config)
            .field("collections", &self.collections)
            .field("dictionary", &self.dictionary)
            .field("types", &self.types)
            .field("enumerators", &self.enumerators)
            .field("test_data", &self.test_data)
            .finish_non_exhaustive()
    }
}

impl Processor {
    /// Build a processor from loaded sources.
    ///
    /// The pre-run validation pass runs first; a non-empty issue list
    /// refuses construction, so a processor that exists is always safe
    /// to run.
    pub fn new(
        db: Arc<dyn Database>,
        sources: SourceTree,
        config: ServiceConfig,
    ) -> Result<Self, Vec<ValidationIssue>> {
        let issues = ValidationPass::run(&sources);
        if !issues.is_empty() {
            return Err(issues);
        }

        let collections = sources
            .collections
            .iter()
            .filter_map(|(_, doc)| CollectionConfig::from_value(doc).ok())
            .collect();
        let (types, _) = TypeDictionary::build(&sources.types);
        let (enumerators, _) = EnumeratorRegistry::build(sources.enumerators.as_ref());

        Ok(Self {
            db,
            config,
            collections,
            dictionary: sources.dictionary,
            types,
            enumerators,
            test_data: sources.test_data,
            locks: CollectionLocks::default(),
        })
    }

    /// Names of all configured collections, in declaration order.
    pub fn collection_names(&self) -> Vec<String> {
        self.collections.iter().map(|c| c.name.clone()).collect()
    }

    /// The declarative configuration for one collection.
    pub fn collection_config(&self, name: &str) -> Option<&CollectionConfig> {
        self.collections.iter().find(|c| c.name == name)
    }

    /// The stored version markers (`GET /collections` surface).
    pub fn list_versions(&self) -> Result<Vec<CollectionVersion>, crate::db::DbError> {
        VersionStore::new(self.db.as_ref(), &self.config.version_collection_name).list()
    }

    /// Process every configured collection, fanning out one worker per
    /// collection up to the configured cap. Reports come back in
    /// declaration order; a failed collection never blocks the others.
    pub fn process_all(&self, ctx: &RunContext) -> Vec<CollectionReport> {
        let names = self.collection_names();
        if names.is_empty() {
            return Vec::new();
        }

        let workers = self.config.worker_count(names.len());
        let next = AtomicUsize::new(0);
        let slots: Vec<Mutex<Option<CollectionReport>>> =
            names.iter().map(|_| Mutex::new(None)).collect();

        thread::scope(|scope| {
            for _ in 0..workers {
                scope.spawn(|| loop {
                    let i = next.fetch_add(1, Ordering::SeqCst);
                    if i >= names.len() {
                        break;
                    }
                    let report = self.process_collection(&names[i], ctx);
                    *slots[i].lock().unwrap() = Some(report);
                });
            }
        });

        slots
            .into_iter()
            .map(|slot| slot.into_inner().unwrap().expect("worker filled every slot"))
            .collect()
    }

    /// Process one collection through every pending version.
    pub fn process_collection(&self, name: &str, ctx: &RunContext) -> CollectionReport {
        let mut report = CollectionReport::new(name);

        let Some(config) = self.collections.iter().find(|c| c.name == name) else {
            report.status = OperationStatus::Failed;
            report.error = Some(format!("collection '{}' is not configured", name));
            return report;
        };

        let lock = self.locks.handle(name);
        let _guard = lock.lock().unwrap();

        let store = VersionStore::new(self.db.as_ref(), &self.config.version_collection_name);
        let current = match store.read(name) {
            Ok(version) => version,
            Err(e) => {
                report.status = OperationStatus::Failed;
                report.error = Some(StepError::from(e).to_string());
                return report;
            }
        };

        LogEvent::info("processing_collection")
            .collection(name)
            .version(&current)
            .emit();

        for spec in &config.versions {
            let Ok(version) = spec.version_number() else {
                // Unreachable after validation; guard anyway.
                report.status = OperationStatus::Failed;
                report.error = Some(format!("unparseable version '{}'", spec.version));
                return report;
            };
            if version <= current {
                continue;
            }

            if let Err(e) = ctx.check() {
                self.abort(&mut report, &version, Step::DropValidator, e);
                return report;
            }

            let transition_deadline =
                Instant::now() + Duration::from_secs(self.config.transition_timeout_secs);
            if let Err(e) = self.run_transition(config, spec, &version, ctx, transition_deadline, &mut report)
            {
                let step = report
                    .operations
                    .last()
                    .map(|r| r.step)
                    .unwrap_or(Step::DropValidator);
                self.abort(&mut report, &version, step, e);
                return report;
            }
        }

        report
    }

    fn abort(&self, report: &mut CollectionReport, version: &VersionNumber, step: Step, error: StepError) {
        LogEvent::error("transition_aborted")
            .collection(&report.collection)
            .version(version)
            .step(step.as_str())
            .code(error.code())
            .detail(error.to_string())
            .emit();
        report.status = OperationStatus::Failed;
        report.error = Some(error.to_string());
    }

    /// Execute steps (a)-(g) for one version. Records are appended as
    /// each step completes; the error, if any, names the failing step
    /// via the last appended record.
    fn run_transition(
        &self,
        config: &CollectionConfig,
        spec: &VersionSpec,
        version: &VersionNumber,
        ctx: &RunContext,
        transition_deadline: Instant,
        report: &mut CollectionReport,
    ) -> Result<(), StepError> {
        let collection = &config.name;
        let check = |step: Step| -> Result<(), StepError> {
            ctx.check()?;
            if Instant::now() >= transition_deadline {
                LogEvent::warn("transition_timeout")
                    .collection(collection)
                    .step(step.as_str())
                    .emit();
                return Err(StepError::DeadlineExceeded);
            }
            Ok(())
        };

        // (a) Drop validator. Non-existence is not an error.
        let applier = SchemaApplier::new(self.db.as_ref());
        match applier.remove(collection) {
            Ok(()) => self.record(report, version, Step::DropValidator, "validator removed"),
            Err(e) => {
                self.record_failure(report, version, Step::DropValidator, &e.to_string());
                return Err(e.into());
            }
        }

        // (b) Drop indexes. Missing names are skipped silently.
        check(Step::DropIndexes)?;
        let indexes = IndexManager::new(self.db.as_ref());
        for name in &spec.drop_indexes {
            match indexes.drop(collection, name) {
                Ok(DropOutcome::Dropped) => {
                    self.record(report, version, Step::DropIndexes, &format!("dropped index '{}'", name))
                }
                Ok(DropOutcome::Missing) => self.record(
                    report,
                    version,
                    Step::DropIndexes,
                    &format!("index '{}' absent, skipped", name),
                ),
                Err(e) => {
                    self.record_failure(report, version, Step::DropIndexes, &e.to_string());
                    return Err(e.into());
                }
            }
        }

        // (c) Run migrations.
        check(Step::Migrate)?;
        let migrations = MigrationManager::new(self.db.as_ref());
        match migrations.run(collection, &spec.aggregations) {
            Ok(outcomes) => {
                for outcome in outcomes {
                    let message = if outcome.terminal_write {
                        format!("pipeline {} completed ({} stages)", outcome.index, outcome.stages)
                    } else {
                        format!(
                            "pipeline {} completed without a terminal write stage; no documents were written",
                            outcome.index
                        )
                    };
                    self.record(report, version, Step::Migrate, &message);
                }
            }
            Err(e) => {
                self.record_failure(report, version, Step::Migrate, &e.to_string());
                return Err(e.into());
            }
        }

        // (d) Add indexes.
        check(Step::AddIndexes)?;
        for index_spec in &spec.add_indexes {
            match indexes.create(collection, index_spec) {
                Ok(CreateOutcome::Created) => self.record(
                    report,
                    version,
                    Step::AddIndexes,
                    &format!("created index '{}'", index_spec.name),
                ),
                Ok(CreateOutcome::AlreadyExists) => self.record(
                    report,
                    version,
                    Step::AddIndexes,
                    &format!("index '{}' already present", index_spec.name),
                ),
                Err(e) => {
                    self.record_failure(report, version, Step::AddIndexes, &e.to_string());
                    return Err(e.into());
                }
            }
        }

        // (e) Add validator from the rendered BSON schema.
        check(Step::AddValidator)?;
        let mut resolver = SchemaResolver::new(&self.dictionary, &self.types, &self.enumerators);
        let outcome = resolver.resolve_collection(collection, version);
        let bson_schema = match (outcome.schema, outcome.issues.is_empty()) {
            (Some(resolved), true) => render_bson_schema(&resolved),
            (_, _) => {
                let reasons: Vec<String> = outcome.issues.iter().map(|i| i.to_string()).collect();
                let error = StepError::ValidatorRejected(format!(
                    "schema did not resolve: {}",
                    reasons.join("; ")
                ));
                self.record_failure(report, version, Step::AddValidator, &error.to_string());
                return Err(error);
            }
        };
        match applier.install(collection, &bson_schema) {
            Ok(()) => self.record(report, version, Step::AddValidator, "validator installed"),
            Err(e) => {
                self.record_failure(report, version, Step::AddValidator, &e.to_string());
                return Err(e.into());
            }
        }

        // (f) Write version. The marker commits the transition.
        check(Step::WriteVersion)?;
        let store = VersionStore::new(self.db.as_ref(), &self.config.version_collection_name);
        match store.write(collection, version) {
            Ok(()) => self.record(
                report,
                version,
                Step::WriteVersion,
                &format!("version {} recorded", version),
            ),
            Err(e) => {
                let error = StepError::from(e);
                self.record_failure(report, version, Step::WriteVersion, &error.to_string());
                return Err(error);
            }
        }

        // (g) Load test data, only when the service flag is on.
        if self.config.load_test_data {
            if let Some(stem) = spec.test_data_stem() {
                check(Step::LoadTestData)?;
                match self.load_test_data(collection, stem) {
                    Ok(count) => self.record(
                        report,
                        version,
                        Step::LoadTestData,
                        &format!("loaded {} documents from '{}'", count, stem),
                    ),
                    Err(e) => {
                        self.record_failure(report, version, Step::LoadTestData, &e.to_string());
                        return Err(e);
                    }
                }
            }
        }

        Ok(())
    }

    fn load_test_data(&self, collection: &str, stem: &str) -> Result<usize, StepError> {
        let document = self
            .test_data
            .get(stem)
            .ok_or_else(|| StepError::TestDataFailed(format!("no test-data file '{}'", stem)))?;
        let documents = document
            .as_array()
            .ok_or_else(|| StepError::TestDataFailed(format!("'{}' must hold a list of documents", stem)))?;
        self.db
            .insert_many(collection, documents)
            .map_err(|e| StepError::TestDataFailed(e.to_string()))?;
        Ok(documents.len())
    }

    fn record(&self, report: &mut CollectionReport, version: &VersionNumber, step: Step, message: &str) {
        LogEvent::info("processing_step")
            .collection(&report.collection)
            .version(version)
            .step(step.as_str())
            .detail(message)
            .emit();
        report.operations.push(OperationRecord {
            id: Uuid::new_v4(),
            at: Utc::now(),
            collection: report.collection.clone(),
            version: version.to_string(),
            step,
            status: OperationStatus::Ok,
            message: message.to_string(),
        });
    }

    fn record_failure(
        &self,
        report: &mut CollectionReport,
        version: &VersionNumber,
        step: Step,
        message: &str,
    ) {
        report.operations.push(OperationRecord {
            id: Uuid::new_v4(),
            at: Utc::now(),
            collection: report.collection.clone(),
            version: version.to_string(),
            step,
            status: OperationStatus::Failed,
            message: message.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{DbError, FaultPoint, MemoryDatabase};
    use serde_json::json;

    fn sources() -> SourceTree {
        let mut tree = SourceTree::default();
        tree.collections = vec![(
            "users".to_string(),
            json!({
                "name": "users",
                "versions": [
                    {
                        "version": "1.0.0.1",
                        "add_indexes": [
                            {"name": "nameIdx", "key": {"userName": 1}, "options": {"unique": true}},
                            {"name": "statusIdx", "key": {"status": 1}}
                        ]
                    },
                    {
                        "version": "1.0.0.2",
                        "drop_indexes": ["statusIdx"]
                    }
                ]
            }),
        )];
        tree.dictionary.insert(
            "users.1.0.0".to_string(),
            json!({
                "description": "A user",
                "type": "object",
                "properties": {
                    "userName": {
                        "description": "Login name",
                        "type": "object",
                        "properties": {},
                        "required": true
                    }
                }
            }),
        );
        tree.enumerators = Some(json!([
            {"name": "Enumerations", "status": "Active", "version": 1, "enumerators": {}},
            {"name": "Enumerations", "status": "Active", "version": 2, "enumerators": {}}
        ]));
        tree
    }

    fn processor(db: Arc<MemoryDatabase>) -> Processor {
        Processor::new(db, sources(), ServiceConfig::default()).expect("sources validate")
    }

    #[test]
    fn test_cold_start_advances_to_latest() {
        let db = Arc::new(MemoryDatabase::new());
        let p = processor(Arc::clone(&db));

        let report = p.process_collection("users", &RunContext::new());
        assert_eq!(report.status, OperationStatus::Ok);

        let store = VersionStore::new(db.as_ref(), "CollectionVersions");
        assert_eq!(store.read("users").unwrap(), VersionNumber::parse("1.0.0.2").unwrap());
        assert_eq!(db.index_names("users"), vec!["_id_", "nameIdx"]);
        assert!(db.validator("users").is_some());
    }

    #[test]
    fn test_rerun_is_noop() {
        let db = Arc::new(MemoryDatabase::new());
        let p = processor(Arc::clone(&db));

        p.process_collection("users", &RunContext::new());
        let writes_after_first = db.write_op_count();

        let report = p.process_collection("users", &RunContext::new());
        assert_eq!(report.status, OperationStatus::Ok);
        assert!(report.operations.is_empty());
        assert_eq!(db.write_op_count(), writes_after_first);
    }

    #[test]
    fn test_failure_leaves_prior_version() {
        let db = Arc::new(MemoryDatabase::new());
        db.fail_once(FaultPoint::CreateIndex, DbError::Unavailable("injected".into()));
        let p = processor(Arc::clone(&db));

        let report = p.process_collection("users", &RunContext::new());
        assert_eq!(report.status, OperationStatus::Failed);

        let store = VersionStore::new(db.as_ref(), "CollectionVersions");
        assert_eq!(store.read("users").unwrap(), VersionNumber::ZERO);

        // Second run completes and converges to the same end state.
        let report = p.process_collection("users", &RunContext::new());
        assert_eq!(report.status, OperationStatus::Ok);
        assert_eq!(store.read("users").unwrap(), VersionNumber::parse("1.0.0.2").unwrap());
        assert_eq!(db.index_names("users"), vec!["_id_", "nameIdx"]);
    }

    #[test]
    fn test_cancelled_run_commits_nothing_further() {
        let db = Arc::new(MemoryDatabase::new());
        let p = processor(Arc::clone(&db));

        let ctx = RunContext::new();
        ctx.cancel_handle().store(true, Ordering::Relaxed);

        let report = p.process_collection("users", &ctx);
        assert_eq!(report.status, OperationStatus::Failed);
        assert_eq!(report.error.as_deref(), Some("run cancelled"));

        let store = VersionStore::new(db.as_ref(), "CollectionVersions");
        assert_eq!(store.read("users").unwrap(), VersionNumber::ZERO);
    }

    #[test]
    fn test_validation_failure_refuses_construction() {
        let mut tree = sources();
        tree.collections[0].1["versions"][0]["version"] = json!("1.0.0.A");

        let db: Arc<dyn Database> = Arc::new(MemoryDatabase::new());
        let issues = Processor::new(db, tree, ServiceConfig::default()).unwrap_err();
        assert!(!issues.is_empty());
    }

    #[test]
    fn test_process_all_reports_in_declaration_order() {
        let db = Arc::new(MemoryDatabase::new());
        let p = processor(Arc::clone(&db));

        let reports = p.process_all(&RunContext::new());
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].collection, "users");
        assert_eq!(reports[0].status, OperationStatus::Ok);
    }

    #[test]
    fn test_empty_version_spec_still_runs_core_steps() {
        let mut tree = SourceTree::default();
        tree.collections = vec![(
            "orders".to_string(),
            json!({"name": "orders", "versions": [{"version": "1.0.0.1"}]}),
        )];
        tree.dictionary.insert(
            "orders.1.0.0".to_string(),
            json!({"description": "An order", "type": "object", "properties": {}}),
        );
        tree.enumerators = Some(json!([
            {"name": "Enumerations", "status": "Active", "version": 1, "enumerators": {}}
        ]));

        let db = Arc::new(MemoryDatabase::new());
        let p = Processor::new(Arc::clone(&db) as Arc<dyn Database>, tree, ServiceConfig::default())
            .unwrap();

        let report = p.process_collection("orders", &RunContext::new());
        assert_eq!(report.status, OperationStatus::Ok);

        let steps: Vec<Step> = report.operations.iter().map(|r| r.step).collect();
        assert_eq!(steps, vec![Step::DropValidator, Step::AddValidator, Step::WriteVersion]);
    }

    #[test]
    fn test_test_data_loaded_when_enabled() {
        let mut tree = SourceTree::default();
        tree.collections = vec![(
            "users".to_string(),
            json!({
                "name": "users",
                "versions": [{"version": "1.0.0.1", "test_data": "users.1.0.0.1"}]
            }),
        )];
        tree.dictionary.insert(
            "users.1.0.0".to_string(),
            json!({"description": "A user", "type": "object", "properties": {}}),
        );
        tree.enumerators = Some(json!([
            {"name": "Enumerations", "status": "Active", "version": 1, "enumerators": {}}
        ]));
        tree.test_data.insert(
            "users.1.0.0.1".to_string(),
            json!([{"_id": 1, "userName": "seed"}]),
        );

        let mut config = ServiceConfig::default();
        config.load_test_data = true;

        let db = Arc::new(MemoryDatabase::new());
        let p = Processor::new(Arc::clone(&db) as Arc<dyn Database>, tree, config).unwrap();

        let report = p.process_collection("users", &RunContext::new());
        assert_eq!(report.status, OperationStatus::Ok);
        assert!(report
            .operations
            .iter()
            .any(|r| r.step == Step::LoadTestData && r.message.contains("1 documents")));
        assert_eq!(db.documents("users").len(), 1);
    }
}
