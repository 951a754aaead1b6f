//! In-memory database capability
//!
//! A complete, deterministic implementation of [`Database`] used by unit
//! and integration tests and by the CLI rehearsal mode. Documents,
//! indexes and validators live behind one `RwLock`; a small fault table
//! lets tests fail a named operation exactly once to exercise
//! resume-after-failure paths.
//!
//! The aggregation evaluator covers the subset migration pipelines
//! exercise: `$match` (equality), `$addFields`/`$set`, `$unset`,
//! `$project`, and the terminal writes `$out` and `$merge`.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, RwLock};

use serde_json::{Map, Value};

use super::errors::{DbError, DbResult};
use super::{AggregateOptions, Database, IndexSpec, ValidationAction, ValidationLevel};

/// Operations a test can fail on demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultPoint {
    CreateIndex,
    DropIndex,
    Aggregate,
    SetValidator,
    ClearValidator,
    Find,
    UpsertOne,
    InsertMany,
}

/// A validator as installed on a collection.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredValidator {
    pub schema: Value,
    pub level: ValidationLevel,
    pub action: ValidationAction,
}

#[derive(Debug, Default)]
struct CollectionState {
    documents: Vec<Value>,
    indexes: Vec<IndexSpec>,
    validator: Option<StoredValidator>,
}

impl CollectionState {
    fn new() -> Self {
        Self {
            documents: Vec::new(),
            indexes: vec![id_index()],
            validator: None,
        }
    }
}

fn id_index() -> IndexSpec {
    IndexSpec::ascending("_id_", "_id")
}

#[derive(Debug, Default)]
struct MemoryState {
    collections: BTreeMap<String, CollectionState>,
}

impl MemoryState {
    fn ensure(&mut self, name: &str) -> &mut CollectionState {
        self.collections
            .entry(name.to_string())
            .or_insert_with(CollectionState::new)
    }
}

/// In-memory [`Database`] implementation.
#[derive(Default)]
pub struct MemoryDatabase {
    state: RwLock<MemoryState>,
    faults: Mutex<HashMap<FaultPoint, VecDeque<DbError>>>,
    write_ops: AtomicU64,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `error` to be returned by the next call hitting `point`.
    /// Multiple queued errors fire in FIFO order, one per call.
    pub fn fail_once(&self, point: FaultPoint, error: DbError) {
        let mut faults = self.faults.lock().unwrap();
        faults.entry(point).or_default().push_back(error);
    }

    fn take_fault(&self, point: FaultPoint) -> Option<DbError> {
        let mut faults = self.faults.lock().unwrap();
        faults.get_mut(&point).and_then(|queue| queue.pop_front())
    }

    fn check_fault(&self, point: FaultPoint) -> DbResult<()> {
        match self.take_fault(point) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn record_write(&self) {
        self.write_ops.fetch_add(1, Ordering::Relaxed);
    }

    /// Number of mutating calls accepted so far. Idempotent re-runs of a
    /// fully-applied configuration must not move this counter.
    pub fn write_op_count(&self) -> u64 {
        self.write_ops.load(Ordering::Relaxed)
    }

    /// Snapshot of a collection's documents (empty when absent).
    pub fn documents(&self, collection: &str) -> Vec<Value> {
        let state = self.state.read().unwrap();
        state
            .collections
            .get(collection)
            .map(|c| c.documents.clone())
            .unwrap_or_default()
    }

    /// Replace a collection's documents wholesale (test setup).
    pub fn seed_documents(&self, collection: &str, documents: Vec<Value>) {
        let mut state = self.state.write().unwrap();
        state.ensure(collection).documents = documents;
    }

    /// The installed validator, if any.
    pub fn validator(&self, collection: &str) -> Option<StoredValidator> {
        let state = self.state.read().unwrap();
        state
            .collections
            .get(collection)
            .and_then(|c| c.validator.clone())
    }

    /// Index names in creation order.
    pub fn index_names(&self, collection: &str) -> Vec<String> {
        let state = self.state.read().unwrap();
        state
            .collections
            .get(collection)
            .map(|c| c.indexes.iter().map(|i| i.name.clone()).collect())
            .unwrap_or_else(|| vec!["_id_".to_string()])
    }
}

impl Database for MemoryDatabase {
    fn list_collections(&self) -> DbResult<Vec<String>> {
        let state = self.state.read().unwrap();
        Ok(state.collections.keys().cloned().collect())
    }

    fn get_validator(&self, collection: &str) -> DbResult<Option<Value>> {
        let state = self.state.read().unwrap();
        Ok(state
            .collections
            .get(collection)
            .and_then(|c| c.validator.as_ref())
            .map(|v| v.schema.clone()))
    }

    fn set_validator(
        &self,
        collection: &str,
        bson_schema: &Value,
        level: ValidationLevel,
        action: ValidationAction,
    ) -> DbResult<()> {
        self.check_fault(FaultPoint::SetValidator)?;
        if !bson_schema.is_object() {
            return Err(DbError::InvalidArgument(
                "validator schema must be a document".to_string(),
            ));
        }
        self.record_write();
        let mut state = self.state.write().unwrap();
        state.ensure(collection).validator = Some(StoredValidator {
            schema: bson_schema.clone(),
            level,
            action,
        });
        Ok(())
    }

    fn clear_validator(&self, collection: &str) -> DbResult<()> {
        self.check_fault(FaultPoint::ClearValidator)?;
        self.record_write();
        let mut state = self.state.write().unwrap();
        if let Some(entry) = state.collections.get_mut(collection) {
            entry.validator = None;
        }
        Ok(())
    }

    fn list_indexes(&self, collection: &str) -> DbResult<Vec<IndexSpec>> {
        let state = self.state.read().unwrap();
        Ok(state
            .collections
            .get(collection)
            .map(|c| c.indexes.clone())
            .unwrap_or_else(|| vec![id_index()]))
    }

    fn create_index(&self, collection: &str, spec: &IndexSpec) -> DbResult<()> {
        self.check_fault(FaultPoint::CreateIndex)?;
        if spec.name.is_empty() || spec.key.is_empty() {
            return Err(DbError::InvalidArgument(
                "index spec requires a name and a non-empty key".to_string(),
            ));
        }
        self.record_write();
        let mut state = self.state.write().unwrap();
        let entry = state.ensure(collection);
        if let Some(existing) = entry.indexes.iter().find(|i| i.name == spec.name) {
            if existing.key != spec.key || existing.options != spec.options {
                return Err(DbError::OperationFailed(format!(
                    "index '{}' already exists with a different definition",
                    spec.name
                )));
            }
            return Ok(());
        }
        entry.indexes.push(spec.clone());
        Ok(())
    }

    fn drop_index(&self, collection: &str, index_name: &str) -> DbResult<()> {
        self.check_fault(FaultPoint::DropIndex)?;
        if index_name == "_id_" {
            return Err(DbError::InvalidArgument("cannot drop the _id index".to_string()));
        }
        self.record_write();
        let mut state = self.state.write().unwrap();
        let entry = state.ensure(collection);
        let before = entry.indexes.len();
        entry.indexes.retain(|i| i.name != index_name);
        if entry.indexes.len() == before {
            return Err(DbError::OperationFailed(format!(
                "index '{}' not found",
                index_name
            )));
        }
        Ok(())
    }

    fn aggregate(
        &self,
        collection: &str,
        pipeline: &[Value],
        _options: &AggregateOptions,
    ) -> DbResult<Vec<Value>> {
        self.check_fault(FaultPoint::Aggregate)?;
        self.record_write();
        let mut state = self.state.write().unwrap();
        run_pipeline(&mut state, collection, pipeline)
    }

    fn find(&self, collection: &str, filter: &Value) -> DbResult<Vec<Value>> {
        self.check_fault(FaultPoint::Find)?;
        let state = self.state.read().unwrap();
        let docs = match state.collections.get(collection) {
            Some(entry) => &entry.documents,
            None => return Ok(Vec::new()),
        };
        Ok(docs
            .iter()
            .filter(|d| matches_filter(d, filter))
            .cloned()
            .collect())
    }

    fn upsert_one(&self, collection: &str, filter: &Value, document: &Value) -> DbResult<()> {
        self.check_fault(FaultPoint::UpsertOne)?;
        let fields = document
            .as_object()
            .ok_or_else(|| DbError::InvalidArgument("upsert document must be an object".to_string()))?;
        self.record_write();
        let mut state = self.state.write().unwrap();
        let entry = state.ensure(collection);
        if let Some(existing) = entry.documents.iter_mut().find(|d| matches_filter(d, filter)) {
            let target = existing.as_object_mut().expect("stored documents are objects");
            for (k, v) in fields {
                target.insert(k.clone(), v.clone());
            }
        } else {
            entry.documents.push(Value::Object(fields.clone()));
        }
        Ok(())
    }

    fn insert_many(&self, collection: &str, documents: &[Value]) -> DbResult<()> {
        self.check_fault(FaultPoint::InsertMany)?;
        for doc in documents {
            if !doc.is_object() {
                return Err(DbError::InvalidArgument(
                    "insert_many requires object documents".to_string(),
                ));
            }
        }
        self.record_write();
        let mut state = self.state.write().unwrap();
        let entry = state.ensure(collection);
        entry.documents.extend(documents.iter().cloned());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Aggregation evaluator
// ---------------------------------------------------------------------------

fn run_pipeline(state: &mut MemoryState, source: &str, pipeline: &[Value]) -> DbResult<Vec<Value>> {
    let mut docs: Vec<Value> = state
        .collections
        .get(source)
        .map(|c| c.documents.clone())
        .unwrap_or_default();

    for (position, stage) in pipeline.iter().enumerate() {
        let stage_obj = stage
            .as_object()
            .filter(|o| o.len() == 1)
            .ok_or_else(|| {
                DbError::InvalidArgument(format!(
                    "stage {} must be a single-operator document",
                    position
                ))
            })?;
        let (operator, body) = stage_obj.iter().next().expect("len checked above");
        let is_last = position + 1 == pipeline.len();

        match operator.as_str() {
            "$match" => {
                docs.retain(|d| matches_filter(d, body));
            }
            "$addFields" | "$set" => {
                let fields = body.as_object().ok_or_else(|| {
                    DbError::InvalidArgument(format!("{} requires a document", operator))
                })?;
                for doc in &mut docs {
                    for (path, expr) in fields {
                        let value = resolve_expression(doc, expr);
                        set_path(doc, path, value);
                    }
                }
            }
            "$unset" => {
                let paths = unset_paths(body)?;
                for doc in &mut docs {
                    for path in &paths {
                        remove_path(doc, path);
                    }
                }
            }
            "$project" => {
                let spec = body.as_object().ok_or_else(|| {
                    DbError::InvalidArgument("$project requires a document".to_string())
                })?;
                docs = docs.iter().map(|d| project_document(d, spec)).collect();
            }
            "$out" => {
                if !is_last {
                    return Err(DbError::InvalidArgument("$out must be the final stage".to_string()));
                }
                let target = out_target(body)?;
                state.ensure(&target).documents = docs;
                return Ok(Vec::new());
            }
            "$merge" => {
                if !is_last {
                    return Err(DbError::InvalidArgument(
                        "$merge must be the final stage".to_string(),
                    ));
                }
                let merge = MergeSpec::parse(body)?;
                let entry = state.ensure(&merge.into);
                apply_merge(&mut entry.documents, docs, &merge)?;
                return Ok(Vec::new());
            }
            other => {
                return Err(DbError::InvalidArgument(format!(
                    "unsupported pipeline stage '{}'",
                    other
                )));
            }
        }
    }

    Ok(docs)
}

struct MergeSpec {
    into: String,
    on: String,
    when_matched: String,
    when_not_matched: String,
}

impl MergeSpec {
    fn parse(body: &Value) -> DbResult<Self> {
        let (into, on, when_matched, when_not_matched) = match body {
            Value::String(name) => (name.clone(), None, None, None),
            Value::Object(obj) => {
                let into = match obj.get("into") {
                    Some(Value::String(name)) => name.clone(),
                    Some(Value::Object(spec)) => spec
                        .get("coll")
                        .and_then(Value::as_str)
                        .ok_or_else(|| {
                            DbError::InvalidArgument("$merge.into requires a collection".to_string())
                        })?
                        .to_string(),
                    _ => {
                        return Err(DbError::InvalidArgument(
                            "$merge requires an 'into' target".to_string(),
                        ))
                    }
                };
                (
                    into,
                    obj.get("on").and_then(Value::as_str).map(str::to_string),
                    obj.get("whenMatched").and_then(Value::as_str).map(str::to_string),
                    obj.get("whenNotMatched").and_then(Value::as_str).map(str::to_string),
                )
            }
            _ => {
                return Err(DbError::InvalidArgument(
                    "$merge requires a string or document".to_string(),
                ))
            }
        };

        Ok(Self {
            into,
            on: on.unwrap_or_else(|| "_id".to_string()),
            when_matched: when_matched.unwrap_or_else(|| "merge".to_string()),
            when_not_matched: when_not_matched.unwrap_or_else(|| "insert".to_string()),
        })
    }
}

fn apply_merge(target: &mut Vec<Value>, incoming: Vec<Value>, spec: &MergeSpec) -> DbResult<()> {
    for doc in incoming {
        let key = get_path(&doc, &spec.on).cloned().unwrap_or(Value::Null);
        let existing = target
            .iter_mut()
            .find(|d| get_path(d, &spec.on).cloned().unwrap_or(Value::Null) == key);

        match existing {
            Some(slot) => match spec.when_matched.as_str() {
                "replace" => *slot = doc,
                "merge" => {
                    let fields = doc.as_object().cloned().unwrap_or_default();
                    let slot_obj = slot.as_object_mut().expect("stored documents are objects");
                    for (k, v) in fields {
                        slot_obj.insert(k, v);
                    }
                }
                "keepExisting" => {}
                "fail" => {
                    return Err(DbError::OperationFailed(
                        "$merge matched with whenMatched: fail".to_string(),
                    ))
                }
                other => {
                    return Err(DbError::InvalidArgument(format!(
                        "unsupported whenMatched mode '{}'",
                        other
                    )))
                }
            },
            None => match spec.when_not_matched.as_str() {
                "insert" => target.push(doc),
                "discard" => {}
                "fail" => {
                    return Err(DbError::OperationFailed(
                        "$merge missed with whenNotMatched: fail".to_string(),
                    ))
                }
                other => {
                    return Err(DbError::InvalidArgument(format!(
                        "unsupported whenNotMatched mode '{}'",
                        other
                    )))
                }
            },
        }
    }
    Ok(())
}

fn out_target(body: &Value) -> DbResult<String> {
    match body {
        Value::String(name) => Ok(name.clone()),
        Value::Object(obj) => obj
            .get("coll")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| DbError::InvalidArgument("$out requires a collection".to_string())),
        _ => Err(DbError::InvalidArgument(
            "$out requires a string or document".to_string(),
        )),
    }
}

fn unset_paths(body: &Value) -> DbResult<Vec<String>> {
    match body {
        Value::String(path) => Ok(vec![path.clone()]),
        Value::Array(paths) => paths
            .iter()
            .map(|p| {
                p.as_str().map(str::to_string).ok_or_else(|| {
                    DbError::InvalidArgument("$unset paths must be strings".to_string())
                })
            })
            .collect(),
        _ => Err(DbError::InvalidArgument(
            "$unset requires a path or list of paths".to_string(),
        )),
    }
}

fn project_document(doc: &Value, spec: &Map<String, Value>) -> Value {
    let include_mode = spec
        .iter()
        .any(|(k, v)| k != "_id" && (v == &Value::from(1) || v == &Value::Bool(true)));

    let source = match doc.as_object() {
        Some(obj) => obj,
        None => return doc.clone(),
    };

    let mut result = Map::new();
    if include_mode {
        let id_excluded = matches!(spec.get("_id"), Some(v) if v == &Value::from(0) || v == &Value::Bool(false));
        if !id_excluded {
            if let Some(id) = source.get("_id") {
                result.insert("_id".to_string(), id.clone());
            }
        }
        for (key, flag) in spec {
            if key == "_id" {
                continue;
            }
            if flag == &Value::from(1) || flag == &Value::Bool(true) {
                if let Some(value) = get_path(doc, key) {
                    result.insert(key.clone(), value.clone());
                }
            }
        }
    } else {
        for (key, value) in source {
            let excluded = matches!(spec.get(key), Some(v) if v == &Value::from(0) || v == &Value::Bool(false));
            if !excluded {
                result.insert(key.clone(), value.clone());
            }
        }
    }
    Value::Object(result)
}

/// `"$field"` strings read from the current document; everything else is
/// a literal.
fn resolve_expression(doc: &Value, expr: &Value) -> Value {
    if let Some(text) = expr.as_str() {
        if let Some(path) = text.strip_prefix('$') {
            return get_path(doc, path).cloned().unwrap_or(Value::Null);
        }
    }
    expr.clone()
}

fn matches_filter(doc: &Value, filter: &Value) -> bool {
    let Some(conditions) = filter.as_object() else {
        return false;
    };
    conditions.iter().all(|(path, expected)| {
        let actual = get_path(doc, path);
        match expected.as_object().and_then(|o| o.get("$eq")) {
            Some(value) => actual == Some(value),
            None => actual == Some(expected),
        }
    })
}

fn get_path<'a>(doc: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = doc;
    for segment in path.split('.') {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

fn set_path(doc: &mut Value, path: &str, value: Value) {
    let segments: Vec<&str> = path.split('.').collect();
    let mut current = doc;
    for (i, segment) in segments.iter().enumerate() {
        let obj = match current.as_object_mut() {
            Some(obj) => obj,
            None => return,
        };
        if i + 1 == segments.len() {
            obj.insert(segment.to_string(), value);
            return;
        }
        current = obj
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }
}

fn remove_path(doc: &mut Value, path: &str) {
    let segments: Vec<&str> = path.split('.').collect();
    let mut current = doc;
    for (i, segment) in segments.iter().enumerate() {
        let obj = match current.as_object_mut() {
            Some(obj) => obj,
            None => return,
        };
        if i + 1 == segments.len() {
            obj.remove(*segment);
            return;
        }
        match obj.get_mut(*segment) {
            Some(next) => current = next,
            None => return,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn seeded_users() -> MemoryDatabase {
        let db = MemoryDatabase::new();
        db.seed_documents(
            "users",
            vec![
                json!({"_id": 1, "userName": "a b", "status": "active"}),
                json!({"_id": 2, "userName": "c d", "status": "archived"}),
            ],
        );
        db
    }

    #[test]
    fn test_create_index_idempotent_for_identical_spec() {
        let db = MemoryDatabase::new();
        let spec = IndexSpec::ascending("nameIdx", "userName");
        db.create_index("users", &spec).unwrap();
        db.create_index("users", &spec).unwrap();
        assert_eq!(db.index_names("users"), vec!["_id_", "nameIdx"]);
    }

    #[test]
    fn test_create_index_rejects_conflicting_spec() {
        let db = MemoryDatabase::new();
        db.create_index("users", &IndexSpec::ascending("nameIdx", "userName"))
            .unwrap();
        let err = db
            .create_index("users", &IndexSpec::ascending("nameIdx", "email"))
            .unwrap_err();
        assert!(matches!(err, DbError::OperationFailed(_)));
    }

    #[test]
    fn test_drop_missing_index_errors_at_this_level() {
        let db = MemoryDatabase::new();
        let err = db.drop_index("users", "nope").unwrap_err();
        assert!(matches!(err, DbError::OperationFailed(_)));
    }

    #[test]
    fn test_merge_replaces_on_id() {
        let db = seeded_users();
        let pipeline = vec![
            json!({"$addFields": {"full_name": "$userName"}}),
            json!({"$unset": "userName"}),
            json!({"$merge": {"into": "users", "on": "_id", "whenMatched": "replace", "whenNotMatched": "insert"}}),
        ];
        let returned = db
            .aggregate("users", &pipeline, &AggregateOptions::migration())
            .unwrap();
        assert!(returned.is_empty());

        let docs = db.documents("users");
        assert_eq!(docs[0], json!({"_id": 1, "full_name": "a b", "status": "active"}));
        assert_eq!(docs[1], json!({"_id": 2, "full_name": "c d", "status": "archived"}));
    }

    #[test]
    fn test_out_replaces_collection() {
        let db = seeded_users();
        let pipeline = vec![
            json!({"$match": {"status": "active"}}),
            json!({"$out": "active_users"}),
        ];
        db.aggregate("users", &pipeline, &AggregateOptions::migration())
            .unwrap();
        let docs = db.documents("active_users");
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0]["_id"], json!(1));
    }

    #[test]
    fn test_project_exclusion() {
        let db = seeded_users();
        let pipeline = vec![json!({"$project": {"status": 0}})];
        let docs = db
            .aggregate("users", &pipeline, &AggregateOptions::migration())
            .unwrap();
        assert_eq!(docs[0], json!({"_id": 1, "userName": "a b"}));
    }

    #[test]
    fn test_unsupported_stage_is_invalid() {
        let db = seeded_users();
        let err = db
            .aggregate(
                "users",
                &[json!({"$lookup": {}})],
                &AggregateOptions::migration(),
            )
            .unwrap_err();
        assert!(matches!(err, DbError::InvalidArgument(_)));
    }

    #[test]
    fn test_upsert_inserts_then_updates() {
        let db = MemoryDatabase::new();
        let filter = json!({"collection_name": "users"});
        db.upsert_one(
            "versions",
            &filter,
            &json!({"collection_name": "users", "current_version": "1.0.0.1"}),
        )
        .unwrap();
        db.upsert_one(
            "versions",
            &filter,
            &json!({"collection_name": "users", "current_version": "1.0.0.2"}),
        )
        .unwrap();

        let docs = db.find("versions", &filter).unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0]["current_version"], json!("1.0.0.2"));
    }

    #[test]
    fn test_fault_fires_exactly_once() {
        let db = MemoryDatabase::new();
        db.fail_once(FaultPoint::CreateIndex, DbError::Unavailable("injected".into()));

        let spec = IndexSpec::ascending("nameIdx", "userName");
        assert!(db.create_index("users", &spec).is_err());
        assert!(db.create_index("users", &spec).is_ok());
    }

    #[test]
    fn test_validator_round_trip() {
        let db = MemoryDatabase::new();
        let schema = json!({"bsonType": "object"});
        db.set_validator("users", &schema, ValidationLevel::Moderate, ValidationAction::Error)
            .unwrap();
        assert_eq!(db.get_validator("users").unwrap(), Some(schema));
        db.clear_validator("users").unwrap();
        assert_eq!(db.get_validator("users").unwrap(), None);
    }
}
