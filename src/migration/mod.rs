//! Migration execution
//!
//! Runs a version spec's aggregation pipelines in declared order. Each
//! pipeline is a list of stage documents passed opaquely to the store
//! with `allowDiskUse` and majority read/write concerns. The terminal
//! stage is expected to be `$merge` or `$out`; that is not enforced,
//! but a pipeline without one is surfaced as a no-op in its outcome.

use serde_json::Value;
use thiserror::Error;

use crate::db::{AggregateOptions, Database, DbError};
use crate::observability::LogEvent;

/// Errors from running one version's migrations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MigrationError {
    /// A pipeline failed; `index` is zero-based in declared order
    #[error("migration pipeline {index} failed: {reason}")]
    Failed { index: usize, reason: String },

    /// Transport failure; retriable
    #[error("database unavailable: {0}")]
    Unavailable(String),
}

/// What one pipeline did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineOutcome {
    /// Zero-based position in the declared list.
    pub index: usize,
    pub stages: usize,
    /// Whether the final stage was `$merge` or `$out`. When false the
    /// pipeline wrote nothing back.
    pub terminal_write: bool,
}

/// Executes aggregation pipelines for one version transition.
pub struct MigrationManager<'a> {
    db: &'a dyn Database,
}

impl<'a> MigrationManager<'a> {
    pub fn new(db: &'a dyn Database) -> Self {
        Self { db }
    }

    /// Run `pipelines` against `collection` in declared order, stopping
    /// at the first failure.
    pub fn run(
        &self,
        collection: &str,
        pipelines: &[Vec<Value>],
    ) -> Result<Vec<PipelineOutcome>, MigrationError> {
        let mut outcomes = Vec::with_capacity(pipelines.len());

        for (index, stages) in pipelines.iter().enumerate() {
            if stages.is_empty() {
                return Err(MigrationError::Failed {
                    index,
                    reason: "pipeline has no stages".to_string(),
                });
            }

            let terminal_write = has_terminal_write(stages);

            self.db
                .aggregate(collection, stages, &AggregateOptions::migration())
                .map_err(|e| match e {
                    DbError::Unavailable(message) => MigrationError::Unavailable(message),
                    other => MigrationError::Failed {
                        index,
                        reason: other.to_string(),
                    },
                })?;

            if terminal_write {
                LogEvent::info("migration_pipeline_completed")
                    .collection(collection)
                    .pipeline(index)
                    .count(stages.len())
                    .emit();
            } else {
                LogEvent::info("migration_pipeline_no_terminal_write")
                    .collection(collection)
                    .pipeline(index)
                    .emit();
            }

            outcomes.push(PipelineOutcome {
                index,
                stages: stages.len(),
                terminal_write,
            });
        }

        Ok(outcomes)
    }
}

/// True when the final stage is a `$merge` or `$out`.
fn has_terminal_write(stages: &[Value]) -> bool {
    stages
        .last()
        .and_then(Value::as_object)
        .and_then(|stage| stage.keys().next())
        .map(|operator| operator == "$merge" || operator == "$out")
        .unwrap_or(false)
}
