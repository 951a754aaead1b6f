//! Service configuration
//!
//! Settings are read from the environment with serde-style defaults.
//! Database connection parameters are deliberately absent: the wire
//! client is an injected capability, never configured or parsed here.

use std::env;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Service settings for one processing run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Root of the input tree (collections/, dictionary/, data/)
    #[serde(default = "default_input_folder")]
    pub input_folder: PathBuf,

    /// Name of the collection holding per-collection version markers
    #[serde(default = "default_version_collection")]
    pub version_collection_name: String,

    /// Process all collections on startup
    #[serde(default)]
    pub auto_process: bool,

    /// Exit with a batch status code once processing finishes
    #[serde(default)]
    pub exit_after_processing: bool,

    /// Load test-data files named by version specs
    #[serde(default)]
    pub load_test_data: bool,

    /// Upper bound on concurrent collection workers
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    /// Timeout for a single database operation, in seconds
    #[serde(default = "default_op_timeout")]
    pub op_timeout_secs: u64,

    /// Timeout for a single migration pipeline, in seconds
    #[serde(default = "default_pipeline_timeout")]
    pub pipeline_timeout_secs: u64,

    /// Timeout for one full version transition, in seconds
    #[serde(default = "default_transition_timeout")]
    pub transition_timeout_secs: u64,
}

fn default_input_folder() -> PathBuf {
    PathBuf::from("./input")
}

fn default_version_collection() -> String {
    "CollectionVersions".to_string()
}

fn default_max_workers() -> usize {
    8
}

fn default_op_timeout() -> u64 {
    30
}

fn default_pipeline_timeout() -> u64 {
    600
}

fn default_transition_timeout() -> u64 {
    3600
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            input_folder: default_input_folder(),
            version_collection_name: default_version_collection(),
            auto_process: false,
            exit_after_processing: false,
            load_test_data: false,
            max_workers: default_max_workers(),
            op_timeout_secs: default_op_timeout(),
            pipeline_timeout_secs: default_pipeline_timeout(),
            transition_timeout_secs: default_transition_timeout(),
        }
    }
}

impl ServiceConfig {
    /// Build a config from the process environment, falling back to
    /// defaults for anything unset or unparseable.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(folder) = env::var("INPUT_FOLDER") {
            config.input_folder = PathBuf::from(folder);
        }
        if let Ok(name) = env::var("VERSION_COLLECTION_NAME") {
            if !name.is_empty() {
                config.version_collection_name = name;
            }
        }
        config.auto_process = env_flag("AUTO_PROCESS").unwrap_or(config.auto_process);
        config.exit_after_processing =
            env_flag("EXIT_AFTER_PROCESSING").unwrap_or(config.exit_after_processing);
        config.load_test_data = env_flag("LOAD_TEST_DATA").unwrap_or(config.load_test_data);

        if let Some(n) = env_number("MAX_WORKERS") {
            config.max_workers = (n as usize).clamp(1, default_max_workers());
        }
        if let Some(n) = env_number("OP_TIMEOUT_SECS") {
            config.op_timeout_secs = n;
        }
        if let Some(n) = env_number("PIPELINE_TIMEOUT_SECS") {
            config.pipeline_timeout_secs = n;
        }
        if let Some(n) = env_number("TRANSITION_TIMEOUT_SECS") {
            config.transition_timeout_secs = n;
        }

        config
    }

    /// Worker count for a run over `collections` collections.
    pub fn worker_count(&self, collections: usize) -> usize {
        collections.clamp(1, self.max_workers.max(1))
    }
}

fn env_flag(name: &str) -> Option<bool> {
    let raw = env::var(name).ok()?;
    match raw.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

fn env_number(name: &str) -> Option<u64> {
    env::var(name).ok()?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServiceConfig::default();
        assert_eq!(config.version_collection_name, "CollectionVersions");
        assert!(!config.auto_process);
        assert!(!config.load_test_data);
        assert_eq!(config.op_timeout_secs, 30);
        assert_eq!(config.pipeline_timeout_secs, 600);
        assert_eq!(config.transition_timeout_secs, 3600);
    }

    #[test]
    fn test_worker_count_capped() {
        let config = ServiceConfig::default();
        assert_eq!(config.worker_count(3), 3);
        assert_eq!(config.worker_count(100), 8);
        assert_eq!(config.worker_count(0), 1);
    }
}
