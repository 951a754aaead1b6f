//! Command dispatch
//!
//! Exit codes, batch-mode semantics: `0` when every collection reached
//! its latest declared version, `1` when any collection failed, `2`
//! when the pre-run validation pass produced errors.

use std::path::PathBuf;
use std::sync::Arc;

use serde_json::json;

use crate::config::ServiceConfig;
use crate::db::{Database, MemoryDatabase};
use crate::enumerators::EnumeratorRegistry;
use crate::loader::{FileLoader, SourceTree};
use crate::processor::{OperationStatus, Processor, RunContext};
use crate::schema::{render_bson_schema, render_json_schema, render_openapi, SchemaResolver};
use crate::types::TypeDictionary;
use crate::validation::ValidationPass;
use crate::version::VersionNumber;

use super::args::{Cli, Command, RenderFormat};

pub const EXIT_OK: i32 = 0;
pub const EXIT_PROCESSING_FAILED: i32 = 1;
pub const EXIT_VALIDATION_FAILED: i32 = 2;

/// Run the selected (or batch-default) command and return the exit code.
pub fn run(cli: Cli, config: ServiceConfig) -> i32 {
    let command = cli.command.unwrap_or_else(|| default_command(&config));

    match command {
        Command::Validate { input } => cmd_validate(resolve_input(input, &config)),
        Command::Render { format, target, input } => {
            cmd_render(format, &target, resolve_input(input, &config))
        }
        Command::Process {
            collection,
            rehearse,
            load_test_data,
            input,
        } => {
            let mut config = config;
            config.load_test_data |= load_test_data;
            let input = input.unwrap_or_else(|| config.input_folder.clone());
            cmd_process(collection, rehearse, input, config)
        }
    }
}

/// With `AUTO_PROCESS` set the bare invocation processes everything;
/// otherwise it validates.
fn default_command(config: &ServiceConfig) -> Command {
    if config.auto_process {
        Command::Process {
            collection: None,
            rehearse: true,
            load_test_data: config.load_test_data,
            input: None,
        }
    } else {
        Command::Validate { input: None }
    }
}

fn resolve_input(input: Option<PathBuf>, config: &ServiceConfig) -> PathBuf {
    input.unwrap_or_else(|| config.input_folder.clone())
}

fn load_sources(input: &PathBuf) -> SourceTree {
    FileLoader::new(input).load()
}

fn cmd_validate(input: PathBuf) -> i32 {
    let sources = load_sources(&input);
    let issues = ValidationPass::run(&sources);
    let status = if issues.is_empty() { "ok" } else { "failed" };

    let summary = json!({
        "status": status,
        "issues": &issues,
    });
    println!("{}", serde_json::to_string_pretty(&summary).unwrap_or_default());

    if issues.is_empty() {
        EXIT_OK
    } else {
        EXIT_VALIDATION_FAILED
    }
}

fn cmd_render(format: RenderFormat, target: &str, input: PathBuf) -> i32 {
    let Some((collection, raw_version)) = target.split_once('.') else {
        eprintln!(
            "{}",
            json!({"status": "error", "message": "target must be <collection>.<version>"})
        );
        return EXIT_VALIDATION_FAILED;
    };
    let version = match VersionNumber::parse(raw_version) {
        Ok(version) => version,
        Err(e) => {
            eprintln!("{}", json!({"status": "error", "message": e.to_string()}));
            return EXIT_VALIDATION_FAILED;
        }
    };

    let sources = load_sources(&input);
    let issues = ValidationPass::run(&sources);
    if !issues.is_empty() {
        eprintln!(
            "{}",
            serde_json::to_string_pretty(&json!({"status": "failed", "issues": issues}))
                .unwrap_or_default()
        );
        return EXIT_VALIDATION_FAILED;
    }

    let (types, _) = TypeDictionary::build(&sources.types);
    let (enumerators, _) = EnumeratorRegistry::build(sources.enumerators.as_ref());
    let mut resolver = SchemaResolver::new(&sources.dictionary, &types, &enumerators);

    let outcome = resolver.resolve_collection(collection, &version);
    let Some(resolved) = outcome.schema.filter(|_| outcome.issues.is_empty()) else {
        eprintln!(
            "{}",
            serde_json::to_string_pretty(&json!({"status": "failed", "issues": outcome.issues}))
                .unwrap_or_default()
        );
        return EXIT_VALIDATION_FAILED;
    };

    let document = match format {
        RenderFormat::JsonSchema => render_json_schema(&resolved),
        RenderFormat::BsonSchema => render_bson_schema(&resolved),
        RenderFormat::Openapi => render_openapi(collection, &resolved),
    };
    println!("{}", serde_json::to_string_pretty(&document).unwrap_or_default());
    EXIT_OK
}

fn cmd_process(
    collection: Option<String>,
    rehearse: bool,
    input: PathBuf,
    config: ServiceConfig,
) -> i32 {
    if !rehearse {
        eprintln!(
            "{}",
            json!({
                "status": "error",
                "message": "no database capability is wired into this binary; \
                            pass --rehearse for the in-memory engine or embed the library \
                            with an injected Database implementation"
            })
        );
        return EXIT_PROCESSING_FAILED;
    }

    let db: Arc<dyn Database> = Arc::new(MemoryDatabase::new());
    let sources = load_sources(&input);

    let processor = match Processor::new(db, sources, config) {
        Ok(processor) => processor,
        Err(issues) => {
            eprintln!(
                "{}",
                serde_json::to_string_pretty(&json!({"status": "failed", "issues": issues}))
                    .unwrap_or_default()
            );
            return EXIT_VALIDATION_FAILED;
        }
    };

    let ctx = RunContext::new();
    let reports = match collection {
        Some(name) => vec![processor.process_collection(&name, &ctx)],
        None => processor.process_all(&ctx),
    };

    println!("{}", serde_json::to_string_pretty(&reports).unwrap_or_default());

    if reports.iter().all(|r| r.status == OperationStatus::Ok) {
        EXIT_OK
    } else {
        EXIT_PROCESSING_FAILED
    }
}
