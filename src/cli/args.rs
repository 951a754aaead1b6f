//! CLI argument definitions using clap
//!
//! Commands:
//! - mongoconf validate [--input <dir>]
//! - mongoconf render <format> <collection>.<version> [--input <dir>]
//! - mongoconf process [--collection <name>] [--rehearse] [--input <dir>]

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// mongoconf - schema, index and migration manager for document stores
#[derive(Parser, Debug)]
#[command(name = "mongoconf")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the pre-run validation pass and print every issue
    Validate {
        /// Root of the input tree
        #[arg(long)]
        input: Option<PathBuf>,
    },

    /// Render a schema document for one collection version
    Render {
        /// Output form to render
        #[arg(value_enum)]
        format: RenderFormat,

        /// Target as <collection>.<major>.<minor>.<patch>.<enumerator>
        target: String,

        /// Root of the input tree
        #[arg(long)]
        input: Option<PathBuf>,
    },

    /// Advance collections to their latest declared versions
    Process {
        /// Process a single collection instead of all of them
        #[arg(long)]
        collection: Option<String>,

        /// Run against the built-in in-memory capability. The shipped
        /// binary has no wire client; embedders inject one through the
        /// library API.
        #[arg(long)]
        rehearse: bool,

        /// Load test-data files named by version specs
        #[arg(long)]
        load_test_data: bool,

        /// Root of the input tree
        #[arg(long)]
        input: Option<PathBuf>,
    },
}

/// The renderable output forms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RenderFormat {
    /// JSON-Schema for API consumers
    JsonSchema,
    /// BSON schema for a collection validator
    BsonSchema,
    /// OpenAPI component-schemas excerpt
    Openapi,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_render_command() {
        let cli = Cli::try_parse_from(["mongoconf", "render", "json-schema", "users.1.0.0.1"]).unwrap();
        match cli.command {
            Some(Command::Render { format, target, .. }) => {
                assert_eq!(format, RenderFormat::JsonSchema);
                assert_eq!(target, "users.1.0.0.1");
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_process_flags() {
        let cli = Cli::try_parse_from([
            "mongoconf",
            "process",
            "--collection",
            "users",
            "--rehearse",
        ])
        .unwrap();
        match cli.command {
            Some(Command::Process {
                collection,
                rehearse,
                load_test_data,
                ..
            }) => {
                assert_eq!(collection.as_deref(), Some("users"));
                assert!(rehearse);
                assert!(!load_test_data);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }
}
