//! mongoconf CLI entry point
//!
//! main.rs only parses the environment and arguments, dispatches to the
//! CLI commands, and exits with the batch status code. It never calls
//! subsystems directly.

use std::process;

use mongoconf::cli::{run, Cli};
use mongoconf::config::ServiceConfig;

fn main() {
    let config = ServiceConfig::from_env();
    let cli = Cli::parse_args();

    let code = run(cli, config);
    process::exit(code);
}
