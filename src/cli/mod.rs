//! Command-line interface
//!
//! Thin surface over the library: validate, render, process. Batch mode
//! (`AUTO_PROCESS` / `EXIT_AFTER_PROCESSING`) maps onto the same
//! commands with the documented exit codes.

mod args;
mod commands;

pub use args::{Cli, Command, RenderFormat};
pub use commands::{run, EXIT_OK, EXIT_PROCESSING_FAILED, EXIT_VALIDATION_FAILED};
