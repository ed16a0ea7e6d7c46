//! Command-line interface for news-forge.
//!
//! Provides commands for running the queue and scheduler, manual triggers,
//! one-off processing and catalog inspection.

mod commands;

pub use commands::{parse_cli, run, run_with_cli, Cli, Commands};
