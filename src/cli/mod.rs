//! Command-line interface for ftlint.
//!
//! Provides one command per analysis engine plus `init` for writing a
//! default configuration file.

mod commands;

pub use commands::{parse_cli, run, run_with_cli, Cli, Commands};
