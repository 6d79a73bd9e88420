//! Command-line front end for the trident pipeline.
//!
//! - [`args`] - clap definitions for `run`, `prepare` and `generate`
//! - [`cli`] - logging setup, config loading and dispatch
//! - [`commands`] - one handler per subcommand
//! - [`error`] - CLI errors and process exit codes

pub mod args;
pub mod cli;
pub mod commands;
pub mod error;

pub use error::{exit_code_for, CliError};
