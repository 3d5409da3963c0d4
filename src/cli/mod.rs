//! CLI module for the AeroDB client
//!
//! Provides command-line access to:
//! - rows: select, get, insert, update, delete
//! - rpc: stored procedure calls
//! - storage: bucket and object listings
//! - auth: the signed-in user

mod args;
mod commands;
mod errors;

pub use args::{Cli, Command};
pub use commands::{connect, parse_filter, parse_filter_value, run, run_command, write_json};
pub use errors::{CliError, CliErrorCode, CliResult};
