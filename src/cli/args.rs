//! CLI argument definitions using clap
//!
//! Commands:
//! - aerodb-client select <table> [--fields a,b] [--filter col:op:value]...
//! - aerodb-client get <table> --filter col:op:value
//! - aerodb-client insert <table> --data <json> [--upsert]
//! - aerodb-client update <table> --data <json> --filter col:op:value
//! - aerodb-client delete <table> --filter col:op:value
//! - aerodb-client rpc <function> [--params <json>]
//! - aerodb-client buckets
//! - aerodb-client files <bucket> [--prefix p]
//! - aerodb-client user

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Command-line client for an AeroDB service
#[derive(Parser, Debug)]
#[command(name = "aerodb-client")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// JSON configuration file (defaults to .env and AERODB_* variables)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log in as this user before running the command
    #[arg(long, global = true, requires = "password")]
    pub email: Option<String>,

    /// Password for --email
    #[arg(long, global = true, requires = "email")]
    pub password: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Fetch matching rows
    Select {
        table: String,

        /// Comma-separated columns (default: all)
        #[arg(long)]
        fields: Option<String>,

        /// Predicate as column:operator:value (repeatable)
        #[arg(long = "filter", short = 'w')]
        filters: Vec<String>,
    },

    /// Fetch exactly one row
    Get {
        table: String,

        #[arg(long)]
        fields: Option<String>,

        #[arg(long = "filter", short = 'w')]
        filters: Vec<String>,
    },

    /// Insert a row (or rows) given as JSON
    Insert {
        table: String,

        #[arg(long)]
        data: String,

        /// Merge into an existing row on key conflict
        #[arg(long)]
        upsert: bool,
    },

    /// Update matching rows
    Update {
        table: String,

        #[arg(long)]
        data: String,

        #[arg(long = "filter", short = 'w')]
        filters: Vec<String>,
    },

    /// Delete matching rows
    Delete {
        table: String,

        #[arg(long = "filter", short = 'w')]
        filters: Vec<String>,
    },

    /// Call a stored procedure
    Rpc {
        function: String,

        /// Named arguments as a JSON object
        #[arg(long)]
        params: Option<String>,
    },

    /// List storage buckets
    Buckets,

    /// List objects in a bucket
    Files {
        bucket: String,

        #[arg(long)]
        prefix: Option<String>,
    },

    /// Show the signed-in user
    User,
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
