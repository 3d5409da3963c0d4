//! Observability for the client facade
//!
//! - Structured JSON logging into daily files, optional console mirror
//! - Per-call begin/complete/failed records for every public operation
//!
//! # Principles
//!
//! 1. Observability is read-only: results and errors pass through unchanged
//! 2. Logging failures never reach the caller
//! 3. No background threads; file rotation happens on the logging call
//!
//! # Usage
//!
//! ```ignore
//! use aerodb_client::observability::{CallArgs, CallObserver, Logger};
//!
//! let observer = CallObserver::new(Arc::new(Logger::new("app", Some("logs".into()), true)));
//! let rows = observer
//!     .observe(Operation::Select, CallArgs::new().with("table", "widgets"), fetch())
//!     .await?;
//! ```

mod call;
mod logger;

pub use call::{truncate, CallArgs, CallObserver, Summarize};
pub use logger::{Logger, Severity};

use std::sync::Arc;

use crate::config::ClientConfig;

/// Logger name used for facade records
pub const LOGGER_NAME: &str = "aerodb_client";

/// Build the call observer described by a config
pub fn observer_for(config: &ClientConfig) -> CallObserver {
    let logger = Logger::new(LOGGER_NAME, config.log_dir.clone(), config.console_log);
    CallObserver::new(Arc::new(logger))
}
