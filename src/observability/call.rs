//! Call Observer
//!
//! Wraps every public facade operation:
//! - `CALL_BEGIN` before execution with method and arguments
//! - `CALL_COMPLETE` with duration and a result summary
//! - `CALL_FAILED` with duration, error kind, code, message and cause
//! - `CALL_INCOMPLETE` if the call is dropped before finishing
//!
//! The observed result is returned unchanged.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use serde_json::Value;

use super::logger::{Logger, Severity};
use crate::errors::{ClientError, ClientResult};
use crate::operation::Operation;
use crate::query::Row;

const REDACTED: &str = "***";
const MAX_SUMMARY_CHARS: usize = 200;

/// Argument names whose values are never logged
const SECRET_ARGS: &[&str] = &["password", "token", "secret", "access_token", "refresh_token"];

/// Named call arguments, rendered into the `args` field
#[derive(Debug, Clone, Default)]
pub struct CallArgs {
    entries: Vec<(&'static str, String)>,
}

impl CallArgs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an argument; secret-looking names are redacted
    pub fn with(mut self, name: &'static str, value: impl ToString) -> Self {
        let rendered = if is_secret(name) {
            REDACTED.to_string()
        } else {
            truncate(&value.to_string(), MAX_SUMMARY_CHARS)
        };
        self.entries.push((name, rendered));
        self
    }

    /// Record an argument that must never be logged
    pub fn secret(mut self, name: &'static str) -> Self {
        self.entries.push((name, REDACTED.to_string()));
        self
    }

    /// Record a payload by size only
    pub fn payload(mut self, name: &'static str, len: usize) -> Self {
        self.entries.push((name, format!("<{} bytes>", len)));
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| *k == name)
            .map(|(_, v)| v.as_str())
    }

    /// JSON object text, keys in insertion order
    pub fn render(&self) -> String {
        let map: serde_json::Map<String, Value> = self
            .entries
            .iter()
            .map(|(k, v)| (k.to_string(), Value::String(v.clone())))
            .collect();
        Value::Object(map).to_string()
    }
}

fn is_secret(name: &str) -> bool {
    let lowered = name.to_ascii_lowercase();
    SECRET_ARGS.iter().any(|secret| lowered.contains(secret))
}

/// Shorten to at most `max` characters
pub fn truncate(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

/// Short, log-safe description of an operation result
pub trait Summarize {
    fn summarize(&self) -> String;
}

impl Summarize for () {
    fn summarize(&self) -> String {
        "ok".to_string()
    }
}

impl Summarize for bool {
    fn summarize(&self) -> String {
        self.to_string()
    }
}

impl Summarize for String {
    fn summarize(&self) -> String {
        truncate(self, MAX_SUMMARY_CHARS)
    }
}

impl Summarize for Bytes {
    fn summarize(&self) -> String {
        format!("<{} bytes>", self.len())
    }
}

impl Summarize for Value {
    fn summarize(&self) -> String {
        truncate(&self.to_string(), MAX_SUMMARY_CHARS)
    }
}

impl Summarize for Row {
    fn summarize(&self) -> String {
        match self.get("id") {
            Some(id) => format!("row id={}", id),
            None => format!("row with {} fields", self.len()),
        }
    }
}

impl<T: Summarize> Summarize for Option<T> {
    fn summarize(&self) -> String {
        match self {
            Some(inner) => inner.summarize(),
            None => "none".to_string(),
        }
    }
}

impl<T> Summarize for Vec<T> {
    fn summarize(&self) -> String {
        format!("{} items", self.len())
    }
}

/// Wraps operations with begin/complete/failed logging
#[derive(Debug, Clone)]
pub struct CallObserver {
    logger: Arc<Logger>,
}

impl CallObserver {
    pub fn new(logger: Arc<Logger>) -> Self {
        Self { logger }
    }

    /// Observer that logs nothing
    pub fn disabled() -> Self {
        Self::new(Arc::new(Logger::disabled()))
    }

    pub fn logger(&self) -> &Arc<Logger> {
        &self.logger
    }

    /// Observe an async operation
    pub async fn observe<T, F>(&self, op: Operation, args: CallArgs, fut: F) -> ClientResult<T>
    where
        T: Summarize,
        F: Future<Output = ClientResult<T>>,
    {
        let scope = CallScope::begin(&self.logger, op, &args);
        let result = fut.await;
        scope.finish(&result);
        result
    }

    /// Observe a blocking operation
    pub fn observe_sync<T, F>(&self, op: Operation, args: CallArgs, f: F) -> ClientResult<T>
    where
        T: Summarize,
        F: FnOnce() -> ClientResult<T>,
    {
        let scope = CallScope::begin(&self.logger, op, &args);
        let result = f();
        scope.finish(&result);
        result
    }
}

/// One in-flight call
struct CallScope<'a> {
    logger: &'a Logger,
    op: Operation,
    started: Instant,
    finished: bool,
}

impl<'a> CallScope<'a> {
    fn begin(logger: &'a Logger, op: Operation, args: &CallArgs) -> Self {
        let rendered = args.render();
        logger.log(
            severity_for(op),
            "CALL_BEGIN",
            &[("method", op.name()), ("args", rendered.as_str())],
        );
        Self {
            logger,
            op,
            started: Instant::now(),
            finished: false,
        }
    }

    fn finish<T: Summarize>(mut self, result: &ClientResult<T>) {
        self.finished = true;
        let duration = self.started.elapsed().as_millis().to_string();
        match result {
            Ok(value) => {
                let summary = value.summarize();
                self.logger.log(
                    severity_for(self.op),
                    "CALL_COMPLETE",
                    &[
                        ("method", self.op.name()),
                        ("duration_ms", duration.as_str()),
                        ("result", summary.as_str()),
                    ],
                );
            }
            Err(err) => self.failed(err, &duration),
        }
    }

    fn failed(&self, err: &ClientError, duration: &str) {
        let cause = err
            .transport()
            .map(|t| t.to_string())
            .unwrap_or_else(|| "none".to_string());
        self.logger.log(
            Severity::Error,
            "CALL_FAILED",
            &[
                ("method", self.op.name()),
                ("duration_ms", duration),
                ("kind", err.kind().as_str()),
                ("code", err.code()),
                ("message", err.message()),
                ("cause", cause.as_str()),
            ],
        );
    }
}

impl Drop for CallScope<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.logger.warn(
                "CALL_INCOMPLETE",
                &[("method", self.op.name()), ("reason", "call dropped before completion")],
            );
        }
    }
}

/// Writes at INFO, reads at DEBUG
fn severity_for(op: Operation) -> Severity {
    if op.is_write() {
        Severity::Info
    } else {
        Severity::Debug
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use chrono::Local;
    use serde_json::json;

    fn observer_in(dir: &std::path::Path) -> CallObserver {
        CallObserver::new(Arc::new(Logger::new("test", Some(dir.to_path_buf()), false)))
    }

    fn read_lines(observer: &CallObserver) -> Vec<Value> {
        let path = observer.logger().file_for(Local::now().date_naive()).unwrap();
        std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[test]
    fn test_args_redact_secrets() {
        let args = CallArgs::new()
            .with("email", "ann@example.com")
            .with("password", "hunter2")
            .with("refresh_token", "abc")
            .payload("data", 42);

        assert_eq!(args.get("email"), Some("ann@example.com"));
        assert_eq!(args.get("password"), Some(REDACTED));
        assert_eq!(args.get("refresh_token"), Some(REDACTED));
        assert_eq!(args.get("data"), Some("<42 bytes>"));
        assert!(!args.render().contains("hunter2"));
    }

    #[test]
    fn test_truncate_is_char_safe() {
        assert_eq!(truncate("héllo", 2), "hé...");
        assert_eq!(truncate("short", 10), "short");
    }

    #[test]
    fn test_summaries() {
        assert_eq!(().summarize(), "ok");
        assert_eq!(vec![1, 2, 3].summarize(), "3 items");
        assert_eq!(Some(true).summarize(), "true");
        assert_eq!(None::<bool>.summarize(), "none");
        assert_eq!(Bytes::from_static(b"abcd").summarize(), "<4 bytes>");

        let row = json!({"id": 7, "name": "a"}).as_object().unwrap().clone();
        assert_eq!(row.summarize(), "row id=7");
    }

    #[tokio::test]
    async fn test_observe_success_logs_begin_and_complete() {
        let dir = tempfile::tempdir().unwrap();
        let observer = observer_in(dir.path());

        let result = observer
            .observe(
                Operation::Insert,
                CallArgs::new().with("table", "widgets"),
                async { Ok(vec![1, 2]) },
            )
            .await;
        assert_eq!(result.unwrap(), vec![1, 2]);

        let lines = read_lines(&observer);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["event"], "CALL_BEGIN");
        assert_eq!(lines[0]["severity"], "INFO");
        assert_eq!(lines[0]["args"], r#"{"table":"widgets"}"#);
        assert_eq!(lines[1]["event"], "CALL_COMPLETE");
        assert_eq!(lines[1]["result"], "2 items");
        assert!(lines[1]["duration_ms"].as_str().unwrap().parse::<u64>().is_ok());
    }

    #[test]
    fn test_observe_failure_returns_error_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let observer = observer_in(dir.path());

        let result: ClientResult<()> = observer.observe_sync(Operation::Select, CallArgs::new(), || {
            Err(ClientError::validation("Unsupported operator: between"))
        });

        let err = result.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(err.message(), "Unsupported operator: between");

        let lines = read_lines(&observer);
        assert_eq!(lines[0]["severity"], "DEBUG");
        assert_eq!(lines[1]["event"], "CALL_FAILED");
        assert_eq!(lines[1]["severity"], "ERROR");
        assert_eq!(lines[1]["code"], "AERO_CLIENT_VALIDATION_ERROR");
        assert_eq!(lines[1]["cause"], "none");
    }
}
