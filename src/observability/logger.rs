//! Structured JSON logger
//!
//! - One log line = one event, JSON, `event` first, `severity` second,
//!   remaining keys sorted
//! - Daily files `<log_dir>/<YYYY-MM-DD>.log`; the date is checked on each
//!   call and the file reopened when it changes
//! - Optional console mirror on stderr in a coarse text format
//! - Logging failures are swallowed; they never affect the caller

use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Local, NaiveDate};

/// Log severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Trace = 0,
    /// Read-path detail
    Debug = 1,
    /// Normal operations
    Info = 2,
    /// Recoverable issues
    Warn = 3,
    /// Operation failures
    Error = 4,
    Fatal = 5,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Trace => "TRACE",
            Severity::Debug => "DEBUG",
            Severity::Info => "INFO",
            Severity::Warn => "WARN",
            Severity::Error => "ERROR",
            Severity::Fatal => "FATAL",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Open file for the current day
struct DailyFile {
    date: NaiveDate,
    file: File,
}

/// File + console logger
pub struct Logger {
    name: String,
    min_severity: Severity,
    log_dir: Option<PathBuf>,
    console: bool,
    current: Mutex<Option<DailyFile>>,
}

impl Logger {
    /// Create a logger writing daily files under `log_dir` (if any)
    pub fn new(name: impl Into<String>, log_dir: Option<PathBuf>, console: bool) -> Self {
        Self {
            name: name.into(),
            min_severity: Severity::Debug,
            log_dir,
            console,
            current: Mutex::new(None),
        }
    }

    /// A logger that writes nothing
    pub fn disabled() -> Self {
        Self::new("disabled", None, false)
    }

    pub fn with_min_severity(mut self, severity: Severity) -> Self {
        self.min_severity = severity;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn log_dir(&self) -> Option<&Path> {
        self.log_dir.as_deref()
    }

    /// Path of the file for a given day
    pub fn file_for(&self, date: NaiveDate) -> Option<PathBuf> {
        self.log_dir
            .as_ref()
            .map(|dir| dir.join(format!("{}.log", date.format("%Y-%m-%d"))))
    }

    /// Log an event with the given severity and fields
    pub fn log(&self, severity: Severity, event: &str, fields: &[(&str, &str)]) {
        self.log_at(Local::now(), severity, event, fields);
    }

    /// Log as if the clock read `now`
    pub fn log_at(&self, now: DateTime<Local>, severity: Severity, event: &str, fields: &[(&str, &str)]) {
        if severity < self.min_severity {
            return;
        }

        let ts = now.to_rfc3339();
        if self.log_dir.is_some() {
            let line = render_line(severity, event, &ts, fields);
            let _ = self.write_file(now.date_naive(), &line);
        }

        if self.console && severity >= Severity::Info {
            let line = render_console(&now, &self.name, severity, event, fields);
            let _ = io::stderr().write_all(line.as_bytes());
        }
    }

    fn write_file(&self, date: NaiveDate, line: &str) -> io::Result<()> {
        let mut current = self
            .current
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "log file lock poisoned"))?;

        let stale = current.as_ref().map(|open| open.date != date).unwrap_or(true);
        if stale {
            let Some(path) = self.file_for(date) else {
                return Ok(());
            };
            if let Some(dir) = path.parent() {
                fs::create_dir_all(dir)?;
            }
            let file = OpenOptions::new().create(true).append(true).open(&path)?;
            *current = Some(DailyFile { date, file });
        }

        if let Some(open) = current.as_mut() {
            open.file.write_all(line.as_bytes())?;
            open.file.flush()?;
        }
        Ok(())
    }

    pub fn trace(&self, event: &str, fields: &[(&str, &str)]) {
        self.log(Severity::Trace, event, fields);
    }

    pub fn debug(&self, event: &str, fields: &[(&str, &str)]) {
        self.log(Severity::Debug, event, fields);
    }

    pub fn info(&self, event: &str, fields: &[(&str, &str)]) {
        self.log(Severity::Info, event, fields);
    }

    pub fn warn(&self, event: &str, fields: &[(&str, &str)]) {
        self.log(Severity::Warn, event, fields);
    }

    pub fn error(&self, event: &str, fields: &[(&str, &str)]) {
        self.log(Severity::Error, event, fields);
    }
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger")
            .field("name", &self.name)
            .field("log_dir", &self.log_dir)
            .field("console", &self.console)
            .finish()
    }
}

/// One JSON line: event, severity, then sorted fields (including `ts`)
pub(crate) fn render_line(severity: Severity, event: &str, ts: &str, fields: &[(&str, &str)]) -> String {
    let mut output = String::with_capacity(256);

    output.push('{');
    output.push_str("\"event\":\"");
    escape_json_string(&mut output, event);
    output.push('"');

    output.push_str(",\"severity\":\"");
    output.push_str(severity.as_str());
    output.push('"');

    let mut sorted: Vec<(&str, &str)> = fields.to_vec();
    sorted.push(("ts", ts));
    sorted.sort_by_key(|(k, _)| *k);

    for (key, value) in sorted {
        output.push_str(",\"");
        escape_json_string(&mut output, key);
        output.push_str("\":\"");
        escape_json_string(&mut output, value);
        output.push('"');
    }

    output.push('}');
    output.push('\n');
    output
}

/// `<timestamp> - <logger> - <LEVEL> - <message>`
fn render_console(
    now: &DateTime<Local>,
    name: &str,
    severity: Severity,
    event: &str,
    fields: &[(&str, &str)],
) -> String {
    let mut message = event.to_string();
    for key in ["method", "duration_ms", "message"] {
        if let Some((_, value)) = fields.iter().find(|(k, _)| *k == key) {
            message.push_str(&format!(" {}={}", key, value));
        }
    }
    format!(
        "{} - {} - {} - {}\n",
        now.format("%Y-%m-%d %H:%M:%S"),
        name,
        severity,
        message
    )
}

fn escape_json_string(output: &mut String, s: &str) {
    for c in s.chars() {
        match c {
            '"' => output.push_str("\\\""),
            '\\' => output.push_str("\\\\"),
            '\n' => output.push_str("\\n"),
            '\r' => output.push_str("\\r"),
            '\t' => output.push_str("\\t"),
            c if c.is_control() => {
                output.push_str(&format!("\\u{:04x}", c as u32));
            }
            c => output.push(c),
        }
    }
}
