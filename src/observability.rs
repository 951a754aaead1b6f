//! Structured event log
//!
//! Every log line is one JSON object describing one processing event.
//! Events carry the fields this service reports: the collection being
//! processed, the version in flight, the transition step, index and
//! pipeline identifiers, and an error code on aborts. Fields are
//! emitted in a fixed schema order regardless of how the event was
//! built, so identical runs produce identical logs. Writes are
//! synchronous and unbuffered; ERROR goes to stderr, INFO and WARN to
//! stdout.

use std::fmt::Write as _;
use std::io::{self, Write};

use crate::version::VersionNumber;

/// Log severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Normal operations
    Info,
    /// Recoverable issues
    Warn,
    /// Operation failures
    Error,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "INFO",
            Severity::Warn => "WARN",
            Severity::Error => "ERROR",
        }
    }
}

/// One processing event, built field by field and emitted as a single
/// JSON line.
#[derive(Debug)]
pub struct LogEvent {
    severity: Severity,
    event: &'static str,
    collection: Option<String>,
    version: Option<String>,
    step: Option<String>,
    index: Option<String>,
    pipeline: Option<usize>,
    count: Option<usize>,
    code: Option<&'static str>,
    detail: Option<String>,
}

impl LogEvent {
    fn new(severity: Severity, event: &'static str) -> Self {
        Self {
            severity,
            event,
            collection: None,
            version: None,
            step: None,
            index: None,
            pipeline: None,
            count: None,
            code: None,
            detail: None,
        }
    }

    pub fn info(event: &'static str) -> Self {
        Self::new(Severity::Info, event)
    }

    pub fn warn(event: &'static str) -> Self {
        Self::new(Severity::Warn, event)
    }

    pub fn error(event: &'static str) -> Self {
        Self::new(Severity::Error, event)
    }

    /// The collection the event concerns.
    pub fn collection(mut self, name: impl Into<String>) -> Self {
        self.collection = Some(name.into());
        self
    }

    /// The version in flight when the event fired.
    pub fn version(mut self, version: &VersionNumber) -> Self {
        self.version = Some(version.to_string());
        self
    }

    /// The transition step the event belongs to.
    pub fn step(mut self, step: impl Into<String>) -> Self {
        self.step = Some(step.into());
        self
    }

    /// The index an index operation touched.
    pub fn index(mut self, name: impl Into<String>) -> Self {
        self.index = Some(name.into());
        self
    }

    /// Zero-based position of a migration pipeline.
    pub fn pipeline(mut self, position: usize) -> Self {
        self.pipeline = Some(position);
        self
    }

    /// A count the event reports (stages run, records found, ...).
    pub fn count(mut self, count: usize) -> Self {
        self.count = Some(count);
        self
    }

    /// Stable error code on aborts.
    pub fn code(mut self, code: &'static str) -> Self {
        self.code = Some(code);
        self
    }

    /// Free-text detail, kept last in the line.
    pub fn detail(mut self, message: impl Into<String>) -> Self {
        self.detail = Some(message.into());
        self
    }

    /// Write the event as one line, synchronously.
    pub fn emit(self) {
        let line = self.render();
        if self.severity == Severity::Error {
            let mut err = io::stderr();
            let _ = writeln!(err, "{}", line);
            let _ = err.flush();
        } else {
            let mut out = io::stdout();
            let _ = writeln!(out, "{}", line);
            let _ = out.flush();
        }
    }

    /// The JSON line, fields in schema order: event, severity,
    /// collection, version, step, index, pipeline, count, code, detail.
    fn render(&self) -> String {
        let mut line = String::with_capacity(192);
        line.push_str("{\"event\":\"");
        escape_into(&mut line, self.event);
        line.push_str("\",\"severity\":\"");
        line.push_str(self.severity.as_str());
        line.push('"');

        append_text(&mut line, "collection", self.collection.as_deref());
        append_text(&mut line, "version", self.version.as_deref());
        append_text(&mut line, "step", self.step.as_deref());
        append_text(&mut line, "index", self.index.as_deref());
        append_number(&mut line, "pipeline", self.pipeline);
        append_number(&mut line, "count", self.count);
        append_text(&mut line, "code", self.code);
        append_text(&mut line, "detail", self.detail.as_deref());

        line.push('}');
        line
    }
}

// Field keys are fixed identifiers, so only values need escaping.
fn append_text(line: &mut String, key: &str, value: Option<&str>) {
    if let Some(value) = value {
        let _ = write!(line, ",\"{}\":\"", key);
        escape_into(line, value);
        line.push('"');
    }
}

fn append_number(line: &mut String, key: &str, value: Option<usize>) {
    if let Some(value) = value {
        let _ = write!(line, ",\"{}\":{}", key, value);
    }
}

fn escape_into(line: &mut String, text: &str) {
    for c in text.chars() {
        match c {
            '"' => line.push_str("\\\""),
            '\\' => line.push_str("\\\\"),
            '\n' => line.push_str("\\n"),
            '\r' => line.push_str("\\r"),
            '\t' => line.push_str("\\t"),
            c if c.is_control() => {
                let _ = write!(line, "\\u{:04x}", c as u32);
            }
            c => line.push(c),
        }
    }
}
