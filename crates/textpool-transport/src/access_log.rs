//! # Access log
//!
//! One line per completed request, in a fixed layout that existing log
//! tooling parses:
//!
//! ```text
//! [http-0] 127.0.0.1 [19/Oct/2026:14:02:11 +0000] "POST / HTTP/1.1" 200 512 "-" "curl/8.5.0"
//! ```
//!
//! Lines go to a dedicated [`AccessSink`], not through `tracing`, so the
//! layout is not decorated by the diagnostic subscriber.

use std::fmt;
use std::io::Write;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, FixedOffset, Local};
use hyper::{StatusCode, Version};

use crate::task::RequestInfo;

const TIMESTAMP_FORMAT: &str = "%d/%b/%Y:%H:%M:%S %z";

pub trait AccessSink: Send + Sync {
    fn write_line(&self, line: &str);
}

/// Writes each line to stdout under the stdout lock.
pub struct StdoutSink;

impl AccessSink for StdoutSink {
    fn write_line(&self, line: &str) {
        let mut out = std::io::stdout().lock();
        if let Err(e) = writeln!(out, "{line}") {
            tracing::error!("Unable to write access log line: {e}");
        }
    }
}

/// Keeps lines in memory.
#[derive(Default)]
pub struct MemorySink {
    lines: Mutex<Vec<String>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().map(|l| l.clone()).unwrap_or_default()
    }
}

impl AccessSink for MemorySink {
    fn write_line(&self, line: &str) {
        if let Ok(mut lines) = self.lines.lock() {
            lines.push(line.to_string());
        }
    }
}

pub struct AccessRecord<'a> {
    pub worker: &'a str,
    pub request: &'a RequestInfo,
    pub status: StatusCode,
    pub bytes: usize,
    pub timestamp: DateTime<FixedOffset>,
}

impl fmt::Display for AccessRecord<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let req = self.request;
        let host = req.client.map(|addr| addr.ip().to_string());
        let (major, minor) = version_parts(req.version);

        write!(
            f,
            "[{}] {} [{}] \"{} {} HTTP/{}.{}\" {} {} \"{}\" \"{}\"",
            self.worker,
            host.as_deref().unwrap_or("-"),
            self.timestamp.format(TIMESTAMP_FORMAT),
            req.method,
            req.path,
            major,
            minor,
            self.status.as_u16(),
            self.bytes,
            non_empty_or_dash(req.referrer.as_deref()),
            non_empty_or_dash(req.user_agent.as_deref()),
        )
    }
}

fn non_empty_or_dash(value: Option<&str>) -> &str {
    value.filter(|v| !v.is_empty()).unwrap_or("-")
}

pub fn version_parts(version: Version) -> (u8, u8) {
    match version {
        Version::HTTP_09 => (0, 9),
        Version::HTTP_10 => (1, 0),
        Version::HTTP_2 => (2, 0),
        Version::HTTP_3 => (3, 0),
        _ => (1, 1),
    }
}

/// Cheap to clone; every worker holds one.
#[derive(Clone)]
pub struct AccessLog {
    sink: Arc<dyn AccessSink>,
}

impl AccessLog {
    pub fn new(sink: Arc<dyn AccessSink>) -> Self {
        Self { sink }
    }

    pub fn stdout() -> Self {
        Self::new(Arc::new(StdoutSink))
    }

    /// Formats and emits one line stamped with the current local time.
    pub fn record(&self, worker: &str, request: &RequestInfo, status: StatusCode, bytes: usize) {
        let record = AccessRecord {
            worker,
            request,
            status,
            bytes,
            timestamp: DateTime::<FixedOffset>::from(Local::now()),
        };
        self.sink.write_line(&record.to_string());
    }
}
