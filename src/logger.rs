//! Transfer logging sinks
//!
//! The engine reports frame lifecycle events through the [`Logger`] trait;
//! handing it [`NoopLogger`] turns every call into a no-op. [`JsonlLogger`]
//! appends one JSON record per event to a log file.

use anyhow::Result;
use chrono::Utc;
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

pub trait Logger: Send + Sync {
    fn frame_start(&self, _direction: &str, _kind: &str, _name: &str) {}
    fn frame_done(&self, _kind: &str, _name: &str, _files: u64, _bytes: u64, _seconds: f64) {}
    fn error(&self, _context: &str, _error_name: &str, _msg: &str) {}
}

pub struct NoopLogger;
impl Logger for NoopLogger {}

#[derive(Serialize)]
struct LogRecord<'a> {
    timestamp: String,
    event: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    direction: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    kind: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    files: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    seconds: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<&'a str>,
}

impl<'a> LogRecord<'a> {
    fn new(event: &'a str) -> Self {
        LogRecord {
            timestamp: Utc::now().to_rfc3339(),
            event,
            direction: None,
            kind: None,
            name: None,
            files: None,
            bytes: None,
            seconds: None,
            error: None,
            message: None,
        }
    }
}

/// Append-only JSONL sink. Log failures are swallowed: losing a log line
/// must never fail a transfer.
pub struct JsonlLogger {
    file: Mutex<File>,
}

impl JsonlLogger {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let f = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(f),
        })
    }

    fn write(&self, record: &LogRecord) {
        if let Ok(line) = serde_json::to_string(record) {
            if let Ok(mut f) = self.file.lock() {
                let _ = writeln!(f, "{}", line);
            }
        }
    }
}

impl Logger for JsonlLogger {
    fn frame_start(&self, direction: &str, kind: &str, name: &str) {
        let mut rec = LogRecord::new("START");
        rec.direction = Some(direction);
        rec.kind = Some(kind);
        rec.name = Some(name);
        self.write(&rec);
    }

    fn frame_done(&self, kind: &str, name: &str, files: u64, bytes: u64, seconds: f64) {
        let mut rec = LogRecord::new("DONE");
        rec.kind = Some(kind);
        rec.name = Some(name);
        rec.files = Some(files);
        rec.bytes = Some(bytes);
        rec.seconds = Some(seconds);
        self.write(&rec);
    }

    fn error(&self, context: &str, error_name: &str, msg: &str) {
        let mut rec = LogRecord::new("ERROR");
        rec.name = Some(context);
        rec.error = Some(error_name);
        rec.message = Some(msg);
        self.write(&rec);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jsonl_logger_appends_records() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("logs/transfer.jsonl");

        let logger = JsonlLogger::new(&path).unwrap();
        logger.frame_start("recv", "file", "hello.txt");
        logger.frame_done("file", "hello.txt", 1, 10, 0.5);
        logger.error("hello.txt", "PeerClosed", "connection closed by peer");

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].contains("\"event\":\"START\""));
        assert!(lines[1].contains("\"bytes\":10"));
        assert!(lines[2].contains("\"error\":\"PeerClosed\""));

        // Each line parses back as JSON
        for line in lines {
            serde_json::from_str::<serde_json::Value>(line).unwrap();
        }
    }
}
