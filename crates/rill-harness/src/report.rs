#![forbid(unsafe_code)]

//! JSONL flush reports.
//!
//! Each evaluated expectation becomes one line. Lines are stable for the
//! same test, so reports from two runs can be diffed in CI.
//!
//! ```text
//! {"event":"observable","index":0,"passed":true,"actual":[{"frame":2,"kind":"next","value":"\"a\""}],"expected":[...]}
//! {"event":"subscriptions","index":1,"passed":false,"actual":[{"subscribed":0,"unsubscribed":4}],"expected":[...]}
//! ```

use std::fmt;
use std::fs::OpenOptions;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use rill_core::Notification;
use serde_json::{Value, json};

use crate::marble::TestMessage;
use crate::subscription_log::SubscriptionLog;

/// Lines describing one `flush`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlushReport {
    lines: Vec<Value>,
}

fn message_json<T: fmt::Debug, E: fmt::Debug>(message: &TestMessage<T, E>) -> Value {
    match &message.notification {
        Notification::Next(value) => json!({
            "frame": message.frame,
            "kind": "next",
            "value": format!("{value:?}"),
        }),
        Notification::Error(err) => json!({
            "frame": message.frame,
            "kind": "error",
            "value": format!("{err:?}"),
        }),
        Notification::Complete => json!({
            "frame": message.frame,
            "kind": "complete",
        }),
    }
}

fn log_json(log: &SubscriptionLog) -> Value {
    json!({
        "subscribed": log.subscribed_frame,
        "unsubscribed": log.unsubscribed_frame,
    })
}

impl FlushReport {
    /// Empty report.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a notification comparison.
    pub fn record_observable<T: fmt::Debug, E: fmt::Debug>(
        &mut self,
        actual: &[TestMessage<T, E>],
        expected: &[TestMessage<T, E>],
        passed: bool,
    ) {
        let index = self.lines.len();
        self.lines.push(json!({
            "event": "observable",
            "index": index,
            "passed": passed,
            "actual": actual.iter().map(message_json).collect::<Vec<_>>(),
            "expected": expected.iter().map(message_json).collect::<Vec<_>>(),
        }));
    }

    /// Record a subscription comparison.
    pub fn record_subscriptions(
        &mut self,
        actual: &[SubscriptionLog],
        expected: &[SubscriptionLog],
        passed: bool,
    ) {
        let index = self.lines.len();
        self.lines.push(json!({
            "event": "subscriptions",
            "index": index,
            "passed": passed,
            "actual": actual.iter().map(log_json).collect::<Vec<_>>(),
            "expected": expected.iter().map(log_json).collect::<Vec<_>>(),
        }));
    }

    /// Record the end of the flush.
    pub fn record_summary(&mut self, frame: i64, failures: usize) {
        let checked = self.lines.len();
        self.lines.push(json!({
            "event": "flush",
            "frame": frame,
            "checked": checked,
            "failures": failures,
        }));
    }

    /// Parsed lines.
    #[must_use]
    pub fn lines(&self) -> &[Value] {
        &self.lines
    }

    /// Whether nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Render as JSONL, one object per line.
    #[must_use]
    pub fn to_jsonl(&self) -> String {
        let mut out = String::new();
        for line in &self.lines {
            out.push_str(&line.to_string());
            out.push('\n');
        }
        out
    }

    /// Write JSONL to `writer`.
    pub fn write_jsonl(&self, writer: &mut impl Write) -> io::Result<()> {
        for line in &self.lines {
            serde_json::to_writer(&mut *writer, line)?;
            writer.write_all(b"\n")?;
        }
        writer.flush()
    }

    /// Append JSONL to the file at `path`, creating it if needed.
    pub fn append_to(&self, path: &Path) -> io::Result<()> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        self.write_jsonl(&mut BufWriter::new(file))
    }
}
