//! Run events and suite reports
//!
//! Everything the harness wants an operator to see goes through a
//! [`RunObserver`]: progress notices from the connector and the session
//! runner, and every line of target output the line collector flushes.

use serde::Serialize;
use std::time::Duration;

/// Something that happened during a harness run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RunEvent {
    /// The link could not be opened yet; retrying
    Waiting {
        /// Port or address being opened
        target: String,
    },
    /// The link is open and settled
    Connected {
        /// Connection description
        info: String,
    },
    /// A test is about to be uploaded
    TestStarted {
        /// Test file name
        name: String,
    },
    /// One line of target output
    Output {
        /// Line text without its terminator
        line: String,
    },
    /// A test reached a terminal state
    TestFinished {
        /// Test file name
        name: String,
        /// Terminal state
        status: TestStatus,
    },
}

/// Receives run events as they happen
pub trait RunObserver {
    /// Handle one event
    fn on_event(&mut self, event: RunEvent);
}

impl RunObserver for Vec<RunEvent> {
    fn on_event(&mut self, event: RunEvent) {
        self.push(event);
    }
}

/// Discards every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NullObserver;

impl RunObserver for NullObserver {
    fn on_event(&mut self, _event: RunEvent) {}
}

/// Terminal state of one test
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TestStatus {
    /// The sentinel line was observed
    Completed,
    /// The completion timeout expired before the sentinel arrived
    Hung,
}

/// Outcome of one test
#[derive(Debug, Clone, Serialize)]
pub struct TestReport {
    /// Test file name
    pub name: String,
    /// Terminal state
    pub status: TestStatus,
    /// Lines of target output captured for this test
    pub output_lines: usize,
    /// Wall time from reset to completion
    #[serde(rename = "elapsed_ms", serialize_with = "serialize_millis")]
    pub elapsed: Duration,
}

fn serialize_millis<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}

/// Outcome of a whole run
#[derive(Debug, Clone, Default, Serialize)]
pub struct SuiteReport {
    /// Per-test outcomes, in execution order
    pub tests: Vec<TestReport>,
    /// Tests listed but not run because the run stopped early
    pub skipped: Vec<String>,
}

impl SuiteReport {
    /// Number of tests that completed
    pub fn completed(&self) -> usize {
        self.tests
            .iter()
            .filter(|t| t.status == TestStatus::Completed)
            .count()
    }

    /// Names of tests that hung
    pub fn hung(&self) -> Vec<&str> {
        self.tests
            .iter()
            .filter(|t| t.status == TestStatus::Hung)
            .map(|t| t.name.as_str())
            .collect()
    }

    /// True when every listed test ran and completed
    pub fn is_success(&self) -> bool {
        self.skipped.is_empty() && self.hung().is_empty()
    }

    /// One line summary
    pub fn summary(&self) -> String {
        let hung = self.hung();
        let mut summary = format!("{} of {} tests completed", self.completed(), self.tests.len());
        if !hung.is_empty() {
            summary.push_str(&format!(", hung: {}", hung.join(", ")));
        }
        if !self.skipped.is_empty() {
            summary.push_str(&format!(", {} not run", self.skipped.len()));
        }
        summary
    }
}
