//! Session runner
//!
//! Drives one test at a time through the target:
//!
//! 1. reset: `exit();`, then wait for the prompt to come back
//! 2. upload: each source line, followed by a single drain-once read
//! 3. invoke: `main();` and a `printf` of the sentinel, then wait
//! 4. await completion: drain until the sentinel line (or the timeout)
//!
//! The runner owns the link and the line collector for the whole run.

use super::collector::{Completion, LineCollector};
use super::corpus::{CorpusError, CorpusProvider, TestUnit};
use super::report::{RunEvent, RunObserver, SuiteReport, TestReport, TestStatus};
use super::transport::{Link, TransportError};
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Stops whatever program the interpreter is running
pub const RESET_COMMAND: &str = "exit();\n";

/// Runs the uploaded program
pub const RUN_COMMAND: &str = "main();\n";

/// Command that makes the target print `sentinel` on a line of its own
pub fn sentinel_command(sentinel: &str) -> String {
    format!("printf(\"\\n{sentinel}\\n\");\n")
}

/// Session timing and policy
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Wait after the reset command
    pub reset_settle: Duration,
    /// Wait after the run and sentinel commands
    pub invoke_settle: Duration,
    /// Longest wait for the sentinel (`None` = forever)
    pub completion_timeout: Option<Duration>,
    /// Stop the suite at the first hung test
    pub fail_fast: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            reset_settle: Duration::from_secs(3),
            invoke_settle: Duration::from_secs(3),
            completion_timeout: Some(Duration::from_secs(120)),
            fail_fast: false,
        }
    }
}

/// Session error types
#[derive(Error, Debug)]
pub enum SessionError {
    /// Reading from or writing to the link failed
    #[error("Link error: {0}")]
    Transport(#[from] TransportError),

    /// A test file could not be loaded
    #[error(transparent)]
    Corpus(#[from] CorpusError),
}

/// Where the runner is within a test
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Between tests
    Idle,
    /// Reset command sent, settling
    Resetting,
    /// Streaming source lines
    Uploading,
    /// Run and sentinel commands sent, settling
    Invoking,
    /// Waiting for the sentinel
    AwaitingCompletion,
}

/// Runs tests over one link
pub struct SessionRunner {
    link: Box<dyn Link>,
    collector: LineCollector,
    config: SessionConfig,
    state: SessionState,
}

impl SessionRunner {
    /// Create a runner over an open link
    pub fn new(link: Box<dyn Link>, collector: LineCollector, config: SessionConfig) -> Self {
        Self {
            link,
            collector,
            config,
            state: SessionState::Idle,
        }
    }

    /// Get current state
    pub fn state(&self) -> SessionState {
        self.state
    }

    fn enter(&mut self, state: SessionState) {
        debug!(from = ?self.state, to = ?state, "Session state");
        self.state = state;
    }

    /// Run one test to completion (or until it hangs).
    ///
    /// Link errors abort the test and are returned as-is; a missing sentinel
    /// is reported as [`TestStatus::Hung`].
    pub async fn run(
        &mut self,
        unit: &TestUnit,
        observer: &mut dyn RunObserver,
    ) -> Result<TestReport, SessionError> {
        let started = Instant::now();
        let lines_before = self.collector.lines_emitted();

        info!("Running test {}", unit.name);
        observer.on_event(RunEvent::TestStarted {
            name: unit.name.clone(),
        });

        self.enter(SessionState::Resetting);
        self.link.send(RESET_COMMAND.as_bytes()).await?;
        tokio::time::sleep(self.config.reset_settle).await;

        self.enter(SessionState::Uploading);
        for line in &unit.lines {
            self.link.send(line.as_bytes()).await?;
            if !line.ends_with('\n') {
                self.link.send(b"\n").await?;
            }
            self.collector
                .drain_once(&mut *self.link, observer)
                .await?;
        }

        self.enter(SessionState::Invoking);
        self.link.send(RUN_COMMAND.as_bytes()).await?;
        self.link
            .send(sentinel_command(self.collector.sentinel()).as_bytes())
            .await?;
        tokio::time::sleep(self.config.invoke_settle).await;

        self.enter(SessionState::AwaitingCompletion);
        let completion = self
            .collector
            .drain_until_sentinel_within(&mut *self.link, observer, self.config.completion_timeout)
            .await?;

        let status = match completion {
            Completion::Sentinel => TestStatus::Completed,
            Completion::TimedOut => {
                warn!(
                    timeout = ?self.config.completion_timeout,
                    "Test {} hung waiting for the sentinel",
                    unit.name
                );
                TestStatus::Hung
            }
        };
        self.enter(SessionState::Idle);

        let report = TestReport {
            name: unit.name.clone(),
            status,
            output_lines: self.collector.lines_emitted() - lines_before,
            elapsed: started.elapsed(),
        };
        info!(
            output_lines = report.output_lines,
            elapsed = ?report.elapsed,
            "Finished test {}",
            unit.name
        );
        observer.on_event(RunEvent::TestFinished {
            name: unit.name.clone(),
            status,
        });

        Ok(report)
    }

    /// Run `selection`, or every test of the corpus suite in order.
    ///
    /// Each test file is loaded right before it runs, so a missing file stops
    /// the run before anything is written for it.
    pub async fn run_suite(
        &mut self,
        corpus: &dyn CorpusProvider,
        selection: Option<&str>,
        observer: &mut dyn RunObserver,
    ) -> Result<SuiteReport, SessionError> {
        let names = match selection {
            Some(name) => vec![name.to_string()],
            None => corpus.suite(),
        };
        info!(tests = names.len(), "Starting run on {}", self.link.connection_info());

        let mut report = SuiteReport::default();
        for (index, name) in names.iter().enumerate() {
            let unit = corpus.load(name)?;
            let test = self.run(&unit, observer).await?;
            let hung = test.status == TestStatus::Hung;
            report.tests.push(test);

            if hung && self.config.fail_fast {
                report.skipped = names[index + 1..].to_vec();
                warn!(skipped = report.skipped.len(), "Stopping after hung test {}", name);
                break;
            }
        }

        let stats = self.link.stats();
        debug!(
            bytes_sent = stats.bytes_sent,
            bytes_received = stats.bytes_received,
            "Run finished"
        );
        Ok(report)
    }
}
