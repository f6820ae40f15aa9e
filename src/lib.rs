//! # picoc-harness
//!
//! Runs a C test suite on an interpreter embedded in a microcontroller,
//! over a serial line (or a TCP bridge to one).
//!
//! For every test the harness resets the interpreter with `exit();`, types
//! the program in line by line, runs it with `main();` and reads its output
//! until a sentinel line printed right after the program returns.
//!
//! ## Features
//!
//! - Connection retry until the board shows up, with a settle delay
//! - Live output capture, in source order, while the program is uploaded
//! - Bounded wait for completion, with hung tests reported
//! - Suite reports as text or JSON
//! - Wire transcript logging with timestamps
//! - A virtual target for running without hardware
//!
//! ## Example
//!
//! ```rust,no_run
//! use picoc_harness::{Connector, DirectoryCorpus, HarnessConfig, SessionRunner, Transport};
//! use picoc_harness::core::report::RunEvent;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> anyhow::Result<()> {
//!     let config = HarnessConfig::default();
//!     let mut events: Vec<RunEvent> = Vec::new();
//!
//!     let link = Connector::new(config.connector_config())
//!         .connect(&config.link, &mut events)
//!         .await?;
//!     let mut runner = SessionRunner::new(link, config.collector(), config.session_config());
//!
//!     let corpus = DirectoryCorpus::new("tests");
//!     let report = runner.run_suite(&corpus, None, &mut events).await?;
//!     println!("{}", report.summary());
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod cli;
pub mod config;
pub mod core;

// Re-exports for convenience
pub use crate::cli::{CliResult, ExitCodes};
pub use crate::config::{ConfigError, HarnessConfig};
pub use crate::core::collector::{Completion, LineCollector, DEFAULT_SENTINEL};
pub use crate::core::connector::{ConnectError, Connector, ConnectorConfig};
pub use crate::core::corpus::{CorpusError, CorpusProvider, DirectoryCorpus, TestUnit};
pub use crate::core::logger::{LogFormat, LoggedLink, TranscriptLogger};
pub use crate::core::report::{RunEvent, RunObserver, SuiteReport, TestReport, TestStatus};
pub use crate::core::session::{SessionConfig, SessionError, SessionRunner, SessionState};
pub use crate::core::simulator::{TargetHandle, VirtualTarget};
pub use crate::core::transport::{
    Link, LinkOpener, SerialConfig, TcpConfig, Transport, TransportError, TransportType,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
