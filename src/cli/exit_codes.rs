//! CLI Exit Codes
//!
//! Exit codes for scripted and CI runs.

use crate::config::ConfigError;
use crate::core::connector::ConnectError;
use crate::core::corpus::CorpusError;
use crate::core::report::SuiteReport;
use crate::core::session::SessionError;
use crate::core::transport::TransportError;
use std::process::ExitCode;

/// Exit code constants
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitCodes;

impl ExitCodes {
    /// Success
    pub const SUCCESS: u8 = 0;

    /// General error
    pub const ERROR: u8 = 1;

    /// Invalid arguments
    pub const INVALID_ARGS: u8 = 2;

    /// Connection failed
    pub const CONNECTION_FAILED: u8 = 3;

    /// A test hung waiting for the sentinel
    pub const TIMEOUT: u8 = 4;

    /// Test file not found
    pub const FILE_NOT_FOUND: u8 = 6;

    /// Configuration error
    pub const CONFIG_ERROR: u8 = 8;

    /// Link failed during the run
    pub const PROTOCOL_ERROR: u8 = 9;
}

/// CLI operation result
#[derive(Debug)]
pub enum CliResult {
    /// Success with optional message
    Success(Option<String>),

    /// Error with code and message
    Error(u8, String),
}

impl CliResult {
    /// Plain success
    pub fn success() -> Self {
        Self::Success(None)
    }

    /// Success with a closing message
    pub fn success_with_message(msg: impl Into<String>) -> Self {
        Self::Success(Some(msg.into()))
    }

    /// Failure with an explicit code
    pub fn error(code: u8, msg: impl Into<String>) -> Self {
        Self::Error(code, msg.into())
    }

    /// Outcome of a finished suite run
    pub fn from_report(report: &SuiteReport) -> Self {
        if report.is_success() {
            Self::success_with_message(report.summary())
        } else {
            Self::Error(ExitCodes::TIMEOUT, report.summary())
        }
    }

    /// Get exit code
    pub fn code(&self) -> u8 {
        match self {
            Self::Success(_) => ExitCodes::SUCCESS,
            Self::Error(code, _) => *code,
        }
    }

    /// Get message
    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Success(Some(msg)) | Self::Error(_, msg) => Some(msg),
            Self::Success(None) => None,
        }
    }

    /// Convert to ExitCode
    pub fn to_exit_code(&self) -> ExitCode {
        ExitCode::from(self.code())
    }

    /// Is success?
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

impl From<ConnectError> for CliResult {
    fn from(err: ConnectError) -> Self {
        let code = match &err {
            ConnectError::Fatal {
                source: TransportError::InvalidConfiguration(_),
                ..
            } => ExitCodes::CONFIG_ERROR,
            _ => ExitCodes::CONNECTION_FAILED,
        };
        Self::Error(code, err.to_string())
    }
}

impl From<SessionError> for CliResult {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::Corpus(e) => e.into(),
            SessionError::Transport(e) => Self::Error(ExitCodes::PROTOCOL_ERROR, e.to_string()),
        }
    }
}

impl From<CorpusError> for CliResult {
    fn from(err: CorpusError) -> Self {
        let code = match err {
            CorpusError::NotFound { .. } => ExitCodes::FILE_NOT_FOUND,
            CorpusError::Unreadable { .. } | CorpusError::ListUnreadable { .. } => ExitCodes::ERROR,
        };
        Self::Error(code, err.to_string())
    }
}

impl From<std::io::Error> for CliResult {
    fn from(err: std::io::Error) -> Self {
        use std::io::ErrorKind;

        let code = match err.kind() {
            ErrorKind::NotFound => ExitCodes::FILE_NOT_FOUND,
            ErrorKind::ConnectionRefused => ExitCodes::CONNECTION_FAILED,
            ErrorKind::TimedOut => ExitCodes::TIMEOUT,
            _ => ExitCodes::ERROR,
        };

        Self::Error(code, err.to_string())
    }
}

impl From<ConfigError> for CliResult {
    fn from(err: ConfigError) -> Self {
        Self::Error(ExitCodes::CONFIG_ERROR, err.to_string())
    }
}

/// Exit code description
pub fn exit_code_description(code: u8) -> &'static str {
    match code {
        0 => "Success",
        1 => "General error",
        2 => "Invalid arguments",
        3 => "Connection failed",
        4 => "Test hung",
        6 => "Test file not found",
        8 => "Configuration error",
        9 => "Link error during run",
        _ => "Unknown error",
    }
}
