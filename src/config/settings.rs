//! Harness settings
//!
//! Everything the harness needs to know to reach the target and run the
//! suite, loadable from a TOML file:
//!
//! ```toml
//! [link]
//! kind = "serial"
//! port = "/dev/ttyACM0"
//! baud_rate = 115200
//!
//! [timing]
//! reset_settle_ms = 3000
//! completion_timeout_secs = 120
//!
//! [suite]
//! corpus_dir = "tests"
//! ```

use crate::core::collector::{LineCollector, DEFAULT_POLL_INTERVAL, DEFAULT_SENTINEL};
use crate::core::connector::ConnectorConfig;
use crate::core::corpus::DirectoryCorpus;
use crate::core::session::SessionConfig;
use crate::core::transport::Transport;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The config file cannot be read
    #[error("Cannot read config {}: {source}", .path.display())]
    Read {
        /// Config file path
        path: PathBuf,
        /// Underlying failure
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid TOML for [`HarnessConfig`]
    #[error("Invalid config {}: {source}", .path.display())]
    Parse {
        /// Config file path
        path: PathBuf,
        /// Parser message
        #[source]
        source: toml::de::Error,
    },

    /// A value is out of range
    #[error("Invalid setting {field}: {reason}")]
    Invalid {
        /// Offending setting
        field: &'static str,
        /// What is wrong with it
        reason: String,
    },
}

/// Harness configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// How to reach the target
    pub link: Transport,
    /// Delays and timeouts
    pub timing: TimingConfig,
    /// What to run
    pub suite: SuiteConfig,
}

/// Delays and timeouts
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Delay between open attempts (ms)
    pub connect_backoff_ms: u64,
    /// Delay after the port opens (ms)
    pub connect_settle_ms: u64,
    /// Maximum open attempts (0 = unlimited)
    pub max_connect_attempts: u32,
    /// Delay after the reset command (ms)
    pub reset_settle_ms: u64,
    /// Delay after the run command (ms)
    pub invoke_settle_ms: u64,
    /// Idle delay between reads while waiting for the sentinel (ms)
    pub poll_interval_ms: u64,
    /// Longest wait for the sentinel (s, 0 = forever)
    pub completion_timeout_secs: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            connect_backoff_ms: 1000,
            connect_settle_ms: 2000,
            max_connect_attempts: 0,
            reset_settle_ms: 3000,
            invoke_settle_ms: 3000,
            poll_interval_ms: DEFAULT_POLL_INTERVAL.as_millis() as u64,
            completion_timeout_secs: 120,
        }
    }
}

/// Suite selection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SuiteConfig {
    /// Directory holding the test files
    pub corpus_dir: PathBuf,
    /// End-of-output marker printed by the target
    pub sentinel: String,
    /// Suite listing, replacing the built-in one
    pub tests: Option<Vec<String>>,
    /// Stop at the first hung test
    pub fail_fast: bool,
}

impl Default for SuiteConfig {
    fn default() -> Self {
        Self {
            corpus_dir: PathBuf::from("."),
            sentinel: DEFAULT_SENTINEL.to_string(),
            tests: None,
            fail_fast: false,
        }
    }
}

impl HarnessConfig {
    /// Load `config.toml` from the config directory, or defaults
    pub fn load() -> Result<Self, ConfigError> {
        match super::default_config_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Load from a specific file
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Save to a file
    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Check values the link and session cannot work with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Transport::Serial(serial) = &self.link {
            if serial.baud_rate == 0 {
                return Err(ConfigError::Invalid {
                    field: "link.baud_rate",
                    reason: "must be greater than zero".to_string(),
                });
            }
            if serial.port.is_empty() {
                return Err(ConfigError::Invalid {
                    field: "link.port",
                    reason: "must not be empty".to_string(),
                });
            }
        }

        let sentinel = &self.suite.sentinel;
        if sentinel.is_empty() || sentinel.chars().any(char::is_whitespace) {
            return Err(ConfigError::Invalid {
                field: "suite.sentinel",
                reason: format!("{sentinel:?} must be non-empty without whitespace"),
            });
        }
        if sentinel.contains('"') || sentinel.contains('\\') || sentinel.contains('%') {
            return Err(ConfigError::Invalid {
                field: "suite.sentinel",
                reason: format!("{sentinel:?} cannot be printed by a plain printf literal"),
            });
        }

        Ok(())
    }

    /// Connector timing
    pub fn connector_config(&self) -> ConnectorConfig {
        ConnectorConfig {
            backoff: Duration::from_millis(self.timing.connect_backoff_ms),
            settle: Duration::from_millis(self.timing.connect_settle_ms),
            max_attempts: self.timing.max_connect_attempts,
        }
    }

    /// Session timing and policy
    pub fn session_config(&self) -> SessionConfig {
        let timeout = self.timing.completion_timeout_secs;
        SessionConfig {
            reset_settle: Duration::from_millis(self.timing.reset_settle_ms),
            invoke_settle: Duration::from_millis(self.timing.invoke_settle_ms),
            completion_timeout: (timeout > 0).then(|| Duration::from_secs(timeout)),
            fail_fast: self.suite.fail_fast,
        }
    }

    /// A fresh line collector for one session
    pub fn collector(&self) -> LineCollector {
        LineCollector::new(self.suite.sentinel.clone())
            .poll_interval(Duration::from_millis(self.timing.poll_interval_ms))
    }

    /// The test corpus, with the configured listing if there is one
    pub fn corpus(&self) -> DirectoryCorpus {
        let corpus = DirectoryCorpus::new(&self.suite.corpus_dir);
        match &self.suite.tests {
            Some(tests) => corpus.with_tests(tests.clone()),
            None => corpus,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::corpus::CorpusProvider;
    use crate::core::transport::{LinkOpener, SerialConfig};

    #[test]
    fn test_defaults() {
        let config = HarnessConfig::default();
        assert_eq!(config.link.target(), "/dev/ttyACM0");

        let session = config.session_config();
        assert_eq!(session.reset_settle, Duration::from_secs(3));
        assert_eq!(session.invoke_settle, Duration::from_secs(3));
        assert_eq!(session.completion_timeout, Some(Duration::from_secs(120)));

        let connector = config.connector_config();
        assert_eq!(connector.backoff, Duration::from_secs(1));
        assert_eq!(connector.settle, Duration::from_secs(2));

        assert_eq!(config.collector().sentinel(), "DONE!!11!1!");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[link]
kind = "tcp"
host = "192.168.1.20"
port = 2000

[timing]
completion_timeout_secs = 0

[suite]
corpus_dir = "/srv/picoc/tests"
tests = ["00_assignment.c", "02_printf.c"]
"#,
        )
        .unwrap();

        let config = HarnessConfig::load_from(&path).unwrap();
        assert_eq!(config.link.target(), "192.168.1.20:2000");
        assert_eq!(config.timing.reset_settle_ms, 3000);
        assert_eq!(config.session_config().completion_timeout, None);
        assert_eq!(config.corpus().suite(), vec!["00_assignment.c", "02_printf.c"]);
        assert_eq!(config.corpus().root(), Path::new("/srv/picoc/tests"));
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = HarnessConfig::default();
        config.link = Transport::Serial(SerialConfig::new("/dev/ttyUSB1", 9600));
        config.suite.fail_fast = true;
        config.save_to(&path).unwrap();

        let loaded = HarnessConfig::load_from(&path).unwrap();
        assert_eq!(loaded.link.target(), "/dev/ttyUSB1");
        assert!(loaded.session_config().fail_fast);
    }

    #[test]
    fn test_parse_error_names_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        std::fs::write(&path, "[timing\nreset_settle_ms = 1").unwrap();

        let err = HarnessConfig::load_from(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("broken.toml"));
    }

    #[test]
    fn test_validation() {
        let mut config = HarnessConfig::default();
        config.link = Transport::Serial(SerialConfig::new("/dev/ttyACM0", 0));
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { field: "link.baud_rate", .. })
        ));

        for sentinel in ["", "DONE 1", "END\n", "say\"hi"] {
            let mut config = HarnessConfig::default();
            config.suite.sentinel = sentinel.to_string();
            assert!(config.validate().is_err(), "accepted {sentinel:?}");
        }
    }
}
