//! Connector: opens the link, however long it takes
//!
//! The harness is usually started before the board is plugged in, so a port
//! that does not exist yet (or is still held by the bootloader) is retried
//! with a fixed backoff. Once the port opens, the connector waits a settle
//! delay because opening a USB serial port resets most Arduino boards.

use super::report::{RunEvent, RunObserver};
use super::transport::{Link, LinkOpener, TransportError};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Connector timing
#[derive(Debug, Clone)]
pub struct ConnectorConfig {
    /// Delay between open attempts
    pub backoff: Duration,
    /// Delay after a successful open
    pub settle: Duration,
    /// Maximum open attempts (0 = unlimited)
    pub max_attempts: u32,
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            backoff: Duration::from_secs(1),
            settle: Duration::from_secs(2),
            max_attempts: 0,
        }
    }
}

/// Connector error types
#[derive(Error, Debug)]
pub enum ConnectError {
    /// The open failed in a way retrying cannot fix
    #[error("Cannot open {target}: {source}")]
    Fatal {
        /// Port or address
        target: String,
        /// Underlying failure
        #[source]
        source: TransportError,
    },

    /// `max_attempts` was reached
    #[error("Giving up on {target} after {attempts} attempts: {source}")]
    GaveUp {
        /// Port or address
        target: String,
        /// Attempts made
        attempts: u32,
        /// Last failure
        #[source]
        source: TransportError,
    },
}

/// Opens links with retry and settle delay
#[derive(Debug, Clone, Default)]
pub struct Connector {
    config: ConnectorConfig,
}

impl Connector {
    /// Create a connector
    pub fn new(config: ConnectorConfig) -> Self {
        Self { config }
    }

    /// Get configuration
    pub fn config(&self) -> &ConnectorConfig {
        &self.config
    }

    /// Open a link, retrying transient failures.
    ///
    /// Emits [`RunEvent::Waiting`] on the first failed attempt and
    /// [`RunEvent::Connected`] once the settle delay has passed.
    pub async fn connect(
        &self,
        opener: &dyn LinkOpener,
        observer: &mut dyn RunObserver,
    ) -> Result<Box<dyn Link>, ConnectError> {
        let target = opener.target();
        let mut attempts: u32 = 0;

        let link = loop {
            attempts += 1;
            match opener.open().await {
                Ok(link) => break link,
                Err(e) if !e.is_transient() => {
                    warn!("Cannot open {}: {}", target, e);
                    return Err(ConnectError::Fatal { target, source: e });
                }
                Err(e) => {
                    if attempts == 1 {
                        info!("Waiting until {} can be opened", target);
                        observer.on_event(RunEvent::Waiting {
                            target: target.clone(),
                        });
                    }
                    debug!(attempt = attempts, "Open failed: {}", e);

                    if self.config.max_attempts > 0 && attempts >= self.config.max_attempts {
                        warn!("Giving up on {} after {} attempts", target, attempts);
                        return Err(ConnectError::GaveUp {
                            target,
                            attempts,
                            source: e,
                        });
                    }
                    tokio::time::sleep(self.config.backoff).await;
                }
            }
        };

        debug!(settle = ?self.config.settle, "Port open, settling");
        tokio::time::sleep(self.config.settle).await;

        let info = link.connection_info();
        info!(attempts, "Connected to {}", info);
        observer.on_event(RunEvent::Connected { info });

        Ok(link)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::simulator::VirtualTarget;
    use crate::core::transport::MockLinkOpener;
    use tokio::time::Instant;

    fn opener_failing(times: u32) -> MockLinkOpener {
        let mut opener = MockLinkOpener::new();
        opener
            .expect_target()
            .return_const("/dev/ttyACM0".to_string());
        let mut calls = 0;
        opener
            .expect_open()
            .times(times as usize + 1)
            .returning(move || {
                calls += 1;
                if calls <= times {
                    Err(TransportError::PortNotFound("/dev/ttyACM0".to_string()))
                } else {
                    Ok(Box::new(VirtualTarget::new()) as Box<dyn Link>)
                }
            });
        opener
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_converges() {
        let connector = Connector::default();
        let opener = opener_failing(3);
        let mut events: Vec<RunEvent> = Vec::new();

        let start = Instant::now();
        let link = connector.connect(&opener, &mut events).await.unwrap();
        let elapsed = start.elapsed();

        // three backoffs plus one settle
        assert!(elapsed >= Duration::from_secs(5), "elapsed {elapsed:?}");
        assert!(elapsed < Duration::from_millis(5100), "elapsed {elapsed:?}");
        assert_eq!(link.connection_info(), "virtual target");
        assert_eq!(
            events,
            vec![
                RunEvent::Waiting {
                    target: "/dev/ttyACM0".to_string()
                },
                RunEvent::Connected {
                    info: "virtual target".to_string()
                },
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_immediate_success_only_settles() {
        let connector = Connector::default();
        let opener = opener_failing(0);
        let mut events: Vec<RunEvent> = Vec::new();

        let start = Instant::now();
        connector.connect(&opener, &mut events).await.unwrap();

        assert!(start.elapsed() >= Duration::from_secs(2));
        assert!(start.elapsed() < Duration::from_millis(2100));
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], RunEvent::Connected { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_configuration_is_not_retried() {
        let mut opener = MockLinkOpener::new();
        opener.expect_target().return_const("COM0".to_string());
        opener
            .expect_open()
            .times(1)
            .returning(|| Err(TransportError::InvalidConfiguration("baud".to_string())));

        let result = Connector::default()
            .connect(&opener, &mut Vec::<RunEvent>::new())
            .await;
        assert!(matches!(result, Err(ConnectError::Fatal { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_max_attempts_gives_up() {
        let connector = Connector::new(ConnectorConfig {
            max_attempts: 2,
            ..ConnectorConfig::default()
        });
        let mut opener = MockLinkOpener::new();
        opener.expect_target().return_const("/dev/ttyUSB9".to_string());
        opener
            .expect_open()
            .times(2)
            .returning(|| Err(TransportError::PortInUse("/dev/ttyUSB9".to_string())));

        match connector.connect(&opener, &mut Vec::<RunEvent>::new()).await {
            Err(ConnectError::GaveUp { attempts, .. }) => assert_eq!(attempts, 2),
            other => panic!("unexpected result: {:?}", other.map(|_| ())),
        }
    }
}
