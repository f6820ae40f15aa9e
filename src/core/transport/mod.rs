//! Transport layer for reaching the target interpreter
//!
//! Supports:
//! - Serial ports (USB-Serial adapters, pseudo terminals)
//! - Raw TCP connections (ser2net / socat bridges)
//!
//! A [`LinkOpener`] describes how to reach the target and is retried by the
//! connector; a successful open yields a boxed [`Link`] that the session
//! runner owns for the rest of the run.

mod serial;
mod tcp;

pub use serial::{list_ports, SerialConfig, SerialTransport};
pub use tcp::{TcpConfig, TcpTransport};

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Transport configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Transport {
    /// Serial port connection
    Serial(SerialConfig),
    /// Raw TCP connection
    Tcp(TcpConfig),
}

impl Default for Transport {
    fn default() -> Self {
        Self::Serial(SerialConfig::default())
    }
}

/// Transport type identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransportType {
    /// Serial port
    Serial,
    /// Raw TCP
    Tcp,
    /// In-process simulated target
    Virtual,
}

impl fmt::Display for TransportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Serial => write!(f, "Serial"),
            Self::Tcp => write!(f, "TCP"),
            Self::Virtual => write!(f, "Virtual"),
        }
    }
}

/// Transport error types
#[derive(Error, Debug)]
pub enum TransportError {
    /// Connection failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Connection timeout
    #[error("Connection timeout after {0} seconds")]
    Timeout(u64),

    /// Port not found
    #[error("Port not found: {0}")]
    PortNotFound(String),

    /// Permission denied
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Port already in use
    #[error("Port already in use: {0}")]
    PortInUse(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Disconnected
    #[error("Disconnected")]
    Disconnected,
}

impl TransportError {
    /// Whether an open attempt failing with this error is worth retrying.
    ///
    /// A device that is not plugged in yet, still enumerating, or held by
    /// another process shows up as one of these. Bad settings never fix
    /// themselves.
    pub fn is_transient(&self) -> bool {
        !matches!(self, Self::InvalidConfiguration(_))
    }
}

/// Transport statistics
#[derive(Debug, Clone, Default, Serialize)]
pub struct TransportStats {
    /// Bytes sent
    pub bytes_sent: u64,
    /// Bytes received
    pub bytes_received: u64,
    /// Write calls
    pub packets_sent: u64,
    /// Non-empty reads
    pub packets_received: u64,
    /// Connection uptime in seconds
    pub uptime_secs: u64,
}

/// An open, bidirectional byte channel to the target
#[async_trait]
pub trait Link: Send {
    /// Write all of `data` and flush it
    async fn send(&mut self, data: &[u8]) -> Result<usize, TransportError>;

    /// Read whatever is available right now (or within the read timeout).
    ///
    /// An empty buffer means nothing arrived; it is not end of stream.
    async fn receive(&mut self) -> Result<Bytes, TransportError>;

    /// Get transport type
    fn transport_type(&self) -> TransportType;

    /// Get connection info string
    fn connection_info(&self) -> String;

    /// Get statistics
    fn stats(&self) -> TransportStats;
}

#[async_trait]
impl<L: Link + ?Sized> Link for Box<L> {
    async fn send(&mut self, data: &[u8]) -> Result<usize, TransportError> {
        (**self).send(data).await
    }

    async fn receive(&mut self) -> Result<Bytes, TransportError> {
        (**self).receive().await
    }

    fn transport_type(&self) -> TransportType {
        (**self).transport_type()
    }

    fn connection_info(&self) -> String {
        (**self).connection_info()
    }

    fn stats(&self) -> TransportStats {
        (**self).stats()
    }
}

/// Something that can (try to) open a [`Link`]
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LinkOpener: Send + Sync {
    /// Make one attempt at opening the link
    async fn open(&self) -> Result<Box<dyn Link>, TransportError>;

    /// Human readable name of what is being opened
    fn target(&self) -> String;
}

#[async_trait]
impl LinkOpener for Transport {
    async fn open(&self) -> Result<Box<dyn Link>, TransportError> {
        match self {
            Self::Serial(cfg) => {
                let transport = SerialTransport::open(cfg.clone())?;
                Ok(Box::new(transport))
            }
            Self::Tcp(cfg) => {
                let transport = TcpTransport::connect(cfg.clone()).await?;
                Ok(Box::new(transport))
            }
        }
    }

    fn target(&self) -> String {
        match self {
            Self::Serial(cfg) => cfg.port.clone(),
            Self::Tcp(cfg) => format!("{}:{}", cfg.host, cfg.port),
        }
    }
}
