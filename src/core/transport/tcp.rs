//! TCP transport implementation
//!
//! Useful when the board sits behind a ser2net or socat bridge.

use super::{Link, TransportError, TransportStats, TransportType};
use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

/// TCP connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TcpConfig {
    /// Host address
    pub host: String,
    /// Port number
    pub port: u16,
    /// Connection timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    10
}

impl TcpConfig {
    /// Create a new TCP configuration
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            host: host.to_string(),
            port,
            timeout_secs: default_timeout_secs(),
        }
    }

    /// Parse a `host:port` pair
    pub fn parse(addr: &str) -> Result<Self, TransportError> {
        let (host, port) = addr
            .rsplit_once(':')
            .ok_or_else(|| TransportError::InvalidConfiguration(format!("expected host:port, got {addr}")))?;
        let port = port
            .parse()
            .map_err(|_| TransportError::InvalidConfiguration(format!("invalid TCP port in {addr}")))?;
        Ok(Self::new(host, port))
    }
}

/// TCP transport
pub struct TcpTransport {
    config: TcpConfig,
    stream: TcpStream,
    stats: TransportStats,
    connected_at: Instant,
}

impl TcpTransport {
    /// Connect to the configured endpoint
    pub async fn connect(config: TcpConfig) -> Result<Self, TransportError> {
        let addr = format!("{}:{}", config.host, config.port);

        let stream = tokio::time::timeout(
            Duration::from_secs(config.timeout_secs),
            TcpStream::connect(&addr),
        )
        .await
        .map_err(|_| TransportError::Timeout(config.timeout_secs))?
        .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;

        // Set TCP_NODELAY so each source line leaves immediately
        stream.set_nodelay(true)?;

        Ok(Self {
            config,
            stream,
            stats: TransportStats::default(),
            connected_at: Instant::now(),
        })
    }
}

#[async_trait]
impl Link for TcpTransport {
    async fn send(&mut self, data: &[u8]) -> Result<usize, TransportError> {
        self.stream.write_all(data).await?;
        self.stream.flush().await?;

        self.stats.bytes_sent += data.len() as u64;
        self.stats.packets_sent += 1;

        Ok(data.len())
    }

    async fn receive(&mut self) -> Result<Bytes, TransportError> {
        let mut buffer = vec![0u8; 4096];

        // Use try_read for non-blocking read
        match self.stream.try_read(&mut buffer) {
            Ok(0) => Err(TransportError::Disconnected),
            Ok(n) => {
                buffer.truncate(n);
                self.stats.bytes_received += n as u64;
                self.stats.packets_received += 1;
                Ok(Bytes::from(buffer))
            }
            Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(Bytes::new()),
            Err(e) => Err(TransportError::IoError(e)),
        }
    }

    fn transport_type(&self) -> TransportType {
        TransportType::Tcp
    }

    fn connection_info(&self) -> String {
        format!("{}:{}", self.config.host, self.config.port)
    }

    fn stats(&self) -> TransportStats {
        let mut stats = self.stats.clone();
        stats.uptime_secs = self.connected_at.elapsed().as_secs();
        stats
    }
}
