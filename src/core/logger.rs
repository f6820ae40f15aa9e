//! Wire transcript logging
//!
//! Records every chunk written to and read from the link, with timestamps,
//! so a failing run can be replayed by eye. [`LoggedLink`] wraps any link and
//! feeds a [`TranscriptLogger`].

use super::transport::{Link, TransportError, TransportStats, TransportType};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Log format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Plain text
    #[default]
    Text,
    /// Hex dump
    Hex,
    /// CSV with timestamp
    Csv,
    /// JSON lines
    JsonLines,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" | "txt" => Ok(Self::Text),
            "hex" => Ok(Self::Hex),
            "csv" => Ok(Self::Csv),
            "jsonl" | "json" => Ok(Self::JsonLines),
            other => Err(format!("unknown log format: {other}")),
        }
    }
}

/// Data direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    /// Target to harness
    Received,
    /// Harness to target
    Sent,
    /// Annotation
    Info,
}

impl Direction {
    fn tag(self) -> &'static str {
        match self {
            Direction::Received => "RX",
            Direction::Sent => "TX",
            Direction::Info => "##",
        }
    }
}

/// A single log entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    /// When the chunk passed through the link
    pub timestamp: DateTime<Local>,
    /// Which way it went
    pub direction: Direction,
    /// Raw bytes
    pub data: Vec<u8>,
}

impl LogEntry {
    /// Create new entry
    pub fn new(direction: Direction, data: Vec<u8>) -> Self {
        Self {
            timestamp: Local::now(),
            direction,
            data,
        }
    }

    fn stamp(&self) -> String {
        self.timestamp.format("%Y-%m-%d %H:%M:%S%.3f").to_string()
    }

    /// Format as text, control characters escaped
    pub fn to_text(&self) -> String {
        let text = String::from_utf8_lossy(&self.data).escape_debug().to_string();
        format!("[{}] {} {}", self.stamp(), self.direction.tag(), text)
    }

    /// Format as hex
    pub fn to_hex(&self) -> String {
        let hex: Vec<String> = self.data.iter().map(|b| format!("{b:02X}")).collect();
        format!("[{}] {} {}", self.stamp(), self.direction.tag(), hex.join(" "))
    }

    /// Format as CSV
    pub fn to_csv(&self) -> String {
        let text = String::from_utf8_lossy(&self.data).replace('"', "\"\"");
        format!(
            "\"{}\",\"{}\",\"{}\",\"{}\"",
            self.stamp(),
            self.direction.tag(),
            hex::encode_upper(&self.data),
            text
        )
    }

    /// Format as JSON line
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    fn format(&self, format: LogFormat) -> String {
        match format {
            LogFormat::Text => self.to_text(),
            LogFormat::Hex => self.to_hex(),
            LogFormat::Csv => self.to_csv(),
            LogFormat::JsonLines => self.to_json(),
        }
    }
}

/// Appends log entries to a file
pub struct TranscriptLogger {
    file: BufWriter<File>,
    format: LogFormat,
    path: PathBuf,
}

impl TranscriptLogger {
    /// Start logging to `path`, appending if it exists
    pub fn create(path: &Path, format: LogFormat) -> std::io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let is_new = file.metadata()?.len() == 0;
        let mut file = BufWriter::new(file);

        // appended runs share the header at the top of the file
        if format == LogFormat::Csv && is_new {
            writeln!(file, "Timestamp,Direction,Hex,Text")?;
        }

        Ok(Self {
            file,
            format,
            path: path.to_path_buf(),
        })
    }

    /// Log data
    pub fn log(&mut self, direction: Direction, data: &[u8]) {
        let entry = LogEntry::new(direction, data.to_vec());
        if let Err(e) = writeln!(self.file, "{}", entry.format(self.format)) {
            warn!("Failed to write transcript {}: {}", self.path.display(), e);
        }
    }

    /// Log info message
    pub fn log_info(&mut self, message: &str) {
        self.log(Direction::Info, message.as_bytes());
    }

    /// Flush to disk
    pub fn flush(&mut self) {
        let _ = self.file.flush();
    }
}

impl Drop for TranscriptLogger {
    fn drop(&mut self) {
        self.flush();
    }
}

/// A link that records its traffic
pub struct LoggedLink<L> {
    inner: L,
    logger: TranscriptLogger,
}

impl<L: Link> LoggedLink<L> {
    /// Wrap `inner`, logging to `logger`
    pub fn new(inner: L, mut logger: TranscriptLogger) -> Self {
        logger.log_info(&format!("link opened: {}", inner.connection_info()));
        Self { inner, logger }
    }
}

#[async_trait]
impl<L: Link> Link for LoggedLink<L> {
    async fn send(&mut self, data: &[u8]) -> Result<usize, TransportError> {
        let written = self.inner.send(data).await?;
        self.logger.log(Direction::Sent, data);
        Ok(written)
    }

    async fn receive(&mut self) -> Result<Bytes, TransportError> {
        let data = self.inner.receive().await?;
        if !data.is_empty() {
            self.logger.log(Direction::Received, &data);
            // keep the file current while waiting on a slow target
            self.logger.flush();
        }
        Ok(data)
    }

    fn transport_type(&self) -> TransportType {
        self.inner.transport_type()
    }

    fn connection_info(&self) -> String {
        self.inner.connection_info()
    }

    fn stats(&self) -> TransportStats {
        self.inner.stats()
    }
}
