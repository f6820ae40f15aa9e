//! Line collector
//!
//! Reassembles the target's byte stream into newline terminated lines and
//! decides what an observer gets to see. Bytes are kept in a pending buffer
//! until a newline arrives; the buffer survives across calls so a line split
//! over several reads (or over a drain-once / drain-until-sentinel boundary)
//! is still flushed whole.
//!
//! Two read modes:
//! - [`LineCollector::drain_once`] reads once and flushes what is complete.
//!   It never loops, so the session can interleave writes between reads.
//! - [`LineCollector::drain_until_sentinel`] keeps reading until a line whose
//!   trimmed content equals the sentinel shows up. The sentinel line itself is
//!   swallowed.

use super::report::{RunEvent, RunObserver};
use super::transport::{Link, TransportError};
use std::time::Duration;
use tracing::{debug, trace};

/// Marker the target prints once a test program has finished
pub const DEFAULT_SENTINEL: &str = "DONE!!11!1!";

/// Default pause between empty reads while waiting for the sentinel
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// How a drain-until-sentinel call ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// The sentinel line was consumed
    Sentinel,
    /// The time limit expired first
    TimedOut,
}

/// Accumulates link bytes into lines
#[derive(Debug, Clone)]
pub struct LineCollector {
    pending: Vec<u8>,
    sentinel: String,
    poll_interval: Duration,
    lines_emitted: usize,
}

impl LineCollector {
    /// Create a collector that stops at `sentinel`
    pub fn new(sentinel: impl Into<String>) -> Self {
        Self {
            pending: Vec::with_capacity(256),
            sentinel: sentinel.into(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            lines_emitted: 0,
        }
    }

    /// Set the pause between empty reads
    #[must_use]
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Sentinel this collector waits for
    pub fn sentinel(&self) -> &str {
        &self.sentinel
    }

    /// Bytes received but not yet part of a complete line
    pub fn pending(&self) -> &[u8] {
        &self.pending
    }

    /// Total number of lines handed to observers so far
    pub fn lines_emitted(&self) -> usize {
        self.lines_emitted
    }

    /// Drop any partial line
    pub fn reset(&mut self) {
        if !self.pending.is_empty() {
            debug!(bytes = self.pending.len(), "Discarding partial line");
        }
        self.pending.clear();
    }

    /// Append raw bytes to the pending buffer
    pub fn feed(&mut self, data: &[u8]) {
        self.pending.extend_from_slice(data);
    }

    /// Remove and return the first complete line, terminator included
    pub fn take_line(&mut self) -> Option<Vec<u8>> {
        let end = self.pending.iter().position(|&b| b == b'\n')? + 1;
        let rest = self.pending.split_off(end);
        Some(std::mem::replace(&mut self.pending, rest))
    }

    /// One read from the link into the pending buffer
    async fn read_chunk(&mut self, link: &mut dyn Link) -> Result<usize, TransportError> {
        let chunk = link.receive().await?;
        if !chunk.is_empty() {
            trace!(bytes = chunk.len(), "Received chunk");
            self.feed(&chunk);
        }
        Ok(chunk.len())
    }

    fn emit(&mut self, line: &[u8], observer: &mut dyn RunObserver) {
        self.lines_emitted += 1;
        observer.on_event(RunEvent::Output {
            line: display_text(line),
        });
    }

    /// Read once and flush every complete line.
    ///
    /// Returns the number of lines emitted. Blank lines are dropped. A partial
    /// line stays pending for the next call.
    pub async fn drain_once(
        &mut self,
        link: &mut dyn Link,
        observer: &mut dyn RunObserver,
    ) -> Result<usize, TransportError> {
        self.read_chunk(link).await?;

        let mut emitted = 0;
        while let Some(line) = self.take_line() {
            if trimmed_text(&line).is_empty() {
                continue;
            }
            self.emit(&line, observer);
            emitted += 1;
        }
        Ok(emitted)
    }

    /// Read until the sentinel line arrives, emitting everything before it.
    ///
    /// Bytes received after the sentinel are kept and flushed by the next
    /// drain. This only returns early on a link error.
    pub async fn drain_until_sentinel(
        &mut self,
        link: &mut dyn Link,
        observer: &mut dyn RunObserver,
    ) -> Result<(), TransportError> {
        loop {
            while let Some(line) = self.take_line() {
                let text = trimmed_text(&line);
                if text.is_empty() {
                    continue;
                }
                if text == self.sentinel {
                    // whatever followed the sentinel stays pending for the next drain
                    debug!(pending = self.pending.len(), "Sentinel received");
                    return Ok(());
                }
                self.emit(&line, observer);
            }

            if self.read_chunk(link).await? == 0 {
                tokio::time::sleep(self.poll_interval).await;
            }
        }
    }

    /// [`drain_until_sentinel`](Self::drain_until_sentinel) bounded by `limit`.
    ///
    /// `None` waits forever. On expiry the partial line is discarded so the
    /// next test starts from a clean buffer.
    pub async fn drain_until_sentinel_within(
        &mut self,
        link: &mut dyn Link,
        observer: &mut dyn RunObserver,
        limit: Option<Duration>,
    ) -> Result<Completion, TransportError> {
        let Some(limit) = limit else {
            self.drain_until_sentinel(link, observer).await?;
            return Ok(Completion::Sentinel);
        };

        match tokio::time::timeout(limit, self.drain_until_sentinel(link, observer)).await {
            Ok(result) => result.map(|()| Completion::Sentinel),
            Err(_) => {
                self.reset();
                Ok(Completion::TimedOut)
            }
        }
    }
}

impl Default for LineCollector {
    fn default() -> Self {
        Self::new(DEFAULT_SENTINEL)
    }
}

/// Text used for blank checks and sentinel comparison
fn trimmed_text(line: &[u8]) -> String {
    String::from_utf8_lossy(line).trim().to_string()
}

/// Text shown to the operator: the line minus its terminator
fn display_text(line: &[u8]) -> String {
    String::from_utf8_lossy(line)
        .trim_end_matches(['\r', '\n'])
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::report::NullObserver;
    use crate::core::simulator::VirtualTarget;

    fn outputs(events: &[RunEvent]) -> Vec<&str> {
        events
            .iter()
            .filter_map(|e| match e {
                RunEvent::Output { line } => Some(line.as_str()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_take_line_keeps_tail() {
        let mut collector = LineCollector::default();
        collector.feed(b"first\nsec");
        assert_eq!(collector.take_line().unwrap(), b"first\n");
        assert_eq!(collector.take_line(), None);
        assert_eq!(collector.pending(), b"sec");
        collector.feed(b"ond\r\n");
        assert_eq!(collector.take_line().unwrap(), b"second\r\n");
        assert!(collector.pending().is_empty());
    }

    #[test]
    fn test_display_strips_only_terminator() {
        assert_eq!(display_text(b"  indented\r\n"), "  indented");
        assert_eq!(trimmed_text(b"  DONE!!11!1! \r\n"), "DONE!!11!1!");
        assert_eq!(trimmed_text(b" \t\n"), "");
    }

    #[tokio::test]
    async fn test_drain_once_without_newline_emits_nothing() {
        let mut target = VirtualTarget::new();
        target.handle().push_output(b"partial");
        let mut collector = LineCollector::default();
        let mut events: Vec<RunEvent> = Vec::new();

        let emitted = collector.drain_once(&mut target, &mut events).await.unwrap();
        assert_eq!(emitted, 0);
        assert!(events.is_empty());
        assert_eq!(collector.pending(), b"partial");

        target.handle().push_output(b" line\n");
        let emitted = collector.drain_once(&mut target, &mut events).await.unwrap();
        assert_eq!(emitted, 1);
        assert_eq!(outputs(&events), vec!["partial line"]);
        assert!(collector.pending().is_empty());
    }

    #[tokio::test]
    async fn test_drain_once_reads_only_once() {
        let mut target = VirtualTarget::new().chunk_size(4);
        target.handle().push_output(b"abc\ndef\n");
        let mut collector = LineCollector::default();
        let mut events: Vec<RunEvent> = Vec::new();

        collector.drain_once(&mut target, &mut events).await.unwrap();
        assert_eq!(outputs(&events), vec!["abc"]);
        assert!(collector.pending().is_empty());
        assert_eq!(target.handle().pending_output(), 4);
    }

    #[tokio::test]
    async fn test_blank_lines_are_discarded() {
        let mut target = VirtualTarget::new();
        target.handle().push_output(b"\n  \r\nvalue\n\n");
        let mut collector = LineCollector::default();
        let mut events: Vec<RunEvent> = Vec::new();

        let emitted = collector.drain_once(&mut target, &mut events).await.unwrap();
        assert_eq!(emitted, 1);
        assert_eq!(outputs(&events), vec!["value"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sentinel_is_swallowed() {
        let mut target = VirtualTarget::new().chunk_size(3);
        target
            .handle()
            .push_output(b"1 2 3\n\nDONE!!11!1!\r\nleftover\n");
        let mut collector = LineCollector::default();
        let mut events: Vec<RunEvent> = Vec::new();

        collector
            .drain_until_sentinel(&mut target, &mut events)
            .await
            .unwrap();

        assert_eq!(outputs(&events), vec!["1 2 3"]);
        assert_eq!(collector.lines_emitted(), 1);
        assert!(!collector.pending().starts_with(b"DONE"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_output_after_sentinel_reaches_next_drain() {
        let mut target = VirtualTarget::new();
        target.handle().push_output(b"DONE!!11!1!\nlate output\n");
        let mut collector = LineCollector::default();
        let mut events: Vec<RunEvent> = Vec::new();

        collector
            .drain_until_sentinel(&mut target, &mut events)
            .await
            .unwrap();
        assert!(events.is_empty());
        assert_eq!(collector.pending(), b"late output\n");

        let emitted = collector.drain_once(&mut target, &mut events).await.unwrap();
        assert_eq!(emitted, 1);
        assert_eq!(outputs(&events), vec!["late output"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sentinel_with_padding_matches() {
        let mut target = VirtualTarget::new();
        target.handle().push_output(b"\n   DONE!!11!1!   \n");
        let mut collector = LineCollector::default();

        collector
            .drain_until_sentinel(&mut target, &mut NullObserver)
            .await
            .unwrap();
        assert_eq!(collector.lines_emitted(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sentinel_inside_longer_line_does_not_match() {
        let mut target = VirtualTarget::new();
        target
            .handle()
            .push_output(b"not DONE!!11!1!\nDONE!!11!1!\n");
        let mut collector = LineCollector::default();
        let mut events: Vec<RunEvent> = Vec::new();

        collector
            .drain_until_sentinel(&mut target, &mut events)
            .await
            .unwrap();
        assert_eq!(outputs(&events), vec!["not DONE!!11!1!"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_each_sentinel_ends_one_drain() {
        let mut target = VirtualTarget::new().chunk_size(5);
        target
            .handle()
            .push_output(b"a\nDONE!!11!1!\n");
        let mut collector = LineCollector::default();
        let mut events: Vec<RunEvent> = Vec::new();

        collector
            .drain_until_sentinel(&mut target, &mut events)
            .await
            .unwrap();
        target.handle().push_output(b"b\nDONE!!11!1!\n");
        collector
            .drain_until_sentinel(&mut target, &mut events)
            .await
            .unwrap();

        assert_eq!(outputs(&events), vec!["a", "b"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_reports_and_clears_buffer() {
        let mut target = VirtualTarget::new();
        target.handle().push_output(b"still running\nno newline yet");
        let mut collector = LineCollector::default();
        let mut events: Vec<RunEvent> = Vec::new();

        let completion = collector
            .drain_until_sentinel_within(&mut target, &mut events, Some(Duration::from_secs(5)))
            .await
            .unwrap();

        assert_eq!(completion, Completion::TimedOut);
        assert_eq!(outputs(&events), vec!["still running"]);
        assert!(collector.pending().is_empty());
    }

    #[tokio::test]
    async fn test_read_error_propagates() {
        let mut target = VirtualTarget::new();
        target.handle().fail_reads();
        let mut collector = LineCollector::default();

        let result = collector.drain_once(&mut target, &mut NullObserver).await;
        assert!(matches!(result, Err(TransportError::IoError(_))));
    }
}
