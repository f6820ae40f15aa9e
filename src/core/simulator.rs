//! Virtual target simulator
//!
//! An in-process stand-in for the interpreter on the other end of the serial
//! line. It understands just enough of the session protocol to exercise the
//! harness without hardware:
//!
//! - `exit();` clears the stored program (and un-hangs the target)
//! - `main();` plays the scripted program output, or hangs
//! - a `printf("...")` statement starting in column 0 runs immediately
//! - any other line is stored as program text
//!
//! Response rules add replies to individual lines, e.g. a compile error for
//! a line containing a given token. A [`TargetHandle`] stays usable after the
//! target itself has been boxed into a session.

use super::transport::{Link, TransportError, TransportStats, TransportType};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;

/// Response rule condition, checked against one received line
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MatchCondition {
    /// Trimmed line equals the text
    Exact {
        /// Expected line, without terminator
        line: String,
    },
    /// Line contains the text
    Text {
        /// Substring to look for
        text: String,
    },
    /// Match any line
    Any,
}

impl MatchCondition {
    /// Check if a received line matches this condition
    pub fn matches(&self, line: &str) -> bool {
        match self {
            Self::Exact { line: expected } => line.trim() == expected,
            Self::Text { text } => line.contains(text.as_str()),
            Self::Any => true,
        }
    }
}

/// Reply sent when a condition matches
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseRule {
    /// Condition on the received line
    pub condition: MatchCondition,
    /// Bytes queued for the harness to read
    pub response: Vec<u8>,
    /// Fire only once
    pub one_shot: bool,
    /// Times this rule fired
    #[serde(default)]
    pub match_count: u32,
}

#[derive(Debug, Default)]
struct TargetState {
    input: Vec<u8>,
    written: Vec<u8>,
    lines_received: Vec<String>,
    output: VecDeque<u8>,
    rules: Vec<ResponseRule>,
    program: Vec<String>,
    program_output: Vec<u8>,
    echo: bool,
    hang_on_run: bool,
    hung: bool,
    fail_reads: bool,
    resets: usize,
    runs: usize,
    stats: TransportStats,
}

impl TargetState {
    fn process_line(&mut self, line: String) {
        let trimmed = line.trim();

        if self.echo {
            self.output.extend(line.as_bytes());
        }

        if trimmed == "exit();" {
            self.resets += 1;
            self.program.clear();
            self.hung = false;
        } else if self.hung {
            // busy in a runaway program, input is swallowed
        } else if trimmed == "main();" {
            self.runs += 1;
            if self.hang_on_run {
                self.hung = true;
            } else {
                let output = self.program_output.clone();
                self.output.extend(output);
            }
        } else if line.starts_with("printf(") {
            let rendered = render_printf_literal(&line);
            self.output.extend(rendered.as_bytes());
        } else {
            self.program.push(line.clone());
        }

        if !self.hung {
            for rule in &mut self.rules {
                if rule.one_shot && rule.match_count > 0 {
                    continue;
                }
                if rule.condition.matches(&line) {
                    rule.match_count += 1;
                    self.output.extend(rule.response.iter().copied());
                }
            }
        }

        self.lines_received.push(line);
    }
}

/// Render the string literal of a `printf("...")` call without arguments
fn render_printf_literal(line: &str) -> String {
    let (Some(start), Some(end)) = (line.find('"'), line.rfind('"')) else {
        return String::new();
    };
    if end <= start {
        return String::new();
    }

    let mut rendered = String::new();
    let mut chars = line[start + 1..end].chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            rendered.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => rendered.push('\n'),
            Some('r') => rendered.push('\r'),
            Some('t') => rendered.push('\t'),
            Some(other) => rendered.push(other),
            None => rendered.push('\\'),
        }
    }
    rendered
}

/// Simulated interpreter reachable through [`Link`]
pub struct VirtualTarget {
    state: Arc<Mutex<TargetState>>,
    chunk_size: usize,
}

impl VirtualTarget {
    /// Create an idle target that prints nothing on its own
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(TargetState::default())),
            chunk_size: usize::MAX,
        }
    }

    /// Deliver output in pieces of at most `size` bytes per read
    #[must_use]
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size.max(1);
        self
    }

    /// Echo every received line back
    #[must_use]
    pub fn echo(self, enable: bool) -> Self {
        self.state.lock().echo = enable;
        self
    }

    /// Reply with `response` to every line containing `text`
    #[must_use]
    pub fn reply_to(self, text: &str, response: &str) -> Self {
        self.add_rule(ResponseRule {
            condition: MatchCondition::Text {
                text: text.to_string(),
            },
            response: response.as_bytes().to_vec(),
            one_shot: false,
            match_count: 0,
        })
    }

    /// Add a response rule
    #[must_use]
    pub fn add_rule(self, rule: ResponseRule) -> Self {
        self.state.lock().rules.push(rule);
        self
    }

    /// Output printed each time `main();` runs
    #[must_use]
    pub fn on_run(self, output: &str) -> Self {
        self.state.lock().program_output = output.as_bytes().to_vec();
        self
    }

    /// Never return from `main();` until the next `exit();`
    #[must_use]
    pub fn hang_on_run(self) -> Self {
        self.state.lock().hang_on_run = true;
        self
    }

    /// Handle for inspecting and steering the target
    pub fn handle(&self) -> TargetHandle {
        TargetHandle {
            state: Arc::clone(&self.state),
        }
    }
}

impl Default for VirtualTarget {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Link for VirtualTarget {
    async fn send(&mut self, data: &[u8]) -> Result<usize, TransportError> {
        let mut state = self.state.lock();
        state.written.extend_from_slice(data);
        state.stats.bytes_sent += data.len() as u64;
        state.stats.packets_sent += 1;

        state.input.extend_from_slice(data);
        while let Some(pos) = state.input.iter().position(|&b| b == b'\n') {
            let rest = state.input.split_off(pos + 1);
            let line = std::mem::replace(&mut state.input, rest);
            state.process_line(String::from_utf8_lossy(&line).into_owned());
        }

        Ok(data.len())
    }

    async fn receive(&mut self) -> Result<Bytes, TransportError> {
        let mut state = self.state.lock();
        if state.fail_reads {
            return Err(TransportError::IoError(std::io::Error::other(
                "virtual target read failure",
            )));
        }

        let n = state.output.len().min(self.chunk_size);
        let chunk: Vec<u8> = state.output.drain(..n).collect();
        if n > 0 {
            state.stats.bytes_received += n as u64;
            state.stats.packets_received += 1;
        }
        Ok(Bytes::from(chunk))
    }

    fn transport_type(&self) -> TransportType {
        TransportType::Virtual
    }

    fn connection_info(&self) -> String {
        "virtual target".to_string()
    }

    fn stats(&self) -> TransportStats {
        self.state.lock().stats.clone()
    }
}

/// Shared view of a [`VirtualTarget`]
#[derive(Clone)]
pub struct TargetHandle {
    state: Arc<Mutex<TargetState>>,
}

impl TargetHandle {
    /// Queue bytes for the harness to read
    pub fn push_output(&self, data: &[u8]) {
        self.state.lock().output.extend(data.iter().copied());
    }

    /// Bytes queued but not yet read
    pub fn pending_output(&self) -> usize {
        self.state.lock().output.len()
    }

    /// Every byte the harness wrote, in order
    pub fn written(&self) -> Vec<u8> {
        self.state.lock().written.clone()
    }

    /// Every complete line the harness wrote, in order
    pub fn lines_received(&self) -> Vec<String> {
        self.state.lock().lines_received.clone()
    }

    /// Number of `exit();` commands seen
    pub fn resets(&self) -> usize {
        self.state.lock().resets
    }

    /// Number of `main();` commands seen
    pub fn runs(&self) -> usize {
        self.state.lock().runs
    }

    /// Make every following read fail
    pub fn fail_reads(&self) {
        self.state.lock().fail_reads = true;
    }
}
