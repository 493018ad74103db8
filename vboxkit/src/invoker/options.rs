//! Execution options and live output forwarding.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

/// Default number of stdout lines retained for periodic refresh.
pub const DEFAULT_TAIL_LINES: usize = 20;

/// Output channel of a child process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Stdout,
    Stderr,
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::Stdout => f.write_str("stdout"),
            Channel::Stderr => f.write_str("stderr"),
        }
    }
}

/// Receives output lines as soon as they are read.
///
/// Called from the reader task of the corresponding channel, so stdout and
/// stderr lines may interleave arbitrarily; within one channel order is kept.
pub trait OutputSink: Send + Sync {
    fn line(&self, channel: Channel, line: &str);
}

/// Sink that emits every line as a tracing event.
#[derive(Debug, Clone, Default)]
pub struct TracingSink {
    label: Option<String>,
}

impl TracingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tag each event with `label` (typically the entity name).
    pub fn labeled(label: impl Into<String>) -> Self {
        Self {
            label: Some(label.into()),
        }
    }
}

impl OutputSink for TracingSink {
    fn line(&self, channel: Channel, line: &str) {
        let label = self.label.as_deref().unwrap_or("-");
        match channel {
            Channel::Stdout => tracing::info!(target: "vboxkit::output", label, "{}", line),
            Channel::Stderr => tracing::warn!(target: "vboxkit::output", label, "{}", line),
        }
    }
}

/// Sink that drops everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl OutputSink for NullSink {
    fn line(&self, _channel: Channel, _line: &str) {}
}

/// Bounded window over the most recent stdout lines.
///
/// Cheap to clone; clones share the same window so a display task can poll
/// `snapshot()` while the command runs.
#[derive(Clone)]
pub struct OutputTail {
    capacity: usize,
    lines: Arc<Mutex<VecDeque<String>>>,
}

impl OutputTail {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            lines: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub(crate) fn push(&self, line: &str) {
        if self.capacity == 0 {
            return;
        }
        let mut lines = self.lines.lock();
        if lines.len() == self.capacity {
            lines.pop_front();
        }
        lines.push_back(line.to_string());
    }

    /// Current window, oldest line first.
    pub fn snapshot(&self) -> Vec<String> {
        self.lines.lock().iter().cloned().collect()
    }
}

impl Default for OutputTail {
    fn default() -> Self {
        Self::new(DEFAULT_TAIL_LINES)
    }
}

impl fmt::Debug for OutputTail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutputTail")
            .field("capacity", &self.capacity)
            .field("len", &self.lines.lock().len())
            .finish()
    }
}

/// Live forwarding configuration for a streamed run.
#[derive(Clone)]
pub struct StreamOptions {
    pub sink: Arc<dyn OutputSink>,
    pub tail: OutputTail,
}

impl StreamOptions {
    pub fn new(sink: Arc<dyn OutputSink>) -> Self {
        Self {
            sink,
            tail: OutputTail::default(),
        }
    }

    pub fn with_tail_lines(mut self, lines: usize) -> Self {
        self.tail = OutputTail::new(lines);
        self
    }
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self::new(Arc::new(TracingSink::new()))
    }
}

impl fmt::Debug for StreamOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamOptions")
            .field("tail", &self.tail)
            .finish_non_exhaustive()
    }
}

/// Options for a single invocation.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Kill the child once this much wall-clock time has passed.
    pub timeout: Option<Duration>,
    /// On timeout, kill the child's whole process group (unix).
    pub kill_descendants: bool,
    /// Forward lines live; `None` captures silently.
    pub stream: Option<StreamOptions>,
}

impl RunOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn timeout_opt(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn kill_descendants(mut self, kill: bool) -> Self {
        self.kill_descendants = kill;
        self
    }

    pub fn stream(mut self, stream: StreamOptions) -> Self {
        self.stream = Some(stream);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tail_keeps_most_recent() {
        let tail = OutputTail::new(3);
        for i in 0..5 {
            tail.push(&format!("line {}", i));
        }
        assert_eq!(tail.snapshot(), vec!["line 2", "line 3", "line 4"]);
    }

    #[test]
    fn test_tail_clones_share_window() {
        let tail = OutputTail::new(2);
        let view = tail.clone();
        tail.push("a");
        assert_eq!(view.snapshot(), vec!["a"]);
    }

    #[test]
    fn test_zero_capacity_tail_stays_empty() {
        let tail = OutputTail::new(0);
        tail.push("a");
        assert!(tail.snapshot().is_empty());
    }

    #[test]
    fn test_default_tail_lines() {
        let opts = StreamOptions::default();
        assert_eq!(opts.tail.capacity(), DEFAULT_TAIL_LINES);
        let opts = opts.with_tail_lines(5);
        assert_eq!(opts.tail.capacity(), 5);
    }
}
