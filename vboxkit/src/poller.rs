//! Retry-until-predicate polling.
//!
//! Every "wait for power-off / IP address / logged-in user" operation is the
//! same loop with a different probe and timeout:
//!
//! ```text
//! while elapsed < timeout:
//!     sample probe -> Some(value)  => return value
//!                  -> None         => sleep(interval)
//!                  -> Err(e)       => propagate e
//! fail with Timeout
//! ```
//!
//! A single positive sample is trusted (no debouncing) and no sample is taken
//! mid-sleep.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use vboxkit_shared::errors::{VboxError, VboxResult};

/// Interval used when the caller does not pick one.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Progress decoration invoked before every sample.
///
/// Purely a side effect; it cannot influence the outcome.
pub trait PollStatus: Send + Sync {
    fn update(&self, what: &str, elapsed: Duration, timeout: Duration);
}

/// Reports progress as debug-level tracing events.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingStatus;

impl PollStatus for TracingStatus {
    fn update(&self, what: &str, elapsed: Duration, timeout: Duration) {
        tracing::debug!(
            what,
            elapsed_secs = elapsed.as_secs(),
            timeout_secs = timeout.as_secs(),
            "Waiting"
        );
    }
}

#[derive(Clone)]
pub struct PollOptions {
    /// Wall-clock budget measured from the start of the call.
    pub timeout: Duration,
    /// Sleep between two samples.
    pub interval: Duration,
    pub status: Option<Arc<dyn PollStatus>>,
}

impl PollOptions {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            interval: DEFAULT_POLL_INTERVAL,
            status: None,
        }
    }

    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn status(mut self, status: Arc<dyn PollStatus>) -> Self {
        self.status = Some(status);
        self
    }
}

impl fmt::Debug for PollOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PollOptions")
            .field("timeout", &self.timeout)
            .field("interval", &self.interval)
            .field("status", &self.status.is_some())
            .finish()
    }
}

/// Terminal result of one polling run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome<T> {
    Ready(T),
    TimedOut { elapsed: Duration },
}

impl<T> PollOutcome<T> {
    /// Convert a timeout into `VboxError::Timeout` naming `what`.
    pub fn into_result(self, what: &str) -> VboxResult<T> {
        match self {
            PollOutcome::Ready(value) => Ok(value),
            PollOutcome::TimedOut { elapsed } => Err(VboxError::Timeout {
                what: what.to_string(),
                elapsed,
            }),
        }
    }
}

/// Sample `probe` until it yields `Some` or the deadline passes.
///
/// Probe errors propagate immediately; they are never retried.
pub async fn poll<T, F, Fut>(what: &str, options: &PollOptions, mut probe: F) -> VboxResult<PollOutcome<T>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = VboxResult<Option<T>>>,
{
    let started = Instant::now();
    let mut samples = 0u32;

    loop {
        let elapsed = started.elapsed();
        if elapsed >= options.timeout {
            tracing::debug!(what, samples, elapsed_ms = elapsed.as_millis() as u64, "Poll timed out");
            return Ok(PollOutcome::TimedOut { elapsed });
        }

        if let Some(status) = &options.status {
            status.update(what, elapsed, options.timeout);
        }

        samples += 1;
        if let Some(value) = probe().await? {
            tracing::trace!(what, samples, "Poll condition met");
            return Ok(PollOutcome::Ready(value));
        }

        tokio::time::sleep(options.interval).await;
    }
}

/// [`poll`] with the timeout folded into the error channel.
pub async fn poll_until<T, F, Fut>(what: &str, options: &PollOptions, probe: F) -> VboxResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = VboxResult<Option<T>>>,
{
    poll(what, options, probe).await?.into_result(what)
}
