//! Producer readiness polling
//!
//! The producer (an ad library loading inside a frame) may show up late or
//! never. A probe is invoked on a fixed interval until it reports ready or
//! the attempt budget runs out.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;

use super::engine::Shared;

/// Lifecycle state of a collector with respect to its producer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProducerState {
    /// Producer not seen yet; events are still accepted
    Pending,
    /// Probe succeeded
    Ready,
    /// Probe never succeeded within its attempt budget; events are dropped
    Unavailable,
    /// Collector was disposed; events are dropped and nothing fires
    Disposed,
}

impl ProducerState {
    /// Whether `record` still appends in this state
    pub fn accepts_events(&self) -> bool {
        matches!(self, ProducerState::Pending | ProducerState::Ready)
    }

    /// Terminal states never change again, except to `Disposed`
    pub fn is_settled(&self) -> bool {
        !matches!(self, ProducerState::Pending)
    }
}

impl fmt::Display for ProducerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProducerState::Pending => "pending",
            ProducerState::Ready => "ready",
            ProducerState::Unavailable => "unavailable",
            ProducerState::Disposed => "disposed",
        };
        f.write_str(s)
    }
}

/// How often and how many times to probe the producer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// Delay between attempts
    pub interval: Duration,
    /// Attempt budget; `None` polls until ready or disposed.
    /// `Some(0)` is treated as a single attempt.
    pub max_attempts: Option<u32>,
}

impl PollPolicy {
    pub fn new(interval: Duration, max_attempts: Option<u32>) -> Self {
        Self {
            interval,
            max_attempts,
        }
    }

    /// Poll forever at `interval`
    pub fn unbounded(interval: Duration) -> Self {
        Self::new(interval, None)
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self::new(Duration::from_millis(200), Some(150))
    }
}

/// Reports whether the instrumented third-party system has loaded.
///
/// An `Err` counts as "not ready" for that attempt; polling continues.
pub trait ProducerProbe: Send + 'static {
    fn check(&mut self) -> Result<bool>;
}

impl<F> ProducerProbe for F
where
    F: FnMut() -> bool + Send + 'static,
{
    fn check(&mut self) -> Result<bool> {
        Ok(self())
    }
}

/// Probe built from a closure that can fail
pub struct FallibleProbe<F>(F);

/// Wrap a fallible closure as a [`ProducerProbe`]
pub fn fallible_probe<F>(f: F) -> FallibleProbe<F>
where
    F: FnMut() -> Result<bool> + Send + 'static,
{
    FallibleProbe(f)
}

impl<F> ProducerProbe for FallibleProbe<F>
where
    F: FnMut() -> Result<bool> + Send + 'static,
{
    fn check(&mut self) -> Result<bool> {
        (self.0)()
    }
}

/// Run one probe attempt. Errors and panics count as "not ready".
fn run_probe<P: ProducerProbe>(probe: &mut P, source: &str, attempt: u32) -> bool {
    match panic::catch_unwind(AssertUnwindSafe(|| probe.check())) {
        Ok(Ok(ready)) => ready,
        Ok(Err(e)) => {
            tracing::debug!(source = %source, attempt, error = %e, "Producer probe failed");
            false
        }
        Err(_) => {
            tracing::warn!(source = %source, attempt, "Producer probe panicked");
            false
        }
    }
}

/// Probe until ready, out of attempts, or disposed.
///
/// The first attempt runs immediately; later attempts follow `interval`
/// apart. Returns the state the collector settled in.
pub(crate) async fn poll_until_ready<P: ProducerProbe>(
    shared: Arc<Shared>,
    mut probe: P,
    policy: PollPolicy,
) -> ProducerState {
    let mut state_rx = shared.subscribe();
    let max_attempts = policy.max_attempts.map(|max| max.max(1));
    let mut attempt = 0u32;

    loop {
        let state = shared.state();
        if state.is_settled() {
            return state;
        }

        attempt += 1;
        if run_probe(&mut probe, shared.source().name(), attempt) {
            shared.transition(ProducerState::Ready);
            tracing::info!(
                source = %shared.source().name(),
                attempt,
                elapsed_ms = shared.source().elapsed_ms(),
                "Producer ready"
            );
            return shared.state();
        }

        if let Some(max) = max_attempts {
            if attempt >= max {
                shared.transition(ProducerState::Unavailable);
                tracing::warn!(
                    source = %shared.source().name(),
                    attempts = attempt,
                    "Producer never became ready; collector is inert"
                );
                return shared.state();
            }
        }

        tokio::select! {
            _ = tokio::time::sleep(policy.interval) => {}
            _ = state_rx.wait_for(|s| *s == ProducerState::Disposed) => {
                return ProducerState::Disposed;
            }
        }
    }
}
