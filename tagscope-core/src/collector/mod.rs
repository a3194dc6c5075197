//! Event collector
//!
//! Buffers lifecycle events emitted by a third-party producer and answers
//! summary queries over them.
//!
//! ## Lifecycle
//!
//! ```text
//!            probe true
//! Pending ───────────────→ Ready
//!    │  attempts exhausted
//!    └───────────────────→ Unavailable
//!
//! any state ── dispose / drop ──→ Disposed
//! ```
//!
//! Events are accepted while `Pending` or `Ready` and silently dropped
//! afterwards. Polling and the scheduled summary run on tokio timers and
//! stop when the collector is disposed.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use tagscope_core::collector::{Collector, LogSink, PollPolicy};
//! use tagscope_core::{EventKind, PairingRule, Payload, SourceHandle};
//!
//! # async fn run() {
//! let collector = Collector::new(SourceHandle::new("ad-frame"), PairingRule::defaults());
//! collector.schedule_auto_summary(Duration::from_secs(30), LogSink);
//! collector.spawn_producer_watch(
//!     || true,
//!     PollPolicy::default(),
//!     |recorder| recorder.record(EventKind::AuctionInit, Payload::new()),
//! );
//! # }
//! ```

mod engine;
mod log;
mod readiness;
mod sink;

pub use engine::{Collector, Recorder};
pub use log::EventLog;
pub use readiness::{fallible_probe, FallibleProbe, PollPolicy, ProducerProbe, ProducerState};
pub use sink::{ChannelSink, LogSink, SummaryMessage, SummarySink, SUMMARY_MESSAGE_TYPE};
