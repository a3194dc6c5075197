//! Delivery sinks for scheduled summaries
//!
//! A sink receives the summary by value. How it leaves the process (a
//! channel, a frame message, a log line) is up to the sink.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::format::render_summary;
use crate::summary::Summary;

/// Message type tag carried by [`SummaryMessage`]
pub const SUMMARY_MESSAGE_TYPE: &str = "COLLECTOR_SUMMARY";

/// Receives a summary exactly once
pub trait SummarySink: Send + 'static {
    fn deliver(self, summary: Summary);
}

impl<F> SummarySink for F
where
    F: FnOnce(Summary) + Send + 'static,
{
    fn deliver(self, summary: Summary) {
        self(summary)
    }
}

/// Envelope used when a summary crosses a context boundary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryMessage {
    /// Always [`SUMMARY_MESSAGE_TYPE`]
    #[serde(rename = "type")]
    pub message_type: String,
    /// Name of the source the summary describes
    pub source: String,
    pub payload: Summary,
}

impl SummaryMessage {
    pub fn new(summary: Summary) -> Self {
        Self {
            message_type: SUMMARY_MESSAGE_TYPE.to_string(),
            source: summary.source.clone(),
            payload: summary,
        }
    }
}

/// Forwards summaries as [`SummaryMessage`]s over a tokio channel
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<SummaryMessage>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::UnboundedSender<SummaryMessage>) -> Self {
        Self { tx }
    }

    /// Create a sink together with the receiving end
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<SummaryMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }
}

impl SummarySink for ChannelSink {
    fn deliver(self, summary: Summary) {
        let source = summary.source.clone();
        if self.tx.send(SummaryMessage::new(summary)).is_err() {
            tracing::debug!(source = %source, "Summary receiver dropped; discarding summary");
        }
    }
}

/// Writes the text report of a summary to the log at info level
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl SummarySink for LogSink {
    fn deliver(self, summary: Summary) {
        for line in render_summary(&summary).lines() {
            tracing::info!(source = %summary.source, "{}", line);
        }
    }
}
