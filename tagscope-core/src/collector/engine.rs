//! The event collector and its recorder handle

use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::config::Config;
use crate::summary::Summary;
use crate::types::{Event, EventKind, PairingRule, Payload, SourceHandle, UNNAMED_SOURCE};

use super::log::EventLog;
use super::readiness::{poll_until_ready, PollPolicy, ProducerProbe, ProducerState};
use super::sink::SummarySink;

/// State shared by the collector, its recorders and its background tasks
pub(crate) struct Shared {
    source: SourceHandle,
    rules: Vec<PairingRule>,
    log: EventLog,
    state: watch::Sender<ProducerState>,
}

impl Shared {
    pub(crate) fn source(&self) -> &SourceHandle {
        &self.source
    }

    pub(crate) fn state(&self) -> ProducerState {
        *self.state.borrow()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<ProducerState> {
        self.state.subscribe()
    }

    /// Move to `next`. Only `Pending` may become `Ready` or `Unavailable`;
    /// any state may become `Disposed`. Returns whether the state changed.
    pub(crate) fn transition(&self, next: ProducerState) -> bool {
        // Appends are blocked while the state moves, so no event lands
        // after the collector stops accepting them.
        self.log.exclusive(|| {
            self.state.send_if_modified(|current| {
                let allowed = match next {
                    ProducerState::Disposed => *current != ProducerState::Disposed,
                    ProducerState::Ready | ProducerState::Unavailable => {
                        *current == ProducerState::Pending
                    }
                    ProducerState::Pending => false,
                };
                if allowed {
                    *current = next;
                }
                allowed
            })
        })
    }

    fn record_at(&self, kind: EventKind, timestamp: f64, payload: Payload) {
        let event = Event {
            kind,
            timestamp,
            payload,
        };
        let mut state = ProducerState::Pending;
        let appended = self.log.append_if(event, || {
            state = self.state();
            state.accepts_events()
        });

        if appended {
            tracing::trace!(source = %self.source.name(), kind = %kind, timestamp, "Recorded event");
        } else {
            tracing::debug!(
                source = %self.source.name(),
                kind = %kind,
                state = %state,
                "Dropping event"
            );
        }
    }

    fn record(&self, kind: EventKind, payload: Payload) {
        self.record_at(kind, self.source.elapsed_ms(), payload);
    }

    fn summarize(&self) -> Summary {
        let events = self.log.snapshot();
        Summary::compute(&self.source, &events, &self.rules, self.source.elapsed_ms())
    }
}

/// Buffers events from one producer and answers summary queries.
///
/// Dropping the collector disposes it: pending polls and scheduled
/// summaries are cancelled and later records are ignored.
pub struct Collector {
    shared: Arc<Shared>,
    created_at: Instant,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Collector {
    /// Create an empty collector bound to `source`
    pub fn new(source: SourceHandle, rules: Vec<PairingRule>) -> Self {
        let (state, _) = watch::channel(ProducerState::Pending);
        tracing::debug!(source = %source.name(), rules = rules.len(), "Collector created");

        Self {
            shared: Arc::new(Shared {
                source,
                rules,
                log: EventLog::new(),
                state,
            }),
            created_at: Instant::now(),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Create a collector using the configured pairing rules.
    ///
    /// `source_name` wins over `collector.source_name` from the config.
    pub fn from_config(config: &Config, source_name: Option<&str>) -> Self {
        let name = source_name
            .or(config.collector.source_name.as_deref())
            .unwrap_or(UNNAMED_SOURCE);
        Self::new(SourceHandle::new(name), config.pairing_rules())
    }

    pub fn source(&self) -> &SourceHandle {
        self.shared.source()
    }

    pub fn rules(&self) -> &[PairingRule] {
        &self.shared.rules
    }

    /// Current producer state
    pub fn state(&self) -> ProducerState {
        self.shared.state()
    }

    /// Number of events in the log
    pub fn len(&self) -> usize {
        self.shared.log.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.log.is_empty()
    }

    /// Copy of the event log
    pub fn events(&self) -> Vec<Event> {
        self.shared.log.snapshot()
    }

    /// Handle that event-source callbacks can hold to record events
    pub fn recorder(&self) -> Recorder {
        Recorder {
            shared: Arc::downgrade(&self.shared),
        }
    }

    /// Append an event stamped with the current time.
    ///
    /// Never fails. Dropped silently once the producer is unavailable or
    /// the collector is disposed.
    pub fn record(&self, kind: EventKind, payload: Payload) {
        self.shared.record(kind, payload);
    }

    /// Append an event with an explicit timestamp (ms since source creation),
    /// for replaying captured streams. Same drop rules as [`Collector::record`].
    pub fn record_at(&self, kind: EventKind, timestamp: f64, payload: Payload) {
        self.shared.record_at(kind, timestamp, payload);
    }

    /// Summary of the log as it is right now
    pub fn summarize(&self) -> Summary {
        self.shared.summarize()
    }

    /// Wait for the producer to load.
    ///
    /// Nothing happens until the returned future is polled. Dropping it
    /// stops polling; disposing the collector ends it with
    /// [`ProducerState::Disposed`].
    pub fn wait_for_producer_ready<P: ProducerProbe>(
        &self,
        probe: P,
        policy: PollPolicy,
    ) -> impl Future<Output = ProducerState> + Send + 'static {
        let shared = Arc::clone(&self.shared);
        async move { poll_until_ready(shared, probe, policy).await }
    }

    /// Poll for the producer on a background task and hand a [`Recorder`]
    /// to `on_ready` once it loads, so the caller can register its event
    /// listeners. `on_ready` is never called if the producer stays
    /// unavailable or the collector is disposed first.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn_producer_watch<P, F>(&self, probe: P, policy: PollPolicy, on_ready: F)
    where
        P: ProducerProbe,
        F: FnOnce(Recorder) + Send + 'static,
    {
        let wait = self.wait_for_producer_ready(probe, policy);
        let recorder = self.recorder();
        self.track(tokio::spawn(async move {
            if wait.await == ProducerState::Ready {
                on_ready(recorder);
            }
        }));
    }

    /// Deliver one summary to `sink` once `delay` has passed since the
    /// collector was created. Cancelled if the collector is disposed first.
    /// A delay too large to represent as an instant never fires.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn schedule_auto_summary<S: SummarySink>(&self, delay: Duration, sink: S) {
        let Some(deadline) = self.created_at.checked_add(delay) else {
            tracing::debug!(
                source = %self.shared.source.name(),
                delay = ?delay,
                "Auto summary delay out of range; not scheduling"
            );
            return;
        };
        let shared = Arc::clone(&self.shared);
        let mut state_rx = shared.subscribe();

        self.track(tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => {}
                _ = state_rx.wait_for(|s| *s == ProducerState::Disposed) => return,
            }
            if shared.state() == ProducerState::Disposed {
                return;
            }

            let summary = shared.summarize();
            tracing::info!(
                source = %summary.source,
                total_events = summary.total_events,
                "Delivering auto summary"
            );
            sink.deliver(summary);
        }));
    }

    /// Cancel pending polls and scheduled summaries and stop accepting
    /// events. Idempotent.
    pub fn dispose(&self) {
        if self.shared.transition(ProducerState::Disposed) {
            tracing::debug!(source = %self.shared.source.name(), "Collector disposed");
        }

        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        for task in tasks.drain(..) {
            task.abort();
        }
    }

    fn track(&self, task: JoinHandle<()>) {
        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        tasks.retain(|t| !t.is_finished());
        tasks.push(task);
    }
}

impl Drop for Collector {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// Cloneable handle for recording into a collector's log.
///
/// Becomes a no-op once the collector is dropped.
#[derive(Clone)]
pub struct Recorder {
    shared: Weak<Shared>,
}

impl Recorder {
    /// Same as [`Collector::record`]
    pub fn record(&self, kind: EventKind, payload: Payload) {
        if let Some(shared) = self.shared.upgrade() {
            shared.record(kind, payload);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(value: serde_json::Value) -> Payload {
        match value {
            serde_json::Value::Object(map) => map,
            _ => Payload::new(),
        }
    }

    fn collector() -> Collector {
        Collector::new(SourceHandle::new("frame"), PairingRule::defaults())
    }

    #[test]
    fn test_counts_match_records() {
        let collector = collector();
        collector.record(EventKind::AuctionInit, payload(json!({"auctionId": "a"})));
        collector.record(EventKind::BidResponse, payload(json!({"bidder": "x"})));
        collector.record(EventKind::BidResponse, payload(json!({"bidder": "y"})));
        collector.record(EventKind::AuctionEnd, Payload::new());

        let summary = collector.summarize();
        assert_eq!(summary.total_events, 4);
        assert_eq!(summary.count(EventKind::BidResponse), 2);
        assert_eq!(summary.count(EventKind::AuctionInit), 1);
        assert_eq!(summary.count(EventKind::BidWon), 0);
    }

    #[test]
    fn test_malformed_payload_stored_as_is() {
        let collector = collector();
        collector.record(
            EventKind::BidWon,
            payload(json!({"cpm": "not-a-number", "adUnitCode": null})),
        );

        let events = collector.events();
        assert_eq!(events[0].payload["cpm"], "not-a-number");
        let summary = collector.summarize();
        assert_eq!(summary.wins[0].cpm, None);
        assert_eq!(summary.wins[0].ad_unit, None);
    }

    #[test]
    fn test_dispose_drops_records() {
        let collector = collector();
        collector.record(EventKind::BidWon, Payload::new());
        collector.dispose();
        collector.dispose();
        collector.record(EventKind::BidWon, Payload::new());

        assert_eq!(collector.state(), ProducerState::Disposed);
        assert_eq!(collector.len(), 1);
    }

    #[test]
    fn test_no_records_land_after_concurrent_dispose() {
        let collector = collector();
        let writers: Vec<_> = (0..4)
            .map(|_| {
                let recorder = collector.recorder();
                std::thread::spawn(move || {
                    for _ in 0..5_000 {
                        recorder.record(EventKind::BidResponse, Payload::new());
                    }
                })
            })
            .collect();

        while collector.len() < 100 {
            std::thread::yield_now();
        }
        collector.dispose();
        let at_dispose = collector.len();

        for writer in writers {
            writer.join().unwrap();
        }
        assert_eq!(collector.len(), at_dispose);
        assert_eq!(collector.summarize().total_events, at_dispose);
    }

    #[test]
    fn test_recorder_outlives_collector() {
        let collector = collector();
        let recorder = collector.recorder();
        recorder.record(EventKind::SlotOnLoad, Payload::new());
        assert_eq!(collector.len(), 1);

        drop(collector);
        recorder.record(EventKind::SlotOnLoad, Payload::new());
    }

    #[test]
    fn test_transitions() {
        let collector = collector();
        assert!(!collector.shared.transition(ProducerState::Pending));
        assert!(collector.shared.transition(ProducerState::Ready));
        assert!(!collector.shared.transition(ProducerState::Unavailable));
        assert!(collector.shared.transition(ProducerState::Disposed));
        assert!(!collector.shared.transition(ProducerState::Disposed));
    }

    #[test]
    fn test_from_config_source_name() {
        let mut config = Config::default();
        assert_eq!(Collector::from_config(&config, None).source().name(), UNNAMED_SOURCE);

        config.collector.source_name = Some("configured".to_string());
        assert_eq!(
            Collector::from_config(&config, None).source().name(),
            "configured"
        );
        assert_eq!(
            Collector::from_config(&config, Some("explicit")).source().name(),
            "explicit"
        );
    }
}
