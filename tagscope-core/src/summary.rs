//! Summaries computed from an event log snapshot
//!
//! A [`Summary`] is plain data: it holds no reference to the log it came
//! from, so it can be serialized and handed across a process or frame
//! boundary by value.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::types::{Event, EventKind, PairingRule, SourceHandle};

/// Payload field carrying the ad unit on Prebid win and render events
pub const AD_UNIT_KEY: &str = "adUnitCode";

/// Read-only aggregate of one source's event log at a point in time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    /// Source (frame) name
    pub source: String,
    /// Wall-clock creation time of the source, ms since the Unix epoch
    pub source_created_at: f64,
    /// When the summary was computed, ms since the source was created
    pub generated_at: f64,
    /// Number of events in the log
    pub total_events: usize,
    /// Event count per kind; kinds never seen are absent
    pub counts: BTreeMap<EventKind, usize>,
    /// One entry per terminal event that found its origin
    pub latencies: Vec<PairLatency>,
    /// Aggregates per pairing rule; rules with no matched pair are absent
    pub latency_stats: BTreeMap<String, LatencyStats>,
    /// Per-win breakdown of Prebid bid wins
    pub wins: Vec<WinReport>,
}

/// Latency between a matched origin and terminal event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairLatency {
    /// Name of the pairing rule that matched
    pub rule: String,
    /// Correlation key shared by both events
    pub key: String,
    /// Origin event timestamp
    pub origin_at: f64,
    /// Terminal event timestamp
    pub terminal_at: f64,
    /// `terminal_at - origin_at`
    pub latency_ms: f64,
}

/// Latency statistics for one pairing rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatencyStats {
    pub count: usize,
    pub min_ms: f64,
    pub max_ms: f64,
    pub mean_ms: f64,
}

/// Details of one bid win and, when it rendered, how long that took
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WinReport {
    pub ad_unit: Option<String>,
    pub bidder: Option<String>,
    pub cpm: Option<f64>,
    pub auction_id: Option<String>,
    /// Win time, ms since the source was created
    pub won_at: f64,
    /// Render time minus win time, when a render for the ad unit exists
    pub time_to_render_ms: Option<f64>,
    /// Render time since the source was created
    pub load_to_render_ms: Option<f64>,
}

impl Summary {
    /// Compute a summary over `events`.
    ///
    /// Pure: the result depends only on the arguments.
    pub fn compute(
        source: &SourceHandle,
        events: &[Event],
        rules: &[PairingRule],
        generated_at: f64,
    ) -> Self {
        let mut counts = BTreeMap::new();
        for event in events {
            *counts.entry(event.kind).or_insert(0) += 1;
        }

        let mut latencies = Vec::new();
        let mut latency_stats = BTreeMap::new();
        for rule in rules {
            let matched = match_pairs(rule, events);
            if let Some(stats) = LatencyStats::from_pairs(&matched) {
                latency_stats.insert(rule.name.clone(), stats);
            }
            latencies.extend(matched);
        }

        Self {
            source: source.name().to_string(),
            source_created_at: source.creation_timestamp(),
            generated_at,
            total_events: events.len(),
            counts,
            latencies,
            latency_stats,
            wins: win_reports(events),
        }
    }

    /// Count of events of `kind`, zero when none were recorded
    pub fn count(&self, kind: EventKind) -> usize {
        self.counts.get(&kind).copied().unwrap_or(0)
    }

    /// Latencies matched by the named rule
    pub fn latencies_for<'a>(&'a self, rule: &'a str) -> impl Iterator<Item = &'a PairLatency> {
        self.latencies.iter().filter(move |l| l.rule == rule)
    }
}

impl LatencyStats {
    fn from_pairs(pairs: &[PairLatency]) -> Option<Self> {
        if pairs.is_empty() {
            return None;
        }

        let mut min_ms = f64::INFINITY;
        let mut max_ms = f64::NEG_INFINITY;
        let mut total = 0.0;
        for pair in pairs {
            min_ms = min_ms.min(pair.latency_ms);
            max_ms = max_ms.max(pair.latency_ms);
            total += pair.latency_ms;
        }

        Some(Self {
            count: pairs.len(),
            min_ms,
            max_ms,
            mean_ms: total / pairs.len() as f64,
        })
    }
}

/// Match every terminal event of `rule` against the first origin event in
/// log order that carries the same correlation key.
fn match_pairs(rule: &PairingRule, events: &[Event]) -> Vec<PairLatency> {
    let mut first_origin: HashMap<String, &Event> = HashMap::new();
    for event in events.iter().filter(|e| e.kind == rule.origin) {
        if let Some(key) = event.field(&rule.key) {
            first_origin.entry(canonical_key(key)).or_insert(event);
        }
    }

    events
        .iter()
        .filter(|e| e.kind == rule.terminal)
        .filter_map(|terminal| {
            let key = terminal.field(&rule.key)?;
            let origin = first_origin.get(&canonical_key(key))?;
            Some(PairLatency {
                rule: rule.name.clone(),
                key: display_key(key),
                origin_at: origin.timestamp,
                terminal_at: terminal.timestamp,
                latency_ms: terminal.timestamp - origin.timestamp,
            })
        })
        .collect()
}

fn win_reports(events: &[Event]) -> Vec<WinReport> {
    let renders: Vec<&Event> = events
        .iter()
        .filter(|e| e.kind == EventKind::AdRenderSucceeded)
        .collect();

    events
        .iter()
        .filter(|e| e.kind == EventKind::BidWon)
        .map(|win| {
            let ad_unit = win.field(AD_UNIT_KEY);
            let render = ad_unit.and_then(|unit| {
                renders
                    .iter()
                    .find(|r| r.field(AD_UNIT_KEY) == Some(unit))
            });

            WinReport {
                ad_unit: ad_unit.map(display_key),
                bidder: win.field("bidder").map(display_key),
                cpm: win.field("cpm").and_then(|v| v.as_f64()),
                auction_id: win.field("auctionId").map(display_key),
                won_at: win.timestamp,
                time_to_render_ms: render.map(|r| r.timestamp - win.timestamp),
                load_to_render_ms: render.map(|r| r.timestamp),
            }
        })
        .collect()
}

/// Stable representation used to compare keys; JSON objects serialize with
/// sorted keys so equal values give equal strings.
fn canonical_key(value: &serde_json::Value) -> String {
    value.to_string()
}

fn display_key(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
