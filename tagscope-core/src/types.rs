//! Core domain types for tagscope
//!
//! ## Terminology
//!
//! | Term | Definition |
//! |------|------------|
//! | **Producer** | The third-party system being observed (Prebid.js, GPT, a comment widget) |
//! | **Source** | The context the producer runs in, usually a named frame |
//! | **Event** | One lifecycle notification emitted by the producer |
//! | **Correlation key** | A payload field (ad unit code, slot id) pairing events across kinds |
//! | **Summary** | A read-only aggregate computed from a source's event log |
//!
//! Timestamps on events are milliseconds since the source was created,
//! measured on the monotonic clock. The wall-clock creation time of the
//! source is kept separately as milliseconds since the Unix epoch.

use std::fmt;
use std::str::FromStr;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::error::Error;

/// Name given to a source that was created without one.
pub const UNNAMED_SOURCE: &str = "unnamed-frame";

/// Free-form event payload, stored exactly as the producer emitted it.
pub type Payload = serde_json::Map<String, serde_json::Value>;

// ============================================
// Source
// ============================================

/// Identifies the producer context a collector is bound to.
///
/// Immutable once created. The monotonic origin is the zero point for
/// every event timestamp recorded against this source.
#[derive(Debug, Clone)]
pub struct SourceHandle {
    name: String,
    creation_timestamp: f64,
    origin: Instant,
}

impl SourceHandle {
    /// Create a source handle stamped with the current time.
    ///
    /// Blank names fall back to [`UNNAMED_SOURCE`].
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let name = if name.trim().is_empty() {
            UNNAMED_SOURCE.to_string()
        } else {
            name
        };

        Self {
            name,
            creation_timestamp: Utc::now().timestamp_micros() as f64 / 1000.0,
            origin: Instant::now(),
        }
    }

    /// Source name (frame or context name)
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Wall-clock creation time in milliseconds since the Unix epoch
    pub fn creation_timestamp(&self) -> f64 {
        self.creation_timestamp
    }

    /// Monotonic instant the source was created at
    pub fn origin(&self) -> Instant {
        self.origin
    }

    /// Milliseconds elapsed on the monotonic clock since the source was created
    pub fn elapsed_ms(&self) -> f64 {
        self.origin.elapsed().as_secs_f64() * 1000.0
    }
}

// ============================================
// Events
// ============================================

/// Lifecycle event kinds the collector understands.
///
/// Serialized as snake_case; the producers' own camelCase event names are
/// accepted when parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// An auction was started
    #[serde(alias = "auctionInit")]
    AuctionInit,
    /// A bidder responded to an auction
    #[serde(alias = "bidResponse")]
    BidResponse,
    /// An auction finished
    #[serde(alias = "auctionEnd")]
    AuctionEnd,
    /// A bid won its ad unit
    #[serde(alias = "bidWon")]
    BidWon,
    /// The winning creative rendered
    #[serde(alias = "adRenderSucceeded")]
    AdRenderSucceeded,
    /// The winning creative failed to render
    #[serde(alias = "adRenderFailed")]
    AdRenderFailed,
    /// GPT returned an ad response for a slot
    #[serde(alias = "slotResponseReceived")]
    SlotResponseReceived,
    /// GPT injected the slot's iframe
    #[serde(alias = "slotRenderEnded")]
    SlotRenderEnded,
    /// The slot's creative finished loading
    #[serde(alias = "slotOnLoad")]
    SlotOnLoad,
    /// The slot became viewable
    #[serde(alias = "impressionViewable")]
    ImpressionViewable,
}

impl EventKind {
    /// All kinds, in declaration order
    pub const ALL: [EventKind; 10] = [
        EventKind::AuctionInit,
        EventKind::BidResponse,
        EventKind::AuctionEnd,
        EventKind::BidWon,
        EventKind::AdRenderSucceeded,
        EventKind::AdRenderFailed,
        EventKind::SlotResponseReceived,
        EventKind::SlotRenderEnded,
        EventKind::SlotOnLoad,
        EventKind::ImpressionViewable,
    ];

    /// snake_case name used in summaries and logs
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::AuctionInit => "auction_init",
            EventKind::BidResponse => "bid_response",
            EventKind::AuctionEnd => "auction_end",
            EventKind::BidWon => "bid_won",
            EventKind::AdRenderSucceeded => "ad_render_succeeded",
            EventKind::AdRenderFailed => "ad_render_failed",
            EventKind::SlotResponseReceived => "slot_response_received",
            EventKind::SlotRenderEnded => "slot_render_ended",
            EventKind::SlotOnLoad => "slot_on_load",
            EventKind::ImpressionViewable => "impression_viewable",
        }
    }

    /// Event name as the producer emits it
    pub fn producer_name(&self) -> &'static str {
        match self {
            EventKind::AuctionInit => "auctionInit",
            EventKind::BidResponse => "bidResponse",
            EventKind::AuctionEnd => "auctionEnd",
            EventKind::BidWon => "bidWon",
            EventKind::AdRenderSucceeded => "adRenderSucceeded",
            EventKind::AdRenderFailed => "adRenderFailed",
            EventKind::SlotResponseReceived => "slotResponseReceived",
            EventKind::SlotRenderEnded => "slotRenderEnded",
            EventKind::SlotOnLoad => "slotOnLoad",
            EventKind::ImpressionViewable => "impressionViewable",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s || kind.producer_name() == s)
            .ok_or_else(|| Error::Config(format!("unknown event kind: {}", s)))
    }
}

/// A single recorded event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// What happened
    pub kind: EventKind,
    /// Milliseconds since the source was created
    pub timestamp: f64,
    /// Producer data, unvalidated
    pub payload: Payload,
}

impl Event {
    /// Look up a payload field
    pub fn field(&self, name: &str) -> Option<&serde_json::Value> {
        self.payload.get(name).filter(|v| !v.is_null())
    }
}

// ============================================
// Pairing
// ============================================

/// Pairs an origin kind with a terminal kind through a shared payload key.
///
/// The latency of a pair is `terminal.timestamp - origin.timestamp`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairingRule {
    /// Rule name, used as the key of latency statistics
    pub name: String,
    /// Kind that starts the measured interval
    pub origin: EventKind,
    /// Kind that ends the measured interval
    pub terminal: EventKind,
    /// Payload field holding the correlation key
    pub key: String,
}

impl PairingRule {
    pub fn new(
        name: impl Into<String>,
        origin: EventKind,
        terminal: EventKind,
        key: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            origin,
            terminal,
            key: key.into(),
        }
    }

    /// Default rules: Prebid win to render, and GPT response to render.
    pub fn defaults() -> Vec<PairingRule> {
        vec![
            PairingRule::new(
                "win_to_render",
                EventKind::BidWon,
                EventKind::AdRenderSucceeded,
                "adUnitCode",
            ),
            PairingRule::new(
                "response_to_render",
                EventKind::SlotResponseReceived,
                EventKind::SlotRenderEnded,
                "slot",
            ),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_source_name_falls_back() {
        let source = SourceHandle::new("  ");
        assert_eq!(source.name(), UNNAMED_SOURCE);

        let source = SourceHandle::new("ad-frame-1");
        assert_eq!(source.name(), "ad-frame-1");
        assert!(source.creation_timestamp() > 0.0);
    }

    #[test]
    fn test_event_kind_parses_both_spellings() {
        assert_eq!("bidWon".parse::<EventKind>().unwrap(), EventKind::BidWon);
        assert_eq!("bid_won".parse::<EventKind>().unwrap(), EventKind::BidWon);
        assert_eq!(
            "slotRenderEnded".parse::<EventKind>().unwrap(),
            EventKind::SlotRenderEnded
        );
        assert!("bidLost".parse::<EventKind>().is_err());
    }

    #[test]
    fn test_event_kind_serde_aliases() {
        let kind: EventKind = serde_json::from_str("\"adRenderSucceeded\"").unwrap();
        assert_eq!(kind, EventKind::AdRenderSucceeded);
        assert_eq!(
            serde_json::to_string(&EventKind::AdRenderSucceeded).unwrap(),
            "\"ad_render_succeeded\""
        );
    }

    #[test]
    fn test_event_field_ignores_null() {
        let mut payload = Payload::new();
        payload.insert("adUnitCode".to_string(), serde_json::Value::Null);
        let event = Event {
            kind: EventKind::BidWon,
            timestamp: 1.0,
            payload,
        };
        assert!(event.field("adUnitCode").is_none());
        assert!(event.field("bidder").is_none());
    }

    #[test]
    fn test_default_pairing_rules() {
        let rules = PairingRule::defaults();
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0].origin, EventKind::BidWon);
        assert_eq!(rules[0].terminal, EventKind::AdRenderSucceeded);
        assert_eq!(rules[0].key, "adUnitCode");
    }
}
