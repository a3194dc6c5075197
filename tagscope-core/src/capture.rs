//! Recorded event captures in JSON Lines format
//!
//! Each non-blank line that doesn't start with `#` is one event:
//!
//! ```text
//! {"kind": "bidWon", "at_ms": 812.4, "payload": {"adUnitCode": "top", "cpm": 1.2}}
//! ```
//!
//! `kind` accepts the snake_case or producer spelling. `at_ms` is optional;
//! events without one are stamped when they are replayed.

use std::io::BufRead;
use std::path::Path;

use serde::Deserialize;

use crate::collector::Collector;
use crate::error::{Error, Result};
use crate::types::{EventKind, Payload};

/// One captured event
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CapturedEvent {
    pub kind: EventKind,
    /// Capture timestamp, ms since the source was created
    #[serde(default)]
    pub at_ms: Option<f64>,
    #[serde(default)]
    pub payload: Payload,
}

/// Parse a capture from any buffered reader
pub fn read_capture<R: BufRead>(reader: R) -> Result<Vec<CapturedEvent>> {
    let mut events = Vec::new();

    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let event: CapturedEvent = serde_json::from_str(trimmed).map_err(|e| Error::Capture {
            line: idx + 1,
            message: e.to_string(),
        })?;
        events.push(event);
    }

    Ok(events)
}

/// Parse a capture file
pub fn load_capture(path: &Path) -> Result<Vec<CapturedEvent>> {
    let file = std::fs::File::open(path)?;
    let events = read_capture(std::io::BufReader::new(file))?;
    tracing::debug!(path = %path.display(), events = events.len(), "Loaded capture");
    Ok(events)
}

/// Feed captured events into a collector in capture order
pub fn replay(collector: &Collector, events: Vec<CapturedEvent>) {
    for event in events {
        match event.at_ms {
            Some(at) => collector.record_at(event.kind, at, event.payload),
            None => collector.record(event.kind, event.payload),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PairingRule, SourceHandle};

    const CAPTURE: &str = r#"
# frame: ad-frame-1
{"kind": "auctionInit", "at_ms": 5.0, "payload": {"auctionId": "a-1"}}
{"kind": "bid_won", "at_ms": 40.0, "payload": {"adUnitCode": "top", "bidder": "appnexus", "cpm": 1.5}}

{"kind": "adRenderSucceeded", "at_ms": 65.0, "payload": {"adUnitCode": "top"}}
{"kind": "auctionEnd"}
"#;

    #[test]
    fn test_read_capture() {
        let events = read_capture(CAPTURE.as_bytes()).unwrap();
        assert_eq!(events.len(), 4);
        assert_eq!(events[0].kind, EventKind::AuctionInit);
        assert_eq!(events[1].at_ms, Some(40.0));
        assert_eq!(events[3].at_ms, None);
        assert!(events[3].payload.is_empty());
    }

    #[test]
    fn test_read_capture_reports_line() {
        let input = "{\"kind\": \"bidWon\"}\n{\"kind\": \"bidLost\"}\n";
        match read_capture(input.as_bytes()) {
            Err(Error::Capture { line, .. }) => assert_eq!(line, 2),
            other => panic!("expected capture error, got {:?}", other),
        }
    }

    #[test]
    fn test_replay_into_collector() {
        let collector = Collector::new(SourceHandle::new("ad-frame-1"), PairingRule::defaults());
        replay(&collector, read_capture(CAPTURE.as_bytes()).unwrap());

        let summary = collector.summarize();
        assert_eq!(summary.total_events, 4);
        assert_eq!(summary.latency_stats["win_to_render"].mean_ms, 25.0);
        assert_eq!(summary.wins[0].time_to_render_ms, Some(25.0));
    }
}
