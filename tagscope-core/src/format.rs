//! Text rendering of summaries.

use std::fmt::Write;

use chrono::{TimeZone, Utc};

use crate::summary::Summary;

/// Format milliseconds with two decimals (e.g., "12.50ms").
pub fn format_ms(ms: f64) -> String {
    format!("{:.2}ms", ms)
}

/// Format an optional duration, or an em dash if missing.
pub fn format_ms_opt(ms: Option<f64>) -> String {
    match ms {
        Some(ms) => format_ms(ms),
        None => "\u{2014}".to_string(),
    }
}

/// Format a wall-clock timestamp in ms since the Unix epoch as UTC.
pub fn format_epoch_ms(ms: f64) -> String {
    match Utc.timestamp_millis_opt(ms as i64).single() {
        Some(at) => at.format("%Y-%m-%d %H:%M:%S%.3f UTC").to_string(),
        None => format_ms(ms),
    }
}

/// Render a multi-line performance report for a summary.
pub fn render_summary(summary: &Summary) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "Performance Summary for frame: {}", summary.source);
    let _ = writeln!(
        out,
        "  Frame Load Time: {}",
        format_epoch_ms(summary.source_created_at)
    );
    let _ = writeln!(out, "  Generated at:   {}", format_ms(summary.generated_at));
    let _ = writeln!(out, "  Total Events:   {}", summary.total_events);

    for (kind, count) in &summary.counts {
        let _ = writeln!(out, "    {:<24} {}", kind.as_str(), count);
    }

    for (rule, stats) in &summary.latency_stats {
        let _ = writeln!(
            out,
            "  {}: n={} min={} mean={} max={}",
            rule,
            stats.count,
            format_ms(stats.min_ms),
            format_ms(stats.mean_ms),
            format_ms(stats.max_ms)
        );
    }

    for (idx, win) in summary.wins.iter().enumerate() {
        let _ = writeln!(out, "  Bid Win {}:", idx + 1);
        let _ = writeln!(out, "    Bidder: {}", win.bidder.as_deref().unwrap_or("unknown"));
        let _ = writeln!(
            out,
            "    CPM: {}",
            win.cpm.map(|c| c.to_string()).unwrap_or_else(|| "\u{2014}".to_string())
        );
        let _ = writeln!(out, "    Ad Unit: {}", win.ad_unit.as_deref().unwrap_or("unknown"));
        let _ = writeln!(out, "    Time to win: {}", format_ms(win.won_at));
        if win.time_to_render_ms.is_some() {
            let _ = writeln!(out, "    Time to render: {}", format_ms_opt(win.time_to_render_ms));
            let _ = writeln!(
                out,
                "    Total time (load\u{2192}render): {}",
                format_ms_opt(win.load_to_render_ms)
            );
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Event, EventKind, PairingRule, Payload, SourceHandle};
    use serde_json::json;

    fn event(kind: EventKind, timestamp: f64, payload: serde_json::Value) -> Event {
        Event {
            kind,
            timestamp,
            payload: payload.as_object().cloned().unwrap_or_else(Payload::new),
        }
    }

    #[test]
    fn test_format_ms() {
        assert_eq!(format_ms(12.5), "12.50ms");
        assert_eq!(format_ms_opt(None), "\u{2014}");
        assert_eq!(format_epoch_ms(1_500.0), "1970-01-01 00:00:01.500 UTC");
    }

    #[test]
    fn test_render_summary() {
        let events = vec![
            event(
                EventKind::BidWon,
                100.0,
                json!({"adUnitCode": "top", "bidder": "appnexus", "cpm": 0.5}),
            ),
            event(EventKind::AdRenderSucceeded, 140.0, json!({"adUnitCode": "top"})),
        ];
        let mut summary = Summary::compute(
            &SourceHandle::new("frame-c"),
            &events,
            &PairingRule::defaults(),
            200.0,
        );
        summary.source_created_at = 0.0;

        let text = render_summary(&summary);
        assert!(text.starts_with("Performance Summary for frame: frame-c"));
        assert!(text.contains("Frame Load Time: 1970-01-01 00:00:00.000 UTC"));
        assert!(text.contains("Total Events:   2"));
        assert!(text.contains("bid_won"));
        assert!(text.contains("win_to_render: n=1 min=40.00ms"));
        assert!(text.contains("Bidder: appnexus"));
        assert!(text.contains("Time to render: 40.00ms"));
        assert!(text.contains("render): 140.00ms"));
    }
}
