//! # tagscope-core
//!
//! Core library for tagscope - an instrumentation collector for third-party
//! ad-tech integrations (Prebid.js auctions, Google Publisher Tag slots).
//!
//! This library provides:
//! - Domain types for sources, events and pairing rules
//! - An event collector that waits for a late or absent producer, buffers
//!   its events and summarizes them on demand or on a timer
//! - Delivery sinks for handing summaries across a context boundary
//! - Configuration management
//! - Logging infrastructure
//!
//! ## Example
//!
//! ```rust,no_run
//! use tagscope_core::{Collector, Config, EventKind, Payload};
//!
//! let config = Config::load().expect("failed to load config");
//! let collector = Collector::from_config(&config, Some("ad-frame"));
//!
//! collector.record(EventKind::BidWon, Payload::new());
//! let summary = collector.summarize();
//! println!("{}", tagscope_core::format::render_summary(&summary));
//! ```

// Re-export commonly used items at the crate root
pub use collector::{Collector, PollPolicy, ProducerState, Recorder};
pub use config::Config;
pub use error::{Error, Result};
pub use summary::Summary;
pub use types::*;

// Public modules
pub mod capture;
pub mod collector;
pub mod config;
pub mod error;
pub mod format;
pub mod logging;
pub mod summary;
pub mod types;
