//! tagscope - summarize captured ad-tech instrumentation events
//!
//! This tool provides commands for:
//! - Summarizing a recorded event capture (JSON Lines)
//! - Playing a capture back in real time with a scheduled auto summary
//! - Showing the effective collector configuration
//!
//! Uses XDG Base Directory specification for file locations:
//! - Config: $XDG_CONFIG_HOME/tagscope/config.toml (~/.config/tagscope/config.toml)
//! - Logs: $XDG_STATE_HOME/tagscope/tagscope.log (~/.local/state/tagscope/tagscope.log)

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tagscope_core::capture::{self, CapturedEvent};
use tagscope_core::collector::ChannelSink;
use tagscope_core::format::render_summary;
use tagscope_core::{Collector, Config, Summary};

#[derive(Parser)]
#[command(name = "tagscope")]
#[command(about = "Summarize captured ad-tech instrumentation events")]
#[command(version)]
struct Args {
    /// Verbose output (writes a log file)
    #[arg(short, long)]
    verbose: bool,

    /// Config file to use instead of the default location
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Replay a capture and print its summary
    Summarize {
        /// JSON Lines capture file
        capture: PathBuf,

        /// Source (frame) name for the summary
        #[arg(short, long)]
        source: Option<String>,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Play a capture back in real time and print the auto summary
    Play {
        /// JSON Lines capture file
        capture: PathBuf,

        /// Source (frame) name for the summary
        #[arg(short, long)]
        source: Option<String>,

        /// Auto summary delay in milliseconds (default: from config)
        #[arg(short, long)]
        delay_ms: Option<u64>,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Show collector configuration
    Status,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    }
    .context("failed to load configuration")?;

    // Keep the guard alive for the whole run so buffered lines get flushed
    let _log_guard = if args.verbose {
        Some(
            tagscope_core::logging::init(&config.logging)
                .context("failed to initialize logging")?,
        )
    } else {
        None
    };

    match args.command {
        Command::Summarize {
            capture,
            source,
            format,
        } => cmd_summarize(&config, &capture, source.as_deref(), format),
        Command::Play {
            capture,
            source,
            delay_ms,
            format,
        } => cmd_play(&config, &capture, source.as_deref(), delay_ms, format).await,
        Command::Status => cmd_status(&config),
    }
}

fn load(path: &Path) -> Result<Vec<CapturedEvent>> {
    capture::load_capture(path).with_context(|| format!("failed to read capture {}", path.display()))
}

fn print_summary(summary: &Summary, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => print!("{}", render_summary(summary)),
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(summary).context("failed to encode summary")?;
            println!("{}", json);
        }
    }
    Ok(())
}

fn cmd_summarize(
    config: &Config,
    path: &Path,
    source: Option<&str>,
    format: OutputFormat,
) -> Result<()> {
    let events = load(path)?;
    let collector = Collector::from_config(config, source);

    tracing::info!(
        source = %collector.source().name(),
        events = events.len(),
        "Replaying capture"
    );
    capture::replay(&collector, events);

    print_summary(&collector.summarize(), format)
}

async fn cmd_play(
    config: &Config,
    path: &Path,
    source: Option<&str>,
    delay_ms: Option<u64>,
    format: OutputFormat,
) -> Result<()> {
    let events = load(path)?;
    let collector = Collector::from_config(config, source);
    let delay = delay_ms
        .map(Duration::from_millis)
        .unwrap_or_else(|| config.collector.auto_summary_delay());

    let (sink, mut rx) = ChannelSink::channel();
    collector.schedule_auto_summary(delay, sink);

    let origin = collector.source().origin();
    let deadline = origin.checked_add(delay);
    let mut late = 0usize;

    for event in events {
        let due = Duration::try_from_secs_f64(event.at_ms.unwrap_or(0.0).max(0.0) / 1000.0)
            .ok()
            .and_then(|offset| origin.checked_add(offset));
        // Offsets too large for an instant count as late
        let due = match (due, deadline) {
            (Some(due), Some(deadline)) if due < deadline => due,
            (Some(due), None) => due,
            _ => {
                late += 1;
                continue;
            }
        };
        tokio::time::sleep_until(due).await;
        collector.record(event.kind, event.payload);
    }

    if late > 0 {
        tracing::info!(late, "Capture events fall after the auto summary; skipping");
        eprintln!(
            "{} event(s) fall after the {}ms auto summary and were skipped",
            late,
            delay.as_millis()
        );
    }

    let message = rx
        .recv()
        .await
        .context("auto summary was never delivered")?;

    print_summary(&message.payload, format)
}

fn cmd_status(config: &Config) -> Result<()> {
    println!("tagscope Collector Configuration");
    println!("================================");
    println!();

    let collector = &config.collector;
    println!("Config File:     {}", Config::config_path().display());
    println!(
        "Source Name:     {}",
        collector.source_name.as_deref().unwrap_or("<not set>")
    );
    println!("Poll Interval:   {}ms", collector.poll_interval_ms);
    if collector.max_attempts == 0 {
        println!("Max Attempts:    unbounded");
    } else {
        println!("Max Attempts:    {}", collector.max_attempts);
    }
    println!("Auto Summary:    {}ms", collector.auto_summary_delay_ms);
    println!("Log Level:       {}", config.logging.level);
    println!("Log File:        {}", Config::log_path().display());

    println!();
    println!("Pairing Rules");
    println!("-------------");
    println!("{:<24} {:<24} {:<24} {}", "Name", "Origin", "Terminal", "Key");
    for rule in config.pairing_rules() {
        println!(
            "{:<24} {:<24} {:<24} {}",
            rule.name,
            rule.origin.as_str(),
            rule.terminal.as_str(),
            rule.key
        );
    }

    Ok(())
}
