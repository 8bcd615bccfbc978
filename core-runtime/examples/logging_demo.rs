//! Logging system demonstration
//!
//! Run with:
//! ```bash
//! # Pretty format (default in debug)
//! cargo run --example logging_demo
//!
//! # JSON format
//! cargo run --example logging_demo -- json
//!
//! # Compact format with a custom filter
//! cargo run --example logging_demo -- compact "logging_demo=trace"
//! ```

use core_runtime::logging::{init_logging, strip_path, LogFormat, LogLevel, LoggingConfig};
use std::env;
use tracing::{debug, error, info, info_span, instrument, trace, warn};

fn main() {
    let args: Vec<String> = env::args().collect();

    let format = match args.get(1).map(String::as_str) {
        Some("json") => LogFormat::Json,
        Some("compact") => LogFormat::Compact,
        _ => LogFormat::Pretty,
    };

    let mut config = LoggingConfig::default()
        .with_format(format)
        .with_level(LogLevel::Trace);
    match args.get(2) {
        Some(filter) => config = config.with_filter(filter.clone()),
        None => config = config.with_filter("logging_demo=trace"),
    }

    if let Err(e) = init_logging(config) {
        eprintln!("Failed to initialize logging: {}", e);
        return;
    }

    info!("Organizer logging demo");

    let span = info_span!("run", run_id = "demo-run");
    let _enter = span.enter();

    for path in [
        "/downloads/123456.5f2a9c.zip",
        "/downloads/777.beef.rar",
        "/downloads/holiday photos.zip",
    ] {
        process(path);
    }

    warn!(failed = 1, "Failure ledger written");
}

#[instrument]
fn process(path: &str) {
    let file = strip_path(path);
    trace!(file, "Dequeued");

    if !file.starts_with(|c: char| c.is_ascii_digit()) {
        error!(file, reason = "Invalid filename format", "Task failed");
        return;
    }

    debug!(file, categories = ?["Furniture", "Chair"], "Found model");
    info!(file, folder = "Furniture/Chair", "Archive placed");
}
