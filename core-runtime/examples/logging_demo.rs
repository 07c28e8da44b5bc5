//! Logging system demonstration
//!
//! Shows the output formats, host sink forwarding and path redaction.
//!
//! Run with:
//! ```bash
//! # Pretty format (default in debug)
//! cargo run -p core-runtime --example logging_demo
//!
//! # JSON format
//! cargo run -p core-runtime --example logging_demo -- json
//!
//! # Compact format with a custom filter
//! cargo run -p core-runtime --example logging_demo -- compact "logging_demo=trace"
//! ```

use bridge_traits::time::{ConsoleLogger, LogLevel};
use core_runtime::logging::{init_logging, strip_path, LogFormat, LoggingConfig};
use std::env;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, span, trace, warn, Level};

#[tokio::main]
async fn main() {
    let args: Vec<String> = env::args().collect();

    let format = match args.get(1).map(String::as_str) {
        Some("json") => LogFormat::Json,
        Some("compact") => LogFormat::Compact,
        _ => LogFormat::Pretty,
    };

    let mut config = LoggingConfig::default()
        .with_format(format)
        .with_level(LogLevel::Trace)
        .with_logger_sink(Arc::new(ConsoleLogger {
            min_level: LogLevel::Warn,
        }))
        .with_path_redaction(true)
        .with_thread_info(true);

    if let Some(filter) = args.get(2) {
        config = config.with_filter(filter.clone());
    }

    init_logging(config).expect("Failed to initialize logging");

    info!(format = ?format, "Logging initialized");

    demo_log_levels();
    demo_playback_spans();
    demo_path_redaction();

    info!("Demo complete");
}

fn demo_log_levels() {
    let span = span!(Level::INFO, "log_levels");
    let _enter = span.enter();

    trace!("This is a TRACE level log");
    debug!("This is a DEBUG level log");
    info!("This is an INFO level log");
    warn!("This is a WARN level log, also forwarded to the host sink");
    error!("This is an ERROR level log, also forwarded to the host sink");
}

fn demo_playback_spans() {
    let span = span!(Level::INFO, "playback", track = "track-1");
    let _enter = span.enter();

    info!(backend = "native", start_position = 0.0, "Playing track");
    schedule_chunk(0, 44_100, true);
    schedule_chunk(44_100, 441_000, false);
    info!("Track playback completed");
}

#[instrument(level = "debug")]
fn schedule_chunk(first_frame: i64, frames: i64, immediate: bool) {
    trace!("Scheduling segment");
}

fn demo_path_redaction() {
    let path = "/home/user/Music/Album/01 Intro.flac";

    // Forwarded entries have path-like fields reduced to the file name
    warn!(file = path, "Native backend refused file");
    info!(file = %strip_path(path), "Opened generic context");
}
