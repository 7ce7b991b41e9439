//! Logging setup (ADR-050)
//!
//! - `RUST_LOG` overrides the default `fleetscan=info` filter
//! - `FLEETSCAN_LOG_FORMAT=json` switches stdout to JSON lines
//! - `FLEETSCAN_LOG_DIR` adds a daily-rolling JSON file

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter, Layer, Registry};

const DEFAULT_FILTER: &str = "fleetscan=info";
const LOG_FILE_PREFIX: &str = "fleetscand.log";

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(DEFAULT_FILTER))
        .expect("Failed to create env filter")
}

/// Install the global subscriber
///
/// The returned guard flushes the file writer on drop; hold it for the
/// process lifetime.
pub fn init() -> Option<WorkerGuard> {
    let log_format = std::env::var("FLEETSCAN_LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string());
    let mut layers: Vec<BoxedLayer> = Vec::new();

    match log_format.as_str() {
        // Production: JSON structured logging
        "json" => layers.push(fmt::layer().json().with_filter(env_filter()).boxed()),
        // Development: Pretty formatting with colors
        _ => layers.push(fmt::layer().pretty().with_filter(env_filter()).boxed()),
    }

    let guard = match std::env::var("FLEETSCAN_LOG_DIR") {
        Ok(dir) => {
            let dir = shellexpand::tilde(&dir).into_owned();
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            layers.push(
                fmt::layer()
                    .json()
                    .with_ansi(false)
                    .with_writer(writer)
                    .with_filter(env_filter())
                    .boxed(),
            );
            Some(guard)
        }
        Err(_) => None,
    };

    tracing_subscriber::registry().with(layers).init();
    guard
}
