//! # Logging
//!
//! One-time `tracing` subscriber setup shared by both binaries.
//!
//! Filter precedence: `LOG_LEVEL`, then `RUST_LOG`, then a default derived
//! from the deployment environment (`PINGWATCH_ENV`, falling back to
//! `APP_ENV`). Production logs at `info`, everything else at `debug`.
//!
//! `LOG_FORMAT=json` switches the console layer to newline-delimited JSON.

use std::io::IsTerminal;
use std::sync::OnceLock;

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

static TRACING_INITIALIZED: OnceLock<()> = OnceLock::new();

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LogFormat {
    Text,
    Json,
}

/// Install the global subscriber. Safe to call more than once; later calls
/// are no-ops.
pub fn init_tracing() {
    TRACING_INITIALIZED.get_or_init(|| {
        let environment = get_environment();
        let log_level = log_level_from(
            std::env::var("LOG_LEVEL").ok(),
            std::env::var("RUST_LOG").ok(),
            &environment,
        );
        let format = log_format_from(std::env::var("LOG_FORMAT").ok());

        let use_ansi = IsTerminal::is_terminal(&std::io::stdout());

        let console_layer = match format {
            LogFormat::Json => fmt::layer()
                .json()
                .with_target(true)
                .with_current_span(true)
                .with_filter(EnvFilter::new(&log_level))
                .boxed(),
            LogFormat::Text => fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_level(true)
                .with_ansi(use_ansi)
                .with_filter(EnvFilter::new(&log_level))
                .boxed(),
        };

        let subscriber = tracing_subscriber::registry().with(console_layer);

        if subscriber.try_init().is_err() {
            tracing::debug!(
                "Global tracing subscriber already initialized - continuing with existing subscriber"
            );
        } else {
            tracing::info!(
                environment = %environment,
                level = %log_level,
                format = ?format,
                "Tracing initialized"
            );
        }
    });
}

fn get_environment() -> String {
    std::env::var("PINGWATCH_ENV")
        .or_else(|_| std::env::var("APP_ENV"))
        .unwrap_or_else(|_| "development".to_string())
}

fn log_level_from(
    log_level: Option<String>,
    rust_log: Option<String>,
    environment: &str,
) -> String {
    let explicit = log_level
        .into_iter()
        .chain(rust_log)
        .map(|value| value.trim().to_lowercase())
        .find(|value| !value.is_empty());

    if let Some(level) = explicit {
        return level;
    }

    match environment {
        "production" => "info".to_string(),
        _ => "debug".to_string(),
    }
}

fn log_format_from(value: Option<String>) -> LogFormat {
    match value.as_deref().map(str::trim) {
        Some(v) if v.eq_ignore_ascii_case("json") => LogFormat::Json,
        _ => LogFormat::Text,
    }
}
