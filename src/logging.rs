// SPDX-License-Identifier: Apache-2.0

//! Process-wide log setup for agents embedding this crate.
//!
//! The library itself only emits `tracing` events; installing a subscriber
//! is left to the host process.

use std::io::{self, IsTerminal};

use tracing::level_filters::LevelFilter;
use tracing_bunyan_formatter::{BunyanFormattingLayer, JsonStorageLayer};
use tracing_log::LogTracer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{EnvFilter, Registry};

/// Must be held for as long as logs should be flushed.
pub type LoggerGuard = tracing_appender::non_blocking::WorkerGuard;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Install the global subscriber, writing to stdout through a non-blocking
/// writer. The filter defaults to `INFO` and honours `RUST_LOG`.
pub fn setup_logging(
    log_format: LogFormat,
) -> Result<LoggerGuard, Box<dyn std::error::Error + Send + Sync>> {
    LogTracer::init()?;

    let (non_blocking_writer, guard) = tracing_appender::non_blocking(io::stdout());

    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env()?;

    match log_format {
        LogFormat::Json => {
            let app_name = format!("{}-{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
            let bunyan_formatting_layer = BunyanFormattingLayer::new(app_name, non_blocking_writer);

            let subscriber = Registry::default()
                .with(filter)
                .with(JsonStorageLayer)
                .with(bunyan_formatting_layer);
            tracing::subscriber::set_global_default(subscriber)?;
        }
        LogFormat::Text => {
            // Skip color codes when not in a terminal
            let use_ansi = io::stdout().is_terminal();

            let fmt_layer = tracing_subscriber::fmt::layer()
                .with_writer(non_blocking_writer)
                .with_target(false)
                .with_level(true)
                .with_ansi(use_ansi)
                .compact();

            let subscriber = Registry::default().with(filter).with(fmt_layer);
            tracing::subscriber::set_global_default(subscriber)?;
        }
    }

    Ok(guard)
}
