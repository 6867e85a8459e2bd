//! Diagnostic logging on stderr.
//!
//! The filter comes from `SEEDLAB_LOG`, then `RUST_LOG`, then the configured
//! level. Stdout carries command output only.

use std::io::IsTerminal;

use seedlab_engine::{LogFormat, LogSettings};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

pub(crate) const LOG_ENV: &str = "SEEDLAB_LOG";

fn filter(settings: &LogSettings) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(&settings.level))
}

pub(crate) fn init_logging(settings: &LogSettings) {
    let filter = filter(settings);
    // A second initialization (tests, embedding) keeps the first subscriber.
    let _ = match settings.format {
        LogFormat::Human => tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(false)
                    .with_ansi(std::io::stderr().is_terminal()),
            )
            .try_init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init(),
    };
}
