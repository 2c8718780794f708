//! Tracing subscriber setup.
//!
//! `RUST_LOG` always wins over the configured level. Console output goes to
//! stderr so commands that print documents to stdout stay pipeable.

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use crate::config::{LogFormat, LoggingSection};

const LOG_FILE_PREFIX: &str = "shopfloor.log";

/// Directive used when `RUST_LOG` is unset.
fn default_directive(logging: &LoggingSection, verbose: bool) -> String {
    if verbose {
        "debug".to_string()
    } else {
        logging.level.clone()
    }
}

/// Install the global subscriber. Keep the returned guard alive for the
/// life of the process or buffered file output is lost.
pub fn init(logging: &LoggingSection, verbose: bool) -> Result<Option<WorkerGuard>> {
    let directive = default_directive(logging, verbose);
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&directive)
            .with_context(|| format!("Invalid log level '{}'", directive))?,
    };

    let (pretty, json) = match logging.log_format() {
        LogFormat::Pretty => (Some(fmt::layer().with_writer(std::io::stderr)), None),
        LogFormat::Json => (
            None,
            Some(fmt::layer().json().with_writer(std::io::stderr)),
        ),
    };

    let (file, guard) = match &logging.directory {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().json().with_ansi(false).with_writer(writer)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(pretty)
        .with(json)
        .with(file)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(guard)
}
