use crate::models::LoggingSettings;
use anyhow::{Context, Result};
use camino::Utf8Path;
use std::fs;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::fmt::{self, MakeWriter};
use tracing_subscriber::layer::{Layered, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

/// Build the level filter. `RUST_LOG` wins over the configured level.
fn env_filter(debug_mode: bool) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if debug_mode {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        }
    })
}

/// Create the log directory if needed.
fn prepare_log_dir(log_dir: &Utf8Path) -> Result<()> {
    if !log_dir.exists() {
        fs::create_dir_all(log_dir)
            .with_context(|| format!("Failed to create log directory: {}", log_dir))?;
    }
    Ok(())
}

/// Subscriber with the level filter applied ahead of every output layer
type FilteredRegistry = Layered<EnvFilter, Registry>;

/// An output layer chosen at runtime
type BoxedLayer = Box<dyn Layer<FilteredRegistry> + Send + Sync>;

/// Assemble the subscriber: the level filter, then the file layer (text or
/// JSON) and the optional console layer.
fn build_subscriber<W>(
    file_writer: W,
    settings: &LoggingSettings,
) -> Layered<Vec<BoxedLayer>, FilteredRegistry>
where
    W: for<'writer> MakeWriter<'writer> + Send + Sync + 'static,
{
    let file_layer = fmt::layer()
        .with_writer(file_writer)
        .with_ansi(false) // No ANSI codes in log files
        .with_target(true)
        .with_thread_names(true)
        .with_file(true)
        .with_line_number(true);

    let mut layers: Vec<BoxedLayer> = Vec::with_capacity(2);
    if settings.json {
        layers.push(file_layer.json().boxed());
    } else {
        layers.push(file_layer.boxed());
    }

    if settings.console {
        layers.push(fmt::layer().with_ansi(true).with_target(false).boxed());
    }

    tracing_subscriber::registry()
        .with(env_filter(settings.debug))
        .with(layers)
}

/// Setup logging with a daily rotating file and optional console output.
///
/// # Arguments
/// * `log_dir` - Directory for log files, already resolved by the caller
/// * `settings` - File prefix, level, console and JSON switches
///
/// # Returns
/// A guard that must be held for the duration of the program to keep logging active
pub fn setup_logging(log_dir: &Utf8Path, settings: &LoggingSettings) -> Result<WorkerGuard> {
    prepare_log_dir(log_dir)?;

    let file_appender = rolling::daily(log_dir, &settings.prefix);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    build_subscriber(non_blocking, settings)
        .try_init()
        .context("A global tracing subscriber is already installed")?;

    tracing::info!(
        "Logging initialized: dir={}, prefix={}, debug={}, console={}, json={}",
        log_dir,
        settings.prefix,
        settings.debug,
        settings.console,
        settings.json
    );

    Ok(guard)
}
