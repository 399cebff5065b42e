use anyhow::{bail, Context, Result};
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};

#[derive(Debug, Clone)]
pub struct LogOptions {
    pub level: String,
    pub file_enable: bool,
    pub dir: PathBuf,
    pub filename: String,
    pub rotate: String,
}

fn rotation(name: &str) -> Result<Rotation> {
    match name.to_ascii_lowercase().as_str() {
        "daily" => Ok(Rotation::DAILY),
        "hourly" => Ok(Rotation::HOURLY),
        "never" => Ok(Rotation::NEVER),
        other => bail!("Unknown log rotation '{}' (expected daily, hourly or never)", other),
    }
}

fn filter(level: &str) -> EnvFilter {
    EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Installs the global subscriber. Console output always goes to stderr since
/// stdout carries protocol messages.
///
/// The returned guard flushes the file writer on drop and must be held for the
/// life of the process.
pub fn init(opts: &LogOptions) -> Result<Option<WorkerGuard>> {
    tracing_log::LogTracer::init().context("Failed to bridge log records into tracing")?;

    let console = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(filter(&opts.level));

    let (file, guard) = if opts.file_enable {
        let appender = RollingFileAppender::builder()
            .rotation(rotation(&opts.rotate)?)
            .filename_prefix(&opts.filename)
            .build(&opts.dir)
            .with_context(|| format!("Failed to open log directory {}", opts.dir.display()))?;
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let layer = fmt::layer()
            .with_writer(writer)
            .with_ansi(false)
            .with_filter(filter(&opts.level));
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    let subscriber = Registry::default().with(console).with(file);
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to install tracing subscriber")?;
    Ok(guard)
}
