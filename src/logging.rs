use anyhow::{Context, Result};
use std::{
    fs::{File, OpenOptions},
    path::Path,
    sync::Arc,
};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Sends log output to stdout and appends a plain-text copy to `log_path`.
///
/// The level comes from `RUST_LOG`, defaulting to `info`.
pub fn init(log_path: &Path) -> Result<()> {
    let file = open_log_file(log_path)?;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(fmt::layer().with_ansi(false).with_writer(Arc::new(file)))
        .try_init()
        .context("Failed to install log subscriber")
}

pub fn open_log_file(log_path: &Path) -> Result<File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)
        .with_context(|| format!("Failed to open log file {}", log_path.display()))
}
