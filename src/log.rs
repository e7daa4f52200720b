use crate::error::{BackupError, Result};
use chrono::{Local, NaiveDate};
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

pub fn log_file_name(date: NaiveDate) -> String {
    format!("backup_{}.log", date.format("%Y%m%d"))
}

/// Installs the global subscriber: stdout plus an appended per-day file in
/// `log_dir`. `RUST_LOG` overrides the default `info` level.
pub fn init(log_dir: &Path) -> Result<PathBuf> {
    fs::create_dir_all(log_dir)?;
    let path = log_dir.join(log_file_name(Local::now().date_naive()));
    let file = OpenOptions::new().create(true).append(true).open(&path)?;

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().with_target(false))
        .with(
            fmt::layer()
                .with_target(false)
                .with_ansi(false)
                .with_writer(Mutex::new(file)),
        )
        .try_init()
        .map_err(|e| BackupError::Config(format!("failed to install logger: {}", e)))?;

    Ok(path)
}
