//! Log file setup for the terminal client.
//!
//! The terminal belongs to the UI, so events go to `shopsync.log` in the
//! configured directory. `RUST_LOG` selects what is recorded.

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use color_eyre::eyre::{Result, WrapErr};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

pub const LOG_FILE_NAME: &str = "shopsync.log";
const DEFAULT_FILTER: &str = "shopsync=info";

/// Installs the global subscriber, appending to `<log_dir>/shopsync.log`.
///
/// Returns the path of the log file. Calling this again after a subscriber
/// is installed leaves the first one in place.
///
/// # Errors
///
/// Returns an error if the directory or file cannot be created.
pub fn init(log_dir: &Path) -> Result<PathBuf> {
    fs::create_dir_all(log_dir)
        .wrap_err_with(|| format!("failed to create log directory {}", log_dir.display()))?;

    let path = log_dir.join(LOG_FILE_NAME);
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .wrap_err_with(|| format!("failed to open log file {}", path.display()))?;

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let file_layer = fmt::layer()
        .with_writer(Mutex::new(file))
        .with_target(true)
        .with_ansi(false);

    // Already installed (e.g. by a test harness): keep that one.
    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .try_init();

    Ok(path)
}
