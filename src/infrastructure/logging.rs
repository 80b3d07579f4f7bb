use std::{
    fs::{self, File, OpenOptions},
    io,
    path::{Path, PathBuf},
    sync::Arc,
};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub const LOG_FILE_NAME: &str = "latest.log";
/// The log file is dropped at startup once it grows past this size.
pub const MAX_LOG_FILE_BYTES: u64 = 5 * 1024 * 1024;

/// Keeps the session log file open; flushes it to disk when dropped.
pub struct LogGuard {
    path: PathBuf,
    file: Arc<File>,
}

impl LogGuard {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for LogGuard {
    fn drop(&mut self) {
        if let Err(e) = self.file.sync_all() {
            eprintln!("Failed to flush {}: {}", self.path.display(), e);
        }
    }
}

/// Installs the global subscriber: plain text to `<log_dir>/latest.log` and
/// to stderr, filtered by `RUST_LOG` (default `info`).
pub fn init(log_dir: &Path) -> io::Result<LogGuard> {
    fs::create_dir_all(log_dir)?;
    let path = log_dir.join(LOG_FILE_NAME);
    truncate_if_oversized(&path, MAX_LOG_FILE_BYTES)?;

    let file = Arc::new(OpenOptions::new().create(true).append(true).open(&path)?);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_ansi(false).with_writer(file.clone()))
        .with(fmt::layer().with_writer(io::stderr))
        .try_init()
        .map_err(io::Error::other)?;

    Ok(LogGuard { path, file })
}

/// Removes the log file if it is larger than `max_bytes`. A missing file is fine.
pub fn truncate_if_oversized(path: &Path, max_bytes: u64) -> io::Result<bool> {
    match fs::metadata(path) {
        Ok(meta) if meta.len() > max_bytes => {
            fs::remove_file(path)?;
            Ok(true)
        }
        Ok(_) => Ok(false),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}
