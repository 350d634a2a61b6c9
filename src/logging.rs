// src/logging.rs
//
// Timestamped stderr logging. `init_file_logging` mirrors every line into a
// per-run file until the returned guard is dropped.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Mirror target for `tlog!`. `None` while file logging is off.
pub static LOG_FILE: Mutex<Option<File>> = Mutex::new(None);

const RUN_LOG_SUFFIX: &str = "-vitalwatch.log";
const LATEST_LINK: &str = "vitalwatch.log";

/// `HH:MM:SS.mmm` in local time
pub fn timestamp() -> String {
    chrono::Local::now().format("%H:%M:%S%.3f").to_string()
}

/// Write one timestamped line to stderr and, when enabled, the run log.
pub fn write_line(message: &str) {
    let line = format!("{} {}", timestamp(), message);
    eprintln!("{}", line);
    if let Ok(mut guard) = LOG_FILE.lock() {
        if let Some(file) = guard.as_mut() {
            let _ = writeln!(file, "{}", line);
        }
    }
}

/// Keeps file logging on. Dropping it closes the run log.
#[must_use = "file logging stops when the guard is dropped"]
pub struct FileLogGuard {
    path: PathBuf,
}

impl FileLogGuard {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for FileLogGuard {
    fn drop(&mut self) {
        stop_file_logging();
    }
}

/// Start a new run log in `log_dir`, keeping at most `keep` run logs there
/// (the new one included). On Unix `vitalwatch.log` points at the newest.
pub fn init_file_logging(log_dir: &Path, keep: usize) -> std::io::Result<FileLogGuard> {
    std::fs::create_dir_all(log_dir)?;

    let filename = format!("{}{}", chrono::Local::now().format("%Y%m%d-%H%M%S"), RUN_LOG_SUFFIX);
    let path = log_dir.join(&filename);
    let file = std::fs::OpenOptions::new().create(true).append(true).open(&path)?;

    let removed = prune_run_logs(log_dir, keep.max(1))?;

    #[cfg(unix)]
    {
        let link = log_dir.join(LATEST_LINK);
        let _ = std::fs::remove_file(&link);
        if let Err(e) = std::os::unix::fs::symlink(&filename, &link) {
            eprintln!("{} [logging] Failed to link {}: {}", timestamp(), LATEST_LINK, e);
        }
    }

    match LOG_FILE.lock() {
        Ok(mut guard) => *guard = Some(file),
        Err(poisoned) => *poisoned.into_inner() = Some(file),
    }

    write_line(&format!(
        "[logging] Run log {} ({} old logs removed)",
        path.display(),
        removed
    ));
    Ok(FileLogGuard { path })
}

/// Stop mirroring to the run log. Safe to call when logging is off.
pub fn stop_file_logging() {
    let closed = match LOG_FILE.lock() {
        Ok(mut guard) => guard.take().is_some(),
        Err(poisoned) => poisoned.into_inner().take().is_some(),
    };
    if closed {
        eprintln!("{} [logging] Run log closed", timestamp());
    }
}

/// Delete the oldest run logs so that `keep` remain. Returns how many went.
fn prune_run_logs(log_dir: &Path, keep: usize) -> std::io::Result<usize> {
    let mut logs: Vec<PathBuf> = std::fs::read_dir(log_dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .map_or(false, |name| name.ends_with(RUN_LOG_SUFFIX))
        })
        .collect();
    if logs.len() <= keep {
        return Ok(0);
    }

    // Names start with the run's timestamp, so name order is age order
    logs.sort();
    let excess = logs.len() - keep;
    for old in &logs[..excess] {
        std::fs::remove_file(old)?;
    }
    Ok(excess)
}

/// Timestamped logging macro: `tlog!("[monitor] {}", x)`.
#[macro_export]
macro_rules! tlog {
    ($($arg:tt)*) => {
        $crate::logging::write_line(&format!($($arg)*))
    };
}
