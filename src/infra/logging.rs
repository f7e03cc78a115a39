//! Tracing setup.
//!
//! The TUI owns the terminal, so in that mode events go to a per-launch file
//! under the log directory. Headless commands log to stderr instead.

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::SystemTime;
use thiserror::Error;
use time::OffsetDateTime;
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::{EnvFilter, Registry, fmt, prelude::*};

const MAX_LOG_FILES: usize = 10;
const LOG_FILE_PREFIX: &str = "renderbox";
const FILTER_ENV: &str = "RENDERBOX_LOG";

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("failed to prepare log directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to read log directory {path}: {source}")]
    ReadDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to remove old log file {path}: {source}")]
    RemoveFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to create log file at {path}: {source}")]
    CreateLogFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to format log filename time: {0}")]
    FormatTime(#[from] time::error::Format),

    #[error("failed to install global tracing subscriber: {0}")]
    SetGlobal(#[from] tracing::subscriber::SetGlobalDefaultError),
}

#[derive(Clone, Debug)]
pub enum LogTarget {
    File(PathBuf),
    Stderr,
}

/// Installs the global subscriber. Returns the log file path in file mode.
///
/// Later calls are no-ops.
pub fn init_logging(target: LogTarget) -> Result<Option<PathBuf>, LoggingError> {
    if LOG_GUARD.get().is_some() {
        return Ok(None);
    }

    match target {
        LogTarget::Stderr => {
            let subscriber = Registry::default()
                .with(build_env_filter())
                .with(fmt::layer().with_writer(std::io::stderr));
            tracing::subscriber::set_global_default(subscriber)?;
            Ok(None)
        }
        LogTarget::File(dir) => {
            fs::create_dir_all(&dir).map_err(|source| LoggingError::CreateDir {
                path: dir.clone(),
                source,
            })?;
            let file_name = format_log_file_name(OffsetDateTime::now_utc())?;
            let log_path = dir.join(&file_name);
            ensure_file_exists(&log_path)?;
            prune_old_logs(&dir, MAX_LOG_FILES)?;

            let (writer, guard) = tracing_appender::non_blocking(rolling::never(&dir, file_name));
            let subscriber = Registry::default()
                .with(build_env_filter())
                .with(fmt::layer().with_ansi(false).with_writer(writer));
            tracing::subscriber::set_global_default(subscriber)?;
            let _ = LOG_GUARD.set(guard);

            tracing::info!(path = %log_path.display(), "logging initialized");
            Ok(Some(log_path))
        }
    }
}

fn build_env_filter() -> EnvFilter {
    EnvFilter::try_from_env(FILTER_ENV).unwrap_or_else(|_| EnvFilter::new("info"))
}

fn format_log_file_name(now: OffsetDateTime) -> Result<String, LoggingError> {
    const NAME_FORMAT: &[BorrowedFormatItem<'_>] =
        format_description!("[year]-[month]-[day]_[hour]-[minute]-[second]");
    let name = now.format(NAME_FORMAT)?;
    Ok(format!("{LOG_FILE_PREFIX}_{name}.log"))
}

fn ensure_file_exists(path: &Path) -> Result<(), LoggingError> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map(|_| ())
        .map_err(|source| LoggingError::CreateLogFile {
            path: path.to_path_buf(),
            source,
        })
}

fn prune_old_logs(dir: &Path, max_files: usize) -> Result<(), LoggingError> {
    let mut entries = fs::read_dir(dir)
        .map_err(|source| LoggingError::ReadDir {
            path: dir.to_path_buf(),
            source,
        })?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_ok_and(|ft| ft.is_file()))
        .filter(|entry| entry.path().extension().and_then(|ext| ext.to_str()) == Some("log"))
        .map(|entry| {
            let modified = entry
                .metadata()
                .and_then(|meta| meta.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            (modified, entry.path())
        })
        .collect::<Vec<_>>();

    entries.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
    let excess = entries.len().saturating_sub(max_files);
    for (_, path) in entries.into_iter().take(excess) {
        fs::remove_file(&path).map_err(|source| LoggingError::RemoveFile { path, source })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn log_filename_has_timestamp_and_prefix() {
        let fixed = OffsetDateTime::from_unix_timestamp(1_700_000_000).expect("timestamp");
        let name = format_log_file_name(fixed).expect("name");
        assert_eq!(name, "renderbox_2023-11-14_22-13-20.log");
    }

    #[test]
    fn prune_keeps_newest_logs_and_ignores_other_files() {
        let dir = tempdir().expect("tempdir");
        for idx in 0..12 {
            let path = dir.path().join(format!("renderbox_{idx:02}.log"));
            ensure_file_exists(&path).expect("create");
            std::thread::sleep(std::time::Duration::from_millis(10));
        }
        fs::write(dir.path().join("notes.txt"), "keep").expect("write");

        prune_old_logs(dir.path(), 10).expect("prune");

        let mut names = fs::read_dir(dir.path())
            .expect("read")
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.file_name().to_string_lossy().to_string())
            .collect::<Vec<_>>();
        names.sort();
        assert_eq!(names.len(), 11);
        assert!(names.contains(&"notes.txt".to_string()));
        assert!(!names.contains(&"renderbox_00.log".to_string()));
        assert!(!names.contains(&"renderbox_01.log".to_string()));
    }
}
