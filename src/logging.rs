//! Tracing setup for embedders of the artwork core
//!
//! Logs go to `PathManager::log_file_path()` (or a caller-chosen file), with
//! a stderr fallback when the file cannot be opened.

use anyhow::Context;
use config::{PathManager, Settings};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::{Once, OnceLock};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const DEFAULT_FILTER: &str = "info,pony_core=debug";

static INIT: Once = Once::new();
static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Initialize the global tracing subscriber. Only the first call has effect.
pub fn init_logging(settings: &Settings) {
    init_logging_at(PathManager::log_file_path(), settings);
}

/// Like [`init_logging`], writing to `log_path` instead of the default.
pub fn init_logging_at(log_path: Option<PathBuf>, settings: &Settings) {
    INIT.call_once(|| {
        let Some(path) = log_path else {
            eprintln!("[pony] No log path configured, using stderr");
            init_stderr_logging(settings);
            return;
        };

        let file = match open_log_file(&path) {
            Ok(file) => file,
            Err(e) => {
                eprintln!("[pony] {:#}", e);
                init_stderr_logging(settings);
                return;
            }
        };

        let (non_blocking, guard) = tracing_appender::non_blocking(file);
        // Keeps the background writer alive for the life of the process
        let _ = LOG_GUARD.set(guard);

        let subscriber = tracing_subscriber::registry().with(env_filter(settings)).with(
            fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_target(true)
                .with_file(true)
                .with_line_number(true),
        );

        match tracing::subscriber::set_global_default(subscriber) {
            Ok(()) => tracing::info!("Logging initialized, writing to {:?}", path),
            Err(e) => eprintln!("[pony] Failed to set tracing subscriber: {}", e),
        }
    });
}

fn env_filter(settings: &Settings) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(settings.log_filter.as_deref().unwrap_or(DEFAULT_FILTER))
    })
}

fn open_log_file(path: &Path) -> anyhow::Result<File> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create log directory {:?}", parent))?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open log file {:?}", path))
}

fn init_stderr_logging(settings: &Settings) {
    let subscriber = tracing_subscriber::registry().with(env_filter(settings)).with(
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(true)
            .with_target(true),
    );

    let _ = tracing::subscriber::set_global_default(subscriber);
}
