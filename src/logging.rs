//! Tracing setup for the server and the CLI.
//!
//! Events carry the session id as a structured field, so one document's life (upload, chunking,
//! publication or discard, each answered question) can be followed with a single filter such as
//! `RUST_LOG=pagewise=debug`. Retrieval scores and retry attempts are logged at `debug` and
//! `warn`.
//!
//! Output goes to stdout and, unless disabled, to a log file. `PAGEWISE_LOG_FILE` picks the
//! file (`off` disables it); the default is `logs/pagewise.log`.
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

const LOG_FILE_ENV: &str = "PAGEWISE_LOG_FILE";
const DEFAULT_LOG_FILE: &str = "logs/pagewise.log";

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Configure tracing subscribers for stdout and optional file logging.
///
/// Respects `RUST_LOG` (defaults to `info`). The file writer is non-blocking and its guard
/// lives for the rest of the process.
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stdout_layer = fmt::layer().with_target(false).compact();

    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer);

    let path = log_file_path(std::env::var(LOG_FILE_ENV).ok());
    match path.and_then(|path| open_writer(&path)) {
        Some(writer) => {
            let file_layer = fmt::layer()
                .with_writer(writer)
                .with_target(true)
                .with_ansi(false)
                .compact();
            registry.with(file_layer).init();
        }
        None => registry.init(),
    }
}

/// Resolve the log file from the `PAGEWISE_LOG_FILE` value; `None` disables file logging.
fn log_file_path(value: Option<String>) -> Option<PathBuf> {
    match value.as_deref().map(str::trim) {
        None | Some("") => Some(PathBuf::from(DEFAULT_LOG_FILE)),
        Some(value) if value.eq_ignore_ascii_case("off") => None,
        Some(value) => Some(PathBuf::from(value)),
    }
}

/// Open `path` for appending, creating its directory first.
fn open_writer(path: &Path) -> Option<NonBlocking> {
    if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        if let Err(err) = std::fs::create_dir_all(dir) {
            eprintln!("Failed to create log directory {}: {err}", dir.display());
            return None;
        }
    }
    match std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
    {
        Ok(file) => {
            let (non_blocking, guard) = tracing_appender::non_blocking(file);
            let _ = LOG_GUARD.set(guard);
            Some(non_blocking)
        }
        Err(err) => {
            eprintln!("Failed to open log file {}: {err}", path.display());
            None
        }
    }
}
