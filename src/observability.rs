// SPDX-License-Identifier: Apache-2.0

//! Logging and observability helpers.

pub mod sensitive;

pub use sensitive::{redact_url, RedactedUrl, Sensitive};

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tracing_appender::rolling::RollingFileAppender;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;

const LOG_FILE_PREFIX: &str = "sqlwall.log";
const DEFAULT_FILTER: &str = "sqlwall=info";

/// Where and how log events are written
#[derive(Debug, Clone)]
pub struct LogOptions {
    /// Directory for daily rolling files; stderr when unset
    pub log_dir: Option<PathBuf>,
    /// Emit JSON lines instead of human readable text
    pub json: bool,
    /// Filter used when `RUST_LOG` is not set
    pub default_filter: String,
    /// Rolled files older than this are removed at startup
    pub retention_days: u64,
}

impl Default for LogOptions {
    fn default() -> Self {
        Self {
            log_dir: None,
            json: false,
            default_filter: DEFAULT_FILTER.to_string(),
            retention_days: 14,
        }
    }
}

/// Installs the global subscriber. Does nothing if one is already set.
pub fn init_tracing(options: &LogOptions) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&options.default_filter));

    match &options.log_dir {
        Some(log_dir) => {
            let _ = fs::create_dir_all(log_dir);
            if let Err(e) = cleanup_old_logs(log_dir, options.retention_days) {
                eprintln!("Failed to clean up old logs: {}", e);
            }

            let file_appender: RollingFileAppender =
                tracing_appender::rolling::daily(log_dir, LOG_FILE_PREFIX);

            let _ = tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_writer(file_appender)
                .json()
                .with_thread_ids(true)
                .with_thread_names(true)
                .with_file(true)
                .with_line_number(true)
                .with_current_span(true)
                .with_span_list(true)
                .with_ansi(false)
                .with_span_events(FmtSpan::CLOSE)
                .try_init();

            tracing::info!("Tracing initialized. Logs directory: {:?}", log_dir);
        }
        None if options.json => {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .json()
                .with_current_span(true)
                .try_init();
        }
        None => {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .with_target(true)
                .try_init();
        }
    }
}

fn cleanup_old_logs(log_dir: &Path, retention_days: u64) -> std::io::Result<()> {
    let entries = fs::read_dir(log_dir)?;
    let now = SystemTime::now();
    let retention_duration = Duration::from_secs(retention_days * 24 * 60 * 60);

    for entry in entries {
        let path = entry?.path();

        let is_log = path
            .file_name()
            .and_then(|name| name.to_str())
            .map(|name| name.starts_with(LOG_FILE_PREFIX))
            .unwrap_or(false);
        if !is_log {
            continue;
        }

        let age = fs::metadata(&path)
            .and_then(|metadata| metadata.modified())
            .ok()
            .and_then(|modified| now.duration_since(modified).ok());

        if matches!(age, Some(age) if age > retention_duration) {
            if let Err(e) = fs::remove_file(&path) {
                eprintln!("Failed to remove old log file {:?}: {}", path, e);
            }
        }
    }
    Ok(())
}
