//! Application configuration.
//!
//! Defaults are overridden by a `.env` file (if present), then by environment
//! variables, then by CLI flags in `main.rs`.
//!
//! | Variable                    | Default   |
//! |-----------------------------|-----------|
//! | `FINEST_LOG_DIR`            | `logs`    |
//! | `FINEST_LOG_ROTATION_MB`    | `500`     |
//! | `FINEST_LOG_RETENTION_DAYS` | `30`      |
//! | `FINEST_LOG_LEVEL`          | `info`    |
//! | `FINEST_REPORTS_DIR`        | `reports` |
//! | `FINEST_PORT`               | `3000`    |

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

use crate::logging::LogLevel;

/// Default directory for rotating logs and the event log.
pub const DEFAULT_LOG_DIR: &str = "logs";

/// Default directory for exported reports.
pub const DEFAULT_REPORTS_DIR: &str = "reports";

/// File name of the append-only event log inside the log directory.
pub const EVENT_LOG_FILE: &str = "transactions.jsonl";

/// Default HTTP port.
pub const DEFAULT_PORT: u16 = 3000;

const BYTES_PER_MB: u64 = 1024 * 1024;

/// Configuration of the [`crate::logging::LogService`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Directory holding `finest_*.log` files.
    pub directory: PathBuf,
    /// Size in bytes after which a new log file is started.
    pub rotation_size: u64,
    /// Log files older than this are deleted.
    pub retention_days: u32,
    /// Entries below this level are dropped.
    pub min_level: LogLevel,
    /// Also write entries to files. Disabled for tests and one-shot CLI runs.
    pub file_output: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from(DEFAULT_LOG_DIR),
            rotation_size: 500 * BYTES_PER_MB,
            retention_days: 30,
            min_level: LogLevel::Info,
            file_output: true,
        }
    }
}

impl LogConfig {
    /// Console and broadcast only, nothing written to disk.
    pub fn console_only(min_level: LogLevel) -> Self {
        Self {
            min_level,
            file_output: false,
            ..Self::default()
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub log: LogConfig,
    pub reports_dir: PathBuf,
    pub event_log_path: PathBuf,
    pub port: u16,
}

impl Default for AppConfig {
    fn default() -> Self {
        let log = LogConfig::default();
        let event_log_path = log.directory.join(EVENT_LOG_FILE);
        Self {
            log,
            reports_dir: PathBuf::from(DEFAULT_REPORTS_DIR),
            event_log_path,
            port: DEFAULT_PORT,
        }
    }
}

impl AppConfig {
    /// Load `.env` (if present) and read `FINEST_*` variables.
    ///
    /// Returns the config plus a list of warnings for values that could not be
    /// parsed; the logging service is not up yet, so the caller reports them.
    pub fn from_env() -> (Self, Vec<String>) {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> (Self, Vec<String>)
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let mut warnings = Vec::new();

        if let Some(dir) = lookup("FINEST_LOG_DIR") {
            config.log.directory = PathBuf::from(dir);
        }
        if let Some(mb) = parse_var::<u64>(&lookup, "FINEST_LOG_ROTATION_MB", &mut warnings) {
            config.log.rotation_size = mb.max(1) * BYTES_PER_MB;
        }
        if let Some(days) = parse_var::<u32>(&lookup, "FINEST_LOG_RETENTION_DAYS", &mut warnings) {
            config.log.retention_days = days;
        }
        if let Some(level) = parse_var::<LogLevel>(&lookup, "FINEST_LOG_LEVEL", &mut warnings) {
            config.log.min_level = level;
        }
        if let Some(dir) = lookup("FINEST_REPORTS_DIR") {
            config.reports_dir = PathBuf::from(dir);
        }
        if let Some(port) = parse_var::<u16>(&lookup, "FINEST_PORT", &mut warnings) {
            config.port = port;
        }

        config.event_log_path = config.log.directory.join(EVENT_LOG_FILE);
        (config, warnings)
    }
}

fn parse_var<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    warnings: &mut Vec<String>,
) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse::<T>() {
        Ok(v) => Some(v),
        Err(_) => {
            warnings.push(format!("Ignoring invalid {}='{}', using default", key, raw));
            None
        }
    }
}
