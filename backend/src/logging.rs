//! Logging service.
//!
//! One [`LogService`] is built at start-up from a [`LogConfig`] and handed
//! around as `Arc<LogService>`. Every entry goes to three places:
//!
//! - the console (warnings and errors on stderr),
//! - a size-rotated `finest_*.log` file in the configured directory,
//! - a broadcast channel that the `/api/logs` SSE endpoint streams from.

use chrono::{Local, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, SystemTime};
use tokio::sync::broadcast;

use crate::config::LogConfig;

const LOG_FILE_PREFIX: &str = "finest_";
const LOG_FILE_SUFFIX: &str = ".log";
const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

/// Severity, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Success,
    Warning,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Success => "SUCCESS",
            LogLevel::Warning => "WARNING",
            LogLevel::Error => "ERROR",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "debug" | "trace" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "success" => Ok(LogLevel::Success),
            "warn" | "warning" => Ok(LogLevel::Warning),
            "error" => Ok(LogLevel::Error),
            other => Err(format!("unknown log level '{}'", other)),
        }
    }
}

/// A single log entry
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub level: LogLevel,
    pub message: String,
    /// Nesting depth for console display
    #[serde(default)]
    pub indent: u8,
    /// UTC, RFC 3339
    pub timestamp: String,
}

impl LogEntry {
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            indent: 0,
            timestamp: Utc::now().to_rfc3339(),
        }
    }

    pub fn with_indent(mut self, indent: u8) -> Self {
        self.indent = indent;
        self
    }

    fn file_line(&self) -> String {
        format!(
            "{} | {} | {}\n",
            Local::now().format("%Y-%m-%d %H:%M:%S"),
            self.level,
            self.message
        )
    }
}

/// Size-rotated log file.
struct FileSink {
    directory: PathBuf,
    rotation_size: u64,
    retention: Duration,
    file: File,
    path: PathBuf,
    written: u64,
    sequence: u32,
}

impl FileSink {
    fn open(config: &LogConfig) -> io::Result<Self> {
        fs::create_dir_all(&config.directory)?;
        let retention = Duration::from_secs(u64::from(config.retention_days) * SECONDS_PER_DAY);
        prune_expired(&config.directory, retention, None)?;

        let (file, path) = open_log_file(&config.directory, 0)?;
        Ok(Self {
            directory: config.directory.clone(),
            rotation_size: config.rotation_size,
            retention,
            file,
            path,
            written: 0,
            sequence: 0,
        })
    }

    fn write_line(&mut self, line: &str) -> io::Result<()> {
        let len = line.len() as u64;
        if self.written > 0 && self.written + len > self.rotation_size {
            self.rotate()?;
        }
        self.file.write_all(line.as_bytes())?;
        self.written += len;
        Ok(())
    }

    fn rotate(&mut self) -> io::Result<()> {
        self.file.flush()?;
        self.sequence += 1;
        let (file, path) = open_log_file(&self.directory, self.sequence)?;
        self.file = file;
        self.path = path;
        self.written = 0;
        prune_expired(&self.directory, self.retention, Some(&self.path))
    }
}

fn open_log_file(directory: &Path, sequence: u32) -> io::Result<(File, PathBuf)> {
    let name = format!(
        "{}{}_{}{}",
        LOG_FILE_PREFIX,
        Local::now().format("%Y-%m-%d_%H-%M-%S_%6f"),
        sequence,
        LOG_FILE_SUFFIX
    );
    let path = directory.join(name);
    let file = OpenOptions::new().create(true).append(true).open(&path)?;
    Ok((file, path))
}

/// Delete `finest_*.log` files last modified more than `retention` ago.
fn prune_expired(directory: &Path, retention: Duration, keep: Option<&Path>) -> io::Result<()> {
    let cutoff = match SystemTime::now().checked_sub(retention) {
        Some(t) => t,
        None => return Ok(()),
    };

    for entry in fs::read_dir(directory)?.flatten() {
        let path = entry.path();
        if Some(path.as_path()) == keep {
            continue;
        }
        let is_log = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with(LOG_FILE_PREFIX) && n.ends_with(LOG_FILE_SUFFIX));
        if !is_log {
            continue;
        }
        let expired = entry
            .metadata()
            .and_then(|m| m.modified())
            .is_ok_and(|modified| modified < cutoff);
        if expired {
            fs::remove_file(&path)?;
        }
    }
    Ok(())
}

/// Level-filtered log fan-out: console, rotating file, broadcast.
pub struct LogService {
    min_level: LogLevel,
    sender: broadcast::Sender<LogEntry>,
    sink: Option<Mutex<FileSink>>,
    stderr_only: bool,
}

impl LogService {
    /// Build the service. Fails only if file output is enabled and the log
    /// directory cannot be prepared.
    pub fn new(config: &LogConfig) -> io::Result<Self> {
        let (sender, _) = broadcast::channel(100);
        let sink = if config.file_output {
            Some(Mutex::new(FileSink::open(config)?))
        } else {
            None
        };
        Ok(Self {
            min_level: config.min_level,
            sender,
            sink,
            stderr_only: false,
        })
    }

    /// Console and broadcast only.
    pub fn console(min_level: LogLevel) -> Self {
        let (sender, _) = broadcast::channel(100);
        Self {
            min_level,
            sender,
            sink: None,
            stderr_only: false,
        }
    }

    /// Send every console line to stderr, leaving stdout for command output.
    pub fn with_stderr_console(mut self) -> Self {
        self.stderr_only = true;
        self
    }

    pub fn min_level(&self) -> LogLevel {
        self.min_level
    }

    /// A writer that panicked mid-line leaves the sink usable, so a
    /// poisoned lock is recovered rather than disabling file output.
    fn lock_sink(&self) -> Option<MutexGuard<'_, FileSink>> {
        let sink = self.sink.as_ref()?;
        Some(sink.lock().unwrap_or_else(PoisonError::into_inner))
    }

    /// Path of the log file currently written to, if any.
    pub fn current_file(&self) -> Option<PathBuf> {
        self.lock_sink().map(|s| s.path.clone())
    }

    pub fn log(&self, entry: LogEntry) {
        if entry.level < self.min_level {
            return;
        }

        let prefix = match entry.level {
            LogLevel::Debug => "   ·",
            LogLevel::Info => "   ",
            LogLevel::Success => "   ✓",
            LogLevel::Warning => "   ⚠️",
            LogLevel::Error => "   ❌",
        };
        let indent = "   ".repeat(entry.indent as usize);
        if self.stderr_only || entry.level >= LogLevel::Warning {
            eprintln!("{}{} {}", indent, prefix, entry.message);
        } else {
            println!("{}{} {}", indent, prefix, entry.message);
        }

        if let Some(mut sink) = self.lock_sink() {
            if let Err(e) = sink.write_line(&entry.file_line()) {
                eprintln!("   ❌ Cannot write log file: {}", e);
            }
        }

        // No receivers is fine
        let _ = self.sender.send(entry);
    }

    /// Get a receiver for SSE streaming
    pub fn subscribe(&self) -> broadcast::Receiver<LogEntry> {
        self.sender.subscribe()
    }

    pub fn debug(&self, msg: impl Into<String>) {
        self.log(LogEntry::new(LogLevel::Debug, msg));
    }

    pub fn info(&self, msg: impl Into<String>) {
        self.log(LogEntry::new(LogLevel::Info, msg));
    }

    pub fn success(&self, msg: impl Into<String>) {
        self.log(LogEntry::new(LogLevel::Success, msg));
    }

    pub fn warning(&self, msg: impl Into<String>) {
        self.log(LogEntry::new(LogLevel::Warning, msg));
    }

    pub fn error(&self, msg: impl Into<String>) {
        self.log(LogEntry::new(LogLevel::Error, msg));
    }

    pub fn info_indent(&self, msg: impl Into<String>, indent: u8) {
        self.log(LogEntry::new(LogLevel::Info, msg).with_indent(indent));
    }

    pub fn success_indent(&self, msg: impl Into<String>, indent: u8) {
        self.log(LogEntry::new(LogLevel::Success, msg).with_indent(indent));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn file_config(dir: &Path, rotation_size: u64) -> LogConfig {
        LogConfig {
            directory: dir.to_path_buf(),
            rotation_size,
            retention_days: 30,
            min_level: LogLevel::Info,
            file_output: true,
        }
    }

    fn log_files(dir: &Path) -> Vec<PathBuf> {
        fs::read_dir(dir)
            .unwrap()
            .flatten()
            .map(|e| e.path())
            .filter(|p| p.extension().is_some_and(|e| e == "log"))
            .collect()
    }

    #[test]
    fn test_level_parsing_and_order() {
        assert_eq!("WARN".parse::<LogLevel>().unwrap(), LogLevel::Warning);
        assert_eq!(" info ".parse::<LogLevel>().unwrap(), LogLevel::Info);
        assert!("verbose".parse::<LogLevel>().is_err());
        assert!(LogLevel::Debug < LogLevel::Info);
        assert!(LogLevel::Success < LogLevel::Warning);
    }

    #[test]
    fn test_min_level_filters_broadcast() {
        let service = LogService::console(LogLevel::Warning);
        let mut rx = service.subscribe();

        service.info("dropped");
        service.warning("kept");

        let entry = rx.try_recv().unwrap();
        assert_eq!(entry.level, LogLevel::Warning);
        assert_eq!(entry.message, "kept");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_file_line_format() {
        let dir = tempdir().unwrap();
        let service = LogService::new(&file_config(dir.path(), 1024 * 1024)).unwrap();

        service.error("Error processing file: boom");

        let path = service.current_file().unwrap();
        let content = fs::read_to_string(path).unwrap();
        assert!(content.contains(" | ERROR | Error processing file: boom"));
    }

    #[test]
    fn test_rotation_starts_new_file() {
        let dir = tempdir().unwrap();
        let service = LogService::new(&file_config(dir.path(), 64)).unwrap();

        let first = service.current_file().unwrap();
        service.info("a message long enough to fill most of the file");
        service.info("a second message that forces a rotation");

        assert_ne!(service.current_file().unwrap(), first);
        assert_eq!(log_files(dir.path()).len(), 2);
    }

    #[test]
    fn test_retention_prunes_old_files() {
        let dir = tempdir().unwrap();
        let stale = dir.path().join("finest_2000-01-01_00-00-00_000000_0.log");
        let unrelated = dir.path().join("notes.txt");
        fs::write(&stale, "old\n").unwrap();
        fs::write(&unrelated, "keep\n").unwrap();
        let old = SystemTime::now() - Duration::from_secs(40 * SECONDS_PER_DAY);
        File::options()
            .write(true)
            .open(&stale)
            .unwrap()
            .set_modified(old)
            .unwrap();

        let _service = LogService::new(&file_config(dir.path(), 1024)).unwrap();

        assert!(!stale.exists());
        assert!(unrelated.exists());
        assert_eq!(log_files(dir.path()).len(), 1);
    }

    #[test]
    fn test_file_output_survives_poisoned_lock() {
        let dir = tempdir().unwrap();
        let service = LogService::new(&file_config(dir.path(), 1024 * 1024)).unwrap();

        std::thread::scope(|scope| {
            let poisoner = scope.spawn(|| {
                let _guard = service.sink.as_ref().unwrap().lock().unwrap();
                panic!("writer died holding the log lock");
            });
            assert!(poisoner.join().is_err());
        });
        assert!(service.sink.as_ref().unwrap().is_poisoned());

        service.error("still written after poisoning");

        let content = fs::read_to_string(service.current_file().unwrap()).unwrap();
        assert!(content.contains("still written after poisoning"));
    }
}
