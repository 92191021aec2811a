//! Decoupled logging pipeline.
//!
//! Every `log::` record is pushed onto an unbounded crossbeam channel and
//! written by a dedicated background thread, so logging never blocks the
//! tokio runtime or the poll loop.
//!
//! ```text
//! log::info!() ...
//!     |
//! [LogCollector]  (impl log::Log, non-blocking)
//!     | crossbeam unbounded
//! [writer thread]
//!     |                   \
//! logs/gpumon_<ts>.log     console mirror (tokio mpsc, best effort)
//! ```

use chrono::Local;
use crossbeam_channel::{bounded, unbounded, Sender};
use log::{Level, LevelFilter, Log, Metadata, Record};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

enum LogMessage {
    Line(LogLine),
    /// Flush marker; the writer answers once everything before it is on disk
    Flush(Sender<()>),
}

/// Resolve a log directory relative to the current working directory.
pub fn resolve_logs_path(log_dir: &str) -> Result<PathBuf, String> {
    let path = Path::new(log_dir);
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let cwd = std::env::current_dir()
        .map_err(|e| format!("Failed to get current working directory: {}", e))?;
    Ok(cwd.join(path))
}

/// A formatted log record.
#[derive(Clone, Debug)]
pub struct LogLine {
    pub level: Level,
    pub message: String,
    /// Wall-clock time the record was created (HH:MM:SS.mmm)
    pub timestamp: String,
}

impl LogLine {
    pub fn new(level: Level, message: String) -> Self {
        LogLine {
            level,
            message,
            timestamp: Local::now().format("%H:%M:%S%.3f").to_string(),
        }
    }

    /// `[HH:MM:SS.mmm] [LEVEL] message`
    pub fn format(&self) -> String {
        format!("[{}] [{}] {}", self.timestamp, self.level, self.message)
    }
}

/// Global logger writing to one file per process plus a console mirror.
#[derive(Clone)]
pub struct LogCollector {
    tx: Sender<LogMessage>,
    log_path: PathBuf,
    max_level: LevelFilter,
}

impl LogCollector {
    /// Create the log directory and file and start the writer thread.
    ///
    /// `ui_tx` receives a copy of every line; it is bounded and lines are
    /// dropped when it is full, the file always gets them.
    pub fn new(
        log_dir: PathBuf,
        max_level: LevelFilter,
        ui_tx: Option<tokio::sync::mpsc::Sender<LogLine>>,
    ) -> Result<Self, String> {
        std::fs::create_dir_all(&log_dir)
            .map_err(|e| format!("Failed to create logs directory: {}", e))?;

        let log_path = log_dir.join(format!("gpumon_{}.log", Local::now().format("%Y%m%d_%H%M%S")));
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .map_err(|e| format!("Failed to open log file {}: {}", log_path.display(), e))?;

        let (tx, rx) = unbounded::<LogMessage>();

        // Plain OS thread: must outlive the tokio runtime
        std::thread::Builder::new()
            .name("gpumon-log".to_string())
            .spawn(move || {
                while let Ok(msg) = rx.recv() {
                    match msg {
                        LogMessage::Line(line) => {
                            write_line(&mut file, &line);
                            if let Some(ui_tx) = &ui_tx {
                                let _ = ui_tx.try_send(line);
                            }
                        }
                        LogMessage::Flush(done) => {
                            let _ = file.flush();
                            let _ = file.sync_data();
                            let _ = done.send(());
                        }
                    }
                }
            })
            .map_err(|e| format!("Failed to spawn log writer: {}", e))?;

        Ok(LogCollector {
            tx,
            log_path,
            max_level,
        })
    }

    /// Install as the global `log` backend.
    pub fn install(self) -> Result<PathBuf, String> {
        let path = self.log_path.clone();
        let level = self.max_level;
        log::set_boxed_logger(Box::new(self))
            .map_err(|e| format!("Logger already installed: {}", e))?;
        log::set_max_level(level);
        Ok(path)
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    /// Queue a line (never blocks).
    pub fn log_line(&self, line: LogLine) {
        let _ = self.tx.send(LogMessage::Line(line));
    }

    /// Wait until every line queued before this call is on disk.
    pub async fn wait_for_empty(&self) -> Result<(), String> {
        let (done_tx, done_rx) = bounded::<()>(1);
        self.tx
            .send(LogMessage::Flush(done_tx))
            .map_err(|e| format!("Failed to send flush marker: {}", e))?;
        tokio::task::spawn_blocking(move || done_rx.recv())
            .await
            .map_err(|e| format!("Flush waiter failed: {}", e))?
            .map_err(|e| format!("Flush signal interrupted: {}", e))
    }
}

fn write_line(file: &mut File, line: &LogLine) {
    let mut formatted = line.format();
    formatted.push('\n');
    let _ = file.write_all(formatted.as_bytes());
}

impl Log for LogCollector {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.max_level
            && (metadata.target().starts_with("gpumon") || metadata.level() <= Level::Warn)
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            self.log_line(LogLine::new(record.level(), record.args().to_string()));
        }
    }

    fn flush(&self) {
        let (done_tx, done_rx) = bounded::<()>(1);
        if self.tx.send(LogMessage::Flush(done_tx)).is_ok() {
            let _ = done_rx.recv_timeout(Duration::from_secs(1));
        }
    }
}
