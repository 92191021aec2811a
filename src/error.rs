//! Unified error type hierarchy for gpumon
//!
//! Provides structured error handling with ClientError (every HTTP exchange),
//! StartError/StopError (session controller), ShutdownError (handshake),
//! HistoryError, ConfigError and AppError.

use std::io;
use thiserror::Error;

/// Failure of a single HTTP exchange with the engine, host or telemetry store.
///
/// The split between `Transport` and `Server` matters: a transport failure
/// means no response was received at all, which is the only signal the
/// liveness prober treats as proof that a process is gone.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ClientError {
    /// No response received (connection refused/reset, timeout)
    #[error("Transport failure: {0}")]
    Transport(String),

    /// Response received with a non-success status
    #[error("Server returned HTTP {status}: {body}")]
    Server { status: u16, body: String },

    /// Response received but the body did not match the expected shape
    #[error("Malformed response: {0}")]
    Decode(String),
}

impl ClientError {
    /// True when no response was received.
    pub fn is_transport(&self) -> bool {
        matches!(self, ClientError::Transport(_))
    }

    /// HTTP status of a server error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Server { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ClientError::Decode(e.to_string())
        } else if let Some(status) = e.status() {
            ClientError::Server {
                status: status.as_u16(),
                body: e.to_string(),
            }
        } else {
            ClientError::Transport(e.to_string())
        }
    }
}

/// Rejections and failures of `SessionController::start`.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StartError {
    #[error("A session is already active (phase: {0})")]
    AlreadyRunning(String),

    #[error("Invalid session configuration: {0}")]
    InvalidConfig(String),

    #[error("Could not reach the benchmark engine: {0}")]
    TransportFailure(ClientError),

    #[error("Benchmark engine refused the start request: {0}")]
    ServerError(ClientError),

    #[error("Server shutdown in progress; no new sessions can be started")]
    Disarmed,
}

impl StartError {
    pub(crate) fn from_client(e: ClientError) -> Self {
        if e.is_transport() {
            StartError::TransportFailure(e)
        } else {
            StartError::ServerError(e)
        }
    }
}

/// Failures of `SessionController::stop`.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StopError {
    #[error("Could not reach the benchmark engine: {0}")]
    TransportFailure(ClientError),

    #[error("Benchmark engine refused the stop request: {0}")]
    ServerError(ClientError),
}

impl StopError {
    pub(crate) fn from_client(e: ClientError) -> Self {
        if e.is_transport() {
            StopError::TransportFailure(e)
        } else {
            StopError::ServerError(e)
        }
    }
}

/// Shutdown handshake errors.
///
/// There is deliberately no variant for a transport failure on the terminate
/// request: that outcome is ambiguous and is folded into the confirmation path.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ShutdownError {
    #[error("Shutdown already in progress (phase: {0})")]
    AlreadyInProgress(String),

    #[error("Server rejected the shutdown request with HTTP {status}: {body}")]
    Rejected { status: u16, body: String },
}

/// History loading errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum HistoryError {
    #[error("History fetch failed: {0}")]
    Fetch(#[from] ClientError),

    #[error("Invalid timestamp in history data: {0}")]
    InvalidTimestamp(String),

    #[error("Invalid metric name: {0}")]
    InvalidMetric(String),
}

/// Settings file parsing and validation errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    FileNotFound(String),

    #[error("Invalid JSON in config: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),

    #[error("IO error during config operations: {0}")]
    IoError(#[from] io::Error),
}

/// Top-level error for the command-line front end.
///
/// Provides unified error categorization and user-facing messages.
#[derive(Error, Debug, Clone)]
pub enum AppError {
    /// Benchmark engine interaction failed
    #[error("Engine error: {0}")]
    Engine(String),

    /// Shutdown handshake failed before confirmation started
    #[error("Shutdown error: {0}")]
    Shutdown(String),

    /// History view could not be built
    #[error("History error: {0}")]
    History(String),

    /// Settings persist or deserialize error
    #[error("Settings error: {0}")]
    Settings(String),

    /// File I/O error
    #[error("I/O error: {0}")]
    Io(String),

    /// Invalid input (e.g., unknown preset name)
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl AppError {
    /// Get a user-facing error message suitable for terminal display
    pub fn user_message(&self) -> String {
        match self {
            AppError::Engine(msg) => format!("Benchmark engine problem: {}", msg),
            AppError::Shutdown(msg) => format!("Could not shut the server down: {}", msg),
            AppError::History(msg) => format!("Could not load history: {}", msg),
            AppError::Settings(msg) => format!("Settings error: {}", msg),
            AppError::Io(msg) => format!("File operation failed: {}", msg),
            AppError::InvalidInput(msg) => format!("Invalid input: {}", msg),
        }
    }
}

impl From<StartError> for AppError {
    fn from(e: StartError) -> Self {
        match e {
            StartError::InvalidConfig(msg) => AppError::InvalidInput(msg),
            other => AppError::Engine(other.to_string()),
        }
    }
}

impl From<StopError> for AppError {
    fn from(e: StopError) -> Self {
        AppError::Engine(e.to_string())
    }
}

impl From<ClientError> for AppError {
    fn from(e: ClientError) -> Self {
        AppError::Engine(e.to_string())
    }
}

impl From<ShutdownError> for AppError {
    fn from(e: ShutdownError) -> Self {
        AppError::Shutdown(e.to_string())
    }
}

impl From<HistoryError> for AppError {
    fn from(e: HistoryError) -> Self {
        AppError::History(e.to_string())
    }
}

impl From<ConfigError> for AppError {
    fn from(e: ConfigError) -> Self {
        AppError::Settings(e.to_string())
    }
}

impl From<io::Error> for AppError {
    fn from(e: io::Error) -> Self {
        AppError::Io(e.to_string())
    }
}

/// Top-level result type for operations that may fail.
pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error>>;
