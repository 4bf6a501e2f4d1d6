//! Error types for cert-walker
//!
//! This module defines the error hierarchy for:
//! - Per-file scan failures (reported as outcomes, never fatal)
//! - Per-directory walk failures (logged and skipped)
//! - Configuration and CLI errors
//! - Worker thread, alert sender and dashboard server errors
//!
//! Per-file and per-directory errors are `Clone` and carry the path they
//! belong to, so they can travel through the outcome queue to the caller.

use crate::cert::CertificateRecord;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Top-level error type for the cert-walker application
#[derive(Error, Debug)]
pub enum CertWalkerError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Worker/concurrency errors
    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),
}

/// Failure to turn one candidate file into certificate records
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScanError {
    /// File is larger than the configured limit (checked via metadata only)
    #[error("File '{path}' is {size} bytes, exceeding maximum allowed size of {max} bytes")]
    FileTooLarge { path: PathBuf, size: u64, max: u64 },

    /// Stat or read failed
    #[error("Failed to read '{path}': {reason}")]
    Io { path: PathBuf, reason: String },

    /// A certificate payload was found but is malformed
    #[error("Failed to parse certificate in '{path}': {reason}")]
    Parse { path: PathBuf, reason: String },

    /// Neither PEM blocks nor a DER certificate were found
    #[error("No certificates found in '{path}'")]
    NoCertificateFound { path: PathBuf },

    /// Per-file deadline exceeded
    #[error("Timeout parsing '{path}' after {after:?}")]
    Timeout { path: PathBuf, after: Duration },

    /// The scan was cancelled while this file was in progress
    #[error("Cancelled parsing '{path}'")]
    Cancelled { path: PathBuf },
}

impl ScanError {
    /// Path of the file that produced this error
    pub fn path(&self) -> &Path {
        match self {
            ScanError::FileTooLarge { path, .. }
            | ScanError::Io { path, .. }
            | ScanError::Parse { path, .. }
            | ScanError::NoCertificateFound { path }
            | ScanError::Timeout { path, .. }
            | ScanError::Cancelled { path } => path,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, ScanError::Timeout { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, ScanError::Cancelled { .. })
    }
}

/// Directory-level walk failures. The subtree is skipped, the walk continues.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WalkError {
    /// Path contains a parent-directory segment
    #[error("Path traversal detected in '{path}'")]
    PathTraversal { path: String },

    /// Path differs from its cleaned form
    #[error("Suspicious path detected: '{path}'")]
    SuspiciousPath { path: String },

    /// Directory listing failed
    #[error("Failed to read directory '{path}': {reason}")]
    DirectoryRead { path: PathBuf, reason: String },

    /// Directory is nested deeper than the configured limit
    #[error("Maximum directory depth {max} exceeded at '{path}' (depth {depth})")]
    DepthExceeded {
        path: PathBuf,
        depth: usize,
        max: usize,
    },
}

/// Configuration and CLI errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Negative expiry threshold
    #[error("Days threshold cannot be negative (got {0})")]
    NegativeDays(i64),

    /// No roots to scan
    #[error("At least one path must be specified")]
    NoPaths,

    /// Root path contains a traversal segment
    #[error("Path traversal detected in path: {0}")]
    PathTraversal(String),

    /// Invalid worker count
    #[error("Invalid worker count {count}: must be between 1 and {max}")]
    InvalidWorkerCount { count: usize, max: usize },

    /// Invalid queue size
    #[error("Invalid queue size {size}: must be at least {min}")]
    InvalidQueueSize { size: usize, min: usize },

    /// Zero file size limit
    #[error("Maximum file size must be greater than zero")]
    InvalidMaxFileSize,

    /// Zero per-file timeout
    #[error("File timeout must be greater than zero")]
    InvalidFileTimeout,

    /// Unparseable duration string
    #[error("Invalid duration '{value}': {reason}")]
    InvalidDuration { value: String, reason: String },

    /// Config file could not be read or decoded
    #[error("Failed to load config file '{path}': {reason}")]
    ConfigFile { path: PathBuf, reason: String },
}

/// Worker thread errors
#[derive(Error, Debug)]
pub enum WorkerError {
    /// Thread panicked
    #[error("Thread '{name}' panicked")]
    Panicked { name: String },

    /// Thread could not be started
    #[error("Failed to spawn thread '{name}': {reason}")]
    SpawnFailed { name: String, reason: String },
}

/// Alert delivery errors
#[derive(Error, Debug)]
pub enum SenderError {
    /// Transport or client failure
    #[error("Failed to send request: {0}")]
    Request(#[from] reqwest::Error),

    /// Endpoint answered with a non-2xx status
    #[error("Unexpected status code: {0}")]
    Status(u16),
}

/// Dashboard server errors
#[derive(Error, Debug)]
pub enum ServerError {
    /// JSON encoding/decoding of the alert store
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Rejected request
    #[error("{0}")]
    BadRequest(String),
}

impl axum::response::IntoResponse for ServerError {
    fn into_response(self) -> axum::response::Response {
        use axum::http::StatusCode;

        let status = match &self {
            ServerError::BadRequest(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        (status, self.to_string()).into_response()
    }
}

/// Result type alias for CertWalkerError
pub type Result<T> = std::result::Result<T, CertWalkerError>;

/// Result type alias for ScanError
pub type ScanResult<T> = std::result::Result<T, ScanError>;

/// Result type alias for ServerError
pub type ServerResult<T> = std::result::Result<T, ServerError>;

/// Represents the outcome of scanning a single candidate file
#[derive(Debug, Clone)]
pub enum ScanOutcome {
    /// One record per certificate block, in file order
    Certificates {
        path: PathBuf,
        records: Vec<CertificateRecord>,
    },

    /// The file could not be turned into records
    Failed { path: PathBuf, error: ScanError },
}

impl ScanOutcome {
    /// Build an outcome from a parser result
    pub fn from_result(path: PathBuf, result: ScanResult<Vec<CertificateRecord>>) -> Self {
        match result {
            Ok(records) => ScanOutcome::Certificates { path, records },
            Err(error) => ScanOutcome::Failed { path, error },
        }
    }

    /// Returns true if this outcome carries certificate records
    pub fn is_success(&self) -> bool {
        matches!(self, ScanOutcome::Certificates { .. })
    }

    /// Returns the path associated with this outcome
    pub fn path(&self) -> &Path {
        match self {
            ScanOutcome::Certificates { path, .. } => path,
            ScanOutcome::Failed { path, .. } => path,
        }
    }

    /// Records of a successful outcome, empty for failures
    pub fn records(&self) -> &[CertificateRecord] {
        match self {
            ScanOutcome::Certificates { records, .. } => records,
            ScanOutcome::Failed { .. } => &[],
        }
    }

    /// Error of a failed outcome
    pub fn error(&self) -> Option<&ScanError> {
        match self {
            ScanOutcome::Certificates { .. } => None,
            ScanOutcome::Failed { error, .. } => Some(error),
        }
    }
}
