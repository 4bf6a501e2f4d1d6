//! Configuration types for cert-walker
//!
//! This module defines:
//! - CLI argument parsing using clap derive macros
//! - The optional JSON config file, merged over the flags
//! - Runtime configuration with validation

use crate::cert::DEFAULT_MAX_FILE_SIZE;
use crate::error::ConfigError;
use crate::shutdown::DEFAULT_SHUTDOWN_TIMEOUT;
use crate::walker::queue::DEFAULT_QUEUE_CAPACITY;
use crate::walker::{DEFAULT_FILE_TIMEOUT, DEFAULT_MAX_DEPTH, DEFAULT_WORKER_COUNT};
use clap::{Args, Parser, Subcommand};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Maximum reasonable worker count
const MAX_WORKERS: usize = 512;

/// Minimum queue size
const MIN_QUEUE_SIZE: usize = 1;

/// Default expiring-soon threshold in days
pub const DEFAULT_DAYS: i64 = 30;

/// Roots scanned when `--paths` is not given
pub const DEFAULT_PATHS: [&str; 3] = ["/etc/ssl/certs", "/etc/pki", "/var/lib/kubelet/pki"];

/// Extension allow-list used when `--ext` is not given
pub const DEFAULT_EXTENSIONS: [&str; 4] = [".pem", ".cer", ".crt", ".key"];

/// Certificate expiry scanner
#[derive(Parser, Debug, Clone)]
#[command(
    name = "cert-walker",
    version,
    about = "Finds X.509 certificates on disk and flags the ones close to expiry",
    long_about = "Walks the given directory trees, parses every PEM or DER certificate it finds \
                  and reports its expiry.\n\n\
                  Healthy certificates are printed as JSON lines on stdout. Certificates expiring \
                  within the threshold are printed on stderr and, with --send-to, posted as alerts \
                  to a dashboard started with the 'serve' subcommand.",
    after_help = "EXAMPLES:\n    \
        cert-walker --days 14\n    \
        cert-walker --paths /etc/kubernetes/pki --include-subject\n    \
        cert-walker --apaths /opt/app/tls -w 4 -p\n    \
        cert-walker --send-to http://dashboard:8080/alerts\n    \
        cert-walker serve --port 8080",
    args_conflicts_with_subcommands = true
)]
pub struct CliArgs {
    /// Subcommand (serve)
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Alert threshold in days before expiration
    #[arg(long, default_value_t = DEFAULT_DAYS, value_name = "DAYS", allow_negative_numbers = true)]
    pub days: i64,

    /// Comma-separated paths to scan (replaces the defaults)
    #[arg(long, value_delimiter = ',', value_name = "PATHS")]
    pub paths: Vec<String>,

    /// Comma-separated paths appended to the scanned paths
    #[arg(long, value_delimiter = ',', value_name = "PATHS")]
    pub apaths: Vec<String>,

    /// Comma-separated file name suffixes to scan (empty value scans every file)
    #[arg(
        short = 'e',
        long = "ext",
        value_delimiter = ',',
        default_values = DEFAULT_EXTENSIONS,
        value_name = "EXTS"
    )]
    pub extensions: Vec<String>,

    /// Include certificate subject and issuer in output
    #[arg(long)]
    pub include_subject: bool,

    /// URL that expiring-certificate alerts are posted to
    #[arg(long, value_name = "URL")]
    pub send_to: Option<String>,

    /// JSON configuration file (its values override the flags)
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Maximum time to wait for in-flight work on shutdown
    #[arg(long, default_value = "30s", value_parser = parse_duration, value_name = "DURATION")]
    pub shutdown_timeout: Duration,

    /// Number of parser worker threads
    #[arg(short = 'w', long, default_value_t = DEFAULT_WORKER_COUNT, value_name = "NUM")]
    pub workers: usize,

    /// Maximum directory depth below each path
    #[arg(short = 'd', long, default_value_t = DEFAULT_MAX_DEPTH, value_name = "NUM")]
    pub max_depth: usize,

    /// Files larger than this are rejected without being read
    #[arg(long, default_value_t = DEFAULT_MAX_FILE_SIZE, value_name = "BYTES")]
    pub max_file_size: u64,

    /// Deadline for parsing a single file
    #[arg(long, default_value = "1m", value_parser = parse_duration, value_name = "DURATION")]
    pub file_timeout: Duration,

    /// Capacity of the path and outcome queues
    #[arg(long, default_value_t = DEFAULT_QUEUE_CAPACITY, value_name = "NUM")]
    pub queue_size: usize,

    /// Show a progress spinner on stderr
    #[arg(short = 'p', long)]
    pub progress: bool,

    /// Verbose output (debug logging)
    #[arg(short = 'v', long)]
    pub verbose: bool,
}

/// Subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Run the alert dashboard server
    Serve(ServeArgs),
}

/// Dashboard server options
#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
    /// Port to listen on
    #[arg(long, default_value = "8080")]
    pub port: u16,

    /// Bind address
    #[arg(long, default_value = "0.0.0.0")]
    pub bind: String,

    /// JSON file the received alerts are stored in
    #[arg(long, default_value = "frontend/alerts.json", value_name = "FILE")]
    pub alerts_file: PathBuf,

    /// Directory served as the dashboard frontend
    #[arg(long, default_value = "frontend", value_name = "DIR")]
    pub static_dir: PathBuf,

    /// Verbose output (debug logging)
    #[arg(short = 'v', long)]
    pub verbose: bool,
}

/// Parse `500ms`, `30s`, `5m`, `1h` or a bare number of seconds
pub fn parse_duration(value: &str) -> Result<Duration, ConfigError> {
    let v = value.trim();
    let invalid = |reason: &str| ConfigError::InvalidDuration {
        value: value.to_string(),
        reason: reason.to_string(),
    };

    // Unit in milliseconds
    let (digits, unit) = if let Some(s) = v.strip_suffix("ms") {
        (s, 1)
    } else if let Some(s) = v.strip_suffix('s') {
        (s, 1_000)
    } else if let Some(s) = v.strip_suffix('m') {
        (s, 60_000)
    } else if let Some(s) = v.strip_suffix('h') {
        (s, 3_600_000)
    } else {
        (v, 1_000)
    };

    let n: u64 = digits
        .trim()
        .parse()
        .map_err(|_| invalid("expected a whole number with an optional ms, s, m or h suffix"))?;
    n.checked_mul(unit)
        .map(Duration::from_millis)
        .ok_or_else(|| invalid("duration too large"))
}

/// A duration in the config file: a string such as `"45s"`, or a number of
/// nanoseconds
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum FileDuration {
    Text(String),
    Nanos(u64),
}

impl FileDuration {
    fn resolve(&self) -> Result<Duration, ConfigError> {
        match self {
            FileDuration::Text(s) => parse_duration(s),
            FileDuration::Nanos(n) => Ok(Duration::from_nanos(*n)),
        }
    }
}

/// Contents of the JSON config file. Every key is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileConfig {
    days: Option<i64>,
    paths: Option<Vec<String>>,
    include_subject: Option<bool>,
    send_to: Option<String>,
    shutdown_timeout: Option<FileDuration>,
    extensions: Option<Vec<String>>,
    workers: Option<usize>,
    max_depth: Option<usize>,
    max_file_size: Option<u64>,
    file_timeout: Option<FileDuration>,
}

impl FileConfig {
    /// Read and decode a config file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let data = fs::read_to_string(path).map_err(|e| ConfigError::ConfigFile {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        serde_json::from_str(&data).map_err(|e| ConfigError::ConfigFile {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Overwrite every field of `config` that this file sets
    fn apply(&self, config: &mut ScanConfig) -> Result<(), ConfigError> {
        if let Some(days) = self.days {
            config.days_threshold = days;
        }
        if let Some(paths) = &self.paths {
            config.paths = paths.iter().map(PathBuf::from).collect();
        }
        if let Some(include_subject) = self.include_subject {
            config.include_subject = include_subject;
        }
        if let Some(send_to) = &self.send_to {
            config.send_to = non_empty(send_to);
        }
        if let Some(timeout) = &self.shutdown_timeout {
            config.shutdown_timeout = timeout.resolve()?;
        }
        if let Some(extensions) = &self.extensions {
            config.extensions = clean_list(extensions);
        }
        if let Some(workers) = self.workers {
            config.worker_count = workers;
        }
        if let Some(max_depth) = self.max_depth {
            config.max_depth = max_depth;
        }
        if let Some(max_file_size) = self.max_file_size {
            config.max_file_size = max_file_size;
        }
        if let Some(timeout) = &self.file_timeout {
            config.file_timeout = timeout.resolve()?;
        }
        Ok(())
    }
}

/// Validated scan configuration
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Expiring-soon threshold in days
    pub days_threshold: i64,

    /// Roots to walk, in order
    pub paths: Vec<PathBuf>,

    /// File name suffix allow-list (empty accepts every file)
    pub extensions: Vec<String>,

    /// Populate subject/issuer on records
    pub include_subject: bool,

    /// Alert endpoint
    pub send_to: Option<String>,

    /// Number of worker threads
    pub worker_count: usize,

    /// Maximum depth below each root
    pub max_depth: usize,

    /// Per-file size limit in bytes
    pub max_file_size: u64,

    /// Per-file parse deadline
    pub file_timeout: Duration,

    /// Bounded drain on shutdown
    pub shutdown_timeout: Duration,

    /// Capacity of both pipeline queues
    pub queue_capacity: usize,

    /// Show progress spinner
    pub show_progress: bool,

    /// Verbose logging
    pub verbose: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            days_threshold: DEFAULT_DAYS,
            paths: DEFAULT_PATHS.iter().map(PathBuf::from).collect(),
            extensions: DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
            include_subject: false,
            send_to: None,
            worker_count: DEFAULT_WORKER_COUNT,
            max_depth: DEFAULT_MAX_DEPTH,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            file_timeout: DEFAULT_FILE_TIMEOUT,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            show_progress: false,
            verbose: false,
        }
    }
}

impl ScanConfig {
    /// Create and validate configuration from CLI arguments, merging the
    /// config file when one is given
    pub fn from_args(args: &CliArgs) -> Result<Self, ConfigError> {
        let mut paths: Vec<PathBuf> = if args.paths.is_empty() {
            DEFAULT_PATHS.iter().map(PathBuf::from).collect()
        } else {
            clean_list(&args.paths).into_iter().map(PathBuf::from).collect()
        };
        paths.extend(clean_list(&args.apaths).into_iter().map(PathBuf::from));

        let mut config = Self {
            days_threshold: args.days,
            paths,
            extensions: clean_list(&args.extensions),
            include_subject: args.include_subject,
            send_to: args.send_to.as_deref().and_then(non_empty),
            worker_count: args.workers,
            max_depth: args.max_depth,
            max_file_size: args.max_file_size,
            file_timeout: args.file_timeout,
            shutdown_timeout: args.shutdown_timeout,
            queue_capacity: args.queue_size,
            show_progress: args.progress,
            verbose: args.verbose,
        };

        if let Some(file) = &args.config {
            FileConfig::load(file)?.apply(&mut config)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Check every field against its allowed range
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.days_threshold < 0 {
            return Err(ConfigError::NegativeDays(self.days_threshold));
        }

        if self.paths.is_empty() {
            return Err(ConfigError::NoPaths);
        }

        if let Some(path) = self.paths.iter().find(|p| p.to_string_lossy().contains("..")) {
            return Err(ConfigError::PathTraversal(path.display().to_string()));
        }

        if self.worker_count == 0 || self.worker_count > MAX_WORKERS {
            return Err(ConfigError::InvalidWorkerCount {
                count: self.worker_count,
                max: MAX_WORKERS,
            });
        }

        if self.queue_capacity < MIN_QUEUE_SIZE {
            return Err(ConfigError::InvalidQueueSize {
                size: self.queue_capacity,
                min: MIN_QUEUE_SIZE,
            });
        }

        if self.max_file_size == 0 {
            return Err(ConfigError::InvalidMaxFileSize);
        }

        if self.file_timeout.is_zero() {
            return Err(ConfigError::InvalidFileTimeout);
        }

        Ok(())
    }
}

/// Trim entries and drop empty ones
fn clean_list(items: &[String]) -> Vec<String> {
    items
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

fn non_empty(s: &str) -> Option<String> {
    let s = s.trim();
    (!s.is_empty()).then(|| s.to_string())
}
