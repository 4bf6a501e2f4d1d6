//! cert-walker - Filesystem X.509 Certificate Expiry Scanner
//!
//! Finds certificates on local disk (system trust stores, Kubernetes node
//! PKI, application TLS material) and flags the ones close to expiry.
//!
//! # Features
//!
//! - **Concurrent Scanning**: One walker thread feeds a fixed pool of parser
//!   threads through bounded queues.
//!
//! - **Failure Isolation**: Unreadable directories, oversized files, broken
//!   certificates and files that take too long are reported per file and
//!   never stop the scan.
//!
//! - **Bounded Shutdown**: Ctrl-C stops new work immediately and waits for
//!   in-flight files no longer than the configured shutdown timeout.
//!
//! - **Alerting**: Expiring certificates can be posted to the bundled
//!   dashboard server.
//!
//! # Architecture
//!
//! ```text
//!  root paths
//!      │
//!      ▼
//! ┌──────────────┐   path queue   ┌──────────────┐  outcome queue  ┌──────────────┐
//! │  PathWalker  │ ─────────────▶ │ Worker pool  │ ──────────────▶ │ ReportWriter │
//! │ depth limit  │  (bounded)     │ CertParser + │   (bounded)     │ stdout JSON  │
//! │ ext filter   │                │ file deadline│                 │ stderr alerts│
//! └──────┬───────┘                └──────┬───────┘                 └──────┬───────┘
//!        │                               │                                │
//!        └──────── ShutdownCoordinator ──┘                          AlertSender ──▶ dashboard
//!                  + CancelToken
//! ```
//!
//! # Example
//!
//! ```bash
//! # Scan the default locations
//! cert-walker
//!
//! # Kubernetes PKI with a 14 day threshold, alerts to the dashboard
//! cert-walker --paths /etc/kubernetes/pki --days 14 --send-to http://dash:8080/alerts
//!
//! # Run the dashboard
//! cert-walker serve --port 8080
//! ```

pub mod alert;
pub mod cert;
pub mod config;
pub mod error;
pub mod progress;
pub mod report;
pub mod sender;
pub mod server;
pub mod shutdown;
pub mod walker;

pub use cert::{CertParser, CertificateRecord};
pub use config::{CliArgs, ScanConfig};
pub use error::{CertWalkerError, Result, ScanError, ScanOutcome};
pub use shutdown::{CancelToken, ShutdownCoordinator};
pub use walker::{ScanStream, Scanner};
