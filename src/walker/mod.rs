//! Concurrent certificate scan pipeline
//!
//! One walker thread feeds a fixed pool of worker threads through a bounded
//! path queue. Workers parse each file under its own deadline and push one
//! outcome per file to a bounded outcome queue, which the caller drains as
//! an iterator.
//!
//! # Architecture
//!
//! ```text
//!                  ┌──────────────────────────┐
//!                  │        PathWalker        │
//!                  │  - depth-bounded readdir │
//!                  │  - path validation       │
//!                  │  - extension filter      │
//!                  └────────────┬─────────────┘
//!                               │ bounded path queue
//!       ┌───────────────────────┼───────────────────────┐
//!       │                       │                       │
//! ┌─────▼─────┐           ┌─────▼─────┐           ┌─────▼─────┐
//! │  Worker 1 │           │  Worker 2 │           │  Worker N │
//! │  parse +  │           │  parse +  │           │  parse +  │
//! │  deadline │           │  deadline │           │  deadline │
//! └─────┬─────┘           └─────┬─────┘           └─────┬─────┘
//!       └───────────────────────┼───────────────────────┘
//!                               │ bounded outcome queue
//!                        ┌──────▼──────┐
//!                        │ ScanStream  │
//!                        └─────────────┘
//! ```

pub mod coordinator;
pub mod path_walker;
pub mod queue;
pub mod worker;

pub use coordinator::{ScanProgress, ScanStats, ScanStream, Scanner};
pub use path_walker::{validate_path, ExtensionFilter, PathWalker, DEFAULT_MAX_DEPTH};
pub use worker::{process_file, DEFAULT_FILE_TIMEOUT, DEFAULT_WORKER_COUNT};
