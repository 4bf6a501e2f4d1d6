//! Scan coordinator - orchestrates the concurrent scan pipeline
//!
//! The coordinator is responsible for:
//! - Setting up the path and outcome queues
//! - Spawning the path walker and the worker pool
//! - Closing the outcome queue exactly once, after every producer is gone
//! - Collecting scan statistics

use crate::cert::CertParser;
use crate::config::ScanConfig;
use crate::error::{Result, ScanOutcome, WorkerError};
use crate::shutdown::{CancelToken, ShutdownCoordinator};
use crate::walker::path_walker::PathWalker;
use crate::walker::queue::{bounded, QueueReceiver, QueueSender, QueueStats};
use crate::walker::worker::{Worker, WorkerContext};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

/// Live counters shared by the walker and the workers
#[derive(Debug, Default)]
pub struct ScanStats {
    dirs_walked: AtomicU64,
    dirs_skipped: AtomicU64,
    files_queued: AtomicU64,
    files_scanned: AtomicU64,
    files_failed: AtomicU64,
    certificates_found: AtomicU64,
    timeouts: AtomicU64,
    path_queue: Arc<QueueStats>,
    outcome_queue: Arc<QueueStats>,
}

impl ScanStats {
    /// Counters that also report the depth of both pipeline queues
    pub fn with_queues(path_queue: Arc<QueueStats>, outcome_queue: Arc<QueueStats>) -> Self {
        Self {
            path_queue,
            outcome_queue,
            ..Self::default()
        }
    }

    pub fn record_dir_walked(&self) {
        self.dirs_walked.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dir_skipped(&self) {
        self.dirs_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_file_queued(&self) {
        self.files_queued.fetch_add(1, Ordering::Relaxed);
    }

    /// Count one finished file
    pub fn record_outcome(&self, outcome: &ScanOutcome) {
        self.files_scanned.fetch_add(1, Ordering::Relaxed);

        match outcome {
            ScanOutcome::Certificates { records, .. } => {
                self.certificates_found
                    .fetch_add(records.len() as u64, Ordering::Relaxed);
            }
            ScanOutcome::Failed { error, .. } => {
                self.files_failed.fetch_add(1, Ordering::Relaxed);
                if error.is_timeout() {
                    self.timeouts.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
    }

    /// Point-in-time copy of every counter
    pub fn snapshot(&self) -> ScanProgress {
        ScanProgress {
            dirs_walked: self.dirs_walked.load(Ordering::Relaxed),
            dirs_skipped: self.dirs_skipped.load(Ordering::Relaxed),
            files_queued: self.files_queued.load(Ordering::Relaxed),
            files_scanned: self.files_scanned.load(Ordering::Relaxed),
            files_failed: self.files_failed.load(Ordering::Relaxed),
            certificates_found: self.certificates_found.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            paths_pending: self.path_queue.pending(),
            outcomes_pending: self.outcome_queue.pending(),
            walker_stalls: self.path_queue.backpressure_count(),
        }
    }
}

/// Snapshot of [`ScanStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanProgress {
    pub dirs_walked: u64,
    pub dirs_skipped: u64,
    pub files_queued: u64,
    pub files_scanned: u64,
    pub files_failed: u64,
    pub certificates_found: u64,
    pub timeouts: u64,

    /// Candidate paths waiting for a worker
    pub paths_pending: u64,

    /// Outcomes waiting for the consumer
    pub outcomes_pending: u64,

    /// Times the walker blocked on a full path queue
    pub walker_stalls: u64,
}

/// Entry point of the scan pipeline
pub struct Scanner {
    /// Configuration
    config: Arc<ScanConfig>,

    /// Shared by every worker
    parser: Arc<CertParser>,

    /// Shutdown coordinator (also held by the signal handler)
    shutdown: Arc<ShutdownCoordinator>,
}

impl Scanner {
    /// Create a scanner; the parser is built from the config
    pub fn new(config: Arc<ScanConfig>, shutdown: Arc<ShutdownCoordinator>) -> Self {
        let parser = CertParser::new(config.include_subject, config.days_threshold)
            .with_max_file_size(config.max_file_size);

        Self {
            config,
            parser: Arc::new(parser),
            shutdown,
        }
    }

    /// Get the shutdown coordinator
    pub fn shutdown(&self) -> Arc<ShutdownCoordinator> {
        Arc::clone(&self.shutdown)
    }

    /// Start scanning `roots` and return the lazy outcome stream.
    ///
    /// The stream ends once the walk and every worker have finished, or as
    /// soon as `cancel` fires.
    pub fn scan(&self, roots: Vec<PathBuf>, cancel: CancelToken) -> Result<ScanStream> {
        self.config.validate()?;

        let (path_tx, path_rx) = bounded::<PathBuf>(self.config.queue_capacity);
        let (outcome_tx, outcome_rx) = bounded::<ScanOutcome>(self.config.queue_capacity);
        let stats = Arc::new(ScanStats::with_queues(path_tx.stats(), outcome_tx.stats()));

        info!(
            roots = roots.len(),
            workers = self.config.worker_count,
            max_depth = self.config.max_depth,
            "Starting certificate scan"
        );

        // Workers first: if one fails to spawn, dropping path_tx here lets the
        // ones already running drain out
        let ctx = WorkerContext {
            parser: Arc::clone(&self.parser),
            shutdown: Arc::clone(&self.shutdown),
            cancel: cancel.clone(),
            file_timeout: self.config.file_timeout,
            stats: Arc::clone(&stats),
        };
        let mut workers = Vec::with_capacity(self.config.worker_count);
        for id in 0..self.config.worker_count {
            workers.push(Worker::spawn(id, ctx.clone(), path_rx.clone(), outcome_tx.clone())?);
        }
        drop(path_rx);
        debug!(count = workers.len(), "Workers spawned");

        let walker = PathWalker::new(
            &self.config,
            Arc::clone(&self.shutdown),
            cancel.clone(),
            Arc::clone(&stats),
        );
        let walker_handle = thread::Builder::new()
            .name("path-walker".into())
            .spawn(move || {
                walker.walk(&roots, &path_tx);
                debug!("Path walker finished");
            })
            .map_err(|e| WorkerError::SpawnFailed {
                name: "path-walker".into(),
                reason: e.to_string(),
            })?;

        let pipeline_stats = Arc::clone(&stats);
        let orchestrator = thread::Builder::new()
            .name("scan-pipeline".into())
            .spawn(move || close_when_done(walker_handle, workers, outcome_tx, pipeline_stats))
            .map_err(|e| WorkerError::SpawnFailed {
                name: "scan-pipeline".into(),
                reason: e.to_string(),
            })?;

        Ok(ScanStream {
            outcomes: outcome_rx,
            cancel,
            stats,
            start_time: Instant::now(),
            orchestrator: Some(orchestrator),
        })
    }
}

/// Join the walker and all workers, then close the outcome queue
fn close_when_done(
    walker: JoinHandle<()>,
    workers: Vec<Worker>,
    outcome_tx: QueueSender<ScanOutcome>,
    stats: Arc<ScanStats>,
) -> std::result::Result<(), WorkerError> {
    let mut first_error = None;

    if walker.join().is_err() {
        error!("Path walker panicked");
        first_error = Some(WorkerError::Panicked {
            name: "path-walker".into(),
        });
    }

    for worker in workers {
        if let Err(e) = worker.join() {
            error!(error = %e, "Worker failed");
            first_error.get_or_insert(e);
        }
    }

    // Last sender: the consumer sees the end of the stream after this
    drop(outcome_tx);

    let snapshot = stats.snapshot();
    info!(
        dirs = snapshot.dirs_walked,
        skipped = snapshot.dirs_skipped,
        files = snapshot.files_scanned,
        failed = snapshot.files_failed,
        certificates = snapshot.certificates_found,
        walker_stalls = snapshot.walker_stalls,
        "Scan pipeline finished"
    );

    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// Lazy sequence of per-file outcomes, in completion order
pub struct ScanStream {
    outcomes: QueueReceiver<ScanOutcome>,
    cancel: CancelToken,
    stats: Arc<ScanStats>,
    start_time: Instant,
    orchestrator: Option<JoinHandle<std::result::Result<(), WorkerError>>>,
}

impl ScanStream {
    /// Get live scan statistics
    pub fn stats(&self) -> Arc<ScanStats> {
        Arc::clone(&self.stats)
    }

    /// Time since the scan started
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Stop consuming and wait for every pipeline thread to exit.
    ///
    /// Dropping the receiver first unblocks workers waiting on a full outcome
    /// queue. Workers still parsing finish their current file first, so this
    /// can take up to one per-file timeout.
    pub fn join(mut self) -> std::result::Result<ScanProgress, WorkerError> {
        let handle = self.orchestrator.take();
        let stats = Arc::clone(&self.stats);
        drop(self);

        if let Some(handle) = handle {
            handle.join().map_err(|_| WorkerError::Panicked {
                name: "scan-pipeline".into(),
            })??;
        }

        Ok(stats.snapshot())
    }
}

impl Iterator for ScanStream {
    type Item = ScanOutcome;

    fn next(&mut self) -> Option<ScanOutcome> {
        self.outcomes.recv_or_cancel(&self.cancel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{CertWalkerError, ConfigError};
    use std::fs;
    use tempfile::tempdir;

    fn scanner(config: ScanConfig) -> Scanner {
        Scanner::new(
            Arc::new(config),
            Arc::new(ShutdownCoordinator::new(Duration::from_secs(1))),
        )
    }

    #[test]
    fn test_scan_stats_record_outcome() {
        let stats = ScanStats::default();
        stats.record_outcome(&ScanOutcome::Certificates {
            path: PathBuf::from("/a.pem"),
            records: Vec::new(),
        });
        stats.record_outcome(&ScanOutcome::Failed {
            path: PathBuf::from("/b.pem"),
            error: crate::error::ScanError::Timeout {
                path: PathBuf::from("/b.pem"),
                after: Duration::from_secs(1),
            },
        });

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.files_scanned, 2);
        assert_eq!(snapshot.files_failed, 1);
        assert_eq!(snapshot.timeouts, 1);
    }

    #[test]
    fn test_empty_directory_yields_nothing() {
        let dir = tempdir().unwrap();
        let scanner = scanner(ScanConfig::default());

        let stream = scanner
            .scan(vec![dir.path().to_path_buf()], CancelToken::new())
            .unwrap();
        let outcomes: Vec<_> = stream.collect();
        assert!(outcomes.is_empty());
    }

    #[test]
    fn test_one_outcome_per_candidate_file() {
        let dir = tempdir().unwrap();
        for i in 0..25 {
            fs::write(dir.path().join(format!("junk{}.pem", i)), "junk").unwrap();
        }
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let config = ScanConfig {
            worker_count: 4,
            queue_capacity: 2,
            ..ScanConfig::default()
        };
        let scanner = scanner(config);
        let mut stream = scanner
            .scan(vec![dir.path().to_path_buf()], CancelToken::new())
            .unwrap();

        let mut paths: Vec<PathBuf> = stream.by_ref().map(|o| o.path().to_path_buf()).collect();
        paths.sort();
        paths.dedup();
        assert_eq!(paths.len(), 25);

        let progress = stream.join().unwrap();
        assert_eq!(progress.files_queued, 25);
        assert_eq!(progress.files_scanned, 25);
        assert_eq!(progress.files_failed, 25);
        assert_eq!(progress.paths_pending, 0);
        assert_eq!(progress.outcomes_pending, 0);
    }

    #[test]
    fn test_snapshot_reports_queue_depth() {
        let cancel = CancelToken::new();
        let (path_tx, path_rx) = bounded::<PathBuf>(1);
        let (outcome_tx, _outcome_rx) = bounded::<ScanOutcome>(4);
        let stats = ScanStats::with_queues(path_tx.stats(), outcome_tx.stats());

        path_tx.send(PathBuf::from("/a.pem"), &cancel);
        outcome_tx.send(
            ScanOutcome::Certificates {
                path: PathBuf::from("/b.pem"),
                records: Vec::new(),
            },
            &cancel,
        );

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.paths_pending, 1);
        assert_eq!(snapshot.outcomes_pending, 1);
        assert_eq!(snapshot.walker_stalls, 0);

        // Full path queue: the next send stalls until a worker takes one
        let consumer = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            (path_rx.recv(), path_rx.recv())
        });
        path_tx.send(PathBuf::from("/c.pem"), &cancel);
        consumer.join().unwrap();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.paths_pending, 0);
        assert_eq!(snapshot.walker_stalls, 1);
    }

    #[test]
    fn test_invalid_config_is_rejected_before_start() {
        let dir = tempdir().unwrap();
        let config = ScanConfig {
            worker_count: 0,
            ..ScanConfig::default()
        };

        let result = scanner(config).scan(vec![dir.path().to_path_buf()], CancelToken::new());
        assert!(matches!(
            result,
            Err(CertWalkerError::Config(ConfigError::InvalidWorkerCount { count: 0, .. }))
        ));
    }

    #[test]
    fn test_pre_cancelled_scan_closes() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.pem"), "junk").unwrap();

        let cancel = CancelToken::new();
        cancel.cancel();

        let stream = scanner(ScanConfig::default())
            .scan(vec![dir.path().to_path_buf()], cancel)
            .unwrap();
        let outcomes: Vec<_> = stream.collect();
        assert!(outcomes.is_empty());
    }

    #[test]
    fn test_join_after_partial_consumption() {
        let dir = tempdir().unwrap();
        for i in 0..10 {
            fs::write(dir.path().join(format!("junk{}.pem", i)), "junk").unwrap();
        }

        let config = ScanConfig {
            worker_count: 2,
            queue_capacity: 1,
            ..ScanConfig::default()
        };
        let mut stream = scanner(config)
            .scan(vec![dir.path().to_path_buf()], CancelToken::new())
            .unwrap();

        assert!(stream.next().is_some());
        // Remaining producers must notice the dropped receiver and exit
        assert!(stream.join().is_ok());
    }
}
