//! Worker thread logic for parallel certificate parsing
//!
//! Each worker:
//! - Pulls candidate paths from the path queue
//! - Stops picking up work once shutdown is requested
//! - Registers the file with the shutdown coordinator while it is in flight
//! - Parses the file under a per-file deadline
//! - Sends exactly one [`ScanOutcome`] per file to the outcome queue

use crate::cert::CertParser;
use crate::error::{ScanError, ScanOutcome, WorkerError};
use crate::shutdown::{CancelToken, ShutdownCoordinator};
use crate::walker::coordinator::ScanStats;
use crate::walker::queue::{QueueReceiver, QueueSender, SendStatus};
use crossbeam_channel::{after, bounded, select};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, trace, warn};

/// Default number of workers
pub const DEFAULT_WORKER_COUNT: usize = 10;

/// Default per-file deadline
pub const DEFAULT_FILE_TIMEOUT: Duration = Duration::from_secs(60);

/// State shared by every worker of one scan
#[derive(Clone)]
pub struct WorkerContext {
    pub parser: Arc<CertParser>,
    pub shutdown: Arc<ShutdownCoordinator>,
    pub cancel: CancelToken,
    pub file_timeout: Duration,
    pub stats: Arc<ScanStats>,
}

/// A worker thread that parses candidate files
pub struct Worker {
    /// Worker ID
    id: usize,

    /// Thread handle
    handle: Option<JoinHandle<()>>,
}

impl Worker {
    /// Spawn a new worker thread
    pub fn spawn(
        id: usize,
        ctx: WorkerContext,
        paths: QueueReceiver<PathBuf>,
        outcomes: QueueSender<ScanOutcome>,
    ) -> Result<Self, WorkerError> {
        let name = format!("cert-worker-{}", id);
        let handle = thread::Builder::new()
            .name(name.clone())
            .spawn(move || worker_loop(id, ctx, paths, outcomes))
            .map_err(|e| WorkerError::SpawnFailed {
                name,
                reason: e.to_string(),
            })?;

        Ok(Self {
            id,
            handle: Some(handle),
        })
    }

    /// Get worker ID
    pub fn id(&self) -> usize {
        self.id
    }

    /// Wait for the worker to finish
    pub fn join(mut self) -> Result<(), WorkerError> {
        match self.handle.take() {
            Some(handle) => handle.join().map_err(|_| WorkerError::Panicked {
                name: format!("cert-worker-{}", self.id),
            }),
            None => Ok(()),
        }
    }
}

/// Main worker loop
fn worker_loop(
    id: usize,
    ctx: WorkerContext,
    paths: QueueReceiver<PathBuf>,
    outcomes: QueueSender<ScanOutcome>,
) {
    trace!(worker = id, "Worker starting");

    while let Some(path) = paths.recv_or_cancel(&ctx.cancel) {
        if ctx.shutdown.is_shutting_down() {
            debug!(worker = id, "Shutdown requested, worker exiting");
            return;
        }

        let outcome = {
            let _in_flight = ctx.shutdown.track();
            process_file(path, &ctx.parser, ctx.file_timeout, &ctx.cancel)
        };
        ctx.stats.record_outcome(&outcome);

        match outcomes.send(outcome, &ctx.cancel) {
            SendStatus::Sent => {}
            SendStatus::Cancelled | SendStatus::Disconnected => {
                debug!(worker = id, "Outcome queue unavailable, worker exiting");
                return;
            }
        }
    }

    trace!(worker = id, "Worker finished");
}

/// Parse one file under a deadline, racing against cancellation.
///
/// The parse itself runs on a helper thread. If the deadline or the
/// cancellation wins, the helper is detached; it finishes on its own and its
/// result is discarded.
pub fn process_file(
    path: PathBuf,
    parser: &Arc<CertParser>,
    timeout: Duration,
    cancel: &CancelToken,
) -> ScanOutcome {
    if cancel.is_cancelled() {
        return ScanOutcome::Failed {
            error: ScanError::Cancelled { path: path.clone() },
            path,
        };
    }

    let (done_tx, done_rx) = bounded(1);
    let job_parser = Arc::clone(parser);
    let job_path = path.clone();
    let spawned = thread::Builder::new()
        .name("cert-parse".into())
        .spawn(move || {
            let _ = done_tx.send(job_parser.parse_file(&job_path));
        });

    if let Err(e) = spawned {
        return ScanOutcome::Failed {
            error: ScanError::Io {
                path: path.clone(),
                reason: format!("failed to spawn parse thread: {}", e),
            },
            path,
        };
    }

    let deadline = after(timeout);
    let result = select! {
        recv(done_rx) -> res => res.unwrap_or_else(|_| Err(ScanError::Parse {
            path: path.clone(),
            reason: "parser terminated unexpectedly".into(),
        })),
        recv(cancel.signal()) -> _ => Err(ScanError::Cancelled { path: path.clone() }),
        recv(deadline) -> _ => Err(ScanError::Timeout { path: path.clone(), after: timeout }),
    };

    match &result {
        Err(ScanError::Timeout { .. }) => {
            warn!(
                path = %path.display(),
                timeout_ms = timeout.as_millis() as u64,
                "Certificate parsing timeout"
            );
        }
        Err(ScanError::Cancelled { .. }) => {
            debug!(path = %path.display(), "Certificate parsing cancelled");
        }
        Err(e) => {
            debug!(path = %path.display(), error = %e, "Failed to parse certificate");
        }
        Ok(records) => {
            trace!(path = %path.display(), certificates = records.len(), "Certificate file parsed");
        }
    }

    ScanOutcome::from_result(path, result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn parser() -> Arc<CertParser> {
        Arc::new(CertParser::new(false, 30))
    }

    #[test]
    fn test_process_file_cancelled_before_start() {
        let cancel = CancelToken::new();
        cancel.cancel();

        let outcome = process_file(
            PathBuf::from("/non/existent/file.pem"),
            &parser(),
            Duration::from_secs(5),
            &cancel,
        );

        assert!(matches!(outcome.error(), Some(ScanError::Cancelled { .. })));
    }

    #[test]
    fn test_process_file_reports_parse_failure() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("junk.pem");
        fs::write(&path, "not a certificate").unwrap();

        let outcome = process_file(
            path.clone(),
            &parser(),
            Duration::from_secs(5),
            &CancelToken::new(),
        );
        assert_eq!(outcome.path(), path.as_path());
        assert!(matches!(outcome.error(), Some(ScanError::NoCertificateFound { .. })));
    }

    #[cfg(unix)]
    #[test]
    fn test_process_file_times_out() {
        let dir = tempdir().unwrap();
        let fifo = dir.path().join("stuck.pem");
        let status = std::process::Command::new("mkfifo").arg(&fifo).status();
        if !matches!(status, Ok(s) if s.success()) {
            return;
        }

        // Reading a FIFO with no writer blocks forever
        let outcome = process_file(
            fifo,
            &parser(),
            Duration::from_millis(100),
            &CancelToken::new(),
        );
        match outcome.error() {
            Some(ScanError::Timeout { after, .. }) => {
                assert_eq!(*after, Duration::from_millis(100))
            }
            other => panic!("expected timeout, got {:?}", other),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_process_file_cancelled_while_blocked() {
        let dir = tempdir().unwrap();
        let fifo = dir.path().join("stuck.pem");
        let status = std::process::Command::new("mkfifo").arg(&fifo).status();
        if !matches!(status, Ok(s) if s.success()) {
            return;
        }

        let cancel = CancelToken::new();
        let canceller = cancel.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            canceller.cancel();
        });

        let outcome = process_file(fifo, &parser(), Duration::from_secs(30), &cancel);
        assert!(matches!(outcome.error(), Some(ScanError::Cancelled { .. })));
        handle.join().unwrap();
    }
}
