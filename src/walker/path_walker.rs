//! Depth-bounded directory walker
//!
//! Recursively lists the configured roots and sends every file that passes
//! the extension filter to the path queue. Failures never abort the walk:
//!
//! - a directory nested deeper than the limit is skipped with a warning
//! - a directory whose path fails validation is skipped with a warning
//! - a directory that cannot be listed is skipped with a warning
//!
//! The shutdown flag and the cancellation signal are checked before each
//! directory and before each entry. Either stops the walk silently.

use crate::config::ScanConfig;
use crate::error::WalkError;
use crate::shutdown::{CancelToken, ShutdownCoordinator};
use crate::walker::coordinator::ScanStats;
use crate::walker::queue::{QueueSender, SendStatus};
use std::fs;
use std::ops::ControlFlow;
use std::path::{is_separator, Component, Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Default maximum directory depth below each root
pub const DEFAULT_MAX_DEPTH: usize = 20;

/// Case-sensitive file name suffix filter
#[derive(Debug, Clone, Default)]
pub struct ExtensionFilter {
    extensions: Vec<String>,
}

impl ExtensionFilter {
    pub fn new(extensions: Vec<String>) -> Self {
        Self { extensions }
    }

    /// An empty allow-list accepts every file
    pub fn matches(&self, file_name: &str) -> bool {
        self.extensions.is_empty()
            || self
                .extensions
                .iter()
                .any(|ext| file_name.ends_with(ext.as_str()))
    }
}

/// Reject traversal segments and paths that differ from their cleaned form.
///
/// The traversal check is a plain substring test, so it holds for both `/`
/// and `\` separator styles.
pub fn validate_path(path: &Path) -> Result<(), WalkError> {
    let raw = path.to_string_lossy();

    if raw.contains("..") {
        return Err(WalkError::PathTraversal {
            path: raw.into_owned(),
        });
    }

    let has_trailing_separator = raw.chars().last().is_some_and(is_separator);
    if clean_path(path).as_os_str() != path.as_os_str() && !has_trailing_separator {
        return Err(WalkError::SuspiciousPath {
            path: raw.into_owned(),
        });
    }

    Ok(())
}

/// Lexical normalization: collapses repeated separators and `.` segments and
/// drops a trailing separator
pub fn clean_path(path: &Path) -> PathBuf {
    let cleaned: PathBuf = path
        .components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect();

    if cleaned.as_os_str().is_empty() {
        PathBuf::from(".")
    } else {
        cleaned
    }
}

/// Walks root paths and feeds candidate files to the path queue
pub struct PathWalker {
    filter: ExtensionFilter,
    max_depth: usize,
    shutdown: Arc<ShutdownCoordinator>,
    cancel: CancelToken,
    stats: Arc<ScanStats>,
}

impl PathWalker {
    pub fn new(
        config: &ScanConfig,
        shutdown: Arc<ShutdownCoordinator>,
        cancel: CancelToken,
        stats: Arc<ScanStats>,
    ) -> Self {
        Self {
            filter: ExtensionFilter::new(config.extensions.clone()),
            max_depth: config.max_depth,
            shutdown,
            cancel,
            stats,
        }
    }

    /// Walk every root in order, then return. Dropping `tx` afterwards closes
    /// the path queue.
    pub fn walk(&self, roots: &[PathBuf], tx: &QueueSender<PathBuf>) {
        for root in roots {
            if self.should_stop() {
                debug!("Walk stopped before all roots were visited");
                return;
            }

            if self.walk_dir(root, tx, 0).is_break() {
                debug!(root = %root.display(), "Walk stopped");
                return;
            }
        }
    }

    fn should_stop(&self) -> bool {
        self.shutdown.is_shutting_down() || self.cancel.is_cancelled()
    }

    fn walk_dir(&self, dir: &Path, tx: &QueueSender<PathBuf>, depth: usize) -> ControlFlow<()> {
        if depth > self.max_depth {
            let err = WalkError::DepthExceeded {
                path: dir.to_path_buf(),
                depth,
                max: self.max_depth,
            };
            warn!(
                path = %dir.display(),
                depth,
                error = %err,
                "Maximum directory depth exceeded"
            );
            self.stats.record_dir_skipped();
            return ControlFlow::Continue(());
        }

        if self.should_stop() {
            return ControlFlow::Break(());
        }

        if let Err(err) = validate_path(dir) {
            warn!(path = %dir.display(), error = %err, "Invalid path detected");
            self.stats.record_dir_skipped();
            return ControlFlow::Continue(());
        }

        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                let err = WalkError::DirectoryRead {
                    path: dir.to_path_buf(),
                    reason: e.to_string(),
                };
                warn!(path = %dir.display(), error = %err, "Failed to read directory");
                self.stats.record_dir_skipped();
                return ControlFlow::Continue(());
            }
        };

        self.stats.record_dir_walked();

        for entry in entries {
            if self.should_stop() {
                return ControlFlow::Break(());
            }

            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(path = %dir.display(), error = %e, "Failed to read directory entry");
                    continue;
                }
            };

            // Joined lexically clean so children always pass validation
            let path = clean_path(&dir.join(entry.file_name()));
            let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);

            if is_dir {
                self.walk_dir(&path, tx, depth + 1)?;
                continue;
            }

            if !self.filter.matches(&entry.file_name().to_string_lossy()) {
                continue;
            }

            trace!(path = %path.display(), "Queueing candidate file");
            match tx.send(path, &self.cancel) {
                SendStatus::Sent => self.stats.record_file_queued(),
                SendStatus::Cancelled | SendStatus::Disconnected => return ControlFlow::Break(()),
            }
        }

        ControlFlow::Continue(())
    }
}
