//! Progress reporting for the certificate scan
//!
//! Everything here draws on stderr: stdout carries the JSON records.

use crate::config::ScanConfig;
use crate::report::ScanSummary;
use crate::walker::{ScanProgress, ScanStats};
use console::style;
use humansize::{format_size, BINARY};
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Refresh interval of the spinner message
const REFRESH_INTERVAL: Duration = Duration::from_millis(200);

/// Progress reporter that displays scan status
pub struct ProgressReporter {
    /// Progress bar
    bar: ProgressBar,

    /// Stop signal for the refresh thread
    stop: Arc<AtomicBool>,

    /// Refresh thread, when watching live stats
    refresher: Option<JoinHandle<()>>,
}

impl ProgressReporter {
    /// Create a new progress reporter
    pub fn new() -> Self {
        let bar = ProgressBar::new_spinner();

        let spinner = ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏");
        bar.set_style(spinner);
        bar.enable_steady_tick(Duration::from_millis(100));

        Self {
            bar,
            stop: Arc::new(AtomicBool::new(false)),
            refresher: None,
        }
    }

    /// Refresh the message from `stats` until the reporter is finished
    pub fn watch(&mut self, stats: Arc<ScanStats>) {
        let bar = self.bar.clone();
        let stop = Arc::clone(&self.stop);

        let spawned = thread::Builder::new()
            .name("progress".into())
            .spawn(move || {
                while !stop.load(Ordering::SeqCst) {
                    bar.set_message(progress_message(&stats.snapshot()));
                    thread::sleep(REFRESH_INTERVAL);
                }
            });

        // Without the thread the spinner still ticks, only the counts are missing
        self.refresher = spawned.ok();
    }

    /// Update the progress display
    pub fn update(&self, progress: &ScanProgress) {
        self.bar.set_message(progress_message(progress));
    }

    /// Set a status message
    pub fn set_status(&self, status: &str) {
        self.bar.set_message(status.to_string());
    }

    /// Finish the progress display with a final message
    pub fn finish(&mut self, message: &str) {
        self.stop_refresher();
        self.bar.finish_with_message(message.to_string());
    }

    /// Finish and clear the progress display
    pub fn finish_and_clear(&mut self) {
        self.stop_refresher();
        self.bar.finish_and_clear();
    }

    fn stop_refresher(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.refresher.take() {
            let _ = handle.join();
        }
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ProgressReporter {
    fn drop(&mut self) {
        self.stop_refresher();
    }
}

fn progress_message(progress: &ScanProgress) -> String {
    format!(
        "Dirs: {} | Files: {}/{} | Certificates: {} | Failed: {} | Queued: {}",
        format_number(progress.dirs_walked),
        format_number(progress.files_scanned),
        format_number(progress.files_queued),
        format_number(progress.certificates_found),
        format_number(progress.files_failed),
        format_number(progress.paths_pending),
    )
}

/// Format a number with thousands separators
fn format_number(n: u64) -> String {
    let s = n.to_string();
    let bytes: Vec<_> = s.bytes().rev().collect();

    let chunks: Vec<String> = bytes
        .chunks(3)
        .map(|chunk| chunk.iter().rev().map(|&b| b as char).collect::<String>())
        .collect();

    chunks.into_iter().rev().collect::<Vec<_>>().join(",")
}

/// Print the scan settings
pub fn print_header(config: &ScanConfig) {
    let paths: Vec<String> = config.paths.iter().map(|p| p.display().to_string()).collect();

    eprintln!();
    eprintln!(
        "{} {}",
        style("cert-walker").cyan().bold(),
        env!("CARGO_PKG_VERSION")
    );
    eprintln!("{}", style("─".repeat(50)).dim());
    eprintln!("  {} {}", style("Paths:").bold(), paths.join(", "));
    eprintln!("  {} {} days", style("Threshold:").bold(), config.days_threshold);
    eprintln!("  {} {}", style("Workers:").bold(), config.worker_count);
    eprintln!(
        "  {} {}",
        style("Max file size:").bold(),
        format_size(config.max_file_size, BINARY)
    );
    eprintln!();
}

/// Print a summary of the scan results
pub fn print_summary(summary: &ScanSummary, progress: &ScanProgress, duration: Duration) {
    let duration_secs = duration.as_secs_f64();
    let rate = if duration_secs > 0.0 {
        progress.files_scanned as f64 / duration_secs
    } else {
        0.0
    };

    let title = if summary.interrupted {
        style("Scan Interrupted").yellow().bold()
    } else {
        style("Scan Complete").green().bold()
    };

    eprintln!();
    eprintln!("{}", title);
    eprintln!("{}", style("─".repeat(50)).dim());
    eprintln!(
        "  {} {}",
        style("Directories:").bold(),
        format_number(progress.dirs_walked)
    );
    eprintln!(
        "  {} {}",
        style("Files:").bold(),
        format_number(progress.files_scanned)
    );
    eprintln!(
        "  {} {}",
        style("Certificates:").bold(),
        format_number(summary.processed)
    );
    eprintln!(
        "  {} {:.1}s ({:.0} files/sec)",
        style("Duration:").bold(),
        duration_secs,
        rate
    );
    if summary.warnings > 0 {
        eprintln!(
            "  {} {}",
            style("Expiring:").red().bold(),
            format_number(summary.warnings)
        );
    }
    if summary.errors > 0 {
        eprintln!(
            "  {} {}",
            style("Errors:").yellow().bold(),
            format_number(summary.errors)
        );
    }
    if progress.walker_stalls > 0 {
        eprintln!(
            "  {} {}",
            style("Queue full:").dim(),
            format_number(progress.walker_stalls)
        );
    }
    if progress.dirs_skipped > 0 {
        eprintln!(
            "  {} {}",
            style("Skipped dirs:").yellow().bold(),
            format_number(progress.dirs_skipped)
        );
    }
    eprintln!();
}
