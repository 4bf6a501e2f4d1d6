//! cert-walker - Filesystem X.509 Certificate Expiry Scanner
//!
//! Entry point for the CLI application.

use anyhow::{Context, Result};
use cert_walker::config::{CliArgs, Command, ScanConfig, ServeArgs};
use cert_walker::progress::{print_header, print_summary, ProgressReporter};
use cert_walker::report::ReportWriter;
use cert_walker::sender::AlertSender;
use cert_walker::shutdown::{CancelToken, ShutdownCoordinator};
use cert_walker::walker::Scanner;
use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, info_span, warn};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    // Parse CLI arguments
    let args = CliArgs::parse();

    match &args.command {
        Some(Command::Serve(serve)) => {
            setup_logging(serve.verbose)?;
            run_server(serve)
        }
        None => {
            setup_logging(args.verbose)?;
            run_scan(&args)
        }
    }
}

/// Scan the configured paths and report every certificate found
fn run_scan(args: &CliArgs) -> Result<()> {
    let config = Arc::new(ScanConfig::from_args(args).context("Invalid configuration")?);

    let host = hostname::get()
        .map(|h| h.to_string_lossy().into_owned())
        .unwrap_or_else(|e| {
            warn!(error = %e, "Failed to resolve hostname");
            "unknown".to_string()
        });
    let span = info_span!("scan", host = %host);
    let _enter = span.enter();

    // Built from the final config so the signal handler and the pipeline
    // share one coordinator
    let shutdown = Arc::new(ShutdownCoordinator::new(config.shutdown_timeout));
    let cancel = CancelToken::new();
    {
        let shutdown = Arc::clone(&shutdown);
        let cancel = cancel.clone();
        ctrlc::set_handler(move || {
            eprintln!("\nInterrupt received, shutting down...");
            shutdown.shutdown();
            cancel.cancel();
        })
        .context("Failed to set signal handler")?;
    }

    info!(
        days_threshold = config.days_threshold,
        paths = ?config.paths,
        ext = ?config.extensions,
        workers = config.worker_count,
        "Certificate scan configuration"
    );

    if config.show_progress {
        print_header(&config);
    }

    let sender = match &config.send_to {
        Some(url) => Some(
            AlertSender::new(Some(url.clone()), host.clone())
                .context("Failed to create alert sender")?,
        ),
        None => None,
    };

    let start = Instant::now();
    let scanner = Scanner::new(Arc::clone(&config), Arc::clone(&shutdown));
    let stream = scanner
        .scan(config.paths.clone(), cancel)
        .context("Failed to start scan")?;
    let stats = stream.stats();

    let mut progress = config.show_progress.then(ProgressReporter::new);
    if let Some(p) = progress.as_mut() {
        p.watch(Arc::clone(&stats));
    }

    let mut writer = ReportWriter::stdio(host, sender);
    let summary = writer
        .consume(stream, &shutdown)
        .context("Failed to write scan results")?;

    if let Some(mut p) = progress.take() {
        if summary.interrupted {
            p.finish("Scan interrupted");
        } else {
            p.finish("Scan completed");
        }
    }

    info!(
        processed = summary.processed,
        warnings = summary.warnings,
        errors = summary.errors,
        "Scan completed"
    );

    if config.show_progress {
        print_summary(&summary, &stats.snapshot(), start.elapsed());
    }

    // Bounded by the shutdown timeout; logs a warning itself on expiry
    if shutdown.wait() {
        debug!("All in-flight work drained");
    }

    if summary.interrupted {
        info!("Scan was interrupted before completion");
    }

    Ok(())
}

/// Run the alert dashboard until Ctrl-C
fn run_server(args: &ServeArgs) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to create async runtime")?;

    runtime
        .block_on(cert_walker::server::serve(args))
        .context("Server failed")?;

    info!("cert-walker shutdown completed");
    Ok(())
}

fn setup_logging(verbose: bool) -> Result<()> {
    let default = if verbose {
        "cert_walker=debug,warn"
    } else {
        "cert_walker=info,warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    // stdout carries the JSON records
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    Ok(())
}
