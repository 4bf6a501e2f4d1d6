//! Caller-side consumption of the scan stream
//!
//! Healthy certificates are printed as one JSON object per line on the
//! output writer. Expiring ones are printed as `host::path => expiry` on the
//! error writer and forwarded to the alert sender. Failed files are counted
//! and logged.

use crate::cert::CertificateRecord;
use crate::error::ScanOutcome;
use crate::sender::AlertSender;
use crate::shutdown::ShutdownCoordinator;
use chrono::SecondsFormat;
use serde::Serialize;
use std::io::{self, Write};
use tracing::{error, info};

/// JSON line printed for a healthy certificate
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputRecord<'a> {
    pub host: &'a str,
    pub path: String,
    pub expires: String,
    pub days_until_expiry: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub serial_number: Option<&'a str>,
}

impl<'a> OutputRecord<'a> {
    pub fn new(host: &'a str, record: &'a CertificateRecord) -> Self {
        Self {
            host,
            path: record.path.display().to_string(),
            expires: rfc3339(record),
            days_until_expiry: record.days_until_expiry,
            subject: record.subject.as_deref(),
            serial_number: Some(record.serial_number.as_str()).filter(|s| !s.is_empty()),
        }
    }
}

fn rfc3339(record: &CertificateRecord) -> String {
    record.expiration_date.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Counters for one consumed scan
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanSummary {
    /// Certificates reported (healthy or expiring)
    pub processed: u64,

    /// Certificates expiring within the threshold
    pub warnings: u64,

    /// Files that failed
    pub errors: u64,

    /// Alerts that could not be delivered
    pub alerts_failed: u64,

    /// Consumption stopped early because of a shutdown request
    pub interrupted: bool,
}

/// Writes scan results to an output and an error stream
pub struct ReportWriter<O: Write, E: Write> {
    host: String,
    out: O,
    err: E,
    sender: Option<AlertSender>,
}

impl ReportWriter<io::Stdout, io::Stderr> {
    /// Report to stdout/stderr
    pub fn stdio(host: impl Into<String>, sender: Option<AlertSender>) -> Self {
        Self::new(host, io::stdout(), io::stderr(), sender)
    }
}

impl<O: Write, E: Write> ReportWriter<O, E> {
    pub fn new(host: impl Into<String>, out: O, err: E, sender: Option<AlertSender>) -> Self {
        Self {
            host: host.into(),
            out,
            err,
            sender,
        }
    }

    /// Drain `outcomes`, stopping early once shutdown is requested
    pub fn consume<I>(
        &mut self,
        outcomes: I,
        shutdown: &ShutdownCoordinator,
    ) -> io::Result<ScanSummary>
    where
        I: IntoIterator<Item = ScanOutcome>,
    {
        let mut summary = ScanSummary::default();

        for outcome in outcomes {
            if shutdown.is_shutting_down() {
                info!("Shutdown requested, stopping processing");
                summary.interrupted = true;
                break;
            }

            match outcome {
                ScanOutcome::Failed { path, error } => {
                    summary.errors += 1;
                    error!(path = %path.display(), error = %error, "Scan error");
                }
                ScanOutcome::Certificates { records, .. } => {
                    for record in &records {
                        self.report(record, &mut summary)?;
                    }
                }
            }
        }

        self.out.flush()?;
        self.err.flush()?;
        Ok(summary)
    }

    fn report(&mut self, record: &CertificateRecord, summary: &mut ScanSummary) -> io::Result<()> {
        summary.processed += 1;

        if !record.is_expiring_soon {
            let line = serde_json::to_string(&OutputRecord::new(&self.host, record))?;
            return writeln!(self.out, "{}", line);
        }

        summary.warnings += 1;
        writeln!(self.err, "{}::{} => {}", self.host, record.path.display(), rfc3339(record))?;

        if let Some(sender) = &self.sender {
            if let Err(e) = sender.send_alert(record) {
                summary.alerts_failed += 1;
                error!(path = %record.path.display(), error = %e, "Failed to send HTTP alert");
            }
        }

        Ok(())
    }

    /// Give back the writers
    pub fn into_inner(self) -> (O, E) {
        (self.out, self.err)
    }
}
