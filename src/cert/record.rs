//! Decoded certificate expiry metadata

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;

const SECONDS_PER_DAY: i64 = 24 * 60 * 60;

/// One decoded certificate
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateRecord {
    /// File the certificate was read from
    pub path: PathBuf,

    /// notAfter
    #[serde(rename = "expires")]
    pub expiration_date: DateTime<Utc>,

    /// Whole days until expiry, rounded towards negative infinity
    pub days_until_expiry: i64,

    pub is_expired: bool,

    pub is_expiring_soon: bool,

    /// Decimal serial number
    #[serde(skip_serializing_if = "String::is_empty")]
    pub serial_number: String,

    /// Only populated when subjects were requested
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,

    /// Only populated when subjects were requested
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,
}

impl CertificateRecord {
    /// Build a record, deriving the expiry fields from `now`.
    ///
    /// `now` must be sampled once per file so that every certificate of a
    /// chain is classified against the same instant.
    pub fn new(
        path: PathBuf,
        expiration_date: DateTime<Utc>,
        now: DateTime<Utc>,
        days_threshold: i64,
        serial_number: String,
    ) -> Self {
        let days_until_expiry = days_between(now, expiration_date);

        Self {
            path,
            expiration_date,
            days_until_expiry,
            is_expired: expiration_date < now,
            is_expiring_soon: (0..=days_threshold).contains(&days_until_expiry),
            serial_number,
            subject: None,
            issuer: None,
        }
    }

    /// Attach subject and issuer distinguished names
    pub fn with_names(mut self, subject: String, issuer: String) -> Self {
        self.subject = Some(subject);
        self.issuer = Some(issuer);
        self
    }
}

/// floor((to - from) / 24h)
fn days_between(from: DateTime<Utc>, to: DateTime<Utc>) -> i64 {
    let delta = to - from;
    let mut secs = delta.num_seconds();
    // num_seconds truncates towards zero
    if delta < chrono::Duration::seconds(secs) {
        secs -= 1;
    }
    secs.div_euclid(SECONDS_PER_DAY)
}
