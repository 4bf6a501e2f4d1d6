//! Alert payload shared by the sender and the dashboard server

use crate::cert::CertificateRecord;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Level attached to every expiry alert
pub const ALERT_LEVEL: &str = "WARN";

/// Message attached to every expiry alert
pub const ALERT_MESSAGE: &str = "Certificate expiring soon";

/// One expiring certificate, as posted to and stored by the dashboard.
///
/// Every field defaults when absent so that an incomplete body decodes and
/// can be rejected with a precise reason by [`Alert::missing_fields`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    #[serde(default)]
    pub host: String,

    /// Filled in by the server when the sender omitted it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,

    #[serde(default)]
    pub level: String,

    #[serde(default)]
    pub message: String,

    #[serde(default)]
    pub path: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration_date: Option<DateTime<Utc>>,

    #[serde(default)]
    pub days_until_expiry: i64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serial_number: Option<String>,
}

impl Alert {
    /// Build the alert for an expiring certificate seen on `host`
    pub fn expiring(host: &str, record: &CertificateRecord, timestamp: DateTime<Utc>) -> Self {
        Self {
            host: host.to_string(),
            timestamp: Some(timestamp),
            level: ALERT_LEVEL.to_string(),
            message: ALERT_MESSAGE.to_string(),
            path: record.path.display().to_string(),
            expiration_date: Some(record.expiration_date),
            days_until_expiry: record.days_until_expiry,
            subject: record.subject.clone(),
            serial_number: Some(record.serial_number.clone()).filter(|s| !s.is_empty()),
        }
    }

    /// True when host, path or expiration date is missing
    pub fn missing_fields(&self) -> bool {
        self.host.is_empty() || self.path.is_empty() || self.expiration_date.is_none()
    }

    /// Alerts are keyed by host and path
    pub fn same_target(&self, other: &Alert) -> bool {
        self.host == other.host && self.path == other.path
    }
}
