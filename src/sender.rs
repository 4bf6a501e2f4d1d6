//! Blocking HTTP client that posts expiry alerts to the dashboard
//!
//! Alerts are sent one at a time, without retries. A sender built without an
//! endpoint accepts every alert and does nothing.

use crate::alert::Alert;
use crate::cert::CertificateRecord;
use crate::error::SenderError;
use chrono::Utc;
use reqwest::blocking::Client;
use std::time::Duration;
use tracing::debug;

/// Client-wide request timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Upper bound for delivering a single alert
pub const ALERT_TIMEOUT: Duration = Duration::from_secs(20);

/// Posts [`Alert`]s to a configured endpoint
pub struct AlertSender {
    /// HTTP client with configured timeout
    client: Client,

    /// Alert URL; `None` disables sending
    endpoint: Option<String>,

    /// Reported as the alert's host
    host: String,
}

impl AlertSender {
    /// Create a sender for `endpoint`, reporting alerts as coming from `host`
    pub fn new(endpoint: Option<String>, host: impl Into<String>) -> Result<Self, SenderError> {
        let client = Client::builder().timeout(DEFAULT_TIMEOUT).build()?;

        Ok(Self {
            client,
            endpoint,
            host: host.into(),
        })
    }

    pub fn endpoint(&self) -> Option<&str> {
        self.endpoint.as_deref()
    }

    /// Post the alert for one expiring certificate
    pub fn send_alert(&self, record: &CertificateRecord) -> Result<(), SenderError> {
        let Some(endpoint) = &self.endpoint else {
            return Ok(());
        };

        let alert = Alert::expiring(&self.host, record, Utc::now());
        self.send(endpoint, &alert)
    }

    fn send(&self, endpoint: &str, alert: &Alert) -> Result<(), SenderError> {
        let response = self
            .client
            .post(endpoint)
            .timeout(ALERT_TIMEOUT)
            .json(alert)
            .send()?;

        let status = response.status();
        if !status.is_success() {
            return Err(SenderError::Status(status.as_u16()));
        }

        debug!(path = %alert.path, endpoint, "Alert delivered");
        Ok(())
    }
}
