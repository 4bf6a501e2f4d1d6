//! JSON file store for received alerts.

use crate::alert::Alert;
use crate::error::ServerResult;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;

/// Alerts kept in one pretty-printed JSON array, one entry per host and path
pub struct AlertStore {
    path: PathBuf,

    /// Serializes read-modify-write cycles
    write_lock: Mutex<()>,
}

impl AlertStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All stored alerts; a missing file is an empty store
    pub async fn load(&self) -> ServerResult<Vec<Alert>> {
        let data = match fs::read(&self.path).await {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        Ok(serde_json::from_slice(&data)?)
    }

    /// Replace the alert for the same host and path, or append it
    pub async fn upsert(&self, alert: Alert) -> ServerResult<()> {
        let _guard = self.write_lock.lock().await;

        let mut alerts = self.load().await?;
        match alerts.iter_mut().find(|a| a.same_target(&alert)) {
            Some(existing) => *existing = alert,
            None => alerts.push(alert),
        }

        self.save(&alerts).await
    }

    async fn save(&self, alerts: &[Alert]) -> ServerResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        let data = serde_json::to_vec_pretty(alerts)?;
        fs::write(&self.path, data).await?;
        Ok(())
    }
}
