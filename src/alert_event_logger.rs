// src/alert_event_logger.rs
use chrono::Utc;
use log::{error, info};
use serde_json::json;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Append-only JSON-lines audit trail of every alert that was delivered.
/// One file per process start, under `alerts/`. Logging failures are
/// reported but never fail the cycle that produced the alert.
pub struct AlertEventLogger {
    writer: Arc<Mutex<BufWriter<std::fs::File>>>,
    path: PathBuf,
}

impl AlertEventLogger {
    pub fn new() -> std::io::Result<Self> {
        let dir = PathBuf::from("alerts");
        std::fs::create_dir_all(&dir)?;

        let path = dir.join(format!(
            "alerts_{}.jsonl",
            Utc::now().format("%Y%m%d_%H%M%S")
        ));
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)?;

        info!("📝 Alert log: {}", path.display());

        Ok(Self {
            writer: Arc::new(Mutex::new(BufWriter::new(file))),
            path,
        })
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    pub async fn log_alert(&self, event: &crate::types::AlertEvent) {
        let entry = json!({
            "logged_at": Utc::now().to_rfc3339(),
            "event": event,
        });

        let mut writer = self.writer.lock().await;
        if let Err(e) = writeln!(writer, "{}", entry) {
            error!("📝 Failed to write alert log entry: {}", e);
            return;
        }
        if let Err(e) = writer.flush() {
            error!("📝 Failed to flush alert log: {}", e);
        }
    }
}
