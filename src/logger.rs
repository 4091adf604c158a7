//! Append-only structured event log with size-triggered rotation.
//! One JSON record per line: {timestamp, requestId, event, ...fields}.
//! Rotation keeps a single `.1` generation. Failures are reported through
//! tracing only and never surface to the caller.

use std::path::{Path, PathBuf};

use serde_json::{json, Value};
use tokio::io::AsyncWriteExt;
use tracing::warn;

/// Rotate once the live file reaches this size.
pub const LOG_ROTATE_BYTES: u64 = 2 * 1024 * 1024;

/// RFC 3339 timestamp with millisecond precision, the format shared by log
/// records, settings and benchmark state.
pub fn now_rfc3339() -> String {
    chrono::Utc::now()
        .to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

pub struct EventLog {
    path: PathBuf,
    rotate_bytes: u64,
}

impl EventLog {
    pub fn new(path: PathBuf, rotate_bytes: u64) -> Self {
        Self { path, rotate_bytes }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one event record. `fields` should be a JSON object; its entries
    /// are merged into the record. Absorbs every failure.
    pub async fn log(&self, request_id: &str, event: &str, fields: Value) {
        if let Err(e) = self.append(request_id, event, fields).await {
            warn!(error = %e, event, "event log write failed");
        }
    }

    async fn append(&self, request_id: &str, event: &str, fields: Value) -> std::io::Result<()> {
        let mut record = serde_json::Map::new();
        record.insert("timestamp".to_string(), json!(now_rfc3339()));
        record.insert("requestId".to_string(), json!(request_id));
        record.insert("event".to_string(), json!(event));
        if let Value::Object(extra) = fields {
            for (key, value) in extra {
                record.insert(key, value);
            }
        }
        let mut line = Value::Object(record).to_string();
        line.push('\n');

        self.rotate_if_needed().await;
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        // tokio::fs::File buffers writes; dropping without flush leaves the
        // append in flight, so its completion (and any I/O error to warn
        // about) would be lost.
        file.flush().await?;
        Ok(())
    }

    /// Move the live file aside once it reaches the limit. A missing file
    /// means nothing to rotate; a failed rename is reported and skipped so
    /// the append still happens.
    async fn rotate_if_needed(&self) {
        let size = match tokio::fs::metadata(&self.path).await {
            Ok(meta) => meta.len(),
            Err(_) => return,
        };
        if size < self.rotate_bytes {
            return;
        }
        if let Err(e) = tokio::fs::rename(&self.path, backup_path(&self.path)).await {
            warn!(error = %e, "event log rotation failed");
        }
    }
}

fn backup_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".1");
    PathBuf::from(name)
}
