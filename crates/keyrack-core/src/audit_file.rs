//! File-based audit sink for `Keyrack`.
//!
//! Appends JSON-lines audit events to a file. Each line is a complete JSON
//! object representing one [`AuditEvent`]. The file is opened in
//! append-only mode — no update or delete operations are ever performed.
//!
//! # Thread safety
//!
//! Uses a `tokio::sync::Mutex` around the file handle to serialize writes.
//! Audit writes are infrequent relative to request throughput and the
//! critical section is tiny (one `write_all`).

use std::path::{Path, PathBuf};

use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::audit::{AuditEvent, AuditSink};
use crate::error::AuditError;

/// Audit sink that writes JSON-lines to a file.
pub struct FileAuditSink {
    /// Path to the audit log file.
    path: PathBuf,
    /// Serialized write access to the file.
    writer: Mutex<Option<tokio::fs::File>>,
}

impl FileAuditSink {
    /// Create a new file audit sink writing to the given path.
    ///
    /// The file is created (or opened for append) lazily on the first write.
    #[must_use]
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            writer: Mutex::new(None),
        }
    }

    /// Open or reuse the file handle.
    async fn get_writer(
        &self,
    ) -> Result<tokio::sync::MutexGuard<'_, Option<tokio::fs::File>>, AuditError> {
        let mut guard = self.writer.lock().await;
        if guard.is_none() {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)
                .await
                .map_err(|e| AuditError::SinkFailure {
                    name: self.name().to_owned(),
                    reason: format!("failed to open audit file '{}': {e}", self.path.display()),
                })?;
            *guard = Some(file);
        }
        Ok(guard)
    }
}

#[async_trait::async_trait]
impl AuditSink for FileAuditSink {
    #[allow(clippy::needless_lifetimes, clippy::unnecessary_literal_bound)]
    fn name(&self) -> &str {
        "file"
    }

    async fn record(&self, event: &AuditEvent) -> Result<(), AuditError> {
        let mut line = serde_json::to_vec(event).map_err(|e| AuditError::Serialization {
            reason: e.to_string(),
        })?;
        line.push(b'\n');

        let mut guard = self.get_writer().await?;
        let file = guard.as_mut().ok_or_else(|| AuditError::SinkFailure {
            name: "file".to_owned(),
            reason: "file handle unexpectedly None after open".to_owned(),
        })?;

        file.write_all(&line)
            .await
            .map_err(|e| AuditError::SinkFailure {
                name: "file".to_owned(),
                reason: format!("write failed: {e}"),
            })?;

        file.flush().await.map_err(|e| AuditError::SinkFailure {
            name: "file".to_owned(),
            reason: format!("flush failed: {e}"),
        })?;

        Ok(())
    }
}

impl std::fmt::Debug for FileAuditSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileAuditSink")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::audit::EventKind;

    #[tokio::test]
    async fn events_append_as_json_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.log");
        let sink = FileAuditSink::new(&path);

        let first = AuditEvent::new(EventKind::GroupCreate, "automation", "g1", HashMap::new());
        let second = AuditEvent::new(EventKind::ClientEnroll, "automation", "svc-a", HashMap::new());
        sink.record(&first).await.unwrap();
        sink.record(&second).await.unwrap();

        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);

        let replayed: AuditEvent = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(replayed, first);
        let replayed: AuditEvent = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(replayed, second);
    }

    #[tokio::test]
    async fn unwritable_path_fails_record() {
        let sink = FileAuditSink::new("/proc/does/not/exist/audit.log");
        let event = AuditEvent::new(EventKind::GroupDelete, "automation", "g1", HashMap::new());
        let result = sink.record(&event).await;
        assert!(matches!(result, Err(AuditError::SinkFailure { .. })));
    }
}
