//! Audit logging for `Keyrack`.
//!
//! Every accepted authorization mutation generates exactly one audit event
//! BEFORE the operation reports success. If all audit sinks fail to write,
//! the mutation is denied (fail-closed). This is non-negotiable: audit
//! durability is part of the mutation's commit boundary.
//!
//! Events are append-only. There is no read API in this crate — audit
//! consumption is an external collaborator.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tracing::warn;
use uuid::Uuid;

use crate::error::AuditError;

/// The kind of state change an audit event records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    /// A group was created.
    GroupCreate,
    /// A group was deleted.
    GroupDelete,
    /// A client was enrolled in a group.
    ClientEnroll,
    /// A client was evicted from a group.
    ClientEvict,
    /// A group was granted access to a secret.
    SecretGrant,
    /// A group's access to a secret was revoked.
    SecretRevoke,
}

/// A single immutable audit event.
///
/// Created once per accepted mutation, never updated or deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Unique event id.
    pub id: Uuid,
    /// When the event occurred.
    pub timestamp: DateTime<Utc>,
    /// What happened.
    pub kind: EventKind,
    /// The identity that performed the operation.
    pub actor: String,
    /// The primary entity the operation targeted.
    pub target: String,
    /// Free-form key/value context (e.g. the group a client was enrolled
    /// into). Never contains secret content.
    pub extra: HashMap<String, String>,
}

impl AuditEvent {
    /// Create an event stamped with the current time.
    #[must_use]
    pub fn new(
        kind: EventKind,
        actor: impl Into<String>,
        target: impl Into<String>,
        extra: HashMap<String, String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            kind,
            actor: actor.into(),
            target: target.into(),
            extra,
        }
    }
}

/// Trait for audit sinks.
///
/// Implementations are append-only and must be safe to share across async
/// tasks.
#[async_trait::async_trait]
pub trait AuditSink: Send + Sync {
    /// The sink's name (for error reporting).
    fn name(&self) -> &str;

    /// Record an event. Must not silently drop events.
    ///
    /// # Errors
    ///
    /// Returns an error if the event could not be persisted.
    async fn record(&self, event: &AuditEvent) -> Result<(), AuditError>;
}

/// Fans out audit events to registered sinks with fail-closed semantics.
///
/// If at least one sink accepts the event, the mutation proceeds. If ALL
/// fail, the mutation is denied. With no sinks registered, auditing has
/// been disabled by configuration and recording is a no-op success.
pub struct AuditLog {
    sinks: RwLock<Vec<Arc<dyn AuditSink>>>,
}

impl AuditLog {
    /// Create a new audit log with no sinks.
    #[must_use]
    pub fn new() -> Self {
        Self {
            sinks: RwLock::new(Vec::new()),
        }
    }

    /// Register an audit sink.
    pub async fn add_sink(&self, sink: Arc<dyn AuditSink>) {
        self.sinks.write().await.push(sink);
    }

    /// Check whether any sinks are configured.
    pub async fn has_sinks(&self) -> bool {
        !self.sinks.read().await.is_empty()
    }

    /// Record an event to all sinks.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::AllSinksFailed`] if every sink fails — the
    /// caller must then fail the surrounding mutation.
    pub async fn record(&self, event: &AuditEvent) -> Result<(), AuditError> {
        let sinks = self.sinks.read().await;

        if sinks.is_empty() {
            return Ok(());
        }

        let mut any_success = false;
        for sink in sinks.iter() {
            match sink.record(event).await {
                Ok(()) => any_success = true,
                Err(e) => {
                    warn!(sink = sink.name(), error = %e, "audit sink failed");
                }
            }
        }

        if any_success {
            Ok(())
        } else {
            Err(AuditError::AllSinksFailed)
        }
    }
}

impl Default for AuditLog {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for AuditLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditLog").finish_non_exhaustive()
    }
}

/// An in-memory sink that retains every event, for tests.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    events: Mutex<Vec<AuditEvent>>,
}

impl MemoryAuditSink {
    /// Create a new empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all recorded events, in record order.
    pub async fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().await.clone()
    }
}

#[async_trait::async_trait]
impl AuditSink for MemoryAuditSink {
    fn name(&self) -> &str {
        "memory"
    }

    async fn record(&self, event: &AuditEvent) -> Result<(), AuditError> {
        self.events.lock().await.push(event.clone());
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    struct FailingSink;

    #[async_trait::async_trait]
    impl AuditSink for FailingSink {
        fn name(&self) -> &str {
            "failing"
        }

        async fn record(&self, _event: &AuditEvent) -> Result<(), AuditError> {
            Err(AuditError::SinkFailure {
                name: "failing".to_owned(),
                reason: "disk full".to_owned(),
            })
        }
    }

    fn event() -> AuditEvent {
        AuditEvent::new(EventKind::ClientEnroll, "automation", "svc-a", HashMap::new())
    }

    #[tokio::test]
    async fn no_sinks_is_noop_success() {
        let log = AuditLog::new();
        assert!(!log.has_sinks().await);
        log.record(&event()).await.unwrap();
    }

    #[tokio::test]
    async fn single_sink_records() {
        let log = AuditLog::new();
        let sink = Arc::new(MemoryAuditSink::new());
        log.add_sink(Arc::clone(&sink) as Arc<dyn AuditSink>).await;

        log.record(&event()).await.unwrap();
        let events = sink.events().await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, EventKind::ClientEnroll);
        assert_eq!(events[0].actor, "automation");
    }

    #[tokio::test]
    async fn all_sinks_failing_denies() {
        let log = AuditLog::new();
        log.add_sink(Arc::new(FailingSink)).await;

        let result = log.record(&event()).await;
        assert!(matches!(result, Err(AuditError::AllSinksFailed)));
    }

    #[tokio::test]
    async fn one_healthy_sink_is_enough() {
        let log = AuditLog::new();
        let healthy = Arc::new(MemoryAuditSink::new());
        log.add_sink(Arc::new(FailingSink)).await;
        log.add_sink(Arc::clone(&healthy) as Arc<dyn AuditSink>).await;

        log.record(&event()).await.unwrap();
        assert_eq!(healthy.events().await.len(), 1);
    }

    #[tokio::test]
    async fn timestamps_are_monotonic() {
        let first = event();
        let second = event();
        assert!(first.timestamp <= second.timestamp);
    }

    #[test]
    fn event_kind_serializes_screaming_snake() {
        let json = serde_json::to_string(&EventKind::SecretGrant).unwrap();
        assert_eq!(json, "\"SECRET_GRANT\"");
    }
}
