//! The access-control graph for `Keyrack`.
//!
//! Authorization is a many-to-many graph: clients belong to groups, groups
//! are granted secrets. A client may read a secret iff some group contains
//! both. There are no direct client→secret grants — every path flows
//! through a group, which keeps revocation a single edge delete.
//!
//! Mutations resolve both entities first (a missing id is `NotFound` and
//! records nothing), apply the idempotent edge operation, and append
//! exactly one audit event before reporting success. A failed audit write
//! fails the whole mutation: callers never observe a success whose audit
//! record is known to be missing.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use keyrack_store::model::{Client, Group, SanitizedSecret, Secret};
use keyrack_store::{AclStore, ClientRegistry, GroupStore, SecretStore};
use tracing::info;

use crate::audit::{AuditEvent, AuditLog, EventKind};
use crate::error::AclError;

/// The group-mediated client↔secret authorization graph.
///
/// Cheap to clone; all fields are shared handles.
#[derive(Clone)]
pub struct AccessControlGraph {
    clients: Arc<dyn ClientRegistry>,
    groups: Arc<dyn GroupStore>,
    secrets: Arc<dyn SecretStore>,
    edges: Arc<dyn AclStore>,
    audit: Arc<AuditLog>,
}

impl AccessControlGraph {
    /// Create a graph over the given stores and audit log.
    #[must_use]
    pub fn new(
        clients: Arc<dyn ClientRegistry>,
        groups: Arc<dyn GroupStore>,
        secrets: Arc<dyn SecretStore>,
        edges: Arc<dyn AclStore>,
        audit: Arc<AuditLog>,
    ) -> Self {
        Self {
            clients,
            groups,
            secrets,
            edges,
            audit,
        }
    }

    /// The audit log mutations record into.
    #[must_use]
    pub fn audit(&self) -> &Arc<AuditLog> {
        &self.audit
    }

    /// The sanitized projection of the named secret, iff some group
    /// contains both the client and the secret.
    ///
    /// Returns `Ok(None)` when no grant path exists. This method performs
    /// no existence probes — disambiguating "no grant" from "no such
    /// secret" is the delivery pipeline's job, so that this layer cannot
    /// leak existence to a denied caller.
    ///
    /// # Errors
    ///
    /// Returns [`AclError::Store`] if the underlying store fails.
    pub async fn secret_visible_to(
        &self,
        client: &Client,
        secret_name: &str,
    ) -> Result<Option<SanitizedSecret>, AclError> {
        let secret = self.edges.secret_for_client(client.id, secret_name).await?;
        Ok(secret.as_ref().map(SanitizedSecret::from_secret))
    }

    /// All clients enrolled in a group. Order is not significant.
    ///
    /// # Errors
    ///
    /// Returns [`AclError::Store`] if the underlying store fails.
    pub async fn clients_of(&self, group: &Group) -> Result<Vec<Client>, AclError> {
        Ok(self.edges.clients_for_group(group.id).await?)
    }

    /// All secrets granted to a group, sanitized. Order is not significant.
    ///
    /// # Errors
    ///
    /// Returns [`AclError::Store`] if the underlying store fails.
    pub async fn secrets_of(&self, group: &Group) -> Result<Vec<SanitizedSecret>, AclError> {
        let secrets = self.edges.secrets_for_group(group.id).await?;
        Ok(secrets.iter().map(SanitizedSecret::from_secret).collect())
    }

    /// Enroll a client in a group. Idempotent — enrolling an enrolled pair
    /// is a no-op success, and still audited as an accepted call.
    ///
    /// # Errors
    ///
    /// - [`AclError::ClientNotFound`] / [`AclError::GroupNotFound`] if
    ///   either id does not resolve; nothing is recorded.
    /// - [`AclError::Store`] if the edge write fails.
    /// - [`AclError::Audit`] if the audit record cannot be written — the
    ///   mutation is not reported successful.
    pub async fn enroll_client(
        &self,
        client_id: i64,
        group_id: i64,
        actor: &str,
        extra: HashMap<String, String>,
    ) -> Result<(), AclError> {
        let (client, group) = self.resolve_client_group(client_id, group_id).await?;

        self.edges.enroll_client(client.id, group.id).await?;
        self.record(EventKind::ClientEnroll, actor, &client.name, &group.name, extra)
            .await?;

        info!(client = %client.name, group = %group.name, actor, "client enrolled in group");
        Ok(())
    }

    /// Evict a client from a group. Idempotent — evicting a non-member
    /// pair is a no-op success.
    ///
    /// # Errors
    ///
    /// Same contract as [`enroll_client`](Self::enroll_client).
    pub async fn evict_client(
        &self,
        client_id: i64,
        group_id: i64,
        actor: &str,
        extra: HashMap<String, String>,
    ) -> Result<(), AclError> {
        let (client, group) = self.resolve_client_group(client_id, group_id).await?;

        self.edges.evict_client(client.id, group.id).await?;
        self.record(EventKind::ClientEvict, actor, &client.name, &group.name, extra)
            .await?;

        info!(client = %client.name, group = %group.name, actor, "client evicted from group");
        Ok(())
    }

    /// Grant a group access to a secret. Idempotent.
    ///
    /// # Errors
    ///
    /// - [`AclError::SecretNotFound`] / [`AclError::GroupNotFound`] if
    ///   either id does not resolve; nothing is recorded.
    /// - [`AclError::Store`] / [`AclError::Audit`] as for
    ///   [`enroll_client`](Self::enroll_client).
    pub async fn allow_access(
        &self,
        secret_id: i64,
        group_id: i64,
        actor: &str,
        extra: HashMap<String, String>,
    ) -> Result<(), AclError> {
        let (secret, group) = self.resolve_secret_group(secret_id, group_id).await?;

        self.edges.allow_access(secret.id, group.id).await?;
        self.record(EventKind::SecretGrant, actor, &secret.name, &group.name, extra)
            .await?;

        info!(secret = %secret.name, group = %group.name, actor, "group granted access to secret");
        Ok(())
    }

    /// Revoke a group's access to a secret. Idempotent.
    ///
    /// # Errors
    ///
    /// Same contract as [`allow_access`](Self::allow_access).
    pub async fn revoke_access(
        &self,
        secret_id: i64,
        group_id: i64,
        actor: &str,
        extra: HashMap<String, String>,
    ) -> Result<(), AclError> {
        let (secret, group) = self.resolve_secret_group(secret_id, group_id).await?;

        self.edges.revoke_access(secret.id, group.id).await?;
        self.record(EventKind::SecretRevoke, actor, &secret.name, &group.name, extra)
            .await?;

        info!(secret = %secret.name, group = %group.name, actor, "group access to secret revoked");
        Ok(())
    }

    async fn resolve_client_group(
        &self,
        client_id: i64,
        group_id: i64,
    ) -> Result<(Client, Group), AclError> {
        let client = self
            .clients
            .find_by_id(client_id)
            .await?
            .ok_or(AclError::ClientNotFound { id: client_id })?;
        let group = self
            .groups
            .find_by_id(group_id)
            .await?
            .ok_or(AclError::GroupNotFound { id: group_id })?;
        Ok((client, group))
    }

    async fn resolve_secret_group(
        &self,
        secret_id: i64,
        group_id: i64,
    ) -> Result<(Secret, Group), AclError> {
        let secret = self
            .secrets
            .find_by_id(secret_id)
            .await?
            .ok_or(AclError::SecretNotFound { id: secret_id })?;
        let group = self
            .groups
            .find_by_id(group_id)
            .await?
            .ok_or(AclError::GroupNotFound { id: group_id })?;
        Ok((secret, group))
    }

    async fn record(
        &self,
        kind: EventKind,
        actor: &str,
        target: &str,
        group_name: &str,
        mut extra: HashMap<String, String>,
    ) -> Result<(), AclError> {
        extra.insert("group".to_owned(), group_name.to_owned());
        self.audit
            .record(&AuditEvent::new(kind, actor, target, extra))
            .await?;
        Ok(())
    }
}

impl fmt::Debug for AccessControlGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessControlGraph").finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use keyrack_store::MemoryStore;

    use super::*;
    use crate::audit::{AuditSink, MemoryAuditSink};
    use crate::error::AuditError;

    struct FailingSink;

    #[async_trait::async_trait]
    impl AuditSink for FailingSink {
        fn name(&self) -> &str {
            "failing"
        }

        async fn record(&self, _event: &AuditEvent) -> Result<(), AuditError> {
            Err(AuditError::SinkFailure {
                name: "failing".to_owned(),
                reason: "unavailable".to_owned(),
            })
        }
    }

    async fn graph(store: &MemoryStore) -> (AccessControlGraph, Arc<MemoryAuditSink>) {
        let audit = Arc::new(AuditLog::new());
        let sink = Arc::new(MemoryAuditSink::new());
        audit.add_sink(Arc::clone(&sink) as Arc<dyn AuditSink>).await;

        let graph = AccessControlGraph::new(
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            audit,
        );
        (graph, sink)
    }

    #[tokio::test]
    async fn visibility_requires_grant_path() {
        let store = MemoryStore::new();
        let client = store.insert_client("svc-a", true, false).await;
        let group = store.insert_group("g1").await;
        let secret = store.insert_secret("db-pass", "c2VjcmV0", "sum").await;
        let (graph, _) = graph(&store).await;

        assert_eq!(graph.secret_visible_to(&client, "db-pass").await.unwrap(), None);

        graph
            .enroll_client(client.id, group.id, "automation", HashMap::new())
            .await
            .unwrap();
        graph
            .allow_access(secret.id, group.id, "automation", HashMap::new())
            .await
            .unwrap();

        let visible = graph
            .secret_visible_to(&client, "db-pass")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(visible, SanitizedSecret::from_secret(&secret));
    }

    #[tokio::test]
    async fn enroll_twice_equals_enroll_once() {
        let store = MemoryStore::new();
        let client = store.insert_client("svc-a", true, false).await;
        let group = store.insert_group("g1").await;
        let (graph, sink) = graph(&store).await;

        graph
            .enroll_client(client.id, group.id, "automation", HashMap::new())
            .await
            .unwrap();
        graph
            .enroll_client(client.id, group.id, "automation", HashMap::new())
            .await
            .unwrap();

        assert_eq!(store.membership_count().await, 1);
        // Both calls were accepted, so both are audited.
        assert_eq!(sink.events().await.len(), 2);
    }

    #[tokio::test]
    async fn evict_nonmember_is_noop_success() {
        let store = MemoryStore::new();
        let client = store.insert_client("svc-a", true, false).await;
        let group = store.insert_group("g1").await;
        let (graph, _) = graph(&store).await;

        graph
            .evict_client(client.id, group.id, "automation", HashMap::new())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn enroll_unknown_client_is_not_found_and_unaudited() {
        let store = MemoryStore::new();
        let group = store.insert_group("g1").await;
        let (graph, sink) = graph(&store).await;

        let result = graph
            .enroll_client(99_999, group.id, "automation", HashMap::new())
            .await;
        assert!(matches!(result, Err(AclError::ClientNotFound { id: 99_999 })));
        assert!(sink.events().await.is_empty());
    }

    #[tokio::test]
    async fn enroll_unknown_group_is_not_found_and_unaudited() {
        let store = MemoryStore::new();
        let client = store.insert_client("svc-a", true, false).await;
        let (graph, sink) = graph(&store).await;

        let result = graph
            .enroll_client(client.id, 42, "automation", HashMap::new())
            .await;
        assert!(matches!(result, Err(AclError::GroupNotFound { id: 42 })));
        assert!(sink.events().await.is_empty());
    }

    #[tokio::test]
    async fn concurrent_enrolls_leave_one_edge() {
        let store = MemoryStore::new();
        let client = store.insert_client("svc-a", true, false).await;
        let group = store.insert_group("g1").await;
        let (graph, _) = graph(&store).await;

        let a = graph.enroll_client(client.id, group.id, "automation", HashMap::new());
        let b = graph.enroll_client(client.id, group.id, "automation", HashMap::new());
        let (ra, rb) = tokio::join!(a, b);

        ra.unwrap();
        rb.unwrap();
        assert_eq!(store.membership_count().await, 1);
    }

    #[tokio::test]
    async fn each_mutation_records_one_event_with_matching_kind() {
        let store = MemoryStore::new();
        let client = store.insert_client("svc-a", true, false).await;
        let group = store.insert_group("g1").await;
        let secret = store.insert_secret("db-pass", "c2VjcmV0", "sum").await;
        let (graph, sink) = graph(&store).await;

        graph
            .enroll_client(client.id, group.id, "automation", HashMap::new())
            .await
            .unwrap();
        graph
            .allow_access(secret.id, group.id, "automation", HashMap::new())
            .await
            .unwrap();
        graph
            .revoke_access(secret.id, group.id, "automation", HashMap::new())
            .await
            .unwrap();
        graph
            .evict_client(client.id, group.id, "automation", HashMap::new())
            .await
            .unwrap();

        let events = sink.events().await;
        let kinds: Vec<EventKind> = events.iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![
                EventKind::ClientEnroll,
                EventKind::SecretGrant,
                EventKind::SecretRevoke,
                EventKind::ClientEvict,
            ]
        );

        // Timestamps never go backwards.
        for pair in events.windows(2) {
            assert!(pair[0].timestamp <= pair[1].timestamp);
        }

        // Actor and group context survive into the events.
        assert!(events.iter().all(|e| e.actor == "automation"));
        assert_eq!(events[0].target, "svc-a");
        assert_eq!(events[0].extra.get("group"), Some(&"g1".to_owned()));
        assert_eq!(events[1].target, "db-pass");
    }

    #[tokio::test]
    async fn audit_failure_fails_the_mutation() {
        let store = MemoryStore::new();
        let client = store.insert_client("svc-a", true, false).await;
        let group = store.insert_group("g1").await;

        let audit = Arc::new(AuditLog::new());
        audit.add_sink(Arc::new(FailingSink)).await;
        let graph = AccessControlGraph::new(
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            audit,
        );

        let result = graph
            .enroll_client(client.id, group.id, "automation", HashMap::new())
            .await;
        assert!(matches!(
            result,
            Err(AclError::Audit(AuditError::AllSinksFailed))
        ));
    }

    #[tokio::test]
    async fn enumeration_returns_sanitized_secrets() {
        let store = MemoryStore::new();
        let client = store.insert_client("svc-a", true, false).await;
        let group = store.insert_group("g1").await;
        let secret = store.insert_secret("db-pass", "c2VjcmV0", "sum").await;
        let (graph, _) = graph(&store).await;

        graph
            .enroll_client(client.id, group.id, "automation", HashMap::new())
            .await
            .unwrap();
        graph
            .allow_access(secret.id, group.id, "automation", HashMap::new())
            .await
            .unwrap();

        assert_eq!(graph.clients_of(&group).await.unwrap(), vec![client]);
        assert_eq!(
            graph.secrets_of(&group).await.unwrap(),
            vec![SanitizedSecret::from_secret(&secret)]
        );
    }
}
