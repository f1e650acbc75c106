//! Group enrollment pipeline for `Keyrack`.
//!
//! The automation-gated mutation surface the routing layer calls: group
//! lifecycle, client↔group membership, and group↔secret grants. Every
//! entry point takes an [`AutomationClient`] — the type is the proof that
//! automation validation already happened, so there is no path into a
//! mutation without it.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use keyrack_store::GroupStore;
use keyrack_store::model::{Client, Group, SanitizedSecret};
use tracing::info;

use crate::acl::AccessControlGraph;
use crate::audit::{AuditEvent, EventKind};
use crate::automation::AutomationClient;
use crate::error::AclError;

/// A group with its enrolled clients and granted secrets, sanitized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupDetails {
    /// The group record.
    pub group: Group,
    /// Clients enrolled in the group.
    pub clients: Vec<Client>,
    /// Secrets the group can access, without content.
    pub secrets: Vec<SanitizedSecret>,
}

/// The automation-facing mutation surface over groups and edges.
#[derive(Clone)]
pub struct GroupEnrollmentPipeline {
    acl: AccessControlGraph,
    groups: Arc<dyn GroupStore>,
}

impl GroupEnrollmentPipeline {
    /// Create a pipeline over the graph and group store.
    #[must_use]
    pub fn new(acl: AccessControlGraph, groups: Arc<dyn GroupStore>) -> Self {
        Self { acl, groups }
    }

    /// Enroll a client in a group. Idempotent.
    ///
    /// # Errors
    ///
    /// See [`AccessControlGraph::enroll_client`].
    pub async fn enroll_client(
        &self,
        actor: &AutomationClient,
        client_id: i64,
        group_id: i64,
    ) -> Result<(), AclError> {
        self.acl
            .enroll_client(client_id, group_id, actor.name(), HashMap::new())
            .await
    }

    /// Evict a client from a group. Idempotent.
    ///
    /// # Errors
    ///
    /// See [`AccessControlGraph::evict_client`].
    pub async fn evict_client(
        &self,
        actor: &AutomationClient,
        client_id: i64,
        group_id: i64,
    ) -> Result<(), AclError> {
        self.acl
            .evict_client(client_id, group_id, actor.name(), HashMap::new())
            .await
    }

    /// Grant a group access to a secret. Idempotent.
    ///
    /// # Errors
    ///
    /// See [`AccessControlGraph::allow_access`].
    pub async fn allow_access(
        &self,
        actor: &AutomationClient,
        secret_id: i64,
        group_id: i64,
    ) -> Result<(), AclError> {
        self.acl
            .allow_access(secret_id, group_id, actor.name(), HashMap::new())
            .await
    }

    /// Revoke a group's access to a secret. Idempotent.
    ///
    /// # Errors
    ///
    /// See [`AccessControlGraph::revoke_access`].
    pub async fn revoke_access(
        &self,
        actor: &AutomationClient,
        secret_id: i64,
        group_id: i64,
    ) -> Result<(), AclError> {
        self.acl
            .revoke_access(secret_id, group_id, actor.name(), HashMap::new())
            .await
    }

    /// Create a group.
    ///
    /// # Errors
    ///
    /// - [`AclError::DuplicateGroup`] if a group with that name exists.
    /// - [`AclError::Store`] / [`AclError::Audit`] — the group is not
    ///   reported created unless its audit event was recorded.
    pub async fn create_group(
        &self,
        actor: &AutomationClient,
        name: &str,
        description: &str,
        metadata: HashMap<String, String>,
    ) -> Result<Group, AclError> {
        if self.groups.find_by_name(name).await?.is_some() {
            info!(actor = actor.name(), group = %name, "group already exists");
            return Err(AclError::DuplicateGroup {
                name: name.to_owned(),
            });
        }

        let group = self.groups.create(name, description, metadata).await?;

        let mut extra = HashMap::new();
        if !description.is_empty() {
            extra.insert("description".to_owned(), description.to_owned());
        }
        if !group.metadata.is_empty() {
            extra.insert(
                "metadata".to_owned(),
                serde_json::to_string(&group.metadata).unwrap_or_default(),
            );
        }
        self.acl
            .audit()
            .record(&AuditEvent::new(
                EventKind::GroupCreate,
                actor.name(),
                &group.name,
                extra,
            ))
            .await?;

        info!(actor = actor.name(), group = %group.name, "group created");
        Ok(group)
    }

    /// Delete a group, cascading its edges.
    ///
    /// # Errors
    ///
    /// - [`AclError::GroupNotFound`] if the id does not resolve; nothing is
    ///   recorded.
    /// - [`AclError::Store`] / [`AclError::Audit`] — the deletion is not
    ///   reported successful unless its audit event was recorded.
    pub async fn delete_group(
        &self,
        actor: &AutomationClient,
        group_id: i64,
    ) -> Result<(), AclError> {
        let group = self
            .groups
            .find_by_id(group_id)
            .await?
            .ok_or(AclError::GroupNotFound { id: group_id })?;

        self.groups.delete(group.id).await?;
        self.acl
            .audit()
            .record(&AuditEvent::new(
                EventKind::GroupDelete,
                actor.name(),
                &group.name,
                HashMap::new(),
            ))
            .await?;

        info!(actor = actor.name(), group = %group.name, "group deleted");
        Ok(())
    }

    /// A group with its members and sanitized secrets.
    ///
    /// # Errors
    ///
    /// - [`AclError::GroupNotFound`] if the id does not resolve.
    /// - [`AclError::Store`] if enumeration fails.
    pub async fn group_details(&self, group_id: i64) -> Result<GroupDetails, AclError> {
        let group = self
            .groups
            .find_by_id(group_id)
            .await?
            .ok_or(AclError::GroupNotFound { id: group_id })?;

        let clients = self.acl.clients_of(&group).await?;
        let secrets = self.acl.secrets_of(&group).await?;
        Ok(GroupDetails {
            group,
            clients,
            secrets,
        })
    }

    /// All groups.
    ///
    /// # Errors
    ///
    /// Returns [`AclError::Store`] if the listing fails.
    pub async fn list_groups(&self) -> Result<Vec<Group>, AclError> {
        Ok(self.groups.list().await?)
    }
}

impl fmt::Debug for GroupEnrollmentPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GroupEnrollmentPipeline").finish_non_exhaustive()
    }
}
