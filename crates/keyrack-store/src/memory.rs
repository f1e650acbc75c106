//! In-memory store for testing and development.
//!
//! All entities and edges live in `BTreeMap`s/`BTreeSet`s behind a single
//! `RwLock`. Nothing is persistent. Edge sets give the same uniqueness
//! guarantee the SQL backend gets from its primary keys, so idempotent
//! re-application behaves identically under concurrent use.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::RwLock;

use crate::model::{Client, Group, Secret};
use crate::{AclStore, ClientRegistry, GroupStore, SecretStore, StoreError};

#[derive(Debug, Default)]
struct Inner {
    clients: BTreeMap<i64, Client>,
    groups: BTreeMap<i64, Group>,
    secrets: BTreeMap<i64, Secret>,
    /// (client_id, group_id) membership edges.
    memberships: BTreeSet<(i64, i64)>,
    /// (group_id, secret_id) access edges.
    accesses: BTreeSet<(i64, i64)>,
    next_id: i64,
}

impl Inner {
    fn take_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

/// An in-memory implementation of all four store traits.
///
/// Thread-safe and async-compatible. Clones share state, so a test can hand
/// the same store to the engine under several trait objects.
///
/// # Examples
///
/// ```
/// # use keyrack_store::{MemoryStore, ClientRegistry};
/// # #[tokio::main]
/// # async fn main() {
/// let store = MemoryStore::new();
/// let client = store.insert_client("svc-a", true, false).await;
/// let found = store.find_by_name("svc-a").await.unwrap();
/// assert_eq!(found, Some(client));
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<Inner>>,
}

impl MemoryStore {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a client. Test/development helper — production clients are
    /// registered administratively, outside this crate.
    pub async fn insert_client(&self, name: &str, enabled: bool, automation_allowed: bool) -> Client {
        let mut inner = self.inner.write().await;
        let now = Utc::now();
        let client = Client {
            id: inner.take_id(),
            name: name.to_owned(),
            description: String::new(),
            created_at: now,
            updated_at: now,
            enabled,
            automation_allowed,
        };
        inner.clients.insert(client.id, client.clone());
        client
    }

    /// Seed a group.
    pub async fn insert_group(&self, name: &str) -> Group {
        let mut inner = self.inner.write().await;
        let now = Utc::now();
        let group = Group {
            id: inner.take_id(),
            name: name.to_owned(),
            description: String::new(),
            metadata: HashMap::new(),
            created_at: now,
            updated_at: now,
        };
        inner.groups.insert(group.id, group.clone());
        group
    }

    /// Seed a secret with opaque base64 content.
    pub async fn insert_secret(&self, name: &str, content: &str, checksum: &str) -> Secret {
        let mut inner = self.inner.write().await;
        let now = Utc::now();
        let secret = Secret {
            id: inner.take_id(),
            name: name.to_owned(),
            content: content.to_owned(),
            checksum: checksum.to_owned(),
            created_at: now,
            updated_at: now,
            metadata: HashMap::new(),
        };
        inner.secrets.insert(secret.id, secret.clone());
        secret
    }

    /// Number of client↔group edges, for test assertions.
    pub async fn membership_count(&self) -> usize {
        self.inner.read().await.memberships.len()
    }
}

#[async_trait::async_trait]
impl ClientRegistry for MemoryStore {
    async fn find_by_name(&self, name: &str) -> Result<Option<Client>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner.clients.values().find(|c| c.name == name).cloned())
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<Client>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner.clients.get(&id).cloned())
    }
}

#[async_trait::async_trait]
impl GroupStore for MemoryStore {
    async fn find_by_id(&self, id: i64) -> Result<Option<Group>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner.groups.get(&id).cloned())
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<Group>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner.groups.values().find(|g| g.name == name).cloned())
    }

    async fn create(
        &self,
        name: &str,
        description: &str,
        metadata: HashMap<String, String>,
    ) -> Result<Group, StoreError> {
        let mut inner = self.inner.write().await;
        if inner.groups.values().any(|g| g.name == name) {
            return Err(StoreError::Write {
                entity: format!("group '{name}'"),
                reason: "name already exists".to_owned(),
            });
        }
        let now = Utc::now();
        let group = Group {
            id: inner.take_id(),
            name: name.to_owned(),
            description: description.to_owned(),
            metadata,
            created_at: now,
            updated_at: now,
        };
        inner.groups.insert(group.id, group.clone());
        Ok(group)
    }

    async fn delete(&self, id: i64) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        inner.groups.remove(&id);
        inner.memberships.retain(|&(_, g)| g != id);
        inner.accesses.retain(|&(g, _)| g != id);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<Group>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner.groups.values().cloned().collect())
    }
}

#[async_trait::async_trait]
impl SecretStore for MemoryStore {
    async fn find_by_name(&self, name: &str) -> Result<Option<Secret>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner.secrets.values().find(|s| s.name == name).cloned())
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<Secret>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner.secrets.get(&id).cloned())
    }
}

#[async_trait::async_trait]
impl AclStore for MemoryStore {
    async fn enroll_client(&self, client_id: i64, group_id: i64) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        inner.memberships.insert((client_id, group_id));
        Ok(())
    }

    async fn evict_client(&self, client_id: i64, group_id: i64) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        inner.memberships.remove(&(client_id, group_id));
        Ok(())
    }

    async fn allow_access(&self, secret_id: i64, group_id: i64) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        inner.accesses.insert((group_id, secret_id));
        Ok(())
    }

    async fn revoke_access(&self, secret_id: i64, group_id: i64) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        inner.accesses.remove(&(group_id, secret_id));
        Ok(())
    }

    async fn clients_for_group(&self, group_id: i64) -> Result<Vec<Client>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .memberships
            .iter()
            .filter(|&&(_, g)| g == group_id)
            .filter_map(|&(c, _)| inner.clients.get(&c).cloned())
            .collect())
    }

    async fn secrets_for_group(&self, group_id: i64) -> Result<Vec<Secret>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .accesses
            .iter()
            .filter(|&&(g, _)| g == group_id)
            .filter_map(|&(_, s)| inner.secrets.get(&s).cloned())
            .collect())
    }

    async fn secret_for_client(
        &self,
        client_id: i64,
        secret_name: &str,
    ) -> Result<Option<Secret>, StoreError> {
        let inner = self.inner.read().await;
        let Some(secret) = inner.secrets.values().find(|s| s.name == secret_name) else {
            return Ok(None);
        };

        let granted = inner
            .memberships
            .iter()
            .filter(|&&(c, _)| c == client_id)
            .any(|&(_, g)| inner.accesses.contains(&(g, secret.id)));

        Ok(granted.then(|| secret.clone()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn find_client_by_name_and_id() {
        let store = MemoryStore::new();
        let client = store.insert_client("svc-a", true, false).await;

        assert_eq!(
            ClientRegistry::find_by_name(&store, "svc-a").await.unwrap(),
            Some(client.clone())
        );
        assert_eq!(
            ClientRegistry::find_by_id(&store, client.id).await.unwrap(),
            Some(client)
        );
        assert_eq!(ClientRegistry::find_by_name(&store, "nope").await.unwrap(), None);
    }

    #[tokio::test]
    async fn enroll_is_idempotent() {
        let store = MemoryStore::new();
        let client = store.insert_client("svc-a", true, false).await;
        let group = store.insert_group("g1").await;

        store.enroll_client(client.id, group.id).await.unwrap();
        store.enroll_client(client.id, group.id).await.unwrap();

        assert_eq!(store.membership_count().await, 1);
    }

    #[tokio::test]
    async fn evict_nonmember_is_noop() {
        let store = MemoryStore::new();
        let client = store.insert_client("svc-a", true, false).await;
        let group = store.insert_group("g1").await;

        // Never enrolled — must not error.
        store.evict_client(client.id, group.id).await.unwrap();
        assert_eq!(store.membership_count().await, 0);
    }

    #[tokio::test]
    async fn secret_for_client_follows_grant_path() {
        let store = MemoryStore::new();
        let client = store.insert_client("svc-a", true, false).await;
        let group = store.insert_group("g1").await;
        let secret = store.insert_secret("db-pass", "c2VjcmV0", "sum").await;

        // No edges yet.
        assert_eq!(
            store.secret_for_client(client.id, "db-pass").await.unwrap(),
            None
        );

        // Only membership, no access grant.
        store.enroll_client(client.id, group.id).await.unwrap();
        assert_eq!(
            store.secret_for_client(client.id, "db-pass").await.unwrap(),
            None
        );

        // Full grant path.
        store.allow_access(secret.id, group.id).await.unwrap();
        assert_eq!(
            store.secret_for_client(client.id, "db-pass").await.unwrap(),
            Some(secret.clone())
        );

        // Revoking the access edge severs the path again.
        store.revoke_access(secret.id, group.id).await.unwrap();
        assert_eq!(
            store.secret_for_client(client.id, "db-pass").await.unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn group_enumeration_returns_members_and_secrets() {
        let store = MemoryStore::new();
        let a = store.insert_client("svc-a", true, false).await;
        let b = store.insert_client("svc-b", true, false).await;
        let group = store.insert_group("g1").await;
        let secret = store.insert_secret("db-pass", "c2VjcmV0", "sum").await;

        store.enroll_client(a.id, group.id).await.unwrap();
        store.enroll_client(b.id, group.id).await.unwrap();
        store.allow_access(secret.id, group.id).await.unwrap();

        let mut clients = store.clients_for_group(group.id).await.unwrap();
        clients.sort_by_key(|c| c.id);
        assert_eq!(clients, vec![a, b]);

        let secrets = store.secrets_for_group(group.id).await.unwrap();
        assert_eq!(secrets, vec![secret]);
    }

    #[tokio::test]
    async fn create_group_rejects_duplicate_name() {
        let store = MemoryStore::new();
        store.create("g1", "", HashMap::new()).await.unwrap();
        let result = store.create("g1", "", HashMap::new()).await;
        assert!(matches!(result, Err(StoreError::Write { .. })));
    }

    #[tokio::test]
    async fn delete_group_cascades_edges() {
        let store = MemoryStore::new();
        let client = store.insert_client("svc-a", true, false).await;
        let group = store.insert_group("g1").await;
        let secret = store.insert_secret("db-pass", "c2VjcmV0", "sum").await;

        store.enroll_client(client.id, group.id).await.unwrap();
        store.allow_access(secret.id, group.id).await.unwrap();
        GroupStore::delete(&store, group.id).await.unwrap();

        assert_eq!(store.membership_count().await, 0);
        assert_eq!(
            store.secret_for_client(client.id, "db-pass").await.unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn clone_shares_state() {
        let store = MemoryStore::new();
        let clone = store.clone();
        store.insert_client("svc-a", true, false).await;
        assert!(
            ClientRegistry::find_by_name(&clone, "svc-a")
                .await
                .unwrap()
                .is_some()
        );
    }
}
