//! Storage layer for `Keyrack`.
//!
//! This crate defines the record types and the storage collaborator traits
//! the access-control engine consumes: [`ClientRegistry`], [`GroupStore`],
//! [`SecretStore`], and [`AclStore`]. Membership is an explicit edge table
//! keyed by `(client_id, group_id)` and `(group_id, secret_id)` with
//! uniqueness constraints, so idempotent mutation is an upsert or a
//! delete-if-exists — never an object graph with back-references.
//!
//! Two implementations are provided:
//!
//! - [`MemoryStore`] — in-memory, for tests and development
//! - [`PostgresStore`] — backed by PostgreSQL via `sqlx` (feature
//!   `postgres-store`)

mod error;
mod memory;
pub mod model;
#[cfg(feature = "postgres-store")]
mod postgres;

pub use error::StoreError;
pub use memory::MemoryStore;
use model::{Client, Group, Secret};
#[cfg(feature = "postgres-store")]
pub use postgres::PostgresStore;

/// Lookup of registered client identities.
///
/// Implementations must be safe to share across async tasks (`Send + Sync`).
#[async_trait::async_trait]
pub trait ClientRegistry: Send + Sync + 'static {
    /// Find a client by its unique name.
    ///
    /// Returns `Ok(None)` if no client with that name is registered.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Read`] if the underlying backend fails.
    async fn find_by_name(&self, name: &str) -> Result<Option<Client>, StoreError>;

    /// Find a client by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Read`] if the underlying backend fails.
    async fn find_by_id(&self, id: i64) -> Result<Option<Client>, StoreError>;
}

/// Group persistence.
#[async_trait::async_trait]
pub trait GroupStore: Send + Sync + 'static {
    /// Find a group by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Read`] if the underlying backend fails.
    async fn find_by_id(&self, id: i64) -> Result<Option<Group>, StoreError>;

    /// Find a group by its unique name.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Read`] if the underlying backend fails.
    async fn find_by_name(&self, name: &str) -> Result<Option<Group>, StoreError>;

    /// Create a group and return the stored record.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Write`] if the write fails — including when the
    /// name collides with an existing group (callers check first, the
    /// uniqueness constraint is the backstop).
    async fn create(
        &self,
        name: &str,
        description: &str,
        metadata: std::collections::HashMap<String, String>,
    ) -> Result<Group, StoreError>;

    /// Delete a group by id, cascading its membership and access edges.
    ///
    /// Idempotent — deleting a missing group is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Delete`] if the underlying backend fails.
    async fn delete(&self, id: i64) -> Result<(), StoreError>;

    /// List all groups.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::List`] if the underlying backend fails.
    async fn list(&self) -> Result<Vec<Group>, StoreError>;
}

/// Secret row lookup. Content is opaque to the access-control engine.
#[async_trait::async_trait]
pub trait SecretStore: Send + Sync + 'static {
    /// Find a secret by its unique name.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Read`] if the underlying backend fails.
    async fn find_by_name(&self, name: &str) -> Result<Option<Secret>, StoreError>;

    /// Find a secret by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Read`] if the underlying backend fails.
    async fn find_by_id(&self, id: i64) -> Result<Option<Secret>, StoreError>;
}

/// The membership edge tables: client↔group and group↔secret.
///
/// Mutations are idempotent at this layer. The edge tables enforce
/// uniqueness, so two concurrent enrolls of the same pair both succeed and
/// leave exactly one edge. Entity existence checks are the caller's
/// responsibility — this trait only stores edges between ids it is given.
#[async_trait::async_trait]
pub trait AclStore: Send + Sync + 'static {
    /// Add a client↔group membership edge. No-op if already present.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Write`] if the underlying backend fails.
    async fn enroll_client(&self, client_id: i64, group_id: i64) -> Result<(), StoreError>;

    /// Remove a client↔group membership edge. No-op if absent.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Delete`] if the underlying backend fails.
    async fn evict_client(&self, client_id: i64, group_id: i64) -> Result<(), StoreError>;

    /// Add a group↔secret access edge. No-op if already present.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Write`] if the underlying backend fails.
    async fn allow_access(&self, secret_id: i64, group_id: i64) -> Result<(), StoreError>;

    /// Remove a group↔secret access edge. No-op if absent.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Delete`] if the underlying backend fails.
    async fn revoke_access(&self, secret_id: i64, group_id: i64) -> Result<(), StoreError>;

    /// All clients enrolled in a group. Order is not significant.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::List`] if the underlying backend fails.
    async fn clients_for_group(&self, group_id: i64) -> Result<Vec<Client>, StoreError>;

    /// All secrets granted to a group. Order is not significant.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::List`] if the underlying backend fails.
    async fn secrets_for_group(&self, group_id: i64) -> Result<Vec<Secret>, StoreError>;

    /// The grant-path join: the named secret, iff some group contains both
    /// the client and the secret.
    ///
    /// Returns `Ok(None)` when no grant path exists — deliberately silent on
    /// whether the secret exists at all.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Read`] if the underlying backend fails.
    async fn secret_for_client(
        &self,
        client_id: i64,
        secret_name: &str,
    ) -> Result<Option<Secret>, StoreError>;
}
