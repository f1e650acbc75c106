//! Storage error types.
//!
//! Every error variant carries enough context to diagnose the problem
//! without a debugger. Secret content never appears in error messages —
//! only entity names and ids.

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Failed to connect to the storage backend.
    #[error("failed to connect to store at '{url}': {reason}")]
    Connect { url: String, reason: String },

    /// Failed to read an entity or edge from storage.
    #[error("failed to read {entity}: {reason}")]
    Read { entity: String, reason: String },

    /// Failed to write an entity or edge to storage.
    #[error("failed to write {entity}: {reason}")]
    Write { entity: String, reason: String },

    /// Failed to delete an entity or edge from storage.
    #[error("failed to delete {entity}: {reason}")]
    Delete { entity: String, reason: String },

    /// Failed to enumerate entities.
    #[error("failed to list {entity}: {reason}")]
    List { entity: String, reason: String },

    /// A stored row could not be decoded into its record type.
    #[error("corrupt {entity} row: {reason}")]
    Corrupt { entity: String, reason: String },
}
