//! Persistent record types for `Keyrack`.
//!
//! These are the rows the storage layer hands to the engine. Secret content
//! is carried as an opaque base64 blob produced by the external
//! encryption-at-rest pipeline — nothing in this crate decrypts it.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A machine or service identity, usually derived from a certificate
/// common name.
///
/// Clients are created administratively and soft-disabled rather than
/// deleted while live grants still reference them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Client {
    /// Stable numeric id.
    pub id: i64,
    /// Unique name, the stable identifier across certificate rotations.
    pub name: String,
    /// Free-text description.
    pub description: String,
    /// When the client was registered.
    pub created_at: DateTime<Utc>,
    /// When the client record was last modified.
    pub updated_at: DateTime<Utc>,
    /// Disabled clients authenticate but are denied everywhere.
    pub enabled: bool,
    /// Whether this client may perform bulk/automation operations.
    pub automation_allowed: bool,
}

/// A named bucket mediating many-to-many access between clients and
/// secrets. Groups are owned by no single client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    /// Stable numeric id.
    pub id: i64,
    /// Unique name.
    pub name: String,
    /// Free-text description.
    pub description: String,
    /// Opaque key/value metadata.
    pub metadata: HashMap<String, String>,
    /// When the group was created.
    pub created_at: DateTime<Utc>,
    /// When the group was last modified.
    pub updated_at: DateTime<Utc>,
}

/// A secret row as stored.
///
/// `content` is base64-encoded ciphertext owned by the external secret
/// store. The access-control engine treats it as opaque and only ever
/// returns it inside a delivery envelope to a client with a grant path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Secret {
    /// Stable numeric id.
    pub id: i64,
    /// Unique name.
    pub name: String,
    /// Base64-encoded, already-encrypted content. Opaque to this crate.
    pub content: String,
    /// Content checksum, safe to expose for change detection.
    pub checksum: String,
    /// When the secret was created.
    pub created_at: DateTime<Utc>,
    /// When the secret was last modified.
    pub updated_at: DateTime<Utc>,
    /// Opaque key/value metadata.
    pub metadata: HashMap<String, String>,
}

/// A projection of [`Secret`] that never carries content.
///
/// This is the only secret shape returned to enumeration callers and to
/// clients without a grant path being probed for existence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SanitizedSecret {
    /// Stable numeric id of the underlying secret.
    pub id: i64,
    /// Secret name.
    pub name: String,
    /// Content checksum.
    pub checksum: String,
    /// When the secret was created.
    pub created_at: DateTime<Utc>,
    /// When the secret was last modified.
    pub updated_at: DateTime<Utc>,
    /// Opaque key/value metadata.
    pub metadata: HashMap<String, String>,
}

impl SanitizedSecret {
    /// Project a full secret down to its content-free form.
    #[must_use]
    pub fn from_secret(secret: &Secret) -> Self {
        Self {
            id: secret.id,
            name: secret.name.clone(),
            checksum: secret.checksum.clone(),
            created_at: secret.created_at,
            updated_at: secret.updated_at,
            metadata: secret.metadata.clone(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn sanitized_secret_drops_content() {
        let secret = Secret {
            id: 7,
            name: "db-pass".to_owned(),
            content: "c2VjcmV0".to_owned(),
            checksum: "abc123".to_owned(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            metadata: HashMap::new(),
        };

        let sanitized = SanitizedSecret::from_secret(&secret);
        assert_eq!(sanitized.id, 7);
        assert_eq!(sanitized.name, "db-pass");
        assert_eq!(sanitized.checksum, "abc123");

        // The serialized projection must never contain the content blob.
        let json = serde_json::to_string(&sanitized).unwrap();
        assert!(!json.contains("c2VjcmV0"));
    }
}
