//! Secret delivery for `Keyrack`.
//!
//! Computes the tri-state outcome of "give me secret by name" in a fixed
//! order so different failure classes cannot leak existence:
//!
//! 1. Grant lookup. A hit returns the full content envelope.
//! 2. On a miss, two independent existence probes (client by name, secret
//!    by name). Both exist → `Forbidden`. Otherwise → `NotFound`.
//!
//! An unregistered caller probing secret names therefore always gets
//! `NotFound`, never `Forbidden`, whether or not the secret exists. Only
//! server-side logs record the finer distinction.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use keyrack_store::model::{Client, Secret};
use keyrack_store::{ClientRegistry, SecretStore};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::acl::AccessControlGraph;
use crate::error::DeliveryError;

/// The envelope returned to a client with a grant path.
///
/// Content stays in its stored base64 encoding; this engine never decrypts
/// it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretDelivery {
    /// Secret name.
    pub name: String,
    /// Base64-encoded content, exactly as stored.
    pub content: String,
    /// Content checksum.
    pub checksum: String,
    /// When the secret was created.
    pub created_at: DateTime<Utc>,
    /// When the secret was last modified.
    pub updated_at: DateTime<Utc>,
    /// Opaque key/value metadata.
    pub metadata: HashMap<String, String>,
}

impl SecretDelivery {
    /// Build the envelope from a stored secret row.
    ///
    /// # Errors
    ///
    /// Returns [`DeliveryError::Envelope`] if the stored content is not
    /// valid base64 — a corrupt row must surface as a server error, never
    /// as a delivered secret.
    pub fn from_secret(secret: &Secret) -> Result<Self, DeliveryError> {
        STANDARD
            .decode(&secret.content)
            .map_err(|e| DeliveryError::Envelope {
                secret: secret.name.clone(),
                reason: format!("stored content is not valid base64: {e}"),
            })?;

        Ok(Self {
            name: secret.name.clone(),
            content: secret.content.clone(),
            checksum: secret.checksum.clone(),
            created_at: secret.created_at,
            updated_at: secret.updated_at,
            metadata: secret.metadata.clone(),
        })
    }
}

/// Answers "give me secret by name" for an authenticated client.
#[derive(Clone)]
pub struct SecretDeliveryPipeline {
    acl: AccessControlGraph,
    clients: Arc<dyn ClientRegistry>,
    secrets: Arc<dyn SecretStore>,
}

impl SecretDeliveryPipeline {
    /// Create a pipeline over the graph and the existence-probe stores.
    #[must_use]
    pub fn new(
        acl: AccessControlGraph,
        clients: Arc<dyn ClientRegistry>,
        secrets: Arc<dyn SecretStore>,
    ) -> Self {
        Self {
            acl,
            clients,
            secrets,
        }
    }

    /// Deliver the named secret to the client, or the correct terminal
    /// denial.
    ///
    /// The caller has already been authenticated — principal resolution
    /// failures are terminal at the boundary and never reach this pipeline.
    ///
    /// # Errors
    ///
    /// - [`DeliveryError::Forbidden`] — secret and client both exist, no
    ///   grant path.
    /// - [`DeliveryError::NotFound`] — the secret does not exist, or the
    ///   caller is not a registered client. Indistinguishable on the wire.
    /// - [`DeliveryError::Envelope`] — the stored row failed validation.
    /// - [`DeliveryError::Store`] — a storage collaborator failed.
    pub async fn deliver(
        &self,
        client: &Client,
        secret_name: &str,
    ) -> Result<SecretDelivery, DeliveryError> {
        let visible = self.acl.secret_visible_to(client, secret_name).await?;
        let secret = self.secrets.find_by_name(secret_name).await?;

        if visible.is_none() {
            let client_exists = self.clients.find_by_name(&client.name).await?.is_some();
            let secret_exists = secret.is_some();

            if client_exists && secret_exists {
                warn!(client = %client.name, secret = %secret_name, "access denied: no grant path");
                return Err(DeliveryError::Forbidden {
                    client: client.name.clone(),
                    secret: secret_name.to_owned(),
                });
            }

            // Server-side logs keep the finer distinction; the wire does not.
            if client_exists {
                info!(client = %client.name, secret = %secret_name, "client requested unknown secret");
            } else {
                info!(client = %client.name, secret = %secret_name, "unregistered client denied");
            }
            return Err(DeliveryError::NotFound);
        }

        let secret = secret.ok_or_else(|| DeliveryError::Internal {
            reason: format!("secret '{secret_name}' vanished between grant check and fetch"),
        })?;

        info!(client = %client.name, secret = %secret_name, "access granted");
        SecretDelivery::from_secret(&secret)
    }
}

impl fmt::Debug for SecretDeliveryPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretDeliveryPipeline").finish_non_exhaustive()
    }
}
