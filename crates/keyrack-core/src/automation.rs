//! Automation client validation for `Keyrack`.
//!
//! Bulk operations (group management, enrollment, grants) require more than
//! an authenticated client: the client record must carry the
//! automation-allowed flag. [`AutomationClient`] is the proof that the
//! upgrade happened — it cannot be built from an unprivileged client, so an
//! entry point taking `&AutomationClient` cannot be reached without the
//! check.
//!
//! The unknown-identity vs known-but-unprivileged distinction is
//! load-bearing: an unknown principal name is `NotAuthorized` (401-class),
//! a known client without the flag is `Forbidden` (403-class).

use std::fmt;
use std::sync::Arc;

use keyrack_store::ClientRegistry;
use keyrack_store::model::Client;
use tracing::info;

use crate::error::AuthError;

/// A client that has been validated for automation operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AutomationClient {
    client: Client,
}

impl AutomationClient {
    /// Upgrade a client, iff its automation-allowed flag is set.
    #[must_use]
    pub fn of(client: Client) -> Option<Self> {
        client.automation_allowed.then_some(Self { client })
    }

    /// The client's name, used as the audit actor.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.client.name
    }

    /// The underlying client record.
    #[must_use]
    pub fn client(&self) -> &Client {
        &self.client
    }
}

/// Validates that a principal name resolves to an automation-privileged
/// client.
#[derive(Clone)]
pub struct AutomationValidator {
    registry: Arc<dyn ClientRegistry>,
}

impl AutomationValidator {
    /// Create a validator over the given registry.
    #[must_use]
    pub fn new(registry: Arc<dyn ClientRegistry>) -> Self {
        Self { registry }
    }

    /// Resolve and upgrade the named principal.
    ///
    /// # Errors
    ///
    /// - [`AuthError::NotAuthorized`] if the registry has no client with
    ///   that name — the caller presented a credential for an unknown
    ///   identity.
    /// - [`AuthError::Forbidden`] if the client is known but disabled or
    ///   not automation-allowed.
    /// - [`AuthError::Store`] if the registry lookup fails.
    pub async fn validate(&self, principal_name: &str) -> Result<AutomationClient, AuthError> {
        let client = self
            .registry
            .find_by_name(principal_name)
            .await?
            .ok_or_else(|| AuthError::NotAuthorized {
                name: principal_name.to_owned(),
            })?;

        if !client.enabled {
            info!(client = %principal_name, "disabled client attempted automation access");
            return Err(AuthError::Forbidden {
                name: principal_name.to_owned(),
            });
        }

        AutomationClient::of(client).ok_or_else(|| {
            info!(client = %principal_name, "client without automation flag attempted automation access");
            AuthError::Forbidden {
                name: principal_name.to_owned(),
            }
        })
    }
}

impl fmt::Debug for AutomationValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AutomationValidator").finish_non_exhaustive()
    }
}
