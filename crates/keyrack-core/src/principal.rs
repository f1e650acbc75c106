//! Principal extraction and resolution for `Keyrack`.
//!
//! Two independent credential mechanisms feed the engine: mutual-TLS client
//! certificates (machine identities) and encrypted session cookies (human
//! admins). Both resolve to a request-scoped [`Principal`] exactly once per
//! request, which is then passed explicitly through the pipelines — never
//! stashed in ambient task-local context.
//!
//! Authentication failures are terminal here. Nothing past this module ever
//! sees an unresolved identity.

use std::fmt;
use std::sync::Arc;

use keyrack_store::ClientRegistry;
use keyrack_store::model::Client;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::AuthError;
use crate::session::SessionAuthenticator;

/// A human admin identity, derived from a decrypted session cookie.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Login name.
    pub name: String,
}

/// The identity making a request. Transient and request-scoped; never
/// persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Principal {
    /// A machine identity authenticated via certificate common name.
    Client(Client),
    /// A human identity authenticated via session cookie.
    User(User),
}

impl Principal {
    /// The identity's name, for logging and audit actor fields.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Client(client) => &client.name,
            Self::User(user) => &user.name,
        }
    }
}

/// The transport-derived inputs to principal resolution.
///
/// The TLS layer hands over the verified peer certificate's subject string
/// (if a client certificate was presented) and the routing layer the raw
/// session cookie value (if one was sent). Handshake mechanics stay outside
/// this crate — only the derived subject crosses the boundary.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    /// Subject string of the verified peer certificate, e.g.
    /// `CN=svc-a,OU=service,O=example`.
    pub peer_subject: Option<String>,
    /// Raw value of the session cookie, if present.
    pub session_cookie: Option<String>,
}

/// Extract the leaf identity from a certificate subject string.
///
/// The first RDN must be a `CN` and its value is the identity. Pure
/// function, no side effects.
///
/// # Errors
///
/// Returns [`AuthError::MalformedPrincipal`] when the subject has no
/// parseable RDN, the first RDN is not a CN, or the CN value is empty.
pub fn extract_common_name(subject: &str) -> Result<String, AuthError> {
    let malformed = |reason: &str| AuthError::MalformedPrincipal {
        subject: subject.to_owned(),
        reason: reason.to_owned(),
    };

    let first_rdn = subject
        .split(',')
        .next()
        .ok_or_else(|| malformed("empty subject"))?;

    let (attribute, value) = first_rdn
        .split_once('=')
        .ok_or_else(|| malformed("first RDN is not an attribute=value pair"))?;

    if !attribute.trim().eq_ignore_ascii_case("cn") {
        return Err(malformed("first RDN is not a CN"));
    }

    let value = value.trim();
    if value.is_empty() {
        return Err(malformed("CN value is empty"));
    }

    Ok(value.to_owned())
}

/// Resolves a [`RequestContext`] into a [`Principal`].
///
/// Certificate identity takes precedence over a session cookie: a request
/// that presented a client certificate is a machine, full stop.
#[derive(Clone)]
pub struct PrincipalResolver {
    registry: Arc<dyn ClientRegistry>,
    sessions: SessionAuthenticator,
}

impl PrincipalResolver {
    /// Create a resolver over the given registry and session authenticator.
    #[must_use]
    pub fn new(registry: Arc<dyn ClientRegistry>, sessions: SessionAuthenticator) -> Self {
        Self { registry, sessions }
    }

    /// Resolve the request's identity, failing closed.
    ///
    /// # Errors
    ///
    /// - [`AuthError::MalformedPrincipal`] if the certificate subject cannot
    ///   be parsed — reject the connection.
    /// - [`AuthError::NotAuthorized`] if the certificate names an identity
    ///   unknown to the registry.
    /// - [`AuthError::Forbidden`] if the client is known but disabled.
    /// - [`AuthError::NotAuthenticated`] if no credential was presented or
    ///   the session cookie does not open.
    /// - [`AuthError::Store`] if the registry lookup fails.
    pub async fn resolve(&self, ctx: &RequestContext) -> Result<Principal, AuthError> {
        if let Some(subject) = &ctx.peer_subject {
            let name = extract_common_name(subject)?;
            let client = self
                .registry
                .find_by_name(&name)
                .await?
                .ok_or_else(|| AuthError::NotAuthorized { name: name.clone() })?;

            if !client.enabled {
                info!(client = %name, "disabled client attempted authentication");
                return Err(AuthError::Forbidden { name });
            }

            return Ok(Principal::Client(client));
        }

        if let Some(session) = self.sessions.authenticate(ctx.session_cookie.as_deref()) {
            return Ok(Principal::User(session.user));
        }

        Err(AuthError::NotAuthenticated)
    }
}

impl fmt::Debug for PrincipalResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrincipalResolver").finish_non_exhaustive()
    }
}
