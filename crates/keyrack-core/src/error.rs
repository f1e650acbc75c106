//! Error types for `keyrack-core`.
//!
//! Each error variant carries enough context to correlate actor and target
//! without a debugger. Key material, cookie plaintext, and secret content
//! never appear in error messages.
//!
//! The taxonomy mirrors the trust boundary: authentication failures
//! ([`AuthError`]) are terminal at the edge and never reach the
//! authorization layer; authorization outcomes ([`AclError`],
//! [`DeliveryError`]) are terminal and user-visible; storage and audit
//! failures are server-error class and never leak backend internals.

use keyrack_store::StoreError;

/// Errors from principal extraction, resolution, and automation validation.
///
/// `NotAuthorized` and `Forbidden` are distinct on purpose: a credential
/// that maps to no known identity is a 401-class outcome, a known identity
/// without the required privilege is a 403-class outcome. Callers must not
/// collapse them.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The certificate subject could not be parsed into an identity.
    #[error("malformed principal '{subject}': {reason}")]
    MalformedPrincipal { subject: String, reason: String },

    /// The request carried no valid credential — no certificate and no
    /// live session cookie.
    #[error("request is not authenticated")]
    NotAuthenticated,

    /// The credential was valid but names an identity unknown to the
    /// registry.
    #[error("unknown client identity '{name}'")]
    NotAuthorized { name: String },

    /// The identity is known but lacks the required privilege.
    #[error("client '{name}' is not permitted to perform this operation")]
    Forbidden { name: String },

    /// The client registry failed.
    #[error("client registry error: {0}")]
    Store(#[from] StoreError),
}

/// Errors from sealing session cookies.
///
/// Opening a cookie never errors — absent, tampered, or expired cookies
/// all fail closed to "not authenticated".
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// AES-256-GCM sealing failed.
    #[error("session sealing failed: {reason}")]
    Seal { reason: String },

    /// HKDF key derivation failed.
    #[error("session key derivation failed: {reason}")]
    KeyDerivation { reason: String },

    /// The session payload could not be serialized.
    #[error("session serialization failed: {reason}")]
    Serialization { reason: String },
}

/// Errors from access-control graph operations.
#[derive(Debug, thiserror::Error)]
pub enum AclError {
    /// The client id does not resolve to a registered client.
    #[error("client id {id} not found")]
    ClientNotFound { id: i64 },

    /// The group id does not resolve to an existing group.
    #[error("group id {id} not found")]
    GroupNotFound { id: i64 },

    /// The secret id does not resolve to an existing secret.
    #[error("secret id {id} not found")]
    SecretNotFound { id: i64 },

    /// A group with that name already exists.
    #[error("group '{name}' already exists")]
    DuplicateGroup { name: String },

    /// The underlying store failed.
    #[error("acl store error: {0}")]
    Store(#[from] StoreError),

    /// The audit record could not be written. The mutation must not be
    /// reported as successful — audit durability is part of the commit
    /// boundary.
    #[error("acl audit error: {0}")]
    Audit(#[from] AuditError),
}

/// Terminal outcomes of secret delivery that are not a granted envelope.
///
/// `NotFound` carries nothing: on the wire it is impossible to tell "no
/// such secret" from "unknown client probing an existing secret". The
/// finer distinction is logged server-side only.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    /// Secret and client both exist, but no group grants a path.
    #[error("access denied: '{client}' may not read '{secret}'")]
    Forbidden { client: String, secret: String },

    /// The secret does not exist, or the caller is not a registered client.
    #[error("secret not found")]
    NotFound,

    /// The delivery envelope could not be constructed from the stored row.
    #[error("envelope construction failed for '{secret}': {reason}")]
    Envelope { secret: String, reason: String },

    /// Internal inconsistency while computing the outcome.
    #[error("secret delivery failed: {reason}")]
    Internal { reason: String },

    /// The underlying store failed.
    #[error("delivery store error: {0}")]
    Store(#[from] StoreError),
}

impl From<AclError> for DeliveryError {
    fn from(err: AclError) -> Self {
        match err {
            AclError::Store(e) => Self::Store(e),
            other => Self::Internal {
                reason: other.to_string(),
            },
        }
    }
}

/// Errors from audit operations.
#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    /// All audit sinks failed to record — the mutation must be denied.
    #[error("all audit sinks failed (fail-closed)")]
    AllSinksFailed,

    /// A specific audit sink failed.
    #[error("audit sink '{name}' failed: {reason}")]
    SinkFailure { name: String, reason: String },

    /// Serialization of the audit event failed.
    #[error("audit serialization failed: {reason}")]
    Serialization { reason: String },
}
