//! Encrypted session cookies for `Keyrack`.
//!
//! Admin users authenticate once and carry an encrypted, integrity-checked
//! session cookie. The cookie is the JSON session payload sealed with
//! AES-256-GCM under a process-wide key and encoded as URL-safe base64.
//!
//! # Security model
//!
//! - Every seal generates a fresh 96-bit nonce via `OsRng`.
//! - Cookie format: `base64url(nonce (12 bytes) || ciphertext || tag (16 bytes))`.
//! - A failed authentication tag, malformed payload, or expired session all
//!   open to "not authenticated" — never to an error the caller could
//!   accidentally treat as partial trust.
//! - The key is read-only for the process lifetime. Rotation is performed by
//!   the embedder constructing a new authenticator, never by mutating the
//!   key in place mid-request.

use std::fmt;
use std::sync::Arc;

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Duration, Utc};
use hkdf::Hkdf;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::SessionError;
use crate::principal::User;

/// Minimum sealed length: 12-byte nonce + 16-byte AES-GCM tag.
const MIN_SEALED_LEN: usize = 12 + 16;

/// Nonce length for AES-256-GCM (96 bits).
const NONCE_LEN: usize = 12;

/// HKDF context string separating the session key from other uses of the
/// master key material.
const SESSION_KEY_INFO: &[u8] = b"keyrack-session-v1";

/// A 256-bit session-sealing key that is zeroized on drop.
///
/// The inner bytes are never exposed in `Debug` output.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SessionKey([u8; 32]);

impl SessionKey {
    /// Create a key from raw bytes.
    #[must_use]
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Generate a new random key using the OS CSPRNG.
    ///
    /// Sessions sealed under a generated key do not survive a restart.
    #[must_use]
    pub fn generate() -> Self {
        let key = Aes256Gcm::generate_key(OsRng);
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&key);
        Self(bytes)
    }

    /// Derive the session key from master key material via HKDF-SHA256.
    ///
    /// The fixed `info` string keeps cookies sealed under a different key
    /// than anything else derived from the same master material.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::KeyDerivation`] if HKDF expansion fails.
    pub fn derive(master: &[u8]) -> Result<Self, SessionError> {
        let hk = Hkdf::<Sha256>::new(None, master);
        let mut derived = [0u8; 32];
        hk.expand(SESSION_KEY_INFO, &mut derived)
            .map_err(|e| SessionError::KeyDerivation {
                reason: e.to_string(),
            })?;
        Ok(Self(derived))
    }

    fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// A successfully opened session: the user plus its metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// The authenticated user.
    pub user: User,
    /// When the session was established.
    pub created_at: DateTime<Utc>,
    /// When the session expires.
    pub expires_at: DateTime<Utc>,
}

/// The sealed cookie payload.
#[derive(Serialize, Deserialize)]
struct SessionPayload {
    username: String,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

/// Seals and opens session cookies under a process-wide key.
///
/// Stateless per call; safe to share across tasks via `Arc`.
#[derive(Clone)]
pub struct SessionAuthenticator {
    key: Arc<SessionKey>,
}

impl SessionAuthenticator {
    /// Create an authenticator around the given key.
    #[must_use]
    pub fn new(key: SessionKey) -> Self {
        Self { key: Arc::new(key) }
    }

    /// Seal a session cookie for a freshly authenticated user.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Seal`] if the AEAD operation fails and
    /// [`SessionError::Serialization`] if the payload cannot be encoded.
    pub fn seal(&self, user: &User, ttl: Duration) -> Result<String, SessionError> {
        let now = Utc::now();
        let payload = SessionPayload {
            username: user.name.clone(),
            created_at: now,
            expires_at: now + ttl,
        };
        let plaintext =
            serde_json::to_vec(&payload).map_err(|e| SessionError::Serialization {
                reason: e.to_string(),
            })?;

        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(self.key.as_bytes()));
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = cipher
            .encrypt(&nonce, plaintext.as_slice())
            .map_err(|e| SessionError::Seal {
                reason: e.to_string(),
            })?;

        // nonce || ciphertext (tag appended by aes-gcm)
        let mut sealed = Vec::with_capacity(NONCE_LEN.saturating_add(ciphertext.len()));
        sealed.extend_from_slice(&nonce);
        sealed.extend_from_slice(&ciphertext);
        Ok(URL_SAFE_NO_PAD.encode(sealed))
    }

    /// Open a session cookie, failing closed.
    ///
    /// Returns `None` for an absent cookie, undecodable base64, a failed
    /// authentication tag (tampering or wrong key), a malformed payload, or
    /// an expired session. None of these cases is an error — there is no
    /// partial trust to report.
    #[must_use]
    pub fn authenticate(&self, cookie: Option<&str>) -> Option<Session> {
        let sealed = URL_SAFE_NO_PAD.decode(cookie?).ok()?;
        if sealed.len() < MIN_SEALED_LEN {
            return None;
        }

        let (nonce_bytes, ciphertext) = sealed.split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce_bytes);
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(self.key.as_bytes()));
        let plaintext = cipher.decrypt(nonce, ciphertext).ok()?;

        let payload: SessionPayload = serde_json::from_slice(&plaintext).ok()?;
        if Utc::now() > payload.expires_at {
            return None;
        }

        Some(Session {
            user: User {
                name: payload.username,
            },
            created_at: payload.created_at,
            expires_at: payload.expires_at,
        })
    }
}

impl fmt::Debug for SessionAuthenticator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionAuthenticator").finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn authenticator() -> SessionAuthenticator {
        SessionAuthenticator::new(SessionKey::generate())
    }

    fn alice() -> User {
        User {
            name: "alice".to_owned(),
        }
    }

    #[test]
    fn seal_open_roundtrip() {
        let auth = authenticator();
        let cookie = auth.seal(&alice(), Duration::hours(1)).unwrap();

        let session = auth.authenticate(Some(&cookie)).unwrap();
        assert_eq!(session.user.name, "alice");
        assert!(session.expires_at > session.created_at);
    }

    #[test]
    fn absent_cookie_fails_closed() {
        let auth = authenticator();
        assert_eq!(auth.authenticate(None), None);
    }

    #[test]
    fn garbage_cookie_fails_closed() {
        let auth = authenticator();
        assert_eq!(auth.authenticate(Some("not base64 at all!!")), None);
        assert_eq!(auth.authenticate(Some("")), None);
        assert_eq!(auth.authenticate(Some("AAAA")), None);
    }

    #[test]
    fn tampered_cookie_fails_closed() {
        let auth = authenticator();
        let cookie = auth.seal(&alice(), Duration::hours(1)).unwrap();

        let mut sealed = URL_SAFE_NO_PAD.decode(&cookie).unwrap();
        // Flip a byte in the ciphertext portion (after the nonce).
        sealed[NONCE_LEN] ^= 0xFF;
        let tampered = URL_SAFE_NO_PAD.encode(sealed);

        assert_eq!(auth.authenticate(Some(&tampered)), None);
    }

    #[test]
    fn wrong_key_fails_closed() {
        let auth = authenticator();
        let cookie = auth.seal(&alice(), Duration::hours(1)).unwrap();

        let other = authenticator();
        assert_eq!(other.authenticate(Some(&cookie)), None);
    }

    #[test]
    fn expired_session_fails_closed() {
        let auth = authenticator();
        let cookie = auth.seal(&alice(), Duration::seconds(-1)).unwrap();
        assert_eq!(auth.authenticate(Some(&cookie)), None);
    }

    #[test]
    fn two_seals_produce_different_cookies() {
        let auth = authenticator();
        let c1 = auth.seal(&alice(), Duration::hours(1)).unwrap();
        let c2 = auth.seal(&alice(), Duration::hours(1)).unwrap();
        // Fresh nonce per seal.
        assert_ne!(c1, c2);
    }

    #[test]
    fn derived_key_is_deterministic() {
        let k1 = SessionKey::derive(b"master key material").unwrap();
        let k2 = SessionKey::derive(b"master key material").unwrap();

        let cookie = SessionAuthenticator::new(k1)
            .seal(&alice(), Duration::hours(1))
            .unwrap();
        let session = SessionAuthenticator::new(k2).authenticate(Some(&cookie));
        assert!(session.is_some());
    }

    #[test]
    fn session_key_debug_redacts_bytes() {
        let key = SessionKey::generate();
        let debug = format!("{key:?}");
        assert!(debug.contains("[REDACTED]"));
    }
}
