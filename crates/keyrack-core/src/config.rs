//! Engine configuration for `Keyrack`.
//!
//! Loads configuration from environment variables with sensible defaults.
//! All settings can be overridden via `KEYRACK_*` environment variables.

use chrono::Duration;
use tracing::warn;

use crate::session::SessionKey;

/// Default session lifetime: one day.
const DEFAULT_SESSION_TTL_SECS: i64 = 86_400;

/// Engine configuration.
#[derive(Debug)]
pub struct CoreConfig {
    /// Key under which session cookies are sealed.
    pub session_key: SessionKey,
    /// Lifetime of a freshly sealed session.
    pub session_ttl: Duration,
    /// Path to the JSON-lines audit file (if file auditing is enabled).
    pub audit_file_path: Option<String>,
}

impl CoreConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `KEYRACK_SESSION_KEY` — 64 hex chars of master key material; the
    ///   session key is derived from it via HKDF. When absent or invalid a
    ///   random key is generated and sessions do not survive a restart.
    /// - `KEYRACK_SESSION_TTL_SECS` — session lifetime (default: `86400`)
    /// - `KEYRACK_AUDIT_FILE` — path to the audit log file (optional)
    #[must_use]
    pub fn from_env() -> Self {
        let session_key = match std::env::var("KEYRACK_SESSION_KEY") {
            Ok(hex_key) => match parse_master_key(&hex_key) {
                Some(key) => key,
                None => {
                    warn!("KEYRACK_SESSION_KEY is not 64 hex chars; generating an ephemeral key");
                    SessionKey::generate()
                }
            },
            Err(_) => SessionKey::generate(),
        };

        let session_ttl = std::env::var("KEYRACK_SESSION_TTL_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map_or_else(
                || Duration::seconds(DEFAULT_SESSION_TTL_SECS),
                Duration::seconds,
            );

        let audit_file_path = std::env::var("KEYRACK_AUDIT_FILE").ok();

        Self {
            session_key,
            session_ttl,
            audit_file_path,
        }
    }
}

fn parse_master_key(hex_key: &str) -> Option<SessionKey> {
    let bytes = hex::decode(hex_key).ok()?;
    if bytes.len() != 32 {
        return None;
    }
    SessionKey::derive(&bytes).ok()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn valid_hex_key_derives() {
        let key = parse_master_key(&"ab".repeat(32));
        assert!(key.is_some());
    }

    #[test]
    fn short_or_garbage_key_is_rejected() {
        assert!(parse_master_key("abcd").is_none());
        assert!(parse_master_key("not hex").is_none());
        assert!(parse_master_key(&"ab".repeat(16)).is_none());
    }
}
