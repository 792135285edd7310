//! One-way hashing of bearer tokens into cache keys.
//!
//! Revocation and CSRF sessions hash the same access token, so each use gets
//! its own prefix and the two keyspaces never share a key.

use sha2::{Digest, Sha256};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyspace {
    Revocation,
    Csrf,
    Log,
}

impl Keyspace {
    fn prefix(self) -> &'static str {
        match self {
            Keyspace::Revocation => "revoked:",
            Keyspace::Csrf => "csrf:",
            Keyspace::Log => "log:",
        }
    }
}

/// Hex-encoded SHA-256 of the token within a keyspace.
pub fn hash_token(keyspace: Keyspace, token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(keyspace.prefix().as_bytes());
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Short identifier that lets log lines about one token be correlated.
pub fn log_key(token: &str) -> String {
    let mut key = hash_token(Keyspace::Log, token);
    key.truncate(8);
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_is_fixed_width_hex() {
        let hash = hash_token(Keyspace::Revocation, "a.b.c");
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_hash_is_deterministic() {
        assert_eq!(
            hash_token(Keyspace::Csrf, "a.b.c"),
            hash_token(Keyspace::Csrf, "a.b.c")
        );
    }

    #[test]
    fn test_keyspaces_do_not_collide() {
        assert_ne!(
            hash_token(Keyspace::Revocation, "a.b.c"),
            hash_token(Keyspace::Csrf, "a.b.c")
        );
    }

    #[test]
    fn test_log_key_is_short_and_not_a_cache_key() {
        let key = log_key("a.b.c");
        assert_eq!(key.len(), 8);
        assert!(!hash_token(Keyspace::Revocation, "a.b.c").starts_with(&key));
    }
}
