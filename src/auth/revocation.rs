//! Tokens invalidated before their natural expiry.

use std::sync::Arc;
use std::time::Duration;

use super::token_hash::{Keyspace, hash_token};
use crate::cache::TtlCache;
use crate::clock::Clock;
use crate::jwt::MAX_REFRESH_TOKEN_TTL_SECS;

/// Entries outlive every token that could still pass verification.
pub const REVOCATION_TTL: Duration = Duration::from_secs(MAX_REFRESH_TOKEN_TTL_SECS);

pub struct RevocationRegistry {
    revoked: TtlCache<String, bool>,
}

impl RevocationRegistry {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            revoked: TtlCache::new(clock),
        }
    }

    pub fn revoke(&self, token: &str) {
        self.revoked
            .insert(hash_token(Keyspace::Revocation, token), true, REVOCATION_TTL);
    }

    pub fn is_revoked(&self, token: &str) -> bool {
        self.revoked
            .get(&hash_token(Keyspace::Revocation, token))
            .unwrap_or(false)
    }
}
