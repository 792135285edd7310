//! Password hashing via bcrypt.

use thiserror::Error;

/// bcrypt cost factor for newly stored hashes.
pub const BCRYPT_COST: u32 = 10;

/// Well-formed bcrypt hash that matches no password a client would send.
/// Compared against when the username does not exist so that unknown and
/// known usernames take roughly the same time to reject.
pub const DUMMY_HASH: &str = "$2b$10$N9qo8uLOickgx2ZMRZoMyeIjZAgcfl7p92ldGxad68LJZdL17lhWy";

#[derive(Debug, Error)]
pub enum PasswordError {
    #[error("bcrypt hash: {0}")]
    Hash(bcrypt::BcryptError),
    #[error("bcrypt verify: {0}")]
    Verify(bcrypt::BcryptError),
}

/// Hash a password with the default cost.
pub fn hash_password(password: &str) -> Result<String, PasswordError> {
    hash_password_with_cost(password, BCRYPT_COST)
}

/// Hash a password with an explicit cost. Low costs are only meant for tests.
pub fn hash_password_with_cost(password: &str, cost: u32) -> Result<String, PasswordError> {
    bcrypt::hash(password, cost).map_err(PasswordError::Hash)
}

/// Verify a password against a bcrypt hash.
pub fn verify_password(password: &str, hash: &str) -> Result<bool, PasswordError> {
    bcrypt::verify(password, hash).map_err(PasswordError::Verify)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify() {
        let hash = hash_password_with_cost("correct horse", 4).unwrap();
        assert!(verify_password("correct horse", &hash).unwrap());
        assert!(!verify_password("wrong horse", &hash).unwrap());
    }

    #[test]
    fn test_dummy_hash_is_well_formed() {
        assert!(!verify_password("anything", DUMMY_HASH).unwrap());
    }

    #[test]
    fn test_garbage_hash_is_an_error() {
        assert!(verify_password("anything", "not-a-hash").is_err());
    }
}
