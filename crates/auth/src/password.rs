//! Salted password hashing.

use argon2::Argon2;
use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};

use crate::{AuthError, Result};

/// Hashes `password` with a fresh random salt, returning a PHC string.
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AuthError::Internal(format!("failed to hash password: {e}")))
}

/// Checks `password` against a stored PHC string.
///
/// A malformed stored hash is an internal error, not a mismatch.
pub fn verify_password(password: &str, stored_hash: &str) -> Result<bool> {
    let parsed = PasswordHash::new(stored_hash)
        .map_err(|e| AuthError::Internal(format!("stored password hash is malformed: {e}")))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

/// Runs [`hash_password`] on the blocking pool.
pub async fn hash_password_blocking(password: String) -> Result<String> {
    tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| AuthError::Internal(format!("password hashing task failed: {e}")))?
}

/// Runs [`verify_password`] on the blocking pool.
pub async fn verify_password_blocking(password: String, stored_hash: String) -> Result<bool> {
    tokio::task::spawn_blocking(move || verify_password(&password, &stored_hash))
        .await
        .map_err(|e| AuthError::Internal(format!("password verification task failed: {e}")))?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify() {
        let hash = hash_password("secret1").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(!hash.contains("secret1"));
        assert!(verify_password("secret1", &hash).unwrap());
        assert!(!verify_password("secret2", &hash).unwrap());
    }

    #[test]
    fn test_salts_differ() {
        assert_ne!(hash_password("secret1").unwrap(), hash_password("secret1").unwrap());
    }

    #[test]
    fn test_malformed_hash_is_error() {
        assert!(matches!(
            verify_password("secret1", "plaintext"),
            Err(AuthError::Internal(_))
        ));
    }

    #[tokio::test]
    async fn test_blocking_wrappers() {
        let hash = hash_password_blocking("secret1".to_string()).await.unwrap();
        assert!(verify_password_blocking("secret1".to_string(), hash).await.unwrap());
    }
}
