//! Token generation, password hashing and constant-time comparison.
//!
//! # Security Model
//!
//! - Session ids and CSRF tokens are 32 bytes from the OS RNG, hex-encoded
//! - Passwords are stored as PBKDF2-HMAC-SHA256 with a per-user random salt
//! - Token comparisons never short-circuit on the first differing byte

use std::num::NonZeroU32;

use ring::pbkdf2;
use ring::rand::{SecureRandom, SystemRandom};

/// Random bytes per generated token (64 hex chars)
pub const TOKEN_BYTES: usize = 32;

const SALT_BYTES: usize = 16;
const HASH_BYTES: usize = 32;
const HASH_SCHEME: &str = "pbkdf2-sha256";

/// The OS random source failed
#[derive(Debug, thiserror::Error)]
#[error("system random source unavailable")]
pub struct EntropyError;

/// Generate a random hex token
pub fn random_token() -> Result<String, EntropyError> {
    let mut bytes = [0u8; TOKEN_BYTES];
    SystemRandom::new()
        .fill(&mut bytes)
        .map_err(|_| EntropyError)?;
    Ok(hex::encode(bytes))
}

/// True if `value` looks like a token produced by [`random_token`]
pub fn is_token_format(value: &str) -> bool {
    value.len() == TOKEN_BYTES * 2 && value.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Hash a password for storage.
///
/// Format: `pbkdf2-sha256$<iterations>$<salt hex>$<hash hex>`
pub fn hash_password(password: &str, iterations: u32) -> Result<String, EntropyError> {
    let iterations = NonZeroU32::new(iterations).unwrap_or(NonZeroU32::MIN);
    let mut salt = [0u8; SALT_BYTES];
    SystemRandom::new()
        .fill(&mut salt)
        .map_err(|_| EntropyError)?;

    let mut hash = [0u8; HASH_BYTES];
    pbkdf2::derive(
        pbkdf2::PBKDF2_HMAC_SHA256,
        iterations,
        &salt,
        password.as_bytes(),
        &mut hash,
    );

    Ok(format!(
        "{HASH_SCHEME}${iterations}${}${}",
        hex::encode(salt),
        hex::encode(hash)
    ))
}

/// Check a password against a stored hash. Malformed hashes never verify.
pub fn verify_password(password: &str, stored: &str) -> bool {
    let mut parts = stored.split('$');
    let (Some(scheme), Some(iterations), Some(salt), Some(hash), None) = (
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
    ) else {
        return false;
    };
    if scheme != HASH_SCHEME {
        return false;
    }
    let Some(iterations) = iterations.parse().ok().and_then(NonZeroU32::new) else {
        return false;
    };
    let (Ok(salt), Ok(hash)) = (hex::decode(salt), hex::decode(hash)) else {
        return false;
    };

    pbkdf2::verify(
        pbkdf2::PBKDF2_HMAC_SHA256,
        iterations,
        &salt,
        password.as_bytes(),
        &hash,
    )
    .is_ok()
}

/// Constant-time comparison to prevent timing attacks.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_token_format() {
        let a = random_token().unwrap();
        let b = random_token().unwrap();
        assert!(is_token_format(&a));
        assert_ne!(a, b);
        assert!(!is_token_format("xyz"));
        assert!(!is_token_format(&"g".repeat(64)));
    }

    #[test]
    fn password_roundtrip() {
        let stored = hash_password("correct horse", 1_000).unwrap();
        assert!(stored.starts_with("pbkdf2-sha256$1000$"));
        assert!(verify_password("correct horse", &stored));
        assert!(!verify_password("wrong horse", &stored));
    }

    #[test]
    fn same_password_different_salt() {
        let a = hash_password("pw", 1_000).unwrap();
        let b = hash_password("pw", 1_000).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn malformed_hash_never_verifies() {
        assert!(!verify_password("pw", ""));
        assert!(!verify_password("pw", "plain"));
        assert!(!verify_password("pw", "md5$1$00$00"));
        assert!(!verify_password("pw", "pbkdf2-sha256$0$00$00"));
        assert!(!verify_password("pw", "pbkdf2-sha256$10$zz$00"));
    }

    #[test]
    fn constant_time_eq_works() {
        assert!(constant_time_eq(b"hello", b"hello"));
        assert!(!constant_time_eq(b"hello", b"world"));
        assert!(!constant_time_eq(b"hello", b"hello!"));
        assert!(constant_time_eq(b"", b""));
    }
}
