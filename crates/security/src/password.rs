//! Salted password hashing.
//!
//! New hashes are PBKDF2-HMAC-SHA256 with a random 16-byte salt, encoded as
//! `pbkdf2_sha256$<iterations>$<salt b64>$<hash b64>` so the work factor can
//! be raised later without invalidating stored hashes.
//!
//! Databases written by the earlier Python release hold Werkzeug hashes
//! (`pbkdf2:sha256:<iterations>$<salt>$<hex>` or `scrypt:<n>:<r>:<p>$<salt>$<hex>`,
//! salt used as text). Those still verify, so migrated users can log in.

use base64::Engine;
use base64::engine::general_purpose::STANDARD_NO_PAD;
use rand::Rng;
use sha2::Sha256;

const SCHEME: &str = "pbkdf2_sha256";
const SALT_LEN: usize = 16;
const DIGEST_LEN: usize = 32;
const DEFAULT_ITERATIONS: u32 = 100_000;

#[derive(Debug, thiserror::Error)]
pub enum PasswordError {
    #[error("Malformed password hash")]
    Malformed,

    #[error("Hashing failed: {0}")]
    Hash(String),
}

/// Hashes and verifies passwords.
///
/// Both operations are CPU-bound; async callers run them on the blocking pool.
#[derive(Debug, Clone, Copy)]
pub struct PasswordHasher {
    iterations: u32,
}

impl Default for PasswordHasher {
    fn default() -> Self {
        Self {
            iterations: DEFAULT_ITERATIONS,
        }
    }
}

impl PasswordHasher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a custom work factor (tests use a small one).
    pub fn with_iterations(iterations: u32) -> Self {
        Self {
            iterations: iterations.max(1),
        }
    }

    /// Hash `password` with a fresh salt.
    pub fn hash(&self, password: &str) -> Result<String, PasswordError> {
        let mut salt = [0u8; SALT_LEN];
        rand::rng().fill(&mut salt[..]);

        let digest = pbkdf2_sha256(password.as_bytes(), &salt, self.iterations, DIGEST_LEN);
        Ok(format!(
            "{SCHEME}${}${}${}",
            self.iterations,
            STANDARD_NO_PAD.encode(salt),
            STANDARD_NO_PAD.encode(digest)
        ))
    }

    /// Check `password` against a stored hash. The stored work factor wins
    /// over this hasher's own.
    pub fn verify(&self, password: &str, stored: &str) -> Result<bool, PasswordError> {
        if stored.starts_with(SCHEME) {
            verify_native(password, stored)
        } else {
            verify_werkzeug(password, stored)
        }
    }
}

fn verify_native(password: &str, stored: &str) -> Result<bool, PasswordError> {
    let mut parts = stored.split('$');
    let (Some(SCHEME), Some(iterations), Some(salt), Some(expected), None) = (
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
    ) else {
        return Err(PasswordError::Malformed);
    };

    let iterations = parse_iterations(iterations)?;
    let salt = STANDARD_NO_PAD
        .decode(salt)
        .map_err(|_| PasswordError::Malformed)?;
    let expected = STANDARD_NO_PAD
        .decode(expected)
        .map_err(|_| PasswordError::Malformed)?;
    if expected.is_empty() {
        return Err(PasswordError::Malformed);
    }

    let actual = pbkdf2_sha256(password.as_bytes(), &salt, iterations, expected.len());
    Ok(constant_time_eq(&actual, &expected))
}

fn verify_werkzeug(password: &str, stored: &str) -> Result<bool, PasswordError> {
    let mut parts = stored.split('$');
    let (Some(method), Some(salt), Some(expected), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(PasswordError::Malformed);
    };
    let expected = hex::decode(expected).map_err(|_| PasswordError::Malformed)?;
    if expected.is_empty() {
        return Err(PasswordError::Malformed);
    }

    let args: Vec<&str> = method.split(':').collect();
    let actual = match args.as_slice() {
        ["pbkdf2", "sha256", iterations] => pbkdf2_sha256(
            password.as_bytes(),
            salt.as_bytes(),
            parse_iterations(iterations)?,
            expected.len(),
        ),
        ["scrypt", n, r, p] => scrypt_digest(password, salt, n, r, p, expected.len())?,
        _ => return Err(PasswordError::Malformed),
    };
    Ok(constant_time_eq(&actual, &expected))
}

fn parse_iterations(raw: &str) -> Result<u32, PasswordError> {
    match raw.parse::<u32>() {
        Ok(0) | Err(_) => Err(PasswordError::Malformed),
        Ok(n) => Ok(n),
    }
}

fn pbkdf2_sha256(password: &[u8], salt: &[u8], iterations: u32, len: usize) -> Vec<u8> {
    let mut out = vec![0u8; len];
    pbkdf2::pbkdf2_hmac::<Sha256>(password, salt, iterations, &mut out);
    out
}

fn scrypt_digest(
    password: &str,
    salt: &str,
    n: &str,
    r: &str,
    p: &str,
    len: usize,
) -> Result<Vec<u8>, PasswordError> {
    let n: u64 = n.parse().map_err(|_| PasswordError::Malformed)?;
    let r: u32 = r.parse().map_err(|_| PasswordError::Malformed)?;
    let p: u32 = p.parse().map_err(|_| PasswordError::Malformed)?;
    if n < 2 || !n.is_power_of_two() {
        return Err(PasswordError::Malformed);
    }

    let params = scrypt::Params::new(n.trailing_zeros() as u8, r, p, len)
        .map_err(|_| PasswordError::Malformed)?;
    let mut out = vec![0u8; len];
    scrypt::scrypt(password.as_bytes(), salt.as_bytes(), &params, &mut out)
        .map_err(|e| PasswordError::Hash(e.to_string()))?;
    Ok(out)
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
