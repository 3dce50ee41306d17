//! Authenticated encryption of section bodies
//!
//! Bodies are sealed with XChaCha20-Poly1305 through `orion::aead`; the random
//! nonce is stored in front of the ciphertext. A wrong key fails the tag check.

use crate::{Result, TrackError};
use orion::aead;

/// Required key length in bytes
pub const KEY_LENGTH: usize = 32;

/// Check key material length and copy it into a fixed-size array
pub(crate) fn key_from_slice(key: &[u8]) -> Result<[u8; KEY_LENGTH]> {
    <[u8; KEY_LENGTH]>::try_from(key).map_err(|_| TrackError::InvalidKey {
        expected: KEY_LENGTH,
        actual: key.len(),
    })
}

fn secret_key(key: &[u8]) -> Result<aead::SecretKey> {
    let key = key_from_slice(key)?;
    aead::SecretKey::from_slice(&key).map_err(|_| TrackError::InvalidKey {
        expected: KEY_LENGTH,
        actual: key.len(),
    })
}

pub(crate) fn seal(key: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
    let secret = secret_key(key)?;
    aead::seal(&secret, plaintext)
        .map_err(|_| TrackError::Format("failed to encrypt section".to_string()))
}

pub(crate) fn open(key: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>> {
    let secret =
        secret_key(key).map_err(|e| TrackError::Decryption(format!("unusable key: {e}")))?;
    aead::open(&secret, ciphertext).map_err(|_| {
        TrackError::Decryption("authentication failed (wrong key or tampered data)".to_string())
    })
}
