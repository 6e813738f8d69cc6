//! Authenticated encryption, hashing, and password verification.
//!
//! Byte-in/byte-out only. This module must never log a key, a plaintext
//! token, or a sealed blob.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use rand::RngCore;
use sha2::{Digest, Sha256};

const NONCE_LEN: usize = 12;

#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("key must be exactly 32 bytes")]
    KeyError,
    #[error("ciphertext could not be authenticated")]
    DecryptError,
    #[error("password hashing failed")]
    HashError,
}

/// Seal `plaintext` under `key`, returning `nonce ‖ ciphertext ‖ tag`.
///
/// A fresh random nonce is generated per call; sealing the same plaintext
/// twice yields different output.
pub fn seal(key: &[u8; 32], plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));

    let mut nonce_bytes = [0u8; NONCE_LEN];
    rand::thread_rng().fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|_| CryptoError::DecryptError)?;

    let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    sealed.extend_from_slice(&nonce_bytes);
    sealed.extend_from_slice(&ciphertext);
    Ok(sealed)
}

/// Open a blob produced by [`seal`]. Fails with [`CryptoError::DecryptError`]
/// if the blob is too short, tampered with, or sealed under a different key.
pub fn open(key: &[u8; 32], sealed: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if sealed.len() < NONCE_LEN {
        return Err(CryptoError::DecryptError);
    }
    let (nonce_bytes, ciphertext) = sealed.split_at(NONCE_LEN);

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    let nonce = Nonce::from_slice(nonce_bytes);

    cipher
        .decrypt(nonce, ciphertext)
        .map_err(|_| CryptoError::DecryptError)
}

/// Hex-encoded SHA-256 digest, used to fingerprint tokens for logging/lookup
/// without storing or logging the token itself.
pub fn fingerprint(data: &[u8]) -> String {
    let digest = Sha256::digest(data);
    hex::encode(digest)
}

/// Hash a password with bcrypt at cost 12.
pub fn hash_password(password: &str) -> Result<String, CryptoError> {
    bcrypt::hash(password, 12).map_err(|_| CryptoError::HashError)
}

/// Verify a password against a bcrypt hash in constant time.
pub fn verify_password(password: &str, hash: &str) -> Result<bool, CryptoError> {
    bcrypt::verify(password, hash).map_err(|_| CryptoError::HashError)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> [u8; 32] {
        [7u8; 32]
    }

    #[test]
    fn round_trip_identity() {
        let k = key();
        let plaintext = b"lifx-bearer-token-abc123";
        let sealed = seal(&k, plaintext).unwrap();
        let opened = open(&k, &sealed).unwrap();
        assert_eq!(opened, plaintext);
    }

    #[test]
    fn nonce_uniqueness() {
        let k = key();
        let plaintext = b"same-plaintext";
        let sealed1 = seal(&k, plaintext).unwrap();
        let sealed2 = seal(&k, plaintext).unwrap();
        assert_ne!(sealed1, sealed2);
    }

    #[test]
    fn wrong_key_fails() {
        let k1 = key();
        let k2 = [9u8; 32];
        let sealed = seal(&k1, b"secret").unwrap();
        assert!(matches!(open(&k2, &sealed), Err(CryptoError::DecryptError)));
    }

    #[test]
    fn tampered_ciphertext_fails() {
        let k = key();
        let mut sealed = seal(&k, b"secret").unwrap();
        let last = sealed.len() - 1;
        sealed[last] ^= 0xFF;
        assert!(matches!(open(&k, &sealed), Err(CryptoError::DecryptError)));
    }

    #[test]
    fn fingerprint_is_deterministic() {
        assert_eq!(fingerprint(b"abc"), fingerprint(b"abc"));
        assert_ne!(fingerprint(b"abc"), fingerprint(b"abd"));
    }

    #[test]
    fn password_hash_round_trip() {
        let hash = hash_password("hunter2").unwrap();
        assert!(verify_password("hunter2", &hash).unwrap());
        assert!(!verify_password("wrong", &hash).unwrap());
    }
}
