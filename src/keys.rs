//! Data-encryption key loading.
//!
//! The key is decoded once by [`crate::config::AppConfig::from_env`] and held
//! in memory for the process lifetime; rotation requires a restart.

use rand::RngCore;

/// Generate a fresh 32-byte key from a CSPRNG, hex-encoded for storage in
/// `ENCRYPTION_KEY`. Used by the `keygen` utility below, not at request time.
pub fn generate_key_hex() -> String {
    let mut key = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut key);
    hex::encode(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generates_64_hex_chars() {
        let key = generate_key_hex();
        assert_eq!(key.len(), 64);
        assert!(hex::decode(&key).is_ok());
    }

    #[test]
    fn generates_distinct_keys() {
        assert_ne!(generate_key_hex(), generate_key_hex());
    }
}
