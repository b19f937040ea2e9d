//! Authenticated Encryption with Associated Data.
//!
//! Uses AES-256-GCM: 32-byte key, 12-byte nonce, 16-byte tag. Every key
//! passed to `encrypt`/`decrypt` here is a Double Ratchet message key, used
//! for exactly one message and then erased — so the nonce does not need a
//! mutable counter, only a deterministic derivation from that one-time key.

use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Nonce,
};
use hkdf::Hkdf;
use sha2::Sha256;

use crate::error::{Result, SignalError};

pub const NONCE_LEN: usize = 12;
pub const TAG_LEN: usize = 16;

/// Encrypt `plaintext` under `key` with the given 12-byte `nonce` and `aad`.
/// Returns ciphertext with the 16-byte GCM tag appended.
pub fn encrypt(key: &[u8; 32], nonce: &[u8; NONCE_LEN], aad: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| SignalError::EncryptFailed)?;
    cipher
        .encrypt(Nonce::from_slice(nonce), Payload { msg: plaintext, aad })
        .map_err(|_| SignalError::EncryptFailed)
}

/// Decrypt `ciphertext` (including its trailing 16-byte tag) under `key`.
/// Fails with `DecryptFailed` if the tag does not verify.
pub fn decrypt(key: &[u8; 32], nonce: &[u8; NONCE_LEN], aad: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>> {
    if ciphertext.len() < TAG_LEN {
        return Err(SignalError::DecryptFailed);
    }
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| SignalError::DecryptFailed)?;
    cipher
        .decrypt(Nonce::from_slice(nonce), Payload { msg: ciphertext, aad })
        .map_err(|_| SignalError::DecryptFailed)
}

/// Derive a 12-byte nonce from a one-time-use message key via HKDF-SHA-256.
///
/// Both peers derive the same nonce deterministically from `MK`, so no
/// nonce needs to travel on the wire alongside the ciphertext.
pub fn derive_nonce(message_key: &[u8; 32]) -> Result<[u8; NONCE_LEN]> {
    let hk = Hkdf::<Sha256>::new(None, message_key);
    let mut nonce = [0u8; NONCE_LEN];
    hk.expand(b"DR-nonce", &mut nonce)
        .map_err(|e| SignalError::DerivationFailed(e.to_string()))?;
    Ok(nonce)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let key = [7u8; 32];
        let nonce = [1u8; NONCE_LEN];
        let ct = encrypt(&key, &nonce, b"aad", b"hello").unwrap();
        let pt = decrypt(&key, &nonce, b"aad", &ct).unwrap();
        assert_eq!(pt, b"hello");
    }

    #[test]
    fn bad_tag_rejected() {
        let key = [7u8; 32];
        let nonce = [1u8; NONCE_LEN];
        let mut ct = encrypt(&key, &nonce, b"aad", b"hello").unwrap();
        let last = ct.len() - 1;
        ct[last] ^= 0xFF;
        assert!(decrypt(&key, &nonce, b"aad", &ct).is_err());
    }

    #[test]
    fn wrong_aad_rejected() {
        let key = [7u8; 32];
        let nonce = [1u8; NONCE_LEN];
        let ct = encrypt(&key, &nonce, b"aad", b"hello").unwrap();
        assert!(decrypt(&key, &nonce, b"other-aad", &ct).is_err());
    }

    #[test]
    fn nonce_derivation_is_deterministic() {
        let mk = [42u8; 32];
        assert_eq!(derive_nonce(&mk).unwrap(), derive_nonce(&mk).unwrap());
    }
}
