//! Authenticated encryption.
//!
//! ChaCha20-Poly1305 is the required cipher (32-byte key, 12-byte nonce,
//! 16-byte tag). AES-256-GCM is offered as an optional second cipher under
//! the same call shape. Nonces are never generated here — the caller
//! (the session layer) derives a 12-byte nonce from its own sequence
//! counter and passes it in; this module never touches randomness.

use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    ChaCha20Poly1305,
};
use zeroize::Zeroizing;

use crate::error::CryptoError;

pub const NONCE_LEN: usize = 12;

/// `aead_seal(key, nonce, aad, plaintext) -> ciphertext||tag` using
/// ChaCha20-Poly1305.
pub fn seal(key: &[u8; 32], nonce: &[u8; NONCE_LEN], aad: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let cipher = ChaCha20Poly1305::new_from_slice(key).map_err(|_| CryptoError::DecryptFailed)?;
    cipher
        .encrypt(nonce.into(), Payload { msg: plaintext, aad })
        .map_err(|_| CryptoError::DecryptFailed)
}

/// `aead_open(key, nonce, aad, ciphertext) -> plaintext`.
pub fn open(
    key: &[u8; 32],
    nonce: &[u8; NONCE_LEN],
    aad: &[u8],
    ciphertext: &[u8],
) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    let cipher = ChaCha20Poly1305::new_from_slice(key).map_err(|_| CryptoError::DecryptFailed)?;
    let plaintext = cipher
        .decrypt(nonce.into(), Payload { msg: ciphertext, aad })
        .map_err(|_| CryptoError::DecryptFailed)?;
    Ok(Zeroizing::new(plaintext))
}

/// Optional AES-256-GCM variant, same call shape as `seal`/`open`.
pub mod aes256gcm {
    use aes_gcm::aead::{Aead, KeyInit, Payload};
    use aes_gcm::Aes256Gcm;
    use zeroize::Zeroizing;

    use super::NONCE_LEN;
    use crate::error::CryptoError;

    pub fn seal(key: &[u8; 32], nonce: &[u8; NONCE_LEN], aad: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| CryptoError::DecryptFailed)?;
        cipher
            .encrypt(nonce.into(), Payload { msg: plaintext, aad })
            .map_err(|_| CryptoError::DecryptFailed)
    }

    pub fn open(
        key: &[u8; 32],
        nonce: &[u8; NONCE_LEN],
        aad: &[u8],
        ciphertext: &[u8],
    ) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
        let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| CryptoError::DecryptFailed)?;
        let plaintext = cipher
            .decrypt(nonce.into(), Payload { msg: ciphertext, aad })
            .map_err(|_| CryptoError::DecryptFailed)?;
        Ok(Zeroizing::new(plaintext))
    }
}

/// Build a 12-byte nonce from a monotonic 64-bit sequence counter: 4 zero
/// bytes followed by the counter, big-endian. Shared by the session layer
/// for both the bootstrap seal (`seq = 0`) and per-message sealing.
pub fn nonce_from_sequence(seq: u64) -> [u8; NONCE_LEN] {
    let mut nonce = [0u8; NONCE_LEN];
    nonce[4..].copy_from_slice(&seq.to_be_bytes());
    nonce
}
