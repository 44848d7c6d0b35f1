//! HMAC-SHA256, used for the session layer's symmetric `seal_signature`/
//! `verify_signature` operations and, where a peer has no asymmetric
//! signing key resolvable, as a message-signing algorithm.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::error::CryptoError;

type HmacSha256 = Hmac<Sha256>;

pub fn hmac_sha256(key: &[u8; 32], message: &[u8]) -> [u8; 32] {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(message);
    mac.finalize().into_bytes().into()
}

/// Constant-time verification. Never short-circuits on the first differing
/// byte.
pub fn verify(key: &[u8; 32], message: &[u8], tag: &[u8; 32]) -> Result<(), CryptoError> {
    let expected = hmac_sha256(key, message);
    if expected.ct_eq(tag).into() {
        Ok(())
    } else {
        Err(CryptoError::InvalidSignature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        let key = [5u8; 32];
        let tag = hmac_sha256(&key, b"hello");
        verify(&key, b"hello", &tag).unwrap();
    }

    #[test]
    fn tampered_message_rejected() {
        let key = [5u8; 32];
        let tag = hmac_sha256(&key, b"hello");
        assert!(verify(&key, b"goodbye", &tag).is_err());
    }

    #[test]
    fn wrong_key_rejected() {
        let tag = hmac_sha256(&[5u8; 32], b"hello");
        assert!(verify(&[6u8; 32], b"hello", &tag).is_err());
    }
}
