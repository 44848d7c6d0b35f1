use thiserror::Error;

/// Every failure mode the primitives layer can produce. One condition maps
/// to exactly one variant so callers can branch on `Kind` without string
/// matching.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CryptoError {
    #[error("invalid key size: expected {expected} bytes, got {actual}")]
    InvalidKeySize { expected: usize, actual: usize },

    #[error("signature verification failed")]
    InvalidSignature,

    #[error("AEAD decryption failed (authentication tag mismatch)")]
    DecryptFailed,

    #[error("public point is invalid or lies in a small subgroup")]
    BadPublicPoint,

    #[error("unsupported signing scheme: {0}")]
    UnsupportedScheme(String),

    #[error("key derivation failed: {0}")]
    KeyDerivation(String),

    #[error("invalid key material: {0}")]
    InvalidKey(String),

    #[error("hex decode error: {0}")]
    HexDecode(#[from] hex::FromHexError),

    #[error("base64 decode error: {0}")]
    Base64Decode(#[from] base64::DecodeError),
}
