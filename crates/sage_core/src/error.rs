//! Per-layer error enums plus the umbrella `SageError` a caller can use
//! with `?` end to end. Each layer's enum matches the taxonomy one-for-one
//! so matching on the inner error is always possible for a caller that
//! wants to distinguish.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum HandshakeError {
    #[error("invitation phase timed out")]
    InvitationTimeout,
    #[error("request phase timed out")]
    RequestTimeout,
    #[error("context_id {0} is already in use by an in-flight handshake")]
    DuplicateContext(String),
    #[error("peer offered an invalid X25519 ephemeral public key")]
    InvalidEphemeral,
    #[error("phase received out of order for the current handshake state")]
    PhaseOutOfOrder,
    #[error("handshake state {0:?} does not accept this operation")]
    HandshakeStateMismatch(String),
    #[error("identity resolved for signing but not for key agreement (or vice versa)")]
    KeyRoleMismatch,
    #[error("unknown DID: {0}")]
    UnknownDid(String),
    #[error("DID {0} is inactive")]
    InactiveDid(String),
    #[error("phase timestamp outside the accepted clock-skew window")]
    ClockSkew,
    #[error("cryptographic failure during handshake: {0}")]
    Crypto(#[from] sage_crypto::CryptoError),
    #[error("resolver error: {0}")]
    Resolver(#[from] sage_proto::ResolverError),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MessageError {
    #[error("message has no signature")]
    MissingSignature,
    #[error("malformed Signature-Input: {0}")]
    MalformedSignatureInput(String),
    #[error("no session for keyid {0}")]
    UnknownKid(String),
    #[error("created/expires outside the accepted clock-skew window")]
    ClockSkew,
    #[error("(keyid, nonce) pair already seen")]
    ReplayDetected,
    #[error("signature verification failed")]
    InvalidSignature,
    #[error("AEAD decryption failed")]
    DecryptFailed,
    #[error("sequence counter violation")]
    SequenceViolation,
    #[error("canonicalization error: {0}")]
    Canonicalize(#[from] sage_proto::CanonicalizeError),
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SessionError {
    #[error("session exceeded its configured lifetime")]
    SessionExpired,
    #[error("session reached its configured message cap")]
    SessionUsageExhausted,
    #[error("no session registered under kid {0}")]
    UnknownSession(String),
    #[error("sequence counter violation")]
    SequenceViolation,
    #[error("signature verification failed")]
    InvalidSignature,
    #[error("AEAD failure: {0}")]
    Crypto(#[from] sage_crypto::CryptoError),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ResourceError {
    #[error("operation timed out")]
    Timeout,
    #[error("operation cancelled")]
    Cancelled,
}

/// Umbrella error a caller can propagate with `?` without naming the
/// specific layer; `http_status` implements the HTTP-style mapping for
/// host applications that want it.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SageError {
    #[error(transparent)]
    Handshake(#[from] HandshakeError),
    #[error(transparent)]
    Message(#[from] MessageError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Resource(#[from] ResourceError),
    #[error(transparent)]
    Crypto(#[from] sage_crypto::CryptoError),
    #[error(transparent)]
    Resolver(#[from] sage_proto::ResolverError),
}

impl SageError {
    /// HTTP status mapping from §6/§7: signature/nonce/session failures
    /// map to 401, malformed structure to 400, wrong key role to 401.
    /// Non-HTTP callers should match the enum directly instead.
    pub fn http_status(&self) -> u16 {
        match self {
            SageError::Message(MessageError::MalformedSignatureInput(_)) => 400,
            SageError::Message(MessageError::MissingSignature) => 400,
            SageError::Message(_) => 401,
            SageError::Session(_) => 401,
            SageError::Handshake(HandshakeError::KeyRoleMismatch) => 401,
            SageError::Handshake(_) => 400,
            SageError::Resolver(_) => 401,
            SageError::Crypto(_) => 401,
            SageError::Resource(ResourceError::Timeout) => 408,
            SageError::Resource(ResourceError::Cancelled) => 499,
        }
    }
}
