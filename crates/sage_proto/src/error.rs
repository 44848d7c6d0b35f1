use thiserror::Error;

/// Failures surfaced by an `IdentityResolver` implementation. The core
/// treats every variant as fatal for the handshake attempt in progress.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ResolverError {
    #[error("no identity registered for DID {0}")]
    NotFound(String),

    #[error("DID {0} is registered but marked inactive")]
    Inactive(String),

    #[error("resolved key material for DID {0} is malformed: {1}")]
    BadKey(String, String),

    #[error("resolver backend error: {0}")]
    Backend(String),
}

/// Failures in canonicalizing or parsing a signed message's structure,
/// independent of any cryptographic verdict.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CanonicalizeError {
    #[error("message declares a component with no corresponding value: {0}")]
    MissingComponent(String),

    #[error("malformed Signature-Input: {0}")]
    MalformedSignatureInput(String),

    #[error("missing signature")]
    MissingSignature,
}
