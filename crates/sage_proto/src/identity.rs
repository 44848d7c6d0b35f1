//! Agent identities and the resolver contract the core consumes.
//!
//! The resolver is how a DID becomes usable key material. It is deliberately
//! two separate operations rather than one "resolve a DID" call that
//! returns an untyped bag of keys — the signing and KEM roles must never be
//! interchangeable at the type level.

use sage_crypto::kem::KemPublicKey;
use sage_crypto::signing::SigningPublicKey;
use serde::{Deserialize, Serialize};

use crate::error::ResolverError;

/// An agent's public identity as seen by the core: a DID plus its two
/// resolved key roles. `active` mirrors the resolver's live registry state
/// at resolution time; it is not re-checked by the core after resolution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentIdentity {
    pub did: String,
    pub signing_public_key: SigningPublicKey,
    pub kem_public_key: KemPublicKey,
    pub active: bool,
}

impl AgentIdentity {
    pub fn new(did: impl Into<String>, signing_public_key: SigningPublicKey, kem_public_key: KemPublicKey) -> Self {
        Self {
            did: did.into(),
            signing_public_key,
            kem_public_key,
            active: true,
        }
    }
}

/// Consumed interface: given a DID, resolve its signing key and its KEM key
/// as two independent lookups. A backend that stores both in one record may
/// implement both methods by pulling fields off the same record; the core
/// never calls anything that returns "a public key" without a role.
pub trait IdentityResolver: Send + Sync {
    fn resolve_signing_key(&self, did: &str) -> Result<SigningPublicKey, ResolverError>;
    fn resolve_kem_key(&self, did: &str) -> Result<KemPublicKey, ResolverError>;
}
