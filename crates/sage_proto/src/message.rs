//! The abstract signed-message shape shared by handshake envelopes and
//! in-session requests: an ordered component list, signature params, the
//! signature bytes, and an opaque body.

use serde::{Deserialize, Serialize};

use crate::canonical::{Component, SignatureParams};

/// A message carrying everything needed to reconstruct and check its
/// canonical base. `body` may be plaintext (handshake Invitation), AEAD
/// ciphertext (in-session), or a bootstrap-sealed payload (Request/
/// Response) — this type does not interpret it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignedMessage {
    pub components: Vec<String>,
    pub params: SignedParams,
    pub signature: Vec<u8>,
    pub body: Vec<u8>,
}

/// Serializable mirror of `SignatureParams` (kept separate so the
/// canonicalization module's types don't need to derive serde just to be
/// carried on the wire).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignedParams {
    pub keyid: String,
    pub alg: String,
    pub created: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires: Option<i64>,
    pub nonce: String,
}

impl From<SignatureParams> for SignedParams {
    fn from(p: SignatureParams) -> Self {
        Self {
            keyid: p.keyid,
            alg: p.alg,
            created: p.created,
            expires: p.expires,
            nonce: p.nonce,
        }
    }
}

impl From<SignedParams> for SignatureParams {
    fn from(p: SignedParams) -> Self {
        Self {
            keyid: p.keyid,
            alg: p.alg,
            created: p.created,
            expires: p.expires,
            nonce: p.nonce,
        }
    }
}

pub fn component_names(components: &[Component]) -> Vec<String> {
    components.iter().map(Component::name).collect()
}

pub fn components_from_names(names: &[String]) -> Vec<Component> {
    names.iter().map(|n| Component::parse(n)).collect()
}
