//! Wire-shaped payloads for the four handshake phases. These are pure data
//! — the state machine that drives them lives in `sage-core`.

use sage_crypto::kem::{Jwk, KemPublicKey};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandshakeRole {
    Initiator,
    Responder,
}

/// Phase 1: initiator → responder, cleartext, signed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvitationPayload {
    pub context_id: String,
    pub initiator_did: String,
    pub timestamp: i64,
}

/// Phases 2 and 3 share this shape (Request: initiator → responder,
/// Response: responder → initiator). Bootstrap-encrypted on the wire; this
/// struct is the *plaintext* the bootstrap layer seals and unseals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EphemeralPayload {
    pub context_id: String,
    pub ephemeral_pub_raw: KemPublicKey,
    pub ephemeral_pub_jwk: Jwk,
    pub timestamp: i64,
}

impl EphemeralPayload {
    pub fn new(context_id: String, ephemeral_pub: KemPublicKey, timestamp: i64) -> Self {
        let ephemeral_pub_jwk = ephemeral_pub.to_jwk();
        Self {
            context_id,
            ephemeral_pub_raw: ephemeral_pub,
            ephemeral_pub_jwk,
            timestamp,
        }
    }
}

/// The outer envelope a bootstrap-encrypted phase travels in: the sender's
/// single-use KEM public key, the sealed ciphertext, and a signature over
/// `(epk || ct || context_id || timestamp)` made with the sender's
/// long-term signing key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootstrapEnvelope {
    pub epk: KemPublicKey,
    pub ciphertext: Vec<u8>,
    pub context_id: String,
    pub timestamp: i64,
    pub signature: sage_crypto::signing::Signature,
}

/// Phase 4: initiator → responder, signed, body empty.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletePayload {
    pub context_id: String,
    pub timestamp: i64,
}

/// Responder's reply to a valid Complete: the session key identifier the
/// initiator should use for subsequent messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompleteAck {
    pub kid: String,
}
