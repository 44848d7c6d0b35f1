//! In-session message signing and the seven-step verification pipeline:
//! parse `Signature-Input` → locate the session by `keyid` → enforce clock
//! skew → record the nonce → rebuild the canonical base → verify the
//! signature → AEAD-decrypt the body.
//!
//! Unlike the handshake phases (which sign directly over a JSON payload),
//! in-session messages go through the full RFC 9421–style canonicalization
//! in `sage_proto::canonical` — this is the layer that machinery exists
//! for.

use std::time::Duration;

use chrono::Utc;
use rand::RngCore;
use sage_crypto::aead::NONCE_LEN;
use sage_proto::canonical::{build_canonical_base, CanonicalSource, Component, DerivedComponent, SignatureParams};
use sage_proto::message::{component_names, components_from_names, SignedMessage, SignedParams};
use zeroize::Zeroizing;

use crate::error::{MessageError, SessionError};
use crate::session::SecureSession;
use crate::session_manager::SessionManager;

const SIGNING_ALG: &str = "hmac-sha256";

fn default_components() -> Vec<Component> {
    vec![Component::ContentDigest, Component::Header("sage-context-id".to_string())]
}

struct MessageSource {
    context_id: String,
    body: Vec<u8>,
}

impl CanonicalSource for MessageSource {
    fn derived(&self, _component: &DerivedComponent) -> Option<String> {
        None
    }

    fn header_values(&self, name: &str) -> Vec<String> {
        if name.eq_ignore_ascii_case("sage-context-id") {
            vec![self.context_id.clone()]
        } else {
            Vec::new()
        }
    }

    fn body(&self) -> &[u8] {
        &self.body
    }
}

fn random_nonce() -> String {
    let mut bytes = [0u8; 16];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

fn map_session_error(err: SessionError) -> MessageError {
    match err {
        SessionError::SessionExpired | SessionError::SessionUsageExhausted | SessionError::UnknownSession(_) => {
            MessageError::UnknownKid("session is no longer usable".to_string())
        }
        SessionError::SequenceViolation => MessageError::SequenceViolation,
        SessionError::InvalidSignature => MessageError::InvalidSignature,
        SessionError::Crypto(_) => MessageError::DecryptFailed,
    }
}

/// Seal `plaintext` under `session` and wrap it in a `SignedMessage` whose
/// canonical base covers the AEAD ciphertext (via `content-digest`) and the
/// declared `context_id`.
pub fn sign_message(
    session: &SecureSession,
    context_id: &str,
    plaintext: &[u8],
    expires_in: Duration,
) -> Result<SignedMessage, MessageError> {
    let (nonce, ciphertext) = session.encrypt(plaintext, context_id.as_bytes()).map_err(map_session_error)?;
    let mut body = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    body.extend_from_slice(&nonce);
    body.extend_from_slice(&ciphertext);

    let created = Utc::now().timestamp();
    let params = SignatureParams {
        keyid: session.kid.clone(),
        alg: SIGNING_ALG.to_string(),
        created,
        expires: Some(created + expires_in.as_secs() as i64),
        nonce: random_nonce(),
    };

    let components = default_components();
    let source = MessageSource {
        context_id: context_id.to_string(),
        body: body.clone(),
    };
    let canonical_base = build_canonical_base(&components, &params, &source)?;
    let mac = session.seal_signature(&canonical_base).map_err(map_session_error)?;

    Ok(SignedMessage {
        components: component_names(&components),
        params: SignedParams::from(params),
        signature: mac.to_vec(),
        body,
    })
}

/// Run the full verification pipeline against `message` and return the
/// decrypted plaintext. `context_id` is the value the caller expects this
/// message to be bound to (out-of-band — e.g. from the enclosing transport
/// envelope), checked against the signed `sage-context-id` component.
pub fn verify_and_open(
    sessions: &SessionManager,
    message: &SignedMessage,
    context_id: &str,
    max_clock_skew: Duration,
) -> Result<Zeroizing<Vec<u8>>, MessageError> {
    if message.signature.is_empty() {
        return Err(MessageError::MissingSignature);
    }
    let params: SignatureParams = message.params.clone().into();
    let components = components_from_names(&message.components);

    let session = sessions
        .get(&params.keyid)
        .ok_or_else(|| MessageError::UnknownKid(params.keyid.clone()))?;

    let now = Utc::now().timestamp();
    let skew = max_clock_skew.as_secs() as i64;
    if params.created > now + skew || params.created < now - skew {
        return Err(MessageError::ClockSkew);
    }
    if let Some(expires) = params.expires {
        if expires < now - skew {
            return Err(MessageError::ClockSkew);
        }
    }

    if !session.check_and_record_nonce(&params.nonce) {
        return Err(MessageError::ReplayDetected);
    }

    let source = MessageSource {
        context_id: context_id.to_string(),
        body: message.body.clone(),
    };
    let canonical_base = build_canonical_base(&components, &params, &source)?;

    let mac: [u8; 32] = message
        .signature
        .as_slice()
        .try_into()
        .map_err(|_| MessageError::InvalidSignature)?;
    session.verify_signature(&canonical_base, &mac).map_err(map_session_error)?;

    if message.body.len() < NONCE_LEN {
        return Err(MessageError::DecryptFailed);
    }
    let (nonce_bytes, ciphertext) = message.body.split_at(NONCE_LEN);
    let nonce: [u8; NONCE_LEN] = nonce_bytes.try_into().expect("split_at guarantees the length");
    session.decrypt(&nonce, ciphertext, context_id.as_bytes()).map_err(map_session_error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sage_crypto::kdf::derive_session_material;
    use sage_proto::handshake::HandshakeRole;
    use std::sync::Arc;
    use std::time::Duration as StdDuration;

    fn paired_sessions() -> (Arc<SecureSession>, Arc<SecureSession>) {
        let (km_a, sid) = derive_session_material(&[5u8; 32], &[6u8; 16]).unwrap();
        let (km_b, _) = derive_session_material(&[5u8; 32], &[6u8; 16]).unwrap();
        let limits = crate::session::SessionLimits {
            max_age: StdDuration::from_secs(3600),
            idle_timeout: StdDuration::from_secs(600),
            max_messages: 1_000_000,
        };
        let initiator = Arc::new(SecureSession::new(
            sid,
            "kid-1".to_string(),
            HandshakeRole::Initiator,
            km_a,
            limits,
            StdDuration::from_secs(600),
        ));
        let responder = Arc::new(SecureSession::new(
            sid,
            "kid-1".to_string(),
            HandshakeRole::Responder,
            km_b,
            limits,
            StdDuration::from_secs(600),
        ));
        (initiator, responder)
    }

    #[test]
    fn sign_and_verify_roundtrip() {
        let (initiator, responder) = paired_sessions();
        let manager = SessionManager::new();
        manager.insert(responder);

        let signed = sign_message(&initiator, "ctx-1", b"do the thing", StdDuration::from_secs(60)).unwrap();
        let plaintext = verify_and_open(&manager, &signed, "ctx-1", StdDuration::from_secs(300)).unwrap();
        assert_eq!(&plaintext[..], b"do the thing");
    }

    #[test]
    fn replay_of_same_nonce_rejected() {
        let (initiator, responder) = paired_sessions();
        let manager = SessionManager::new();
        manager.insert(responder);

        let signed = sign_message(&initiator, "ctx-1", b"once", StdDuration::from_secs(60)).unwrap();
        verify_and_open(&manager, &signed, "ctx-1", StdDuration::from_secs(300)).unwrap();
        assert!(matches!(
            verify_and_open(&manager, &signed, "ctx-1", StdDuration::from_secs(300)),
            Err(MessageError::ReplayDetected)
        ));
    }

    #[test]
    fn tampered_body_rejected() {
        let (initiator, responder) = paired_sessions();
        let manager = SessionManager::new();
        manager.insert(responder);

        let mut signed = sign_message(&initiator, "ctx-1", b"trust me", StdDuration::from_secs(60)).unwrap();
        let last = signed.body.len() - 1;
        signed.body[last] ^= 0xff;
        assert!(verify_and_open(&manager, &signed, "ctx-1", StdDuration::from_secs(300)).is_err());
    }

    #[test]
    fn unknown_kid_rejected() {
        let (initiator, _responder) = paired_sessions();
        let manager = SessionManager::new();
        let signed = sign_message(&initiator, "ctx-1", b"hi", StdDuration::from_secs(60)).unwrap();
        assert!(matches!(
            verify_and_open(&manager, &signed, "ctx-1", StdDuration::from_secs(300)),
            Err(MessageError::UnknownKid(_))
        ));
    }
}
