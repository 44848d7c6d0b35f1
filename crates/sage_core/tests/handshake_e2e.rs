//! End-to-end tests driving the four-phase handshake and the in-session
//! message pipeline between two in-process agents.
//!
//! Covers:
//!  1. Happy path — full handshake, matching session keys, roundtrip message
//!  2. Tampered Complete signature is rejected
//!  3. Nonce reuse within a session is rejected
//!  4. Idle session expiry blocks further use
//!  5. An identity whose signing key resolves but whose KEM key does not
//!     is rejected as a key-role mismatch

use std::collections::HashMap;
use std::sync::Arc;
use std::thread::sleep;
use std::time::Duration;

use sage_core::error::{HandshakeError, MessageError};
use sage_core::handshake::HandshakeEngine;
use sage_core::message::{sign_message, verify_and_open};
use sage_core::session_manager::SessionManager;
use sage_core::Config;
use sage_crypto::kem::{KemPublicKey, StaticKemKeypair};
use sage_crypto::signing::{generate_signing_keypair, SigningPublicKey, SigningScheme};
use sage_proto::identity::{AgentIdentity, IdentityResolver};
use sage_proto::ResolverError;

struct Registry {
    agents: HashMap<String, AgentIdentity>,
    kem_blocked: HashMap<String, ()>,
}

impl IdentityResolver for Registry {
    fn resolve_signing_key(&self, did: &str) -> Result<SigningPublicKey, ResolverError> {
        self.agents
            .get(did)
            .map(|a| a.signing_public_key.clone())
            .ok_or_else(|| ResolverError::NotFound(did.to_string()))
    }

    fn resolve_kem_key(&self, did: &str) -> Result<KemPublicKey, ResolverError> {
        if self.kem_blocked.contains_key(did) {
            return Err(ResolverError::NotFound(did.to_string()));
        }
        self.agents
            .get(did)
            .map(|a| a.kem_public_key)
            .ok_or_else(|| ResolverError::NotFound(did.to_string()))
    }
}

struct Agent {
    did: String,
    signing: sage_crypto::signing::SigningSecretKey,
    kem: StaticKemKeypair,
}

fn make_agent(did: &str) -> Agent {
    let (signing, _) = generate_signing_keypair(SigningScheme::Ed25519).unwrap();
    Agent {
        did: did.to_string(),
        signing,
        kem: StaticKemKeypair::generate(),
    }
}

fn build_pair(kem_blocked: &[&str], config: Config) -> (HandshakeEngine, HandshakeEngine) {
    let alice = make_agent("did:sage:alice");
    let bob = make_agent("did:sage:bob");

    let mut agents = HashMap::new();
    agents.insert(
        alice.did.clone(),
        AgentIdentity::new(alice.did.clone(), alice.signing.public_key(), alice.kem.public()),
    );
    agents.insert(
        bob.did.clone(),
        AgentIdentity::new(bob.did.clone(), bob.signing.public_key(), bob.kem.public()),
    );
    let kem_blocked = kem_blocked.iter().map(|d| (d.to_string(), ())).collect();
    let registry = Arc::new(Registry { agents, kem_blocked });

    let alice_engine = HandshakeEngine::new(
        alice.did.clone(),
        alice.signing,
        alice.kem,
        registry.clone(),
        Arc::new(SessionManager::new()),
        config.clone(),
    );
    let bob_engine = HandshakeEngine::new(bob.did.clone(), bob.signing, bob.kem, registry, Arc::new(SessionManager::new()), config);
    (alice_engine, bob_engine)
}

fn run_handshake(
    initiator: &HandshakeEngine,
    responder: &HandshakeEngine,
) -> (Arc<sage_core::SecureSession>, Arc<sage_core::SecureSession>) {
    let (context_id, invitation, inv_sig) = initiator.initiator_send_invitation("did:sage:bob").unwrap();
    responder.responder_handle_invitation(invitation, &inv_sig).unwrap();

    let request = initiator.initiator_send_request(&context_id).unwrap();
    let response = responder.responder_handle_request(request).unwrap();
    let (complete_payload, complete_sig) = initiator.initiator_handle_response(response).unwrap();
    let (ack, responder_session) = responder.responder_handle_complete(complete_payload, &complete_sig).unwrap();
    let initiator_session = initiator.initiator_finish(&context_id, ack).unwrap();
    (initiator_session, responder_session)
}

#[test]
fn happy_path_yields_working_session() {
    let (alice, bob) = build_pair(&[], Config::default());
    let (initiator_session, responder_session) = run_handshake(&alice, &bob);
    assert_eq!(initiator_session.sid, responder_session.sid);
    assert!(!initiator_session.kid.is_empty());
    assert_eq!(initiator_session.kid, responder_session.kid);

    let manager = SessionManager::new();
    manager.insert(responder_session);

    let signed = sign_message(&initiator_session, "ctx-e2e", b"please proceed", Duration::from_secs(30)).unwrap();
    let plaintext = verify_and_open(&manager, &signed, "ctx-e2e", Duration::from_secs(120)).unwrap();
    assert_eq!(&plaintext[..], b"please proceed");
}

#[test]
fn tampered_complete_signature_rejected() {
    let (alice, bob) = build_pair(&[], Config::default());

    let (context_id, invitation, inv_sig) = alice.initiator_send_invitation("did:sage:bob").unwrap();
    bob.responder_handle_invitation(invitation, &inv_sig).unwrap();

    let request = alice.initiator_send_request(&context_id).unwrap();
    let response = bob.responder_handle_request(request).unwrap();
    let (complete_payload, _real_sig) = alice.initiator_handle_response(response).unwrap();

    let (forger, _) = generate_signing_keypair(SigningScheme::Ed25519).unwrap();
    let bogus_sig = forger.sign(b"not the complete payload");

    let result = bob.responder_handle_complete(complete_payload, &bogus_sig);
    assert!(matches!(result, Err(HandshakeError::Crypto(_))));
}

#[test]
fn nonce_reuse_within_session_rejected() {
    let (alice, bob) = build_pair(&[], Config::default());
    let (initiator_session, responder_session) = run_handshake(&alice, &bob);

    let manager = SessionManager::new();
    manager.insert(responder_session);

    let signed = sign_message(&initiator_session, "ctx-replay", b"order #1", Duration::from_secs(30)).unwrap();
    verify_and_open(&manager, &signed, "ctx-replay", Duration::from_secs(120)).unwrap();

    let replayed = verify_and_open(&manager, &signed, "ctx-replay", Duration::from_secs(120));
    assert!(matches!(replayed, Err(MessageError::ReplayDetected)));
}

#[test]
fn idle_session_expiry_blocks_further_use() {
    let config = Config::default().with_session_idle_timeout(Duration::from_millis(20));
    let (alice, bob) = build_pair(&[], config);
    let (initiator_session, _responder_session) = run_handshake(&alice, &bob);

    sleep(Duration::from_millis(60));

    let result = sign_message(&initiator_session, "ctx-idle", b"too late", Duration::from_secs(30));
    assert!(matches!(result, Err(MessageError::UnknownKid(_))));
}

#[test]
fn key_role_mismatch_rejected() {
    let (alice, bob) = build_pair(&["did:sage:bob"], Config::default());
    let (context_id, invitation, inv_sig) = alice.initiator_send_invitation("did:sage:bob").unwrap();
    bob.responder_handle_invitation(invitation, &inv_sig).unwrap();

    let result = alice.initiator_send_request(&context_id);
    assert!(matches!(result, Err(HandshakeError::KeyRoleMismatch)));
}
