//! The four-phase handshake state machine.
//!
//! Each phase is a distinct method on `HandshakeEngine` so a caller driving
//! its own transport loop calls exactly the method matching the wire
//! message it just sent or received. The engine never talks to a
//! transport itself — see `sage_proto::transport::Transport`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use chrono::Utc;
use parking_lot::Mutex as PlMutex;
use rand::RngCore;
use sage_crypto::kdf::{derive_bootstrap_key, derive_session_material_into, SessionKeyMaterial};
use sage_crypto::kem::{EphemeralKeypair, KemPublicKey, SharedSecret};
use sage_crypto::signing::{self, Signature, SigningSecretKey};
use sage_crypto::{aead, CryptoError};
use sage_proto::handshake::{
    BootstrapEnvelope, CompleteAck, CompletePayload, EphemeralPayload, HandshakeRole, InvitationPayload,
};
use sage_proto::identity::{AgentIdentity, IdentityResolver};
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::HandshakeError;
use crate::session::{SecureSession, SessionLimits};
use crate::session_manager::SessionManager;

const CLOCK_SKEW_PAST: i64 = 60;
const CLOCK_SKEW_FUTURE: i64 = 30;

fn check_timestamp(ts: i64) -> Result<(), HandshakeError> {
    let now = Utc::now().timestamp();
    if ts < now - CLOCK_SKEW_PAST || ts > now + CLOCK_SKEW_FUTURE {
        return Err(HandshakeError::ClockSkew);
    }
    Ok(())
}

fn random_context_id() -> String {
    let mut bytes = [0u8; 16];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

fn random_kid() -> String {
    let mut bytes = [0u8; 16];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HandshakeState {
    Idle,
    AwaitingRequest,
    AwaitingResponse,
    AwaitingComplete,
    Completed,
    Failed,
}

/// One in-progress (or recently terminal) handshake, tracked on whichever
/// side is driving it. Sensitive fields are `Option`s so a failure path can
/// `take()` and drop them explicitly rather than relying on scope exit —
/// the engine calls `fail()` on every error return.
struct HandshakeContext {
    role: HandshakeRole,
    state: HandshakeState,
    peer_did: String,
    own_ephemeral: Option<EphemeralKeypair>,
    peer_ephemeral_public: Option<KemPublicKey>,
    shared_secret: Option<SharedSecret>,
    pending_session: Option<(SessionKeyMaterial, [u8; 16])>,
    created_at: Instant,
    expires_at: Instant,
}

impl HandshakeContext {
    fn fail(&mut self) {
        self.state = HandshakeState::Failed;
        self.own_ephemeral = None;
        self.shared_secret = None;
        self.pending_session = None;
    }

    fn is_expired(&self, now: Instant) -> bool {
        now > self.expires_at
    }
}

/// Drives the four-phase protocol for one agent. Constructed once per
/// agent identity; holds the long-term signing and KEM keys, the resolver,
/// the in-flight handshake contexts, and a handle to the session manager
/// that completed handshakes feed into.
pub struct HandshakeEngine {
    own_did: String,
    signing_key: SigningSecretKey,
    kem_key: sage_crypto::kem::StaticKemKeypair,
    resolver: Arc<dyn IdentityResolver>,
    sessions: Arc<SessionManager>,
    config: Config,
    contexts: PlMutex<HashMap<String, HandshakeContext>>,
}

impl HandshakeEngine {
    pub fn new(
        own_did: impl Into<String>,
        signing_key: SigningSecretKey,
        kem_key: sage_crypto::kem::StaticKemKeypair,
        resolver: Arc<dyn IdentityResolver>,
        sessions: Arc<SessionManager>,
        config: Config,
    ) -> Self {
        Self {
            own_did: own_did.into(),
            signing_key,
            kem_key,
            resolver,
            sessions,
            config,
            contexts: PlMutex::new(HashMap::new()),
        }
    }

    fn resolve_identity(&self, did: &str) -> Result<AgentIdentity, HandshakeError> {
        let signing_public_key = self
            .resolver
            .resolve_signing_key(did)
            .map_err(|e| map_resolver_not_found(did, e))?;
        let kem_public_key = self
            .resolver
            .resolve_kem_key(did)
            .map_err(|e| map_resolver_role_mismatch(e))?;
        Ok(AgentIdentity::new(did, signing_public_key, kem_public_key))
    }

    // ── Phase 1: Invitation ───────────────────────────────────────────

    /// Initiator: create a fresh context and the signed Invitation payload.
    pub fn initiator_send_invitation(&self, peer_did: &str) -> Result<(String, InvitationPayload, Signature), HandshakeError> {
        let context_id = random_context_id();
        let timestamp = Utc::now().timestamp();
        let payload = InvitationPayload {
            context_id: context_id.clone(),
            initiator_did: self.own_did.clone(),
            timestamp,
        };
        let signature = self.signing_key.sign(&invitation_bytes(&payload));

        let now = Instant::now();
        self.contexts.lock().insert(
            context_id.clone(),
            HandshakeContext {
                role: HandshakeRole::Initiator,
                state: HandshakeState::Idle,
                peer_did: peer_did.to_string(),
                own_ephemeral: None,
                peer_ephemeral_public: None,
                shared_secret: None,
                pending_session: None,
                created_at: now,
                expires_at: now + self.config.handshake_ttl,
            },
        );
        debug!(target: "sage::handshake", context_id = %context_id, "invitation sent");
        Ok((context_id, payload, signature))
    }

    /// Responder: verify and record an incoming Invitation. No reply is
    /// sent for this phase.
    pub fn responder_handle_invitation(&self, payload: InvitationPayload, signature: &Signature) -> Result<(), HandshakeError> {
        check_timestamp(payload.timestamp)?;
        {
            let contexts = self.contexts.lock();
            if contexts.contains_key(&payload.context_id) {
                return Err(HandshakeError::DuplicateContext(payload.context_id));
            }
        }
        let peer_identity = self.resolve_identity(&payload.initiator_did)?;
        if !peer_identity.active {
            return Err(HandshakeError::InactiveDid(payload.initiator_did));
        }
        signing::verify(&peer_identity.signing_public_key, &invitation_bytes(&payload), signature)
            .map_err(HandshakeError::Crypto)?;

        let now = Instant::now();
        self.contexts.lock().insert(
            payload.context_id.clone(),
            HandshakeContext {
                role: HandshakeRole::Responder,
                state: HandshakeState::AwaitingRequest,
                peer_did: payload.initiator_did,
                own_ephemeral: None,
                peer_ephemeral_public: None,
                shared_secret: None,
                pending_session: None,
                created_at: now,
                expires_at: now + self.config.handshake_ttl,
            },
        );
        debug!(target: "sage::handshake", context_id = %payload.context_id, "invitation accepted");
        Ok(())
    }

    // ── Phase 2: Request ─────────────────────────────────────────────

    /// Initiator: generate an ephemeral keypair and produce the
    /// bootstrap-encrypted Request envelope addressed to the peer's KEM key.
    pub fn initiator_send_request(&self, context_id: &str) -> Result<BootstrapEnvelope, HandshakeError> {
        let peer_did = {
            let contexts = self.contexts.lock();
            let ctx = contexts.get(context_id).ok_or(HandshakeError::PhaseOutOfOrder)?;
            if ctx.role != HandshakeRole::Initiator || ctx.state != HandshakeState::Idle {
                return Err(HandshakeError::HandshakeStateMismatch(format!("{:?}", ctx.state)));
            }
            ctx.peer_did.clone()
        };
        let peer_identity = self.resolve_identity(&peer_did)?;

        let ephemeral = EphemeralKeypair::generate();
        let envelope = self.bootstrap_seal(
            context_id,
            b"request",
            &peer_identity.kem_public_key,
            &EphemeralPayload::new(context_id.to_string(), ephemeral.public(), Utc::now().timestamp()),
        )?;

        let mut contexts = self.contexts.lock();
        if let Some(ctx) = contexts.get_mut(context_id) {
            ctx.own_ephemeral = Some(ephemeral);
            ctx.state = HandshakeState::AwaitingResponse;
        }
        debug!(target: "sage::handshake", context_id = %context_id, "request sent");
        Ok(envelope)
    }

    /// Responder: unseal the Request, generate its own ephemeral, and
    /// produce the Response envelope.
    pub fn responder_handle_request(&self, envelope: BootstrapEnvelope) -> Result<BootstrapEnvelope, HandshakeError> {
        let context_id = envelope.context_id.clone();
        let peer_did = {
            let contexts = self.contexts.lock();
            let ctx = contexts.get(&context_id).ok_or(HandshakeError::PhaseOutOfOrder)?;
            if ctx.role != HandshakeRole::Responder || ctx.state != HandshakeState::AwaitingRequest {
                return Err(HandshakeError::HandshakeStateMismatch(format!("{:?}", ctx.state)));
            }
            ctx.peer_did.clone()
        };
        let peer_identity = self.resolve_identity(&peer_did)?;

        let payload: EphemeralPayload = self
            .bootstrap_open(&envelope, b"request", &peer_identity.signing_public_key)
            .map_err(|e| {
                self.fail_context(&context_id);
                e
            })?;

        let ephemeral = EphemeralKeypair::generate();
        let response = self
            .bootstrap_seal(
                &context_id,
                b"response",
                &peer_identity.kem_public_key,
                &EphemeralPayload::new(context_id.clone(), ephemeral.public(), Utc::now().timestamp()),
            )
            .map_err(|e| {
                self.fail_context(&context_id);
                e
            })?;

        let mut contexts = self.contexts.lock();
        if let Some(ctx) = contexts.get_mut(&context_id) {
            ctx.peer_ephemeral_public = Some(payload.ephemeral_pub_raw);
            ctx.own_ephemeral = Some(ephemeral);
            ctx.state = HandshakeState::AwaitingComplete;
        }
        debug!(target: "sage::handshake", context_id = %context_id, "response sent");
        Ok(response)
    }

    // ── Phase 3: Response ────────────────────────────────────────────

    /// Initiator: unseal the Response, derive the shared secret and session
    /// material, and produce the signed Complete payload.
    pub fn initiator_handle_response(&self, envelope: BootstrapEnvelope) -> Result<(CompletePayload, Signature), HandshakeError> {
        let context_id = envelope.context_id.clone();
        let peer_did = {
            let contexts = self.contexts.lock();
            let ctx = contexts.get(&context_id).ok_or(HandshakeError::PhaseOutOfOrder)?;
            if ctx.role != HandshakeRole::Initiator || ctx.state != HandshakeState::AwaitingResponse {
                return Err(HandshakeError::HandshakeStateMismatch(format!("{:?}", ctx.state)));
            }
            ctx.peer_did.clone()
        };
        let peer_identity = self.resolve_identity(&peer_did)?;

        let payload: EphemeralPayload = self.bootstrap_open(&envelope, b"response", &peer_identity.signing_public_key).map_err(|e| {
            self.fail_context(&context_id);
            e
        })?;

        let shared_secret = {
            let own_ephemeral = {
                let mut contexts = self.contexts.lock();
                let ctx = contexts.get_mut(&context_id).ok_or(HandshakeError::PhaseOutOfOrder)?;
                ctx.own_ephemeral.take().ok_or(HandshakeError::PhaseOutOfOrder)?
            };
            own_ephemeral.diffie_hellman(&payload.ephemeral_pub_raw).map_err(|e| {
                self.fail_context(&context_id);
                HandshakeError::Crypto(e)
            })?
        };

        let context_id_bytes = context_id_to_bytes(&context_id)?;
        let key_buf = self.sessions.acquire_key_buffer();
        let (key_material, sid) =
            derive_session_material_into(shared_secret.as_bytes(), &context_id_bytes, key_buf).map_err(|e| {
                self.fail_context(&context_id);
                HandshakeError::Crypto(e)
            })?;

        let complete_payload = CompletePayload {
            context_id: context_id.clone(),
            timestamp: Utc::now().timestamp(),
        };
        let signature = self.signing_key.sign(&complete_bytes(&complete_payload));

        let mut contexts = self.contexts.lock();
        if let Some(ctx) = contexts.get_mut(&context_id) {
            ctx.peer_ephemeral_public = Some(payload.ephemeral_pub_raw);
            ctx.shared_secret = Some(shared_secret);
            ctx.pending_session = Some((key_material, sid));
            ctx.state = HandshakeState::AwaitingComplete;
        }
        debug!(target: "sage::handshake", context_id = %context_id, "complete sent");
        Ok((complete_payload, signature))
    }

    // ── Phase 4: Complete ────────────────────────────────────────────

    /// Responder: verify Complete, derive the same shared secret and
    /// session material, issue a `kid`, and hand back a live session.
    pub fn responder_handle_complete(
        &self,
        payload: CompletePayload,
        signature: &Signature,
    ) -> Result<(CompleteAck, Arc<SecureSession>), HandshakeError> {
        check_timestamp(payload.timestamp)?;
        let context_id = payload.context_id.clone();
        let peer_did = {
            let contexts = self.contexts.lock();
            let ctx = contexts.get(&context_id).ok_or(HandshakeError::PhaseOutOfOrder)?;
            if ctx.role != HandshakeRole::Responder || ctx.state != HandshakeState::AwaitingComplete {
                return Err(HandshakeError::HandshakeStateMismatch(format!("{:?}", ctx.state)));
            }
            ctx.peer_did.clone()
        };
        let peer_identity = self.resolve_identity(&peer_did)?;
        signing::verify(&peer_identity.signing_public_key, &complete_bytes(&payload), signature).map_err(|e| {
            self.fail_context(&context_id);
            HandshakeError::Crypto(e)
        })?;

        let shared_secret = {
            let (own_ephemeral, peer_ephemeral_public) = {
                let mut contexts = self.contexts.lock();
                let ctx = contexts.get_mut(&context_id).ok_or(HandshakeError::PhaseOutOfOrder)?;
                (
                    ctx.own_ephemeral.take().ok_or(HandshakeError::PhaseOutOfOrder)?,
                    ctx.peer_ephemeral_public.ok_or(HandshakeError::PhaseOutOfOrder)?,
                )
            };
            own_ephemeral.diffie_hellman(&peer_ephemeral_public).map_err(|e| {
                self.fail_context(&context_id);
                HandshakeError::Crypto(e)
            })?
        };

        let context_id_bytes = context_id_to_bytes(&context_id)?;
        let key_buf = self.sessions.acquire_key_buffer();
        let (key_material, sid) =
            derive_session_material_into(shared_secret.as_bytes(), &context_id_bytes, key_buf).map_err(|e| {
                self.fail_context(&context_id);
                HandshakeError::Crypto(e)
            })?;
        debug_assert!(!key_material.is_all_zero(), "HKDF produced all-zero session key material");

        let kid = random_kid();
        let limits = SessionLimits {
            max_age: self.config.session_max_age,
            idle_timeout: self.config.session_idle_timeout,
            max_messages: self.config.session_max_messages,
        };
        let session = Arc::new(SecureSession::new(
            sid,
            kid.clone(),
            HandshakeRole::Responder,
            key_material,
            limits,
            self.config.message_nonce_cache_ttl,
        ));
        self.sessions.insert(session.clone());

        {
            let mut contexts = self.contexts.lock();
            if let Some(ctx) = contexts.get_mut(&context_id) {
                ctx.shared_secret = None;
                ctx.state = HandshakeState::Completed;
            }
        }
        debug!(target: "sage::handshake", context_id = %context_id, kid = %kid, "handshake completed (responder)");
        Ok((CompleteAck { kid }, session))
    }

    /// Initiator: having received `{kid}` back, materialize the session
    /// the initiator side already derived in `initiator_handle_response`.
    pub fn initiator_finish(&self, context_id: &str, ack: CompleteAck) -> Result<Arc<SecureSession>, HandshakeError> {
        let (key_material, sid) = {
            let mut contexts = self.contexts.lock();
            let ctx = contexts.get_mut(context_id).ok_or(HandshakeError::PhaseOutOfOrder)?;
            if ctx.role != HandshakeRole::Initiator || ctx.state != HandshakeState::AwaitingComplete {
                return Err(HandshakeError::HandshakeStateMismatch(format!("{:?}", ctx.state)));
            }
            ctx.shared_secret = None;
            ctx.state = HandshakeState::Completed;
            ctx.pending_session.take().ok_or(HandshakeError::PhaseOutOfOrder)?
        };
        debug_assert!(!key_material.is_all_zero(), "HKDF produced all-zero session key material");

        let limits = SessionLimits {
            max_age: self.config.session_max_age,
            idle_timeout: self.config.session_idle_timeout,
            max_messages: self.config.session_max_messages,
        };
        let session = Arc::new(SecureSession::new(
            sid,
            ack.kid.clone(),
            HandshakeRole::Initiator,
            key_material,
            limits,
            self.config.message_nonce_cache_ttl,
        ));
        self.sessions.insert(session.clone());
        debug!(target: "sage::handshake", context_id = %context_id, kid = %ack.kid, "handshake completed (initiator)");
        Ok(session)
    }

    fn fail_context(&self, context_id: &str) {
        let mut contexts = self.contexts.lock();
        if let Some(ctx) = contexts.get_mut(context_id) {
            ctx.fail();
        }
        warn!(target: "sage::handshake", context_id = %context_id, "handshake failed");
    }

    /// Drop every context past its TTL as well as any that already reached
    /// a terminal state, zeroizing any key material still held.
    pub fn evict_expired_contexts(&self, now: Instant) -> usize {
        let mut contexts = self.contexts.lock();
        let before = contexts.len();
        contexts.retain(|_, ctx| !ctx.is_expired(now) && ctx.state != HandshakeState::Completed && ctx.state != HandshakeState::Failed);
        before - contexts.len()
    }

    fn bootstrap_seal(
        &self,
        context_id: &str,
        role: &[u8],
        peer_kem_key: &KemPublicKey,
        payload: &EphemeralPayload,
    ) -> Result<BootstrapEnvelope, HandshakeError> {
        let ephemeral = EphemeralKeypair::generate();
        let epk = ephemeral.public();
        let shared = ephemeral.diffie_hellman(peer_kem_key).map_err(HandshakeError::Crypto)?;
        let context_id_bytes = context_id_to_bytes(context_id)?;
        let key = derive_bootstrap_key(shared.as_bytes(), &context_id_bytes, role).map_err(HandshakeError::Crypto)?;
        let plaintext = serde_json::to_vec(payload).expect("EphemeralPayload always serializes");
        let nonce = aead::nonce_from_sequence(0);
        let ciphertext = aead::seal(&key, &nonce, context_id.as_bytes(), &plaintext).map_err(HandshakeError::Crypto)?;

        let timestamp = Utc::now().timestamp();
        let mut signed_over = Vec::new();
        signed_over.extend_from_slice(epk.as_bytes());
        signed_over.extend_from_slice(&ciphertext);
        signed_over.extend_from_slice(context_id.as_bytes());
        signed_over.extend_from_slice(&timestamp.to_be_bytes());
        let signature = self.signing_key.sign(&signed_over);

        Ok(BootstrapEnvelope {
            epk,
            ciphertext,
            context_id: context_id.to_string(),
            timestamp,
            signature,
        })
    }

    fn bootstrap_open(
        &self,
        envelope: &BootstrapEnvelope,
        role: &[u8],
        sender_signing_key: &sage_crypto::signing::SigningPublicKey,
    ) -> Result<EphemeralPayload, HandshakeError> {
        check_timestamp(envelope.timestamp)?;
        let mut signed_over = Vec::new();
        signed_over.extend_from_slice(envelope.epk.as_bytes());
        signed_over.extend_from_slice(&envelope.ciphertext);
        signed_over.extend_from_slice(envelope.context_id.as_bytes());
        signed_over.extend_from_slice(&envelope.timestamp.to_be_bytes());
        signing::verify(sender_signing_key, &signed_over, &envelope.signature).map_err(HandshakeError::Crypto)?;

        let shared = self.kem_key.diffie_hellman(&envelope.epk).map_err(HandshakeError::Crypto)?;
        let context_id_bytes = context_id_to_bytes(&envelope.context_id)?;
        let key = derive_bootstrap_key(shared.as_bytes(), &context_id_bytes, role).map_err(HandshakeError::Crypto)?;
        let nonce = aead::nonce_from_sequence(0);
        let plaintext = aead::open(&key, &nonce, envelope.context_id.as_bytes(), &envelope.ciphertext)
            .map_err(HandshakeError::Crypto)?;
        serde_json::from_slice(&plaintext).map_err(|_| HandshakeError::InvalidEphemeral)
    }
}

fn invitation_bytes(payload: &InvitationPayload) -> Vec<u8> {
    serde_json::to_vec(payload).expect("InvitationPayload always serializes")
}

fn complete_bytes(payload: &CompletePayload) -> Vec<u8> {
    serde_json::to_vec(payload).expect("CompletePayload always serializes")
}

fn context_id_to_bytes(context_id: &str) -> Result<[u8; 16], HandshakeError> {
    let bytes = hex::decode(context_id).map_err(|e| HandshakeError::Crypto(CryptoError::HexDecode(e)))?;
    bytes
        .try_into()
        .map_err(|_| HandshakeError::Crypto(CryptoError::InvalidKeySize { expected: 16, actual: context_id.len() / 2 }))
}

fn map_resolver_not_found(did: &str, err: sage_proto::ResolverError) -> HandshakeError {
    match err {
        sage_proto::ResolverError::NotFound(_) => HandshakeError::UnknownDid(did.to_string()),
        sage_proto::ResolverError::Inactive(_) => HandshakeError::InactiveDid(did.to_string()),
        other => HandshakeError::Resolver(other),
    }
}

fn map_resolver_role_mismatch(err: sage_proto::ResolverError) -> HandshakeError {
    match err {
        sage_proto::ResolverError::NotFound(_) | sage_proto::ResolverError::BadKey(_, _) => HandshakeError::KeyRoleMismatch,
        other => HandshakeError::Resolver(other),
    }
}

/// Background thread that periodically sweeps timed-out handshake contexts.
pub struct HandshakeJanitor {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl HandshakeJanitor {
    pub fn spawn(engine: Arc<HandshakeEngine>, interval: Duration) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_clone = stop.clone();
        let handle = std::thread::spawn(move || {
            while !stop_clone.load(Ordering::Relaxed) {
                std::thread::sleep(interval);
                if stop_clone.load(Ordering::Relaxed) {
                    break;
                }
                engine.evict_expired_contexts(Instant::now());
            }
        });
        Self { stop, handle: Some(handle) }
    }

    pub fn stop(mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for HandshakeJanitor {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sage_crypto::kem::StaticKemKeypair;
    use sage_crypto::signing::{generate_signing_keypair, SigningScheme};
    use sage_proto::ResolverError;
    use std::collections::HashMap as Map;

    struct StaticResolver {
        agents: Map<String, AgentIdentity>,
    }

    impl IdentityResolver for StaticResolver {
        fn resolve_signing_key(&self, did: &str) -> Result<sage_crypto::signing::SigningPublicKey, ResolverError> {
            self.agents
                .get(did)
                .map(|a| a.signing_public_key.clone())
                .ok_or_else(|| ResolverError::NotFound(did.to_string()))
        }

        fn resolve_kem_key(&self, did: &str) -> Result<KemPublicKey, ResolverError> {
            self.agents
                .get(did)
                .map(|a| a.kem_public_key)
                .ok_or_else(|| ResolverError::NotFound(did.to_string()))
        }
    }

    struct Agent {
        did: String,
        signing: SigningSecretKey,
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

    fn build_engines() -> (HandshakeEngine, HandshakeEngine) {
        let alice = make_agent("did:sage:alice");
        let bob = make_agent("did:sage:bob");

        let mut agents = Map::new();
        agents.insert(
            alice.did.clone(),
            AgentIdentity::new(alice.did.clone(), alice.signing.public_key(), alice.kem.public()),
        );
        agents.insert(
            bob.did.clone(),
            AgentIdentity::new(bob.did.clone(), bob.signing.public_key(), bob.kem.public()),
        );
        let resolver = Arc::new(StaticResolver { agents });

        let alice_engine = HandshakeEngine::new(
            alice.did.clone(),
            alice.signing,
            alice.kem,
            resolver.clone(),
            Arc::new(SessionManager::new()),
            Config::default(),
        );
        let bob_engine = HandshakeEngine::new(
            bob.did.clone(),
            bob.signing,
            bob.kem,
            resolver,
            Arc::new(SessionManager::new()),
            Config::default(),
        );
        (alice_engine, bob_engine)
    }

    #[test]
    fn full_handshake_yields_matching_session_keys() {
        let (initiator, responder) = build_engines();

        let (context_id, invitation, inv_sig) = initiator.initiator_send_invitation("did:sage:bob").unwrap();
        responder.responder_handle_invitation(invitation, &inv_sig).unwrap();

        let request = initiator.initiator_send_request(&context_id).unwrap();
        let response = responder.responder_handle_request(request).unwrap();
        let (complete_payload, complete_sig) = initiator.initiator_handle_response(response).unwrap();
        let (ack, responder_session) = responder.responder_handle_complete(complete_payload, &complete_sig).unwrap();
        let initiator_session = initiator.initiator_finish(&context_id, ack).unwrap();

        assert_eq!(initiator_session.sid, responder_session.sid);

        let (nonce, ct) = initiator_session.encrypt(b"hello bob", b"").unwrap();
        let pt = responder_session.decrypt(&nonce, &ct, b"").unwrap();
        assert_eq!(&pt[..], b"hello bob");

        let (nonce, ct) = responder_session.encrypt(b"hello alice", b"").unwrap();
        let pt = initiator_session.decrypt(&nonce, &ct, b"").unwrap();
        assert_eq!(&pt[..], b"hello alice");
    }

    #[test]
    fn unknown_peer_did_rejected_when_sending_request() {
        let (initiator, _responder) = build_engines();
        let (context_id, _invitation, _sig) = initiator.initiator_send_invitation("did:sage:ghost").unwrap();
        assert!(matches!(
            initiator.initiator_send_request(&context_id),
            Err(HandshakeError::UnknownDid(_))
        ));
    }

    #[test]
    fn tampered_invitation_signature_rejected() {
        let (initiator, responder) = build_engines();
        let (_, invitation, _sig) = initiator.initiator_send_invitation("did:sage:bob").unwrap();
        let (forged_sig, _) = generate_signing_keypair(SigningScheme::Ed25519).unwrap();
        let bogus = forged_sig.sign(b"not the invitation");
        assert!(responder.responder_handle_invitation(invitation, &bogus).is_err());
    }

    #[test]
    fn duplicate_context_id_rejected() {
        let (initiator, responder) = build_engines();
        let (_, invitation, sig) = initiator.initiator_send_invitation("did:sage:bob").unwrap();
        responder.responder_handle_invitation(invitation.clone(), &sig).unwrap();
        assert!(matches!(
            responder.responder_handle_invitation(invitation, &sig),
            Err(HandshakeError::DuplicateContext(_))
        ));
    }

    #[test]
    fn phase_out_of_order_rejected() {
        let (initiator, _responder) = build_engines();
        let fake_context = "00112233445566778899aabbccddeeff";
        assert!(matches!(
            initiator.initiator_send_request(fake_context),
            Err(HandshakeError::PhaseOutOfOrder)
        ));
    }
}
