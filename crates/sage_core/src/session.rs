//! `SecureSession`: the symmetric channel state produced by a completed
//! handshake. Holds the 192-byte key material, the directional sequence
//! counters, and a per-session nonce replay cache, all behind one lock so
//! `close()` can atomically tear the whole thing down.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use sage_crypto::kdf::SessionKeyMaterial;
use sage_crypto::{aead, hmac};
use sage_proto::handshake::HandshakeRole;
use zeroize::Zeroizing;

use crate::error::SessionError;

/// Absolute and inactivity lifetime policy plus the message budget for one
/// session. Copied out of `Config` at session-creation time so later
/// mutation of the shared `Config` never reaches back into live sessions.
#[derive(Debug, Clone, Copy)]
pub struct SessionLimits {
    pub max_age: Duration,
    pub idle_timeout: Duration,
    pub max_messages: u64,
}

struct NonceCache {
    entries: HashMap<String, Instant>,
    ttl: Duration,
}

impl NonceCache {
    fn new(ttl: Duration) -> Self {
        Self { entries: HashMap::new(), ttl }
    }

    fn evict(&mut self, now: Instant) {
        self.entries.retain(|_, inserted_at| now.duration_since(*inserted_at) < self.ttl);
    }

    /// Returns true if `nonce` was newly inserted (not a replay).
    fn insert(&mut self, nonce: &str, now: Instant) -> bool {
        self.evict(now);
        if self.entries.contains_key(nonce) {
            false
        } else {
            self.entries.insert(nonce.to_string(), now);
            true
        }
    }
}

struct Inner {
    key_material: Option<SessionKeyMaterial>,
    out_seq: u64,
    in_seq: u64,
    nonce_cache: NonceCache,
    last_used_at: Instant,
}

pub struct SecureSession {
    pub sid: [u8; 16],
    pub kid: String,
    pub role: HandshakeRole,
    created_at: Instant,
    limits: SessionLimits,
    inner: Mutex<Inner>,
}

impl SecureSession {
    pub fn new(
        sid: [u8; 16],
        kid: String,
        role: HandshakeRole,
        key_material: SessionKeyMaterial,
        limits: SessionLimits,
        nonce_cache_ttl: Duration,
    ) -> Self {
        let now = Instant::now();
        Self {
            sid,
            kid,
            role,
            created_at: now,
            limits,
            inner: Mutex::new(Inner {
                key_material: Some(key_material),
                out_seq: 0,
                in_seq: 0,
                nonce_cache: NonceCache::new(nonce_cache_ttl),
                last_used_at: now,
            }),
        }
    }

    fn out_enc_key<'a>(&self, km: &'a SessionKeyMaterial) -> &'a [u8; 32] {
        match self.role {
            HandshakeRole::Initiator => km.c2s_enc(),
            HandshakeRole::Responder => km.s2c_enc(),
        }
    }

    fn out_sign_key<'a>(&self, km: &'a SessionKeyMaterial) -> &'a [u8; 32] {
        match self.role {
            HandshakeRole::Initiator => km.c2s_sign(),
            HandshakeRole::Responder => km.s2c_sign(),
        }
    }

    fn in_enc_key<'a>(&self, km: &'a SessionKeyMaterial) -> &'a [u8; 32] {
        match self.role {
            HandshakeRole::Initiator => km.s2c_enc(),
            HandshakeRole::Responder => km.c2s_enc(),
        }
    }

    fn in_sign_key<'a>(&self, km: &'a SessionKeyMaterial) -> &'a [u8; 32] {
        match self.role {
            HandshakeRole::Initiator => km.s2c_sign(),
            HandshakeRole::Responder => km.c2s_sign(),
        }
    }

    /// True if the session is past its absolute lifetime, idle timeout, or
    /// message budget. Does not mutate anything.
    pub fn is_expired(&self, now: Instant) -> bool {
        if now.duration_since(self.created_at) > self.limits.max_age {
            return true;
        }
        let inner = self.inner.lock();
        if inner.key_material.is_none() {
            return true;
        }
        if now.duration_since(inner.last_used_at) > self.limits.idle_timeout {
            return true;
        }
        inner.out_seq + inner.in_seq >= self.limits.max_messages
    }

    /// Seal `plaintext` under the outbound encryption key, returning the
    /// nonce built from the pre-increment `out_seq` and the ciphertext.
    pub fn encrypt(&self, plaintext: &[u8], aad: &[u8]) -> Result<([u8; aead::NONCE_LEN], Vec<u8>), SessionError> {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        let km = inner.key_material.as_ref().ok_or(SessionError::SessionExpired)?;
        if now.duration_since(self.created_at) > self.limits.max_age
            || now.duration_since(inner.last_used_at) > self.limits.idle_timeout
        {
            return Err(SessionError::SessionExpired);
        }
        if inner.out_seq + inner.in_seq >= self.limits.max_messages {
            return Err(SessionError::SessionUsageExhausted);
        }
        let nonce = aead::nonce_from_sequence(inner.out_seq);
        let key = *self.out_enc_key(km);
        let ciphertext = aead::seal(&key, &nonce, aad, plaintext)?;
        inner.out_seq += 1;
        inner.last_used_at = now;
        Ok((nonce, ciphertext))
    }

    /// Open `ciphertext` with the inbound decryption key. The nonce's
    /// embedded counter must equal the session's current `in_seq` exactly
    /// (strict monotonic, zero skip window).
    pub fn decrypt(
        &self,
        nonce: &[u8; aead::NONCE_LEN],
        ciphertext: &[u8],
        aad: &[u8],
    ) -> Result<Zeroizing<Vec<u8>>, SessionError> {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        let km = inner.key_material.as_ref().ok_or(SessionError::SessionExpired)?;
        let expected = aead::nonce_from_sequence(inner.in_seq);
        if *nonce != expected {
            return Err(SessionError::SequenceViolation);
        }
        let key = *self.in_enc_key(km);
        let plaintext = aead::open(&key, nonce, aad, ciphertext)?;
        inner.in_seq += 1;
        inner.last_used_at = now;
        Ok(plaintext)
    }

    pub fn seal_signature(&self, canonical_base: &[u8]) -> Result<[u8; 32], SessionError> {
        let inner = self.inner.lock();
        let km = inner.key_material.as_ref().ok_or(SessionError::SessionExpired)?;
        let key = *self.out_sign_key(km);
        Ok(hmac::hmac_sha256(&key, canonical_base))
    }

    pub fn verify_signature(&self, canonical_base: &[u8], mac: &[u8; 32]) -> Result<(), SessionError> {
        let inner = self.inner.lock();
        let km = inner.key_material.as_ref().ok_or(SessionError::SessionExpired)?;
        let key = *self.in_sign_key(km);
        hmac::verify(&key, canonical_base, mac).map_err(|_| SessionError::InvalidSignature)
    }

    /// Record `(nonce)` against this session's replay cache. Returns
    /// `false` if it has already been seen within the TTL.
    pub fn check_and_record_nonce(&self, nonce: &str) -> bool {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        inner.nonce_cache.insert(nonce, now)
    }

    pub fn touch(&self) {
        self.inner.lock().last_used_at = Instant::now();
    }

    /// Zeroize the key material and mark the session unusable. Idempotent.
    pub fn close(&self) {
        self.close_and_reclaim();
    }

    /// Zeroize and mark the session unusable like `close`, but also hand
    /// back the 192-byte buffer so the caller can return it to a
    /// `KeyMaterialPool`. Returns `None` if the session was already closed.
    pub fn close_and_reclaim(&self) -> Option<Box<[u8; sage_crypto::kdf::SESSION_KEY_MATERIAL_LEN]>> {
        let mut inner = self.inner.lock();
        inner.nonce_cache.entries.clear();
        inner.key_material.take().map(|km| km.reclaim())
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().key_material.is_none()
    }
}
