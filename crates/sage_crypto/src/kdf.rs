//! HKDF-SHA256 key derivation.
//!
//! Exposes the raw `hkdf_extract`/`hkdf_expand` primitives, plus two
//! higher-level derivations used directly by the handshake/session layers:
//! the bootstrap-encryption key and the six-key session material split.

use hkdf::Hkdf;
use parking_lot::Mutex;
use sha2::Sha256;
use zeroize::ZeroizeOnDrop;

use crate::error::CryptoError;

/// A pseudorandom key produced by `hkdf_extract`. Wraps the extracted HKDF
/// state so repeated `expand` calls reuse the underlying hash context
/// instead of re-hashing the salt/ikm each time.
pub struct Prk(Hkdf<Sha256>);

pub fn hkdf_extract(salt: &[u8], ikm: &[u8]) -> Prk {
    Prk(Hkdf::<Sha256>::new(Some(salt), ikm))
}

pub fn hkdf_expand(prk: &Prk, info: &[u8], out_len: usize) -> Result<Vec<u8>, CryptoError> {
    let mut out = vec![0u8; out_len];
    prk.0
        .expand(info, &mut out)
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;
    Ok(out)
}

// ── Bootstrap encryption key ──────────────────────────────────────────────

/// `K = HKDF-Expand(HKDF-Extract(salt="sage/bootstrap/v1", ikm=ss), info=context_id || role, 32)`
pub fn derive_bootstrap_key(
    shared_secret: &[u8; 32],
    context_id: &[u8; 16],
    role: &[u8],
) -> Result<[u8; 32], CryptoError> {
    let prk = hkdf_extract(b"sage/bootstrap/v1", shared_secret);
    let mut info = Vec::with_capacity(context_id.len() + role.len());
    info.extend_from_slice(context_id);
    info.extend_from_slice(role);
    let mut key = [0u8; 32];
    prk.0
        .expand(&info, &mut key)
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;
    Ok(key)
}

// ── Session key material ──────────────────────────────────────────────────

pub const SESSION_KEY_MATERIAL_LEN: usize = 192;
const SID_LEN: usize = 16;

/// The 192-byte session key buffer, split into six fixed, non-overlapping
/// 32-byte segments in a fixed order:
/// `[c2s_enc | c2s_sign | s2c_enc | s2c_sign | header_key | exporter]`.
/// Allocated once; the accessor methods below return sub-slices rather
/// than copies.
#[derive(ZeroizeOnDrop)]
pub struct SessionKeyMaterial(Box<[u8; SESSION_KEY_MATERIAL_LEN]>);

impl SessionKeyMaterial {
    fn segment(&self, index: usize) -> &[u8; 32] {
        self.0[index * 32..(index + 1) * 32]
            .try_into()
            .expect("segment is always exactly 32 bytes")
    }

    pub fn c2s_enc(&self) -> &[u8; 32] {
        self.segment(0)
    }
    pub fn c2s_sign(&self) -> &[u8; 32] {
        self.segment(1)
    }
    pub fn s2c_enc(&self) -> &[u8; 32] {
        self.segment(2)
    }
    pub fn s2c_sign(&self) -> &[u8; 32] {
        self.segment(3)
    }
    pub fn header_key(&self) -> &[u8; 32] {
        self.segment(4)
    }
    pub fn exporter(&self) -> &[u8; 32] {
        self.segment(5)
    }

    /// All 192 bytes are zero. A defensive, debug-only check that an HKDF
    /// call never silently produced degenerate output — never a
    /// protocol-level error path.
    pub fn is_all_zero(&self) -> bool {
        self.0.iter().all(|b| *b == 0)
    }

    /// Reclaim the backing allocation for reuse through a `KeyMaterialPool`.
    /// The returned buffer is zeroed; callers must not treat its prior
    /// contents as live key material.
    pub fn reclaim(mut self) -> Box<[u8; SESSION_KEY_MATERIAL_LEN]> {
        let mut buf = std::mem::replace(&mut self.0, Box::new([0u8; SESSION_KEY_MATERIAL_LEN]));
        for b in buf.iter_mut() {
            *b = 0;
        }
        buf
    }
}

/// Freelist of 192-byte session key buffers. Completing a handshake pulls a
/// buffer from here instead of allocating one whenever a prior session's
/// buffer has been returned; `SessionManager` hands buffers back on
/// eviction/removal so a long-running process with steady session churn
/// settles into reusing a small, bounded set of allocations.
pub struct KeyMaterialPool {
    free: Mutex<Vec<Box<[u8; SESSION_KEY_MATERIAL_LEN]>>>,
}

impl KeyMaterialPool {
    pub fn new() -> Self {
        Self { free: Mutex::new(Vec::new()) }
    }

    /// Take a buffer off the freelist, allocating a fresh one if it's empty.
    pub fn acquire(&self) -> Box<[u8; SESSION_KEY_MATERIAL_LEN]> {
        self.free
            .lock()
            .pop()
            .unwrap_or_else(|| Box::new([0u8; SESSION_KEY_MATERIAL_LEN]))
    }

    /// Return a buffer for future reuse. Callers pass buffers already
    /// zeroed by `SessionKeyMaterial::reclaim`.
    pub fn release(&self, buf: Box<[u8; SESSION_KEY_MATERIAL_LEN]>) {
        self.free.lock().push(buf);
    }

    pub fn len(&self) -> usize {
        self.free.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for KeyMaterialPool {
    fn default() -> Self {
        Self::new()
    }
}

/// Derive `(session_key_material, sid)` from a handshake's shared secret
/// and context id into a caller-supplied buffer — the pooled entry point
/// used once a `KeyMaterialPool` is available. Both sides of a handshake
/// call this (or `derive_session_material`) with identical inputs and must
/// obtain bitwise-identical output.
///
/// Uses exactly one extract and two expands against the same `Hkdf`
/// instance, never six separate derivations.
pub fn derive_session_material_into(
    shared_secret: &[u8; 32],
    context_id: &[u8; 16],
    mut buf: Box<[u8; SESSION_KEY_MATERIAL_LEN]>,
) -> Result<(SessionKeyMaterial, [u8; SID_LEN]), CryptoError> {
    let mut salt = Vec::with_capacity(16 + context_id.len());
    salt.extend_from_slice(b"sage/session/v1");
    salt.extend_from_slice(context_id);

    let prk = hkdf_extract(&salt, shared_secret);

    prk.0
        .expand(b"", &mut buf[..])
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;

    let mut sid = [0u8; SID_LEN];
    prk.0
        .expand(b"sid", &mut sid)
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;

    Ok((SessionKeyMaterial(buf), sid))
}

/// Derive `(session_key_material, sid)`, always allocating a fresh buffer.
/// Prefer `derive_session_material_into` with a `KeyMaterialPool` on any
/// hot path that completes handshakes repeatedly.
pub fn derive_session_material(
    shared_secret: &[u8; 32],
    context_id: &[u8; 16],
) -> Result<(SessionKeyMaterial, [u8; SID_LEN]), CryptoError> {
    derive_session_material_into(shared_secret, context_id, Box::new([0u8; SESSION_KEY_MATERIAL_LEN]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic_given_same_inputs() {
        let ss = [7u8; 32];
        let cid = [9u8; 16];
        let (m1, sid1) = derive_session_material(&ss, &cid).unwrap();
        let (m2, sid2) = derive_session_material(&ss, &cid).unwrap();
        assert_eq!(m1.c2s_enc(), m2.c2s_enc());
        assert_eq!(m1.exporter(), m2.exporter());
        assert_eq!(sid1, sid2);
    }

    #[test]
    fn segments_are_distinct() {
        let ss = [3u8; 32];
        let cid = [1u8; 16];
        let (m, _) = derive_session_material(&ss, &cid).unwrap();
        let segs = [
            m.c2s_enc(),
            m.c2s_sign(),
            m.s2c_enc(),
            m.s2c_sign(),
            m.header_key(),
            m.exporter(),
        ];
        for i in 0..segs.len() {
            for j in (i + 1)..segs.len() {
                assert_ne!(segs[i], segs[j], "segments {i} and {j} collided");
            }
        }
        assert!(!m.is_all_zero());
    }

    #[test]
    fn different_context_id_changes_output() {
        let ss = [3u8; 32];
        let (m1, sid1) = derive_session_material(&ss, &[1u8; 16]).unwrap();
        let (m2, sid2) = derive_session_material(&ss, &[2u8; 16]).unwrap();
        assert_ne!(m1.c2s_enc(), m2.c2s_enc());
        assert_ne!(sid1, sid2);
    }
}
