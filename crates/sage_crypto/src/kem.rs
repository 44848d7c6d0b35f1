//! X25519 key-encapsulation primitives.
//!
//! Two key shapes are exposed: `EphemeralKeypair` (single-use, consumed by
//! `diffie_hellman`, used for handshake ephemerals and for bootstrap
//! encryption) and `StaticKemKeypair` (long-term, reusable, used for an
//! agent's published KEM key). Both produce the same `KemPublicKey` type on
//! the wire so a resolver never has to know which flavor minted a key.

use rand_core::OsRng;
use serde::{Deserialize, Serialize};
use x25519_dalek::{EphemeralSecret, PublicKey, StaticSecret};
use zeroize::ZeroizeOnDrop;

use crate::error::CryptoError;

/// Raw 32-byte X25519 public key, exported either raw or as a JWK
/// (`kty=OKP`, `crv=X25519`) for interop with non-Rust peers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KemPublicKey(#[serde(with = "hex_bytes")] pub [u8; 32]);

impl KemPublicKey {
    pub fn from_raw(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
        let arr: [u8; 32] = bytes.try_into().map_err(|_| CryptoError::InvalidKeySize {
            expected: 32,
            actual: bytes.len(),
        })?;
        Ok(Self(arr))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_jwk(&self) -> Jwk {
        Jwk {
            kty: "OKP".to_string(),
            crv: "X25519".to_string(),
            x: base64::Engine::encode(&base64::engine::general_purpose::URL_SAFE_NO_PAD, self.0),
        }
    }

    pub fn from_jwk(jwk: &Jwk) -> Result<Self, CryptoError> {
        if jwk.kty != "OKP" || jwk.crv != "X25519" {
            return Err(CryptoError::InvalidKey(format!(
                "expected OKP/X25519 JWK, got kty={} crv={}",
                jwk.kty, jwk.crv
            )));
        }
        let bytes = base64::Engine::decode(&base64::engine::general_purpose::URL_SAFE_NO_PAD, &jwk.x)?;
        Self::from_slice(&bytes)
    }

    /// True if the point is the all-zero Curve25519 element — the one value
    /// whose scalar multiplication always yields an all-zero shared secret
    /// (the classic X25519 small-subgroup degenerate case).
    pub fn is_all_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }
}

/// Minimal interoperable JWK for an OKP/X25519 public key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Jwk {
    pub kty: String,
    pub crv: String,
    pub x: String,
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8; 32], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<[u8; 32], D::Error> {
        let s = String::deserialize(d)?;
        let v = hex::decode(&s).map_err(serde::de::Error::custom)?;
        v.try_into().map_err(|_| serde::de::Error::custom("expected 32-byte hex string"))
    }
}

/// 32-byte shared secret output of an X25519 DH. Zeroized on drop; callers
/// must feed it into a KDF and drop it rather than holding it past that.
#[derive(ZeroizeOnDrop)]
pub struct SharedSecret(pub [u8; 32]);

impl SharedSecret {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

/// A single-use X25519 keypair. `diffie_hellman` consumes `self` so the
/// private scalar cannot be reused for a second agreement — matching the
/// "destroyed immediately after shared-secret derivation" lifecycle in the
/// specification.
#[derive(ZeroizeOnDrop)]
pub struct EphemeralKeypair {
    #[zeroize(skip)]
    public: KemPublicKey,
    secret: Option<EphemeralSecret>,
}

impl EphemeralKeypair {
    pub fn generate() -> Self {
        let secret = EphemeralSecret::random_from_rng(OsRng);
        let public = KemPublicKey(*PublicKey::from(&secret).as_bytes());
        Self { public, secret: Some(secret) }
    }

    pub fn public(&self) -> KemPublicKey {
        self.public
    }

    /// Perform X25519 with `peer`, consuming this keypair's private scalar.
    /// Rejects the all-zero result (small-subgroup attack / malformed peer
    /// key) with `BadPublicPoint`.
    pub fn diffie_hellman(mut self, peer: &KemPublicKey) -> Result<SharedSecret, CryptoError> {
        let peer_public = PublicKey::from(peer.0);
        let shared = self.secret.take().expect("secret consumed exactly once").diffie_hellman(&peer_public);
        if !shared.was_contributory() {
            return Err(CryptoError::BadPublicPoint);
        }
        Ok(SharedSecret(*shared.as_bytes()))
    }
}

/// A long-term, reusable X25519 keypair — an agent's published KEM key.
#[derive(ZeroizeOnDrop)]
pub struct StaticKemKeypair {
    #[zeroize(skip)]
    public: KemPublicKey,
    secret: StaticSecret,
}

impl StaticKemKeypair {
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = KemPublicKey(*PublicKey::from(&secret).as_bytes());
        Self { public, secret }
    }

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        let secret = StaticSecret::from(bytes);
        let public = KemPublicKey(*PublicKey::from(&secret).as_bytes());
        Self { public, secret }
    }

    pub fn public(&self) -> KemPublicKey {
        self.public
    }

    /// Perform X25519 without consuming `self` — a static key may be used
    /// for many bootstrap-encryption exchanges over its lifetime.
    pub fn diffie_hellman(&self, peer: &KemPublicKey) -> Result<SharedSecret, CryptoError> {
        let peer_public = PublicKey::from(peer.0);
        let shared = self.secret.diffie_hellman(&peer_public);
        if !shared.was_contributory() {
            return Err(CryptoError::BadPublicPoint);
        }
        Ok(SharedSecret(*shared.as_bytes()))
    }
}

/// Convenience pair used by call sites that want `(sk, pk)` tuples rather
/// than a keypair object (mirrors `generate_signing_keypair`'s shape).
pub fn generate_ephemeral_x25519() -> (EphemeralKeypair, KemPublicKey) {
    let kp = EphemeralKeypair::generate();
    let pub_key = kp.public();
    (kp, pub_key)
}

/// `x25519(sk, pk) -> shared secret`, consuming an ephemeral secret.
pub fn x25519(sk: EphemeralKeypair, pk: &KemPublicKey) -> Result<SharedSecret, CryptoError> {
    sk.diffie_hellman(pk)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dh_agreement_matches() {
        let a = EphemeralKeypair::generate();
        let b = EphemeralKeypair::generate();
        let a_pub = a.public();
        let b_pub = b.public();
        let ss_a = a.diffie_hellman(&b_pub).unwrap();
        let ss_b = b.diffie_hellman(&a_pub).unwrap();
        assert_eq!(ss_a.as_bytes(), ss_b.as_bytes());
    }

    #[test]
    fn all_zero_public_key_rejected() {
        let a = EphemeralKeypair::generate();
        let zero = KemPublicKey::from_raw([0u8; 32]);
        assert!(matches!(a.diffie_hellman(&zero), Err(CryptoError::BadPublicPoint)));
    }

    #[test]
    fn jwk_roundtrip() {
        let kp = EphemeralKeypair::generate();
        let pub_key = kp.public();
        let jwk = pub_key.to_jwk();
        assert_eq!(jwk.kty, "OKP");
        assert_eq!(jwk.crv, "X25519");
        let back = KemPublicKey::from_jwk(&jwk).unwrap();
        assert_eq!(back, pub_key);
    }
}
