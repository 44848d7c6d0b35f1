//! Long-term signing keys.
//!
//! Three schemes are supported: Ed25519 (required — the default for new
//! DIDs), Secp256k1 (required — chains that anchor DIDs on secp256k1
//! ledgers), and P-256 (optional, behind the `p256` feature). A
//! `SigningPublicKey`/signature is always tagged with the scheme it was
//! produced under so `verify` dispatches to the matching algorithm instead
//! of guessing from key length.
//!
//! This module never touches X25519. Converting a signing key into a DH
//! key is not an operation this crate exposes — see `kem` for the
//! independent KEM keypair type.

use ed25519_dalek::{Signer, SigningKey, Verifier, VerifyingKey};
use k256::ecdsa::{
    Signature as K256Signature, SigningKey as K256SigningKey, VerifyingKey as K256VerifyingKey,
};
use rand_core::OsRng;
use serde::{Deserialize, Serialize};
use zeroize::ZeroizeOnDrop;

use crate::error::CryptoError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SigningScheme {
    Ed25519,
    Secp256k1,
    #[cfg(feature = "p256")]
    P256,
}

/// A scheme-tagged public key. Distinct from any KEM key type: signing and
/// KEM roles may never be interchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SigningPublicKey {
    pub scheme: SigningScheme,
    pub bytes: Vec<u8>,
}

impl SigningPublicKey {
    pub fn new(scheme: SigningScheme, bytes: Vec<u8>) -> Self {
        Self { scheme, bytes }
    }
}

/// A scheme-tagged signature, carried alongside the public key's scheme so
/// `verify` never has to infer the algorithm.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    pub scheme: SigningScheme,
    pub bytes: Vec<u8>,
}

/// Long-term signing secret key. Zeroized on drop.
#[derive(ZeroizeOnDrop)]
pub struct SigningSecretKey {
    #[zeroize(skip)]
    scheme: SigningScheme,
    secret_bytes: Vec<u8>,
}

pub fn generate_signing_keypair(
    scheme: SigningScheme,
) -> Result<(SigningSecretKey, SigningPublicKey), CryptoError> {
    match scheme {
        SigningScheme::Ed25519 => {
            let sk = SigningKey::generate(&mut OsRng);
            let pk_bytes = sk.verifying_key().to_bytes().to_vec();
            Ok((
                SigningSecretKey {
                    scheme,
                    secret_bytes: sk.to_bytes().to_vec(),
                },
                SigningPublicKey::new(scheme, pk_bytes),
            ))
        }
        SigningScheme::Secp256k1 => {
            let sk = K256SigningKey::random(&mut OsRng);
            let pk_bytes = sk.verifying_key().to_sec1_bytes().to_vec();
            Ok((
                SigningSecretKey {
                    scheme,
                    secret_bytes: sk.to_bytes().to_vec(),
                },
                SigningPublicKey::new(scheme, pk_bytes),
            ))
        }
        #[cfg(feature = "p256")]
        SigningScheme::P256 => {
            let sk = p256::ecdsa::SigningKey::random(&mut OsRng);
            let pk_bytes = sk.verifying_key().to_sec1_bytes().to_vec();
            Ok((
                SigningSecretKey {
                    scheme,
                    secret_bytes: sk.to_bytes().to_vec(),
                },
                SigningPublicKey::new(scheme, pk_bytes),
            ))
        }
    }
}

impl SigningSecretKey {
    pub fn scheme(&self) -> SigningScheme {
        self.scheme
    }

    /// Reconstruct from raw secret bytes (e.g. loaded from secure storage).
    pub fn from_bytes(scheme: SigningScheme, bytes: &[u8]) -> Result<Self, CryptoError> {
        // Validate eagerly so a malformed key fails at load time, not at
        // first use.
        match scheme {
            SigningScheme::Ed25519 => {
                let arr: [u8; 32] = bytes.try_into().map_err(|_| CryptoError::InvalidKeySize {
                    expected: 32,
                    actual: bytes.len(),
                })?;
                let _ = SigningKey::from_bytes(&arr);
            }
            SigningScheme::Secp256k1 => {
                K256SigningKey::from_slice(bytes)
                    .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
            }
            #[cfg(feature = "p256")]
            SigningScheme::P256 => {
                p256::ecdsa::SigningKey::from_slice(bytes)
                    .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
            }
        }
        Ok(Self {
            scheme,
            secret_bytes: bytes.to_vec(),
        })
    }

    pub fn public_key(&self) -> SigningPublicKey {
        match self.scheme {
            SigningScheme::Ed25519 => {
                let arr: [u8; 32] = self.secret_bytes.clone().try_into().expect("validated at construction");
                let sk = SigningKey::from_bytes(&arr);
                SigningPublicKey::new(self.scheme, sk.verifying_key().to_bytes().to_vec())
            }
            SigningScheme::Secp256k1 => {
                let sk = K256SigningKey::from_slice(&self.secret_bytes).expect("validated at construction");
                SigningPublicKey::new(self.scheme, sk.verifying_key().to_sec1_bytes().to_vec())
            }
            #[cfg(feature = "p256")]
            SigningScheme::P256 => {
                let sk = p256::ecdsa::SigningKey::from_slice(&self.secret_bytes).expect("validated at construction");
                SigningPublicKey::new(self.scheme, sk.verifying_key().to_sec1_bytes().to_vec())
            }
        }
    }

    pub fn sign(&self, message: &[u8]) -> Signature {
        let bytes = match self.scheme {
            SigningScheme::Ed25519 => {
                let arr: [u8; 32] = self.secret_bytes.clone().try_into().expect("validated at construction");
                SigningKey::from_bytes(&arr).sign(message).to_bytes().to_vec()
            }
            SigningScheme::Secp256k1 => {
                let sk = K256SigningKey::from_slice(&self.secret_bytes).expect("validated at construction");
                let sig: K256Signature = sk.sign(message);
                sig.to_bytes().to_vec()
            }
            #[cfg(feature = "p256")]
            SigningScheme::P256 => {
                let sk = p256::ecdsa::SigningKey::from_slice(&self.secret_bytes).expect("validated at construction");
                let sig: p256::ecdsa::Signature = sk.sign(message);
                sig.to_bytes().to_vec()
            }
        };
        Signature {
            scheme: self.scheme,
            bytes,
        }
    }
}

/// Verify `sig` over `message` under `public_key`. The scheme carried on
/// `sig` and `public_key` MUST agree; a mismatch is rejected before any
/// cryptographic work is attempted.
pub fn verify(
    public_key: &SigningPublicKey,
    message: &[u8],
    sig: &Signature,
) -> Result<(), CryptoError> {
    if public_key.scheme != sig.scheme {
        return Err(CryptoError::UnsupportedScheme(format!(
            "public key scheme {:?} does not match signature scheme {:?}",
            public_key.scheme, sig.scheme
        )));
    }
    match public_key.scheme {
        SigningScheme::Ed25519 => {
            let arr: [u8; 32] = public_key
                .bytes
                .as_slice()
                .try_into()
                .map_err(|_| CryptoError::InvalidKeySize {
                    expected: 32,
                    actual: public_key.bytes.len(),
                })?;
            let vk = VerifyingKey::from_bytes(&arr).map_err(|_| CryptoError::InvalidKey("bad ed25519 point".into()))?;
            let sig_arr: [u8; 64] = sig
                .bytes
                .as_slice()
                .try_into()
                .map_err(|_| CryptoError::InvalidKeySize {
                    expected: 64,
                    actual: sig.bytes.len(),
                })?;
            let s = ed25519_dalek::Signature::from_bytes(&sig_arr);
            vk.verify(message, &s).map_err(|_| CryptoError::InvalidSignature)
        }
        SigningScheme::Secp256k1 => {
            let vk = K256VerifyingKey::from_sec1_bytes(&public_key.bytes)
                .map_err(|_| CryptoError::InvalidKey("bad secp256k1 point".into()))?;
            let s = K256Signature::from_slice(&sig.bytes).map_err(|_| CryptoError::InvalidSignature)?;
            vk.verify(message, &s).map_err(|_| CryptoError::InvalidSignature)
        }
        #[cfg(feature = "p256")]
        SigningScheme::P256 => {
            let vk = p256::ecdsa::VerifyingKey::from_sec1_bytes(&public_key.bytes)
                .map_err(|_| CryptoError::InvalidKey("bad p256 point".into()))?;
            let s = p256::ecdsa::Signature::from_slice(&sig.bytes).map_err(|_| CryptoError::InvalidSignature)?;
            vk.verify(message, &s).map_err(|_| CryptoError::InvalidSignature)
        }
    }
}
