//! sage-crypto — SAGE cryptographic primitives.
//!
//! # Design principles
//! - No custom crypto; all primitives come from audited RustCrypto crates.
//! - Zeroize all secret material on drop.
//! - Public key/signature types are tagged with their scheme; nothing here
//!   lets a KEM key and a signing key be used interchangeably.
//!
//! # Module layout
//! - `signing` — long-term signing keypairs (Ed25519, Secp256k1, optional P-256)
//! - `kem`     — X25519 key agreement (ephemeral and static keypairs)
//! - `kdf`     — HKDF-SHA256 derivations (bootstrap key, session key material)
//! - `aead`    — ChaCha20-Poly1305 / AES-256-GCM seal and open
//! - `hmac`    — HMAC-SHA256 sign/verify
//! - `hash`    — SHA-256 and the RFC 9421 content-digest helper
//! - `error`   — unified error type

pub mod aead;
pub mod error;
pub mod hash;
pub mod hmac;
pub mod kdf;
pub mod kem;
pub mod signing;

pub use error::CryptoError;
