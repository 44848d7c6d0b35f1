//! sage-proto — wire-shaped protocol types and the interfaces the core
//! consumes (identity resolution, transport), plus RFC 9421–style message
//! canonicalization.
//!
//! This crate holds no mutable state and does no I/O. It depends on
//! `sage-crypto` for key and signature types but knows nothing about
//! handshake state machines or session lifecycles — that lives in
//! `sage-core`.
//!
//! # Modules
//! - `identity`   — `AgentIdentity`, `IdentityResolver`
//! - `transport`  — `Transport`, `SecureMessage`, `TransportResponse`
//! - `handshake`  — the four phases' wire payloads
//! - `canonical`  — component lists, signature params, canonical base construction
//! - `message`    — `SignedMessage`, the wire shape carrying a canonicalized signature
//! - `error`      — resolver and canonicalization error types

pub mod canonical;
pub mod error;
pub mod handshake;
pub mod identity;
pub mod message;
pub mod transport;

pub use error::{CanonicalizeError, ResolverError};
pub use identity::{AgentIdentity, IdentityResolver};
pub use message::SignedMessage;
pub use transport::{SecureMessage, Transport, TransportResponse};
