//! sage-core — the handshake engine, secure session subsystem, and
//! in-session message signing layer.
//!
//! # Modules
//! - `config`          — `Config`, the tunable lifetime/timeout/skew knobs
//! - `error`           — the per-layer error taxonomy plus `SageError`
//! - `handshake`       — `HandshakeEngine`, `HandshakeJanitor`: the four-phase state machine
//! - `session`         — `SecureSession`: the symmetric channel a completed handshake produces
//! - `session_manager` — `SessionManager`, `SessionJanitor`: the `kid` → session registry
//! - `message`         — in-session message signing and the verification pipeline
//!
//! This crate is synchronous end to end — no tokio, no futures. A host
//! application schedules calls into it from whatever concurrency model it
//! already runs (a thread pool, an async runtime via `spawn_blocking`,
//! whatever); internal locking uses `parking_lot` so no call here ever
//! awaits.

pub mod config;
pub mod error;
pub mod handshake;
pub mod message;
pub mod session;
pub mod session_manager;

pub use config::Config;
pub use error::{HandshakeError, MessageError, ResourceError, SageError, SessionError};
pub use handshake::{HandshakeEngine, HandshakeJanitor};
pub use session::SecureSession;
pub use session_manager::{SessionJanitor, SessionManager};
