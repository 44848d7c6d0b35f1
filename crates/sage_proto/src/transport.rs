//! The transport capability the core depends on. How bytes actually move
//! (HTTP, WebSocket, an in-process mock) is someone else's concern; the
//! core only needs `send`/`receive` over the shapes below.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A message handed to the transport for delivery. `id` and `context_id`
/// are both 128-bit values rendered as lowercase hex for wire neutrality.
/// `payload` is already-serialized, possibly AEAD-sealed, bytes — the
/// transport never interprets it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecureMessage {
    pub id: String,
    pub context_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    pub payload: Vec<u8>,
    pub sender_did: String,
    pub signature: Vec<u8>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    pub role: String,
}

/// Whatever the transport hands back after a send. The core treats this as
/// opaque bytes plus metadata and runs it back through the message
/// verification pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportResponse {
    pub payload: Vec<u8>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// Capability set a transport must provide. Implementations may be
/// synchronous wrappers around an async client; the core calls these
/// methods as blocking calls (see the concurrency model).
pub trait Transport: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    fn send(&self, message: &SecureMessage) -> Result<TransportResponse, Self::Error>;
}
