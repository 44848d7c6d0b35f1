//! `kid` → `SecureSession` map plus the background eviction janitor.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use sage_crypto::kdf::KeyMaterialPool;
use tracing::{debug, info};

use crate::session::SecureSession;

#[derive(Default)]
pub struct SessionManager {
    sessions: RwLock<HashMap<String, Arc<SecureSession>>>,
    key_material_pool: KeyMaterialPool,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, session: Arc<SecureSession>) {
        self.sessions.write().insert(session.kid.clone(), session);
    }

    pub fn get(&self, kid: &str) -> Option<Arc<SecureSession>> {
        self.sessions.read().get(kid).cloned()
    }

    /// Pull a 192-byte key buffer off the freelist, allocating one only if
    /// it's empty. Used by the handshake layer when deriving session key
    /// material for a newly completed handshake.
    pub fn acquire_key_buffer(&self) -> Box<[u8; sage_crypto::kdf::SESSION_KEY_MATERIAL_LEN]> {
        self.key_material_pool.acquire()
    }

    pub fn remove(&self, kid: &str) -> Option<Arc<SecureSession>> {
        let removed = self.sessions.write().remove(kid);
        if let Some(session) = &removed {
            if let Some(buf) = session.close_and_reclaim() {
                self.key_material_pool.release(buf);
            }
            debug!(target: "sage::session", kid = %kid, "session removed");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Close and remove every session whose `is_expired` check passes.
    /// Returns the number evicted.
    pub fn evict_expired(&self, now: Instant) -> usize {
        let expired_kids: Vec<String> = {
            let sessions = self.sessions.read();
            sessions
                .iter()
                .filter(|(_, s)| s.is_expired(now))
                .map(|(kid, _)| kid.clone())
                .collect()
        };
        for kid in &expired_kids {
            self.remove(kid);
        }
        if !expired_kids.is_empty() {
            info!(target: "sage::session", count = expired_kids.len(), "evicted expired sessions");
        }
        expired_kids.len()
    }
}

/// A background thread that periodically calls `evict_expired`. Stopped by
/// dropping or by flipping the shared stop flag and joining.
pub struct SessionJanitor {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl SessionJanitor {
    pub fn spawn(manager: Arc<SessionManager>, interval: Duration) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_clone = stop.clone();
        let handle = std::thread::spawn(move || {
            while !stop_clone.load(Ordering::Relaxed) {
                std::thread::sleep(interval);
                if stop_clone.load(Ordering::Relaxed) {
                    break;
                }
                manager.evict_expired(Instant::now());
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

impl Drop for SessionJanitor {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionLimits;
    use sage_crypto::kdf::derive_session_material;
    use sage_proto::handshake::HandshakeRole;

    fn session(kid: &str, idle_timeout: Duration) -> Arc<SecureSession> {
        let (km, sid) = derive_session_material(&[7u8; 32], &[8u8; 16]).unwrap();
        Arc::new(SecureSession::new(
            sid,
            kid.to_string(),
            HandshakeRole::Initiator,
            km,
            SessionLimits {
                max_age: Duration::from_secs(3600),
                idle_timeout,
                max_messages: 1_000_000,
            },
            Duration::from_secs(600),
        ))
    }

    #[test]
    fn insert_get_remove() {
        let manager = SessionManager::new();
        manager.insert(session("k-1", Duration::from_secs(600)));
        assert!(manager.get("k-1").is_some());
        manager.remove("k-1");
        assert!(manager.get("k-1").is_none());
    }

    #[test]
    fn evict_expired_removes_idle_sessions() {
        let manager = SessionManager::new();
        manager.insert(session("k-1", Duration::from_millis(10)));
        std::thread::sleep(Duration::from_millis(50));
        let evicted = manager.evict_expired(Instant::now());
        assert_eq!(evicted, 1);
        assert!(manager.get("k-1").is_none());
    }
}
