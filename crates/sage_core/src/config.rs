//! Plain configuration data. This is not a file loader — a host
//! application parses whatever format it likes (TOML, env, flags) and
//! builds a `Config` value; the core only consumes the struct.

use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    pub handshake_ttl: Duration,
    pub session_max_age: Duration,
    pub session_idle_timeout: Duration,
    pub session_max_messages: u64,
    pub message_max_clock_skew: Duration,
    pub message_nonce_cache_ttl: Duration,
    pub janitor_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        let session_idle_timeout = Duration::from_secs(10 * 60);
        Self {
            handshake_ttl: Duration::from_secs(30),
            session_max_age: Duration::from_secs(60 * 60),
            session_idle_timeout,
            session_max_messages: 1_000_000,
            message_max_clock_skew: Duration::from_secs(5 * 60),
            message_nonce_cache_ttl: session_idle_timeout,
            janitor_interval: Duration::from_secs(30),
        }
    }
}

impl Config {
    pub fn with_handshake_ttl(mut self, ttl: Duration) -> Self {
        self.handshake_ttl = ttl;
        self
    }

    pub fn with_session_max_age(mut self, max_age: Duration) -> Self {
        self.session_max_age = max_age;
        self
    }

    pub fn with_session_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.session_idle_timeout = idle_timeout;
        self
    }

    pub fn with_session_max_messages(mut self, max_messages: u64) -> Self {
        self.session_max_messages = max_messages;
        self
    }

    pub fn with_message_max_clock_skew(mut self, skew: Duration) -> Self {
        self.message_max_clock_skew = skew;
        self
    }

    pub fn with_message_nonce_cache_ttl(mut self, ttl: Duration) -> Self {
        self.message_nonce_cache_ttl = ttl;
        self
    }

    pub fn with_janitor_interval(mut self, interval: Duration) -> Self {
        self.janitor_interval = interval;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_specification() {
        let cfg = Config::default();
        assert_eq!(cfg.handshake_ttl, Duration::from_secs(30));
        assert_eq!(cfg.session_max_age, Duration::from_secs(3600));
        assert_eq!(cfg.session_idle_timeout, Duration::from_secs(600));
        assert_eq!(cfg.session_max_messages, 1_000_000);
        assert_eq!(cfg.message_max_clock_skew, Duration::from_secs(300));
        assert_eq!(cfg.message_nonce_cache_ttl, cfg.session_idle_timeout);
        assert_eq!(cfg.janitor_interval, Duration::from_secs(30));
    }

    #[test]
    fn builder_overrides() {
        let cfg = Config::default().with_handshake_ttl(Duration::from_secs(5)).with_session_max_messages(10);
        assert_eq!(cfg.handshake_ttl, Duration::from_secs(5));
        assert_eq!(cfg.session_max_messages, 10);
    }
}
