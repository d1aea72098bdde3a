//! Caller sessions.
//!
//! The pipeline only needs two things from a session provider: tell it
//! whether a token is still good, and mint a fresh one. `InMemorySessions`
//! is the default provider.
//!
//! Key properties:
//! - Tokens are random URL-safe base64 strings (32 bytes of entropy)
//! - Only the SHA-256 of a token is kept as the map key
//! - Expired sessions are evicted on lookup, and swept every
//!   `PURGE_EVERY_MINTS` mints so tokenless traffic cannot grow the table

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use chrono::{Duration, Utc};

use crate::models::{Session, SessionStatus};

/// Session validity check and minting, supplied by the caller's environment.
pub trait SessionProvider: Send + Sync {
    /// Check a token. `None` is always `Absent`.
    fn validate(&self, token: Option<&str>) -> SessionStatus;

    /// Start a new session for a caller.
    fn mint(&self, caller_id: &str) -> Session;
}

/// Generate a random session token (URL-safe base64, 32 bytes of entropy).
pub fn generate_token() -> String {
    use base64::Engine;
    let bytes: [u8; 32] = rand::random();
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

pub fn hash_token(token: &str) -> [u8; 32] {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hasher.finalize().into()
}

/// Hex SHA-256 of a token. Safe to persist: it identifies a session
/// without being able to resume it.
pub fn token_fingerprint(token: &str) -> String {
    hash_token(token).iter().map(|b| format!("{b:02x}")).collect()
}

/// Mints between full sweeps of expired sessions.
pub const PURGE_EVERY_MINTS: u64 = 256;

/// In-memory session table with a fixed time-to-live.
pub struct InMemorySessions {
    sessions: RwLock<HashMap<[u8; 32], Session>>,
    ttl: Duration,
    minted: AtomicU64,
}

impl InMemorySessions {
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            ttl,
            minted: AtomicU64::new(0),
        }
    }

    /// Drop every expired session. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Utc::now();
        match self.sessions.write() {
            Ok(mut sessions) => {
                let before = sessions.len();
                sessions.retain(|_, s| !s.is_expired_at(now));
                before - sessions.len()
            }
            Err(_) => 0,
        }
    }

    /// Number of sessions held, expired or not.
    pub fn len(&self) -> usize {
        self.sessions.read().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SessionProvider for InMemorySessions {
    fn validate(&self, token: Option<&str>) -> SessionStatus {
        let Some(token) = token.filter(|t| !t.is_empty()) else {
            return SessionStatus::Absent;
        };
        let key = hash_token(token);

        let found = match self.sessions.read() {
            Ok(sessions) => sessions.get(&key).cloned(),
            Err(_) => return SessionStatus::Absent,
        };

        match found {
            None => SessionStatus::Absent,
            Some(session) if session.is_expired_at(Utc::now()) => {
                if let Ok(mut sessions) = self.sessions.write() {
                    sessions.remove(&key);
                }
                SessionStatus::Expired
            }
            Some(session) => SessionStatus::Valid(session),
        }
    }

    fn mint(&self, caller_id: &str) -> Session {
        let token = generate_token();
        let session = Session {
            session_id: token.clone(),
            caller_id: caller_id.to_string(),
            expires_at: Utc::now() + self.ttl,
        };
        if let Ok(mut sessions) = self.sessions.write() {
            sessions.insert(hash_token(&token), session.clone());
        }
        if (self.minted.fetch_add(1, Ordering::Relaxed) + 1) % PURGE_EVERY_MINTS == 0 {
            let purged = self.purge_expired();
            tracing::debug!(purged, "Expired sessions swept");
        }
        tracing::debug!("Session minted");
        session
    }
}
