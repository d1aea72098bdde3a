use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A caller-scoped session used to correlate requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    pub caller_id: String,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Result of checking a session token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStatus {
    Valid(Session),
    Expired,
    Absent,
}
