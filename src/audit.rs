//! Encrypted message audit log.
//!
//! One JSON line per inbound message. The message itself is stored only as
//! an AES-GCM container (base64), encrypted with the record store key.
//! Sessions are recorded by token fingerprint, never by the bearer token.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::AsyncWriteExt;

use crate::crypto::{CryptoError, EncryptedData, StoreKey};
use crate::session::token_fingerprint;

#[derive(Error, Debug)]
pub enum AuditError {
    #[error("Audit crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("Audit I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Audit serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Line format on disk.
#[derive(Debug, Serialize, Deserialize)]
struct AuditLine {
    recorded_at: DateTime<Utc>,
    caller_id: String,
    session_fingerprint: String,
    payload: String,
}

/// A decrypted audit entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditEntry {
    pub recorded_at: DateTime<Utc>,
    pub caller_id: String,
    /// Hex SHA-256 of the session token, see [`token_fingerprint`].
    pub session_fingerprint: String,
    pub message: String,
}

pub struct EncryptedAuditLog {
    path: PathBuf,
    key: Arc<StoreKey>,
    write_lock: tokio::sync::Mutex<()>,
}

impl EncryptedAuditLog {
    pub fn new(path: impl Into<PathBuf>, key: Arc<StoreKey>) -> Self {
        Self {
            path: path.into(),
            key,
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Encrypt and append one message.
    pub async fn record(&self, caller_id: &str, session_token: &str, message: &str) -> Result<(), AuditError> {
        let encrypted = self.key.encrypt_str(message)?;
        let line = AuditLine {
            recorded_at: Utc::now(),
            caller_id: caller_id.to_string(),
            session_fingerprint: token_fingerprint(session_token),
            payload: encrypted.to_base64(),
        };
        let mut bytes = serde_json::to_vec(&line)?;
        bytes.push(b'\n');

        let _guard = self.write_lock.lock().await;
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(&bytes).await?;
        file.flush().await?;
        Ok(())
    }

    /// Read and decrypt the whole log, oldest first.
    pub async fn read_all(&self) -> Result<Vec<AuditEntry>, AuditError> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut entries = Vec::new();
        for line in content.lines().filter(|l| !l.trim().is_empty()) {
            let parsed: AuditLine = serde_json::from_str(line)?;
            let encrypted = EncryptedData::from_base64(&parsed.payload)?;
            entries.push(AuditEntry {
                recorded_at: parsed.recorded_at,
                caller_id: parsed.caller_id,
                session_fingerprint: parsed.session_fingerprint,
                message: self.key.decrypt_str(&encrypted)?,
            });
        }
        Ok(entries)
    }
}
