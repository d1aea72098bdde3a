//! Process configuration.
//!
//! Resolved once at startup from environment variables, then passed into
//! components. Nothing reads the environment while handling messages.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use zeroize::Zeroizing;

use crate::crypto::PBKDF2_ITERATIONS;

/// Application-level constants
pub const APP_NAME: &str = "Careline";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

pub const ENV_DATA_DIR: &str = "CARELINE_DATA_DIR";
pub const ENV_PASSPHRASE: &str = "CARELINE_PASSPHRASE";
pub const ENV_KDF_ITERATIONS: &str = "CARELINE_KDF_ITERATIONS";
pub const ENV_SESSION_TTL_SECS: &str = "CARELINE_SESSION_TTL_SECS";
pub const ENV_MAX_PENDING_REMINDERS: &str = "CARELINE_MAX_PENDING_REMINDERS";
pub const ENV_MAX_REMINDER_DELAY_SECS: &str = "CARELINE_MAX_REMINDER_DELAY_SECS";

const DEFAULT_SESSION_TTL_SECS: u64 = 30 * 60;
pub const MAX_SESSION_TTL_SECS: u64 = 30 * 24 * 3600;
const DEFAULT_MAX_PENDING_REMINDERS: usize = 1024;
const DEFAULT_MAX_REMINDER_DELAY_SECS: u64 = 7 * 24 * 3600;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{} must be set to a non-empty passphrase", ENV_PASSPHRASE)]
    MissingPassphrase,

    #[error("Invalid value for {key}: {value:?}")]
    InvalidValue { key: &'static str, value: String },

    #[error("Cannot determine a data directory; set {}", ENV_DATA_DIR)]
    NoDataDir,
}

/// Default tracing filter when `RUST_LOG` is unset.
pub fn default_log_filter() -> &'static str {
    "careline_lib=info,careline=info,warn"
}

/// Get the default data directory: ~/Careline/
pub fn default_data_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(APP_NAME))
}

#[derive(Clone)]
pub struct AppConfig {
    pub data_dir: PathBuf,
    pub passphrase: Zeroizing<String>,
    pub kdf_iterations: u32,
    pub session_ttl: Duration,
    pub max_pending_reminders: usize,
    pub max_reminder_delay: Duration,
}

impl AppConfig {
    /// Defaults for everything except the passphrase.
    pub fn new(data_dir: PathBuf, passphrase: impl Into<String>) -> Self {
        Self {
            data_dir,
            passphrase: Zeroizing::new(passphrase.into()),
            kdf_iterations: PBKDF2_ITERATIONS,
            session_ttl: Duration::from_secs(DEFAULT_SESSION_TTL_SECS),
            max_pending_reminders: DEFAULT_MAX_PENDING_REMINDERS,
            max_reminder_delay: Duration::from_secs(DEFAULT_MAX_REMINDER_DELAY_SECS),
        }
    }

    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from any key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let passphrase = lookup(ENV_PASSPHRASE)
            .filter(|p| !p.is_empty())
            .ok_or(ConfigError::MissingPassphrase)?;

        let data_dir = match lookup(ENV_DATA_DIR).filter(|d| !d.trim().is_empty()) {
            Some(dir) => PathBuf::from(dir),
            None => default_data_dir().ok_or(ConfigError::NoDataDir)?,
        };

        let mut config = Self::new(data_dir, passphrase);

        if let Some(v) = parse::<u32, _>(&lookup, ENV_KDF_ITERATIONS)? {
            if v == 0 {
                return Err(invalid(ENV_KDF_ITERATIONS, "0"));
            }
            config.kdf_iterations = v;
        }
        if let Some(v) = parse::<u64, _>(&lookup, ENV_SESSION_TTL_SECS)? {
            if v > MAX_SESSION_TTL_SECS {
                return Err(invalid(ENV_SESSION_TTL_SECS, &v.to_string()));
            }
            config.session_ttl = Duration::from_secs(v);
        }
        if let Some(v) = parse::<usize, _>(&lookup, ENV_MAX_PENDING_REMINDERS)? {
            if v == 0 {
                return Err(invalid(ENV_MAX_PENDING_REMINDERS, "0"));
            }
            config.max_pending_reminders = v;
        }
        if let Some(v) = parse::<u64, _>(&lookup, ENV_MAX_REMINDER_DELAY_SECS)? {
            config.max_reminder_delay = Duration::from_secs(v);
        }

        Ok(config)
    }

    /// Where encrypted patient containers live.
    pub fn records_dir(&self) -> PathBuf {
        self.data_dir.join("records")
    }

    /// Encrypted message audit log.
    pub fn audit_log_path(&self) -> PathBuf {
        self.data_dir.join("audit").join("messages.log")
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("data_dir", &self.data_dir)
            .field("passphrase", &"<redacted>")
            .field("kdf_iterations", &self.kdf_iterations)
            .field("session_ttl", &self.session_ttl)
            .field("max_pending_reminders", &self.max_pending_reminders)
            .field("max_reminder_delay", &self.max_reminder_delay)
            .finish()
    }
}

fn parse<T, F>(lookup: &F, key: &'static str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| invalid(key, &raw)),
    }
}

fn invalid(key: &'static str, value: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key,
        value: value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn passphrase_is_required() {
        let err = AppConfig::from_lookup(lookup(&[(ENV_DATA_DIR, "/tmp/x")])).unwrap_err();
        assert_eq!(err, ConfigError::MissingPassphrase);

        let err = AppConfig::from_lookup(lookup(&[(ENV_PASSPHRASE, "")])).unwrap_err();
        assert_eq!(err, ConfigError::MissingPassphrase);
    }

    #[test]
    fn defaults_apply() {
        let config = AppConfig::from_lookup(lookup(&[
            (ENV_PASSPHRASE, "pw"),
            (ENV_DATA_DIR, "/tmp/careline"),
        ]))
        .unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/tmp/careline"));
        assert_eq!(config.kdf_iterations, PBKDF2_ITERATIONS);
        assert_eq!(config.session_ttl, Duration::from_secs(1800));
        assert_eq!(config.max_pending_reminders, 1024);
        assert_eq!(config.max_reminder_delay, Duration::from_secs(604_800));
        assert_eq!(config.records_dir(), PathBuf::from("/tmp/careline/records"));
        assert_eq!(
            config.audit_log_path(),
            PathBuf::from("/tmp/careline/audit/messages.log")
        );
    }

    #[test]
    fn overrides_apply() {
        let config = AppConfig::from_lookup(lookup(&[
            (ENV_PASSPHRASE, "pw"),
            (ENV_DATA_DIR, "/tmp/careline"),
            (ENV_KDF_ITERATIONS, "1000"),
            (ENV_SESSION_TTL_SECS, " 60 "),
            (ENV_MAX_PENDING_REMINDERS, "8"),
            (ENV_MAX_REMINDER_DELAY_SECS, "3600"),
        ]))
        .unwrap();
        assert_eq!(config.kdf_iterations, 1000);
        assert_eq!(config.session_ttl, Duration::from_secs(60));
        assert_eq!(config.max_pending_reminders, 8);
        assert_eq!(config.max_reminder_delay, Duration::from_secs(3600));
    }

    #[test]
    fn bad_numbers_are_rejected() {
        let err = AppConfig::from_lookup(lookup(&[
            (ENV_PASSPHRASE, "pw"),
            (ENV_DATA_DIR, "/tmp/careline"),
            (ENV_SESSION_TTL_SECS, "soon"),
        ]))
        .unwrap_err();
        assert_eq!(
            err,
            ConfigError::InvalidValue {
                key: ENV_SESSION_TTL_SECS,
                value: "soon".into()
            }
        );

        let err = AppConfig::from_lookup(lookup(&[
            (ENV_PASSPHRASE, "pw"),
            (ENV_DATA_DIR, "/tmp/careline"),
            (ENV_KDF_ITERATIONS, "0"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key: ENV_KDF_ITERATIONS, .. }));

        let err = AppConfig::from_lookup(lookup(&[
            (ENV_PASSPHRASE, "pw"),
            (ENV_DATA_DIR, "/tmp/careline"),
            (ENV_SESSION_TTL_SECS, "99999999999"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key: ENV_SESSION_TTL_SECS, .. }));
    }

    #[test]
    fn debug_redacts_passphrase() {
        let config = AppConfig::new(PathBuf::from("/tmp"), "very-secret");
        let printed = format!("{config:?}");
        assert!(!printed.contains("very-secret"));
        assert!(printed.contains("<redacted>"));
    }

    #[test]
    fn app_name_is_careline() {
        assert_eq!(APP_NAME, "Careline");
    }
}
