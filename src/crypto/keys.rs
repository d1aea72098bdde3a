use pbkdf2::pbkdf2_hmac;
use sha2::Sha256;
use zeroize::Zeroize;

use super::encryption::EncryptedData;
use super::CryptoError;

pub const PBKDF2_ITERATIONS: u32 = 600_000;
pub const KEY_LENGTH: usize = 32; // AES-256
pub const SALT_LENGTH: usize = 32;

/// Application-wide salt. Every store shares it, so the same passphrase
/// always opens the same data directory.
pub const STORE_SALT: &[u8; SALT_LENGTH] = b"careline/record-store/salt/v1...";

/// Record store encryption key, zeroed on drop.
///
/// Derived once per store lifetime and shared by reference afterwards.
#[derive(Zeroize)]
#[zeroize(drop)]
pub struct StoreKey {
    key_bytes: [u8; KEY_LENGTH],
}

impl StoreKey {
    /// Derive from a passphrase with PBKDF2-SHA256 and the application salt.
    pub fn derive(passphrase: &str) -> Self {
        Self::derive_with_iterations(passphrase, PBKDF2_ITERATIONS)
    }

    /// Same as [`StoreKey::derive`] with an explicit round count.
    pub fn derive_with_iterations(passphrase: &str, iterations: u32) -> Self {
        let mut key_bytes = [0u8; KEY_LENGTH];
        pbkdf2_hmac::<Sha256>(
            passphrase.as_bytes(),
            STORE_SALT,
            iterations.max(1),
            &mut key_bytes,
        );
        Self { key_bytes }
    }

    /// Encrypt data using AES-256-GCM
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<EncryptedData, CryptoError> {
        EncryptedData::encrypt(&self.key_bytes, plaintext)
    }

    /// Decrypt data using AES-256-GCM
    pub fn decrypt(&self, encrypted: &EncryptedData) -> Result<Vec<u8>, CryptoError> {
        encrypted.decrypt(&self.key_bytes)
    }

    /// Encrypt a UTF-8 string.
    pub fn encrypt_str(&self, plaintext: &str) -> Result<EncryptedData, CryptoError> {
        self.encrypt(plaintext.as_bytes())
    }

    /// Decrypt into a UTF-8 string. Non-UTF-8 plaintext counts as corruption.
    pub fn decrypt_str(&self, encrypted: &EncryptedData) -> Result<String, CryptoError> {
        let bytes = self.decrypt(encrypted)?;
        String::from_utf8(bytes).map_err(|_| CryptoError::DecryptionFailed)
    }
}

impl std::fmt::Debug for StoreKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("StoreKey(..)")
    }
}
