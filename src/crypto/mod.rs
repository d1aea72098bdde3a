pub mod encryption;
pub mod keys;
mod phi_audit;

pub use encryption::*;
pub use keys::*;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("Encryption failed")]
    EncryptionFailed,

    #[error("Decryption failed — wrong key or corrupted data")]
    DecryptionFailed,

    #[error("Malformed ciphertext container ({0} bytes)")]
    MalformedCiphertext(usize),
}
