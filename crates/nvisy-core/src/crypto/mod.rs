//! Credential encryption for stored provider API keys.
//!
//! Stored API keys are opaque ciphertext to the embedding crates; they only
//! depend on the [`KeyCipher`] capability. [`XChaCha20Cipher`] is the default
//! implementation, using XChaCha20-Poly1305 AEAD.
//!
//! # Example
//!
//! ```rust
//! use nvisy_core::crypto::{EncryptionKey, KeyCipher, XChaCha20Cipher};
//!
//! let cipher = XChaCha20Cipher::new(EncryptionKey::generate());
//! let ciphertext = cipher.encrypt(b"sk-live-123").unwrap();
//! assert_eq!(cipher.decrypt(&ciphertext).unwrap(), b"sk-live-123");
//! ```

mod cipher;
mod error;
mod key;

pub use cipher::{MIN_CIPHERTEXT_SIZE, NONCE_SIZE, TAG_SIZE, XChaCha20Cipher};
pub use error::{CryptoError, CryptoResult};
pub use key::EncryptionKey;

/// Black-box encrypt/decrypt capability for stored credentials.
pub trait KeyCipher: Send + Sync {
    /// Encrypts a plaintext credential.
    fn encrypt(&self, plaintext: &[u8]) -> CryptoResult<Vec<u8>>;

    /// Decrypts a ciphertext produced by [`KeyCipher::encrypt`].
    fn decrypt(&self, ciphertext: &[u8]) -> CryptoResult<Vec<u8>>;

    /// Decrypts a ciphertext into a UTF-8 string.
    fn decrypt_string(&self, ciphertext: &[u8]) -> CryptoResult<String> {
        let plaintext = self.decrypt(ciphertext)?;
        String::from_utf8(plaintext).map_err(|_| CryptoError::InvalidUtf8)
    }
}
