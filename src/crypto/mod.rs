// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Encryption at rest.
//!
//! AES-256-GCM with a key derived from the session secret via
//! PBKDF2-HMAC-SHA256. The key lives only in memory, wrapped in
//! [`Zeroizing`] so it is scrubbed on [`AtRestCipher::clear`] and on drop.
//!
//! Token format: `base64(nonce[12] || ciphertext || tag[16])`.
//!
//! Two API tiers:
//! - **Strict** ([`AtRestCipher::encrypt`], [`AtRestCipher::decrypt`]) fail
//!   closed with a [`CryptoError`].
//! - **Best effort** ([`AtRestCipher::encrypt_if_ready`],
//!   [`AtRestCipher::decrypt_if_needed`]) pass values through when there is
//!   no key or the value is not a token we can open. Values coming out of the
//!   best-effort path are untrusted.

mod store;

pub use store::EncryptedStore;

use std::num::NonZeroU32;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use parking_lot::RwLock;
use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM, NONCE_LEN};
use ring::pbkdf2;
use ring::rand::{SecureRandom, SystemRandom};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info};
use zeroize::Zeroizing;

/// 256-bit key (32 bytes)
pub const KEY_SIZE: usize = 32;
/// GCM authentication tag
pub const TAG_SIZE: usize = 16;
/// Floor applied to configured PBKDF2 iteration counts
pub const MIN_KDF_ITERATIONS: u32 = 100_000;
/// Application salt used when the config does not override it
pub const DEFAULT_KDF_SALT: &str = "ward-sync/at-rest/v1";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("Encryption key not initialized")]
    NotInitialized,

    #[error("Value is not a ciphertext token")]
    NotCiphertext,

    #[error("Decryption failed - data may be corrupted, tampered or sealed under another key")]
    Authentication,

    #[error("Encryption failed")]
    EncryptionFailed,

    #[error("Key derivation failed: {0}")]
    KeyDerivation(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Derive a 256-bit key from `secret`.
///
/// `iterations` is raised to [`MIN_KDF_ITERATIONS`] if lower.
pub fn derive_key(secret: &[u8], salt: &[u8], iterations: u32) -> Zeroizing<[u8; KEY_SIZE]> {
    let rounds = NonZeroU32::new(iterations.max(MIN_KDF_ITERATIONS)).unwrap_or(NonZeroU32::MIN);
    let mut key = Zeroizing::new([0u8; KEY_SIZE]);
    pbkdf2::derive(pbkdf2::PBKDF2_HMAC_SHA256, rounds, salt, secret, &mut key[..]);
    key
}

/// `true` if `value` decodes to something long enough to be one of our tokens.
#[must_use]
pub fn looks_like_ciphertext(value: &str) -> bool {
    match STANDARD.decode(value) {
        Ok(bytes) => bytes.len() >= NONCE_LEN + TAG_SIZE,
        Err(_) => false,
    }
}

/// Process-lifetime symmetric key holder with authenticated encryption.
pub struct AtRestCipher {
    key: RwLock<Option<Zeroizing<[u8; KEY_SIZE]>>>,
    salt: Vec<u8>,
    iterations: u32,
    rng: SystemRandom,
}

impl AtRestCipher {
    pub fn new(salt: impl Into<Vec<u8>>, iterations: u32) -> Self {
        Self {
            key: RwLock::new(None),
            salt: salt.into(),
            iterations: iterations.max(MIN_KDF_ITERATIONS),
            rng: SystemRandom::new(),
        }
    }

    /// Derive and install the key from a session secret.
    ///
    /// PBKDF2 runs on the blocking pool. Calling this again replaces the key;
    /// values sealed under the previous key stop decrypting.
    #[tracing::instrument(skip_all)]
    pub async fn init(&self, secret: &str) -> Result<(), CryptoError> {
        let secret = Zeroizing::new(secret.as_bytes().to_vec());
        let salt = self.salt.clone();
        let iterations = self.iterations;

        let key = tokio::task::spawn_blocking(move || derive_key(&secret, &salt, iterations))
            .await
            .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;

        self.init_with_key(key);
        info!(iterations, "At-rest encryption key initialized");
        Ok(())
    }

    /// Install an already-derived key.
    pub fn init_with_key(&self, key: Zeroizing<[u8; KEY_SIZE]>) {
        *self.key.write() = Some(key);
    }

    /// Drop the key (logout). The old key bytes are zeroized.
    pub fn clear(&self) {
        if self.key.write().take().is_some() {
            info!("At-rest encryption key cleared");
        }
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.key.read().is_some()
    }

    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    fn sealing_key(key: &[u8; KEY_SIZE]) -> Result<LessSafeKey, CryptoError> {
        UnboundKey::new(&AES_256_GCM, key)
            .map(LessSafeKey::new)
            .map_err(|_| CryptoError::EncryptionFailed)
    }

    /// Serialize and seal `value` under a fresh random nonce.
    pub fn encrypt<T: Serialize + ?Sized>(&self, value: &T) -> Result<String, CryptoError> {
        let guard = self.key.read();
        let key = guard.as_ref().ok_or(CryptoError::NotInitialized)?;
        let sealing = Self::sealing_key(key)?;

        let plaintext = Zeroizing::new(
            serde_json::to_vec(value).map_err(|e| CryptoError::Serialization(e.to_string()))?,
        );

        let mut nonce_bytes = [0u8; NONCE_LEN];
        self.rng
            .fill(&mut nonce_bytes)
            .map_err(|_| CryptoError::EncryptionFailed)?;

        let mut in_out = plaintext.to_vec();
        sealing
            .seal_in_place_append_tag(
                Nonce::assume_unique_for_key(nonce_bytes),
                Aad::empty(),
                &mut in_out,
            )
            .map_err(|_| CryptoError::EncryptionFailed)?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + in_out.len());
        sealed.extend_from_slice(&nonce_bytes);
        sealed.extend_from_slice(&in_out);
        Ok(STANDARD.encode(sealed))
    }

    /// Open a token produced by [`encrypt`](Self::encrypt).
    pub fn decrypt<T: DeserializeOwned>(&self, token: &str) -> Result<T, CryptoError> {
        let guard = self.key.read();
        let key = guard.as_ref().ok_or(CryptoError::NotInitialized)?;

        let sealed = STANDARD
            .decode(token)
            .map_err(|_| CryptoError::NotCiphertext)?;
        if sealed.len() < NONCE_LEN + TAG_SIZE {
            return Err(CryptoError::NotCiphertext);
        }

        let (nonce_bytes, ciphertext) = sealed.split_at(NONCE_LEN);
        let nonce =
            Nonce::try_assume_unique_for_key(nonce_bytes).map_err(|_| CryptoError::NotCiphertext)?;
        let opening = Self::sealing_key(key)?;

        let mut in_out = Zeroizing::new(ciphertext.to_vec());
        let plaintext = opening
            .open_in_place(nonce, Aad::empty(), in_out.as_mut_slice())
            .map_err(|_| CryptoError::Authentication)?;

        serde_json::from_slice(plaintext).map_err(|e| CryptoError::Serialization(e.to_string()))
    }

    /// Seal `value` if a key is present, otherwise return it unchanged.
    ///
    /// Only the missing-key case degrades; a failure with a key present
    /// is returned so plaintext is never written by accident.
    pub fn encrypt_if_ready(&self, value: &Value) -> Result<Value, CryptoError> {
        match self.encrypt(value) {
            Ok(token) => Ok(Value::String(token)),
            Err(CryptoError::NotInitialized) => Ok(value.clone()),
            Err(e) => Err(e),
        }
    }

    /// Open `value` if it is a token sealed under the current key; otherwise
    /// return it as-is. Never fails.
    pub fn decrypt_if_needed(&self, value: Value) -> Value {
        let attempt = value.as_str().map(|token| self.decrypt::<Value>(token));
        match attempt {
            Some(Ok(plain)) => plain,
            Some(Err(CryptoError::NotCiphertext | CryptoError::NotInitialized)) | None => value,
            Some(Err(err)) => {
                debug!(error = %err, "Undecryptable value passed through");
                crate::metrics::record_decrypt_passthrough();
                value
            }
        }
    }
}

impl Default for AtRestCipher {
    fn default() -> Self {
        Self::new(DEFAULT_KDF_SALT.as_bytes().to_vec(), MIN_KDF_ITERATIONS)
    }
}
