//! Namespaced, encrypted-at-rest key-value store.
//!
//! Values are serialized to JSON, sealed with ChaCha20-Poly1305 under a key
//! derived (Argon2id) from the application secret and a fixed salt, and stored
//! as `base64(nonce || ciphertext)`. When no cipher is available the store
//! keeps working with plain JSON, and reads accept both forms.

use std::sync::Arc;

use argon2::{Algorithm, Argon2, Params, Version};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use rand::RngCore;
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, warn};

use super::{KeyValueBackend, StoreError};

/// Fixed salt for the storage key. The secret is static too, so the salt only
/// separates this derivation from other uses of the same secret.
const KEY_SALT: &[u8] = b"sessionkeeper.storage.v1";

const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;

/// How a value was (or will be) held at rest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SealMode {
    Encrypted,
    PlaintextFallback,
}

/// Argon2id cost parameters for deriving the storage key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KdfParams {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            memory_kib: Params::DEFAULT_M_COST,
            iterations: Params::DEFAULT_T_COST,
            parallelism: Params::DEFAULT_P_COST,
        }
    }
}

impl KdfParams {
    fn derive_key(&self, secret: &str) -> Result<[u8; KEY_LEN], StoreError> {
        let params = Params::new(
            self.memory_kib,
            self.iterations,
            self.parallelism,
            Some(KEY_LEN),
        )
        .map_err(|e| StoreError::KeyDerivation(e.to_string()))?;
        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

        let mut key = [0u8; KEY_LEN];
        argon2
            .hash_password_into(secret.as_bytes(), KEY_SALT, &mut key)
            .map_err(|e| StoreError::KeyDerivation(e.to_string()))?;
        Ok(key)
    }
}

pub struct EncryptedStore {
    backend: Arc<dyn KeyValueBackend>,
    namespace: String,
    cipher: Option<ChaCha20Poly1305>,
}

impl std::fmt::Debug for EncryptedStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptedStore")
            .field("namespace", &self.namespace)
            .field("encrypted", &self.is_encrypted())
            .finish()
    }
}

impl EncryptedStore {
    /// Create a store that encrypts under a key derived from `secret`.
    ///
    /// If key derivation fails the store falls back to plaintext mode.
    pub fn new(
        backend: Arc<dyn KeyValueBackend>,
        namespace: impl Into<String>,
        secret: &str,
        kdf: &KdfParams,
    ) -> Self {
        let cipher = match kdf.derive_key(secret) {
            Ok(key) => Some(ChaCha20Poly1305::new(Key::from_slice(&key))),
            Err(e) => {
                warn!(error = %e, "Storage encryption unavailable, using plaintext fallback");
                None
            }
        };
        Self {
            backend,
            namespace: namespace.into(),
            cipher,
        }
    }

    /// Create a store that never encrypts.
    pub fn plaintext(backend: Arc<dyn KeyValueBackend>, namespace: impl Into<String>) -> Self {
        Self {
            backend,
            namespace: namespace.into(),
            cipher: None,
        }
    }

    pub fn is_encrypted(&self) -> bool {
        self.cipher.is_some()
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    fn namespaced(&self, key: &str) -> String {
        format!("{}{}", self.namespace, key)
    }

    /// Serialize, seal and write a value.
    ///
    /// Returns the mode the value was written in, or `None` if nothing could
    /// be written at all (serialization or backend failure, e.g. quota).
    pub fn set_item<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Option<SealMode> {
        let plain = match serde_json::to_string(value) {
            Ok(json) => json,
            Err(e) => {
                warn!(key, error = %e, "Failed to serialize storage value");
                return None;
            }
        };

        let (stored, mode) = match self.seal(&plain) {
            Ok(Some(sealed)) => (sealed, SealMode::Encrypted),
            Ok(None) => (plain, SealMode::PlaintextFallback),
            Err(e) => {
                warn!(key, error = %e, "Encryption failed, storing plaintext");
                (plain, SealMode::PlaintextFallback)
            }
        };

        match self.backend.set(&self.namespaced(key), &stored) {
            Ok(()) => {
                debug!(key, mode = ?mode, "Stored item");
                Some(mode)
            }
            Err(e) => {
                warn!(key, error = %e, "Failed to write storage entry");
                None
            }
        }
    }

    /// Read and open a value, or `None` if absent or unreadable.
    pub fn get_item<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.open_item(key).map(|(value, _)| value)
    }

    /// Like `get_item`, also reporting which form the entry was stored in.
    pub fn open_item<T: DeserializeOwned>(&self, key: &str) -> Option<(T, SealMode)> {
        let raw = match self.backend.get(&self.namespaced(key)) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!(key, error = %e, "Failed to read storage entry");
                return None;
            }
        };

        let decoded = STANDARD.decode(raw.trim()).ok();

        if let Some(bytes) = decoded.as_deref() {
            if let Some(value) = self.unseal(bytes) {
                return Some((value, SealMode::Encrypted));
            }
        }

        // Plain JSON: degraded-mode writes and entries from before encryption
        if let Ok(value) = serde_json::from_str(&raw) {
            return Some((value, SealMode::PlaintextFallback));
        }

        // Plain base64-wrapped JSON
        if let Some(value) = decoded.and_then(|bytes| serde_json::from_slice(&bytes).ok()) {
            return Some((value, SealMode::PlaintextFallback));
        }

        warn!(key, "Storage entry could not be decrypted or parsed");
        None
    }

    pub fn remove_item(&self, key: &str) {
        if let Err(e) = self.backend.remove(&self.namespaced(key)) {
            warn!(key, error = %e, "Failed to remove storage entry");
        }
    }

    /// Remove every entry under this store's namespace, and nothing else.
    pub fn clear(&self) {
        let keys = match self.backend.keys() {
            Ok(keys) => keys,
            Err(e) => {
                warn!(error = %e, "Failed to list storage entries");
                return;
            }
        };
        for key in keys.iter().filter(|k| k.starts_with(&self.namespace)) {
            if let Err(e) = self.backend.remove(key) {
                warn!(key = %key, error = %e, "Failed to remove storage entry");
            }
        }
    }

    /// `Ok(None)` when running without a cipher.
    fn seal(&self, plain: &str) -> Result<Option<String>, StoreError> {
        let Some(cipher) = &self.cipher else {
            return Ok(None);
        };

        let mut nonce = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce);

        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce), plain.as_bytes())
            .map_err(|_| StoreError::Encrypt)?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(&nonce);
        sealed.extend_from_slice(&ciphertext);
        Ok(Some(STANDARD.encode(sealed)))
    }

    fn unseal<T: DeserializeOwned>(&self, bytes: &[u8]) -> Option<T> {
        let cipher = self.cipher.as_ref()?;
        if bytes.len() <= NONCE_LEN {
            return None;
        }
        let (nonce, ciphertext) = bytes.split_at(NONCE_LEN);
        let plain = cipher.decrypt(Nonce::from_slice(nonce), ciphertext).ok()?;
        serde_json::from_slice(&plain).ok()
    }
}
