//! Persistent storage for credential state.
//!
//! - `KeyValueBackend`: raw string storage (memory or files on disk)
//! - `EncryptedStore`: namespaced AEAD-encrypted JSON values on top of a backend

pub mod backend;
pub mod encrypted;
pub mod error;

pub use backend::{FileBackend, KeyValueBackend, MemoryBackend};
pub use encrypted::{EncryptedStore, KdfParams, SealMode};
pub use error::StoreError;
