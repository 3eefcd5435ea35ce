//! Credential and session lifecycle management.
//!
//! `sessionkeeper-core` holds an access/refresh token pair, renews it before
//! it expires, binds refreshes to a device identity, keeps tokens encrypted at
//! rest and lists/terminates the account's sessions on other devices.
//!
//! ```no_run
//! use std::sync::Arc;
//! use sessionkeeper_core::{Config, FileBackend, TokenManager};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = TokenManager::builder(Config::default())
//!     .backend(Arc::new(FileBackend::in_default_location()?))
//!     .build()?;
//! manager.initialize().await;
//!
//! if let Some(token) = manager.access_token() {
//!     println!("bearer {}", token);
//! }
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod clock;
pub mod config;
pub mod fingerprint;
pub mod manager;
pub mod sessions;
pub mod storage;
pub mod token;

pub use api::{ApiError, AuthTransport, HttpTransport, RefreshGrant, RefreshRequest, UserProfile};
pub use clock::{Clock, SystemClock};
pub use config::{Config, ConfigError};
pub use fingerprint::{
    DeviceFingerprinter, DeviceIdentity, EnvironmentProbe, GpuInfo, HashAlgorithm, ScreenGeometry,
    StaticProbe, SystemProbe,
};
pub use manager::{
    BuildError, CurrentUser, LifecycleState, ReauthReason, RefreshOutcome, TokenManager,
    TokenManagerBuilder, DEVICE_ID_KEY, TOKENS_KEY,
};
pub use sessions::{CachedData, SessionInfo, SessionRegistry};
pub use storage::{
    EncryptedStore, FileBackend, KdfParams, KeyValueBackend, MemoryBackend, SealMode, StoreError,
};
pub use token::{DecodedTokenPayload, TokenCodec, TokenKind, TokenPair};
