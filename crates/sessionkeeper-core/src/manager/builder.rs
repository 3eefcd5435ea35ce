use std::sync::Arc;

use thiserror::Error;

use super::TokenManager;
use crate::api::{ApiError, AuthTransport, HttpTransport};
use crate::clock::{Clock, SystemClock};
use crate::config::{Config, ConfigError};
use crate::fingerprint::{DeviceFingerprinter, EnvironmentProbe, HashAlgorithm, SystemProbe};
use crate::storage::{EncryptedStore, KdfParams, KeyValueBackend, MemoryBackend};

#[derive(Error, Debug)]
pub enum BuildError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to create HTTP transport: {0}")]
    Transport(#[from] ApiError),
}

/// Assembles a `TokenManager` from its collaborators.
///
/// Anything not supplied gets a default: an HTTP transport for
/// `config.api_base_url`, an in-memory backend, the system probe and clock.
pub struct TokenManagerBuilder {
    config: Config,
    transport: Option<Arc<dyn AuthTransport>>,
    backend: Option<Arc<dyn KeyValueBackend>>,
    probe: Option<Arc<dyn EnvironmentProbe>>,
    hash_algorithm: HashAlgorithm,
    clock: Option<Arc<dyn Clock>>,
    kdf: KdfParams,
}

impl TokenManagerBuilder {
    pub(crate) fn new(config: Config) -> Self {
        Self {
            config,
            transport: None,
            backend: None,
            probe: None,
            hash_algorithm: HashAlgorithm::default(),
            clock: None,
            kdf: KdfParams::default(),
        }
    }

    pub fn transport(mut self, transport: Arc<dyn AuthTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn backend(mut self, backend: Arc<dyn KeyValueBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn probe(mut self, probe: Arc<dyn EnvironmentProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    pub fn hash_algorithm(mut self, algorithm: HashAlgorithm) -> Self {
        self.hash_algorithm = algorithm;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn kdf_params(mut self, kdf: KdfParams) -> Self {
        self.kdf = kdf;
        self
    }

    pub fn build(self) -> Result<TokenManager, BuildError> {
        self.config.validate()?;

        let transport = match self.transport {
            Some(transport) => transport,
            None => Arc::new(HttpTransport::new(&self.config.api_base_url)?),
        };
        let backend = self
            .backend
            .unwrap_or_else(|| Arc::new(MemoryBackend::new()));
        let store = if self.config.enable_secure_storage {
            EncryptedStore::new(
                backend.clone(),
                self.config.storage_namespace.clone(),
                &self.config.storage_secret,
                &self.kdf,
            )
        } else {
            EncryptedStore::plaintext(backend.clone(), self.config.storage_namespace.clone())
        };
        let probe = self.probe.unwrap_or_else(|| Arc::new(SystemProbe));
        let fingerprinter = DeviceFingerprinter::new(probe).with_algorithm(self.hash_algorithm);
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));

        Ok(TokenManager::from_parts(
            self.config,
            transport,
            backend,
            store,
            fingerprinter,
            clock,
        ))
    }
}
