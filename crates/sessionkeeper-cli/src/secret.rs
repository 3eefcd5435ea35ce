use anyhow::{Context, Result};
use keyring::Entry;
use rand::{distributions::Alphanumeric, Rng};
use tracing::{info, warn};

const SERVICE_NAME: &str = "sessionkeeper";

const SECRET_ACCOUNT: &str = "storage-secret";

const SECRET_LEN: usize = 48;

/// Storage secret kept in the OS keychain, so the key protecting tokens at
/// rest never sits next to them on disk.
pub struct StorageSecret;

impl StorageSecret {
    /// Read the secret, creating and storing a random one on first use.
    pub fn load_or_create() -> Result<String> {
        let entry = Entry::new(SERVICE_NAME, SECRET_ACCOUNT)
            .context("Failed to create keyring entry")?;
        match entry.get_password() {
            Ok(secret) => Ok(secret),
            Err(keyring::Error::NoEntry) => {
                let secret = generate();
                entry
                    .set_password(&secret)
                    .context("Failed to store storage secret in keychain")?;
                info!("Created storage secret in keychain");
                Ok(secret)
            }
            Err(e) => Err(e).context("Failed to retrieve storage secret from keychain"),
        }
    }

    /// Keychain secret, or `fallback` when no keychain is available.
    pub fn resolve(fallback: &str) -> String {
        match Self::load_or_create() {
            Ok(secret) => secret,
            Err(e) => {
                warn!(error = %format!("{:#}", e), "Keychain unavailable, using configured storage secret");
                fallback.to_string()
            }
        }
    }
}

fn generate() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SECRET_LEN)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_secret_shape() {
        let a = generate();
        let b = generate();
        assert_eq!(a.len(), SECRET_LEN);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(a, b);
    }
}
