use ez_config::{SecretError, SecretPayload, SecretStore};
use parking_lot::Mutex;
use std::collections::HashMap;

/// Secret store backed by a fixed map of `(namespace, key)` to plaintext.
#[derive(Debug, Default)]
pub struct StaticSecretStore {
    secrets: Mutex<HashMap<(String, String), String>>,
    corrupt: Vec<String>,
    fetches: Mutex<Vec<(String, String)>>,
}

impl StaticSecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_secret(
        self,
        namespace: impl Into<String>,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.set(namespace, key, value);
        self
    }

    /// Serve `key` with a checksum that does not match its data.
    pub fn with_corrupt_checksum(mut self, key: impl Into<String>) -> Self {
        self.corrupt.push(key.into());
        self
    }

    /// Replace a secret, e.g. to simulate rotation.
    pub fn set(
        &self,
        namespace: impl Into<String>,
        key: impl Into<String>,
        value: impl Into<String>,
    ) {
        self.secrets
            .lock()
            .insert((namespace.into(), key.into()), value.into());
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.lock().len()
    }

    pub fn fetches(&self) -> Vec<(String, String)> {
        self.fetches.lock().clone()
    }
}

impl SecretStore for StaticSecretStore {
    fn fetch(&self, namespace: &str, key: &str) -> Result<SecretPayload, SecretError> {
        self.fetches
            .lock()
            .push((namespace.to_string(), key.to_string()));
        let secrets = self.secrets.lock();
        let Some(value) = secrets.get(&(namespace.to_string(), key.to_string())) else {
            return Err(SecretError::NotFound {
                namespace: namespace.to_string(),
                key: key.to_string(),
            });
        };
        let mut payload = SecretPayload::new(value.as_bytes());
        if self.corrupt.iter().any(|corrupt| corrupt == key) {
            payload.checksum = "0".repeat(64);
        }
        Ok(payload)
    }
}

/// Secret store whose every fetch fails.
#[derive(Debug, Default)]
pub struct FailingSecretStore {
    fetches: Mutex<usize>,
}

impl FailingSecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fetch_count(&self) -> usize {
        *self.fetches.lock()
    }
}

impl SecretStore for FailingSecretStore {
    fn fetch(&self, _namespace: &str, _key: &str) -> Result<SecretPayload, SecretError> {
        *self.fetches.lock() += 1;
        Err(SecretError::Backend("secret store unavailable".to_string()))
    }
}
