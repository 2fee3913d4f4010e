//! Secret-bearing fields resolved through an external secret store.
//!
//! A [`SecretBinding`] attached to a field tells the validator how to turn
//! the literal value from the config file into a key for the store. Results
//! are cached by the [`SecretResolver`] for as long as it lives, so a secret
//! rotated in the store during the run is not re-fetched.

use crate::error::SecretError;
use log::debug;
use parking_lot::Mutex;
use serde_yaml::Value;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Prefix marking a config value as a secret store key.
pub const DEFAULT_SECRET_PREFIX: &str = "gsm:";

/// How a field maps onto the secret store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretBinding {
    /// Store namespace (project) the secret lives in.
    pub namespace: String,
    /// Values starting with this prefix are looked up by their remainder.
    pub match_prefix: Option<String>,
    /// When set, always fetch this key and ignore the literal value.
    pub static_key: Option<String>,
}

impl SecretBinding {
    /// Bind to `namespace`, matching values prefixed with `gsm:`.
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            match_prefix: Some(DEFAULT_SECRET_PREFIX.to_string()),
            static_key: None,
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.match_prefix = Some(prefix.into());
        self
    }

    /// Never look up values by prefix.
    pub fn without_prefix(mut self) -> Self {
        self.match_prefix = None;
        self
    }

    pub fn with_static_key(mut self, key: impl Into<String>) -> Self {
        self.static_key = Some(key.into());
        self
    }

    /// Store key to fetch for `value`, or `None` when it passes through.
    pub fn lookup_key(&self, value: &Value) -> Option<String> {
        if let Some(key) = &self.static_key {
            return Some(key.clone());
        }
        let prefix = self.match_prefix.as_deref()?;
        value
            .as_str()
            .and_then(|text| text.strip_prefix(prefix))
            .map(str::to_string)
    }
}

/// Secret bytes plus the hex SHA-256 checksum reported by the store.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretPayload {
    pub data: Vec<u8>,
    pub checksum: String,
}

impl SecretPayload {
    /// Wrap `data`, computing its checksum.
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        let data = data.into();
        let checksum = checksum(&data);
        Self { data, checksum }
    }

    /// Check the checksum and decode the plaintext.
    pub fn verify(self, key: &str) -> Result<String, SecretError> {
        if checksum(&self.data) != self.checksum.to_ascii_lowercase() {
            return Err(SecretError::ChecksumMismatch {
                key: key.to_string(),
            });
        }
        String::from_utf8(self.data).map_err(|_| SecretError::NotUtf8 {
            key: key.to_string(),
        })
    }
}

impl fmt::Debug for SecretPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretPayload")
            .field("len", &self.data.len())
            .field("checksum", &self.checksum)
            .finish()
    }
}

fn checksum(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Client for an external secret store.
pub trait SecretStore: Send + Sync {
    /// Fetch the latest version of `key` in `namespace`.
    fn fetch(&self, namespace: &str, key: &str) -> Result<SecretPayload, SecretError>;
}

/// Resolves bound fields through a store, caching verified plaintexts.
#[derive(Default)]
pub struct SecretResolver {
    store: Option<Arc<dyn SecretStore>>,
    /// Plaintexts keyed by (namespace, store key).
    cache: Mutex<HashMap<(String, String), String>>,
}

impl SecretResolver {
    pub fn new(store: Arc<dyn SecretStore>) -> Self {
        Self {
            store: Some(store),
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// A resolver without a store; any lookup fails.
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Resolve `value` for `binding`, passing it through when it does not match.
    pub fn resolve(&self, binding: &SecretBinding, value: &Value) -> Result<Value, SecretError> {
        let Some(key) = binding.lookup_key(value) else {
            return Ok(value.clone());
        };
        let cache_key = (binding.namespace.clone(), key);
        if let Some(hit) = self.cache.lock().get(&cache_key) {
            return Ok(Value::String(hit.clone()));
        }

        let Some(store) = &self.store else {
            return Err(SecretError::Backend(
                "no secret store configured".to_string(),
            ));
        };
        let (namespace, key) = &cache_key;
        debug!("fetching secret (namespace={namespace}, key={key})");
        let plaintext = store.fetch(namespace, key)?.verify(key)?;
        self.cache.lock().insert(cache_key.clone(), plaintext.clone());
        Ok(Value::String(plaintext))
    }

    /// Number of cached secrets.
    pub fn cached(&self) -> usize {
        self.cache.lock().len()
    }
}

impl fmt::Debug for SecretResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretResolver")
            .field("has_store", &self.store.is_some())
            .field("cached", &self.cached())
            .finish()
    }
}
