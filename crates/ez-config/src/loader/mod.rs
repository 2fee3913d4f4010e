//! YAML config file loading with per-path caching.
//!
//! Resolves the on-disk path of a logical config file (optionally redirected
//! by an environment variable), parses it, and caches the top-level mapping
//! by resolved path.

mod utils;

#[cfg(test)]
mod tests;

use crate::ConfigError;
use log::{debug, info};
use parking_lot::Mutex;
use serde_yaml::{Mapping, Value};
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Source of raw config data for a logical file.
pub trait FileLoader: Send + Sync {
    /// Load the top-level mapping of `file_id`.
    ///
    /// When `path_env_var` is set and present in the environment, its value
    /// replaces the file's path.
    fn load(&self, file_id: &str, path_env_var: Option<&str>) -> Result<Arc<Mapping>, ConfigError>;
}

/// Environment lookup used to resolve path redirects.
pub type EnvLookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Loads YAML files from disk and caches them by resolved path.
pub struct YamlFileLoader {
    /// Directory relative file ids are resolved against.
    base_dir: Option<PathBuf>,
    env: EnvLookup,
    cache: Mutex<HashMap<PathBuf, Arc<Mapping>>>,
}

impl YamlFileLoader {
    /// Loader resolving relative paths against the process working directory.
    pub fn new() -> Self {
        Self {
            base_dir: None,
            env: Arc::new(|name| std::env::var(name).ok()),
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_base_dir(mut self, base_dir: impl AsRef<Path>) -> Self {
        self.base_dir = Some(base_dir.as_ref().to_path_buf());
        self
    }

    /// Replace the environment lookup, e.g. with a fixed map in tests.
    pub fn with_env<F>(mut self, env: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        self.env = Arc::new(env);
        self
    }

    /// Path `file_id` resolves to, honouring the env var redirect.
    pub fn resolve_path(&self, file_id: &str, path_env_var: Option<&str>) -> PathBuf {
        let redirected = path_env_var.and_then(|name| {
            let value = (self.env)(name)?;
            debug!("config path redirected (file={file_id}, env={name}, path={value})");
            Some(value)
        });
        let path = PathBuf::from(redirected.as_deref().unwrap_or(file_id));
        match &self.base_dir {
            Some(base_dir) if path.is_relative() => base_dir.join(path),
            _ => path,
        }
    }

    /// Forget every cached file.
    pub fn clear_cache(&self) {
        self.cache.lock().clear();
    }

    /// Paths currently cached.
    pub fn cached_paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self.cache.lock().keys().cloned().collect();
        paths.sort();
        paths
    }
}

impl Default for YamlFileLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for YamlFileLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("YamlFileLoader")
            .field("base_dir", &self.base_dir)
            .field("cached", &self.cache.lock().len())
            .finish()
    }
}

impl FileLoader for YamlFileLoader {
    fn load(&self, file_id: &str, path_env_var: Option<&str>) -> Result<Arc<Mapping>, ConfigError> {
        let path = self.resolve_path(file_id, path_env_var);
        let key = utils::unique_path(&path);
        if let Some(hit) = self.cache.lock().get(&key) {
            return Ok(hit.clone());
        }

        let loaded = Arc::new(read_mapping(&path)?);
        self.cache.lock().insert(key, loaded.clone());
        Ok(loaded)
    }
}

/// Read and parse a YAML file whose top level must be a mapping.
pub(crate) fn read_mapping(path: &Path) -> Result<Mapping, ConfigError> {
    info!("loading config from path: {}", path.display());
    let contents = fs::read_to_string(path).map_err(|err| match err.kind() {
        std::io::ErrorKind::NotFound => ConfigError::Configuration(format!(
            "could not find config file at: {}",
            path.display()
        )),
        _ => ConfigError::Configuration(format!(
            "failed to read config file {}: {err}",
            path.display()
        )),
    })?;
    parse_mapping(&contents, &path.display().to_string())
}

/// Parse YAML contents whose top level must be a mapping.
pub(crate) fn parse_mapping(contents: &str, label: &str) -> Result<Mapping, ConfigError> {
    debug!("parsing config (source={label}, len={})", contents.len());
    let value: Value = serde_yaml::from_str(contents).map_err(|err| {
        ConfigError::Configuration(format!("config file is not valid yaml: {label} ({err})"))
    })?;
    match value {
        Value::Mapping(map) => Ok(map),
        other => Err(ConfigError::Configuration(format!(
            "config file is not valid config: {label} (top level is {})",
            utils::value_kind(&other)
        ))),
    }
}
