use ez_config::{ConfigError, FileLoader};
use parking_lot::Mutex;
use serde_yaml::Mapping;
use std::collections::HashMap;
use std::sync::Arc;

/// In-memory loader keyed by file id that records every load.
#[derive(Debug, Default)]
pub struct MapFileLoader {
    files: HashMap<String, Arc<Mapping>>,
    loads: Mutex<Vec<(String, Option<String>)>>,
}

impl MapFileLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a file parsed from YAML. Panics on invalid YAML.
    pub fn with_file(mut self, file_id: impl Into<String>, yaml: &str) -> Self {
        let mapping: Mapping = serde_yaml::from_str(yaml).expect("valid yaml mapping");
        self.files.insert(file_id.into(), Arc::new(mapping));
        self
    }

    /// Number of load calls so far.
    pub fn load_count(&self) -> usize {
        self.loads.lock().len()
    }

    /// Every `(file_id, path_env_var)` pair passed to `load`.
    pub fn loads(&self) -> Vec<(String, Option<String>)> {
        self.loads.lock().clone()
    }
}

impl FileLoader for MapFileLoader {
    fn load(&self, file_id: &str, path_env_var: Option<&str>) -> Result<Arc<Mapping>, ConfigError> {
        self.loads
            .lock()
            .push((file_id.to_string(), path_env_var.map(str::to_string)));
        self.files.get(file_id).cloned().ok_or_else(|| {
            ConfigError::Configuration(format!("could not find config file at: {file_id}"))
        })
    }
}
