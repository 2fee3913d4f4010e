//! Delimited-key lookup into nested YAML mappings.

use crate::ConfigError;
use serde_yaml::{Mapping, Value};

/// Behaviour when a key segment is missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MissPolicy {
    /// A missing segment resolves to an empty mapping.
    #[default]
    Default,
    /// A missing segment is a [`ConfigError::KeyNotFound`].
    Raise,
}

/// Look up `key` inside `value`, splitting it on `delimiter`.
///
/// The empty key addresses `value` itself. A segment whose parent is not a
/// mapping counts as missing.
pub fn traverse(
    value: &Value,
    key: &str,
    delimiter: &str,
    policy: MissPolicy,
) -> Result<Value, ConfigError> {
    if key.is_empty() {
        return Ok(value.clone());
    }

    let mut current = value;
    for segment in key.split(delimiter) {
        match current.get(segment) {
            Some(next) => current = next,
            None => {
                return match policy {
                    MissPolicy::Default => Ok(Value::Mapping(Mapping::new())),
                    MissPolicy::Raise => Err(ConfigError::KeyNotFound {
                        key: key.to_string(),
                        segment: segment.to_string(),
                    }),
                };
            }
        }
    }
    Ok(current.clone())
}
