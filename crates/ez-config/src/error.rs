//! Error types for config loading, composition and validation.

use std::fmt;
use thiserror::Error;

/// Errors returned while loading, composing or validating config.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file is missing, unparsable or not a mapping, or no
    /// fragments are registered for the requested file.
    #[error("configuration error: {0}")]
    Configuration(String),
    /// Fragment declarations are inconsistent with each other.
    #[error("config setup error: {0}")]
    Setup(String),
    /// A delimited key could not be resolved with the raise policy.
    #[error("key not found: {key} (missing segment: {segment})")]
    KeyNotFound { key: String, segment: String },
    /// One or more fields failed validation.
    #[error("invalid config: {0}")]
    Validation(ValidationErrors),
    /// Validated data could not be decoded into the requested type.
    #[error("failed to decode config: {0}")]
    Decode(#[from] serde_yaml::Error),
}

/// Classification of a single field failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldErrorKind {
    /// A required field has no value and no default.
    Missing,
    /// The value does not match the declared field kind.
    Type,
    /// The key is not declared and the record forbids unknown keys.
    UnknownKey,
    /// Resolving the value from the secret store failed.
    Secret,
}

/// A single offending field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    /// Dotted path of the field, prefixed with the schema name.
    pub path: String,
    pub kind: FieldErrorKind,
    pub message: String,
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// Every field failure collected during one validation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors {
    errors: Vec<FieldError>,
}

impl ValidationErrors {
    /// An empty collection.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, path: &str, kind: FieldErrorKind, message: impl Into<String>) {
        let path = if path.is_empty() { "root" } else { path };
        self.errors.push(FieldError {
            path: path.to_string(),
            kind,
            message: message.into(),
        });
    }

    /// Whether no error was recorded.
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Number of recorded errors.
    pub fn len(&self) -> usize {
        self.errors.len()
    }

    /// Errors in the order they were recorded.
    pub fn iter(&self) -> impl Iterator<Item = &FieldError> {
        self.errors.iter()
    }

    /// Drop every failure of the given kind.
    pub fn without_kind(self, kind: FieldErrorKind) -> Self {
        Self {
            errors: self
                .errors
                .into_iter()
                .filter(|error| error.kind != kind)
                .collect(),
        }
    }

    /// Turn a non-empty collection into an error.
    pub(crate) fn into_result(self) -> Result<(), ConfigError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(self))
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} field error(s)", self.errors.len())?;
        for error in &self.errors {
            write!(f, "; {error}")?;
        }
        Ok(())
    }
}

impl IntoIterator for ValidationErrors {
    type Item = FieldError;
    type IntoIter = std::vec::IntoIter<FieldError>;

    fn into_iter(self) -> Self::IntoIter {
        self.errors.into_iter()
    }
}

/// Errors returned by secret store clients and payload verification.
#[derive(Debug, Error)]
pub enum SecretError {
    /// The secret does not exist in the namespace.
    #[error("secret not found: {namespace}/{key}")]
    NotFound { namespace: String, key: String },
    /// The payload checksum did not match its data.
    #[error("checksum did not match when fetching secret {key}")]
    ChecksumMismatch { key: String },
    /// The payload is not valid UTF-8.
    #[error("secret {key} is not valid utf-8")]
    NotUtf8 { key: String },
    /// Backend-specific failure.
    #[error("secret backend error: {0}")]
    Backend(String),
}
