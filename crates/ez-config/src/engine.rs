//! The configuration engine: loading, overrides, validation and composition.
//!
//! [`ConfigEngine`] owns every piece of mutable state the engine needs (the
//! override stacks and the secret cache) and borrows the registry and file
//! loader it is given. Whether secrets are fetched is decided per call, so a
//! failing validation can never leave secret fetching switched on.

use crate::error::{ConfigError, FieldErrorKind};
use crate::loader::FileLoader;
use crate::overrides::{OverrideGuard, OverrideStacks, OverrideValue, Overrides};
use crate::registry::FragmentRegistry;
use crate::schema::{Configuration, Fragment, UnknownKeys, Validator};
use crate::secrets::{SecretResolver, SecretStore};
use crate::synth::{self, CombinedSchema};
use crate::traverse::{MissPolicy, traverse};
use log::{debug, info};
use serde::de::DeserializeOwned;
use serde_yaml::{Mapping, Value};
use std::sync::Arc;

/// Delimiter between section path segments.
pub const DEFAULT_SECTION_DELIMITER: &str = ".";

/// Options controlling engine behaviour.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Whether single-section `get` calls resolve secrets.
    pub fetch_secrets_on_get: bool,
    /// Delimiter used to split section paths.
    pub section_delimiter: String,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            fetch_secrets_on_get: true,
            section_delimiter: DEFAULT_SECTION_DELIMITER.to_string(),
        }
    }
}

impl EngineOptions {
    pub fn with_fetch_secrets_on_get(mut self, fetch: bool) -> Self {
        self.fetch_secrets_on_get = fetch;
        self
    }

    pub fn with_section_delimiter(mut self, delimiter: impl Into<String>) -> Self {
        self.section_delimiter = delimiter.into();
        self
    }
}

/// Per-call validation settings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ValidationOptions {
    /// Resolve secret-bound fields through the secret store.
    pub fetch_secrets: bool,
}

impl ValidationOptions {
    pub fn fetch_secrets(fetch_secrets: bool) -> Self {
        Self { fetch_secrets }
    }
}

/// Result of validating a whole config file against its combined schema.
#[derive(Debug, Clone)]
pub struct CombinedConfig {
    schema: CombinedSchema,
    value: Value,
    delimiter: String,
}

impl CombinedConfig {
    pub fn schema(&self) -> &CombinedSchema {
        &self.schema
    }

    /// The validated document with defaults filled in.
    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn into_value(self) -> Value {
        self.value
    }

    /// Decode the validated data at `section` into `T`.
    pub fn section<T: DeserializeOwned>(&self, section: &str) -> Result<T, ConfigError> {
        let value = traverse(&self.value, section, &self.delimiter, MissPolicy::Raise)?;
        Ok(serde_yaml::from_value(value)?)
    }

    /// Decode the section a typed configuration is declared at.
    pub fn get<T: Configuration>(&self) -> Result<T, ConfigError> {
        let fragment = T::schema();
        let section = fragment.section.as_deref().ok_or_else(|| {
            ConfigError::Setup(format!("section attribute is missing from {}", fragment.name))
        })?;
        self.section(section)
    }
}

/// Assembles validated configuration from registered fragments.
pub struct ConfigEngine {
    registry: FragmentRegistry,
    loader: Arc<dyn FileLoader>,
    overrides: OverrideStacks,
    secrets: SecretResolver,
    options: EngineOptions,
}

impl ConfigEngine {
    /// Create an engine without a secret store.
    pub fn new(registry: FragmentRegistry, loader: Arc<dyn FileLoader>) -> Self {
        Self {
            registry,
            loader,
            overrides: OverrideStacks::new(),
            secrets: SecretResolver::disabled(),
            options: EngineOptions::default(),
        }
    }

    pub fn with_secret_store(mut self, store: Arc<dyn SecretStore>) -> Self {
        self.secrets = SecretResolver::new(store);
        self
    }

    pub fn with_options(mut self, options: EngineOptions) -> Self {
        self.options = options;
        self
    }

    pub fn registry(&self) -> &FragmentRegistry {
        &self.registry
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    pub fn overrides(&self) -> &OverrideStacks {
        &self.overrides
    }

    pub fn secrets(&self) -> &SecretResolver {
        &self.secrets
    }

    /// Load, validate and decode the section of a typed configuration.
    pub fn get<T: Configuration>(&self) -> Result<T, ConfigError> {
        let value = self.get_fragment(&T::schema())?;
        Ok(serde_yaml::from_value(value)?)
    }

    /// Load and validate a fragment's section using the engine defaults.
    pub fn get_fragment(&self, fragment: &Fragment) -> Result<Value, ConfigError> {
        let options = ValidationOptions::fetch_secrets(self.options.fetch_secrets_on_get);
        self.get_fragment_with(fragment, options)
    }

    /// Load and validate a fragment's section.
    ///
    /// Only the section slice is validated, so keys elsewhere in the file are
    /// never reported.
    /// A null or missing section reads as an empty mapping.
    pub fn get_fragment_with(
        &self,
        fragment: &Fragment,
        options: ValidationOptions,
    ) -> Result<Value, ConfigError> {
        let (file, section) = located(fragment)?;
        debug!(
            "getting config section (fragment={}, file={file}, section={section:?})",
            fragment.id()
        );
        let data = self.load(file, fragment.path_env_var.as_deref())?;
        let delimiter = &self.options.section_delimiter;
        let slice = match traverse(&data, section, delimiter, MissPolicy::Default)? {
            Value::Null => Value::Mapping(Mapping::new()),
            slice if slice.is_mapping() => slice,
            _ => {
                return Err(ConfigError::Configuration(format!(
                    "section '{section}' of '{file}' is not a mapping"
                )));
            }
        };

        let mut validator = Validator::new(fragment.name.clone())
            .with_overrides(&self.overrides)
            .with_secrets(self.secret_resolver(options));
        let value = validator.fragment(fragment, Some(&slice), "");
        validator.finish().into_result()?;
        Ok(value)
    }

    /// Whether a typed configuration's section is present in its file.
    pub fn section_exists<T: Configuration>(&self) -> Result<bool, ConfigError> {
        self.fragment_section_exists(&T::schema())
    }

    /// Check for a fragment's section without validating it.
    ///
    /// Loader failures are still reported as errors.
    pub fn fragment_section_exists(&self, fragment: &Fragment) -> Result<bool, ConfigError> {
        let (file, section) = located(fragment)?;
        let data = self.load(file, fragment.path_env_var.as_deref())?;
        match traverse(&data, section, &self.options.section_delimiter, MissPolicy::Raise) {
            Ok(_) => Ok(true),
            Err(ConfigError::KeyNotFound { .. }) => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// Push overrides for a typed configuration until the guard drops.
    pub fn override_scope<T: Configuration>(
        &self,
        overrides: Overrides,
    ) -> Result<OverrideGuard<'_>, ConfigError> {
        self.override_fragment(&T::schema(), overrides)
    }

    /// Push overrides for a fragment until the guard drops.
    ///
    /// Field names and value types are checked against the fragment; fields
    /// the overrides leave out are not required.
    pub fn override_fragment(
        &self,
        fragment: &Fragment,
        overrides: Overrides,
    ) -> Result<OverrideGuard<'_>, ConfigError> {
        check_overrides(fragment, &overrides)?;
        Ok(OverrideGuard::push(
            &self.overrides,
            fragment.id().clone(),
            overrides,
        ))
    }

    /// Run `f` with overrides pushed for a typed configuration.
    pub fn with_overrides<T, R, F>(&self, overrides: Overrides, f: F) -> Result<R, ConfigError>
    where
        T: Configuration,
        F: FnOnce() -> R,
    {
        let _guard = self.override_scope::<T>(overrides)?;
        Ok(f())
    }

    /// Build the combined schema for `file`.
    pub fn combined_schema(&self, file: &str) -> Result<CombinedSchema, ConfigError> {
        synth::synthesize(&self.registry, file, &self.options.section_delimiter)
    }

    /// Validate a whole file against the schema combined from its fragments.
    ///
    /// The combined schema is built (and fragment declarations checked)
    /// before the file is read. Secrets are resolved only when
    /// `fetch_secrets` is true.
    pub fn validate_config_file(
        &self,
        file: &str,
        fetch_secrets: bool,
    ) -> Result<CombinedConfig, ConfigError> {
        let schema = self.combined_schema(file)?;
        info!(
            "validating config file (file={file}, schema={}, fetch_secrets={fetch_secrets})",
            schema.name()
        );
        let data = self.load(file, schema.path_env_var.as_deref())?;

        let options = ValidationOptions::fetch_secrets(fetch_secrets);
        let mut validator = Validator::new(schema.name())
            .with_overrides(&self.overrides)
            .with_secrets(self.secret_resolver(options));
        let value = schema.validate_with(&data, &mut validator);
        validator.finish().into_result()?;
        Ok(CombinedConfig {
            delimiter: schema.delimiter.clone(),
            schema,
            value,
        })
    }

    fn load(&self, file: &str, path_env_var: Option<&str>) -> Result<Value, ConfigError> {
        let mapping = self.loader.load(file, path_env_var)?;
        Ok(Value::Mapping(Mapping::clone(&mapping)))
    }

    fn secret_resolver(&self, options: ValidationOptions) -> Option<&SecretResolver> {
        options.fetch_secrets.then_some(&self.secrets)
    }
}

/// File and section of a fragment, or a setup error when either is unset.
fn located(fragment: &Fragment) -> Result<(&str, &str), ConfigError> {
    let file = fragment.file.as_deref().ok_or_else(|| {
        ConfigError::Setup(format!("file attribute is missing from {}", fragment.name))
    })?;
    let section = fragment.section.as_deref().ok_or_else(|| {
        ConfigError::Setup(format!("section attribute is missing from {}", fragment.name))
    })?;
    Ok((file, section))
}

/// Check override names and value types, tolerating missing required fields.
fn check_overrides(fragment: &Fragment, overrides: &Overrides) -> Result<(), ConfigError> {
    let mut validator = Validator::new(fragment.name.clone());
    let values = overrides.set_values();
    validator.fields(&fragment.fields, UnknownKeys::Forbid, &values, "", &[]);
    for (name, value) in overrides.iter() {
        if matches!(value, OverrideValue::Default) && !fragment.has_field(name) {
            validator.invalid(name, FieldErrorKind::UnknownKey, "unknown key");
        }
    }
    validator
        .finish()
        .without_kind(FieldErrorKind::Missing)
        .into_result()
}
