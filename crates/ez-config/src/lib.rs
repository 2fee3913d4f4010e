//! Sectioned YAML configuration with composable schemas.
//!
//! Configuration types declare a [`Fragment`]: the file and dotted section
//! they live at and the fields they hold. The [`ConfigEngine`] reads single
//! sections on demand, applies scoped overrides, resolves secret-bound fields
//! through a [`SecretStore`], and can validate an entire file against a
//! schema synthesized from every fragment registered for it.

mod engine;
mod error;
mod hierarchy;
mod loader;
mod overrides;
mod registry;
mod schema;
mod secrets;
mod synth;
mod traverse;

/// Engine entry points and options.
pub use engine::{
    CombinedConfig, ConfigEngine, DEFAULT_SECTION_DELIMITER, EngineOptions, ValidationOptions,
};
/// Public error types returned by loading, validation and secret resolution.
pub use error::{ConfigError, FieldError, FieldErrorKind, SecretError, ValidationErrors};
/// Nested tree construction from dotted paths.
pub use hierarchy::{BASE_KEY, Node, inflate};
/// Config file loading.
pub use loader::{EnvLookup, FileLoader, YamlFileLoader};
pub use overrides::{OverrideGuard, OverrideStacks, OverrideValue, Overrides};
pub use registry::FragmentRegistry;
/// Schema declaration types.
pub use schema::{
    Configuration, FieldKind, FieldSpec, Fragment, FragmentId, RecordSpec, UnknownKeys,
};
pub use secrets::{
    DEFAULT_SECRET_PREFIX, SecretBinding, SecretPayload, SecretResolver, SecretStore,
};
pub use synth::{CombinedSchema, SchemaChild, SchemaNode, synthesize};
pub use traverse::{MissPolicy, traverse};

/// Initialize logging using env_logger if the "logging" feature is enabled.
///
/// This is safe to call multiple times; subsequent calls are no-ops.
pub fn init_logging() {
    #[cfg(feature = "logging")]
    {
        let _ = env_logger::try_init();
    }
}
