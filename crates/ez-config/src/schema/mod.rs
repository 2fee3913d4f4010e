//! Declarative schema fragments.
//!
//! A [`Fragment`] describes one section of one config file: where it lives
//! and which typed fields it holds. Rust types opt in through
//! [`Configuration`], pairing a serde model with its fragment description.

mod validate;

pub(crate) use validate::{Validator, join_path};

use crate::secrets::SecretBinding;
use serde::de::DeserializeOwned;
use serde_yaml::Value;
use std::any::type_name;
use std::fmt;

/// Stable identity of a fragment, used to key its override stack.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FragmentId(String);

impl FragmentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Identity of a typed configuration.
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self(type_name::<T>().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FragmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Handling of keys that are not declared as fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnknownKeys {
    /// Drop undeclared keys silently.
    #[default]
    Ignore,
    /// Report undeclared keys as validation failures.
    Forbid,
}

/// Shape of a field value.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    Any,
    String,
    Integer,
    /// Floating point; integers are accepted.
    Float,
    Bool,
    List(Box<FieldKind>),
    /// Mapping with string keys and uniformly typed values.
    Map(Box<FieldKind>),
    /// A string restricted to the listed values.
    OneOf(Vec<String>),
    /// The inner kind or null.
    Optional(Box<FieldKind>),
    Record(RecordSpec),
}

impl FieldKind {
    pub fn list(inner: FieldKind) -> Self {
        FieldKind::List(Box::new(inner))
    }

    pub fn map(inner: FieldKind) -> Self {
        FieldKind::Map(Box::new(inner))
    }

    pub fn optional(inner: FieldKind) -> Self {
        FieldKind::Optional(Box::new(inner))
    }

    pub fn one_of<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        FieldKind::OneOf(values.into_iter().map(Into::into).collect())
    }

    pub fn record(fields: Vec<FieldSpec>) -> Self {
        FieldKind::Record(RecordSpec {
            fields,
            unknown_keys: UnknownKeys::Ignore,
        })
    }
}

/// Fields of a nested record.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordSpec {
    pub fields: Vec<FieldSpec>,
    pub unknown_keys: UnknownKeys,
}

/// A single declared field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    pub name: String,
    pub kind: FieldKind,
    /// Value used when the field is absent; `None` makes the field required.
    pub default: Option<Value>,
    /// Secret store binding resolved at validation time.
    pub secret: Option<SecretBinding>,
}

impl FieldSpec {
    /// A field without a default.
    pub fn required(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            default: None,
            secret: None,
        }
    }

    /// A field that falls back to `default` when absent.
    pub fn with_default(
        name: impl Into<String>,
        kind: FieldKind,
        default: impl Into<Value>,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            default: Some(default.into()),
            secret: None,
        }
    }

    /// A nullable field defaulting to null.
    pub fn optional(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind: FieldKind::optional(kind),
            default: Some(Value::Null),
            secret: None,
        }
    }

    /// Resolve this field through a secret store.
    pub fn secret(mut self, binding: SecretBinding) -> Self {
        self.secret = Some(binding);
        self
    }
}

/// Declarative description of one config section.
#[derive(Debug, Clone, PartialEq)]
pub struct Fragment {
    id: FragmentId,
    /// Human readable name used in error paths.
    pub name: String,
    /// Logical config file identifier.
    pub file: Option<String>,
    /// Dotted section path; `""` is the file root.
    pub section: Option<String>,
    /// Environment variable that may redirect the file path.
    pub path_env_var: Option<String>,
    pub fields: Vec<FieldSpec>,
    pub unknown_keys: UnknownKeys,
}

impl Fragment {
    /// Create a root-section fragment with no file assigned.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            id: FragmentId::new(name.clone()),
            name,
            file: None,
            section: Some(String::new()),
            path_env_var: None,
            fields: Vec::new(),
            unknown_keys: UnknownKeys::Ignore,
        }
    }

    pub fn id(&self) -> &FragmentId {
        &self.id
    }

    pub fn with_id(mut self, id: FragmentId) -> Self {
        self.id = id;
        self
    }

    pub fn file(mut self, file: impl Into<String>) -> Self {
        self.file = Some(file.into());
        self
    }

    pub fn section(mut self, section: impl Into<String>) -> Self {
        self.section = Some(section.into());
        self
    }

    pub fn path_env_var(mut self, env_var: impl Into<String>) -> Self {
        self.path_env_var = Some(env_var.into());
        self
    }

    pub fn field(mut self, field: FieldSpec) -> Self {
        self.fields.push(field);
        self
    }

    pub fn forbid_unknown_keys(mut self) -> Self {
        self.unknown_keys = UnknownKeys::Forbid;
        self
    }

    pub fn field_spec(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|field| field.name == name)
    }

    pub(crate) fn has_field(&self, name: &str) -> bool {
        self.field_spec(name).is_some()
    }
}

/// A typed configuration section.
///
/// ```
/// use ez_config::{Configuration, FieldKind, FieldSpec, Fragment};
/// use serde::Deserialize;
///
/// #[derive(Debug, Deserialize)]
/// struct Database {
///     host: String,
///     port: u16,
/// }
///
/// impl Configuration for Database {
///     fn fragment() -> Fragment {
///         Fragment::new("Database")
///             .file("app.yaml")
///             .section("db")
///             .field(FieldSpec::required("host", FieldKind::String))
///             .field(FieldSpec::with_default("port", FieldKind::Integer, 5432))
///     }
/// }
/// ```
pub trait Configuration: DeserializeOwned + 'static {
    /// Describe the section this type is read from.
    fn fragment() -> Fragment;

    /// The fragment keyed by this type's identity.
    fn schema() -> Fragment {
        Self::fragment().with_id(FragmentId::of::<Self>())
    }
}
