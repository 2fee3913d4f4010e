//! Validation of YAML values against declared fields.
//!
//! The validator never stops at the first failure: every offending field is
//! recorded and the caller decides what to do with the collection.

use super::{FieldKind, FieldSpec, Fragment, RecordSpec, UnknownKeys};
use crate::error::{FieldErrorKind, ValidationErrors};
use crate::overrides::OverrideStacks;
use crate::secrets::SecretResolver;
use serde_yaml::{Mapping, Value};

/// Single-pass validator that fills defaults and collects failures.
pub(crate) struct Validator<'a> {
    /// Schema name prefixed to every error path.
    label: String,
    /// Present only when secret fetching is enabled for this pass.
    secrets: Option<&'a SecretResolver>,
    overrides: Option<&'a OverrideStacks>,
    errors: ValidationErrors,
}

impl<'a> Validator<'a> {
    pub(crate) fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            secrets: None,
            overrides: None,
            errors: ValidationErrors::new(),
        }
    }

    pub(crate) fn with_secrets(mut self, secrets: Option<&'a SecretResolver>) -> Self {
        self.secrets = secrets;
        self
    }

    pub(crate) fn with_overrides(mut self, overrides: &'a OverrideStacks) -> Self {
        self.overrides = Some(overrides);
        self
    }

    pub(crate) fn finish(self) -> ValidationErrors {
        self.errors
    }

    /// Validate one fragment's section, applying its pushed overrides first.
    pub(crate) fn fragment(
        &mut self,
        fragment: &Fragment,
        value: Option<&Value>,
        path: &str,
    ) -> Value {
        let Some(mut section) = self.mapping_or_empty(value, path) else {
            return Value::Null;
        };
        self.apply_overrides(fragment, &mut section);
        Value::Mapping(self.fields(&fragment.fields, fragment.unknown_keys, &section, path, &[]))
    }

    /// Apply the overrides pushed for `fragment` to its section data.
    pub(crate) fn apply_overrides(&self, fragment: &Fragment, section: &mut Mapping) {
        if let Some(overrides) = self.overrides {
            overrides.apply(fragment.id(), section);
        }
    }

    /// Validate declared `fields` of `map`.
    ///
    /// Keys listed in `reserved` belong to someone else at this level and are
    /// neither validated nor reported as unknown.
    pub(crate) fn fields(
        &mut self,
        fields: &[FieldSpec],
        unknown_keys: UnknownKeys,
        map: &Mapping,
        path: &str,
        reserved: &[&str],
    ) -> Mapping {
        let mut out = Mapping::new();
        for spec in fields {
            let field_path = join_path(path, &spec.name);
            if let Some(value) = self.field(spec, map.get(spec.name.as_str()), &field_path) {
                out.insert(Value::String(spec.name.clone()), value);
            }
        }
        if unknown_keys == UnknownKeys::Forbid {
            for key in map.keys() {
                let name = key_label(key);
                let declared = fields.iter().any(|field| field.name == name);
                if !declared && !reserved.contains(&name.as_str()) {
                    let key_path = join_path(path, &name);
                    self.invalid(&key_path, FieldErrorKind::UnknownKey, "unknown key");
                }
            }
        }
        out
    }

    /// Interpret an optional value as a mapping; absent values are empty.
    pub(crate) fn mapping_or_empty(
        &mut self,
        value: Option<&Value>,
        path: &str,
    ) -> Option<Mapping> {
        match value {
            None | Some(Value::Null) => Some(Mapping::new()),
            Some(Value::Mapping(map)) => Some(map.clone()),
            Some(_) => {
                self.invalid(path, FieldErrorKind::Type, "expected mapping");
                None
            }
        }
    }

    pub(crate) fn invalid(&mut self, path: &str, kind: FieldErrorKind, message: impl Into<String>) {
        let normalized_path = if path.is_empty() { "root" } else { path };
        let located = format!("{}:{normalized_path}", self.label);
        self.errors.push(&located, kind, message);
    }

    fn field(&mut self, spec: &FieldSpec, value: Option<&Value>, path: &str) -> Option<Value> {
        let Some(raw) = value else {
            return match &spec.default {
                Some(default) => Some(default.clone()),
                None => {
                    self.invalid(path, FieldErrorKind::Missing, "missing required field");
                    None
                }
            };
        };

        let resolved;
        let raw = match (&spec.secret, self.secrets) {
            (Some(binding), Some(resolver)) => match resolver.resolve(binding, raw) {
                Ok(value) => {
                    resolved = value;
                    &resolved
                }
                Err(err) => {
                    self.invalid(path, FieldErrorKind::Secret, err.to_string());
                    return None;
                }
            },
            _ => raw,
        };
        self.kind(&spec.kind, raw, path)
    }

    fn kind(&mut self, kind: &FieldKind, value: &Value, path: &str) -> Option<Value> {
        let matches = match kind {
            FieldKind::Any => true,
            FieldKind::String => value.is_string(),
            FieldKind::Integer => value.is_i64() || value.is_u64(),
            FieldKind::Float => value.is_number(),
            FieldKind::Bool => value.is_bool(),
            FieldKind::OneOf(options) => match value.as_str() {
                Some(text) if options.iter().any(|option| option == text) => true,
                Some(_) => {
                    let expected = format!("expected one of: {}", options.join(", "));
                    self.invalid(path, FieldErrorKind::Type, expected);
                    return None;
                }
                None => false,
            },
            FieldKind::Optional(inner) => {
                return if value.is_null() {
                    Some(Value::Null)
                } else {
                    self.kind(inner, value, path)
                };
            }
            FieldKind::List(inner) => return self.list(inner, value, path),
            FieldKind::Map(inner) => return self.map(inner, value, path),
            FieldKind::Record(record) => return self.record(record, value, path),
        };

        if matches {
            Some(value.clone())
        } else {
            self.invalid(path, FieldErrorKind::Type, format!("expected {}", describe(kind)));
            None
        }
    }

    fn list(&mut self, inner: &FieldKind, value: &Value, path: &str) -> Option<Value> {
        let Some(items) = value.as_sequence() else {
            self.invalid(path, FieldErrorKind::Type, "expected array");
            return None;
        };
        let validated = items
            .iter()
            .enumerate()
            .filter_map(|(idx, item)| self.kind(inner, item, &format!("{path}[{idx}]")))
            .collect();
        Some(Value::Sequence(validated))
    }

    fn map(&mut self, inner: &FieldKind, value: &Value, path: &str) -> Option<Value> {
        let Some(entries) = value.as_mapping() else {
            self.invalid(path, FieldErrorKind::Type, "expected mapping");
            return None;
        };
        let mut out = Mapping::new();
        for (key, item) in entries {
            let entry_path = join_path(path, &key_label(key));
            if !key.is_string() {
                self.invalid(&entry_path, FieldErrorKind::Type, "expected string key");
                continue;
            }
            if let Some(validated) = self.kind(inner, item, &entry_path) {
                out.insert(key.clone(), validated);
            }
        }
        Some(Value::Mapping(out))
    }

    fn record(&mut self, record: &RecordSpec, value: &Value, path: &str) -> Option<Value> {
        let Some(map) = value.as_mapping() else {
            self.invalid(path, FieldErrorKind::Type, "expected mapping");
            return None;
        };
        let out = self.fields(&record.fields, record.unknown_keys, map, path, &[]);
        Some(Value::Mapping(out))
    }
}

/// Join nested paths for better error messages.
pub(crate) fn join_path(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}.{key}")
    }
}

/// Render a mapping key for error paths.
pub(crate) fn key_label(key: &Value) -> String {
    match key {
        Value::String(text) => text.clone(),
        other => serde_yaml::to_string(other)
            .map(|text| text.trim_end().to_string())
            .unwrap_or_else(|_| format!("{other:?}")),
    }
}

fn describe(kind: &FieldKind) -> &'static str {
    match kind {
        FieldKind::Any => "any value",
        FieldKind::String => "string",
        FieldKind::Integer => "integer",
        FieldKind::Float => "number",
        FieldKind::Bool => "bool",
        FieldKind::List(_) => "array",
        FieldKind::Map(_) | FieldKind::Record(_) => "mapping",
        FieldKind::OneOf(_) => "string",
        FieldKind::Optional(_) => "nullable value",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FieldError;
    use pretty_assertions::assert_eq;

    fn doc(yaml: &str) -> Value {
        serde_yaml::from_str(yaml).expect("yaml")
    }

    fn server_fragment() -> Fragment {
        Fragment::new("Server")
            .field(FieldSpec::required("host", FieldKind::String))
            .field(FieldSpec::with_default("port", FieldKind::Integer, 8080))
            .field(FieldSpec::with_default("ratio", FieldKind::Float, 0.5))
            .field(FieldSpec::optional("motd", FieldKind::String))
            .field(FieldSpec::with_default(
                "mode",
                FieldKind::one_of(["dev", "prod"]),
                "dev",
            ))
            .field(FieldSpec::with_default(
                "tags",
                FieldKind::list(FieldKind::String),
                Value::Sequence(Vec::new()),
            ))
    }

    fn run(fragment: &Fragment, yaml: &str) -> (Value, Vec<FieldError>) {
        let data = doc(yaml);
        let mut validator = Validator::new(fragment.name.clone());
        let value = validator.fragment(fragment, Some(&data), "");
        (value, validator.finish().into_iter().collect())
    }

    #[test]
    fn fills_defaults_for_absent_fields() {
        let (value, errors) = run(&server_fragment(), "host: localhost\n");
        assert!(errors.is_empty(), "{errors:?}");
        assert_eq!(
            value,
            doc("host: localhost\nport: 8080\nratio: 0.5\nmotd: null\nmode: dev\ntags: []\n")
        );
    }

    #[test]
    fn reports_every_offending_field() {
        let (_, errors) = run(
            &server_fragment(),
            "port: eighty\nmode: staging\ntags: [ok, 3]\n",
        );
        let paths: Vec<_> = errors.iter().map(|error| error.path.as_str()).collect();
        assert_eq!(
            paths,
            vec!["Server:host", "Server:port", "Server:mode", "Server:tags[1]"]
        );
        assert_eq!(errors[0].kind, FieldErrorKind::Missing);
        assert_eq!(errors[1].kind, FieldErrorKind::Type);
    }

    #[test]
    fn float_accepts_integers() {
        let (value, errors) = run(&server_fragment(), "host: h\nratio: 2\n");
        assert!(errors.is_empty());
        assert_eq!(value.get("ratio"), Some(&Value::from(2)));
    }

    #[test]
    fn ignores_unknown_keys_by_default() {
        let (value, errors) = run(&server_fragment(), "host: h\nextra: 1\n");
        assert!(errors.is_empty());
        assert_eq!(value.get("extra"), None);
    }

    #[test]
    fn forbids_unknown_keys_when_requested() {
        let fragment = server_fragment().forbid_unknown_keys();
        let (_, errors) = run(&fragment, "host: h\nextra: 1\n");
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].path, "Server:extra");
        assert_eq!(errors[0].kind, FieldErrorKind::UnknownKey);
    }

    #[test]
    fn validates_nested_records_and_maps() {
        let fragment = Fragment::new("Pool").field(FieldSpec::required(
            "limits",
            FieldKind::record(vec![
                FieldSpec::required("max", FieldKind::Integer),
                FieldSpec::with_default(
                    "labels",
                    FieldKind::map(FieldKind::String),
                    Value::Mapping(Mapping::new()),
                ),
            ]),
        ));
        let (_, errors) = run(&fragment, "limits:\n  labels:\n    a: x\n    b: 2\n");
        let paths: Vec<_> = errors.iter().map(|error| error.path.as_str()).collect();
        assert_eq!(paths, vec!["Pool:limits.max", "Pool:limits.labels.b"]);
    }

    #[test]
    fn non_mapping_section_is_a_type_error() {
        let (value, errors) = run(&server_fragment(), "- 1\n- 2\n");
        assert_eq!(value, Value::Null);
        assert_eq!(errors[0].path, "Server:root");
        assert_eq!(errors[0].message, "expected mapping");
    }

    #[test]
    fn optional_accepts_null_and_inner_kind() {
        let (value, errors) = run(&server_fragment(), "host: h\nmotd: hello\n");
        assert!(errors.is_empty());
        assert_eq!(value.get("motd"), Some(&Value::from("hello")));

        let (_, errors) = run(&server_fragment(), "host: h\nmotd: 4\n");
        assert_eq!(errors[0].path, "Server:motd");
    }
}
