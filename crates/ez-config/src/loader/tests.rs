//! Tests for YAML config file loading.

use super::*;
use pretty_assertions::assert_eq;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

/// Write YAML contents to a path, creating parent directories if needed.
fn write_yaml(path: &Path, contents: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("dir");
    }
    fs::write(path, contents).expect("write");
}

fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> + Send + Sync + 'static {
    let vars: HashMap<String, String> = pairs
        .iter()
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect();
    move |name| vars.get(name).cloned()
}

#[test]
fn loads_mapping_relative_to_base_dir() {
    let temp = TempDir::new().expect("tmp");
    write_yaml(&temp.path().join("app.yaml"), "db:\n  host: localhost\n");

    let loader = YamlFileLoader::new().with_base_dir(temp.path());
    let loaded = loader.load("app.yaml", None).expect("load");
    let expected: Mapping = serde_yaml::from_str("db:\n  host: localhost\n").expect("yaml");
    assert_eq!(*loaded, expected);
}

#[test]
fn env_var_redirects_path() {
    let temp = TempDir::new().expect("tmp");
    write_yaml(&temp.path().join("app.yaml"), "source: default\n");
    let redirected = temp.path().join("override").join("app.yaml");
    write_yaml(&redirected, "source: redirected\n");

    let loader = YamlFileLoader::new()
        .with_base_dir(temp.path())
        .with_env(env_from(&[("APP_CONFIG", redirected.to_str().expect("utf8"))]));

    let loaded = loader.load("app.yaml", Some("APP_CONFIG")).expect("load");
    assert_eq!(loaded.get("source"), Some(&Value::from("redirected")));

    let unset = loader.load("app.yaml", Some("OTHER_VAR")).expect("load");
    assert_eq!(unset.get("source"), Some(&Value::from("default")));
}

#[test]
fn caches_by_resolved_path() {
    let temp = TempDir::new().expect("tmp");
    let path = temp.path().join("app.yaml");
    write_yaml(&path, "value: 1\n");

    let loader = YamlFileLoader::new().with_base_dir(temp.path());
    let first = loader.load("app.yaml", None).expect("load");
    write_yaml(&path, "value: 2\n");
    let second = loader.load("app.yaml", None).expect("load");
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(loader.cached_paths().len(), 1);

    loader.clear_cache();
    let third = loader.load("app.yaml", None).expect("load");
    assert_eq!(third.get("value"), Some(&Value::from(2)));
}

#[test]
fn missing_file_is_a_configuration_error() {
    let temp = TempDir::new().expect("tmp");
    let loader = YamlFileLoader::new().with_base_dir(temp.path());
    let err = loader.load("absent.yaml", None).unwrap_err();
    let msg = format!("{err}");
    assert!(matches!(err, ConfigError::Configuration(_)));
    assert!(msg.contains("could not find config file"));
}

#[test]
fn invalid_yaml_is_a_configuration_error() {
    let err = parse_mapping("a: [1, 2\n", "inline").unwrap_err();
    assert!(format!("{err}").contains("not valid yaml"));
}

#[test]
fn non_mapping_top_level_is_rejected() {
    let err = parse_mapping("- a\n- b\n", "inline").unwrap_err();
    assert!(format!("{err}").contains("top level is a sequence"));

    let err = parse_mapping("", "inline").unwrap_err();
    assert!(format!("{err}").contains("top level is empty"));
}
