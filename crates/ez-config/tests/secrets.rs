//! Secret-bound fields resolved through a secret store.

use ez_config::{
    ConfigEngine, ConfigError, Configuration, EngineOptions, FieldErrorKind, FieldKind, FieldSpec,
    Fragment, FragmentRegistry, SecretBinding, ValidationOptions,
};
use ez_config_test_utils::{FailingSecretStore, MapFileLoader, StaticSecretStore};
use pretty_assertions::assert_eq;
use serde::Deserialize;
use std::sync::Arc;

#[derive(Debug, Deserialize, PartialEq)]
struct Credentials {
    user: String,
    password: String,
    api_token: String,
}

impl Configuration for Credentials {
    fn fragment() -> Fragment {
        Fragment::new("Credentials")
            .file("secrets.yaml")
            .section("credentials")
            .field(FieldSpec::required("user", FieldKind::String))
            .field(
                FieldSpec::required("password", FieldKind::String)
                    .secret(SecretBinding::new("prod-project")),
            )
            .field(
                FieldSpec::with_default("api_token", FieldKind::String, "unset").secret(
                    SecretBinding::new("prod-project").with_static_key("shared-api-token"),
                ),
            )
    }
}

const FILE: &str = concat!(
    "credentials:\n",
    "  user: svc\n",
    "  password: gsm:db-password\n",
    "  api_token: placeholder\n",
);

fn store() -> Arc<StaticSecretStore> {
    Arc::new(
        StaticSecretStore::new()
            .with_secret("prod-project", "db-password", "hunter2")
            .with_secret("prod-project", "shared-api-token", "tok-123"),
    )
}

fn engine(store: Arc<StaticSecretStore>) -> ConfigEngine {
    let registry = FragmentRegistry::new();
    registry.register::<Credentials>();
    let loader = MapFileLoader::new().with_file("secrets.yaml", FILE);
    ConfigEngine::new(registry, Arc::new(loader)).with_secret_store(store)
}

/// Prefixed and statically keyed fields are fetched on `get`.
#[test]
fn get_resolves_secrets() {
    let store = store();
    let engine = engine(store.clone());
    let credentials: Credentials = engine.get().expect("credentials");
    assert_eq!(
        credentials,
        Credentials {
            user: "svc".to_string(),
            password: "hunter2".to_string(),
            api_token: "tok-123".to_string(),
        }
    );
    assert_eq!(
        store.fetches(),
        vec![
            ("prod-project".to_string(), "db-password".to_string()),
            ("prod-project".to_string(), "shared-api-token".to_string()),
        ]
    );
}

/// A resolved secret is fetched at most once per engine.
#[test]
fn secrets_are_cached() {
    let store = store();
    let engine = engine(store.clone());
    engine.get::<Credentials>().expect("first");
    engine.get::<Credentials>().expect("second");
    assert_eq!(store.fetch_count(), 2);
    assert_eq!(engine.secrets().cached(), 2);

    store.set("prod-project", "db-password", "rotated");
    let credentials: Credentials = engine.get().expect("third");
    assert_eq!(credentials.password, "hunter2");
    assert_eq!(store.fetch_count(), 2);
}

/// Combined validation leaves secrets alone unless asked to fetch them.
#[test]
fn combined_validation_fetches_only_on_request() {
    let store = store();
    let engine = engine(store.clone());

    let combined = engine
        .validate_config_file("secrets.yaml", false)
        .expect("combined");
    let credentials: Credentials = combined.get().expect("credentials");
    assert_eq!(credentials.password, "gsm:db-password");
    assert_eq!(store.fetch_count(), 0);

    let combined = engine
        .validate_config_file("secrets.yaml", true)
        .expect("combined");
    let credentials: Credentials = combined.get().expect("credentials");
    assert_eq!(credentials.password, "hunter2");
    assert_eq!(store.fetch_count(), 2);
}

/// A failed fetch during validation does not enable fetching for later calls.
#[test]
fn failed_validation_leaves_fetching_off() {
    let store = Arc::new(StaticSecretStore::new());
    let engine = engine(store.clone());
    assert!(engine.validate_config_file("secrets.yaml", true).is_err());
    let fetched = store.fetch_count();

    engine
        .validate_config_file("secrets.yaml", false)
        .expect("combined without secrets");
    assert_eq!(store.fetch_count(), fetched);
}

/// Secret fetching on `get` can be disabled engine-wide or per call.
#[test]
fn get_fetching_can_be_disabled() {
    let store = store();
    let options = EngineOptions::default().with_fetch_secrets_on_get(false);
    let engine = engine(store.clone()).with_options(options);
    let credentials: Credentials = engine.get().expect("credentials");
    assert_eq!(credentials.password, "gsm:db-password");
    assert_eq!(credentials.api_token, "placeholder");

    let value = engine
        .get_fragment_with(&Credentials::schema(), ValidationOptions::fetch_secrets(true))
        .expect("value");
    assert_eq!(value.get("password"), Some(&serde_yaml::Value::from("hunter2")));
    assert_eq!(store.fetch_count(), 2);
}

/// Values without the prefix pass through untouched.
#[test]
fn unprefixed_values_pass_through() {
    let store = store();
    let registry = FragmentRegistry::new();
    let loader =
        MapFileLoader::new().with_file("secrets.yaml", "credentials:\n  password: plain\n");
    let engine = ConfigEngine::new(registry, Arc::new(loader)).with_secret_store(store.clone());
    let fragment = Fragment::new("Plain")
        .file("secrets.yaml")
        .section("credentials")
        .field(
            FieldSpec::required("password", FieldKind::String)
                .secret(SecretBinding::new("prod-project")),
        );
    let value = engine.get_fragment(&fragment).expect("value");
    assert_eq!(value.get("password"), Some(&serde_yaml::Value::from("plain")));
    assert_eq!(store.fetch_count(), 0);
}

/// Checksum mismatches surface as field errors.
#[test]
fn checksum_mismatch_is_a_field_error() {
    let store = Arc::new(
        StaticSecretStore::new()
            .with_secret("prod-project", "db-password", "hunter2")
            .with_secret("prod-project", "shared-api-token", "tok-123")
            .with_corrupt_checksum("db-password"),
    );
    let engine = engine(store);
    let err = engine.get::<Credentials>().unwrap_err();
    let ConfigError::Validation(errors) = err else {
        panic!("expected validation error");
    };
    let errors: Vec<_> = errors.into_iter().collect();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].path, "Credentials:password");
    assert_eq!(errors[0].kind, FieldErrorKind::Secret);
    assert!(errors[0].message.contains("checksum"), "{}", errors[0].message);
}

/// Failed fetches are not cached.
#[test]
fn failures_are_retried() {
    let store = Arc::new(FailingSecretStore::new());
    let registry = FragmentRegistry::new();
    let loader = MapFileLoader::new().with_file("secrets.yaml", FILE);
    let engine = ConfigEngine::new(registry, Arc::new(loader)).with_secret_store(store.clone());
    assert!(engine.get::<Credentials>().is_err());
    assert!(engine.get::<Credentials>().is_err());
    assert_eq!(store.fetch_count(), 4);
    assert_eq!(engine.secrets().cached(), 0);
}
