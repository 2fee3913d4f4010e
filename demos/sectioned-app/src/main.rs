//! Small service configured from one sectioned YAML file.
//!
//! Run with `--fetch-secrets` and `EZ_SECRET_APP_DB_PASSWORD=...` to resolve
//! the database password through the environment-backed secret store.

use anyhow::{Context, Result};
use clap::Parser;
use ez_config::{
    ConfigEngine, Configuration, FieldKind, FieldSpec, Fragment, FragmentRegistry, Overrides,
    SecretBinding, SecretError, SecretPayload, SecretStore, YamlFileLoader, init_logging,
};
use log::info;
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;

const CONFIG_FILE: &str = "app.yaml";
const CONFIG_PATH_ENV: &str = "SECTIONED_APP_CONFIG";

/// Command-line options for the demo.
#[derive(Debug, Parser)]
#[command(name = "sectioned-app", about = "Validate and print a sectioned config file")]
struct Cli {
    /// Directory holding app.yaml
    #[arg(long, default_value = "demos/sectioned-app/config")]
    config_dir: PathBuf,
    /// Resolve secret-bound fields while validating
    #[arg(long)]
    fetch_secrets: bool,
    /// Override the server port for this run
    #[arg(long)]
    port: Option<u16>,
    /// Print the combined schema tree
    #[arg(long)]
    show_schema: bool,
}

#[derive(Debug, Deserialize)]
struct AppConfig {
    name: String,
}

impl Configuration for AppConfig {
    fn fragment() -> Fragment {
        Fragment::new("AppConfig")
            .file(CONFIG_FILE)
            .path_env_var(CONFIG_PATH_ENV)
            .field(FieldSpec::required("name", FieldKind::String))
    }
}

#[derive(Debug, Deserialize)]
struct ServerConfig {
    host: String,
    port: u16,
}

impl Configuration for ServerConfig {
    fn fragment() -> Fragment {
        Fragment::new("ServerConfig")
            .file(CONFIG_FILE)
            .section("server")
            .path_env_var(CONFIG_PATH_ENV)
            .field(FieldSpec::with_default("host", FieldKind::String, "127.0.0.1"))
            .field(FieldSpec::with_default("port", FieldKind::Integer, 8000))
    }
}

#[derive(Debug, Deserialize)]
struct DatabaseConfig {
    url: String,
    password: String,
    pool_size: u32,
}

impl Configuration for DatabaseConfig {
    fn fragment() -> Fragment {
        Fragment::new("DatabaseConfig")
            .file(CONFIG_FILE)
            .section("server.database")
            .path_env_var(CONFIG_PATH_ENV)
            .forbid_unknown_keys()
            .field(FieldSpec::required("url", FieldKind::String))
            .field(
                FieldSpec::required("password", FieldKind::String)
                    .secret(SecretBinding::new("sectioned-app")),
            )
            .field(FieldSpec::with_default("pool_size", FieldKind::Integer, 4))
    }
}

/// Reads secrets from `EZ_SECRET_<KEY>` environment variables.
struct EnvSecretStore;

impl SecretStore for EnvSecretStore {
    fn fetch(&self, namespace: &str, key: &str) -> Result<SecretPayload, SecretError> {
        let var = format!("EZ_SECRET_{}", key.to_ascii_uppercase().replace('-', "_"));
        std::env::var(&var)
            .map(SecretPayload::new)
            .map_err(|_| SecretError::NotFound {
                namespace: namespace.to_string(),
                key: key.to_string(),
            })
    }
}

fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    info!(
        "starting demo (config_dir={}, fetch_secrets={})",
        cli.config_dir.display(),
        cli.fetch_secrets
    );

    let registry = FragmentRegistry::new();
    registry.register::<AppConfig>();
    registry.register::<ServerConfig>();
    registry.register::<DatabaseConfig>();

    let loader = YamlFileLoader::new().with_base_dir(&cli.config_dir);
    let engine =
        ConfigEngine::new(registry, Arc::new(loader)).with_secret_store(Arc::new(EnvSecretStore));

    if cli.show_schema {
        let schema = engine
            .combined_schema(CONFIG_FILE)
            .context("failed to build combined schema")?;
        print!("{schema}");
    }

    let _port_override = cli
        .port
        .map(|port| engine.override_scope::<ServerConfig>(Overrides::new().set("port", port)))
        .transpose()
        .context("invalid port override")?;

    let combined = engine
        .validate_config_file(CONFIG_FILE, cli.fetch_secrets)
        .context("config file failed validation")?;

    let app: AppConfig = combined.get().context("failed to decode app section")?;
    let server: ServerConfig = combined.get().context("failed to decode server section")?;
    let database: DatabaseConfig = combined
        .get()
        .context("failed to decode database section")?;

    println!("{} listening on {}:{}", app.name, server.host, server.port);
    println!(
        "database {} (pool_size={}, password {})",
        database.url,
        database.pool_size,
        if database.password.starts_with(ez_config::DEFAULT_SECRET_PREFIX) {
            "unresolved"
        } else {
            "resolved"
        }
    );
    Ok(())
}
