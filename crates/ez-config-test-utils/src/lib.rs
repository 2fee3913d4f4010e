//! Test helpers shared across ez-config crates.

pub mod files;
pub mod loader;
pub mod secrets;

pub use files::{ConfigDir, write_yaml};
pub use loader::MapFileLoader;
pub use secrets::{FailingSecretStore, StaticSecretStore};
