//! Registry of declared schema fragments.

use crate::ConfigError;
use crate::schema::{Configuration, Fragment, FragmentId};
use log::{debug, warn};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Ordered, shareable list of registered fragments.
#[derive(Debug, Default, Clone)]
pub struct FragmentRegistry {
    fragments: Arc<RwLock<Vec<Arc<Fragment>>>>,
}

impl FragmentRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a typed configuration.
    pub fn register<T: Configuration>(&self) -> Arc<Fragment> {
        self.register_fragment(T::schema())
    }

    /// Register a fragment, replacing an earlier one with the same id in place.
    pub fn register_fragment(&self, fragment: Fragment) -> Arc<Fragment> {
        let fragment = Arc::new(fragment);
        let mut fragments = self.fragments.write();
        if let Some(env_var) = conflicting_env_var(&fragments, &fragment) {
            warn!(
                "fragment disagrees on path env var (fragment={}, file={:?}, registered={:?})",
                fragment.id(),
                fragment.file,
                env_var
            );
        }
        match fragments.iter_mut().find(|existing| existing.id() == fragment.id()) {
            Some(existing) => {
                debug!("re-registering fragment (id={})", fragment.id());
                *existing = fragment.clone();
            }
            None => {
                debug!(
                    "registering fragment (id={}, file={:?}, section={:?})",
                    fragment.id(),
                    fragment.file,
                    fragment.section
                );
                fragments.push(fragment.clone());
            }
        }
        fragment
    }

    /// Fetch a fragment by id.
    pub fn get(&self, id: &FragmentId) -> Option<Arc<Fragment>> {
        self.fragments
            .read()
            .iter()
            .find(|fragment| fragment.id() == id)
            .cloned()
    }

    /// All fragments bound to `file`, keyed by section.
    ///
    /// When two fragments claim the same section the later registration wins.
    pub fn lookup(&self, file: &str) -> BTreeMap<String, Arc<Fragment>> {
        let mut sections = BTreeMap::new();
        for fragment in self.fragments.read().iter() {
            if fragment.file.as_deref() != Some(file) {
                continue;
            }
            let Some(section) = fragment.section.clone() else {
                debug!("skipping fragment without section (id={})", fragment.id());
                continue;
            };
            if let Some(previous) = sections.insert(section.clone(), fragment.clone()) {
                warn!(
                    "section declared twice (file={file}, section={section:?}, replaced={})",
                    previous.id()
                );
            }
        }
        sections
    }

    /// Ensure all fragments of `file` agree on their path env var.
    ///
    /// Returns the agreed env var. Touches no data, so a declaration mistake
    /// fails before any file is read.
    pub fn check_file(&self, file: &str) -> Result<Option<String>, ConfigError> {
        let fragments = self.fragments.read();
        let mut env_vars = fragments
            .iter()
            .filter(|fragment| fragment.file.as_deref() == Some(file))
            .map(|fragment| fragment.path_env_var.clone());
        let Some(first) = env_vars.next() else {
            return Err(ConfigError::Configuration(format!(
                "no configurations found for '{file}'"
            )));
        };
        if env_vars.any(|env_var| env_var != first) {
            return Err(ConfigError::Setup(format!(
                "different path env var values found for configuration file '{file}'"
            )));
        }
        Ok(first)
    }

    /// Distinct files with at least one fragment, in registration order.
    pub fn files(&self) -> Vec<String> {
        let mut files: Vec<String> = Vec::new();
        for fragment in self.fragments.read().iter() {
            if let Some(file) = &fragment.file {
                if !files.contains(file) {
                    files.push(file.clone());
                }
            }
        }
        files
    }

    /// Return all registered fragments.
    pub fn all(&self) -> Vec<Arc<Fragment>> {
        self.fragments.read().clone()
    }

    pub fn len(&self) -> usize {
        self.fragments.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.read().is_empty()
    }
}

/// Env var of an already registered fragment for the same file, if it differs.
fn conflicting_env_var(fragments: &[Arc<Fragment>], fragment: &Fragment) -> Option<Option<String>> {
    let file = fragment.file.as_deref()?;
    fragments
        .iter()
        .filter(|existing| existing.id() != fragment.id())
        .find(|existing| {
            existing.file.as_deref() == Some(file) && existing.path_env_var != fragment.path_env_var
        })
        .map(|existing| existing.path_env_var.clone())
}

#[cfg(test)]
mod tests {
    use super::FragmentRegistry;
    use crate::schema::{Configuration, FieldKind, FieldSpec, Fragment, FragmentId};
    use crate::ConfigError;
    use pretty_assertions::assert_eq;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct Db {
        #[allow(dead_code)]
        host: String,
    }

    impl Configuration for Db {
        fn fragment() -> Fragment {
            Fragment::new("Db")
                .file("app.yaml")
                .section("db")
                .field(FieldSpec::required("host", FieldKind::String))
        }
    }

    /// Fragments are indexed by file and section.
    #[test]
    fn registry_tracks_fragments_by_file() {
        let registry = FragmentRegistry::new();
        registry.register::<Db>();
        registry.register_fragment(Fragment::new("Cache").file("app.yaml").section("cache"));
        registry.register_fragment(Fragment::new("Jobs").file("jobs.yaml"));

        let sections: Vec<String> = registry.lookup("app.yaml").into_keys().collect();
        assert_eq!(sections, vec!["cache".to_string(), "db".to_string()]);
        assert_eq!(registry.files(), vec!["app.yaml".to_string(), "jobs.yaml".to_string()]);
        assert!(registry.get(&FragmentId::of::<Db>()).is_some());
        assert_eq!(registry.len(), 3);
    }

    /// Registering a fragment again replaces it without reordering.
    #[test]
    fn re_registering_replaces_in_place() {
        let registry = FragmentRegistry::new();
        registry.register_fragment(Fragment::new("A").file("a.yaml").section("x"));
        registry.register_fragment(Fragment::new("B").file("a.yaml").section("y"));
        registry.register_fragment(Fragment::new("A").file("a.yaml").section("z"));

        let names: Vec<String> = registry.all().iter().map(|f| f.name.clone()).collect();
        assert_eq!(names, vec!["A".to_string(), "B".to_string()]);
        assert!(registry.lookup("a.yaml").contains_key("z"));
    }

    /// Fragments of one file must agree on the path env var.
    #[test]
    fn check_file_detects_env_var_conflicts() {
        let registry = FragmentRegistry::new();
        registry.register_fragment(
            Fragment::new("A").file("a.yaml").section("x").path_env_var("A_PATH"),
        );
        registry.register_fragment(Fragment::new("B").file("a.yaml").section("y"));
        let err = registry.check_file("a.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::Setup(_)));
    }

    /// The shared env var is returned when all fragments agree.
    #[test]
    fn check_file_returns_agreed_env_var() {
        let registry = FragmentRegistry::new();
        registry.register_fragment(
            Fragment::new("A").file("a.yaml").section("x").path_env_var("A_PATH"),
        );
        registry.register_fragment(
            Fragment::new("B").file("a.yaml").section("y").path_env_var("A_PATH"),
        );
        assert_eq!(
            registry.check_file("a.yaml").expect("agreed"),
            Some("A_PATH".to_string())
        );
    }

    /// A file nobody declared is a configuration error.
    #[test]
    fn check_file_without_fragments_is_a_configuration_error() {
        let registry = FragmentRegistry::new();
        let err = registry.check_file("nope.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::Configuration(_)));
    }
}
