use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Write YAML contents to a path, creating parent directories if needed.
pub fn write_yaml(path: &Path, contents: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create config dir");
    }
    fs::write(path, contents).expect("write config file");
}

/// Temporary directory holding config files for a test.
pub struct ConfigDir {
    temp: TempDir,
}

impl ConfigDir {
    pub fn new() -> Self {
        Self {
            temp: TempDir::new().expect("tempdir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.temp.path()
    }

    /// Write `contents` to `name` inside the directory and return its path.
    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.temp.path().join(name);
        write_yaml(&path, contents);
        path
    }
}

impl Default for ConfigDir {
    fn default() -> Self {
        Self::new()
    }
}
