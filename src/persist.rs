//! Saving and loading config descriptors.

use std::path::{Path, PathBuf};

use bevy::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ConfigDescriptor;

/// File extension of persisted particle configs.
pub const CONFIG_EXTENSION: &str = ".pfx.ron";

/// Default directory for persisted particle configs.
pub const DEFAULT_SAVE_DIR: &str = "assets/particles";

#[derive(Error, Debug)]
pub enum SaveError {
    #[error("failed to create directory {path:?}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to serialize '{name}': {source}")]
    Serialize { name: String, source: ron::Error },

    #[error("failed to write {path:?}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("failed to read {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse {path:?}: {source}")]
    Parse {
        path: PathBuf,
        source: ron::error::SpannedError,
    },
}

/// Contents of one persisted file.
///
/// Roots hold every leaf. Prefab instances name the library config they
/// derive from and hold only their overrides, so loading one without its
/// base would fill the gaps with defaults.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct SavedConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base: Option<String>,
    #[serde(default)]
    pub config: ConfigDescriptor,
}

impl SavedConfig {
    pub fn root(config: ConfigDescriptor) -> Self {
        Self { base: None, config }
    }

    pub fn instance(base: impl Into<String>, diff: ConfigDescriptor) -> Self {
        Self {
            base: Some(base.into()),
            config: diff,
        }
    }

    pub fn is_instance(&self) -> bool {
        self.base.is_some()
    }
}

/// Destination of the "save on change" hook.
///
/// Implementations may block; the plugin calls them from the IO task pool.
pub trait ConfigStore: Send + Sync + 'static {
    fn save(&self, name: &str, saved: &SavedConfig) -> Result<(), SaveError>;
    fn load(&self, name: &str) -> Result<SavedConfig, LoadError>;

    /// Every config the store holds, sorted by name.
    fn load_all(&self) -> Vec<(String, SavedConfig)> {
        Vec::new()
    }
}

/// Replace characters that are not allowed in file names.
pub fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            _ => c,
        })
        .collect()
}

/// Serialize a config the way it is written to disk.
pub fn to_ron(name: &str, saved: &SavedConfig) -> Result<String, SaveError> {
    let pretty = ron::ser::PrettyConfig::default();
    ron::ser::to_string_pretty(saved, pretty).map_err(|source| SaveError::Serialize {
        name: name.to_string(),
        source,
    })
}

/// Stores each config as `<directory>/<name>.pfx.ron`.
#[derive(Clone, Debug)]
pub struct RonConfigStore {
    directory: PathBuf,
}

impl Default for RonConfigStore {
    fn default() -> Self {
        Self::new(DEFAULT_SAVE_DIR)
    }
}

impl RonConfigStore {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn path_for(&self, name: &str) -> PathBuf {
        self.directory
            .join(format!("{}{}", sanitize_filename(name), CONFIG_EXTENSION))
    }
}

fn read_saved(path: &Path) -> Result<SavedConfig, LoadError> {
    let contents = std::fs::read_to_string(path).map_err(|source| LoadError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    ron::from_str(&contents).map_err(|source| LoadError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

impl ConfigStore for RonConfigStore {
    fn save(&self, name: &str, saved: &SavedConfig) -> Result<(), SaveError> {
        std::fs::create_dir_all(&self.directory).map_err(|source| SaveError::CreateDir {
            path: self.directory.clone(),
            source,
        })?;

        let path = self.path_for(name);
        let ron_str = to_ron(name, saved)?;
        std::fs::write(&path, ron_str).map_err(|source| SaveError::Write { path, source })
    }

    fn load(&self, name: &str) -> Result<SavedConfig, LoadError> {
        read_saved(&self.path_for(name))
    }

    /// Unreadable files are logged and skipped.
    fn load_all(&self) -> Vec<(String, SavedConfig)> {
        if !self.directory.is_dir() {
            return Vec::new();
        }
        let Ok(entries) = std::fs::read_dir(&self.directory) else {
            warn!("Failed to list particle configs in {:?}", self.directory);
            return Vec::new();
        };

        let mut loaded = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            let Some(name) = path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(|n| n.strip_suffix(CONFIG_EXTENSION))
                .filter(|n| !n.is_empty())
                .map(str::to_string)
            else {
                continue;
            };

            match read_saved(&path) {
                Ok(saved) => {
                    info!("Loaded particle config '{}' from disk", name);
                    loaded.push((name, saved));
                }
                Err(e) => warn!("{}", e),
            }
        }
        loaded.sort_by(|a, b| a.0.cmp(&b.0));
        loaded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::ScalarDescriptor;

    fn sample() -> SavedConfig {
        SavedConfig::root(ConfigDescriptor {
            rate: Some(12.0),
            lifetime: Some(ScalarDescriptor::random(1.0, 2.0)),
            ..default()
        })
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = RonConfigStore::new(dir.path().join("nested"));

        store.save("sparks", &sample()).unwrap();
        assert!(dir.path().join("nested/sparks.pfx.ron").is_file());
        assert_eq!(store.load("sparks").unwrap(), sample());
    }

    #[test]
    fn names_are_sanitized() {
        let store = RonConfigStore::new("particles");
        assert_eq!(
            store.path_for("fx/fire:big"),
            Path::new("particles").join("fx_fire_big.pfx.ron")
        );
    }

    #[test]
    fn load_all_skips_foreign_and_broken_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = RonConfigStore::new(dir.path());
        store.save("b", &sample()).unwrap();
        store.save("a", &SavedConfig::default()).unwrap();
        std::fs::write(dir.path().join("notes.txt"), "hello").unwrap();
        std::fs::write(dir.path().join("broken.pfx.ron"), "(rate: oops").unwrap();

        let loaded = store.load_all();
        let names: Vec<&str> = loaded.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn missing_and_malformed_files_are_typed_errors() {
        let dir = tempfile::tempdir().unwrap();
        let store = RonConfigStore::new(dir.path());
        assert!(matches!(store.load("nope"), Err(LoadError::Read { .. })));

        std::fs::write(store.path_for("bad"), "(config: (duration: \"five\"))").unwrap();
        assert!(matches!(store.load("bad"), Err(LoadError::Parse { .. })));
    }

    #[test]
    fn instances_keep_their_base_name() {
        let dir = tempfile::tempdir().unwrap();
        let store = RonConfigStore::new(dir.path());
        let diff = ConfigDescriptor {
            rate: Some(75.0),
            ..default()
        };
        store
            .save("Fire (fast)", &SavedConfig::instance("Fire", diff.clone()))
            .unwrap();

        let text = std::fs::read_to_string(store.path_for("Fire (fast)")).unwrap();
        assert!(text.contains("base: Some(\"Fire\")"));

        let loaded = store.load("Fire (fast)").unwrap();
        assert!(loaded.is_instance());
        assert_eq!(loaded.base.as_deref(), Some("Fire"));
        assert_eq!(loaded.config, diff);
    }

    #[test]
    fn save_into_unwritable_location_reports_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, "").unwrap();
        let store = RonConfigStore::new(blocker.join("sub"));
        assert!(matches!(
            store.save("x", &sample()),
            Err(SaveError::CreateDir { .. })
        ));
    }
}
