//! Viewer documents: the `{model, config}` unit the browser viewer consumes

use crate::config::DisplayConfig;
use crate::error::PersistError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};

/// A geometry tree paired with its merged display configuration.
///
/// Serializes to exactly `{"model": ..., "config": ...}`; the name only
/// decides file names and is derived from the file stem when read back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewerDocument {
    #[serde(skip)]
    pub name: String,
    pub model: Value,
    pub config: DisplayConfig,
}

impl ViewerDocument {
    pub fn new(name: impl Into<String>, model: Value, config: DisplayConfig) -> Self {
        Self {
            name: name.into(),
            model,
            config,
        }
    }

    pub fn file_name(&self) -> String {
        format!("{}.json", self.name)
    }

    /// Write the document to `<dir>/<name>.json`, creating `dir` if needed.
    pub fn persist(&self, dir: &Path) -> Result<PathBuf, PersistError> {
        let path = dir.join(self.file_name());
        std::fs::create_dir_all(dir).map_err(|source| PersistError::Write {
            path: dir.to_path_buf(),
            source,
        })?;

        let json = serde_json::to_string(self).map_err(|source| PersistError::Json {
            path: path.clone(),
            source,
        })?;

        std::fs::write(&path, json).map_err(|source| PersistError::Write {
            path: path.clone(),
            source,
        })?;

        Ok(path)
    }

    /// Read a persisted document back, naming it after the file stem.
    pub fn load(path: &Path) -> Result<Self, PersistError> {
        let content = std::fs::read_to_string(path).map_err(|source| PersistError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let mut document: ViewerDocument =
            serde_json::from_str(&content).map_err(|source| PersistError::Json {
                path: path.to_path_buf(),
                source,
            })?;

        document.name = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();

        Ok(document)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Overrides;
    use serde_json::json;
    use tempfile::tempdir;

    fn sample() -> ViewerDocument {
        let overrides: Overrides = json!({ "cadWidth": 500, "height": 375 })
            .as_object()
            .cloned()
            .unwrap();
        ViewerDocument::new(
            "box",
            json!({ "parts": [{ "name": "Solid", "shape": { "vertices": [0.0, 1.0] } }] }),
            DisplayConfig::defaults().merge(&overrides),
        )
    }

    #[test]
    fn test_serializes_model_and_config_only() {
        let value = serde_json::to_value(sample()).unwrap();
        let keys: Vec<&String> = value.as_object().unwrap().keys().collect();
        assert_eq!(keys, vec!["model", "config"]);
    }

    #[test]
    fn test_persist_then_load_keeps_config() {
        let dir = tempdir().unwrap();
        let document = sample();

        let path = document.persist(dir.path()).unwrap();
        assert_eq!(path, dir.path().join("box.json"));

        let loaded = ViewerDocument::load(&path).unwrap();
        assert_eq!(loaded, document);
        assert_eq!(loaded.config.get("cadWidth"), Some(&json!(500)));
    }

    #[test]
    fn test_persist_then_load_keeps_awkward_floats() {
        let dir = tempdir().unwrap();
        let overrides: Overrides = json!({
            "roughness": 3.9440133835633677e-4,
            "metalness": 0.1 + 0.2,
            "directIntensity": 1.0 / 3.0
        })
        .as_object()
        .cloned()
        .unwrap();
        let document = ViewerDocument::new(
            "floats",
            json!({ "parts": [{ "shape": { "vertices": [0.7071067811865476, -1e-300, 123456.789e-7] } }] }),
            DisplayConfig::defaults().merge(&overrides),
        );

        let loaded = ViewerDocument::load(&document.persist(dir.path()).unwrap()).unwrap();
        assert_eq!(loaded.config, document.config);
        assert_eq!(loaded.model, document.model);
    }

    #[test]
    fn test_persist_creates_directory() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("debug").join("models");

        sample().persist(&nested).unwrap();
        assert!(nested.join("box.json").exists());
    }

    #[test]
    fn test_load_rejects_invalid_json() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = ViewerDocument::load(&path).unwrap_err();
        assert!(matches!(err, PersistError::Json { .. }));
    }
}
