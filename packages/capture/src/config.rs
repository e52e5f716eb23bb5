//! Viewer display configuration and the defaults/overrides merge

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Per-model display overrides, keyed by viewer option name (e.g. `cadWidth`).
pub type Overrides = Map<String, Value>;

pub const DEFAULT_WIDTH: u32 = 1200;
pub const DEFAULT_HEIGHT: u32 = 800;

/// Complete set of viewer options sent alongside a model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DisplayConfig(Map<String, Value>);

impl DisplayConfig {
    /// Built-in viewer defaults.
    pub fn defaults() -> Self {
        let value = json!({
            // Display
            "cadWidth": DEFAULT_WIDTH,
            "height": DEFAULT_HEIGHT,
            "treeWidth": 0,
            "theme": "light",
            "glass": true,
            "tools": false,
            // Render
            "ambientIntensity": 1.0,
            "directIntensity": 1.1,
            "metalness": 0.3,
            "roughness": 0.65,
            "edgeColor": 0x707070,
            // Viewer
            "ortho": true,
            "control": "trackball",
            "up": "Z",
        });

        match value {
            Value::Object(map) => Self(map),
            _ => Self(Map::new()),
        }
    }

    pub fn from_map(map: Map<String, Value>) -> Self {
        Self(map)
    }

    /// Shallow key-wise merge: keys in `overrides` win, everything else keeps
    /// its value from `self`. `self` is left untouched.
    pub fn merge(&self, overrides: &Overrides) -> DisplayConfig {
        let mut merged = self.0.clone();
        for (key, value) in overrides {
            merged.insert(key.clone(), value.clone());
        }
        DisplayConfig(merged)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Viewport width, falling back to [`DEFAULT_WIDTH`] when absent or not a
    /// positive integer.
    pub fn width(&self) -> u32 {
        self.dimension("cadWidth").unwrap_or(DEFAULT_WIDTH)
    }

    /// Viewport height, falling back to [`DEFAULT_HEIGHT`].
    pub fn height(&self) -> u32 {
        self.dimension("height").unwrap_or(DEFAULT_HEIGHT)
    }

    fn dimension(&self, key: &str) -> Option<u32> {
        let value = self.0.get(key)?;
        let pixels = value
            .as_u64()
            .or_else(|| value.as_f64().filter(|v| *v >= 1.0).map(|v| v.round() as u64))?;
        u32::try_from(pixels).ok().filter(|p| *p > 0)
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self::defaults()
    }
}
