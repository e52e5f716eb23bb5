use anyhow::{Context, Result};
use cadshot_capture::{DisplayConfig, Overrides, ProcessLoaderOptions};
use cadshot_vision::RenderOptions;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_NAME: &str = "cadshot.config.json";

/// Cadshot configuration file format
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Viewer application: a directory, an HTML file, or a URL
    #[serde(default = "default_viewer")]
    pub viewer: String,

    /// Display options layered over the built-in viewer defaults
    #[serde(default)]
    pub defaults: Overrides,

    /// Interpreter command per script extension
    #[serde(default = "default_interpreters")]
    pub interpreters: HashMap<String, Vec<String>>,

    /// Environment variable extended with each script's directory
    #[serde(default = "default_search_path_var")]
    pub search_path_var: Option<String>,

    /// External geometry exporter command; geometry is passed through when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exporter: Option<Vec<String>>,

    #[serde(default = "default_init_timeout_ms")]
    pub init_timeout_ms: u64,

    #[serde(default = "default_ready_timeout_ms")]
    pub ready_timeout_ms: u64,

    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script_timeout_ms: Option<u64>,
}

fn default_viewer() -> String {
    "viewer".to_string()
}

fn default_interpreters() -> HashMap<String, Vec<String>> {
    ProcessLoaderOptions::default().interpreters
}

fn default_search_path_var() -> Option<String> {
    ProcessLoaderOptions::default().search_path_var
}

fn default_init_timeout_ms() -> u64 {
    10_000
}

fn default_ready_timeout_ms() -> u64 {
    30_000
}

fn default_settle_ms() -> u64 {
    500
}

impl Config {
    /// Load the config given on the command line, or `cadshot.config.json`
    /// from `cwd` when present. An explicitly named file must exist.
    pub fn load(cwd: &Path, explicit: Option<&Path>) -> Result<Self> {
        let (config_path, required) = match explicit {
            Some(path) => (cwd.join(path), true),
            None => (cwd.join(DEFAULT_CONFIG_NAME), false),
        };

        if !config_path.exists() {
            if required {
                anyhow::bail!("Config file does not exist: {}", config_path.display());
            }
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Cannot read {}", config_path.display()))?;
        let config: Config = serde_json::from_str(&content)
            .with_context(|| format!("Invalid config {}", config_path.display()))?;
        Ok(config)
    }

    /// Built-in defaults with the configured `defaults` layered on top.
    pub fn display_defaults(&self) -> DisplayConfig {
        DisplayConfig::defaults().merge(&self.defaults)
    }

    pub fn loader_options(&self) -> ProcessLoaderOptions {
        ProcessLoaderOptions {
            interpreters: self.interpreters.clone(),
            search_path_var: self.search_path_var.clone(),
            timeout: self.script_timeout_ms.map(Duration::from_millis),
        }
    }

    pub fn render_options(&self, pause: bool) -> RenderOptions {
        RenderOptions {
            init_timeout: Duration::from_millis(self.init_timeout_ms),
            ready_timeout: Duration::from_millis(self.ready_timeout_ms),
            settle: Duration::from_millis(self.settle_ms),
            pause,
            ..RenderOptions::default()
        }
    }

    /// Viewer location, resolved against `cwd` when it is a relative path.
    pub fn viewer_location(&self, cwd: &Path, override_location: Option<&str>) -> String {
        let location = override_location.unwrap_or(&self.viewer);
        if location.contains("://") {
            return location.to_string();
        }
        let path = PathBuf::from(location);
        if path.is_absolute() {
            location.to_string()
        } else {
            cwd.join(path).display().to_string()
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            viewer: default_viewer(),
            defaults: Overrides::new(),
            interpreters: default_interpreters(),
            search_path_var: default_search_path_var(),
            exporter: None,
            init_timeout_ms: default_init_timeout_ms(),
            ready_timeout_ms: default_ready_timeout_ms(),
            settle_ms: default_settle_ms(),
            script_timeout_ms: None,
        }
    }
}
