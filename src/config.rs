//! Typed auth configuration. Each pluggable category is selected by a named
//! entry; its options are parsed into the plugin's own struct when the plugin is built.

use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{AuthError, AuthResult};

pub const DEFAULT_CHECKER_PLUGIN: &str = "defaultAuthChecker";
pub const DEFAULT_USER_PLUGIN: &str = "defaultUser";
pub const DEFAULT_STRATEGY_PLUGIN: &str = "defaultStrategy";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginEntry {
    pub name: String,
    #[serde(default)]
    pub options: serde_json::Map<String, serde_json::Value>,
}

impl PluginEntry {
    pub fn named(name: &str) -> Self {
        Self { name: name.to_string(), options: serde_json::Map::new() }
    }

    pub fn with_option(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.options.insert(key.to_string(), value.into());
        self
    }

    /// Parse options into the plugin's typed struct. Unknown keys and wrong
    /// types are rejected here rather than at first use.
    pub fn parse_options<T: DeserializeOwned>(&self) -> AuthResult<T> {
        serde_json::from_value(serde_json::Value::Object(self.options.clone()))
            .map_err(|e| AuthError::validation(format!("plugin '{}' options: {}", self.name, e)))
    }

    fn default_checker() -> Self { Self::named(DEFAULT_CHECKER_PLUGIN) }
    fn default_user() -> Self { Self::named(DEFAULT_USER_PLUGIN) }
    fn default_strategy() -> Self { Self::named(DEFAULT_STRATEGY_PLUGIN) }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// JSON snapshot written after every write and read back on start.
    #[serde(default)]
    pub snapshot_path: Option<PathBuf>,
    /// Reload the snapshot file on this interval.
    #[serde(default)]
    pub refresh_interval_ms: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuthConfig {
    #[serde(default = "PluginEntry::default_checker")]
    pub checker: PluginEntry,
    #[serde(default = "PluginEntry::default_user")]
    pub user: PluginEntry,
    #[serde(default = "PluginEntry::default_strategy")]
    pub strategy: PluginEntry,
    #[serde(default)]
    pub storage: StorageConfig,
    /// JSON-lines audit file; audit goes to the log when unset.
    #[serde(default)]
    pub audit_log: Option<PathBuf>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            checker: PluginEntry::default_checker(),
            user: PluginEntry::default_user(),
            strategy: PluginEntry::default_strategy(),
            storage: StorageConfig::default(),
            audit_log: None,
        }
    }
}

impl AuthConfig {
    pub fn from_json(text: &str) -> AuthResult<Self> {
        let cfg: AuthConfig = serde_json::from_str(text)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn load(path: impl AsRef<Path>) -> AuthResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| AuthError::validation(format!("cannot read config '{}': {}", path.display(), e)))?;
        Self::from_json(&text)
    }

    pub fn validate(&self) -> AuthResult<()> {
        for (kind, entry) in [("checker", &self.checker), ("user", &self.user), ("strategy", &self.strategy)] {
            if entry.name.trim().is_empty() {
                return Err(AuthError::validation(format!("{} plugin name must not be empty", kind)));
            }
        }
        if self.storage.refresh_interval_ms.is_some() && self.storage.snapshot_path.is_none() {
            return Err(AuthError::validation("storage.refresh_interval_ms requires storage.snapshot_path"));
        }
        if self.storage.refresh_interval_ms == Some(0) {
            return Err(AuthError::validation("storage.refresh_interval_ms must be positive"));
        }
        Ok(())
    }
}
