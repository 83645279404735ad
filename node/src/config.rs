//! Delegate registry with TOML file support.

use serde::{Deserialize, Serialize};
use tbw_types::DelegateConfig;

use crate::NodeError;

/// The daemon's configuration file: logging settings plus one
/// `[[delegate]]` table per delegate to operate.
///
/// Can be loaded from a TOML file via [`DelegateRegistry::from_toml_file`]
/// or built programmatically (e.g. for tests).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DelegateRegistry {
    /// Log format: "human" or "json".
    #[serde(default = "default_log_format")]
    pub log_format: String,

    /// Log level filter: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default, rename = "delegate")]
    pub delegates: Vec<DelegateConfig>,
}

// ── Serde default helpers ──────────────────────────────────────────────

fn default_log_format() -> String {
    "human".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

// ── Impl ───────────────────────────────────────────────────────────────

impl DelegateRegistry {
    /// Load the registry from a TOML file.
    pub fn from_toml_file(path: &str) -> Result<Self, NodeError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| NodeError::Config(e.to_string()))?;
        Self::from_toml_str(&content)
    }

    /// Parse the registry from a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self, NodeError> {
        let registry: Self = toml::from_str(s).map_err(|e| NodeError::Config(e.to_string()))?;
        registry.validate()?;
        Ok(registry)
    }

    /// The configuration for one delegate, by username.
    pub fn delegate(&self, name: &str) -> Result<&DelegateConfig, NodeError> {
        self.delegates
            .iter()
            .find(|d| d.name == name)
            .ok_or_else(|| NodeError::UnknownDelegate(name.to_string()))
    }

    fn validate(&self) -> Result<(), NodeError> {
        for delegate in &self.delegates {
            delegate
                .validate()
                .map_err(|e| NodeError::Config(format!("delegate {}: {e}", delegate.name)))?;
        }
        let mut names: Vec<&str> = self.delegates.iter().map(|d| d.name.as_str()).collect();
        names.sort_unstable();
        names.dedup();
        if names.len() != self.delegates.len() {
            return Err(NodeError::Config("duplicate delegate names".to_string()));
        }
        Ok(())
    }
}
