//! Panel configuration.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PanelConfig {
    /// Profile key holding the boot list.
    pub boot_list_key: String,
    /// Profile key holding the "window was open at exit" flag.
    pub window_state_key: String,
    /// Caption of the boot list's root row.
    pub boot_list_caption: String,
    /// Help topic shown when the focused row has none of its own.
    pub default_info_topic: String,
}

impl Default for PanelConfig {
    fn default() -> Self {
        Self {
            boot_list_key: "Addins/BootList".to_string(),
            window_state_key: "Panel/WndOpened".to_string(),
            boot_list_caption: "User addins".to_string(),
            default_info_topic: "core/first-steps.html".to_string(),
        }
    }
}

impl PanelConfig {
    /// Reads a config file; keys it doesn't mention keep their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .context(format!("Failed to read config: {:?}", path))?;
        let config = serde_json::from_str(&content)
            .context(format!("Failed to parse config: {:?}", path))?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("panel.json");
        fs::write(&path, r#"{ "boot_list_key": "Custom/Boot" }"#).unwrap();

        let config = PanelConfig::from_json_file(&path).unwrap();
        assert_eq!(config.boot_list_key, "Custom/Boot");
        assert_eq!(config.window_state_key, PanelConfig::default().window_state_key);
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(PanelConfig::from_json_file(&dir.path().join("nope.json")).is_err());
    }
}
