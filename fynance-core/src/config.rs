//! Configuration management
//!
//! Settings live in `settings.json` inside the data directory:
//! ```json
//! {
//!   "app": { "demoMode": false },
//!   "ledger": { "defaultInvestmentCategory": "Investment", "defaultCategoryIcon": "trending-up" }
//! }
//! ```
//! Unknown keys are preserved when saving.

use std::collections::HashMap;
use std::path::Path;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::services::DefaultCategory;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SettingsFile {
    #[serde(default)]
    app: AppSettings,
    #[serde(default)]
    ledger: LedgerSettings,
    #[serde(flatten)]
    other: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AppSettings {
    #[serde(default)]
    demo_mode: bool,
    #[serde(flatten)]
    other: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LedgerSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    default_investment_category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    default_category_icon: Option<String>,
    #[serde(flatten)]
    other: HashMap<String, serde_json::Value>,
}

/// Fynance configuration (simplified view of settings)
#[derive(Debug, Clone)]
pub struct Config {
    pub demo_mode: bool,
    /// Category used for investment movements when none is given
    pub default_investment_category: String,
    pub default_category_icon: Option<String>,
    // Keep the raw settings for preservation when saving
    _raw_settings: SettingsFile,
}

impl Default for Config {
    fn default() -> Self {
        let default_category = DefaultCategory::default();
        Self {
            demo_mode: false,
            default_investment_category: default_category.name,
            default_category_icon: default_category.icon,
            _raw_settings: SettingsFile::default(),
        }
    }
}

/// Interpret a boolean environment value, `None` when unset or unrecognized
fn parse_flag(value: Option<&str>) -> Option<bool> {
    match value?.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

impl Config {
    /// Load config from the data directory
    ///
    /// Environment overrides (for CI/testing):
    /// - `FYNANCE_DEMO_MODE`
    /// - `FYNANCE_DEFAULT_INVESTMENT_CATEGORY`
    pub fn load(data_dir: &Path) -> Result<Self> {
        let mut config = Self::load_file(data_dir)?;

        if let Some(demo) = parse_flag(std::env::var("FYNANCE_DEMO_MODE").ok().as_deref()) {
            config.demo_mode = demo;
        }
        if let Ok(name) = std::env::var("FYNANCE_DEFAULT_INVESTMENT_CATEGORY") {
            if !name.trim().is_empty() {
                config.default_investment_category = name.trim().to_string();
            }
        }
        Ok(config)
    }

    /// Settings file only, no environment overrides
    fn load_file(data_dir: &Path) -> Result<Self> {
        let settings_path = data_dir.join("settings.json");

        let raw: SettingsFile = if settings_path.exists() {
            let content = std::fs::read_to_string(&settings_path)?;
            match serde_json::from_str(&content) {
                Ok(raw) => raw,
                Err(e) => {
                    log::warn!("ignoring unreadable {}: {}", settings_path.display(), e);
                    SettingsFile::default()
                }
            }
        } else {
            SettingsFile::default()
        };

        let defaults = DefaultCategory::default();
        Ok(Self {
            demo_mode: raw.app.demo_mode,
            default_investment_category: raw
                .ledger
                .default_investment_category
                .clone()
                .map(|n| n.trim().to_string())
                .filter(|n| !n.is_empty())
                .unwrap_or(defaults.name),
            default_category_icon: raw.ledger.default_category_icon.clone().or(defaults.icon),
            _raw_settings: raw,
        })
    }

    /// Save config to the data directory, preserving settings we don't manage
    pub fn save(&self, data_dir: &Path) -> Result<()> {
        let settings_path = data_dir.join("settings.json");

        let mut settings = if settings_path.exists() {
            let content = std::fs::read_to_string(&settings_path)?;
            serde_json::from_str::<SettingsFile>(&content).unwrap_or_default()
        } else {
            self._raw_settings.clone()
        };

        settings.app.demo_mode = self.demo_mode;
        settings.ledger.default_investment_category = Some(self.default_investment_category.clone());
        settings.ledger.default_category_icon = self.default_category_icon.clone();

        std::fs::create_dir_all(data_dir)?;
        let content = serde_json::to_string_pretty(&settings)?;
        std::fs::write(&settings_path, content)?;
        Ok(())
    }

    /// Default category settings handed to the movement service
    pub fn default_category(&self) -> DefaultCategory {
        DefaultCategory {
            name: self.default_investment_category.clone(),
            icon: self.default_category_icon.clone(),
        }
    }

    pub fn enable_demo_mode(&mut self) {
        self.demo_mode = true;
    }

    pub fn disable_demo_mode(&mut self) {
        self.demo_mode = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults_without_settings_file() {
        let dir = tempdir().unwrap();
        let config = Config::load_file(dir.path()).unwrap();
        assert!(!config.demo_mode);
        assert_eq!(config.default_investment_category, "Investment");
        assert_eq!(config.default_category_icon.as_deref(), Some("trending-up"));
    }

    #[test]
    fn test_save_preserves_unknown_keys() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join("settings.json"),
            r#"{"app": {"demoMode": false, "theme": "dark"}, "plugins": {"x": 1},
               "ledger": {"defaultInvestmentCategory": "Investimentos"}}"#,
        )
        .unwrap();

        let mut config = Config::load_file(dir.path()).unwrap();
        assert_eq!(config.default_investment_category, "Investimentos");
        config.enable_demo_mode();
        config.save(dir.path()).unwrap();

        let saved: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(dir.path().join("settings.json")).unwrap())
                .unwrap();
        assert_eq!(saved["app"]["demoMode"], true);
        assert_eq!(saved["app"]["theme"], "dark");
        assert_eq!(saved["plugins"]["x"], 1);
        assert_eq!(saved["ledger"]["defaultInvestmentCategory"], "Investimentos");
    }

    #[test]
    fn test_parse_flag() {
        assert_eq!(parse_flag(Some("YES")), Some(true));
        assert_eq!(parse_flag(Some("0")), Some(false));
        assert_eq!(parse_flag(Some("maybe")), None);
        assert_eq!(parse_flag(None), None);
    }

    #[test]
    fn test_unreadable_settings_fall_back_to_defaults() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("settings.json"), "{not json").unwrap();
        let config = Config::load_file(dir.path()).unwrap();
        assert!(!config.demo_mode);
    }
}
