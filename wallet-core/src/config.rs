//! Configuration management
//!
//! Settings live in `settings.json` inside the wallet directory:
//! ```json
//! {
//!   "app": { "defaultUser": "…uuid…", "maxSettlementRetries": 5 }
//! }
//! ```
//! Keys the CLI doesn't manage are preserved on save.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Default number of optimistic settlement attempts before giving up
pub const DEFAULT_MAX_SETTLEMENT_RETRIES: u32 = 5;

/// Raw settings.json structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SettingsFile {
    #[serde(default)]
    app: AppSettings,
    #[serde(flatten)]
    other: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AppSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    default_user: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    max_settlement_retries: Option<u32>,
    #[serde(flatten)]
    other: HashMap<String, serde_json::Value>,
}

/// Wallet configuration (simplified view of settings)
#[derive(Debug, Clone)]
pub struct Config {
    /// Account used by the CLI when `WALLET_USER` is not set
    pub default_user: Option<Uuid>,
    /// How many times a settlement is re-read and retried after a conflict
    pub max_settlement_retries: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_user: None,
            max_settlement_retries: DEFAULT_MAX_SETTLEMENT_RETRIES,
        }
    }
}

impl Config {
    /// Load config from the wallet directory
    ///
    /// `WALLET_MAX_SETTLEMENT_RETRIES` overrides the file (for CI/testing).
    pub fn load(wallet_dir: &Path) -> Result<Self> {
        let raw = read_settings(wallet_dir)?;

        let max_settlement_retries = match std::env::var("WALLET_MAX_SETTLEMENT_RETRIES") {
            Ok(value) => value
                .trim()
                .parse::<u32>()
                .with_context(|| format!("Invalid WALLET_MAX_SETTLEMENT_RETRIES: {}", value))?,
            Err(_) => raw
                .app
                .max_settlement_retries
                .unwrap_or(DEFAULT_MAX_SETTLEMENT_RETRIES),
        };

        Ok(Self {
            default_user: raw.app.default_user,
            max_settlement_retries: max_settlement_retries.max(1),
        })
    }

    /// Save config to the wallet directory, keeping unmanaged keys
    pub fn save(&self, wallet_dir: &Path) -> Result<()> {
        let mut settings = read_settings(wallet_dir)?;

        settings.app.default_user = self.default_user;
        settings.app.max_settlement_retries = Some(self.max_settlement_retries);

        let content = serde_json::to_string_pretty(&settings)?;
        std::fs::write(wallet_dir.join("settings.json"), content)?;
        Ok(())
    }
}

fn read_settings(wallet_dir: &Path) -> Result<SettingsFile> {
    let settings_path = wallet_dir.join("settings.json");
    if !settings_path.exists() {
        return Ok(SettingsFile::default());
    }
    let content = std::fs::read_to_string(&settings_path)
        .with_context(|| format!("Failed to read {:?}", settings_path))?;
    Ok(serde_json::from_str(&content).unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempdir().unwrap();
        let config = Config::load(dir.path()).unwrap();
        assert!(config.default_user.is_none());
        assert!(config.max_settlement_retries >= 1);
    }

    #[test]
    fn test_save_preserves_unknown_keys() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join("settings.json"),
            r#"{"app":{"theme":"dark"},"plugins":{"x":1}}"#,
        )
        .unwrap();

        let user = Uuid::new_v4();
        let mut config = Config::load(dir.path()).unwrap();
        config.default_user = Some(user);
        config.save(dir.path()).unwrap();

        let raw: serde_json::Value = serde_json::from_str(
            &std::fs::read_to_string(dir.path().join("settings.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(raw["app"]["theme"], "dark");
        assert_eq!(raw["plugins"]["x"], 1);
        assert_eq!(raw["app"]["defaultUser"], user.to_string());

        let reloaded = Config::load(dir.path()).unwrap();
        assert_eq!(reloaded.default_user, Some(user));
    }

    #[test]
    fn test_corrupt_file_falls_back_to_defaults() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("settings.json"), "{not json").unwrap();
        let config = Config::load(dir.path()).unwrap();
        assert!(config.default_user.is_none());
    }
}
