// Configuration management for the beacon CLI
//
// Cross-platform config stored in:
// - macOS: ~/Library/Application Support/beacon-scan/config.json
// - Linux: ~/.config/beacon-scan/config.json
// - Windows: %APPDATA%\beacon-scan\config.json

use anyhow::{Context, Result};
use beacon_core::{MockConfig, ScanConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Scan session settings used by `replay`
    pub scan: ScanConfig,

    /// Mock generator settings used by `simulate`
    pub mock: MockConfig,

    /// Directory for daily rolling log files; stderr only when unset
    pub log_dir: Option<String>,
}

impl Config {
    /// Get the config directory path (cross-platform)
    pub fn config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to determine config directory")?
            .join("beacon-scan");

        std::fs::create_dir_all(&config_dir).context("Failed to create config directory")?;

        Ok(config_dir)
    }

    /// Get the config file path
    pub fn config_file() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.json"))
    }

    /// Load config from file, or create default if not exists
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_file()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path).context("Failed to read config file")?;
            let config: Config =
                serde_json::from_str(&contents).context("Failed to parse config file")?;
            config.validate()?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save_to(path)?;
            Ok(config)
        }
    }

    /// Save config to file
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_file()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        let contents = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, contents).context("Failed to write config file")?;
        Ok(())
    }

    /// Restore defaults and persist them. Never reads the existing file, so a
    /// broken config can always be repaired.
    pub fn reset() -> Result<Self> {
        let config = Config::default();
        config.save()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.scan.validate().context("Invalid scan settings")?;
        self.mock.validate().context("Invalid mock settings")?;
        Ok(())
    }

    /// Set a dotted config key, validate the result and save it
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let mut updated = self.clone();
        updated.apply(key, value)?;
        updated.validate()?;
        updated.save()?;
        *self = updated;
        Ok(())
    }

    fn apply(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "scan.scan_window_ms" => self.scan.scan_window_ms = parse(key, value)?,
            "scan.cooldown_ms" => self.scan.cooldown_ms = parse(key, value)?,
            "scan.notify_interval_ms" => self.scan.notify_interval_ms = parse(key, value)?,
            "scan.clear_registry_on_start" => {
                self.scan.clear_registry_on_start = parse(key, value)?
            }
            "scan.clear_registry_on_stop" => self.scan.clear_registry_on_stop = parse(key, value)?,
            "scan.stale_after_ms" => self.scan.stale_after_ms = parse_optional(key, value)?,
            "mock.tick_min_ms" => self.mock.tick_min_ms = parse(key, value)?,
            "mock.tick_max_ms" => self.mock.tick_max_ms = parse(key, value)?,
            "mock.max_updates_per_tick" => self.mock.max_updates_per_tick = parse(key, value)?,
            "mock.rssi_step_dbm" => self.mock.rssi_step_dbm = parse(key, value)?,
            "mock.rssi_floor_dbm" => self.mock.rssi_floor_dbm = parse(key, value)?,
            "mock.rssi_ceiling_dbm" => self.mock.rssi_ceiling_dbm = parse(key, value)?,
            "mock.spawn_probability" => self.mock.spawn_probability = parse(key, value)?,
            "mock.remove_probability" => self.mock.remove_probability = parse(key, value)?,
            "mock.max_beacons" => self.mock.max_beacons = parse(key, value)?,
            "mock.min_beacons" => self.mock.min_beacons = parse(key, value)?,
            "mock.mirror_removals" => self.mock.mirror_removals = parse(key, value)?,
            "mock.seed" => self.mock.seed = parse_optional(key, value)?,
            "log_dir" => {
                self.log_dir = if value.is_empty() {
                    None
                } else {
                    Some(value.to_string())
                };
            }
            _ => anyhow::bail!("Unknown config key: {}", key),
        }
        Ok(())
    }

    /// List all config values
    pub fn list(&self) -> Vec<(String, String)> {
        let optional = |v: Option<u64>| v.map_or_else(|| "(none)".to_string(), |v| v.to_string());

        vec![
            ("scan.scan_window_ms".to_string(), self.scan.scan_window_ms.to_string()),
            ("scan.cooldown_ms".to_string(), self.scan.cooldown_ms.to_string()),
            ("scan.notify_interval_ms".to_string(), self.scan.notify_interval_ms.to_string()),
            (
                "scan.clear_registry_on_start".to_string(),
                self.scan.clear_registry_on_start.to_string(),
            ),
            (
                "scan.clear_registry_on_stop".to_string(),
                self.scan.clear_registry_on_stop.to_string(),
            ),
            ("scan.stale_after_ms".to_string(), optional(self.scan.stale_after_ms)),
            ("mock.tick_min_ms".to_string(), self.mock.tick_min_ms.to_string()),
            ("mock.tick_max_ms".to_string(), self.mock.tick_max_ms.to_string()),
            (
                "mock.max_updates_per_tick".to_string(),
                self.mock.max_updates_per_tick.to_string(),
            ),
            ("mock.rssi_step_dbm".to_string(), self.mock.rssi_step_dbm.to_string()),
            ("mock.rssi_floor_dbm".to_string(), self.mock.rssi_floor_dbm.to_string()),
            ("mock.rssi_ceiling_dbm".to_string(), self.mock.rssi_ceiling_dbm.to_string()),
            ("mock.spawn_probability".to_string(), self.mock.spawn_probability.to_string()),
            ("mock.remove_probability".to_string(), self.mock.remove_probability.to_string()),
            ("mock.max_beacons".to_string(), self.mock.max_beacons.to_string()),
            ("mock.min_beacons".to_string(), self.mock.min_beacons.to_string()),
            ("mock.mirror_removals".to_string(), self.mock.mirror_removals.to_string()),
            ("mock.seed".to_string(), optional(self.mock.seed)),
            (
                "log_dir".to_string(),
                self.log_dir.clone().unwrap_or_else(|| "(stderr only)".to_string()),
            ),
        ]
    }
}

fn parse<T>(key: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .trim()
        .parse()
        .with_context(|| format!("Invalid value for {}: {}", key, value))
}

/// Empty or "none" clears the value
fn parse_optional<T>(key: &str, value: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let value = value.trim();
    if value.is_empty() || value.eq_ignore_ascii_case("none") {
        Ok(None)
    } else {
        parse(key, value).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.scan.scan_window_ms, 10_000);
        assert_eq!(config.mock.max_beacons, 10);
        assert!(config.log_dir.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let json = serde_json::to_string(&config).unwrap();
        let deserialized: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(config, deserialized);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"scan": {"cooldown_ms": 0}}"#).unwrap();
        assert_eq!(config.scan.cooldown_ms, 0);
        assert_eq!(config.scan.scan_window_ms, 10_000);
        assert_eq!(config.mock, MockConfig::default());
    }

    #[test]
    fn test_apply_dotted_keys() {
        let mut config = Config::default();
        config.apply("scan.cooldown_ms", "500").unwrap();
        config.apply("scan.stale_after_ms", "30000").unwrap();
        config.apply("mock.rssi_floor_dbm", "-100").unwrap();
        config.apply("mock.seed", "42").unwrap();
        config.apply("log_dir", "/tmp/beacon-logs").unwrap();

        assert_eq!(config.scan.cooldown_ms, 500);
        assert_eq!(config.scan.stale_after_ms, Some(30_000));
        assert_eq!(config.mock.rssi_floor_dbm, -100);
        assert_eq!(config.mock.seed, Some(42));
        assert_eq!(config.log_dir.as_deref(), Some("/tmp/beacon-logs"));

        config.apply("mock.seed", "none").unwrap();
        assert_eq!(config.mock.seed, None);
    }

    #[test]
    fn test_apply_rejects_unknown_and_malformed() {
        let mut config = Config::default();
        assert!(config.apply("scan.unknown", "1").is_err());
        assert!(config.apply("scan.cooldown_ms", "soon").is_err());
        assert!(config.apply("mock.mirror_removals", "maybe").is_err());
    }

    #[test]
    fn test_validation_catches_bad_combination() {
        let mut config = Config::default();
        config.apply("mock.tick_min_ms", "5000").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_list_covers_every_key() {
        let config = Config::default();
        for (key, _) in config.list() {
            let mut copy = config.clone();
            let current = config
                .list()
                .into_iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v)
                .unwrap();
            let value = match current.as_str() {
                "(none)" | "(stderr only)" => "",
                other => other,
            };
            copy.apply(&key, value).unwrap();
            assert_eq!(copy, config, "round trip failed for {}", key);
        }
    }

    #[test]
    fn test_invalid_file_rejected_and_overwritten_by_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"scan": {"scan_window_ms": 0}}"#).unwrap();

        let err = Config::load_from(&path).unwrap_err();
        assert!(format!("{:#}", err).contains("scan_window_ms"));

        Config::default().save_to(&path).unwrap();
        assert_eq!(Config::load_from(&path).unwrap(), Config::default());
    }

    #[test]
    fn test_missing_file_created_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        assert_eq!(Config::load_from(&path).unwrap(), Config::default());
        assert!(path.exists());
    }
}
