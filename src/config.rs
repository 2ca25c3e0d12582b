//! Server configuration, loaded from an optional TOML file with defaults.

use std::path::Path;

use serde::Deserialize;
use tracing::warn;

pub const DEFAULT_CONFIG_PATH: &str = "elderscape.toml";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP bind port
    pub port: u16,
    /// SQLite connection string
    pub database_url: String,
    /// Directory holding NPC content JSON files
    pub data_dir: String,
    /// Seconds between player-state persistence sweeps
    pub autosave_interval_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 3000,
            database_url: "sqlite:elderscape.db?mode=rwc".to_string(),
            data_dir: "data".to_string(),
            autosave_interval_secs: 30,
        }
    }
}

impl Config {
    /// Load from a TOML file, falling back to defaults when the file is
    /// missing. A malformed file is an error rather than a silent default.
    pub fn load(path: &Path) -> Result<Self, String> {
        if !path.exists() {
            warn!("Config file {:?} not found, using defaults", path);
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config {:?}: {}", path, e))?;

        toml::from_str(&content).map_err(|e| format!("Failed to parse config {:?}: {}", path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_uses_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config = Config::load(&temp_dir.path().join("nope.toml")).unwrap();
        assert_eq!(config.port, 3000);
        assert_eq!(config.data_dir, "data");
    }

    #[test]
    fn test_partial_file_keeps_defaults_for_rest() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("elderscape.toml");
        std::fs::write(&path, "port = 8080\n").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.autosave_interval_secs, 30);
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("elderscape.toml");
        std::fs::write(&path, "port = \"not a number").unwrap();
        assert!(Config::load(&path).is_err());
    }
}
