//! Configuration management with file persistence

use anyhow::{Context, anyhow};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::domain::keys::{RetrieveQueryParams, SortField};
use crate::storage::{DatabaseConfig, database::DEFAULT_MAX_CONNECTIONS, default_database_path};

/// Environment variable overriding the config directory
pub const CONFIG_DIR_ENV: &str = "KEYHOLD_CONFIG_DIR";

/// Environment variable overriding the database path
pub const DATABASE_ENV: &str = "KEYHOLD_DATABASE";

/// Keyhold configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseSettings,
    #[serde(default)]
    pub keys: KeySettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    /// Database file; the platform data directory when unset
    pub path: Option<PathBuf>,
    pub max_connections: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeySettings {
    /// Listing order when a request names none: `name` or `type`
    pub default_sort: String,
    /// `asc` or `desc`
    pub default_order: String,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            path: None,
            max_connections: DEFAULT_MAX_CONNECTIONS,
        }
    }
}

impl Default for KeySettings {
    fn default() -> Self {
        Self {
            default_sort: "name".to_string(),
            default_order: "asc".to_string(),
        }
    }
}

impl Config {
    /// Get the config directory path
    pub fn config_dir() -> anyhow::Result<PathBuf> {
        let dir = if let Ok(custom_dir) = env::var(CONFIG_DIR_ENV) {
            PathBuf::from(custom_dir)
        } else {
            dirs::config_dir()
                .ok_or_else(|| anyhow!("Could not determine config directory"))?
                .join("keyhold")
        };
        Ok(dir)
    }

    /// Get the config file path
    pub fn config_path() -> anyhow::Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load configuration from the default location
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load configuration from `path`, or defaults if it doesn't exist
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Config::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to the default location
    pub fn save(&self) -> anyhow::Result<()> {
        self.save_to(&Self::config_path()?)
    }

    /// Save configuration to `path`
    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        self.validate()?;

        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create config directory: {}", dir.display()))?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.database.max_connections == 0 {
            return Err(anyhow!("database.max_connections must be at least 1"));
        }
        if SortField::parse(&self.keys.default_sort).is_none() {
            return Err(anyhow!(
                "Invalid keys.default_sort: {}. Valid options: name, type",
                self.keys.default_sort
            ));
        }
        if !["asc", "desc"].contains(&self.keys.default_order.as_str()) {
            return Err(anyhow!(
                "Invalid keys.default_order: {}. Valid options: asc, desc",
                self.keys.default_order
            ));
        }
        Ok(())
    }

    /// Resolved database path: `KEYHOLD_DATABASE`, then the config file, then the default
    pub fn database_path(&self) -> PathBuf {
        env::var_os(DATABASE_ENV)
            .map(PathBuf::from)
            .or_else(|| self.database.path.clone())
            .unwrap_or_else(default_database_path)
    }

    /// Database connection settings
    pub fn database_config(&self) -> DatabaseConfig {
        DatabaseConfig::with_path(self.database_path()).max_connections(self.database.max_connections)
    }

    /// Listing parameters, filling in configured defaults for anything not given
    pub fn query_params(&self, sort: Option<&str>, order: Option<&str>) -> RetrieveQueryParams {
        RetrieveQueryParams::from_query(
            Some(sort.unwrap_or(self.keys.default_sort.as_str())),
            Some(order.unwrap_or(self.keys.default_order.as_str())),
        )
    }

    /// Get a configuration value by key
    pub fn get(&self, key: &str) -> anyhow::Result<String> {
        match key {
            "database.path" => Ok(self.database_path().display().to_string()),
            "database.max_connections" => Ok(self.database.max_connections.to_string()),
            "keys.default_sort" => Ok(self.keys.default_sort.clone()),
            "keys.default_order" => Ok(self.keys.default_order.clone()),
            _ => Err(anyhow!(
                "Unknown configuration key: {}. Use `keyhold config list` to see available keys.",
                key
            )),
        }
    }

    /// Set a configuration value by key
    pub fn set(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        match key {
            "database.path" => {
                self.database.path = Some(PathBuf::from(value));
            }
            "database.max_connections" => {
                let max: u32 = value
                    .parse()
                    .with_context(|| format!("Invalid max_connections value: {}", value))?;
                if max == 0 {
                    return Err(anyhow!("max_connections must be at least 1"));
                }
                self.database.max_connections = max;
            }
            "keys.default_sort" => {
                if SortField::parse(value).is_none() {
                    return Err(anyhow!("Invalid sort field: {}. Valid options: name, type", value));
                }
                self.keys.default_sort = value.to_string();
            }
            "keys.default_order" => {
                if !["asc", "desc"].contains(&value) {
                    return Err(anyhow!("Invalid order: {}. Valid options: asc, desc", value));
                }
                self.keys.default_order = value.to_string();
            }
            _ => {
                return Err(anyhow!(
                    "Unknown configuration key: {}. Use `keyhold config list` to see available keys.",
                    key
                ));
            }
        }
        Ok(())
    }

    /// List all configuration keys and values
    pub fn list(&self) -> Vec<(&'static str, String)> {
        Self::KEYS
            .iter()
            .filter_map(|key| self.get(key).ok().map(|value| (*key, value)))
            .collect()
    }

    const KEYS: [&'static str; 4] = [
        "database.path",
        "database.max_connections",
        "keys.default_sort",
        "keys.default_order",
    ];
}
