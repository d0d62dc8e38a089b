//! Production configuration system
//!
//! Provides centralized configuration management with:
//! - Environment variable support
//! - Config file loading (optional)
//! - Runtime defaults
//! - Validation and type safety

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::info;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Logging configuration
    pub logging: LoggingConfig,

    /// Plant identity
    pub plant: PlantConfig,

    /// Data file locations
    pub paths: PathsConfig,

    /// Hourly history configuration
    pub hourly: HourlyConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
    pub output: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlantConfig {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    pub data_dir: PathBuf,
    pub log_directory: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HourlyConfig {
    /// Days of per-hour history kept before FIFO-by-age eviction.
    pub retention_days: i64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            logging: LoggingConfig {
                level: "ERROR".to_string(),
                format: "pretty".to_string(),
                output: "console".to_string(),
            },
            plant: PlantConfig {
                name: "Nautica Shopping Centre".to_string(),
            },
            paths: PathsConfig {
                data_dir: PathBuf::from("data"),
                log_directory: PathBuf::from("logs"),
            },
            hourly: HourlyConfig { retention_days: 90 },
        }
    }
}

impl Config {
    /// Load configuration from environment, file, and defaults
    pub fn load() -> Result<Self> {
        let mut config = Config::default();

        // Try to load from config file if it exists
        let config_paths = [
            PathBuf::from("solar-ledger.toml"),
            PathBuf::from(".solar-ledger.toml"),
            dirs::config_dir()
                .map(|d| d.join("solar-ledger").join("config.toml"))
                .unwrap_or_default(),
        ];

        for path in &config_paths {
            if path.exists() {
                info!(config_file = %path.display(), "Loading configuration from file");
                config = Self::load_from_file(path)?;
                break;
            }
        }

        // Override with environment variables
        config.apply_env_overrides();

        // Validate configuration
        config.validate()?;

        Ok(config)
    }

    /// Load configuration from TOML file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) {
        // Logging overrides
        if let Ok(val) = env::var("LOG_LEVEL") {
            self.logging.level = val;
        }
        if let Ok(val) = env::var("LOG_FORMAT") {
            self.logging.format = val;
        }
        if let Ok(val) = env::var("LOG_OUTPUT") {
            self.logging.output = val;
        }

        // Plant and path overrides
        if let Ok(val) = env::var("SOLAR_LEDGER_PLANT_NAME") {
            self.plant.name = val;
        }
        if let Ok(val) = env::var("SOLAR_LEDGER_DATA_DIR") {
            self.paths.data_dir = PathBuf::from(val);
        }
        if let Ok(val) = env::var("SOLAR_LEDGER_LOG_DIR") {
            self.paths.log_directory = PathBuf::from(val);
        }

        // Hourly overrides
        if let Ok(val) = env::var("SOLAR_LEDGER_RETENTION_DAYS") {
            if let Ok(days) = val.parse() {
                self.hourly.retention_days = days;
            }
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.plant.name.is_empty() {
            anyhow::bail!("Plant name must not be empty");
        }
        if self.hourly.retention_days <= 0 {
            anyhow::bail!(
                "Hourly retention must be positive, got {} days",
                self.hourly.retention_days
            );
        }
        Ok(())
    }

    // Data file locations, all under the configured data directory. The
    // file names match what the acquisition scripts write.

    pub fn state_file(&self) -> PathBuf {
        self.paths.data_dir.join("starting_values.json")
    }

    pub fn snapshot_file(&self) -> PathBuf {
        self.paths.data_dir.join("daily_snapshot.json")
    }

    pub fn hourly_rows_file(&self) -> PathBuf {
        self.paths.data_dir.join("hourly_rows.json")
    }

    pub fn hourly_history_file(&self) -> PathBuf {
        self.paths.data_dir.join("hourly_generation.json")
    }

    pub fn tariff_file(&self) -> PathBuf {
        self.paths.data_dir.join("tariff_schedule.json")
    }

    pub fn shape_file(&self) -> PathBuf {
        self.paths.data_dir.join("reference_shape.json")
    }

    pub fn output_file(&self) -> PathBuf {
        self.paths.data_dir.join("processed.json")
    }
}

/// Global configuration instance
static CONFIG: OnceLock<Config> = OnceLock::new();

/// Get the global configuration instance
pub fn get_config() -> &'static Config {
    CONFIG.get_or_init(|| Config::load().expect("Failed to load configuration"))
}
