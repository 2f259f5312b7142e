//! Application configuration for Staffload.
//!
//! User config lives at `~/.staffload/staffload.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::{Result, StaffloadError};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "staffload.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".staffload";

// ---------------------------------------------------------------------------
// Config structs (matching staffload.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Database location.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Import behaviour.
    #[serde(default)]
    pub import: ImportConfig,

    /// Business validation thresholds.
    #[serde(default)]
    pub validation: ValidationConfig,
}

/// `[database]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the libSQL database file. `~` expands to the home directory.
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> String {
    "~/.staffload/staffload.db".into()
}

/// `[import]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportConfig {
    /// Number of valid rows shown by a dry-run validation.
    #[serde(default = "default_preview_rows")]
    pub preview_rows: usize,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            preview_rows: default_preview_rows(),
        }
    }
}

fn default_preview_rows() -> usize {
    10
}

/// `[validation]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// Minimum employee age in whole years.
    #[serde(default = "default_min_age")]
    pub min_age: u32,

    /// Maximum employee age in whole years.
    #[serde(default = "default_max_age")]
    pub max_age: u32,

    /// How far back a start date may lie, in years.
    #[serde(default = "default_max_service_years")]
    pub max_service_years: u32,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            min_age: default_min_age(),
            max_age: default_max_age(),
            max_service_years: default_max_service_years(),
        }
    }
}

fn default_min_age() -> u32 {
    16
}
fn default_max_age() -> u32 {
    100
}
fn default_max_service_years() -> u32 {
    50
}

// ---------------------------------------------------------------------------
// Validation rules (runtime, merged from config + the current date)
// ---------------------------------------------------------------------------

/// Runtime validation rules: thresholds from config plus the reference date.
#[derive(Debug, Clone)]
pub struct ValidationRules {
    /// The date that counts as "today" for future/age checks.
    pub today: NaiveDate,
    pub min_age: u32,
    pub max_age: u32,
    pub max_service_years: u32,
}

impl ValidationRules {
    /// Replace the reference date.
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = today;
        self
    }
}

impl Default for ValidationRules {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for ValidationRules {
    fn from(config: &AppConfig) -> Self {
        Self {
            today: Local::now().date_naive(),
            min_age: config.validation.min_age,
            max_age: config.validation.max_age,
            max_service_years: config.validation.max_service_years,
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.staffload/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| StaffloadError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.staffload/staffload.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| StaffloadError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        StaffloadError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| StaffloadError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| StaffloadError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| StaffloadError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Resolve the configured database path, expanding a leading `~`.
pub fn resolve_db_path(config: &AppConfig) -> Result<PathBuf> {
    let raw = config.database.path.trim();
    if raw.is_empty() {
        return Err(StaffloadError::config("database.path must not be empty"));
    }

    match raw.strip_prefix("~/") {
        Some(rest) => {
            let home = dirs::home_dir()
                .ok_or_else(|| StaffloadError::config("could not determine home directory"))?;
            Ok(home.join(rest))
        }
        None => Ok(PathBuf::from(raw)),
    }
}
