//! Configuration loading and root folder resolution
//!
//! Every setting resolves with the same priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file
//! 4. Compiled default (fallback)
//!
//! A missing TOML file is never fatal: a warning is logged and defaults apply.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable overriding the root folder
pub const ROOT_FOLDER_ENV: &str = "ORACLE_ROOT_FOLDER";

/// Environment variable holding the image provider API key
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Database file name inside the root folder
pub const DATABASE_FILE: &str = "oracle.db";

/// Artifact directory name inside the root folder
pub const ARTIFACTS_DIR: &str = "artifacts";

/// Bootstrap configuration loaded from TOML file
///
/// Cannot change while running; the service must restart to pick up edits.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TomlConfig {
    /// Root folder for database and artifacts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_folder: Option<PathBuf>,

    /// HTTP server port
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// External image generation provider
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Generation job tracker tuning
    #[serde(default)]
    pub jobs: JobsConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Image generation provider configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProviderConfig {
    /// Base URL of the OpenAI-compatible images API
    #[serde(default = "default_provider_base_url")]
    pub base_url: String,

    /// Image model name
    #[serde(default = "default_provider_model")]
    pub model: String,

    /// Requested image size (e.g. "1024x1024")
    #[serde(default = "default_provider_size")]
    pub size: String,

    /// Per-call timeout. Exceeding it fails the item.
    #[serde(default = "default_provider_timeout")]
    pub timeout_seconds: u64,

    /// API key (the environment variable takes precedence)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: default_provider_base_url(),
            model: default_provider_model(),
            size: default_provider_size(),
            timeout_seconds: default_provider_timeout(),
            api_key: None,
        }
    }
}

impl ProviderConfig {
    /// Resolve the provider API key
    ///
    /// **Priority:** ENV → TOML
    pub fn resolve_api_key(&self) -> Option<String> {
        let env_key = std::env::var(API_KEY_ENV).ok().filter(|k| is_valid_key(k));
        let toml_key = self.api_key.clone().filter(|k| is_valid_key(k));

        if env_key.is_some() && toml_key.is_some() {
            warn!(
                "Provider API key found in both environment and TOML. Using environment (highest priority)."
            );
        }

        if let Some(key) = env_key {
            info!("Provider API key loaded from environment variable");
            return Some(key);
        }
        if let Some(key) = toml_key {
            info!("Provider API key loaded from TOML config");
            return Some(key);
        }
        None
    }
}

/// Generation job tracker configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobsConfig {
    /// Maximum provider calls in flight across all jobs
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_generations: usize,

    /// How long a finished job stays queryable
    #[serde(default = "default_retention")]
    pub retention_seconds: u64,

    /// How often finished jobs are swept
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_seconds: u64,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            max_concurrent_generations: default_max_concurrent(),
            retention_seconds: default_retention(),
            sweep_interval_seconds: default_sweep_interval(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_provider_base_url() -> String {
    "https://api.openai.com".to_string()
}

fn default_provider_model() -> String {
    "dall-e-3".to_string()
}

fn default_provider_size() -> String {
    "1024x1024".to_string()
}

fn default_provider_timeout() -> u64 {
    120
}

fn default_max_concurrent() -> usize {
    2
}

fn default_retention() -> u64 {
    3600
}

fn default_sweep_interval() -> u64 {
    60
}

/// Validate API key (non-empty, non-whitespace)
pub fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
}

/// Default TOML path for a module: `<config_dir>/oracle/<module>.toml`
pub fn default_config_path(module_name: &str) -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("oracle").join(format!("{}.toml", module_name)))
}

/// Load TOML configuration
///
/// A missing file yields defaults with a warning. A file that exists but
/// cannot be parsed is a configuration error.
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    if !path.exists() {
        warn!(
            "Config file not found at {}, using built-in defaults",
            path.display()
        );
        return Ok(TomlConfig::default());
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read TOML failed: {}", e)))?;
    let config = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))?;

    info!("Loaded configuration from {}", path.display());
    Ok(config)
}

/// Write TOML configuration atomically (temp file + rename)
pub fn write_toml_config(config: &TomlConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Serialize TOML failed: {}", e)))?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let temp_path = path.with_extension("toml.tmp");
    std::fs::write(&temp_path, content)?;
    std::fs::rename(&temp_path, path)?;
    Ok(())
}

/// Root folder resolution following CLI → ENV → TOML → default
#[derive(Debug, Clone)]
pub struct RootFolderResolver {
    module_name: String,
    cli_arg: Option<PathBuf>,
    toml_value: Option<PathBuf>,
}

impl RootFolderResolver {
    pub fn new(module_name: impl Into<String>) -> Self {
        Self {
            module_name: module_name.into(),
            cli_arg: None,
            toml_value: None,
        }
    }

    /// Set the command-line override
    pub fn with_cli_arg(mut self, path: Option<PathBuf>) -> Self {
        self.cli_arg = path;
        self
    }

    /// Set the value read from TOML
    pub fn with_toml(mut self, config: &TomlConfig) -> Self {
        self.toml_value = config.root_folder.clone();
        self
    }

    /// Resolve the root folder. Never fails; falls back to the compiled default.
    pub fn resolve(&self) -> PathBuf {
        if let Some(path) = &self.cli_arg {
            info!(module = %self.module_name, "Root folder from command line: {}", path.display());
            return path.clone();
        }

        if let Ok(path) = std::env::var(ROOT_FOLDER_ENV) {
            if !path.trim().is_empty() {
                info!(module = %self.module_name, "Root folder from {}: {}", ROOT_FOLDER_ENV, path);
                return PathBuf::from(path);
            }
        }

        if let Some(path) = &self.toml_value {
            info!(module = %self.module_name, "Root folder from TOML: {}", path.display());
            return path.clone();
        }

        let path = default_root_folder();
        info!(module = %self.module_name, "Root folder from compiled default: {}", path.display());
        path
    }
}

/// OS-dependent default root folder path
pub fn default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("oracle"))
        .unwrap_or_else(|| PathBuf::from("./oracle_data"))
}

/// Creates the root folder layout on first start
#[derive(Debug, Clone)]
pub struct RootFolderInitializer {
    root_folder: PathBuf,
}

impl RootFolderInitializer {
    pub fn new(root_folder: PathBuf) -> Self {
        Self { root_folder }
    }

    /// Create the root folder and artifact directory if missing
    pub fn ensure_directory_exists(&self) -> Result<()> {
        std::fs::create_dir_all(self.artifacts_path()).map_err(|e| {
            Error::Config(format!(
                "Cannot create root folder {}: {}",
                self.root_folder.display(),
                e
            ))
        })?;
        Ok(())
    }

    pub fn root_folder(&self) -> &Path {
        &self.root_folder
    }

    pub fn database_path(&self) -> PathBuf {
        self.root_folder.join(DATABASE_FILE)
    }

    pub fn artifacts_path(&self) -> PathBuf {
        self.root_folder.join(ARTIFACTS_DIR)
    }
}
