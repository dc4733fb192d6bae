use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info};
use validator::{Validate, ValidationError};

use crate::search::SearchSettings;

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const CONFIG_DIR: &str = "config";
const DEFAULT_API_BASE_URL: &str = "http://localhost:8080/api/";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 15;
const DEFAULT_PRELOAD_BATCH: usize = 20;
const DEFAULT_CODE_WIDTH: usize = 3;
const DEFAULT_SEARCH_PAGE_SIZE: u32 = 50;
const DEFAULT_SUGGESTION_LIMIT: usize = 10;
const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 256;
const DEFAULT_SESSION_DIR: &str = ".labsync";

/// Engine configuration
#[derive(Clone, Debug, Deserialize, Validate)]
pub struct SyncConfig {
    /// Root of the backend HTTP API
    #[validate(url)]
    pub api_base_url: String,

    /// Bearer token sent with every request, when set
    #[serde(default)]
    pub api_token: Option<String>,

    #[validate(range(min = 1, max = 300))]
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_environment")]
    pub environment: String,

    #[validate(custom = "validate_log_level")]
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub log_json: bool,

    /// Maximum number of records probed per availability preload
    #[validate(range(min = 1, max = 100))]
    #[serde(default = "default_preload_batch")]
    pub preload_batch: usize,

    /// Zero padding of consecutive and front-facing code numbers
    #[validate(range(min = 1, max = 9))]
    #[serde(default = "default_code_width")]
    pub code_width: usize,

    #[validate(range(min = 1))]
    #[serde(default = "default_search_page_size")]
    pub search_page_size: u32,

    #[validate(range(min = 1))]
    #[serde(default = "default_suggestion_limit")]
    pub suggestion_limit: usize,

    #[validate(range(min = 1, max = 65536))]
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,

    /// Directory of the file-backed session store used by the CLI
    #[serde(default = "default_session_dir")]
    pub session_dir: String,
}

impl SyncConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn search_settings(&self) -> SearchSettings {
        SearchSettings {
            page_size: self.search_page_size,
            suggestion_limit: self.suggestion_limit,
        }
    }

    pub fn session_dir(&self) -> PathBuf {
        PathBuf::from(&self.session_dir)
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            api_token: None,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            environment: DEFAULT_ENV.to_string(),
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            log_json: false,
            preload_batch: DEFAULT_PRELOAD_BATCH,
            code_width: DEFAULT_CODE_WIDTH,
            search_page_size: DEFAULT_SEARCH_PAGE_SIZE,
            suggestion_limit: DEFAULT_SUGGESTION_LIMIT,
            event_channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
            session_dir: DEFAULT_SESSION_DIR.to_string(),
        }
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("Configuration loading failed: {0}")]
    Load(#[from] ConfigError),

    #[error("Configuration validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_environment() -> String {
    DEFAULT_ENV.to_string()
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

fn default_preload_batch() -> usize {
    DEFAULT_PRELOAD_BATCH
}

fn default_code_width() -> usize {
    DEFAULT_CODE_WIDTH
}

fn default_search_page_size() -> u32 {
    DEFAULT_SEARCH_PAGE_SIZE
}

fn default_suggestion_limit() -> usize {
    DEFAULT_SUGGESTION_LIMIT
}

fn default_event_channel_capacity() -> usize {
    DEFAULT_EVENT_CHANNEL_CAPACITY
}

fn default_session_dir() -> String {
    DEFAULT_SESSION_DIR.to_string()
}

/// Validates log level values
fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if valid_levels.contains(&level.to_lowercase().as_str()) {
        Ok(())
    } else {
        let mut err = ValidationError::new("log_level");
        err.message = Some("Must be one of: trace, debug, info, warn, error".into());
        Err(err)
    }
}

/// Initializes tracing using the provided log level as the default filter
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_directive = format!("labsync={},reqwest=warn", level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    let filter = EnvFilter::new(filter_directive);
    if json {
        let _ = fmt().with_env_filter(filter).json().try_init();
    } else {
        let _ = fmt().with_env_filter(filter).with_target(false).try_init();
    }
}

/// Loads configuration from `./config`
///
/// Layers configuration sources in this order:
/// 1. Built-in defaults
/// 2. Default config (config/default.toml)
/// 3. Environment-specific config (config/{env}.toml)
/// 4. Environment variables (APP__*)
pub fn load_config() -> Result<SyncConfig, AppConfigError> {
    let run_env = env::var("RUN_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| DEFAULT_ENV.to_string());
    load_config_from(Path::new(CONFIG_DIR), &run_env)
}

pub fn load_config_from(dir: &Path, run_env: &str) -> Result<SyncConfig, AppConfigError> {
    info!("Loading configuration for environment: {}", run_env);
    if !dir.exists() {
        info!(
            "Config directory '{}' not found; relying on built-in defaults and environment variables",
            dir.display()
        );
    }

    let defaults = SyncConfig::default();
    let config = Config::builder()
        .set_default("api_base_url", defaults.api_base_url)?
        .set_default("environment", run_env)?
        .set_default("log_level", defaults.log_level)?
        .set_default("log_json", defaults.log_json)?
        .set_default("request_timeout_secs", defaults.request_timeout_secs as i64)?
        .set_default("preload_batch", defaults.preload_batch as i64)?
        .set_default("code_width", defaults.code_width as i64)?
        .set_default("search_page_size", i64::from(defaults.search_page_size))?
        .set_default("suggestion_limit", defaults.suggestion_limit as i64)?
        .set_default("event_channel_capacity", defaults.event_channel_capacity as i64)?
        .set_default("session_dir", defaults.session_dir)?
        .add_source(File::with_name(&dir.join("default").to_string_lossy()).required(false))
        .add_source(File::with_name(&dir.join(run_env).to_string_lossy()).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    let sync_config: SyncConfig = config.try_deserialize()?;

    sync_config.validate().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    info!("Configuration loaded successfully");
    Ok(sync_config)
}
