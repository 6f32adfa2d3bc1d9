//! Application configuration types

use cadence_core::SchedulerConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub data_dir: Option<String>,
    #[serde(default)]
    pub scheduler: SchedulerAppConfig,
    #[serde(default)]
    pub ai: AiConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Data directory, falling back to the platform data dir
    pub fn data_dir(&self) -> PathBuf {
        self.data_dir
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(default_data_dir)
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join("cadence")
}

/// Scheduler configuration (exposed to TOML)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerAppConfig {
    #[serde(default = "default_check_interval_secs")]
    pub check_interval_secs: u64,
    #[serde(default = "default_sync_interval_secs")]
    pub sync_interval_secs: u64,
    #[serde(default = "default_max_tasks_per_tick")]
    pub max_tasks_per_tick: usize,
}

fn default_check_interval_secs() -> u64 {
    1
}

fn default_sync_interval_secs() -> u64 {
    60
}

fn default_max_tasks_per_tick() -> usize {
    100
}

impl Default for SchedulerAppConfig {
    fn default() -> Self {
        Self {
            check_interval_secs: default_check_interval_secs(),
            sync_interval_secs: default_sync_interval_secs(),
            max_tasks_per_tick: default_max_tasks_per_tick(),
        }
    }
}

impl SchedulerAppConfig {
    pub fn to_engine_config(&self) -> SchedulerConfig {
        SchedulerConfig::new()
            .with_check_interval(self.check_interval_secs)
            .with_max_tasks_per_tick(self.max_tasks_per_tick)
    }
}

/// AI command generation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_ai_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub base_url: Option<String>,
}

fn default_provider() -> String {
    "deepseek".to_string()
}

fn default_model() -> String {
    cadence_llm::deepseek::DEFAULT_MODEL.to_string()
}

fn default_api_key_env() -> String {
    cadence_llm::deepseek::API_KEY_ENV.to_string()
}

fn default_ai_timeout_secs() -> u64 {
    120
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            api_key_env: default_api_key_env(),
            timeout_secs: default_ai_timeout_secs(),
            base_url: None,
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_level")]
    pub level: String,
    #[serde(default = "default_file")]
    pub file: bool,
}

fn default_level() -> String {
    "info".to_string()
}

fn default_file() -> bool {
    true
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            file: default_file(),
        }
    }
}
