use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use anyhow::{Result, anyhow};

pub const DEFAULT_BASE_URL: &str = "http://localhost:5000";
pub const DEFAULT_GREETING: &str = "Hello! I'm Microsoft's DialoGPT. How can I help you today?";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    pub base_url: String,
    pub request_timeout_secs: u64,
    pub export_dir: Option<PathBuf>,
    pub greeting: String,
    pub polling: PollingConfig,
}

/// Delays for status re-checks, in seconds.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct PollingConfig {
    /// First re-check while the model reports not-ready; doubles per miss.
    pub startup_delay_secs: u64,
    pub max_delay_secs: u64,
    /// Re-check after a chat request hit "model still loading".
    pub loading_retry_secs: u64,
    pub reset_delay_secs: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            startup_delay_secs: 5,
            max_delay_secs: 60,
            loading_retry_secs: 10,
            reset_delay_secs: 2,
        }
    }
}

impl PollingConfig {
    pub fn policy(&self) -> PollPolicy {
        PollPolicy {
            startup_delay: Duration::from_secs(self.startup_delay_secs),
            max_delay: Duration::from_secs(self.max_delay_secs.max(self.startup_delay_secs)),
            loading_retry_delay: Duration::from_secs(self.loading_retry_secs),
            reset_delay: Duration::from_secs(self.reset_delay_secs),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub startup_delay: Duration,
    pub max_delay: Duration,
    pub loading_retry_delay: Duration,
    pub reset_delay: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        PollingConfig::default().policy()
    }
}

impl PollPolicy {
    /// Delay before the next check after `misses` consecutive not-ready answers.
    pub fn not_ready_delay(&self, misses: u32) -> Duration {
        let exponent = misses.saturating_sub(1).min(16);
        self.startup_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub fn new() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout_secs: 120,
            export_dir: None,
            greeting: DEFAULT_GREETING.to_string(),
            polling: PollingConfig::default(),
        }
    }

    pub fn load() -> Result<Self> {
        let config_path = Self::get_config_path()?;
        Self::load_from(&config_path)
    }

    pub fn load_from(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            return Ok(Self::new());
        }

        let config_content = fs::read_to_string(config_path)?;
        let config: Config = serde_json::from_str(&config_content)?;
        Ok(config)
    }

    pub fn save(&self) -> Result<PathBuf> {
        let config_path = Self::get_config_path()?;
        self.save_to(&config_path)?;
        Ok(config_path)
    }

    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        // Create config directory if it doesn't exist
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let config_content = serde_json::to_string_pretty(self)?;
        fs::write(config_path, config_content)?;
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn export_dir(&self) -> PathBuf {
        self.export_dir.clone().unwrap_or_else(|| PathBuf::from("."))
    }

    pub fn get_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow!("Could not determine config directory"))?;

        Ok(config_dir.join("dialogue").join("config.json"))
    }
}
