use anyhow::Result;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    pub llm: LLMConfig,
    pub storage: StorageConfig,
    pub history: HistoryConfig,
    pub queue: QueueConfig,
    pub probe: ProbeConfig,
    pub coordinator: CoordinatorConfig,
    pub session: SessionConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMConfig {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub endpoint: String,
    pub models_endpoint: String,
}

impl Default for LLMConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o".to_string(),
            max_tokens: 500,
            temperature: 0.7,
            endpoint: "https://api.openai.com/v1/chat/completions".to_string(),
            models_endpoint: "https://api.openai.com/v1/models".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    Filesystem,
    Sqlite,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// Directory for the filesystem backend, database file for sqlite
    pub path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Filesystem,
            path: "./taxmate-data".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    pub max_entries: usize,
    pub persist_attempts: u32,
    pub load_attempts: u32,
    pub retry_delay_ms: u64,
}

impl HistoryConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_entries: 100,
            persist_attempts: 3,
            load_attempts: 3,
            retry_delay_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    pub drain_delay_ms: u64,
}

impl QueueConfig {
    pub fn drain_delay(&self) -> Duration {
        Duration::from_millis(self.drain_delay_ms)
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self { drain_delay_ms: 5000 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeConfig {
    pub max_attempts: u32,
    pub delay_ms: u64,
}

impl ProbeConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            delay_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    pub startup_delay_ms: u64,
    pub channel_buffer_size: usize,
    pub event_buffer_size: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            startup_delay_ms: 500,
            channel_buffer_size: 32,
            event_buffer_size: 16,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    pub startup_delay_ms: u64,
    pub init_attempts: u32,
    pub init_retry_delay_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            startup_delay_ms: 500,
            init_attempts: 5,
            init_retry_delay_ms: 2000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let config_env = env::var("CONFIG_ENV").unwrap_or_else(|_| "default".to_string());

        let config = Config::builder()
            .add_source(Config::try_from(&Settings::default())?)
            .add_source(File::with_name(&format!("config/{}", config_env)).required(false))
            .add_source(Environment::with_prefix("APP").separator("__"))
            .build()?;

        config.try_deserialize()
    }

    /// Settings with every delay set to zero, for tests and scripted runs
    pub fn immediate() -> Self {
        let mut settings = Settings::default();
        settings.storage.backend = StorageBackend::Memory;
        settings.history.retry_delay_ms = 0;
        settings.queue.drain_delay_ms = 0;
        settings.probe.delay_ms = 0;
        settings.coordinator.startup_delay_ms = 0;
        settings.session.startup_delay_ms = 0;
        settings.session.init_retry_delay_ms = 0;
        settings
    }

    pub fn api_key_from_env() -> Option<String> {
        env::var("OPENAI_API_KEY").ok().filter(|key| !key.trim().is_empty())
    }
}
