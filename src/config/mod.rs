mod settings;

pub use settings::{
    CoordinatorConfig, HistoryConfig, LLMConfig, LoggingConfig, ProbeConfig, QueueConfig,
    SessionConfig, Settings, StorageBackend, StorageConfig,
};
