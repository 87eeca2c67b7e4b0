// Configuration management module
// TOML-backed settings for the embedding service, vector backend, and
// chunking parameters.

pub mod settings;

pub use settings::{Config, ConfigError, EmbeddingConfig, VectorBackend, VectorConfig};

/// Get the configuration directory path
#[inline]
pub fn get_config_dir() -> Result<std::path::PathBuf, ConfigError> {
    Config::config_dir()
}
