// Configuration management module
// TOML settings stored in the application directory

pub mod settings;


pub use settings::{
    Config, ConfigError, EmbeddingConfig, FeedConfig, FeedLocation, GenerationConfig,
    IngestConfig, RetrievalConfig, ServerConfig, VectorStoreConfig,
};

/// Load configuration from the resolved application directory
#[inline]
pub fn load_config(explicit_dir: Option<std::path::PathBuf>) -> anyhow::Result<Config> {
    let base_dir = Config::resolve_base_dir(explicit_dir)?;
    Config::load(base_dir)
}
