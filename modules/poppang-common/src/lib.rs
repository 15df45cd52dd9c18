pub mod config;
pub mod error;
pub mod file_config;
pub mod types;
pub mod vocabulary;

pub use config::AppConfig;
pub use error::PoppangError;
pub use file_config::{
    load_config, ExtractionConfig, FileConfig, GeocodingConfig, ModerationConfig, NotifyConfig,
    RetryConfig, ScoutConfig,
};
pub use types::*;
pub use vocabulary::Vocabulary;
