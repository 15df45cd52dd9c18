use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// TOML-backed tunables. Secrets stay as env vars (see [`crate::AppConfig`]).
///
/// Every section is optional; a missing file or section falls back to defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    #[serde(default)]
    pub scout: ScoutConfig,
    #[serde(default)]
    pub extraction: ExtractionConfig,
    #[serde(default)]
    pub geocoding: GeocodingConfig,
    #[serde(default)]
    pub moderation: ModerationConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
    /// Path to a vocabulary TOML. The embedded vocabulary is used when unset.
    #[serde(default)]
    pub vocabulary: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScoutConfig {
    pub hashtag: String,
    pub fetch_limit: u32,
    pub graph_base_url: Option<String>,
    pub retry: RetryConfig,
}

impl Default for ScoutConfig {
    fn default() -> Self {
        Self {
            hashtag: "팝업스토어".to_string(),
            fetch_limit: 50,
            graph_base_url: None,
            retry: RetryConfig::default(),
        }
    }
}

/// Bounded retry with a fixed delay between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            delay_ms: 1000,
        }
    }
}

impl RetryConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExtractionConfig {
    pub model: String,
    pub batch_size: usize,
    pub max_tokens: u32,
    pub timeout_secs: u64,
    pub retry: RetryConfig,
    pub download_images: bool,
    pub image_dir: PathBuf,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            batch_size: 10,
            max_tokens: 1500,
            timeout_secs: 60,
            retry: RetryConfig::default(),
            download_images: true,
            image_dir: PathBuf::from("data/images"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GeocodingConfig {
    pub timeout_secs: u64,
    pub retry: RetryConfig,
}

impl Default for GeocodingConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            retry: RetryConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ModerationConfig {
    /// Images per moderation request.
    pub batch_size: usize,
    pub timeout_secs: u64,
    pub retry: RetryConfig,
}

impl Default for ModerationConfig {
    fn default() -> Self {
        Self {
            batch_size: 15,
            timeout_secs: 60,
            retry: RetryConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NotifyConfig {
    pub push_title: String,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            push_title: "[팝팡] 새로운 팝업 소식!".to_string(),
        }
    }
}

/// Load and parse a TOML config file.
pub fn load_config(path: &Path) -> Result<FileConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    let config: FileConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
    Ok(config)
}
