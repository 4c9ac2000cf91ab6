//! Restoration settings.
//!
//! Every field has a default so a partial or missing config file still
//! yields a complete configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Remote overlay fetching.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Upper bound for one overlay download, in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// User agent sent with overlay requests.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

const fn default_timeout_secs() -> u64 {
    5
}

fn default_user_agent() -> String {
    concat!("social-restore/", env!("CARGO_PKG_VERSION")).to_string()
}

/// Image encoding and preview settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageConfig {
    /// Quality for lossy re-encoding (1-100).
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,

    #[serde(default = "default_thumbnail_edge")]
    pub thumbnail_max_width: u32,

    #[serde(default = "default_thumbnail_edge")]
    pub thumbnail_max_height: u32,

    #[serde(default = "default_thumbnail_quality")]
    pub thumbnail_quality: u8,

    /// Font size for captions that do not declare one.
    #[serde(default = "default_font_size")]
    pub default_font_size: f32,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            jpeg_quality: default_jpeg_quality(),
            thumbnail_max_width: default_thumbnail_edge(),
            thumbnail_max_height: default_thumbnail_edge(),
            thumbnail_quality: default_thumbnail_quality(),
            default_font_size: default_font_size(),
        }
    }
}

const fn default_jpeg_quality() -> u8 {
    95
}

const fn default_thumbnail_edge() -> u32 {
    200
}

const fn default_thumbnail_quality() -> u8 {
    80
}

const fn default_font_size() -> f32 {
    24.0
}

/// Output packaging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Maximum number of previews per run.
    #[serde(default = "default_preview_limit")]
    pub preview_limit: usize,

    /// Maximum length of the id part of generated filenames.
    #[serde(default = "default_max_id_len")]
    pub max_id_len: usize,

    /// Gap that splits a conversation, in hours.
    #[serde(default = "default_gap_hours")]
    pub conversation_gap_hours: i64,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            preview_limit: default_preview_limit(),
            max_id_len: default_max_id_len(),
            conversation_gap_hours: default_gap_hours(),
        }
    }
}

const fn default_preview_limit() -> usize {
    10
}

const fn default_max_id_len() -> usize {
    64
}

const fn default_gap_hours() -> i64 {
    24
}

/// Complete application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RestoreConfig {
    #[serde(default)]
    pub fetch: FetchConfig,

    #[serde(default)]
    pub image: ImageConfig,

    #[serde(default)]
    pub output: OutputConfig,
}

impl RestoreConfig {
    /// Default configuration directory.
    #[must_use]
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("social-restore")
    }

    /// Default config file path.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        Self::default_config_dir().join("config.toml")
    }

    /// Overlay fetch timeout.
    #[must_use]
    pub const fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch.timeout_secs)
    }

    /// Gap beyond which a new conversation starts.
    #[must_use]
    pub fn conversation_gap(&self) -> chrono::Duration {
        chrono::Duration::hours(self.output.conversation_gap_hours)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RestoreConfig::default();
        assert_eq!(config.fetch.timeout_secs, 5);
        assert_eq!(config.image.jpeg_quality, 95);
        assert_eq!(config.output.preview_limit, 10);
        assert_eq!(config.conversation_gap(), chrono::Duration::hours(24));
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: RestoreConfig = toml::from_str("[image]\njpeg_quality = 80\n").unwrap();
        assert_eq!(config.image.jpeg_quality, 80);
        assert_eq!(config.image.thumbnail_max_width, 200);
        assert_eq!(config.fetch.timeout_secs, 5);
    }
}
