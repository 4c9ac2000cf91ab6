//! Configuration file management.
//!
//! Handles loading and saving TOML configuration files.

use std::fs;
use std::path::{Path, PathBuf};

use crate::domain::{AppError, RestoreConfig, Result};

/// Default configuration file content.
pub const DEFAULT_CONFIG: &str = r#"# social-restore configuration
# Auto-generated - edit as needed

[fetch]
# Seconds to wait for a remote overlay image before skipping it
timeout_secs = 5

[image]
# JPEG re-encode quality after compositing (1-100)
jpeg_quality = 95

# Preview thumbnails fit inside this box
thumbnail_max_width = 200
thumbnail_max_height = 200
thumbnail_quality = 80

# Caption font size when the export does not specify one
default_font_size = 24.0

[output]
# Previews returned per run
preview_limit = 10

# Longest id segment in generated filenames
max_id_len = 64

# A silence longer than this starts a new conversation
conversation_gap_hours = 24
"#;

/// Load configuration from an explicit path, the default location, or
/// built-in defaults.
///
/// # Errors
/// Returns error if a config file exists but cannot be read or parsed.
pub fn load_config(explicit: Option<&Path>) -> Result<RestoreConfig> {
    if let Some(path) = explicit {
        return load_config_from_file(path);
    }

    let config_path = RestoreConfig::default_config_path();
    if config_path.exists() {
        load_config_from_file(&config_path)
    } else {
        Ok(RestoreConfig::default())
    }
}

/// Load configuration from a specific file.
///
/// # Errors
/// Returns error if file cannot be read or parsed.
pub fn load_config_from_file(path: &Path) -> Result<RestoreConfig> {
    let content = fs::read_to_string(path)
        .map_err(|e| AppError::io(format!("Failed to read config file: {}", path.display()), e))?;

    let config = toml::from_str(&content).map_err(|e| AppError::Config {
        message: format!("Failed to parse config file: {e}"),
    })?;

    tracing::debug!(path = %path.display(), "Configuration loaded");
    Ok(config)
}

/// Save configuration to file.
///
/// # Errors
/// Returns error if file cannot be written.
pub fn save_config(config: &RestoreConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| AppError::io("Failed to create config directory", e))?;
    }

    let content = toml::to_string_pretty(config).map_err(|e| AppError::Config {
        message: format!("Failed to serialize config: {e}"),
    })?;

    fs::write(path, content)
        .map_err(|e| AppError::io(format!("Failed to write config file: {}", path.display()), e))?;

    tracing::info!(path = %path.display(), "Configuration saved");

    Ok(())
}

/// Create the default configuration file if it doesn't exist.
///
/// Returns the path of the config file.
///
/// # Errors
/// Returns error if file cannot be created.
pub fn ensure_config_exists() -> Result<PathBuf> {
    let config_path = RestoreConfig::default_config_path();

    if !config_path.exists() {
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| AppError::io("Failed to create config directory", e))?;
        }

        fs::write(&config_path, DEFAULT_CONFIG)
            .map_err(|e| AppError::io("Failed to create default config", e))?;

        tracing::info!(path = %config_path.display(), "Created default configuration");
    }

    Ok(config_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config_parses() {
        let config: RestoreConfig = toml::from_str(DEFAULT_CONFIG).unwrap();
        assert_eq!(config.fetch.timeout_secs, 5);
        assert_eq!(config.image.jpeg_quality, 95);
        assert_eq!(config.output.preview_limit, 10);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("nested").join("config.toml");

        let mut config = RestoreConfig::default();
        config.image.thumbnail_max_width = 320;

        save_config(&config, &config_path).unwrap();
        let loaded = load_config(Some(&config_path)).unwrap();

        assert_eq!(loaded.image.thumbnail_max_width, 320);
        assert_eq!(loaded.fetch.timeout_secs, config.fetch.timeout_secs);
    }

    #[test]
    fn test_invalid_file_is_config_error() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.toml");
        fs::write(&config_path, "[image]\njpeg_quality = \"high\"\n").unwrap();

        let err = load_config_from_file(&config_path).unwrap_err();
        assert!(matches!(err, AppError::Config { .. }));
    }
}
