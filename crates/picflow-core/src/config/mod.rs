//! Configuration management for Picflow.
//!
//! Configuration is loaded from `config.toml` in the platform config directory,
//! with defaults for everything. Keys use the same camelCase names on disk and
//! in key-path lookups (`buildIn.compress.quality`).

mod types;
mod validate;

pub use types::*;

use crate::error::ConfigError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Root configuration structure for Picflow.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    /// Re-raise run failures to the caller instead of reporting them only
    pub debug: bool,

    /// General settings
    pub general: GeneralConfig,

    /// Built-in compress, watermark and rename settings
    pub build_in: BuildInConfig,

    /// Transformer/uploader selection and backend tables
    pub pic_bed: PicBedConfig,

    /// Run-level settings
    pub settings: SettingsConfig,

    /// Logging settings
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from the default location.
    ///
    /// Returns default configuration if the file doesn't exist.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse and validate configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default config file path.
    ///
    /// - macOS: ~/Library/Application Support/com.picflow.picflow/config.toml
    /// - Linux: ~/.config/picflow/config.toml
    /// - Windows: C:\Users\<User>\AppData\Roaming\picflow\config\config.toml
    ///
    /// Falls back to ~/.picflow/config.toml if directory detection fails.
    pub fn default_path() -> PathBuf {
        directories::ProjectDirs::from("com", "picflow", "picflow")
            .map(|dirs| dirs.config_dir().to_path_buf().join("config.toml"))
            .unwrap_or_else(|| {
                let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
                PathBuf::from(home).join(".picflow").join("config.toml")
            })
    }

    /// Resolved base directory (with ~ expansion).
    pub fn base_dir(&self) -> PathBuf {
        let path_str = self.general.base_dir.to_string_lossy();
        let expanded = shellexpand::tilde(&path_str);
        PathBuf::from(expanded.into_owned())
    }

    /// Look up a value by dot-separated key path, e.g. `picBed.local.path`.
    ///
    /// Returns `None` for missing keys and for explicit nulls.
    pub fn get_value(&self, key_path: &str) -> Option<serde_json::Value> {
        let root = serde_json::to_value(self).ok()?;
        let mut current = &root;
        for segment in key_path.split('.').filter(|s| !s.is_empty()) {
            current = current.get(segment)?;
        }
        if current.is_null() {
            None
        } else {
            Some(current.clone())
        }
    }

    /// Typed key-path lookup. Returns `None` when the value is missing or
    /// does not deserialize as `T`.
    pub fn get<T: DeserializeOwned>(&self, key_path: &str) -> Option<T> {
        self.get_value(key_path)
            .and_then(|value| serde_json::from_value(value).ok())
    }

    /// Serialize the config to a pretty TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::ValidationError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(!config.debug);
        assert!(config.build_in.compress.is_none());
        assert!(config.build_in.watermark.is_none());
        assert_eq!(config.pic_bed.uploader_id(), "local");
        assert!(!config.settings.encode_output_url);
    }

    #[test]
    fn test_config_to_toml() {
        let config = Config::default();
        let toml = config.to_toml().unwrap();
        assert!(toml.contains("[general]"));
        assert!(toml.contains("[logging]"));
        assert!(toml.contains("baseDir"));
    }

    #[test]
    fn test_camel_case_keys_parse() {
        let config = Config::from_toml(
            r#"
debug = true

[buildIn.compress]
quality = 80
isReSize = true
reSizeWidth = 640
isRemoveExif = true

[buildIn.rename]
enable = true
format = "{Y}/{md5-16}"

[picBed]
uploader = "local"

[picBed.local]
path = "/srv/images"
customUrl = "https://cdn.example.com"

[settings]
encodeOutputURL = true
"#,
        )
        .unwrap();

        assert!(config.debug);
        let compress = config.build_in.compress.as_ref().unwrap();
        assert_eq!(compress.quality, 80);
        assert!(compress.is_resize);
        assert_eq!(compress.resize_width, 640);
        assert!(compress.is_remove_exif);
        assert_eq!(config.build_in.rename.as_ref().unwrap().format, "{Y}/{md5-16}");
        assert!(config.settings.encode_output_url);
        assert!(config.pic_bed.backends.contains_key("local"));
    }

    #[test]
    fn test_get_value_by_key_path() {
        let config = Config::from_toml(
            r#"
[picBed.local]
path = "/srv/images"
"#,
        )
        .unwrap();

        assert_eq!(
            config.get::<String>("picBed.local.path").as_deref(),
            Some("/srv/images")
        );
        assert_eq!(config.get::<String>("logging.level").as_deref(), Some("info"));
        assert!(config.get_value("picBed.local.missing").is_none());
        assert!(config.get_value("buildIn.compress").is_none());
    }

    #[test]
    fn test_get_with_wrong_type_is_none() {
        let config = Config::default();
        assert!(config.get::<u32>("logging.level").is_none());
    }

    #[test]
    fn test_base_dir_expands_tilde() {
        let config = Config::default();
        let base = config.base_dir();
        assert!(!base.to_string_lossy().starts_with('~'));
        assert!(base.ends_with(".picflow"));
    }
}
