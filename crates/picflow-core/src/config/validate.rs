//! Configuration validation with range checks.

use crate::error::ConfigError;

use super::Config;

impl Config {
    /// Validate configuration values are within acceptable ranges.
    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if let Some(compress) = &self.build_in.compress {
            if compress.quality == 0 || compress.quality > 100 {
                return Err(ConfigError::ValidationError(
                    "buildIn.compress.quality must be between 1 and 100".into(),
                ));
            }
            if !(0.0..=100.0).contains(&compress.resize_percent) {
                return Err(ConfigError::ValidationError(
                    "buildIn.compress.reSizePercent must be between 0 and 100".into(),
                ));
            }
            if !compress.rotate_degree.is_finite() {
                return Err(ConfigError::ValidationError(
                    "buildIn.compress.rotateDegree must be a finite number".into(),
                ));
            }
        }
        if let Some(watermark) = &self.build_in.watermark {
            if watermark.watermark_scale_ratio < 0.0 {
                return Err(ConfigError::ValidationError(
                    "buildIn.watermark.watermarkScaleRatio must be >= 0".into(),
                ));
            }
            if !watermark.watermark_degree.is_finite() {
                return Err(ConfigError::ValidationError(
                    "buildIn.watermark.watermarkDegree must be a finite number".into(),
                ));
            }
        }
        for (key, id) in [
            ("picBed.transformer", &self.pic_bed.transformer),
            ("picBed.uploader", &self.pic_bed.uploader),
        ] {
            if matches!(id, Some(id) if id.trim().is_empty()) {
                return Err(ConfigError::ValidationError(format!(
                    "{key} must not be empty"
                )));
            }
        }
        if !matches!(self.logging.format.as_str(), "pretty" | "json") {
            return Err(ConfigError::ValidationError(
                "logging.format must be \"pretty\" or \"json\"".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CompressOptions, WatermarkOptions};

    #[test]
    fn test_default_config_passes_validation() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_quality() {
        let mut config = Config::default();
        config.build_in.compress = Some(CompressOptions {
            quality: 0,
            ..Default::default()
        });
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("quality"));
    }

    #[test]
    fn test_validate_rejects_percent_over_100() {
        let mut config = Config::default();
        config.build_in.compress = Some(CompressOptions {
            resize_percent: 150.0,
            ..Default::default()
        });
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("reSizePercent"));
    }

    #[test]
    fn test_validate_percent_range() {
        for bad in [-5.0, f64::NAN, 100.5] {
            let mut config = Config::default();
            config.build_in.compress = Some(CompressOptions {
                resize_percent: bad,
                ..Default::default()
            });
            assert!(config.validate().is_err(), "{bad} accepted");
        }

        let config = Config::from_toml("[buildIn.compress]\nreSizePercent = 12.5\n").unwrap();
        let compress = config.build_in.compress.unwrap();
        assert_eq!(compress.resize_percent, 12.5);

        let config = Config::from_toml("[buildIn.compress]\nreSizePercent = 50\n").unwrap();
        assert_eq!(config.build_in.compress.unwrap().resize_percent, 50.0);
    }

    #[test]
    fn test_validate_rejects_negative_scale_ratio() {
        let mut config = Config::default();
        config.build_in.watermark = Some(WatermarkOptions {
            watermark_scale_ratio: -0.5,
            ..Default::default()
        });
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("watermarkScaleRatio"));
    }

    #[test]
    fn test_validate_rejects_empty_uploader_id() {
        let mut config = Config::default();
        config.pic_bed.uploader = Some(String::new());
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("picBed.uploader"));
    }

    #[test]
    fn test_validate_rejects_unknown_log_format() {
        let mut config = Config::default();
        config.logging.format = "xml".to_string();
        assert!(config.validate().is_err());
    }
}
