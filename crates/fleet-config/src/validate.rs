//! Validation helpers and the configuration error type.

use thiserror::Error;

use crate::model::{BackupConfig, StreamConfig};

/// Errors produced while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment variable held a value outside its valid range.
    #[error("invalid value for {field}: {message}")]
    InvalidField {
        /// Name of the offending field.
        field: String,
        /// Human-readable explanation.
        message: String,
    },
    /// A required environment variable was missing.
    #[error("missing required environment variable {name}")]
    MissingEnv {
        /// Name of the missing variable.
        name: String,
    },
}

/// Validate that `default_limit`/`max_limit` fall within `[1, 2000]` and
/// `default_limit ≤ max_limit`.
pub fn validate_stream_config(config: &StreamConfig) -> Result<(), ConfigError> {
    if config.default_limit == 0 || config.default_limit > 2000 {
        return Err(ConfigError::InvalidField {
            field: "stream.default_limit".to_string(),
            message: "must be in [1, 2000]".to_string(),
        });
    }
    if config.max_limit == 0 || config.max_limit > 2000 {
        return Err(ConfigError::InvalidField {
            field: "stream.max_limit".to_string(),
            message: "must be in [1, 2000]".to_string(),
        });
    }
    if config.default_limit > config.max_limit {
        return Err(ConfigError::InvalidField {
            field: "stream.default_limit".to_string(),
            message: "must not exceed max_limit".to_string(),
        });
    }
    if config.default_sync_interval > config.max_sync_interval {
        return Err(ConfigError::InvalidField {
            field: "stream.default_sync_interval".to_string(),
            message: "must not exceed max_sync_interval".to_string(),
        });
    }
    Ok(())
}

/// Validate that `data_dir` is non-empty and `worker_count ≥ 1`.
pub fn validate_backup_config(config: &BackupConfig) -> Result<(), ConfigError> {
    if config.data_dir.trim().is_empty() {
        return Err(ConfigError::MissingEnv {
            name: "FLEET_BACKUP_DATA_DIR".to_string(),
        });
    }
    if config.worker_count == 0 {
        return Err(ConfigError::InvalidField {
            field: "backup.worker_count".to_string(),
            message: "must be at least 1".to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::StreamConfig;

    #[test]
    fn rejects_limit_above_2000() {
        let mut config = StreamConfig::default();
        config.max_limit = 5000;
        assert!(validate_stream_config(&config).is_err());
    }

    #[test]
    fn rejects_default_limit_above_max_limit() {
        let mut config = StreamConfig::default();
        config.default_limit = 400;
        config.max_limit = 300;
        assert!(validate_stream_config(&config).is_err());
    }

    #[test]
    fn accepts_defaults() {
        assert!(validate_stream_config(&StreamConfig::default()).is_ok());
    }

    #[test]
    fn rejects_empty_data_dir() {
        let config = BackupConfig {
            data_dir: String::new(),
            poll_interval: std::time::Duration::from_secs(60),
            worker_count: 2,
        };
        assert!(matches!(
            validate_backup_config(&config),
            Err(ConfigError::MissingEnv { .. })
        ));
    }
}
