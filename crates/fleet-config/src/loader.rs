//! Environment-variable configuration loading.
//!
//! All recognized keys are namespaced by component and read once at process
//! start (see SPEC_FULL.md §6.5). A variable that is absent falls back to
//! the component's default; a variable that is present but unparsable is a
//! [`ConfigError::InvalidField`].

use std::env;
use std::time::Duration;

use tracing::info;

use crate::model::{AppConfig, BackupConfig, RulesConfig, StreamConfig};
use crate::validate::{validate_backup_config, validate_stream_config, ConfigError};
use crate::{defaults, model};

fn env_duration_secs(name: &str, default: Duration) -> Result<Duration, ConfigError> {
    match env::var(name) {
        Ok(value) => value
            .parse::<u64>()
            .map(Duration::from_secs)
            .map_err(|err| ConfigError::InvalidField {
                field: name.to_string(),
                message: err.to_string(),
            }),
        Err(_) => Ok(default),
    }
}

fn env_u32(name: &str, default: u32) -> Result<u32, ConfigError> {
    match env::var(name) {
        Ok(value) => value.parse::<u32>().map_err(|err| ConfigError::InvalidField {
            field: name.to_string(),
            message: err.to_string(),
        }),
        Err(_) => Ok(default),
    }
}

fn env_usize(name: &str, default: usize) -> Result<usize, ConfigError> {
    match env::var(name) {
        Ok(value) => value.parse::<usize>().map_err(|err| ConfigError::InvalidField {
            field: name.to_string(),
            message: err.to_string(),
        }),
        Err(_) => Ok(default),
    }
}

fn env_i64(name: &str, default: i64) -> Result<i64, ConfigError> {
    match env::var(name) {
        Ok(value) => value.parse::<i64>().map_err(|err| ConfigError::InvalidField {
            field: name.to_string(),
            message: err.to_string(),
        }),
        Err(_) => Ok(default),
    }
}

fn env_string(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn load_stream_config() -> Result<StreamConfig, ConfigError> {
    let config = StreamConfig {
        default_sync_interval: env_duration_secs(
            "FLEET_STREAM_DEFAULT_SYNC_INTERVAL_SECS",
            defaults::DEFAULT_SYNC_INTERVAL,
        )?,
        max_sync_interval: env_duration_secs(
            "FLEET_STREAM_MAX_SYNC_INTERVAL_SECS",
            defaults::MAX_SYNC_INTERVAL,
        )?,
        heartbeat_interval: env_duration_secs(
            "FLEET_STREAM_HEARTBEAT_INTERVAL_SECS",
            defaults::HEARTBEAT_INTERVAL,
        )?,
        default_limit: env_u32("FLEET_STREAM_DEFAULT_LIMIT", defaults::DEFAULT_LIMIT)?,
        max_limit: env_u32("FLEET_STREAM_MAX_LIMIT", defaults::MAX_LIMIT)?,
    };
    validate_stream_config(&config)?;
    Ok(config)
}

fn load_rules_config() -> Result<RulesConfig, ConfigError> {
    Ok(RulesConfig {
        scan_interval: env_duration_secs("FLEET_RULES_SCAN_INTERVAL_SECS", defaults::SCAN_INTERVAL)?,
        skip_within: env_duration_secs("FLEET_RULES_SKIP_WITHIN_SECS", defaults::SKIP_WITHIN)?,
        max_batch_hashes: env_usize(
            "FLEET_RULES_MAX_BATCH_HASHES",
            defaults::MAX_BATCH_HASHES,
        )?,
        activity_retention_days: env_i64(
            "FLEET_RULES_ACTIVITY_RETENTION_DAYS",
            defaults::ACTIVITY_RETENTION_DAYS,
        )?,
    })
}

fn load_backup_config() -> Result<BackupConfig, ConfigError> {
    let data_dir = env::var("FLEET_BACKUP_DATA_DIR").map_err(|_| ConfigError::MissingEnv {
        name: "FLEET_BACKUP_DATA_DIR".to_string(),
    })?;
    let config = BackupConfig {
        data_dir,
        poll_interval: env_duration_secs(
            "FLEET_BACKUP_POLL_INTERVAL_SECS",
            defaults::BACKUP_POLL_INTERVAL,
        )?,
        worker_count: env_usize("FLEET_BACKUP_WORKER_COUNT", 2)?,
    };
    validate_backup_config(&config)?;
    Ok(config)
}

/// Load the full application configuration from the process environment.
///
/// # Errors
///
/// Returns a [`ConfigError`] for the first missing/invalid field encountered.
pub fn load_from_env() -> Result<AppConfig, ConfigError> {
    let database_url = env::var("DATABASE_URL").map_err(|_| ConfigError::MissingEnv {
        name: "DATABASE_URL".to_string(),
    })?;
    let config = model::AppConfig {
        stream: load_stream_config()?,
        rules: load_rules_config()?,
        backup: load_backup_config()?,
        database_url,
        bind_addr: env_string("FLEET_BIND_ADDR", "127.0.0.1"),
        http_port: u16::try_from(env_u32("FLEET_HTTP_PORT", 8080)?).map_err(|err| {
            ConfigError::InvalidField {
                field: "FLEET_HTTP_PORT".to_string(),
                message: err.to_string(),
            }
        })?,
        log_level: env_string("FLEET_LOG_LEVEL", "info"),
        log_format: env_string("FLEET_LOG_FORMAT", "pretty"),
    };
    info!(
        bind_addr = %config.bind_addr,
        http_port = config.http_port,
        data_dir = %config.backup.data_dir,
        "configuration loaded"
    );
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn missing_data_dir_is_fatal() {
        let _guard = ENV_LOCK.lock().unwrap();
        unsafe {
            env::remove_var("FLEET_BACKUP_DATA_DIR");
        }
        assert!(matches!(
            load_backup_config(),
            Err(ConfigError::MissingEnv { .. })
        ));
    }

    #[test]
    fn invalid_worker_count_is_rejected() {
        let _guard = ENV_LOCK.lock().unwrap();
        unsafe {
            env::set_var("FLEET_BACKUP_DATA_DIR", "/tmp/fleet-test");
            env::set_var("FLEET_BACKUP_WORKER_COUNT", "0");
        }
        assert!(load_backup_config().is_err());
        unsafe {
            env::remove_var("FLEET_BACKUP_WORKER_COUNT");
            env::remove_var("FLEET_BACKUP_DATA_DIR");
        }
    }

    #[test]
    fn missing_database_url_is_fatal() {
        let _guard = ENV_LOCK.lock().unwrap();
        unsafe {
            env::remove_var("DATABASE_URL");
            env::set_var("FLEET_BACKUP_DATA_DIR", "/tmp/fleet-test");
        }
        assert!(matches!(load_from_env(), Err(ConfigError::MissingEnv { .. })));
        unsafe {
            env::remove_var("FLEET_BACKUP_DATA_DIR");
        }
    }
}
