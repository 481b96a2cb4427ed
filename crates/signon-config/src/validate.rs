//! Post-merge configuration validation.

use crate::error::{ConfigError, ConfigResult};
use crate::types::Config;

/// Minimum storage size signond will accept, in megabytes. Below this a
/// LUKS header plus an ext* superblock leaves no usable space.
const MIN_STORAGE_SIZE_MB: u64 = 8;

/// Validate a fully-merged and deserialized configuration.
///
/// # Errors
///
/// Returns the first validation error found.
pub fn validate(config: &Config) -> ConfigResult<()> {
    validate_storage(config)?;
    validate_timeouts(config)?;
    Ok(())
}

fn validate_storage(config: &Config) -> ConfigResult<()> {
    let storage = &config.storage;

    if storage.secure && storage.size_mb < MIN_STORAGE_SIZE_MB {
        return Err(ConfigError::Validation {
            field: "storage.size_mb".to_owned(),
            message: format!("must be at least {MIN_STORAGE_SIZE_MB} MB, got {}", storage.size_mb),
        });
    }

    if !matches!(storage.filesystem.as_str(), "ext2" | "ext3" | "ext4") {
        return Err(ConfigError::Validation {
            field: "storage.filesystem".to_owned(),
            message: format!("unsupported filesystem '{}'; expected one of: ext2, ext3, ext4", storage.filesystem),
        });
    }

    if storage.secure && storage.key_file.is_none() {
        return Err(ConfigError::Validation {
            field: "storage.key_file".to_owned(),
            message: "secure storage requires a key_file".to_owned(),
        });
    }

    Ok(())
}

fn validate_timeouts(config: &Config) -> ConfigResult<()> {
    let daemon = &config.daemon;

    if daemon.identity_timeout_secs == 0 {
        return Err(ConfigError::Validation {
            field: "daemon.identity_timeout_secs".to_owned(),
            message: "must be greater than zero".to_owned(),
        });
    }

    if daemon.authsession_timeout_secs == 0 {
        return Err(ConfigError::Validation {
            field: "daemon.authsession_timeout_secs".to_owned(),
            message: "must be greater than zero".to_owned(),
        });
    }

    if daemon.plugin_start_timeout_ms == 0 {
        return Err(ConfigError::Validation {
            field: "daemon.plugin_start_timeout_ms".to_owned(),
            message: "must be greater than zero".to_owned(),
        });
    }

    if !matches!(daemon.access_policy.as_str(), "strict" | "noop") {
        return Err(ConfigError::Validation {
            field: "daemon.access_policy".to_owned(),
            message: format!("must be 'strict' or 'noop', got '{}'", daemon.access_policy),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DaemonConfig, StorageConfig};
    use std::path::PathBuf;

    fn sample() -> Config {
        Config {
            storage: StorageConfig {
                secure: true,
                size_mb: 64,
                filesystem: "ext4".to_owned(),
                backing_file: PathBuf::from("/var/lib/signond/secrets.img"),
                mount_path: PathBuf::from("/var/lib/signond/mount"),
                key_file: Some(PathBuf::from("/etc/signond/volume.key")),
            },
            daemon: DaemonConfig {
                socket_path: PathBuf::from("/run/signond/signond.sock"),
                plugin_dir: PathBuf::from("/usr/lib/signond/plugins"),
                identity_timeout_secs: 300,
                authsession_timeout_secs: 300,
                plugin_start_timeout_ms: 5000,
                access_policy: "strict".to_owned(),
            },
        }
    }

    #[test]
    fn sample_config_is_valid() {
        validate(&sample()).unwrap();
    }

    #[test]
    fn rejects_undersized_secure_storage() {
        let mut config = sample();
        config.storage.size_mb = 1;
        let err = validate(&config).unwrap_err();
        assert!(matches!(err, ConfigError::Validation { field, .. } if field == "storage.size_mb"));
    }

    #[test]
    fn rejects_unknown_filesystem() {
        let mut config = sample();
        config.storage.filesystem = "btrfs".to_owned();
        let err = validate(&config).unwrap_err();
        assert!(matches!(err, ConfigError::Validation { field, .. } if field == "storage.filesystem"));
    }

    #[test]
    fn secure_storage_requires_a_key_file() {
        let mut config = sample();
        config.storage.key_file = None;
        let err = validate(&config).unwrap_err();
        assert!(matches!(err, ConfigError::Validation { field, .. } if field == "storage.key_file"));
    }

    #[test]
    fn insecure_storage_is_fine_without_a_key_file() {
        let mut config = sample();
        config.storage.secure = false;
        config.storage.key_file = None;
        validate(&config).unwrap();
    }

    #[test]
    fn rejects_zero_timeouts() {
        let mut config = sample();
        config.daemon.identity_timeout_secs = 0;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn rejects_unknown_access_policy() {
        let mut config = sample();
        config.daemon.access_policy = "permissive".to_owned();
        let err = validate(&config).unwrap_err();
        assert!(matches!(err, ConfigError::Validation { field, .. } if field == "daemon.access_policy"));
    }

    #[test]
    fn accepts_noop_access_policy() {
        let mut config = sample();
        config.daemon.access_policy = "noop".to_owned();
        validate(&config).unwrap();
    }
}
