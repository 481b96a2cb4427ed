//! Config file discovery and layered loading.
//!
//! Precedence, lowest to highest:
//! 1. Embedded defaults (`defaults.toml`, compiled into the binary)
//! 2. System config (`/etc/signond/config.toml`)
//! 3. User config (`~/.config/signond/config.toml`)
//! 4. An explicit path passed on the command line

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{ConfigError, ConfigResult};
use crate::merge::merge_tables;
use crate::types::Config;
use crate::validate;

const DEFAULTS_TOML: &str = include_str!("defaults.toml");

/// Load the layered configuration. `explicit_path`, when given, is
/// merged last and therefore wins over every discovered file.
///
/// # Errors
///
/// Returns a [`ConfigError`] if a discovered file exists but fails to
/// parse, or if the fully merged configuration fails validation.
pub fn load(explicit_path: Option<&Path>) -> ConfigResult<Config> {
    let mut merged: toml::Value = toml::from_str(DEFAULTS_TOML).map_err(ConfigError::Shape)?;

    let system_path = PathBuf::from("/etc/signond/config.toml");
    if let Some(overlay) = try_load_file(&system_path)? {
        merge_tables(&mut merged, &overlay);
        info!(path = %system_path.display(), "loaded system config");
    }

    if let Some(user_path) = user_config_path() {
        if let Some(overlay) = try_load_file(&user_path)? {
            merge_tables(&mut merged, &overlay);
            info!(path = %user_path.display(), "loaded user config");
        }
    }

    if let Some(path) = explicit_path {
        let overlay = load_file_value(path)?;
        merge_tables(&mut merged, &overlay);
        info!(path = %path.display(), "loaded explicit config");
    }

    let config: Config = merged.try_into().map_err(ConfigError::Shape)?;
    validate::validate(&config)?;
    Ok(config)
}

/// Load a single config file with no layering, validated the same way
/// [`load`] validates the merged tree.
///
/// # Errors
///
/// Returns a [`ConfigError`] if the file cannot be read, parsed, or
/// fails validation.
pub fn load_file(path: &Path) -> ConfigResult<Config> {
    let mut merged: toml::Value = toml::from_str(DEFAULTS_TOML).map_err(ConfigError::Shape)?;
    let overlay = load_file_value(path)?;
    merge_tables(&mut merged, &overlay);
    let config: Config = merged.try_into().map_err(ConfigError::Shape)?;
    validate::validate(&config)?;
    Ok(config)
}

fn user_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "signond").map(|dirs| dirs.config_dir().join("config.toml"))
}

fn try_load_file(path: &Path) -> ConfigResult<Option<toml::Value>> {
    match std::fs::read_to_string(path) {
        Ok(text) => Ok(Some(parse(path, &text)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "config file not present, skipping");
            Ok(None)
        }
        Err(source) => Err(ConfigError::Io { path: path.to_path_buf(), source }),
    }
}

fn load_file_value(path: &Path) -> ConfigResult<toml::Value> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })?;
    parse(path, &text)
}

fn parse(path: &Path, text: &str) -> ConfigResult<toml::Value> {
    toml::from_str(text).map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_defaults_parse_and_validate_on_their_own() {
        let merged: toml::Value = toml::from_str(DEFAULTS_TOML).unwrap();
        let config: Config = merged.try_into().unwrap();
        validate::validate(&config).unwrap();
        assert!(config.storage.secure);
        assert_eq!(config.daemon.identity_timeout_secs, 300);
    }

    #[test]
    fn explicit_path_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[storage]\nsecure = false\nsize_mb = 16\n").unwrap();

        let config = load_file(&path).unwrap();
        assert!(!config.storage.secure);
        assert_eq!(config.storage.size_mb, 16);
        // Untouched keys still come from the embedded defaults.
        assert_eq!(config.daemon.socket_path, PathBuf::from("/run/signond/signond.sock"));
    }

    #[test]
    fn missing_explicit_path_is_an_error() {
        let err = load_file(Path::new("/no/such/signond/config.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
