//! Config file discovery, loading, and environment variable overlay.

use crate::{ConfigError, FanoutConfig};
use std::env;
use std::path::{Path, PathBuf};

/// Information about where config values came from.
#[derive(Debug, Clone, Default)]
pub struct ConfigSources {
    /// Config files that were loaded (in order)
    pub files: Vec<PathBuf>,
    /// Environment variables that overrode config values
    pub env_overrides: Vec<String>,
}

/// Discover config files in standard locations.
///
/// Returns paths in load order (system, user, local).
/// Only returns files that exist.
pub fn discover_config_files() -> Vec<PathBuf> {
    discover_config_files_with_override(None)
}

/// Discover config files, optionally with a CLI override path.
///
/// If `cli_path` is provided it replaces the local override. Unlike the
/// standard locations it is returned even when missing, so the read fails
/// loudly instead of silently falling back to defaults.
pub fn discover_config_files_with_override(cli_path: Option<&Path>) -> Vec<PathBuf> {
    let mut files = Vec::new();

    // System config
    let system = PathBuf::from("/etc/fanout/config.toml");
    if system.exists() {
        files.push(system);
    }

    // User config (XDG_CONFIG_HOME or ~/.config)
    if let Some(config_dir) = directories::BaseDirs::new().map(|d| d.config_dir().to_path_buf()) {
        let user = config_dir.join("fanout/config.toml");
        if user.exists() {
            files.push(user);
        }
    }

    if let Some(path) = cli_path {
        files.push(path.to_path_buf());
        return files;
    }

    // Local override (current directory)
    let local = PathBuf::from("fanout.toml");
    if local.exists() {
        files.push(local);
    }

    files
}

/// Read a config file as a raw TOML table.
pub fn load_table(path: &Path) -> Result<toml::Table, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;

    parse_table(&contents, path)
}

fn parse_table(contents: &str, path: &Path) -> Result<toml::Table, ConfigError> {
    contents.parse().map_err(|e: toml::de::Error| ConfigError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

/// Merge `overlay` into `base` key by key.
///
/// Tables merge recursively; every other value (arrays included) is replaced
/// wholesale by the overlay.
pub fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(incoming)) => {
                merge_tables(existing, incoming);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

/// Turn a merged table into a typed config. Missing keys take their defaults.
pub fn from_table(table: toml::Table, origin: &Path) -> Result<FanoutConfig, ConfigError> {
    toml::Value::Table(table)
        .try_into()
        .map_err(|e: toml::de::Error| ConfigError::Parse {
            path: origin.to_path_buf(),
            message: e.to_string(),
        })
}

/// Apply environment variable overrides to config.
pub fn apply_env_overrides(config: &mut FanoutConfig, sources: &mut ConfigSources) -> Result<(), ConfigError> {
    apply_overrides_from(config, sources, |key| env::var(key).ok())
}

/// Same as [`apply_env_overrides`], reading variables through `lookup`.
pub fn apply_overrides_from<F>(
    config: &mut FanoutConfig,
    sources: &mut ConfigSources,
    lookup: F,
) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(v) = lookup("FANOUT_PACTL") {
        config.server.pactl = expand_path(&v);
        sources.env_overrides.push("FANOUT_PACTL".to_string());
    }
    if let Some(v) = lookup("FANOUT_BASE_SINK") {
        config.names.base_sink = v;
        sources.env_overrides.push("FANOUT_BASE_SINK".to_string());
    }
    if let Some(v) = lookup("FANOUT_MAX_VOLUME") {
        config.server.max_volume_percent = v.parse().map_err(|_| ConfigError::Invalid {
            field: "FANOUT_MAX_VOLUME".to_string(),
            reason: format!("not a number: {v}"),
        })?;
        sources.env_overrides.push("FANOUT_MAX_VOLUME".to_string());
    }
    if let Some(v) = lookup("FANOUT_SET_DEFAULT_SINK") {
        config.server.set_default_sink = parse_bool(&v).ok_or_else(|| ConfigError::Invalid {
            field: "FANOUT_SET_DEFAULT_SINK".to_string(),
            reason: format!("not a boolean: {v}"),
        })?;
        sources.env_overrides.push("FANOUT_SET_DEFAULT_SINK".to_string());
    }

    // Telemetry
    if let Some(v) = lookup("FANOUT_LOG_LEVEL") {
        config.telemetry.log_level = v;
        sources.env_overrides.push("FANOUT_LOG_LEVEL".to_string());
    }
    // Also support RUST_LOG
    if let Some(v) = lookup("RUST_LOG") {
        config.telemetry.log_level = v;
        sources.env_overrides.push("RUST_LOG".to_string());
    }

    Ok(())
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Resolve a leading `~/` against the home directory. Anything else is
/// taken as is, so a bare `pactl` still goes through `$PATH`.
pub fn expand_path(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), directories::BaseDirs::new()) {
        (Some(rest), Some(dirs)) => dirs.home_dir().join(rest),
        _ => PathBuf::from(path),
    }
}
