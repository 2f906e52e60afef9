//! IO helpers for reading config layers from disk.

use super::{ConfigLayerSource, DEFAULT_CONFIG_DIR, DEFAULT_CONFIG_FILE, schema};
use crate::ConfigError;
use directories::UserDirs;
use log::debug;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

/// Read, parse and schema-check a single layer.
pub(super) fn load_layer(source: ConfigLayerSource, path: &Path) -> Result<Value, ConfigError> {
    debug!(
        "loading config layer (source={:?}, path={})",
        source,
        path.display()
    );
    let contents = fs::read_to_string(path)?;
    let label = format!("{}({})", source.as_str(), path.display());
    let value = parse_json5(&contents, &label)?;
    schema::validate_layer_schema(&value, &label)?;
    Ok(value)
}

/// Parse JSON5 text, tagging failures with the layer label.
pub(super) fn parse_json5(contents: &str, label: &str) -> Result<Value, ConfigError> {
    json5::from_str(contents).map_err(|source| ConfigError::ParseFailed {
        layer: label.to_string(),
        source,
    })
}

/// Per-user config directory (`~/.crystal`).
pub(super) fn default_user_config_dir() -> Option<PathBuf> {
    UserDirs::new().map(|dirs| dirs.home_dir().join(DEFAULT_CONFIG_DIR))
}

/// Default user config path under the home directory.
pub(super) fn default_user_config_path() -> Option<PathBuf> {
    default_user_config_dir().map(|dir| dir.join(DEFAULT_CONFIG_FILE))
}
