//! Layered configuration loader.
//!
//! Discovers configuration layers (user/cwd/repo/runtime), validates each
//! against the schema, merges them, and produces a final `CrystalConfig`.

mod layer_io;
mod merge;
mod schema;


use crate::{ConfigError, CrystalConfig, StoreConfig};
use log::{debug, info};
use serde_json::Value;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

/// Default config filename in local layers.
const DEFAULT_CONFIG_FILE: &str = "crystal.json5";
/// Default config directory under user or repo roots.
const DEFAULT_CONFIG_DIR: &str = ".crystal";
/// Store directory name under the user config dir.
const DEFAULT_STORE_DIR: &str = "store";
/// Marker files/dirs that identify a project root.
const DEFAULT_PROJECT_ROOT_MARKERS: &[&str] = &[".git"];

/// Effective config plus metadata about which layers were loaded.
#[derive(Debug, Clone)]
pub struct LayeredConfig {
    /// The merged, validated config.
    pub config: CrystalConfig,
    /// Metadata for each layer that contributed.
    pub layers: Vec<ConfigLayer>,
}

/// Origin for a single config layer in the stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigLayerSource {
    /// User-specific configuration.
    User,
    /// Current working directory configuration.
    Cwd,
    /// Repo-local configuration.
    Repo,
    /// Runtime overrides (highest precedence).
    Runtime,
}

impl ConfigLayerSource {
    fn as_str(&self) -> &'static str {
        match self {
            ConfigLayerSource::User => "user",
            ConfigLayerSource::Cwd => "cwd",
            ConfigLayerSource::Repo => "repo",
            ConfigLayerSource::Runtime => "runtime",
        }
    }
}

/// Metadata about a loaded config layer.
#[derive(Debug, Clone)]
pub struct ConfigLayer {
    /// Layer origin.
    pub source: ConfigLayerSource,
    /// Location on disk.
    pub path: PathBuf,
}

/// Options controlling layered config discovery and overrides.
#[derive(Debug, Clone)]
pub struct LayeredConfigOptions {
    /// Working directory used to resolve local layers.
    pub cwd: PathBuf,
    /// Optional user config path (defaults to `~/.crystal/crystal.json5`).
    pub user_config_path: Option<PathBuf>,
    /// Runtime override config paths applied last, in order.
    pub runtime_paths: Vec<PathBuf>,
    /// Marker files/dirs used to detect the project root.
    pub project_root_markers: Vec<String>,
}

impl LayeredConfigOptions {
    /// Create options with default layer locations for the provided cwd.
    pub fn new(cwd: impl AsRef<Path>) -> Self {
        Self {
            cwd: cwd.as_ref().to_path_buf(),
            user_config_path: layer_io::default_user_config_path(),
            runtime_paths: Vec::new(),
            project_root_markers: DEFAULT_PROJECT_ROOT_MARKERS
                .iter()
                .map(|marker| marker.to_string())
                .collect(),
        }
    }

    /// Add a runtime override config path that is applied last.
    pub fn with_runtime_path(mut self, path: impl AsRef<Path>) -> Self {
        self.runtime_paths.push(path.as_ref().to_path_buf());
        self
    }
}

impl CrystalConfig {
    /// Load a single config from a path (no layering).
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        info!("loading config from path: {}", path.display());
        let contents = fs::read_to_string(path)?;
        let label = path.display().to_string();
        let value = layer_io::parse_json5(&contents, &label)?;
        config_from_value(value, &label)
    }

    /// Load a single config from JSON5 contents (no layering).
    pub fn load_from_str(contents: &str) -> Result<Self, ConfigError> {
        debug!("loading config from raw contents (len={})", contents.len());
        let value = layer_io::parse_json5(contents, "config")?;
        config_from_value(value, "config")
    }

    /// Load a layered config stack using the default layer locations.
    pub fn load_layered(cwd: impl AsRef<Path>) -> Result<LayeredConfig, ConfigError> {
        info!(
            "loading layered config with defaults (cwd={})",
            cwd.as_ref().display()
        );
        Self::load_layered_with_options(LayeredConfigOptions::new(cwd))
    }

    /// Load a layered config stack using explicit layer locations.
    ///
    /// Layer precedence (low -> high): user, cwd, repo, runtime overrides.
    pub fn load_layered_with_options(
        options: LayeredConfigOptions,
    ) -> Result<LayeredConfig, ConfigError> {
        let cwd = normalize_path(&options.cwd)?;
        debug!("normalized cwd for config load: {}", cwd.display());

        let mut candidates = Vec::new();
        if let Some(path) = options.user_config_path.clone() {
            candidates.push((ConfigLayerSource::User, path, false));
        }
        candidates.push((ConfigLayerSource::Cwd, cwd.join(DEFAULT_CONFIG_FILE), false));
        match find_project_root(&cwd, &options.project_root_markers) {
            Some(root) => {
                debug!("resolved project root: {}", root.display());
                candidates.push((
                    ConfigLayerSource::Repo,
                    root.join(DEFAULT_CONFIG_DIR).join(DEFAULT_CONFIG_FILE),
                    false,
                ));
            }
            None => debug!("project root not found; skipping repo layer"),
        }
        for path in &options.runtime_paths {
            candidates.push((ConfigLayerSource::Runtime, path.clone(), true));
        }

        let mut layers = Vec::new();
        let mut seen = HashSet::new();
        let mut merged = Value::Object(serde_json::Map::new());
        for (source, path, required) in candidates {
            if !required && !path.exists() {
                debug!(
                    "skipping missing layer (source={:?}, path={})",
                    source,
                    path.display()
                );
                continue;
            }
            if !seen.insert(path.canonicalize().unwrap_or_else(|_| path.clone())) {
                debug!(
                    "skipping duplicate layer (source={:?}, path={})",
                    source,
                    path.display()
                );
                continue;
            }
            let value = layer_io::load_layer(source, &path)?;
            merge::merge_json_values(&mut merged, &value);
            layers.push(ConfigLayer { source, path });
        }

        let config = config_from_value(merged, "effective")?;
        info!("layered config loaded (layers={})", layers.len());
        Ok(LayeredConfig { config, layers })
    }

    /// Validate range invariants that cannot be expressed in serde.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let pipeline = &self.pipeline;
        let ratio = pipeline.default_compression_ratio;
        if !(ratio > 0.0 && ratio <= 1.0) {
            return Err(out_of_range(
                "pipeline.default_compression_ratio",
                format!("must be in (0, 1], got {ratio}"),
            ));
        }
        let threshold = pipeline.low_grounding_threshold;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(out_of_range(
                "pipeline.low_grounding_threshold",
                format!("must be in [0, 1], got {threshold}"),
            ));
        }
        if pipeline.stage_timeout_secs == Some(0) {
            return Err(out_of_range(
                "pipeline.stage_timeout_secs",
                "must be at least 1 when set".to_string(),
            ));
        }
        if pipeline.retention.max_entries == 0 {
            return Err(out_of_range(
                "pipeline.retention.max_entries",
                "must be at least 1".to_string(),
            ));
        }
        if self.extract.max_payload_bytes == 0 {
            return Err(out_of_range(
                "extract.max_payload_bytes",
                "must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

impl StoreConfig {
    /// Directory the on-disk store lives in.
    ///
    /// Relative paths resolve against `cwd`; without a path the store lives
    /// under `~/.crystal/store`. Returns `None` only when no home directory
    /// can be determined.
    pub fn resolve_root(&self, cwd: impl AsRef<Path>) -> Option<PathBuf> {
        match self.path.as_deref().map(str::trim).filter(|path| !path.is_empty()) {
            Some(path) => {
                let path = Path::new(path);
                if path.is_absolute() {
                    Some(path.to_path_buf())
                } else {
                    Some(cwd.as_ref().join(path))
                }
            }
            None => layer_io::default_user_config_dir().map(|dir| dir.join(DEFAULT_STORE_DIR)),
        }
    }
}

fn out_of_range(path: &str, message: String) -> ConfigError {
    ConfigError::OutOfRange {
        path: path.to_string(),
        message,
    }
}

fn config_from_value(value: Value, label: &str) -> Result<CrystalConfig, ConfigError> {
    schema::validate_layer_schema(&value, label)?;
    let config: CrystalConfig = serde_json::from_value(value)?;
    config.validate()?;
    Ok(config)
}

/// Normalize a path by canonicalizing when possible, preserving NotFound.
fn normalize_path(path: &Path) -> Result<PathBuf, ConfigError> {
    match path.canonicalize() {
        Ok(path) => Ok(path),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(path.to_path_buf()),
        Err(err) => Err(ConfigError::ReadFailed(err)),
    }
}

/// Walk ancestors to find a directory containing any marker entries.
fn find_project_root(cwd: &Path, markers: &[String]) -> Option<PathBuf> {
    cwd.ancestors()
        .find(|ancestor| markers.iter().any(|marker| ancestor.join(marker).exists()))
        .map(Path::to_path_buf)
}
