//! Configuration schema for crystal.

use serde::{Deserialize, Serialize};

/// Root config for the crystal service.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct CrystalConfig {
    #[serde(default, rename = "$schema")]
    pub schema: Option<String>,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub extract: ExtractConfig,
}

impl CrystalConfig {
    /// Start building a config programmatically with defaults applied.
    pub fn builder() -> CrystalConfigBuilder {
        CrystalConfigBuilder::new()
    }
}

/// Builder for assembling a `CrystalConfig` in code.
#[derive(Debug, Default, Clone)]
pub struct CrystalConfigBuilder {
    config: CrystalConfig,
}

impl CrystalConfigBuilder {
    /// Create a new builder seeded with default config values.
    pub fn new() -> Self {
        Self {
            config: CrystalConfig::default(),
        }
    }

    /// Replace the pipeline configuration.
    pub fn pipeline(mut self, pipeline: PipelineConfig) -> Self {
        self.config.pipeline = pipeline;
        self
    }

    /// Replace the store configuration.
    pub fn store(mut self, store: StoreConfig) -> Self {
        self.config.store = store;
        self
    }

    /// Replace the extraction configuration.
    pub fn extract(mut self, extract: ExtractConfig) -> Self {
        self.config.extract = extract;
        self
    }

    /// Finalize and return the built `CrystalConfig`.
    pub fn build(self) -> CrystalConfig {
        self.config
    }
}

/// Pipeline orchestration settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PipelineConfig {
    /// Ratio used when a caller does not pick one.
    #[serde(default = "default_compression_ratio")]
    pub default_compression_ratio: f64,
    /// Deadline applied to each stage invocation; none when absent.
    #[serde(default)]
    pub stage_timeout_secs: Option<u64>,
    /// Grounding score below which the optimizer switches technique.
    #[serde(default = "default_low_grounding_threshold")]
    pub low_grounding_threshold: f64,
    /// Closing instruction appended to optimized prompts.
    #[serde(default = "default_continuation_prompt")]
    pub continuation_prompt: String,
    #[serde(default)]
    pub retention: RetentionConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            default_compression_ratio: default_compression_ratio(),
            stage_timeout_secs: None,
            low_grounding_threshold: default_low_grounding_threshold(),
            continuation_prompt: default_continuation_prompt(),
            retention: RetentionConfig::default(),
        }
    }
}

fn default_compression_ratio() -> f64 {
    0.8
}

fn default_low_grounding_threshold() -> f64 {
    0.8
}

fn default_continuation_prompt() -> String {
    "Please continue from the previous context.".to_string()
}

/// Retention of finished pipeline statuses.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RetentionConfig {
    /// Seconds a finished status stays queryable.
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
    /// Upper bound on retained statuses; oldest finished ones go first.
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl_secs(),
            max_entries: default_max_entries(),
        }
    }
}

fn default_ttl_secs() -> u64 {
    3600
}

fn default_max_entries() -> usize {
    1024
}

/// Conversation store settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoreConfig {
    /// Persist to disk; an in-memory store is used when disabled.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Store root; relative paths resolve against the working directory.
    #[serde(default)]
    pub path: Option<String>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: None,
        }
    }
}

fn default_true() -> bool {
    true
}

/// Export ingestion settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExtractConfig {
    /// Largest export payload accepted, in bytes.
    #[serde(default = "default_max_payload_bytes")]
    pub max_payload_bytes: usize,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            max_payload_bytes: default_max_payload_bytes(),
        }
    }
}

fn default_max_payload_bytes() -> usize {
    64 * 1024 * 1024
}
