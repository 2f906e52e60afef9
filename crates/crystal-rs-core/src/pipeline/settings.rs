use crystal_rs_config::PipelineConfig;
use crystal_rs_protocol::{DEFAULT_COMPRESSION_RATIO, DEFAULT_CONTINUATION_PROMPT};
use std::time::Duration;

/// Runtime knobs of a [`PipelineOrchestrator`](super::PipelineOrchestrator).
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineSettings {
    /// Deadline for each stage invocation.
    pub stage_timeout: Option<Duration>,
    /// How long a finished status stays queryable.
    pub retention_ttl: Duration,
    /// Upper bound on retained statuses.
    pub max_entries: usize,
    pub default_compression_ratio: f64,
    /// Used when a run's config carries no continuation prompt.
    pub continuation_prompt: String,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            stage_timeout: None,
            retention_ttl: Duration::from_secs(3600),
            max_entries: 1024,
            default_compression_ratio: DEFAULT_COMPRESSION_RATIO,
            continuation_prompt: DEFAULT_CONTINUATION_PROMPT.to_string(),
        }
    }
}

impl From<&PipelineConfig> for PipelineSettings {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            stage_timeout: config.stage_timeout_secs.map(Duration::from_secs),
            retention_ttl: Duration::from_secs(config.retention.ttl_secs),
            max_entries: config.retention.max_entries,
            default_compression_ratio: config.default_compression_ratio,
            continuation_prompt: config.continuation_prompt.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn settings_follow_pipeline_config() {
        let mut config = PipelineConfig {
            stage_timeout_secs: Some(30),
            ..PipelineConfig::default()
        };
        config.retention.ttl_secs = 60;
        config.retention.max_entries = 8;
        let settings = PipelineSettings::from(&config);
        assert_eq!(settings.stage_timeout, Some(Duration::from_secs(30)));
        assert_eq!(settings.retention_ttl, Duration::from_secs(60));
        assert_eq!(settings.max_entries, 8);
        assert_eq!(settings.continuation_prompt, config.continuation_prompt);
    }
}
