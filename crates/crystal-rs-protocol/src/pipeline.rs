//! Pipeline state machine, stage outputs and persisted results.

use crate::error::ProtocolError;
use crate::{RunId, unix_now};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Default share of the original tokens the compressor aims to keep.
pub const DEFAULT_COMPRESSION_RATIO: f64 = 0.8;
/// Default closing instruction appended to optimized prompts.
pub const DEFAULT_CONTINUATION_PROMPT: &str = "Please continue from the previous context.";

/// Stages of a pipeline run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum PipelineStage {
    Initializing,
    Compression,
    Verification,
    Optimization,
    Completed,
    Failed,
}

impl PipelineStage {
    /// Return the stage name as used on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStage::Initializing => "initializing",
            PipelineStage::Compression => "compression",
            PipelineStage::Verification => "verification",
            PipelineStage::Optimization => "optimization",
            PipelineStage::Completed => "completed",
            PipelineStage::Failed => "failed",
        }
    }

    /// Whether the stage is absorbing.
    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineStage::Completed | PipelineStage::Failed)
    }

    /// Fixed progress checkpoint reached when entering the stage.
    ///
    /// `Failed` has no checkpoint of its own; a failed run keeps the progress
    /// of the last stage it entered.
    pub fn checkpoint(&self) -> Option<f64> {
        match self {
            PipelineStage::Initializing => Some(0.0),
            PipelineStage::Compression => Some(25.0),
            PipelineStage::Verification => Some(50.0),
            PipelineStage::Optimization => Some(75.0),
            PipelineStage::Completed => Some(100.0),
            PipelineStage::Failed => None,
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PipelineStage {
    type Err = ProtocolError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "initializing" => Ok(PipelineStage::Initializing),
            "compression" => Ok(PipelineStage::Compression),
            "verification" => Ok(PipelineStage::Verification),
            "optimization" => Ok(PipelineStage::Optimization),
            "completed" => Ok(PipelineStage::Completed),
            "failed" => Ok(PipelineStage::Failed),
            other => Err(ProtocolError::UnknownStage(other.to_string())),
        }
    }
}

/// Caller-supplied settings for the compression stage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompressionConfig {
    /// Target share of original tokens to keep, in (0, 1].
    pub compression_ratio: f64,
    /// Keep fenced code blocks verbatim.
    #[serde(default = "default_true")]
    pub preserve_code_blocks: bool,
    /// Closing instruction for the optimized prompt.
    #[serde(default)]
    pub user_continuation_prompt: Option<String>,
}

fn default_true() -> bool {
    true
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            compression_ratio: DEFAULT_COMPRESSION_RATIO,
            preserve_code_blocks: true,
            user_continuation_prompt: None,
        }
    }
}

impl CompressionConfig {
    /// Build a config with the given ratio and default flags.
    pub fn with_ratio(compression_ratio: f64) -> Self {
        Self {
            compression_ratio,
            ..Self::default()
        }
    }

    /// Check the ratio lies in (0, 1].
    pub fn validate(&self) -> Result<(), ProtocolError> {
        let ratio = self.compression_ratio;
        if !ratio.is_finite() || ratio <= 0.0 || ratio > 1.0 {
            return Err(ProtocolError::InvalidConfig(format!(
                "compression_ratio must be in (0, 1], got {ratio}"
            )));
        }
        Ok(())
    }
}

/// Structured fact pulled out of a conversation during compression.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExtractedFact {
    /// Fact category (`code`, `url`, `figure`, ...).
    pub kind: String,
    /// Fact text.
    pub content: String,
    /// Index of the message the fact came from.
    pub message_index: usize,
}

/// Output of the compression stage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompressionResult {
    pub compressed_content: String,
    pub original_token_count: u64,
    pub compressed_token_count: u64,
    pub compression_ratio: f64,
    pub extracted_facts: Vec<ExtractedFact>,
}

/// Change applied to compressed content during verification.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Correction {
    /// Claim text the correction applies to.
    pub claim: String,
    /// Action taken (`removed`, ...).
    pub action: String,
}

/// Claim that could not be grounded in the original messages.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FailedVerification {
    pub claim: String,
    pub reason: String,
    /// Share of the claim's terms found in the source, in [0, 1].
    pub support: f64,
}

/// Output of the verification stage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VerificationResult {
    pub verified_content: String,
    /// Share of verified claims, in [0, 1].
    pub grounding_score: f64,
    pub total_claims: u64,
    pub verified_claims: u64,
    pub corrections: Vec<Correction>,
    pub failed_verifications: Vec<FailedVerification>,
}

/// Output of the optimization stage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PromptOutput {
    pub final_prompt: String,
    pub structure_breakdown: BTreeMap<String, String>,
    pub estimated_tokens: u64,
    pub quality_metrics: BTreeMap<String, f64>,
    pub cost_estimation: BTreeMap<String, f64>,
}

/// Metrics bundle persisted with every pipeline result.
///
/// Field names are part of the persisted contract.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PipelineMetrics {
    pub compression_ratio: f64,
    pub grounding_score: f64,
    pub original_tokens: u64,
    pub compressed_tokens: u64,
}

impl PipelineMetrics {
    /// Derive metrics from the compression and verification outputs.
    pub fn derive(compressed: &CompressionResult, verified: &VerificationResult) -> Self {
        Self {
            compression_ratio: compressed.compression_ratio,
            grounding_score: verified.grounding_score,
            original_tokens: compressed.original_token_count,
            compressed_tokens: compressed.compressed_token_count,
        }
    }
}

/// Persisted outcome of a completed pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PipelineResult {
    pub run_id: RunId,
    pub conversation_id: String,
    pub compressed: CompressionResult,
    pub verified: VerificationResult,
    pub optimized: PromptOutput,
    pub metrics: PipelineMetrics,
    pub created_at: f64,
}

impl PipelineResult {
    /// Assemble a result, deriving its metrics bundle.
    pub fn new(
        run_id: impl Into<RunId>,
        conversation_id: impl Into<String>,
        compressed: CompressionResult,
        verified: VerificationResult,
        optimized: PromptOutput,
    ) -> Self {
        let metrics = PipelineMetrics::derive(&compressed, &verified);
        Self {
            run_id: run_id.into(),
            conversation_id: conversation_id.into(),
            compressed,
            verified,
            optimized,
            metrics,
            created_at: unix_now(),
        }
    }

    /// Metrics as a JSON object keyed by the persisted field names.
    pub fn metrics_json(&self) -> Value {
        serde_json::to_value(self.metrics).unwrap_or(Value::Null)
    }
}

/// Live status record of a pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PipelineStatus {
    pub id: RunId,
    pub conversation_id: String,
    pub stage: PipelineStage,
    /// Progress in [0, 100], non-decreasing within a run.
    pub progress: f64,
    pub message: String,
    /// Present only once the run completed.
    #[serde(default)]
    pub result: Option<PromptOutput>,
    /// Present only once the run failed.
    #[serde(default)]
    pub error: Option<String>,
    /// Time of the last update.
    pub timestamp: f64,
}

impl PipelineStatus {
    /// Fresh status for a run that has just been submitted.
    pub fn initializing(id: RunId, conversation_id: String) -> Self {
        Self {
            id,
            conversation_id,
            stage: PipelineStage::Initializing,
            progress: 0.0,
            message: "Starting compression pipeline...".to_string(),
            result: None,
            error: None,
            timestamp: unix_now(),
        }
    }

    /// Whether the run reached an absorbing state.
    pub fn is_terminal(&self) -> bool {
        self.stage.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn checkpoints_are_monotonic_along_the_happy_path() {
        let path = [
            PipelineStage::Initializing,
            PipelineStage::Compression,
            PipelineStage::Verification,
            PipelineStage::Optimization,
            PipelineStage::Completed,
        ];
        let checkpoints: Vec<f64> = path.iter().filter_map(|stage| stage.checkpoint()).collect();
        assert_eq!(checkpoints, vec![0.0, 25.0, 50.0, 75.0, 100.0]);
        assert_eq!(PipelineStage::Failed.checkpoint(), None);
        assert!(PipelineStage::Failed.is_terminal());
        assert!(!PipelineStage::Optimization.is_terminal());
    }

    #[test]
    fn compression_config_rejects_out_of_range_ratios() {
        assert!(CompressionConfig::with_ratio(0.0).validate().is_err());
        assert!(CompressionConfig::with_ratio(1.5).validate().is_err());
        assert!(CompressionConfig::with_ratio(f64::NAN).validate().is_err());
        assert_eq!(CompressionConfig::with_ratio(1.0).validate(), Ok(()));
    }

    #[test]
    fn compression_config_defaults_flags_when_deserializing() {
        let config: CompressionConfig =
            serde_json::from_value(json!({ "compression_ratio": 0.5 })).expect("config");
        assert_eq!(config, CompressionConfig::with_ratio(0.5));
    }

    #[test]
    fn metrics_use_persisted_key_names() {
        let compressed = CompressionResult {
            compressed_content: "short".to_string(),
            original_token_count: 100,
            compressed_token_count: 40,
            compression_ratio: 0.4,
            extracted_facts: Vec::new(),
        };
        let verified = VerificationResult {
            verified_content: "short".to_string(),
            grounding_score: 0.9,
            total_claims: 10,
            verified_claims: 9,
            corrections: Vec::new(),
            failed_verifications: Vec::new(),
        };
        let optimized = PromptOutput {
            final_prompt: "prompt".to_string(),
            structure_breakdown: BTreeMap::new(),
            estimated_tokens: 2,
            quality_metrics: BTreeMap::new(),
            cost_estimation: BTreeMap::new(),
        };
        let result = PipelineResult::new("pipeline_a", "a", compressed, verified, optimized);
        assert_eq!(
            result.metrics_json(),
            json!({
                "compression_ratio": 0.4,
                "grounding_score": 0.9,
                "original_tokens": 100,
                "compressed_tokens": 40,
            })
        );
    }
}
