//! Stage contracts and the built-in stage implementations.
//!
//! The orchestrator only sees the three traits below; any implementation
//! honouring their fixed input and output shapes can be plugged in.

mod compress;
mod optimize;
mod text;
mod verify;

pub use compress::ExtractiveCompressor;
pub use optimize::TemplateOptimizer;
pub use text::estimate_tokens;
pub use verify::LexicalVerifier;

use crate::error::StageError;
use async_trait::async_trait;
use crystal_rs_protocol::{
    CompressionConfig, CompressionResult, Conversation, DEFAULT_CONTINUATION_PROMPT, Message,
    PromptOutput, VerificationResult,
};
use std::sync::Arc;

/// Condenses a conversation. Must be deterministic for identical input.
#[async_trait]
pub trait Compressor: Send + Sync {
    async fn compress(
        &self,
        conversation: &Conversation,
        config: &CompressionConfig,
    ) -> Result<CompressionResult, StageError>;
}

/// Checks compressed content against the original messages.
#[async_trait]
pub trait Verifier: Send + Sync {
    async fn verify(
        &self,
        compressed_content: &str,
        original: &[Message],
    ) -> Result<VerificationResult, StageError>;
}

/// Run-level inputs for the optimizer beyond the verification outcome.
#[derive(Debug, Clone, PartialEq)]
pub struct OptimizeOptions {
    /// Closing instruction for the prompt.
    pub continuation_prompt: String,
    /// Token estimate of the uncompressed conversation.
    pub original_tokens: u64,
}

impl Default for OptimizeOptions {
    fn default() -> Self {
        Self {
            continuation_prompt: DEFAULT_CONTINUATION_PROMPT.to_string(),
            original_tokens: 0,
        }
    }
}

/// Turns verified content into a ready-to-use prompt.
#[async_trait]
pub trait Optimizer: Send + Sync {
    async fn optimize(
        &self,
        verified_content: &str,
        verification: &VerificationResult,
        options: &OptimizeOptions,
    ) -> Result<PromptOutput, StageError>;
}

/// The stage implementations a pipeline run uses.
#[derive(Clone)]
pub struct PipelineStages {
    pub compressor: Arc<dyn Compressor>,
    pub verifier: Arc<dyn Verifier>,
    pub optimizer: Arc<dyn Optimizer>,
}

impl PipelineStages {
    pub fn new(
        compressor: Arc<dyn Compressor>,
        verifier: Arc<dyn Verifier>,
        optimizer: Arc<dyn Optimizer>,
    ) -> Self {
        Self {
            compressor,
            verifier,
            optimizer,
        }
    }

    /// Built-in deterministic stages.
    pub fn builtin(low_grounding_threshold: f64) -> Self {
        Self::new(
            Arc::new(ExtractiveCompressor),
            Arc::new(LexicalVerifier::default()),
            Arc::new(TemplateOptimizer::new(low_grounding_threshold)),
        )
    }
}

impl std::fmt::Debug for PipelineStages {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineStages").finish_non_exhaustive()
    }
}
