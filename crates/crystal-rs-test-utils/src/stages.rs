use async_trait::async_trait;
use crystal_rs_core::{
    Compressor, OptimizeOptions, Optimizer, PipelineStages, StageError, StageKind, Verifier,
};
use crystal_rs_protocol::{
    CompressionConfig, CompressionResult, Conversation, Message, PromptOutput, VerificationResult,
};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Notify;

/// Compressor that keeps the transcript verbatim.
#[derive(Debug, Default)]
pub struct FixedCompressor {
    calls: Mutex<usize>,
}

impl FixedCompressor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock()
    }
}

fn passthrough(conversation: &Conversation) -> CompressionResult {
    let content = conversation.transcript();
    let tokens = content.len() as u64;
    CompressionResult {
        compressed_content: content,
        original_token_count: tokens,
        compressed_token_count: tokens,
        compression_ratio: 1.0,
        extracted_facts: Vec::new(),
    }
}

#[async_trait]
impl Compressor for FixedCompressor {
    async fn compress(
        &self,
        conversation: &Conversation,
        _config: &CompressionConfig,
    ) -> Result<CompressionResult, StageError> {
        *self.calls.lock() += 1;
        Ok(passthrough(conversation))
    }
}

/// Verifier that grounds everything with a fixed score.
#[derive(Debug, Clone, Copy)]
pub struct FixedVerifier {
    grounding_score: f64,
}

impl FixedVerifier {
    pub fn new(grounding_score: f64) -> Self {
        Self { grounding_score }
    }
}

impl Default for FixedVerifier {
    fn default() -> Self {
        Self::new(1.0)
    }
}

#[async_trait]
impl Verifier for FixedVerifier {
    async fn verify(
        &self,
        compressed_content: &str,
        _original: &[Message],
    ) -> Result<VerificationResult, StageError> {
        Ok(VerificationResult {
            verified_content: compressed_content.to_string(),
            grounding_score: self.grounding_score,
            total_claims: 1,
            verified_claims: 1,
            corrections: Vec::new(),
            failed_verifications: Vec::new(),
        })
    }
}

/// Optimizer that wraps the content with the continuation prompt.
#[derive(Debug, Default, Clone, Copy)]
pub struct FixedOptimizer;

#[async_trait]
impl Optimizer for FixedOptimizer {
    async fn optimize(
        &self,
        verified_content: &str,
        verification: &VerificationResult,
        options: &OptimizeOptions,
    ) -> Result<PromptOutput, StageError> {
        let final_prompt = format!("{verified_content}\n\n{}", options.continuation_prompt);
        Ok(PromptOutput {
            estimated_tokens: final_prompt.len() as u64,
            final_prompt,
            structure_breakdown: BTreeMap::new(),
            quality_metrics: BTreeMap::from([(
                "grounding_score".to_string(),
                verification.grounding_score,
            )]),
            cost_estimation: BTreeMap::new(),
        })
    }
}

/// Stage that fails with a fixed cause, usable in any of the three slots.
#[derive(Debug, Clone)]
pub struct FailingStage {
    stage: StageKind,
    cause: String,
}

impl FailingStage {
    pub fn new(stage: StageKind, cause: impl Into<String>) -> Self {
        Self {
            stage,
            cause: cause.into(),
        }
    }

    fn error(&self) -> StageError {
        StageError::new(self.stage, self.cause.clone())
    }
}

#[async_trait]
impl Compressor for FailingStage {
    async fn compress(
        &self,
        _conversation: &Conversation,
        _config: &CompressionConfig,
    ) -> Result<CompressionResult, StageError> {
        Err(self.error())
    }
}

#[async_trait]
impl Verifier for FailingStage {
    async fn verify(
        &self,
        _compressed_content: &str,
        _original: &[Message],
    ) -> Result<VerificationResult, StageError> {
        Err(self.error())
    }
}

#[async_trait]
impl Optimizer for FailingStage {
    async fn optimize(
        &self,
        _verified_content: &str,
        _verification: &VerificationResult,
        _options: &OptimizeOptions,
    ) -> Result<PromptOutput, StageError> {
        Err(self.error())
    }
}

/// Compressor that blocks until released, to hold runs mid-stage.
#[derive(Debug, Default)]
pub struct GatedCompressor {
    entered: Notify,
    gate: Notify,
}

impl GatedCompressor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolves once a compression call is waiting on the gate.
    pub async fn entered(&self) {
        self.entered.notified().await;
    }

    /// Let one waiting (or the next) compression call proceed.
    pub fn release(&self) {
        self.gate.notify_one();
    }
}

#[async_trait]
impl Compressor for GatedCompressor {
    async fn compress(
        &self,
        conversation: &Conversation,
        _config: &CompressionConfig,
    ) -> Result<CompressionResult, StageError> {
        self.entered.notify_one();
        self.gate.notified().await;
        Ok(passthrough(conversation))
    }
}

/// Fixed stages with the given compressor.
pub fn fixed_stages(compressor: Arc<dyn Compressor>) -> PipelineStages {
    PipelineStages::new(
        compressor,
        Arc::new(FixedVerifier::default()),
        Arc::new(FixedOptimizer),
    )
}
