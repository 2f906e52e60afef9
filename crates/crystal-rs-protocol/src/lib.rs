//! Canonical data contract shared by extractors, stores and the pipeline.

mod conversation;
mod error;
mod pipeline;

pub use conversation::{Conversation, ConversationSource, Message, Metadata, Role};
pub use error::ProtocolError;
pub use pipeline::{
    CompressionConfig, CompressionResult, Correction, DEFAULT_COMPRESSION_RATIO,
    DEFAULT_CONTINUATION_PROMPT, ExtractedFact, FailedVerification, PipelineMetrics,
    PipelineResult, PipelineStage, PipelineStatus, PromptOutput, VerificationResult,
};

use serde::{Deserialize, Serialize};

/// Identifier of a pipeline run (derived from the conversation id).
pub type RunId = String;

/// Current wall-clock time as Unix seconds.
pub fn unix_now() -> f64 {
    let now = chrono::Utc::now();
    now.timestamp() as f64 + f64::from(now.timestamp_subsec_micros()) / 1_000_000.0
}

/// Progress notification emitted on every pipeline status transition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PipelineEvent {
    /// Run that changed.
    pub run_id: RunId,
    /// Conversation the run belongs to.
    pub conversation_id: String,
    /// Stage after the transition.
    pub stage: PipelineStage,
    /// Progress after the transition.
    pub progress: f64,
    /// Human-readable description of the transition.
    pub message: String,
    /// Time of the transition.
    pub created_at: f64,
}

impl PipelineEvent {
    /// Build an event describing the given status snapshot.
    pub fn from_status(status: &PipelineStatus) -> Self {
        Self {
            run_id: status.id.clone(),
            conversation_id: status.conversation_id.clone(),
            stage: status.stage,
            progress: status.progress,
            message: status.message.clone(),
            created_at: status.timestamp,
        }
    }
}

/// Event sink for streaming pipeline progress to observers.
pub trait EventSink: Send + Sync {
    /// Emit an event to downstream listeners.
    fn emit(&self, event: PipelineEvent);
}
