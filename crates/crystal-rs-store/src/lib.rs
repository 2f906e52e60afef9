//! Persistence for conversations and pipeline results.
//!
//! The pipeline depends only on [`ConversationStore`]; two engines ship
//! here: an in-memory map and an append-only JSONL log.

mod error;
mod jsonl;
mod memory;
mod state;

pub use error::StoreError;
pub use jsonl::{JsonlConversationStore, STORE_FILE};
pub use memory::InMemoryConversationStore;

use async_trait::async_trait;
use crystal_rs_protocol::{
    CompressionResult, Conversation, PipelineResult, PromptOutput, VerificationResult,
};

/// Storage contract for conversations and their pipeline results.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Persist a conversation and return the id it was stored under.
    ///
    /// The conversation is validated first. When its id is already taken the
    /// store assigns a fresh `<id>-<suffix>` id instead of overwriting.
    async fn save(&self, conversation: Conversation) -> Result<String, StoreError>;

    /// Fetch a conversation by id.
    async fn get(&self, id: &str) -> Result<Option<Conversation>, StoreError>;

    /// Page through conversations, most recently extracted first.
    async fn list(&self, offset: usize, limit: usize) -> Result<Vec<Conversation>, StoreError>;

    /// Delete a conversation and its pipeline results.
    async fn delete(&self, id: &str) -> Result<bool, StoreError>;

    /// Persist the outputs of a completed run.
    ///
    /// Returns `false` when the conversation is unknown. Saving under an
    /// existing run id replaces the earlier result.
    async fn save_pipeline_result(
        &self,
        run_id: &str,
        conversation_id: &str,
        compressed: &CompressionResult,
        verified: &VerificationResult,
        optimized: &PromptOutput,
    ) -> Result<bool, StoreError>;

    /// Fetch the result persisted for a run.
    async fn get_pipeline_result(&self, run_id: &str) -> Result<Option<PipelineResult>, StoreError>;

    /// All results persisted for a conversation, oldest first.
    async fn list_pipeline_results(
        &self,
        conversation_id: &str,
    ) -> Result<Vec<PipelineResult>, StoreError>;
}
