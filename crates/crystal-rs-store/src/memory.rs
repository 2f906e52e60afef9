//! Volatile store backed by in-process maps.

use crate::state::StoreState;
use crate::{ConversationStore, StoreError};
use async_trait::async_trait;
use crystal_rs_protocol::{
    CompressionResult, Conversation, PipelineResult, PromptOutput, VerificationResult,
};
use log::{debug, info};
use parking_lot::RwLock;
use std::sync::Arc;

/// Store keeping everything in memory; contents vanish with the process.
#[derive(Debug, Default, Clone)]
pub struct InMemoryConversationStore {
    state: Arc<RwLock<StoreState>>,
}

impl InMemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConversationStore for InMemoryConversationStore {
    async fn save(&self, mut conversation: Conversation) -> Result<String, StoreError> {
        conversation.validate()?;
        let mut state = self.state.write();
        conversation.id = state.claim_id(&conversation.id);
        let id = conversation.id.clone();
        debug!(
            "saving conversation (id={}, source={}, messages={})",
            id,
            conversation.source,
            conversation.messages.len()
        );
        state.insert_conversation(conversation);
        Ok(id)
    }

    async fn get(&self, id: &str) -> Result<Option<Conversation>, StoreError> {
        Ok(self.state.read().conversation(id))
    }

    async fn list(&self, offset: usize, limit: usize) -> Result<Vec<Conversation>, StoreError> {
        Ok(self.state.read().page(offset, limit))
    }

    async fn delete(&self, id: &str) -> Result<bool, StoreError> {
        let removed = self.state.write().remove_conversation(id);
        if removed {
            info!("deleted conversation (id={id})");
        }
        Ok(removed)
    }

    async fn save_pipeline_result(
        &self,
        run_id: &str,
        conversation_id: &str,
        compressed: &CompressionResult,
        verified: &VerificationResult,
        optimized: &PromptOutput,
    ) -> Result<bool, StoreError> {
        let mut state = self.state.write();
        if !state.contains(conversation_id) {
            debug!(
                "refusing result for unknown conversation (run_id={run_id}, conversation_id={conversation_id})"
            );
            return Ok(false);
        }
        state.upsert_result(PipelineResult::new(
            run_id,
            conversation_id,
            compressed.clone(),
            verified.clone(),
            optimized.clone(),
        ));
        Ok(true)
    }

    async fn get_pipeline_result(&self, run_id: &str) -> Result<Option<PipelineResult>, StoreError> {
        Ok(self.state.read().result(run_id))
    }

    async fn list_pipeline_results(
        &self,
        conversation_id: &str,
    ) -> Result<Vec<PipelineResult>, StoreError> {
        Ok(self.state.read().results_for(conversation_id))
    }
}
