//! In-memory index shared by every store engine.

use crystal_rs_protocol::{Conversation, PipelineResult, RunId};
use log::debug;
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug, Default)]
pub(crate) struct StoreState {
    conversations: HashMap<String, Conversation>,
    results: HashMap<RunId, PipelineResult>,
}

impl StoreState {
    /// Id a new conversation will be stored under.
    pub fn claim_id(&self, requested: &str) -> String {
        if !self.conversations.contains_key(requested) {
            return requested.to_string();
        }
        loop {
            let simple = Uuid::new_v4().simple().to_string();
            let candidate = format!("{requested}-{}", &simple[..8]);
            if !self.conversations.contains_key(&candidate) {
                debug!("reassigned conversation id (id={requested}, new_id={candidate})");
                return candidate;
            }
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.conversations.contains_key(id)
    }

    pub fn insert_conversation(&mut self, conversation: Conversation) {
        self.conversations.insert(conversation.id.clone(), conversation);
    }

    pub fn conversation(&self, id: &str) -> Option<Conversation> {
        self.conversations.get(id).cloned()
    }

    /// Newest extraction first; ties broken by id so pages are stable.
    pub fn page(&self, offset: usize, limit: usize) -> Vec<Conversation> {
        let mut all: Vec<&Conversation> = self.conversations.values().collect();
        all.sort_by(|left, right| {
            right
                .extracted_at
                .total_cmp(&left.extracted_at)
                .then_with(|| left.id.cmp(&right.id))
        });
        all.into_iter().skip(offset).take(limit).cloned().collect()
    }

    /// Remove a conversation together with its results.
    pub fn remove_conversation(&mut self, id: &str) -> bool {
        if self.conversations.remove(id).is_none() {
            return false;
        }
        self.results.retain(|_, result| result.conversation_id != id);
        true
    }

    pub fn upsert_result(&mut self, result: PipelineResult) {
        self.results.insert(result.run_id.clone(), result);
    }

    pub fn result(&self, run_id: &str) -> Option<PipelineResult> {
        self.results.get(run_id).cloned()
    }

    pub fn results_for(&self, conversation_id: &str) -> Vec<PipelineResult> {
        let mut results: Vec<PipelineResult> = self
            .results
            .values()
            .filter(|result| result.conversation_id == conversation_id)
            .cloned()
            .collect();
        results.sort_by(|left, right| left.created_at.total_cmp(&right.created_at));
        results
    }
}
