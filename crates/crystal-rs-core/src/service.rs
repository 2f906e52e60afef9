//! Submission surface tying extraction, storage and the pipeline together.

use crate::error::CrystalCoreError;
use crate::pipeline::{PipelineOrchestrator, PipelineSettings};
use crate::stages::PipelineStages;
use crystal_rs_config::CrystalConfig;
use crystal_rs_extract::ExtractorRegistry;
use crystal_rs_protocol::{
    CompressionConfig, Conversation, EventSink, PipelineResult, PipelineStatus, RunId,
};
use crystal_rs_store::{ConversationStore, InMemoryConversationStore, JsonlConversationStore};
use log::{debug, info};
use std::path::Path;
use std::sync::Arc;

/// Entry point for hosts: ingest exports, run pipelines, query outcomes.
#[derive(Clone)]
pub struct CrystalService {
    registry: ExtractorRegistry,
    store: Arc<dyn ConversationStore>,
    orchestrator: PipelineOrchestrator,
}

impl std::fmt::Debug for CrystalService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CrystalService")
            .field("registry", &self.registry)
            .field("orchestrator", &self.orchestrator)
            .finish_non_exhaustive()
    }
}

impl CrystalService {
    /// Assemble a service from injected parts.
    ///
    /// `orchestrator` should persist into the same `store`.
    pub fn new(
        registry: ExtractorRegistry,
        store: Arc<dyn ConversationStore>,
        orchestrator: PipelineOrchestrator,
    ) -> Self {
        Self {
            registry,
            store,
            orchestrator,
        }
    }

    /// Build the default service for a config, resolving relative store
    /// paths against the current directory.
    pub fn from_config(
        config: &CrystalConfig,
        event_sink: Option<Arc<dyn EventSink>>,
    ) -> Result<Self, CrystalCoreError> {
        let cwd = std::env::current_dir()?;
        Self::from_config_in(config, cwd, event_sink)
    }

    /// Like [`CrystalService::from_config`] with an explicit working directory.
    pub fn from_config_in(
        config: &CrystalConfig,
        cwd: impl AsRef<Path>,
        event_sink: Option<Arc<dyn EventSink>>,
    ) -> Result<Self, CrystalCoreError> {
        let registry = ExtractorRegistry::with_defaults()
            .with_max_payload_bytes(config.extract.max_payload_bytes as u64);
        let store: Arc<dyn ConversationStore> = match config.store.resolve_root(cwd) {
            Some(root) if config.store.enabled => {
                info!("opening conversation store (root={})", root.display());
                Arc::new(JsonlConversationStore::open(root)?)
            }
            _ => {
                info!("using in-memory conversation store");
                Arc::new(InMemoryConversationStore::new())
            }
        };
        let orchestrator = PipelineOrchestrator::new(
            store.clone(),
            PipelineStages::builtin(config.pipeline.low_grounding_threshold),
            PipelineSettings::from(&config.pipeline),
            event_sink,
        );
        Ok(Self::new(registry, store, orchestrator))
    }

    pub fn registry(&self) -> &ExtractorRegistry {
        &self.registry
    }

    pub fn orchestrator(&self) -> &PipelineOrchestrator {
        &self.orchestrator
    }

    /// Compression config built from the configured defaults.
    pub fn default_compression_config(&self) -> CompressionConfig {
        CompressionConfig::with_ratio(self.orchestrator.settings().default_compression_ratio)
    }

    /// Extract a raw export and store every conversation; returns stored ids.
    pub async fn ingest(&self, tag: &str, raw: &[u8]) -> Result<Vec<String>, CrystalCoreError> {
        let conversations = self.registry.extract(tag, raw)?;
        self.save_all(tag, conversations).await
    }

    /// Read an export file and store every conversation; returns stored ids.
    pub async fn ingest_file(
        &self,
        tag: &str,
        path: impl AsRef<Path>,
    ) -> Result<Vec<String>, CrystalCoreError> {
        let conversations = self.registry.extract_file(tag, path).await?;
        self.save_all(tag, conversations).await
    }

    async fn save_all(
        &self,
        tag: &str,
        conversations: Vec<Conversation>,
    ) -> Result<Vec<String>, CrystalCoreError> {
        let mut ids = Vec::with_capacity(conversations.len());
        for conversation in conversations {
            ids.push(self.store.save(conversation).await?);
        }
        info!("ingested export (source={tag}, conversations={})", ids.len());
        Ok(ids)
    }

    /// Submit a pipeline run for a stored conversation.
    pub async fn compress(
        &self,
        conversation_id: &str,
        config: CompressionConfig,
    ) -> Result<RunId, CrystalCoreError> {
        self.orchestrator.start_for(conversation_id, config).await
    }

    pub fn status(&self, run_id: &str) -> Result<PipelineStatus, CrystalCoreError> {
        self.orchestrator.get_status(run_id)
    }

    pub async fn conversation(&self, id: &str) -> Result<Conversation, CrystalCoreError> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| CrystalCoreError::not_found("conversation", id))
    }

    pub async fn conversations(
        &self,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<Conversation>, CrystalCoreError> {
        Ok(self.store.list(offset, limit).await?)
    }

    /// Delete a conversation and its results. Refused while a run is active.
    pub async fn delete_conversation(&self, id: &str) -> Result<bool, CrystalCoreError> {
        if self.orchestrator.is_active(id) {
            return Err(CrystalCoreError::InvalidInput(format!(
                "conversation {id} has a pipeline run in flight"
            )));
        }
        Ok(self.store.delete(id).await?)
    }

    /// Persisted results for a conversation, oldest first.
    pub async fn results(
        &self,
        conversation_id: &str,
    ) -> Result<Vec<PipelineResult>, CrystalCoreError> {
        Ok(self.store.list_pipeline_results(conversation_id).await?)
    }

    /// Cancel and drain every in-flight run.
    pub async fn shutdown(&self) {
        debug!("shutting down crystal service");
        self.orchestrator.cancel_all().await;
    }
}
