//! Registry mapping source tags onto extractor instances.

use crate::error::ExtractError;
use crate::extractor::SourceExtractor;
use crate::providers::{
    ChatGptExtractor, ClaudeExtractor, DeepseekExtractor, MoonshotExtractor, PerplexityExtractor,
};
use crystal_rs_protocol::{Conversation, ConversationSource};
use log::{debug, info};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

/// Default upper bound on a single export payload (64 MiB).
pub const DEFAULT_MAX_PAYLOAD_BYTES: u64 = 64 * 1024 * 1024;

/// Built-in extractor for a source, if one exists.
pub fn default_extractor(source: ConversationSource) -> Option<Arc<dyn SourceExtractor>> {
    match source {
        ConversationSource::Chatgpt => Some(Arc::new(ChatGptExtractor)),
        ConversationSource::Claude => Some(Arc::new(ClaudeExtractor)),
        ConversationSource::Perplexity => Some(Arc::new(PerplexityExtractor)),
        ConversationSource::Moonshot => Some(Arc::new(MoonshotExtractor)),
        ConversationSource::Deepseek => Some(Arc::new(DeepseekExtractor)),
        ConversationSource::Gemini => None,
    }
}

/// Thread-safe registry of source extractors.
#[derive(Clone)]
pub struct ExtractorRegistry {
    extractors: Arc<RwLock<HashMap<ConversationSource, Arc<dyn SourceExtractor>>>>,
    max_payload_bytes: u64,
}

impl Default for ExtractorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ExtractorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtractorRegistry")
            .field("sources", &self.sources())
            .field("max_payload_bytes", &self.max_payload_bytes)
            .finish()
    }
}

impl ExtractorRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            extractors: Arc::new(RwLock::new(HashMap::new())),
            max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
        }
    }

    /// Create a registry with every built-in extractor.
    pub fn with_defaults() -> Self {
        let registry = Self::new();
        for source in ConversationSource::ALL {
            if let Some(extractor) = default_extractor(source) {
                registry.register(extractor);
            }
        }
        info!(
            "registered built-in extractors (count={})",
            registry.extractors.read().len()
        );
        registry
    }

    /// Override the payload size limit.
    pub fn with_max_payload_bytes(mut self, limit: u64) -> Self {
        self.max_payload_bytes = limit;
        self
    }

    /// Payload size limit in bytes.
    pub fn max_payload_bytes(&self) -> u64 {
        self.max_payload_bytes
    }

    /// Register an extractor under its source, replacing any previous one.
    pub fn register(&self, extractor: Arc<dyn SourceExtractor>) {
        let source = extractor.source();
        debug!("registering extractor (source={source})");
        self.extractors.write().insert(source, extractor);
    }

    /// Extractor registered for a source.
    pub fn get(&self, source: ConversationSource) -> Result<Arc<dyn SourceExtractor>, ExtractError> {
        self.extractors
            .read()
            .get(&source)
            .cloned()
            .ok_or_else(|| ExtractError::UnsupportedSource(source.to_string()))
    }

    /// Extractor for a raw source tag; unknown tags are unsupported too.
    pub fn get_by_tag(&self, tag: &str) -> Result<Arc<dyn SourceExtractor>, ExtractError> {
        let source: ConversationSource = tag
            .parse()
            .map_err(|_| ExtractError::UnsupportedSource(tag.to_string()))?;
        self.get(source)
    }

    /// Registered sources in declaration order.
    pub fn sources(&self) -> Vec<ConversationSource> {
        let extractors = self.extractors.read();
        ConversationSource::ALL
            .into_iter()
            .filter(|source| extractors.contains_key(source))
            .collect()
    }

    /// Extract conversations from an in-memory payload.
    pub fn extract(&self, tag: &str, raw: &[u8]) -> Result<Vec<Conversation>, ExtractError> {
        let extractor = self.get_by_tag(tag)?;
        self.check_size(raw.len() as u64)?;
        Ok(extractor.extract(raw))
    }

    /// Read an export file and extract its conversations.
    pub async fn extract_file(
        &self,
        tag: &str,
        path: impl AsRef<Path>,
    ) -> Result<Vec<Conversation>, ExtractError> {
        let path = path.as_ref();
        let extractor = self.get_by_tag(tag)?;
        let size = tokio::fs::metadata(path).await?.len();
        self.check_size(size)?;
        debug!(
            "reading export file (source={}, path={}, bytes={})",
            extractor.source(),
            path.display(),
            size
        );
        let raw = tokio::fs::read(path).await?;
        self.check_size(raw.len() as u64)?;
        Ok(extractor.extract(&raw))
    }

    fn check_size(&self, size: u64) -> Result<(), ExtractError> {
        if size > self.max_payload_bytes {
            return Err(ExtractError::PayloadTooLarge {
                size,
                limit: self.max_payload_bytes,
            });
        }
        Ok(())
    }
}
