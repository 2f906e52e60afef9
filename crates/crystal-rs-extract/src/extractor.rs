//! Extractor contract and per-batch bookkeeping.

use crate::error::ParseError;
use crystal_rs_protocol::{Conversation, ConversationSource, unix_now};
use log::{debug, warn};
use serde_json::Value;
use std::collections::HashSet;
use uuid::Uuid;

/// State shared by every item of one extraction batch.
#[derive(Debug)]
pub struct ExtractionBatch {
    /// Wall clock captured once, so synthesized timestamps agree within a batch.
    now: f64,
    /// Position of the item currently being extracted.
    item_index: usize,
    /// Conversation ids already handed out in this batch.
    assigned_ids: HashSet<String>,
}

impl Default for ExtractionBatch {
    fn default() -> Self {
        Self::new()
    }
}

impl ExtractionBatch {
    /// Start a batch at the current wall-clock time.
    pub fn new() -> Self {
        Self::with_clock(unix_now())
    }

    /// Start a batch with a fixed clock.
    pub fn with_clock(now: f64) -> Self {
        Self {
            now,
            item_index: 0,
            assigned_ids: HashSet::new(),
        }
    }

    /// Fallback timestamp for messages and conversations without one.
    pub fn now(&self) -> f64 {
        self.now
    }

    /// Index of the current item within the export root.
    pub fn item_index(&self) -> usize {
        self.item_index
    }

    pub(crate) fn set_item_index(&mut self, index: usize) {
        self.item_index = index;
    }

    /// Hand out a conversation id that is unique within this batch.
    ///
    /// Native ids are reused; a native id seen earlier in the batch gets a
    /// `-<n>` suffix. Without a native id, `<prefix>_<uuid>` is synthesized.
    pub fn assign_id(&mut self, source: ConversationSource, native_id: Option<&str>) -> String {
        let native_id = native_id.map(str::trim).filter(|id| !id.is_empty());
        let id = match native_id {
            Some(native) if !self.assigned_ids.contains(native) => native.to_string(),
            Some(native) => {
                let mut suffix = 2;
                loop {
                    let candidate = format!("{native}-{suffix}");
                    if !self.assigned_ids.contains(&candidate) {
                        debug!("suffixed duplicate conversation id (id={native}, new_id={candidate})");
                        break candidate;
                    }
                    suffix += 1;
                }
            }
            None => loop {
                let candidate = format!("{}_{}", source.id_prefix(), Uuid::new_v4());
                if !self.assigned_ids.contains(&candidate) {
                    break candidate;
                }
            },
        };
        self.assigned_ids.insert(id.clone());
        id
    }
}

/// Parser for one provider's export format.
pub trait SourceExtractor: Send + Sync {
    /// Provider handled by this extractor.
    fn source(&self) -> ConversationSource;

    /// Convert one export item into a canonical conversation.
    fn extract_item(
        &self,
        item: &Value,
        batch: &mut ExtractionBatch,
    ) -> Result<Conversation, ParseError>;

    /// Extract every conversation from a parsed export root.
    ///
    /// The root may be a single object or a list of objects. Items that fail
    /// to parse are logged and skipped; the order of valid items is kept.
    fn extract_value(&self, root: &Value) -> Vec<Conversation> {
        let items: Vec<&Value> = match root {
            Value::Array(items) => items.iter().collect(),
            other => vec![other],
        };
        let mut batch = ExtractionBatch::new();
        let mut conversations = Vec::with_capacity(items.len());
        for (index, item) in items.into_iter().enumerate() {
            batch.set_item_index(index);
            match self.extract_item(item, &mut batch) {
                Ok(conversation) => conversations.push(conversation),
                Err(err) => warn!(
                    "skipping export item (source={}, index={}, reason={})",
                    self.source(),
                    index,
                    err
                ),
            }
        }
        debug!(
            "extracted conversations (source={}, count={})",
            self.source(),
            conversations.len()
        );
        conversations
    }

    /// Extract every conversation from raw export bytes.
    ///
    /// Undecodable payloads yield an empty result rather than an error.
    fn extract(&self, raw: &[u8]) -> Vec<Conversation> {
        match decode_payload(raw) {
            Ok(root) => self.extract_value(&root),
            Err(err) => {
                warn!(
                    "discarding export payload (source={}, bytes={}, reason={})",
                    self.source(),
                    raw.len(),
                    err
                );
                Vec::new()
            }
        }
    }
}

fn decode_payload(raw: &[u8]) -> Result<Value, ParseError> {
    let text = std::str::from_utf8(raw).map_err(|err| ParseError::InvalidPayload(err.to_string()))?;
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    serde_json::from_str(text).map_err(|err| ParseError::InvalidPayload(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::ExtractionBatch;
    use crystal_rs_protocol::ConversationSource;
    use pretty_assertions::assert_eq;

    #[test]
    fn assign_id_reuses_native_ids_and_suffixes_duplicates() {
        let mut batch = ExtractionBatch::with_clock(10.0);
        let source = ConversationSource::Chatgpt;
        assert_eq!(batch.assign_id(source, Some("abc")), "abc");
        assert_eq!(batch.assign_id(source, Some(" abc ")), "abc-2");
        assert_eq!(batch.assign_id(source, Some("abc")), "abc-3");
    }

    #[test]
    fn assign_id_synthesizes_prefixed_ids() {
        let mut batch = ExtractionBatch::with_clock(10.0);
        let first = batch.assign_id(ConversationSource::Perplexity, None);
        let second = batch.assign_id(ConversationSource::Perplexity, Some("  "));
        assert!(first.starts_with("pplx_"));
        assert!(second.starts_with("pplx_"));
        assert!(first != second);
        assert_eq!(batch.now(), 10.0);
    }
}
