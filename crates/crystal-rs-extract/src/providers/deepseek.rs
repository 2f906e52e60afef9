//! Deepseek chat exports.

use super::flat::FlatProfile;
use crate::error::ParseError;
use crate::extractor::{ExtractionBatch, SourceExtractor};
use crystal_rs_protocol::{Conversation, ConversationSource};
use serde_json::Value;

const PROFILE: FlatProfile = FlatProfile {
    source: ConversationSource::Deepseek,
    default_model: "deepseek-chat",
    record_index: false,
};

/// Extractor for Deepseek exports.
#[derive(Debug, Default, Clone, Copy)]
pub struct DeepseekExtractor;

impl SourceExtractor for DeepseekExtractor {
    fn source(&self) -> ConversationSource {
        PROFILE.source
    }

    fn extract_item(
        &self,
        item: &Value,
        batch: &mut ExtractionBatch,
    ) -> Result<Conversation, ParseError> {
        PROFILE.extract(item, batch)
    }
}

#[cfg(test)]
mod tests {
    use super::DeepseekExtractor;
    use crate::extractor::{ExtractionBatch, SourceExtractor};
    use crate::error::ParseError;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn defaults_model_and_synthesizes_ids() {
        let item = json!({
            "title": "Rust lifetimes",
            "messages": [
                { "role": "user", "content": "Explain 'a", "create_time": 20 },
                { "role": "assistant", "content": [{ "type": "text", "text": "It is a lifetime." }], "create_time": 21 },
                { "role": "system", "content": "hidden" }
            ]
        });
        let mut batch = ExtractionBatch::with_clock(1.0);
        let conversation = DeepseekExtractor
            .extract_item(&item, &mut batch)
            .expect("conversation");
        assert!(conversation.id.starts_with("deepseek_"));
        assert_eq!(conversation.messages.len(), 2);
        assert_eq!(conversation.messages[1].model.as_deref(), Some("deepseek-chat"));
        assert_eq!(conversation.title(), Some("Rust lifetimes"));
    }

    #[test]
    fn rejects_items_without_messages() {
        let mut batch = ExtractionBatch::with_clock(1.0);
        let missing = DeepseekExtractor.extract_item(&json!({ "id": "x" }), &mut batch);
        assert_eq!(missing.unwrap_err(), ParseError::MissingField("messages"));
        let empty = DeepseekExtractor.extract_item(&json!({ "messages": [] }), &mut batch);
        assert_eq!(empty.unwrap_err(), ParseError::NoMessages);
    }
}
