//! Moonshot (Kimi) exports.

use super::flat::FlatProfile;
use crate::error::ParseError;
use crate::extractor::{ExtractionBatch, SourceExtractor};
use crystal_rs_protocol::{Conversation, ConversationSource};
use serde_json::Value;

const PROFILE: FlatProfile = FlatProfile {
    source: ConversationSource::Moonshot,
    default_model: "moonshot-v1",
    record_index: true,
};

/// Extractor for Moonshot exports; records each item's export position.
#[derive(Debug, Default, Clone, Copy)]
pub struct MoonshotExtractor;

impl SourceExtractor for MoonshotExtractor {
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
    use super::MoonshotExtractor;
    use crate::extractor::SourceExtractor;
    use pretty_assertions::assert_eq;
    use serde_json::{Value, json};

    #[test]
    fn records_original_index_per_item() {
        let root = json!([
            { "messages": [{ "role": "user", "content": "first" }] },
            { "messages": [{ "role": "user", "content": "second" }, { "role": "assistant", "content": "reply" }] }
        ]);
        let conversations = MoonshotExtractor.extract_value(&root);
        let indices: Vec<Option<&Value>> = conversations
            .iter()
            .map(|conversation| {
                conversation
                    .metadata
                    .as_ref()
                    .and_then(|meta| meta.get("original_index"))
            })
            .collect();
        assert_eq!(indices, vec![Some(&json!(0)), Some(&json!(1))]);
        assert_eq!(
            conversations[1].messages[1].model.as_deref(),
            Some("moonshot-v1")
        );
    }
}
