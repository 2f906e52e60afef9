//! claude.ai data exports.

use crate::error::ParseError;
use crate::extractor::{ExtractionBatch, SourceExtractor};
use crate::normalize::{
    ConversationDraft, MessageDraft, as_object, first_str, first_timestamp, native_id,
    require_array, text_from_content,
};
use crystal_rs_protocol::{Conversation, ConversationSource, Role};
use serde_json::Value;

/// Extractor for claude.ai exports (`chat_messages` with `sender` tags).
#[derive(Debug, Default, Clone, Copy)]
pub struct ClaudeExtractor;

impl SourceExtractor for ClaudeExtractor {
    fn source(&self) -> ConversationSource {
        ConversationSource::Claude
    }

    fn extract_item(
        &self,
        item: &Value,
        batch: &mut ExtractionBatch,
    ) -> Result<Conversation, ParseError> {
        let object = as_object(item)?;
        let chat_messages = require_array(object, "chat_messages")?;
        let model = first_str(object, &["model"]).map(str::to_string);

        let mut draft = ConversationDraft::new(self.source());
        draft.native_id = native_id(object, &["uuid", "id"]);
        draft.created_at = first_timestamp(object, &["created_at"]);
        for entry in chat_messages {
            let Some(entry) = entry.as_object() else {
                continue;
            };
            let Some(sender) = first_str(entry, &["sender", "role"]) else {
                continue;
            };
            let role = Role::from_author_tag(sender);
            // Structured content wins; `text` mirrors it in newer exports.
            let mut content = entry.get("content").map(text_from_content).unwrap_or_default();
            if content.trim().is_empty() {
                content = entry.get("text").map(text_from_content).unwrap_or_default();
            }
            draft.messages.push(MessageDraft {
                role,
                content,
                timestamp: first_timestamp(entry, &["created_at", "updated_at"]),
                model: model.clone(),
            });
        }

        if let Some(title) = first_str(object, &["name", "title"]) {
            draft.metadata.insert("title".to_string(), Value::from(title));
        }
        for key in ["created_at", "updated_at"] {
            if let Some(value) = object.get(key) {
                draft.metadata.insert(key.to_string(), value.clone());
            }
        }
        draft.finish(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::ClaudeExtractor;
    use crate::extractor::{ExtractionBatch, SourceExtractor};
    use crystal_rs_protocol::Role;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn maps_senders_and_prefers_structured_content() {
        let item = json!({
            "uuid": "c-1",
            "name": "Trip planning",
            "created_at": "2024-05-01T10:00:00Z",
            "chat_messages": [
                {
                    "sender": "assistant",
                    "text": "ignored",
                    "content": [{ "type": "text", "text": "Sure, " }, { "type": "tool_use" }, { "type": "text", "text": "Lisbon." }],
                    "created_at": "2024-05-01T10:00:05Z"
                },
                { "sender": "human", "text": "Where should I go?", "created_at": "2024-05-01T10:00:01Z" },
                { "text": "no sender" }
            ]
        });
        let mut batch = ExtractionBatch::with_clock(1.0);
        let conversation = ClaudeExtractor
            .extract_item(&item, &mut batch)
            .expect("conversation");
        assert_eq!(conversation.id, "c-1");
        assert_eq!(conversation.title(), Some("Trip planning"));
        assert_eq!(conversation.messages.len(), 2);
        assert_eq!(conversation.messages[0].role, Role::User);
        assert_eq!(conversation.messages[0].content, "Where should I go?");
        assert_eq!(conversation.messages[1].content, "Sure, Lisbon.");
        assert_eq!(conversation.messages[1].model, None);
    }
}
