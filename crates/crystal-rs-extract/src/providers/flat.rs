//! Shared parser for providers exporting a flat list of role-tagged messages.

use crate::error::ParseError;
use crate::extractor::ExtractionBatch;
use crate::normalize::{
    ConversationDraft, MessageDraft, as_object, first_str, first_timestamp, native_id,
    text_from_content,
};
use crystal_rs_protocol::{Conversation, ConversationSource, Role};
use serde_json::{Map, Value};

const MESSAGE_KEYS: &[&str] = &["messages", "chat_messages"];
const TIME_KEYS: &[&str] = &["create_time", "created_at", "timestamp", "inserted_at"];

/// Per-provider knobs for the flat message layout.
#[derive(Debug, Clone, Copy)]
pub(crate) struct FlatProfile {
    pub source: ConversationSource,
    /// Model recorded on assistant messages that name none.
    pub default_model: &'static str,
    /// Record the item's position in the export as `original_index`.
    pub record_index: bool,
}

impl FlatProfile {
    pub fn extract(
        &self,
        item: &Value,
        batch: &mut ExtractionBatch,
    ) -> Result<Conversation, ParseError> {
        let object = as_object(item)?;
        let entries = message_list(object)?;
        let conversation_model = first_str(object, &["model"]);

        let mut draft = ConversationDraft::new(self.source);
        draft.native_id = native_id(object, &["id", "conversation_id", "uuid"]);
        draft.created_at = first_timestamp(object, TIME_KEYS);
        for entry in entries.iter().filter_map(Value::as_object) {
            let Some(author) = author_tag(entry) else {
                continue;
            };
            let role = Role::from_author_tag(author);
            let content = ["content", "text"]
                .iter()
                .filter_map(|key| entry.get(*key))
                .map(text_from_content)
                .find(|text| !text.trim().is_empty())
                .unwrap_or_default();
            let model = (role == Role::Assistant).then(|| {
                first_str(entry, &["model"])
                    .or(conversation_model)
                    .unwrap_or(self.default_model)
                    .to_string()
            });
            draft.messages.push(MessageDraft {
                role,
                content,
                timestamp: first_timestamp(entry, TIME_KEYS),
                model,
            });
        }

        if let Some(title) = first_str(object, &["title", "name"]) {
            draft.metadata.insert("title".to_string(), Value::from(title));
        }
        if self.record_index {
            draft
                .metadata
                .insert("original_index".to_string(), Value::from(batch.item_index()));
        }
        draft.finish(batch)
    }
}

fn message_list(object: &Map<String, Value>) -> Result<&Vec<Value>, ParseError> {
    let Some(value) = MESSAGE_KEYS
        .iter()
        .filter_map(|key| object.get(*key))
        .find(|value| !value.is_null())
    else {
        return Err(ParseError::MissingField("messages"));
    };
    value.as_array().ok_or_else(|| ParseError::InvalidField {
        field: "messages",
        reason: "expected an array".to_string(),
    })
}

/// Author tag from `role`, `sender`, or an `author` string or `{role}` object.
fn author_tag(entry: &Map<String, Value>) -> Option<&str> {
    first_str(entry, &["role", "sender", "author"]).or_else(|| {
        entry
            .get("author")
            .and_then(|author| author.get("role"))
            .and_then(Value::as_str)
    })
}
