//! Perplexity thread exports.

use crate::error::ParseError;
use crate::extractor::{ExtractionBatch, SourceExtractor};
use crate::normalize::{
    ConversationDraft, MessageDraft, as_object, first_str, first_timestamp, native_id,
    text_from_content,
};
use crystal_rs_protocol::{Conversation, ConversationSource, Role};
use serde_json::{Map, Value};

const DEFAULT_MODEL: &str = "perplexity-sonar";
const DEFAULT_TITLE: &str = "Perplexity Thread";
const ENTRY_KEYS: &[&str] = &["history", "entries", "messages"];
const TIME_KEYS: &[&str] = &["created_at", "timestamp", "updated_at"];

/// Extractor for Perplexity threads.
///
/// Entries are either role-tagged messages or `{query, answer}` turns; a
/// turn expands into a user message followed by an assistant message.
#[derive(Debug, Default, Clone, Copy)]
pub struct PerplexityExtractor;

impl SourceExtractor for PerplexityExtractor {
    fn source(&self) -> ConversationSource {
        ConversationSource::Perplexity
    }

    fn extract_item(
        &self,
        item: &Value,
        batch: &mut ExtractionBatch,
    ) -> Result<Conversation, ParseError> {
        let object = as_object(item)?;
        let Some(entries) = ENTRY_KEYS
            .iter()
            .filter_map(|key| object.get(*key))
            .find(|value| !value.is_null())
        else {
            return Err(ParseError::MissingField("history"));
        };
        let entries = entries.as_array().ok_or_else(|| ParseError::InvalidField {
            field: "history",
            reason: "expected an array".to_string(),
        })?;

        let mut draft = ConversationDraft::new(self.source());
        draft.native_id = native_id(object, &["uuid", "id", "thread_id"]);
        draft.created_at = first_timestamp(object, TIME_KEYS);
        for entry in entries.iter().filter_map(Value::as_object) {
            push_entry(entry, &mut draft.messages);
        }

        let title = first_str(object, &["title"]).unwrap_or(DEFAULT_TITLE);
        draft.metadata.insert("title".to_string(), Value::from(title));
        draft.finish(batch)
    }
}

fn push_entry(entry: &Map<String, Value>, messages: &mut Vec<MessageDraft>) {
    let timestamp = first_timestamp(entry, TIME_KEYS);
    let model = first_str(entry, &["model"]).unwrap_or(DEFAULT_MODEL);

    if entry.contains_key("query") || entry.contains_key("answer") {
        for (key, role) in [("query", Role::User), ("answer", Role::Assistant)] {
            if let Some(value) = entry.get(key) {
                messages.push(MessageDraft {
                    role,
                    content: text_from_content(value),
                    timestamp,
                    model: (role == Role::Assistant).then(|| model.to_string()),
                });
            }
        }
        return;
    }

    let Some(author) = first_str(entry, &["role", "author", "sender"]) else {
        return;
    };
    let role = Role::from_author_tag(author);
    let content = ["text", "content"]
        .iter()
        .filter_map(|key| entry.get(*key))
        .map(text_from_content)
        .find(|text| !text.trim().is_empty())
        .unwrap_or_default();
    messages.push(MessageDraft {
        role,
        content,
        timestamp,
        model: (role == Role::Assistant).then(|| model.to_string()),
    });
}

#[cfg(test)]
mod tests {
    use super::PerplexityExtractor;
    use crate::extractor::{ExtractionBatch, SourceExtractor};
    use crystal_rs_protocol::Role;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn expands_query_answer_turns_in_order() {
        let item = json!({
            "entries": [
                { "query": "What is Rust?", "answer": "A systems language.", "created_at": 30 },
                { "role": "user", "text": "Is it fast?", "created_at": 40 },
                { "role": "assistant", "content": "Yes.", "created_at": 41, "model": "sonar-pro" }
            ]
        });
        let mut batch = ExtractionBatch::with_clock(1.0);
        let conversation = PerplexityExtractor
            .extract_item(&item, &mut batch)
            .expect("conversation");
        let roles: Vec<Role> = conversation.messages.iter().map(|message| message.role).collect();
        assert_eq!(
            roles,
            vec![Role::User, Role::Assistant, Role::User, Role::Assistant]
        );
        assert_eq!(conversation.messages[1].model.as_deref(), Some("perplexity-sonar"));
        assert_eq!(conversation.messages[3].model.as_deref(), Some("sonar-pro"));
        assert_eq!(conversation.title(), Some("Perplexity Thread"));
        assert!(conversation.id.starts_with("pplx_"));
    }
}
