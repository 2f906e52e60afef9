//! ChatGPT `conversations.json` exports.

use crate::error::ParseError;
use crate::extractor::{ExtractionBatch, SourceExtractor};
use crate::normalize::{
    ConversationDraft, MessageDraft, as_object, native_id, parse_timestamp, text_from_content,
};
use crystal_rs_protocol::{Conversation, ConversationSource, Role};
use log::debug;
use serde_json::{Map, Value};
use std::collections::HashSet;

const DEFAULT_MODEL: &str = "gpt-unknown";
const DEFAULT_TITLE: &str = "Untitled Chat";

/// Extractor for ChatGPT exports built around a `mapping` node tree.
#[derive(Debug, Default, Clone, Copy)]
pub struct ChatGptExtractor;

impl SourceExtractor for ChatGptExtractor {
    fn source(&self) -> ConversationSource {
        ConversationSource::Chatgpt
    }

    fn extract_item(
        &self,
        item: &Value,
        batch: &mut ExtractionBatch,
    ) -> Result<Conversation, ParseError> {
        let object = as_object(item)?;
        let mapping = match object.get("mapping") {
            None | Some(Value::Null) => return Err(ParseError::MissingField("mapping")),
            Some(Value::Object(mapping)) => mapping,
            Some(_) => {
                return Err(ParseError::InvalidField {
                    field: "mapping",
                    reason: "expected an object of nodes".to_string(),
                });
            }
        };

        let mut draft = ConversationDraft::new(self.source());
        draft.native_id = native_id(object, &["id", "conversation_id"]);
        draft.created_at = object.get("create_time").and_then(parse_timestamp);
        for node in thread_nodes(object, mapping) {
            if let Some(message) = message_from_node(node) {
                draft.messages.push(message);
            }
        }

        let title = object
            .get("title")
            .and_then(Value::as_str)
            .filter(|title| !title.trim().is_empty())
            .unwrap_or(DEFAULT_TITLE);
        draft.metadata.insert("title".to_string(), Value::from(title));
        for key in ["create_time", "update_time"] {
            draft.metadata.insert(
                key.to_string(),
                object.get(key).cloned().unwrap_or(Value::Null),
            );
        }
        draft.metadata.insert(
            "original_id".to_string(),
            object.get("id").cloned().unwrap_or(Value::Null),
        );
        draft.finish(batch)
    }
}

/// Nodes of the active thread, root first.
///
/// Follows `parent` links back from `current_node` when the export names
/// one; otherwise every node of the mapping is returned in export order.
fn thread_nodes<'a>(object: &Map<String, Value>, mapping: &'a Map<String, Value>) -> Vec<&'a Value> {
    let Some(current) = object
        .get("current_node")
        .and_then(Value::as_str)
        .filter(|current| mapping.contains_key(*current))
    else {
        return mapping.values().collect();
    };

    let mut chain = Vec::new();
    let mut visited = HashSet::new();
    let mut cursor = Some(current);
    while let Some(node_id) = cursor {
        if !visited.insert(node_id) {
            debug!("stopping at cyclic parent link (node={node_id})");
            break;
        }
        let Some(node) = mapping.get(node_id) else {
            break;
        };
        chain.push(node);
        cursor = node.get("parent").and_then(Value::as_str);
    }
    chain.reverse();
    chain
}

fn message_from_node(node: &Value) -> Option<MessageDraft> {
    let message = node.get("message").filter(|message| message.is_object())?;
    let author = message
        .get("author")
        .and_then(|author| author.get("role"))
        .and_then(Value::as_str)?;
    let role = Role::from_author_tag(author);
    let content = message.get("content").map(text_from_content).unwrap_or_default();
    let model = (role == Role::Assistant).then(|| {
        message
            .get("metadata")
            .and_then(|metadata| metadata.get("model_slug"))
            .and_then(Value::as_str)
            .filter(|slug| !slug.is_empty())
            .unwrap_or(DEFAULT_MODEL)
            .to_string()
    });
    Some(MessageDraft {
        role,
        content,
        timestamp: message.get("create_time").and_then(parse_timestamp),
        model,
    })
}

#[cfg(test)]
mod tests {
    use super::ChatGptExtractor;
    use crate::extractor::{ExtractionBatch, SourceExtractor};
    use crate::error::ParseError;
    use crystal_rs_protocol::Role;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn follows_current_node_and_skips_abandoned_branches() {
        let item = json!({
            "id": "conv-1",
            "current_node": "c",
            "mapping": {
                "root": { "message": null, "parent": null },
                "a": {
                    "parent": "root",
                    "message": { "author": { "role": "user" }, "content": { "parts": ["Question"] }, "create_time": 10 }
                },
                "stale": {
                    "parent": "a",
                    "message": { "author": { "role": "assistant" }, "content": { "parts": ["Old answer"] }, "create_time": 11 }
                },
                "c": {
                    "parent": "a",
                    "message": { "author": { "role": "assistant" }, "content": { "parts": ["New answer"] }, "create_time": 12 }
                }
            }
        });
        let mut batch = ExtractionBatch::with_clock(99.0);
        let conversation = ChatGptExtractor
            .extract_item(&item, &mut batch)
            .expect("conversation");
        let contents: Vec<&str> = conversation
            .messages
            .iter()
            .map(|message| message.content.as_str())
            .collect();
        assert_eq!(contents, vec!["Question", "New answer"]);
        assert_eq!(conversation.messages[1].model.as_deref(), Some("gpt-unknown"));
        assert_eq!(conversation.title(), Some("Untitled Chat"));
        assert_eq!(conversation.extracted_at, 99.0);
    }

    #[test]
    fn drops_system_authorless_and_non_text_messages() {
        let item = json!({
            "id": "conv-2",
            "create_time": 500,
            "mapping": {
                "s": { "message": { "author": { "role": "system" }, "content": { "parts": ["rules"] } } },
                "n": { "message": { "content": { "parts": ["no author"] } } },
                "i": { "message": { "author": { "role": "user" }, "content": { "parts": [{ "content_type": "image_asset_pointer", "type": "image" }] } } },
                "t": { "message": { "author": { "role": "tool" }, "content": { "parts": ["tool output"] } } }
            }
        });
        let mut batch = ExtractionBatch::with_clock(1.0);
        let conversation = ChatGptExtractor
            .extract_item(&item, &mut batch)
            .expect("conversation");
        assert_eq!(conversation.messages.len(), 1);
        assert_eq!(conversation.messages[0].role, Role::User);
        assert_eq!(conversation.messages[0].timestamp, 500.0);
        assert_eq!(conversation.extracted_at, 500.0);
    }

    #[test]
    fn requires_mapping() {
        let mut batch = ExtractionBatch::with_clock(1.0);
        let err = ChatGptExtractor
            .extract_item(&json!({ "id": "x", "title": "t" }), &mut batch)
            .unwrap_err();
        assert_eq!(err, ParseError::MissingField("mapping"));
    }
}
