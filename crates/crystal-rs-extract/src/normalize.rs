//! Shared normalisation helpers used by every provider extractor.

use crate::error::ParseError;
use crate::extractor::ExtractionBatch;
use chrono::{DateTime, NaiveDateTime};
use crystal_rs_protocol::{Conversation, ConversationSource, Message, Metadata, Role};
use serde_json::{Map, Value};

/// Naive datetime layouts accepted when a string is not RFC 3339.
const NAIVE_LAYOUTS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

/// Concatenate the textual parts of a message body.
///
/// Accepts a plain string, a list of parts, or an object carrying `parts` or
/// `text`. Parts are joined in source order without a separator; parts whose
/// `type` is not `text`, or that carry no text at all, are dropped.
pub fn text_from_content(value: &Value) -> String {
    let mut out = String::new();
    push_text(value, &mut out);
    out
}

fn push_text(value: &Value, out: &mut String) {
    match value {
        Value::String(text) => out.push_str(text),
        Value::Array(parts) => {
            for part in parts {
                push_text(part, out);
            }
        }
        Value::Object(object) => {
            if let Some(kind) = object.get("type").and_then(Value::as_str)
                && kind != "text"
            {
                return;
            }
            if let Some(parts) = object.get("parts") {
                push_text(parts, out);
            } else if let Some(Value::String(text)) = object.get("text") {
                out.push_str(text);
            }
        }
        _ => {}
    }
}

/// Parse a provider timestamp into float Unix seconds.
///
/// Numbers and numeric strings are taken as seconds; other strings are read
/// as RFC 3339, falling back to naive UTC datetimes.
pub fn parse_timestamp(value: &Value) -> Option<f64> {
    let seconds = match value {
        Value::Number(number) => number.as_f64(),
        Value::String(raw) => parse_timestamp_str(raw.trim()),
        _ => None,
    }?;
    seconds.is_finite().then_some(seconds)
}

fn parse_timestamp_str(raw: &str) -> Option<f64> {
    if raw.is_empty() {
        return None;
    }
    if let Ok(seconds) = raw.parse::<f64>() {
        return Some(seconds);
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.timestamp_micros() as f64 / 1_000_000.0);
    }
    NAIVE_LAYOUTS
        .iter()
        .find_map(|layout| NaiveDateTime::parse_from_str(raw, layout).ok())
        .map(|naive| naive.and_utc().timestamp_micros() as f64 / 1_000_000.0)
}

/// First timestamp found under any of `keys`.
pub(crate) fn first_timestamp(object: &Map<String, Value>, keys: &[&str]) -> Option<f64> {
    keys.iter()
        .filter_map(|key| object.get(*key))
        .find_map(parse_timestamp)
}

/// First non-blank string found under any of `keys`.
pub(crate) fn first_str<'a>(object: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .filter_map(|key| object.get(*key))
        .filter_map(Value::as_str)
        .find(|value| !value.trim().is_empty())
}

/// Native id under any of `keys`, accepting numeric ids as well.
pub(crate) fn native_id(object: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| object.get(*key))
        .find_map(|value| match value {
            Value::String(id) if !id.trim().is_empty() => Some(id.trim().to_string()),
            Value::Number(id) => Some(id.to_string()),
            _ => None,
        })
}

/// View an export item as a JSON object.
pub(crate) fn as_object(item: &Value) -> Result<&Map<String, Value>, ParseError> {
    item.as_object().ok_or(ParseError::NotAnObject)
}

/// Required array field of an export item.
pub(crate) fn require_array<'a>(
    object: &'a Map<String, Value>,
    field: &'static str,
) -> Result<&'a Vec<Value>, ParseError> {
    match object.get(field) {
        None | Some(Value::Null) => Err(ParseError::MissingField(field)),
        Some(Value::Array(items)) => Ok(items),
        Some(_) => Err(ParseError::InvalidField {
            field,
            reason: "expected an array".to_string(),
        }),
    }
}

/// Message as read from an export, before filtering and timestamp fill-in.
#[derive(Debug, Clone)]
pub(crate) struct MessageDraft {
    pub role: Role,
    pub content: String,
    pub timestamp: Option<f64>,
    pub model: Option<String>,
}

/// Conversation as read from an export, before canonicalisation.
#[derive(Debug)]
pub(crate) struct ConversationDraft {
    pub source: ConversationSource,
    pub native_id: Option<String>,
    /// Conversation-level time: timestamp fallback and `extracted_at`.
    pub created_at: Option<f64>,
    pub messages: Vec<MessageDraft>,
    pub metadata: Metadata,
}

impl ConversationDraft {
    pub fn new(source: ConversationSource) -> Self {
        Self {
            source,
            native_id: None,
            created_at: None,
            messages: Vec::new(),
            metadata: Metadata::new(),
        }
    }

    /// Filter, order and identify the draft.
    ///
    /// System and blank messages are dropped, missing timestamps fall back to
    /// the conversation time and then the batch clock, and messages are
    /// stable-sorted ascending. A draft left without messages is rejected.
    pub fn finish(self, batch: &mut ExtractionBatch) -> Result<Conversation, ParseError> {
        let fallback = self.created_at.unwrap_or_else(|| batch.now());
        let mut messages: Vec<Message> = self
            .messages
            .into_iter()
            .filter(|draft| draft.role != Role::System && !draft.content.trim().is_empty())
            .map(|draft| {
                Message::new(
                    draft.role,
                    draft.content,
                    draft.timestamp.unwrap_or(fallback),
                    draft.model,
                )
            })
            .collect();
        if messages.is_empty() {
            return Err(ParseError::NoMessages);
        }
        messages.sort_by(|left, right| left.timestamp.total_cmp(&right.timestamp));

        let id = batch.assign_id(self.source, self.native_id.as_deref());
        Ok(Conversation {
            id,
            source: self.source,
            extracted_at: fallback,
            messages,
            metadata: (!self.metadata.is_empty()).then_some(self.metadata),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn text_from_content_joins_text_parts_and_drops_others() {
        let content = json!([
            "Hello ",
            { "type": "image", "source": "x.png" },
            { "type": "text", "text": "world" },
            { "text": "!" },
            42
        ]);
        assert_eq!(text_from_content(&content), "Hello world!");
        assert_eq!(
            text_from_content(&json!({ "content_type": "text", "parts": ["a", "b"] })),
            "ab"
        );
        assert_eq!(text_from_content(&json!(null)), "");
    }

    #[test]
    fn parse_timestamp_accepts_numbers_strings_and_datetimes() {
        assert_eq!(parse_timestamp(&json!(1000)), Some(1000.0));
        assert_eq!(parse_timestamp(&json!("1001.5")), Some(1001.5));
        assert_eq!(parse_timestamp(&json!("1970-01-01T00:16:40Z")), Some(1000.0));
        assert_eq!(parse_timestamp(&json!("1970-01-01T01:16:40+01:00")), Some(1000.0));
        assert_eq!(parse_timestamp(&json!("1970-01-01 00:16:40.5")), Some(1000.5));
        assert_eq!(parse_timestamp(&json!("yesterday")), None);
        assert_eq!(parse_timestamp(&json!(true)), None);
    }

    #[test]
    fn finish_filters_sorts_and_fills_timestamps() {
        let mut batch = ExtractionBatch::with_clock(5000.0);
        let mut draft = ConversationDraft::new(ConversationSource::Deepseek);
        draft.created_at = Some(900.0);
        draft.messages = vec![
            MessageDraft {
                role: Role::Assistant,
                content: "later".to_string(),
                timestamp: Some(1000.0),
                model: Some("deepseek-chat".to_string()),
            },
            MessageDraft {
                role: Role::System,
                content: "hidden".to_string(),
                timestamp: Some(1.0),
                model: None,
            },
            MessageDraft {
                role: Role::User,
                content: "  ".to_string(),
                timestamp: Some(2.0),
                model: None,
            },
            MessageDraft {
                role: Role::User,
                content: "first".to_string(),
                timestamp: None,
                model: None,
            },
        ];
        let conversation = draft.finish(&mut batch).expect("conversation");
        let contents: Vec<&str> = conversation
            .messages
            .iter()
            .map(|message| message.content.as_str())
            .collect();
        assert_eq!(contents, vec!["first", "later"]);
        assert_eq!(conversation.messages[0].timestamp, 900.0);
        assert_eq!(conversation.extracted_at, 900.0);
        assert_eq!(conversation.metadata, None);
        assert!(conversation.id.starts_with("deepseek_"));
        assert_eq!(conversation.validate(), Ok(()));
    }

    #[test]
    fn finish_rejects_drafts_without_usable_messages() {
        let mut batch = ExtractionBatch::with_clock(1.0);
        let mut draft = ConversationDraft::new(ConversationSource::Claude);
        draft.messages.push(MessageDraft {
            role: Role::System,
            content: "only system".to_string(),
            timestamp: None,
            model: None,
        });
        assert_eq!(draft.finish(&mut batch), Err(ParseError::NoMessages));
    }
}
