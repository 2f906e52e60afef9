//! Canonical conversation model.

use crate::error::ProtocolError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// Provider-specific metadata attached to a conversation.
pub type Metadata = Map<String, Value>;

/// Provider a conversation was exported from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum ConversationSource {
    Chatgpt,
    Claude,
    Perplexity,
    Moonshot,
    Deepseek,
    Gemini,
}

impl ConversationSource {
    /// Every known source, in declaration order.
    pub const ALL: [ConversationSource; 6] = [
        ConversationSource::Chatgpt,
        ConversationSource::Claude,
        ConversationSource::Perplexity,
        ConversationSource::Moonshot,
        ConversationSource::Deepseek,
        ConversationSource::Gemini,
    ];

    /// Return the source tag as used on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            ConversationSource::Chatgpt => "chatgpt",
            ConversationSource::Claude => "claude",
            ConversationSource::Perplexity => "perplexity",
            ConversationSource::Moonshot => "moonshot",
            ConversationSource::Deepseek => "deepseek",
            ConversationSource::Gemini => "gemini",
        }
    }

    /// Prefix used for synthesized conversation ids.
    pub fn id_prefix(&self) -> &'static str {
        match self {
            ConversationSource::Perplexity => "pplx",
            other => other.as_str(),
        }
    }
}

impl fmt::Display for ConversationSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConversationSource {
    type Err = ProtocolError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase();
        ConversationSource::ALL
            .into_iter()
            .find(|source| source.as_str() == normalized)
            .ok_or_else(|| ProtocolError::UnknownSource(value.to_string()))
    }
}

/// Speaker role for a message.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// User-authored message.
    User,
    /// Assistant-authored message.
    Assistant,
    /// System-generated message.
    System,
}

impl Role {
    /// Return the role as a lowercase string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }

    /// Map a provider author tag onto a role, defaulting to `User`.
    pub fn from_author_tag(tag: &str) -> Self {
        match tag.trim().to_ascii_lowercase().as_str() {
            "assistant" | "model" | "bot" | "ai" => Role::Assistant,
            "system" => Role::System,
            _ => Role::User,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ProtocolError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            "system" => Ok(Role::System),
            other => Err(ProtocolError::UnknownRole(other.to_string())),
        }
    }
}

/// Single message in a canonical conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    /// Role that produced the message.
    pub role: Role,
    /// Message text, never blank.
    pub content: String,
    /// Unix timestamp in seconds.
    pub timestamp: f64,
    /// Model that produced the message (assistant messages only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl Message {
    /// Build a message, dropping `model` for non-assistant roles.
    pub fn new(role: Role, content: impl Into<String>, timestamp: f64, model: Option<String>) -> Self {
        let model = if role == Role::Assistant { model } else { None };
        Self {
            role,
            content: content.into(),
            timestamp,
            model,
        }
    }
}

/// Provider-independent conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Conversation {
    /// Globally unique id, reused from the provider or source-prefixed.
    pub id: String,
    /// Provider the conversation came from.
    pub source: ConversationSource,
    /// Unix timestamp of extraction.
    pub extracted_at: f64,
    /// Messages in ascending timestamp order.
    pub messages: Vec<Message>,
    /// Provider-specific metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

impl Conversation {
    /// Check the structural invariants every stored conversation satisfies.
    pub fn validate(&self) -> Result<(), ProtocolError> {
        let invalid = |reason: &str| ProtocolError::InvalidConversation {
            id: self.id.clone(),
            reason: reason.to_string(),
        };
        if self.id.trim().is_empty() {
            return Err(invalid("id is empty"));
        }
        if self.messages.is_empty() {
            return Err(invalid("conversation has no messages"));
        }
        for (idx, message) in self.messages.iter().enumerate() {
            if message.content.trim().is_empty() {
                return Err(invalid(&format!("message {idx} has empty content")));
            }
            if !message.timestamp.is_finite() {
                return Err(invalid(&format!("message {idx} has a non-finite timestamp")));
            }
            if message.model.is_some() && message.role != Role::Assistant {
                return Err(invalid(&format!(
                    "message {idx} carries a model but is not an assistant message"
                )));
            }
        }
        if self
            .messages
            .windows(2)
            .any(|pair| pair[0].timestamp > pair[1].timestamp)
        {
            return Err(invalid("messages are not sorted by timestamp"));
        }
        Ok(())
    }

    /// Render the conversation as `role: content` lines.
    pub fn transcript(&self) -> String {
        self.messages
            .iter()
            .map(|message| format!("{}: {}", message.role, message.content.trim()))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Title from metadata, if the provider supplied one.
    pub fn title(&self) -> Option<&str> {
        self.metadata
            .as_ref()
            .and_then(|meta| meta.get("title"))
            .and_then(Value::as_str)
    }
}
