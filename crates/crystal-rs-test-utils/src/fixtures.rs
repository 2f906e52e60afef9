use crystal_rs_protocol::{Conversation, ConversationSource, Message, Role};
use serde_json::{Value, json};

/// Two-message conversation with the given id.
pub fn conversation(id: &str) -> Conversation {
    conversation_with(
        id,
        &[
            (Role::User, "How do I roll back the api deployment?"),
            (
                Role::Assistant,
                "Run kubectl rollout undo deploy/api and watch the pods come back.",
            ),
        ],
    )
}

/// Conversation built from `(role, content)` pairs, one second apart.
pub fn conversation_with(id: &str, messages: &[(Role, &str)]) -> Conversation {
    Conversation {
        id: id.to_string(),
        source: ConversationSource::Claude,
        extracted_at: 1_700_000_000.0,
        messages: messages
            .iter()
            .enumerate()
            .map(|(index, (role, content))| {
                Message::new(*role, *content, 1_700_000_000.0 + index as f64, None)
            })
            .collect(),
        metadata: None,
    }
}

/// Minimal ChatGPT export holding one conversation.
pub fn chatgpt_export(id: &str, title: &str) -> Value {
    json!([{
        "id": id,
        "title": title,
        "create_time": 1000.0,
        "mapping": {
            "m1": {
                "message": {
                    "author": { "role": "user" },
                    "content": { "parts": ["Hello"] },
                    "create_time": 1000.0
                }
            },
            "m2": {
                "message": {
                    "author": { "role": "assistant" },
                    "content": { "parts": ["Hi there"] },
                    "create_time": 1001.0,
                    "metadata": { "model_slug": "gpt-4" }
                }
            }
        }
    }])
}
