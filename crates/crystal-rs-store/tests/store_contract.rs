use crystal_rs_protocol::{
    CompressionResult, Conversation, ConversationSource, Message, PromptOutput, Role,
    VerificationResult,
};
use crystal_rs_store::{
    ConversationStore, InMemoryConversationStore, JsonlConversationStore, StoreError,
};
use pretty_assertions::assert_eq;
use std::collections::BTreeMap;
use tempfile::tempdir;

fn conversation(id: &str, extracted_at: f64) -> Conversation {
    Conversation {
        id: id.to_string(),
        source: ConversationSource::Chatgpt,
        extracted_at,
        messages: vec![
            Message::new(Role::User, "Hello", extracted_at, None),
            Message::new(
                Role::Assistant,
                "Hi there",
                extracted_at + 1.0,
                Some("gpt-4".to_string()),
            ),
        ],
        metadata: None,
    }
}

fn outputs(tokens: u64) -> (CompressionResult, VerificationResult, PromptOutput) {
    (
        CompressionResult {
            compressed_content: "Hello".to_string(),
            original_token_count: tokens,
            compressed_token_count: tokens / 2,
            compression_ratio: 0.5,
            extracted_facts: Vec::new(),
        },
        VerificationResult {
            verified_content: "Hello".to_string(),
            grounding_score: 1.0,
            total_claims: 1,
            verified_claims: 1,
            corrections: Vec::new(),
            failed_verifications: Vec::new(),
        },
        PromptOutput {
            final_prompt: "Hello".to_string(),
            structure_breakdown: BTreeMap::new(),
            estimated_tokens: 2,
            quality_metrics: BTreeMap::new(),
            cost_estimation: BTreeMap::new(),
        },
    )
}

async fn exercise_contract(store: &dyn ConversationStore) {
    let original = conversation("abc", 100.0);
    let id = store.save(original.clone()).await.expect("save");
    assert_eq!(id, "abc");
    assert_eq!(store.get("abc").await.expect("get"), Some(original.clone()));

    let second_id = store.save(original.clone()).await.expect("save again");
    assert!(second_id.starts_with("abc-"), "{second_id}");
    assert_eq!(second_id.len(), "abc-".len() + 8);
    let mut reassigned = store.get(&second_id).await.expect("get").expect("stored");
    reassigned.id = "abc".to_string();
    assert_eq!(reassigned, original);

    store.save(conversation("newer", 300.0)).await.expect("save newer");
    let ids: Vec<String> = store
        .list(0, 10)
        .await
        .expect("list")
        .into_iter()
        .map(|c| c.id)
        .collect();
    assert_eq!(ids[0], "newer");
    assert_eq!(ids.len(), 3);
    assert_eq!(store.list(1, 1).await.expect("page").len(), 1);
    assert!(store.list(5, 10).await.expect("past end").is_empty());

    let (compressed, verified, optimized) = outputs(100);
    assert!(
        !store
            .save_pipeline_result("pipeline_ghost", "ghost", &compressed, &verified, &optimized)
            .await
            .expect("save result")
    );
    assert!(
        store
            .save_pipeline_result("pipeline_abc", "abc", &compressed, &verified, &optimized)
            .await
            .expect("save result")
    );
    let (compressed, verified, optimized) = outputs(200);
    assert!(
        store
            .save_pipeline_result("pipeline_abc", "abc", &compressed, &verified, &optimized)
            .await
            .expect("replace result")
    );
    let results = store.list_pipeline_results("abc").await.expect("results");
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].metrics.original_tokens, 200);
    assert_eq!(results[0].metrics.compressed_tokens, 100);

    assert!(store.delete("abc").await.expect("delete"));
    assert!(!store.delete("abc").await.expect("delete twice"));
    assert_eq!(store.get("abc").await.expect("get"), None);
    assert_eq!(
        store.get_pipeline_result("pipeline_abc").await.expect("result"),
        None
    );
}

#[tokio::test]
async fn in_memory_store_honours_contract() {
    let store = InMemoryConversationStore::new();
    exercise_contract(&store).await;
}

#[tokio::test]
async fn jsonl_store_honours_contract() {
    let temp = tempdir().expect("tempdir");
    let store = JsonlConversationStore::open(temp.path()).expect("store");
    exercise_contract(&store).await;
}

#[tokio::test]
async fn jsonl_store_replays_log_on_reopen() {
    let temp = tempdir().expect("tempdir");
    let original = conversation("kept", 50.0);
    {
        let store = JsonlConversationStore::open(temp.path()).expect("store");
        store.save(original.clone()).await.expect("save");
        store.save(conversation("dropped", 60.0)).await.expect("save");
        let (compressed, verified, optimized) = outputs(40);
        store
            .save_pipeline_result("pipeline_kept", "kept", &compressed, &verified, &optimized)
            .await
            .expect("result");
        store.delete("dropped").await.expect("delete");
    }

    let reopened = JsonlConversationStore::open(temp.path()).expect("reopen");
    assert_eq!(reopened.get("kept").await.expect("get"), Some(original));
    assert_eq!(reopened.get("dropped").await.expect("get"), None);
    let result = reopened
        .get_pipeline_result("pipeline_kept")
        .await
        .expect("result")
        .expect("persisted");
    assert_eq!(result.conversation_id, "kept");
    assert_eq!(result.metrics.original_tokens, 40);
}

#[tokio::test]
async fn jsonl_store_reopen_preserves_fractional_timestamps() {
    let temp = tempdir().expect("tempdir");
    let originals: Vec<Conversation> = (0..500u32)
        .map(|n| {
            let index = f64::from(n);
            let at = 1.7e9 + index * 0.123456789123 + 1e-7 * index.sqrt();
            conversation(&format!("conv-{n}"), at)
        })
        .collect();
    {
        let store = JsonlConversationStore::open(temp.path()).expect("store");
        for original in &originals {
            store.save(original.clone()).await.expect("save");
        }
    }

    let reopened = JsonlConversationStore::open(temp.path()).expect("reopen");
    for original in originals {
        let loaded = reopened.get(&original.id).await.expect("get");
        assert_eq!(loaded, Some(original));
    }
}

#[tokio::test]
async fn save_rejects_invalid_conversations() {
    let store = InMemoryConversationStore::new();
    let mut empty = conversation("empty", 1.0);
    empty.messages.clear();
    match store.save(empty).await {
        Err(StoreError::InvalidConversation(_)) => {}
        other => panic!("unexpected result: {other:?}"),
    }
}
