//! Durable store backed by an append-only JSONL event log.

use crate::state::StoreState;
use crate::{ConversationStore, StoreError};
use async_trait::async_trait;
use crystal_rs_protocol::{
    CompressionResult, Conversation, PipelineResult, PromptOutput, VerificationResult,
};
use log::{debug, info};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Log file name inside the store root.
pub const STORE_FILE: &str = "store.jsonl";
const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum StoreEvent {
    SchemaVersion { version: u32 },
    ConversationSaved { conversation: Conversation },
    ConversationDeleted { conversation_id: String },
    PipelineResultSaved { result: PipelineResult },
}

impl StoreState {
    fn apply(&mut self, event: StoreEvent) -> Result<(), StoreError> {
        match event {
            StoreEvent::SchemaVersion { version } => {
                if version > SCHEMA_VERSION {
                    return Err(StoreError::UnsupportedSchema(version));
                }
            }
            StoreEvent::ConversationSaved { conversation } => {
                self.insert_conversation(conversation);
            }
            StoreEvent::ConversationDeleted { conversation_id } => {
                self.remove_conversation(&conversation_id);
            }
            StoreEvent::PipelineResultSaved { result } => self.upsert_result(result),
        }
        Ok(())
    }
}

/// Store persisting every mutation to `<root>/store.jsonl`.
///
/// The log is replayed into memory when the store is opened; reads are served
/// from memory and each write appends one event before it becomes visible.
#[derive(Debug, Clone)]
pub struct JsonlConversationStore {
    path: PathBuf,
    state: Arc<RwLock<StoreState>>,
    /// Serialize id assignment and appends.
    write_lock: Arc<Mutex<()>>,
}

impl JsonlConversationStore {
    /// Open (or create) the store under `root`.
    pub fn open(root: impl AsRef<Path>) -> Result<Self, StoreError> {
        let root = root.as_ref();
        fs::create_dir_all(root)?;
        let path = root.join(STORE_FILE);
        let state = if path.exists() {
            replay(&path)?
        } else {
            let mut file = OpenOptions::new()
                .create_new(true)
                .write(true)
                .open(&path)?;
            let header = serde_json::to_string(&StoreEvent::SchemaVersion {
                version: SCHEMA_VERSION,
            })?;
            writeln!(file, "{header}")?;
            StoreState::default()
        };
        info!("opened JSONL conversation store (path={})", path.display());
        Ok(Self {
            path,
            state: Arc::new(RwLock::new(state)),
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    /// Location of the event log.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append an event on the blocking pool.
    async fn append(&self, event: &StoreEvent) -> Result<(), StoreError> {
        let line = serde_json::to_string(event)?;
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || -> Result<(), StoreError> {
            let mut file = OpenOptions::new().create(true).append(true).open(path)?;
            writeln!(file, "{line}")?;
            file.flush()?;
            Ok(())
        })
        .await
        .map_err(|err| StoreError::Task(err.to_string()))?
    }
}

fn replay(path: &Path) -> Result<StoreState, StoreError> {
    let reader = BufReader::new(OpenOptions::new().read(true).open(path)?);
    let mut state = StoreState::default();
    let mut events = 0usize;
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let event: StoreEvent = serde_json::from_str(&line).map_err(|err| StoreError::Corrupt {
            line: index + 1,
            reason: err.to_string(),
        })?;
        if events == 0 && !matches!(event, StoreEvent::SchemaVersion { .. }) {
            return Err(StoreError::Corrupt {
                line: index + 1,
                reason: "missing schema version header".to_string(),
            });
        }
        state.apply(event)?;
        events += 1;
    }
    debug!("replayed store log (path={}, events={})", path.display(), events);
    Ok(state)
}

#[async_trait]
impl ConversationStore for JsonlConversationStore {
    async fn save(&self, mut conversation: Conversation) -> Result<String, StoreError> {
        conversation.validate()?;
        let _guard = self.write_lock.lock().await;
        conversation.id = self.state.read().claim_id(&conversation.id);
        self.append(&StoreEvent::ConversationSaved {
            conversation: conversation.clone(),
        })
        .await?;
        let id = conversation.id.clone();
        debug!(
            "saved conversation (id={}, source={}, messages={})",
            id,
            conversation.source,
            conversation.messages.len()
        );
        self.state.write().insert_conversation(conversation);
        Ok(id)
    }

    async fn get(&self, id: &str) -> Result<Option<Conversation>, StoreError> {
        Ok(self.state.read().conversation(id))
    }

    async fn list(&self, offset: usize, limit: usize) -> Result<Vec<Conversation>, StoreError> {
        Ok(self.state.read().page(offset, limit))
    }

    async fn delete(&self, id: &str) -> Result<bool, StoreError> {
        let _guard = self.write_lock.lock().await;
        if !self.state.read().contains(id) {
            return Ok(false);
        }
        self.append(&StoreEvent::ConversationDeleted {
            conversation_id: id.to_string(),
        })
        .await?;
        self.state.write().remove_conversation(id);
        info!("deleted conversation (id={id})");
        Ok(true)
    }

    async fn save_pipeline_result(
        &self,
        run_id: &str,
        conversation_id: &str,
        compressed: &CompressionResult,
        verified: &VerificationResult,
        optimized: &PromptOutput,
    ) -> Result<bool, StoreError> {
        let _guard = self.write_lock.lock().await;
        if !self.state.read().contains(conversation_id) {
            debug!(
                "refusing result for unknown conversation (run_id={run_id}, conversation_id={conversation_id})"
            );
            return Ok(false);
        }
        let result = PipelineResult::new(
            run_id,
            conversation_id,
            compressed.clone(),
            verified.clone(),
            optimized.clone(),
        );
        self.append(&StoreEvent::PipelineResultSaved {
            result: result.clone(),
        })
        .await?;
        self.state.write().upsert_result(result);
        Ok(true)
    }

    async fn get_pipeline_result(&self, run_id: &str) -> Result<Option<PipelineResult>, StoreError> {
        Ok(self.state.read().result(run_id))
    }

    async fn list_pipeline_results(
        &self,
        conversation_id: &str,
    ) -> Result<Vec<PipelineResult>, StoreError> {
        Ok(self.state.read().results_for(conversation_id))
    }
}

#[cfg(test)]
mod tests {
    use super::{JsonlConversationStore, STORE_FILE};
    use crate::{ConversationStore, StoreError};
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn open_writes_schema_header() {
        let temp = tempdir().expect("tempdir");
        let store = JsonlConversationStore::open(temp.path()).expect("store");
        let contents = fs::read_to_string(store.path()).expect("read");
        assert_eq!(contents, "{\"type\":\"schema_version\",\"version\":1}\n");
    }

    #[test]
    fn open_rejects_newer_schema() {
        let temp = tempdir().expect("tempdir");
        fs::write(
            temp.path().join(STORE_FILE),
            "{\"type\":\"schema_version\",\"version\":7}\n",
        )
        .expect("write");
        match JsonlConversationStore::open(temp.path()) {
            Err(StoreError::UnsupportedSchema(version)) => assert_eq!(version, 7),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn open_rejects_log_without_header() {
        let temp = tempdir().expect("tempdir");
        fs::write(
            temp.path().join(STORE_FILE),
            "{\"type\":\"conversation_deleted\",\"conversation_id\":\"x\"}\n",
        )
        .expect("write");
        assert!(matches!(
            JsonlConversationStore::open(temp.path()),
            Err(StoreError::Corrupt { line: 1, .. })
        ));
    }

    #[tokio::test]
    async fn delete_of_unknown_conversation_writes_nothing() {
        let temp = tempdir().expect("tempdir");
        let store = JsonlConversationStore::open(temp.path()).expect("store");
        assert!(!store.delete("missing").await.expect("delete"));
        let lines = fs::read_to_string(store.path()).expect("read").lines().count();
        assert_eq!(lines, 1);
    }
}
