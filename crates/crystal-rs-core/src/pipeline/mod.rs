//! Pipeline orchestration: run lifecycle, status tracking and cancellation.
//!
//! Each run is an independent tokio task that walks
//! `Initializing -> Compression -> Verification -> Optimization -> Completed`
//! and lands in `Failed` on any stage error, persistence error or
//! cancellation. Statuses are published through `watch` channels so readers
//! always see a whole snapshot.

mod retention;
mod settings;

pub use settings::PipelineSettings;

use crate::error::{CrystalCoreError, StageError, StageKind};
use crate::stages::{OptimizeOptions, PipelineStages};
use crystal_rs_protocol::{
    CompressionConfig, CompressionResult, Conversation, EventSink, PipelineEvent, PipelineStage,
    PipelineStatus, PromptOutput, RunId, VerificationResult, unix_now,
};
use crystal_rs_store::ConversationStore;
use futures_util::future::join_all;
use log::{debug, info, warn};
use parking_lot::{Mutex, RwLock};
use retention::{StatusMap, prune_statuses};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::WatchStream;
use tokio_util::sync::CancellationToken;

const RUN_ID_PREFIX: &str = "pipeline_";

/// Run id used for every run of the given conversation.
pub fn run_id_for(conversation_id: &str) -> RunId {
    format!("{RUN_ID_PREFIX}{conversation_id}")
}

struct ActiveRun {
    run_id: RunId,
    token: CancellationToken,
    handle: JoinHandle<()>,
}

struct StageOutputs {
    compressed: CompressionResult,
    verified: VerificationResult,
    optimized: PromptOutput,
}

struct Shared {
    store: Arc<dyn ConversationStore>,
    stages: PipelineStages,
    settings: PipelineSettings,
    event_sink: Option<Arc<dyn EventSink>>,
    statuses: RwLock<StatusMap>,
    /// In-flight runs keyed by conversation id.
    active: Mutex<HashMap<String, ActiveRun>>,
    shutdown: CancellationToken,
}

/// Schedules pipeline runs and tracks their statuses.
///
/// Cloning is cheap; clones share the same runs.
#[derive(Clone)]
pub struct PipelineOrchestrator {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for PipelineOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let active = self.shared.active.lock().len();
        let statuses = self.shared.statuses.read().len();
        f.debug_struct("PipelineOrchestrator")
            .field("settings", &self.shared.settings)
            .field("statuses", &statuses)
            .field("active", &active)
            .finish()
    }
}

impl PipelineOrchestrator {
    pub fn new(
        store: Arc<dyn ConversationStore>,
        stages: PipelineStages,
        settings: PipelineSettings,
        event_sink: Option<Arc<dyn EventSink>>,
    ) -> Self {
        debug!(
            "initializing pipeline orchestrator (stage_timeout={:?}, max_entries={})",
            settings.stage_timeout, settings.max_entries
        );
        Self {
            shared: Arc::new(Shared {
                store,
                stages,
                settings,
                event_sink,
                statuses: RwLock::new(HashMap::new()),
                active: Mutex::new(HashMap::new()),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.shared.settings
    }

    /// Submit a run for `conversation` and return its id without waiting.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(
        &self,
        conversation: Conversation,
        config: CompressionConfig,
    ) -> Result<RunId, CrystalCoreError> {
        if self.shared.shutdown.is_cancelled() {
            return Err(CrystalCoreError::ShuttingDown);
        }
        config
            .validate()
            .map_err(|err| CrystalCoreError::InvalidInput(err.to_string()))?;
        conversation
            .validate()
            .map_err(|err| CrystalCoreError::InvalidInput(err.to_string()))?;

        let conversation_id = conversation.id.clone();
        let run_id = run_id_for(&conversation_id);
        let mut active = self.shared.active.lock();
        if self.shared.shutdown.is_cancelled() {
            return Err(CrystalCoreError::ShuttingDown);
        }
        if let Some(running) = active.get(&conversation_id) {
            return Err(CrystalCoreError::AlreadyRunning {
                conversation_id,
                run_id: running.run_id.clone(),
            });
        }

        let initial = PipelineStatus::initializing(run_id.clone(), conversation_id.clone());
        let event = PipelineEvent::from_status(&initial);
        let (sender, _) = watch::channel(initial);
        let status = Arc::new(sender);
        self.shared
            .statuses
            .write()
            .insert(run_id.clone(), status.clone());

        let token = self.shared.shutdown.child_token();
        let handle = tokio::spawn(execute(
            self.shared.clone(),
            conversation,
            config,
            status,
            event,
            token.clone(),
        ));
        active.insert(
            conversation_id.clone(),
            ActiveRun {
                run_id: run_id.clone(),
                token,
                handle,
            },
        );
        drop(active);
        self.prune();
        info!("pipeline run started (run_id={run_id}, conversation_id={conversation_id})");
        Ok(run_id)
    }

    /// Load a stored conversation and submit a run for it.
    pub async fn start_for(
        &self,
        conversation_id: &str,
        config: CompressionConfig,
    ) -> Result<RunId, CrystalCoreError> {
        let conversation = self
            .shared
            .store
            .get(conversation_id)
            .await?
            .ok_or_else(|| CrystalCoreError::not_found("conversation", conversation_id))?;
        self.start(conversation, config)
    }

    /// Current snapshot of a run.
    pub fn get_status(&self, run_id: &str) -> Result<PipelineStatus, CrystalCoreError> {
        self.shared
            .statuses
            .read()
            .get(run_id)
            .map(|status| status.borrow().clone())
            .ok_or_else(|| CrystalCoreError::not_found("run", run_id))
    }

    /// Snapshots of every retained run, most recently updated first.
    pub fn list_statuses(&self) -> Vec<PipelineStatus> {
        let mut statuses: Vec<PipelineStatus> = self
            .shared
            .statuses
            .read()
            .values()
            .map(|status| status.borrow().clone())
            .collect();
        statuses.sort_by(|left, right| {
            right
                .timestamp
                .total_cmp(&left.timestamp)
                .then_with(|| left.id.cmp(&right.id))
        });
        statuses
    }

    /// Receiver that observes every status change of a run.
    pub fn subscribe(
        &self,
        run_id: &str,
    ) -> Result<watch::Receiver<PipelineStatus>, CrystalCoreError> {
        self.shared
            .statuses
            .read()
            .get(run_id)
            .map(|status| status.subscribe())
            .ok_or_else(|| CrystalCoreError::not_found("run", run_id))
    }

    /// Stream of status snapshots, starting with the current one.
    pub fn status_stream(
        &self,
        run_id: &str,
    ) -> Result<WatchStream<PipelineStatus>, CrystalCoreError> {
        self.subscribe(run_id).map(WatchStream::new)
    }

    /// Wait until a run reaches `Completed` or `Failed`.
    pub async fn wait(&self, run_id: &str) -> Result<PipelineStatus, CrystalCoreError> {
        let mut receiver = self.subscribe(run_id)?;
        let terminal = receiver
            .wait_for(PipelineStatus::is_terminal)
            .await
            .map(|status| status.clone());
        match terminal {
            Ok(status) => Ok(status),
            Err(_) => Ok(receiver.borrow().clone()),
        }
    }

    /// Whether a run for the conversation is in flight.
    pub fn is_active(&self, conversation_id: &str) -> bool {
        self.shared.active.lock().contains_key(conversation_id)
    }

    /// Request cancellation of a single run. Returns `false` when the run is
    /// not in flight.
    pub fn cancel(&self, run_id: &str) -> bool {
        let active = self.shared.active.lock();
        match active.values().find(|run| run.run_id == run_id) {
            Some(run) => {
                debug!("cancelling pipeline run (run_id={run_id})");
                run.token.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancel every in-flight run and wait for all of them to settle.
    ///
    /// The orchestrator refuses new runs afterwards.
    pub async fn cancel_all(&self) {
        self.shared.shutdown.cancel();
        let runs: Vec<ActiveRun> = self
            .shared
            .active
            .lock()
            .drain()
            .map(|(_, run)| run)
            .collect();
        info!("cancelling pipeline runs (count={})", runs.len());

        let handles = runs.into_iter().map(|run| run.handle);
        for joined in join_all(handles).await {
            if let Err(err) = joined {
                warn!("pipeline task ended abnormally (error={err})");
            }
        }

        let statuses: Vec<_> = self.shared.statuses.read().values().cloned().collect();
        for status in statuses {
            self.shared.fail(&status, "cancelled at shutdown");
        }
    }

    /// Evict expired finished statuses; returns how many were dropped.
    pub fn prune(&self) -> usize {
        let evicted = prune_statuses(
            &mut self.shared.statuses.write(),
            self.shared.settings.retention_ttl,
            self.shared.settings.max_entries,
            unix_now(),
        );
        if evicted > 0 {
            debug!("pruned pipeline statuses (evicted={evicted})");
        }
        evicted
    }
}

async fn execute(
    shared: Arc<Shared>,
    conversation: Conversation,
    config: CompressionConfig,
    status: Arc<watch::Sender<PipelineStatus>>,
    initial: PipelineEvent,
    token: CancellationToken,
) {
    // Emitted from the task so the sink sees events in order and never runs
    // under the `active` lock.
    shared.emit(initial);
    let run_id = status.borrow().id.clone();
    let staged = tokio::select! {
        biased;
        _ = token.cancelled() => Err(CrystalCoreError::Cancelled(run_id.clone())),
        staged = shared.run_stages(&conversation, &config, &status) => staged.map_err(CrystalCoreError::from),
    };
    let outcome = match staged {
        Ok(_) if token.is_cancelled() => Err(CrystalCoreError::Cancelled(run_id.clone())),
        Ok(outputs) => shared.persist(&run_id, &conversation.id, outputs).await,
        Err(err) => Err(err),
    };

    // The terminal status lands before the run leaves `active`; the sink is
    // called only after the lock is released.
    let event = {
        let mut active = shared.active.lock();
        let event = match outcome {
            Ok(prompt) => {
                info!("pipeline run completed (run_id={run_id})");
                shared.transition(&status, |current| {
                    current.stage = PipelineStage::Completed;
                    current.progress = 100.0;
                    current.message = "Pipeline completed successfully".to_string();
                    current.result = Some(prompt);
                })
            }
            Err(err) => {
                warn!("pipeline run failed (run_id={run_id}, error={err})");
                shared.failure(&status, &err.to_string())
            }
        };
        if active
            .get(&conversation.id)
            .is_some_and(|run| run.run_id == run_id)
        {
            active.remove(&conversation.id);
        }
        event
    };
    if let Some(event) = event {
        shared.emit(event);
    }
}

impl Shared {
    async fn run_stages(
        &self,
        conversation: &Conversation,
        config: &CompressionConfig,
        status: &watch::Sender<PipelineStatus>,
    ) -> Result<StageOutputs, StageError> {
        self.enter(status, StageKind::Compress, "Running semantic compression...");
        let compressed = self
            .invoke(
                StageKind::Compress,
                self.stages.compressor.compress(conversation, config),
            )
            .await?;

        self.enter(status, StageKind::Verify, "Verifying compressed content...");
        let verified = self
            .invoke(
                StageKind::Verify,
                self.stages
                    .verifier
                    .verify(&compressed.compressed_content, &conversation.messages),
            )
            .await?;

        self.enter(status, StageKind::Optimize, "Optimizing prompt structure...");
        let options = OptimizeOptions {
            continuation_prompt: config
                .user_continuation_prompt
                .clone()
                .unwrap_or_else(|| self.settings.continuation_prompt.clone()),
            original_tokens: compressed.original_token_count,
        };
        let optimized = self
            .invoke(
                StageKind::Optimize,
                self.stages
                    .optimizer
                    .optimize(&verified.verified_content, &verified, &options),
            )
            .await?;

        Ok(StageOutputs {
            compressed,
            verified,
            optimized,
        })
    }

    async fn invoke<T>(
        &self,
        stage: StageKind,
        call: impl Future<Output = Result<T, StageError>>,
    ) -> Result<T, StageError> {
        debug!("invoking stage (stage={stage})");
        match self.settings.stage_timeout {
            Some(limit) => tokio::time::timeout(limit, call)
                .await
                .map_err(|_| StageError::timeout(stage, limit))?,
            None => call.await,
        }
    }

    async fn persist(
        &self,
        run_id: &str,
        conversation_id: &str,
        outputs: StageOutputs,
    ) -> Result<PromptOutput, CrystalCoreError> {
        let StageOutputs {
            compressed,
            verified,
            optimized,
        } = outputs;
        let saved = self
            .store
            .save_pipeline_result(run_id, conversation_id, &compressed, &verified, &optimized)
            .await?;
        if !saved {
            return Err(CrystalCoreError::not_found("conversation", conversation_id));
        }
        Ok(optimized)
    }

    fn enter(&self, status: &watch::Sender<PipelineStatus>, stage: StageKind, message: &str) {
        let stage = stage.pipeline_stage();
        let checkpoint = stage.checkpoint().unwrap_or_default();
        self.publish(status, |current| {
            current.stage = stage;
            current.progress = current.progress.max(checkpoint);
            current.message = message.to_string();
        });
    }

    fn fail(&self, status: &watch::Sender<PipelineStatus>, cause: &str) {
        if let Some(event) = self.failure(status, cause) {
            self.emit(event);
        }
    }

    fn failure(
        &self,
        status: &watch::Sender<PipelineStatus>,
        cause: &str,
    ) -> Option<PipelineEvent> {
        let cause = if cause.trim().is_empty() {
            "unknown error"
        } else {
            cause
        };
        self.transition(status, |current| {
            current.stage = PipelineStage::Failed;
            current.message = format!("Pipeline failed: {cause}");
            current.error = Some(cause.to_string());
            current.result = None;
        })
    }

    fn publish(
        &self,
        status: &watch::Sender<PipelineStatus>,
        update: impl FnOnce(&mut PipelineStatus),
    ) {
        if let Some(event) = self.transition(status, update) {
            self.emit(event);
        }
    }

    /// Apply a transition unless the run already reached a terminal state.
    /// Returns the event to emit for it.
    fn transition(
        &self,
        status: &watch::Sender<PipelineStatus>,
        update: impl FnOnce(&mut PipelineStatus),
    ) -> Option<PipelineEvent> {
        let mut snapshot = None;
        status.send_if_modified(|current| {
            if current.is_terminal() {
                return false;
            }
            update(current);
            current.timestamp = unix_now();
            snapshot = Some(PipelineEvent::from_status(current));
            true
        });
        snapshot
    }

    fn emit(&self, event: PipelineEvent) {
        if let Some(sink) = &self.event_sink {
            sink.emit(event);
        }
    }
}
