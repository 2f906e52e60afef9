//! Error types for the pipeline core.

use crystal_rs_extract::ExtractError;
use crystal_rs_protocol::{PipelineStage, RunId};
use crystal_rs_store::StoreError;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Errors returned by orchestrator and service operations.
#[derive(Debug, Error)]
pub enum CrystalCoreError {
    /// Conversation or run id is unknown.
    #[error("unknown {kind}: {id}")]
    NotFound { kind: &'static str, id: String },
    /// A run for the conversation is still in flight.
    #[error("pipeline already running for conversation {conversation_id} (run_id={run_id})")]
    AlreadyRunning {
        conversation_id: String,
        run_id: RunId,
    },
    /// A stage transformation failed.
    #[error(transparent)]
    Stage(#[from] StageError),
    /// Conversation store error.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    /// Export extraction error.
    #[error("extract error: {0}")]
    Extract(#[from] ExtractError),
    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// Caller-supplied input was rejected.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// The run was cancelled before it completed.
    #[error("pipeline run {0} was cancelled")]
    Cancelled(RunId),
    /// The orchestrator no longer accepts runs.
    #[error("pipeline orchestrator is shutting down")]
    ShuttingDown,
}

impl CrystalCoreError {
    pub(crate) fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        CrystalCoreError::NotFound {
            kind,
            id: id.into(),
        }
    }
}

/// The three transformation steps of a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageKind {
    Compress,
    Verify,
    Optimize,
}

impl StageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageKind::Compress => "compress",
            StageKind::Verify => "verify",
            StageKind::Optimize => "optimize",
        }
    }

    /// Pipeline state a run is in while this stage executes.
    pub fn pipeline_stage(&self) -> PipelineStage {
        match self {
            StageKind::Compress => PipelineStage::Compression,
            StageKind::Verify => PipelineStage::Verification,
            StageKind::Optimize => PipelineStage::Optimization,
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure of a single stage invocation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{stage} stage failed: {cause}")]
pub struct StageError {
    pub stage: StageKind,
    pub cause: String,
}

impl StageError {
    pub fn new(stage: StageKind, cause: impl Into<String>) -> Self {
        Self {
            stage,
            cause: cause.into(),
        }
    }

    /// Stage did not finish before its deadline.
    pub fn timeout(stage: StageKind, limit: Duration) -> Self {
        Self::new(stage, format!("timed out after {}ms", limit.as_millis()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn stage_errors_render_stage_and_cause() {
        let err = StageError::timeout(StageKind::Verify, Duration::from_millis(250));
        assert_eq!(err.to_string(), "verify stage failed: timed out after 250ms");
        assert_eq!(StageKind::Optimize.pipeline_stage(), PipelineStage::Optimization);
    }

    #[test]
    fn core_errors_render_context() {
        let err = CrystalCoreError::not_found("run", "pipeline_x");
        assert_eq!(err.to_string(), "unknown run: pipeline_x");
        let err = CrystalCoreError::from(StageError::new(StageKind::Compress, "boom"));
        assert_eq!(err.to_string(), "compress stage failed: boom");
    }
}
