//! Core pipeline: stage contracts, built-in stages, the run orchestrator and
//! the submission service.

pub mod error;
pub mod pipeline;
pub mod service;
pub mod stages;

pub use error::{CrystalCoreError, StageError, StageKind};
pub use pipeline::{PipelineOrchestrator, PipelineSettings, run_id_for};
pub use service::CrystalService;
pub use stages::{
    Compressor, ExtractiveCompressor, LexicalVerifier, OptimizeOptions, Optimizer,
    PipelineStages, TemplateOptimizer, Verifier, estimate_tokens,
};
