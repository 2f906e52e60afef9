//! Test helpers shared across crystal crates.

pub mod fixtures;
pub mod sink;
pub mod stages;

pub use fixtures::{chatgpt_export, conversation, conversation_with};
pub use sink::RecordingSink;
pub use stages::{
    FailingStage, FixedCompressor, FixedOptimizer, FixedVerifier, GatedCompressor, fixed_stages,
};
