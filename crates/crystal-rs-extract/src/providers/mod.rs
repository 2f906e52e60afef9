//! Built-in extractors, one per supported provider.

mod chatgpt;
mod claude;
mod deepseek;
mod flat;
mod moonshot;
mod perplexity;

pub use chatgpt::ChatGptExtractor;
pub use claude::ClaudeExtractor;
pub use deepseek::DeepseekExtractor;
pub use moonshot::MoonshotExtractor;
pub use perplexity::PerplexityExtractor;
