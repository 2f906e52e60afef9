//! Provider export parsing into canonical conversations.
//!
//! Each provider gets one [`SourceExtractor`]; the [`ExtractorRegistry`] maps
//! source tags onto extractors and is the single place new providers are
//! wired in.

mod error;
mod extractor;
mod normalize;
pub mod providers;
mod registry;

pub use error::{ExtractError, ParseError};
pub use extractor::{ExtractionBatch, SourceExtractor};
pub use normalize::{parse_timestamp, text_from_content};
pub use registry::{DEFAULT_MAX_PAYLOAD_BYTES, ExtractorRegistry, default_extractor};
