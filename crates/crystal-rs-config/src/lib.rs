//! Settings for the crystal service: pipeline knobs, store location and
//! export limits, loaded from layered JSON5 files.

mod error;
mod loader;
mod model;

pub use error::ConfigError;
/// Layer discovery and loader options.
pub use loader::{ConfigLayer, ConfigLayerSource, LayeredConfig, LayeredConfigOptions};
pub use model::*;
