//! Umbrella crate for crystal: export normalization, conversation storage
//! and the compress/verify/optimize pipeline behind one dependency.

pub use crystal_rs_config as config;
pub use crystal_rs_core as core;
pub use crystal_rs_extract as extract;
pub use crystal_rs_protocol as protocol;
pub use crystal_rs_store as store;

#[inline]
/// Install env_logger as the `log` backend when the `logging` feature is on.
///
/// Honours `RUST_LOG`. Later calls are ignored.
pub fn init_logging() {
    #[cfg(feature = "logging")]
    {
        let _ = env_logger::builder()
            .format_timestamp_millis()
            .parse_default_env()
            .try_init();
    }
}
