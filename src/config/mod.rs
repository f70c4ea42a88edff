//! Configuration model for tablelock.
//!
//! This module defines the Config struct that represents `tablelock.yaml`.
//! It supports forward-compatible YAML parsing (unknown fields are ignored),
//! sensible defaults for every field, and validation of config values.

mod model;
mod operations;
pub mod types;


// Re-export public API
pub use model::Config;
pub use operations::DEFAULT_CONFIG_FILE;
pub use types::StoreKind;
