//! Configuration models and json5 config loading.
//!
//! This crate owns the Life Agent config schema and the file discovery
//! logic shared by binaries and the SDK.

mod error;
mod loader;
mod model;

/// Public error type returned by config loading APIs.
pub use error::ConfigError;
/// Configuration schema models.
pub use model::*;
