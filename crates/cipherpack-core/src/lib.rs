//! cipherpack-core: shared pieces of the cipherpack codec
//!
//! Carries what both sides of the codec and its consumers need to agree on:
//! the error taxonomy, the compile-time wire constants and per-operation
//! options, the decoded header metadata, and the listener contract through
//! which a consumer observes a running operation.

#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod listener;
pub mod types;

pub use config::PackOptions;
pub use error::{CpackError, CpackResult};
pub use listener::{PackListener, SilentListener, TraceListener};
pub use types::PackHeader;
