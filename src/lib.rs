//! Evaluate a feature flag and log the evaluation as JSON lines.
//!
//! The context's canonical key is derived once ([`context::derive_canonical_key`])
//! and shared by the `before_flag_evaluation` and `after_flag_evaluation`
//! records, so a log consumer can correlate the pair and measure latency.

pub mod config;
pub mod context;
pub mod emit;
pub mod error;
pub mod evaluation;
pub mod hooks;
pub mod records;
pub mod run;

pub use error::{Error, Result, ValidationError};
