//! Error types for the stack manager.
//!
//! Provides a unified error handling system using thiserror.

mod types;

pub use types::*;
