//! Configuration module for the stack manager.
//!
//! Handles loading and validating configuration from TOML files.

mod settings;

pub use settings::*;
