//! Lumo Stack Library
//!
//! Manages a local web-development stack: discovers and controls the
//! database, cache, web server and PHP-FPM services, and maintains nginx
//! virtual hosts with their hosts-file entries. Every mutation goes through
//! a single privileged executor.

pub mod audit;
pub mod config;
pub mod distro;
pub mod error;
pub mod executor;
pub mod php;
pub mod reconcile;
pub mod services;
pub mod sites;
pub mod stack;
pub mod templates;
pub mod validation;

pub use stack::{ResourceEntry, Stack, StackParts};
