//! Site store module.
//!
//! Virtual-host definitions, their PHP binding and hosts-file registration.

pub mod hosts;
mod layout;
mod model;
pub mod parse;
mod store;

pub use layout::{LayoutPaths, SiteFiles};
pub use model::{ReloadOutcome, SiteUpdate, VirtualHost};
pub use store::SiteStore;
