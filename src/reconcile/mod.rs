//! State reconciler.
//!
//! Re-derives observed fields from the live system, serializes work per
//! entity, and polls services on a timer for long-running front ends.

mod locks;
mod observe;
mod poller;

pub use locks::EntityLocks;
pub use observe::{observe_service, observe_site, observe_site_with_hosts, read_hosts};
pub use poller::{Poller, StateChange};
