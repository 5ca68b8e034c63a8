//! Service registry module.
//!
//! The catalog of stack services, discovery on the host, status probes and
//! mutating actions.

mod kind;
mod probe;
mod registry;

pub use kind::{Category, ExclusionGroup, ServiceKind};
pub use probe::{BootState, ObservedState, ServiceStatus, SystemctlProbe, UnitProbe};
pub use registry::{Service, ServiceAction, ServiceRegistry};
