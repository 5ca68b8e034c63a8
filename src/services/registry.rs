//! Service registry.
//!
//! Holds the services discovered on this host with their last observed
//! state, and routes every state change through the privileged executor.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, PoisonError, RwLock};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::distro::DistributionProfile;
use crate::error::{StackError, StackResult, ValidationErrorKind};
use crate::executor::{PrivilegedAction, PrivilegedExecutor};
use crate::reconcile::{observe_service, EntityLocks};

use super::kind::{Category, ExclusionGroup, ServiceKind};
use super::probe::{ObservedState, ServiceStatus, UnitProbe};

/// A discovered service and its last observed state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Service {
    pub kind: ServiceKind,
    pub unit: String,
    pub label: &'static str,
    pub category: Category,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exclusion_group: Option<ExclusionGroup>,
    /// Version reported by the software itself, such as `php -v` for
    /// PHP-FPM.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(flatten)]
    pub state: ObservedState,
}

/// Mutating `systemctl` verbs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceAction {
    Start,
    Stop,
    Restart,
    Enable,
    Disable,
}

impl ServiceAction {
    pub fn verb(&self) -> &'static str {
        match self {
            ServiceAction::Start => "start",
            ServiceAction::Stop => "stop",
            ServiceAction::Restart => "restart",
            ServiceAction::Enable => "enable",
            ServiceAction::Disable => "disable",
        }
    }
}

impl fmt::Display for ServiceAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.verb())
    }
}

impl FromStr for ServiceAction {
    type Err = StackError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "start" => Ok(ServiceAction::Start),
            "stop" => Ok(ServiceAction::Stop),
            "restart" => Ok(ServiceAction::Restart),
            "enable" => Ok(ServiceAction::Enable),
            "disable" => Ok(ServiceAction::Disable),
            other => Err(StackError::Validation {
                kind: ValidationErrorKind::InvalidParameter {
                    param: "action".to_string(),
                    message: format!("unknown service action '{}'", other),
                },
            }),
        }
    }
}

/// Registry of the services present on this host.
pub struct ServiceRegistry {
    profile: Arc<DistributionProfile>,
    probe: Arc<dyn UnitProbe>,
    executor: Arc<dyn PrivilegedExecutor>,
    services: RwLock<BTreeMap<ServiceKind, Service>>,
    locks: EntityLocks<ServiceKind>,
}

impl ServiceRegistry {
    /// Create an empty registry. Call [`discover`](Self::discover) to populate it.
    pub fn new(
        profile: Arc<DistributionProfile>,
        probe: Arc<dyn UnitProbe>,
        executor: Arc<dyn PrivilegedExecutor>,
    ) -> Self {
        Self {
            profile,
            probe,
            executor,
            services: RwLock::new(BTreeMap::new()),
            locks: EntityLocks::new(),
        }
    }

    /// Probe the host for every catalog service.
    ///
    /// Walks the catalog in order; a service is skipped when another member
    /// of its exclusion group is already present or when its unit has no
    /// equivalent on this distribution. Never escalates.
    pub fn discover(&self) -> Vec<Service> {
        let mut taken: HashSet<ExclusionGroup> = HashSet::new();
        let mut found = BTreeMap::new();

        for kind in ServiceKind::ALL {
            if let Some(group) = kind.exclusion_group() {
                if taken.contains(&group) {
                    debug!(service = %kind, group = ?group, "Skipping, group already present");
                    continue;
                }
            }

            let unit = match self.profile.unit_name(kind) {
                Ok(unit) => unit,
                Err(e) if e.is_unsupported() => {
                    debug!(service = %kind, "Not available on this distribution");
                    continue;
                }
                Err(e) => {
                    warn!(service = %kind, error = %e, "Could not resolve unit");
                    continue;
                }
            };

            match self.probe.is_installed(&unit) {
                Ok(true) => {}
                Ok(false) => continue,
                Err(e) => {
                    warn!(service = %kind, unit = %unit, error = %e, "Presence probe failed");
                    continue;
                }
            }

            if let Some(group) = kind.exclusion_group() {
                taken.insert(group);
            }

            let state = observe_service(self.probe.as_ref(), &unit);
            found.insert(
                kind,
                Service {
                    kind,
                    unit,
                    label: kind.label(),
                    category: kind.category(),
                    exclusion_group: kind.exclusion_group(),
                    version: self.probe.version(kind),
                    state,
                },
            );
        }

        info!(count = found.len(), "Service discovery finished");

        let services: Vec<Service> = found.values().cloned().collect();
        *self.services.write().unwrap_or_else(PoisonError::into_inner) = found;
        services
    }

    /// Discovered services in catalog order, as last observed.
    pub fn list(&self) -> Vec<Service> {
        self.services
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    /// The discovered service of `kind`, as last observed.
    pub fn get(&self, kind: ServiceKind) -> StackResult<Service> {
        self.services
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&kind)
            .cloned()
            .ok_or_else(|| StackError::NotDiscovered {
                service: kind.name().to_string(),
            })
    }

    fn store_state(&self, kind: ServiceKind, state: ObservedState) -> StackResult<Service> {
        let mut services = self.services.write().unwrap_or_else(PoisonError::into_inner);
        let service = services
            .get_mut(&kind)
            .ok_or_else(|| StackError::NotDiscovered {
                service: kind.name().to_string(),
            })?;
        service.state = state;
        Ok(service.clone())
    }

    /// Overwrite the in-memory state of `kind` with a fresh observation.
    pub fn refresh(&self, kind: ServiceKind) -> StackResult<Service> {
        let unit = self.get(kind)?.unit;
        self.locks.with(&kind, || {
            let state = observe_service(self.probe.as_ref(), &unit);
            self.store_state(kind, state)
        })
    }

    /// Current state of `kind`, read from the host.
    pub fn status(&self, kind: ServiceKind) -> StackResult<ObservedState> {
        Ok(self.refresh(kind)?.state)
    }

    /// Run a mutating action and report the state observed afterwards.
    ///
    /// On failure the stored state is left untouched and the executor's
    /// error is returned as is.
    pub fn apply(&self, kind: ServiceKind, action: ServiceAction) -> StackResult<Service> {
        let unit = self.get(kind)?.unit;

        self.locks.with(&kind, || {
            let request = PrivilegedAction::systemctl(action.verb(), &unit);
            self.executor.run(&request)?;

            let state = observe_service(self.probe.as_ref(), &unit);
            let expected_running = matches!(action, ServiceAction::Start | ServiceAction::Restart);
            if expected_running && state.status != ServiceStatus::Running {
                warn!(
                    service = %kind,
                    action = %action,
                    status = ?state.status,
                    "Service is not running after the action"
                );
            } else {
                info!(service = %kind, action = %action, status = ?state.status, "Service action applied");
            }

            self.store_state(kind, state)
        })
    }

    /// `systemctl reload` for `kind`. Observed state is not changed.
    pub fn reload(&self, kind: ServiceKind) -> StackResult<()> {
        let unit = self.get(kind)?.unit;
        self.locks.with(&kind, || {
            self.executor
                .run(&PrivilegedAction::systemctl("reload", &unit))
                .map(|_| info!(service = %kind, "Service reloaded"))
        })
    }

    /// Test the configuration of `kind` without applying it. Returns the
    /// rejection output, if any.
    pub fn check_config(&self, kind: ServiceKind) -> StackResult<Option<String>> {
        self.probe.check_config(kind)
    }

    /// Restart a unit that is not itself a catalog entry, such as the
    /// PHP-FPM pool of a non-default PHP version.
    pub fn restart_unit(&self, unit: &str) -> StackResult<()> {
        self.executor
            .run(&PrivilegedAction::systemctl("restart", unit))
            .map(|_| info!(unit = %unit, "Unit restarted"))
    }
}
