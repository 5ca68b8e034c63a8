//! Wiring of the stack manager from settings.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{info, warn};

use crate::audit::AuditLogger;
use crate::config::Settings;
use crate::distro::{self, DistributionProfile, Resolved, ResourceKind};
use crate::error::{StackError, StackResult};
use crate::executor::{PrivilegedExecutor, SystemExecutor};
use crate::php::{self, InstalledPhp, Xdebug};
use crate::reconcile::Poller;
use crate::services::{ServiceKind, ServiceRegistry, SystemctlProbe, UnitProbe};
use crate::sites::SiteStore;
use crate::templates::TemplateEngine;
use crate::validation::parse_php_version;

/// A resolved resource of the distribution profile; `value` is `None` when
/// the distribution has no equivalent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceEntry {
    pub resource: String,
    pub value: Option<String>,
}

/// Collaborators a [`Stack`] is assembled from.
pub struct StackParts {
    pub profile: DistributionProfile,
    pub executor: Arc<dyn PrivilegedExecutor>,
    pub probe: Arc<dyn UnitProbe>,
    pub templates: TemplateEngine,
    pub hosts_ip: String,
    pub poll_interval: Duration,
}

/// The service registry, site store and PHP helpers of one host, sharing a
/// profile and an executor.
pub struct Stack {
    profile: Arc<DistributionProfile>,
    registry: Arc<ServiceRegistry>,
    sites: SiteStore,
    xdebug: Xdebug,
    poll_interval: Duration,
}

impl Stack {
    /// Build the stack for this host and run service discovery.
    pub fn from_settings(settings: &Settings) -> StackResult<Self> {
        let default_php =
            parse_php_version(&settings.sites.default_php_version).map_err(|e| StackError::Config {
                message: e.to_string(),
            })?;
        let profile = distro::detect(&settings.distro, default_php);

        let audit = if settings.audit.enabled {
            match AuditLogger::open(&settings.audit.log_path) {
                Ok(logger) => {
                    info!(path = %logger.path().display(), "Audit log open");
                    Some(logger)
                }
                Err(e) => {
                    warn!(
                        path = %settings.audit.log_path.display(),
                        error = %e,
                        "Audit log unavailable, continuing without it"
                    );
                    None
                }
            }
        } else {
            None
        };

        let templates = match &settings.sites.template_dir {
            Some(dir) => TemplateEngine::with_overrides(dir)?,
            None => TemplateEngine::builtin()?,
        };

        Ok(Self::assemble(StackParts {
            profile,
            executor: Arc::new(SystemExecutor::from_settings(&settings.executor, audit)),
            probe: Arc::new(SystemctlProbe::new(Duration::from_secs(
                settings.executor.probe_timeout_seconds,
            ))),
            templates,
            hosts_ip: settings.sites.hosts_ip.clone(),
            poll_interval: Duration::from_secs(settings.reconcile.poll_interval_seconds),
        }))
    }

    /// Build the stack from explicit parts and run service discovery.
    pub fn assemble(parts: StackParts) -> Self {
        let profile = Arc::new(parts.profile);
        let registry = Arc::new(ServiceRegistry::new(
            Arc::clone(&profile),
            parts.probe,
            Arc::clone(&parts.executor),
        ));
        let discovered = registry.discover();
        info!(services = discovered.len(), "Stack ready");

        let sites = SiteStore::new(
            Arc::clone(&profile),
            Arc::clone(&parts.executor),
            Arc::clone(&registry),
            parts.templates,
            parts.hosts_ip,
        );
        let xdebug = Xdebug::new(Arc::clone(&profile), parts.executor, Arc::clone(&registry));

        Self {
            profile,
            registry,
            sites,
            xdebug,
            poll_interval: parts.poll_interval,
        }
    }

    pub fn profile(&self) -> &DistributionProfile {
        &self.profile
    }

    pub fn services(&self) -> &ServiceRegistry {
        &self.registry
    }

    pub fn sites(&self) -> &SiteStore {
        &self.sites
    }

    pub fn xdebug(&self) -> &Xdebug {
        &self.xdebug
    }

    pub fn php_versions(&self) -> StackResult<Vec<InstalledPhp>> {
        php::installed(&self.profile)
    }

    /// A poller over this stack's registry, at the configured interval.
    pub fn poller(&self) -> Poller {
        Poller::new(Arc::clone(&self.registry), self.poll_interval)
    }

    /// Every resource kind resolved against the profile.
    pub fn resources(&self) -> StackResult<Vec<ResourceEntry>> {
        let default_php = self.profile.default_php();
        let mut kinds: Vec<ResourceKind> = ServiceKind::ALL
            .iter()
            .map(|&service| ResourceKind::ServiceUnit(service))
            .collect();
        kinds.extend([
            ResourceKind::PhpFpmUnit(default_php),
            ResourceKind::VhostAvailableDir,
            ResourceKind::VhostEnabledDir,
            ResourceKind::HostsFile,
            ResourceKind::PhpFpmSocket(default_php),
            ResourceKind::XdebugConfig(default_php),
            ResourceKind::BinaryDir,
        ]);
        kinds.extend(ServiceKind::ALL.iter().map(|&service| ResourceKind::DefaultConfig(service)));

        kinds
            .into_iter()
            .map(|kind| {
                let value = match self.profile.resolve(kind) {
                    Ok(Resolved::Unit(unit)) => Some(unit),
                    Ok(Resolved::Path(path)) => Some(path.display().to_string()),
                    Err(e) if e.is_unsupported() => None,
                    Err(e) => return Err(e),
                };
                Ok(ResourceEntry {
                    resource: kind.to_string(),
                    value,
                })
            })
            .collect()
    }
}
