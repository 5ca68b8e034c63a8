//! The site store.
//!
//! Owns the lifecycle of virtual-host definitions. Every file change goes
//! through the privileged executor; reads go straight to disk.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use tracing::{debug, info, warn};

use crate::distro::DistributionProfile;
use crate::error::{SiteErrorKind, SiteStep, StackError, StackResult};
use crate::executor::{PrivilegedAction, PrivilegedExecutor};
use crate::reconcile::{observe_site_with_hosts, read_hosts, EntityLocks};
use crate::services::{ServiceKind, ServiceRegistry, ServiceStatus};
use crate::templates::{TemplateEngine, VHOST_TEMPLATE};
use crate::validation::{validate_document_root, validate_hostname, PhpVersion};

use super::hosts;
use super::layout::{LayoutPaths, SiteFiles};
use super::model::{ReloadOutcome, SiteUpdate, VirtualHost};
use super::parse::rebind_php;

fn not_found(hostname: &str) -> StackError {
    StackError::Site {
        kind: SiteErrorKind::NotFound {
            hostname: hostname.to_string(),
        },
    }
}

/// Wrap the error of `step`; with nothing completed yet it is returned as is.
fn step_failed(hostname: &str, step: SiteStep, completed: &[SiteStep], source: StackError) -> StackError {
    if completed.is_empty() {
        return source;
    }
    StackError::PartialFailure {
        hostname: hostname.to_string(),
        step,
        completed: completed.to_vec(),
        source: Box::new(source),
    }
}

/// Virtual-host definitions on this host.
pub struct SiteStore {
    profile: Arc<DistributionProfile>,
    executor: Arc<dyn PrivilegedExecutor>,
    registry: Arc<ServiceRegistry>,
    templates: TemplateEngine,
    hosts_ip: String,
    sites: RwLock<BTreeMap<String, VirtualHost>>,
    locks: EntityLocks<String>,
    /// The hosts file is shared by every hostname; edits hold this across
    /// their read and rewrite. Taken after a hostname lock, never before.
    hosts_file: Mutex<()>,
}

impl SiteStore {
    pub fn new(
        profile: Arc<DistributionProfile>,
        executor: Arc<dyn PrivilegedExecutor>,
        registry: Arc<ServiceRegistry>,
        templates: TemplateEngine,
        hosts_ip: impl Into<String>,
    ) -> Self {
        Self {
            profile,
            executor,
            registry,
            templates,
            hosts_ip: hosts_ip.into(),
            sites: RwLock::new(BTreeMap::new()),
            locks: EntityLocks::new(),
            hosts_file: Mutex::new(()),
        }
    }

    fn paths(&self) -> LayoutPaths<'_> {
        LayoutPaths::new(&self.profile)
    }

    fn cache(&self, hostname: &str, site: Option<&VirtualHost>) {
        let mut sites = self.sites.write().unwrap_or_else(PoisonError::into_inner);
        match site {
            Some(site) => {
                sites.insert(hostname.to_string(), site.clone());
            }
            None => {
                sites.remove(hostname);
            }
        }
    }

    /// Run `f` on the current hosts file content with the hosts-file lock
    /// held.
    fn with_hosts<T>(&self, f: impl FnOnce(&str) -> StackResult<T>) -> StackResult<T> {
        let _guard = self.hosts_file.lock().unwrap_or_else(PoisonError::into_inner);
        let content = read_hosts(&self.profile)?;
        f(&content)
    }

    /// Observe one site and overwrite the cached copy. Caller holds the lock.
    fn refresh_locked(&self, hostname: &str) -> StackResult<Option<VirtualHost>> {
        let site =
            self.with_hosts(|content| observe_site_with_hosts(&self.profile, content, hostname))?;
        self.cache(hostname, site.as_ref());
        Ok(site)
    }

    fn require_site(&self, hostname: &str) -> StackResult<VirtualHost> {
        self.refresh_locked(hostname)?
            .ok_or_else(|| not_found(hostname))
    }

    fn locate_existing(&self, hostname: &str) -> StackResult<SiteFiles> {
        self.paths()
            .locate(hostname)?
            .ok_or_else(|| not_found(hostname))
    }

    /// Every site on disk, sorted by hostname.
    pub fn list(&self) -> StackResult<Vec<VirtualHost>> {
        let hostnames = self.paths().scan()?;
        let mut found = Vec::with_capacity(hostnames.len());

        for hostname in hostnames {
            if let Some(site) = self.locks.with(&hostname, || self.refresh_locked(&hostname))? {
                found.push(site);
            }
        }

        // Drop cached sites that disappeared from disk
        let mut sites = self.sites.write().unwrap_or_else(PoisonError::into_inner);
        sites.retain(|hostname, _| found.iter().any(|site| &site.hostname == hostname));

        Ok(found)
    }

    /// Re-read one site from disk.
    pub fn refresh(&self, hostname: &str) -> StackResult<Option<VirtualHost>> {
        let hostname = validate_hostname(hostname)?;
        self.locks.with(&hostname.to_string(), || self.refresh_locked(hostname))
    }

    pub fn get(&self, hostname: &str) -> StackResult<VirtualHost> {
        self.refresh(hostname)?.ok_or_else(|| not_found(hostname))
    }

    /// Last observed copy of a site, without touching the disk.
    pub fn cached(&self, hostname: &str) -> Option<VirtualHost> {
        self.sites
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(hostname)
            .cloned()
    }

    fn render_definition(
        &self,
        hostname: &str,
        document_root: &str,
        version: PhpVersion,
    ) -> StackResult<String> {
        let socket = self.profile.php_fpm_socket(version);
        let context = serde_json::json!({
            "hostname": hostname,
            "document_root": document_root,
            "php_version": version.to_string(),
            "php_socket": socket.to_string_lossy(),
        });
        self.templates.render(VHOST_TEMPLATE, &context)
    }

    /// Write a new site definition. The site starts disabled.
    ///
    /// The document root is created when missing. `php_version` of `None`
    /// binds the site to the default PHP version.
    pub fn create(
        &self,
        hostname: &str,
        document_root: &str,
        php_version: Option<PhpVersion>,
    ) -> StackResult<VirtualHost> {
        let hostname = validate_hostname(hostname)?;
        let document_root = validate_document_root(document_root)?;
        let version = php_version.unwrap_or_else(|| self.profile.default_php());

        self.locks.with(&hostname.to_string(), || {
            if self.paths().locate(hostname)?.is_some() {
                return Err(StackError::Site {
                    kind: SiteErrorKind::AlreadyExists {
                        hostname: hostname.to_string(),
                    },
                });
            }

            let content = self.render_definition(hostname, document_root, version)?;
            let mut completed = Vec::new();

            let root_dir = self.profile.rooted(document_root);
            if !root_dir.exists() {
                self.executor.run(&PrivilegedAction::create_dir(&root_dir))?;
                completed.push(SiteStep::CreateDocumentRoot);
            }

            let definition = self.paths().new_definition(hostname);
            self.executor
                .run(&PrivilegedAction::write_file(&definition, &content))
                .map_err(|e| step_failed(hostname, SiteStep::WriteDefinition, &completed, e))?;

            info!(
                hostname = %hostname,
                path = %definition.display(),
                php_version = %version,
                "Site created"
            );

            self.require_site(hostname)
        })
    }

    fn toggle_action(&self, hostname: &str, files: &SiteFiles, enabled: bool) -> PrivilegedAction {
        match (&files.enabled_link, enabled) {
            (Some(link), true) => PrivilegedAction::symlink(&files.definition, link),
            (Some(link), false) => PrivilegedAction::remove(link),
            (None, true) => {
                PrivilegedAction::rename(&files.definition, &self.paths().enabled_definition(hostname))
            }
            (None, false) => {
                PrivilegedAction::rename(&files.definition, &self.paths().disabled_definition(hostname))
            }
        }
    }

    /// Enable or disable a site. A no-op when it is already in that state.
    pub fn set_enabled(&self, hostname: &str, enabled: bool) -> StackResult<SiteUpdate> {
        let hostname = validate_hostname(hostname)?;

        let (site, changed) = self.locks.with(&hostname.to_string(), || {
            let files = self.locate_existing(hostname)?;
            if files.enabled == enabled {
                debug!(hostname = %hostname, enabled, "Site already in requested state");
                return Ok((self.require_site(hostname)?, false));
            }

            self.executor.run(&self.toggle_action(hostname, &files, enabled))?;
            info!(hostname = %hostname, enabled, "Site state changed");
            Ok::<_, StackError>((self.require_site(hostname)?, true))
        })?;

        let reload = if changed {
            self.reload_web_server()
        } else {
            ReloadOutcome::NotNeeded
        };
        Ok(SiteUpdate { site, reload })
    }

    /// Bind a site to another PHP version and reload the web server.
    ///
    /// A failed reload is reported in the outcome; the new definition stays
    /// on disk.
    pub fn set_php_version(&self, hostname: &str, version: PhpVersion) -> StackResult<SiteUpdate> {
        let hostname = validate_hostname(hostname)?;
        let socket = self.profile.php_fpm_socket(version);

        let (site, changed) = self.locks.with(&hostname.to_string(), || {
            let files = self.locate_existing(hostname)?;
            let content = std::fs::read_to_string(&files.definition)?;
            let rebound = rebind_php(&content, version, &socket.to_string_lossy())?;

            if rebound == content {
                return Ok((self.require_site(hostname)?, false));
            }

            self.executor
                .run(&PrivilegedAction::write_file(&files.definition, &rebound))?;
            info!(hostname = %hostname, php_version = %version, "Site PHP version changed");
            Ok::<_, StackError>((self.require_site(hostname)?, true))
        })?;

        let reload = if changed {
            self.reload_web_server()
        } else {
            ReloadOutcome::NotNeeded
        };
        Ok(SiteUpdate { site, reload })
    }

    /// Remove a site: disable it, drop its hosts entry, then remove the
    /// definition.
    ///
    /// A failure after the first step yields `PartialFailure`; the site is
    /// then disabled but not fully removed.
    pub fn delete(&self, hostname: &str) -> StackResult<ReloadOutcome> {
        let hostname = validate_hostname(hostname)?;

        let was_enabled = self.locks.with(&hostname.to_string(), || {
            let files = self.locate_existing(hostname)?;
            let mut completed = Vec::new();
            let mut definition = files.definition.clone();

            if files.enabled {
                self.executor
                    .run(&self.toggle_action(hostname, &files, false))
                    .map_err(|e| step_failed(hostname, SiteStep::Disable, &completed, e))?;
                completed.push(SiteStep::Disable);
                if files.enabled_link.is_none() {
                    definition = self.paths().disabled_definition(hostname);
                }
            }

            let unregistered = self
                .with_hosts(|content| self.unregister_locked(hostname, content))
                .map_err(|e| step_failed(hostname, SiteStep::UnregisterHost, &completed, e))?;
            if unregistered {
                completed.push(SiteStep::UnregisterHost);
            }

            self.executor
                .run(&PrivilegedAction::remove(&definition))
                .map_err(|e| step_failed(hostname, SiteStep::RemoveDefinition, &completed, e))?;

            self.cache(hostname, None);
            info!(hostname = %hostname, "Site deleted");
            Ok::<_, StackError>(files.enabled)
        })?;

        Ok(if was_enabled {
            self.reload_web_server()
        } else {
            ReloadOutcome::NotNeeded
        })
    }

    /// Map `hostname` to the configured address in the hosts file.
    ///
    /// Returns whether the file changed.
    pub fn register_host(&self, hostname: &str) -> StackResult<bool> {
        let hostname = validate_hostname(hostname)?;
        self.locks.with(&hostname.to_string(), || {
            let added = self.with_hosts(|content| {
                if hosts::has_entry(content, hostname) {
                    debug!(hostname = %hostname, "Hosts entry already present");
                    return Ok(false);
                }

                let line = hosts::entry_to_append(content, &self.hosts_ip, hostname);
                self.executor
                    .run(&PrivilegedAction::append_file(&self.profile.hosts_file(), &line))?;
                info!(hostname = %hostname, ip = %self.hosts_ip, "Hosts entry added");
                Ok(true)
            })?;

            if added {
                self.refresh_locked(hostname)?;
            }
            Ok(added)
        })
    }

    /// Remove `hostname` from the hosts file. Returns whether the file changed.
    pub fn unregister_host(&self, hostname: &str) -> StackResult<bool> {
        let hostname = validate_hostname(hostname)?;
        self.locks.with(&hostname.to_string(), || {
            let changed = self.with_hosts(|content| self.unregister_locked(hostname, content))?;
            if changed {
                self.refresh_locked(hostname)?;
            }
            Ok(changed)
        })
    }

    /// Drop `hostname` from `content` and write it back. Caller holds the
    /// hosts-file lock.
    fn unregister_locked(&self, hostname: &str, content: &str) -> StackResult<bool> {
        if !hosts::has_entry(content, hostname) {
            return Ok(false);
        }

        let rewritten = hosts::without_entry(content, hostname);
        self.executor
            .run(&PrivilegedAction::write_file(&self.profile.hosts_file(), &rewritten))?;
        info!(hostname = %hostname, "Hosts entry removed");
        Ok(true)
    }

    /// Test the configuration and reload nginx when it is present and
    /// running.
    fn reload_web_server(&self) -> ReloadOutcome {
        match self.registry.get(ServiceKind::Nginx) {
            Ok(service) if service.state.status == ServiceStatus::Running => {}
            Ok(_) | Err(_) => {
                debug!("Web server not running, skipping reload");
                return ReloadOutcome::Skipped;
            }
        }

        match self.registry.check_config(ServiceKind::Nginx) {
            Ok(None) => {}
            Ok(Some(output)) => {
                warn!(output = %output, "Web server configuration rejected, not reloading");
                return ReloadOutcome::InvalidConfig { error: output };
            }
            Err(e) => warn!(error = %e, "Could not test web server configuration"),
        }

        match self.registry.reload(ServiceKind::Nginx) {
            Ok(()) => ReloadOutcome::Reloaded,
            Err(e) => {
                warn!(error = %e, "Web server reload failed");
                ReloadOutcome::Failed {
                    error: e.to_string(),
                }
            }
        }
    }
}
