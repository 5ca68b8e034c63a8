//! Where site definitions live on disk for each layout.

use std::collections::BTreeSet;
use std::path::PathBuf;

use tracing::{debug, warn};

use crate::distro::{DistributionProfile, VhostLayout};
use crate::error::StackResult;
use crate::validation::validate_hostname;

const CONF_SUFFIX: &str = ".conf";
const DISABLED_SUFFIX: &str = ".conf.disabled";

/// Files backing one existing site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteFiles {
    /// The definition file as it currently exists.
    pub definition: PathBuf,
    /// Symlink in the enabled directory (symlinked layout only).
    pub enabled_link: Option<PathBuf>,
    pub enabled: bool,
}

/// Path-level view of a profile's vhost layout.
pub struct LayoutPaths<'a> {
    profile: &'a DistributionProfile,
}

impl<'a> LayoutPaths<'a> {
    pub fn new(profile: &'a DistributionProfile) -> Self {
        Self { profile }
    }

    pub fn layout(&self) -> VhostLayout {
        self.profile.layout()
    }

    /// Where `create` writes a new, not yet enabled, definition.
    pub fn new_definition(&self, hostname: &str) -> PathBuf {
        let dir = self.profile.vhost_available_dir();
        match self.layout() {
            VhostLayout::Symlinked => dir.join(hostname),
            VhostLayout::SingleDirectory => dir.join(format!("{}{}", hostname, DISABLED_SUFFIX)),
        }
    }

    /// Enabled-state name of a single-directory definition.
    pub fn enabled_definition(&self, hostname: &str) -> PathBuf {
        self.profile
            .vhost_available_dir()
            .join(format!("{}{}", hostname, CONF_SUFFIX))
    }

    /// Disabled-state name of a single-directory definition.
    pub fn disabled_definition(&self, hostname: &str) -> PathBuf {
        self.profile
            .vhost_available_dir()
            .join(format!("{}{}", hostname, DISABLED_SUFFIX))
    }

    /// Find the files of `hostname`, if it has a definition.
    pub fn locate(&self, hostname: &str) -> StackResult<Option<SiteFiles>> {
        match self.layout() {
            VhostLayout::Symlinked => self.locate_symlinked(hostname),
            VhostLayout::SingleDirectory => Ok(self.locate_single(hostname)),
        }
    }

    fn locate_symlinked(&self, hostname: &str) -> StackResult<Option<SiteFiles>> {
        let available = self.profile.vhost_available_dir();
        let enabled_dir = self.profile.vhost_enabled_dir()?;

        for name in [hostname.to_string(), format!("{}{}", hostname, CONF_SUFFIX)] {
            let definition = available.join(&name);
            if !definition.is_file() {
                continue;
            }
            let link = enabled_dir.join(&name);
            // symlink_metadata: a dangling link still counts as enabled
            let enabled = link.symlink_metadata().is_ok();
            return Ok(Some(SiteFiles {
                definition,
                enabled_link: Some(link),
                enabled,
            }));
        }

        Ok(None)
    }

    fn locate_single(&self, hostname: &str) -> Option<SiteFiles> {
        let enabled = self.enabled_definition(hostname);
        let disabled = self.disabled_definition(hostname);

        match (enabled.is_file(), disabled.is_file()) {
            (true, both) => {
                if both {
                    warn!(
                        hostname = %hostname,
                        "Site has both enabled and disabled definitions, using the enabled one"
                    );
                }
                Some(SiteFiles {
                    definition: enabled,
                    enabled_link: None,
                    enabled: true,
                })
            }
            (false, true) => Some(SiteFiles {
                definition: disabled,
                enabled_link: None,
                enabled: false,
            }),
            (false, false) => None,
        }
    }

    /// Hostnames that have a definition file.
    ///
    /// Files whose name is not a valid hostname (`default`, `ssl.conf`) are
    /// not sites and are skipped.
    pub fn scan(&self) -> StackResult<BTreeSet<String>> {
        let dir = self.profile.vhost_available_dir();
        let mut hostnames = BTreeSet::new();

        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %dir.display(), "Vhost directory does not exist");
                return Ok(hostnames);
            }
            Err(e) => return Err(e.into()),
        };

        for entry in entries {
            let entry = entry?;
            if !entry.path().is_file() {
                continue;
            }
            let file_name = entry.file_name();
            let Some(file_name) = file_name.to_str() else {
                continue;
            };
            if file_name.starts_with('.') {
                continue;
            }

            let candidate = match self.layout() {
                VhostLayout::Symlinked => file_name.strip_suffix(CONF_SUFFIX).unwrap_or(file_name),
                VhostLayout::SingleDirectory => {
                    match file_name
                        .strip_suffix(DISABLED_SUFFIX)
                        .or_else(|| file_name.strip_suffix(CONF_SUFFIX))
                    {
                        Some(stem) => stem,
                        None => continue,
                    }
                }
            };

            if validate_hostname(candidate).is_ok() {
                hostnames.insert(candidate.to_string());
            } else {
                debug!(file = %file_name, "Skipping non-site file");
            }
        }

        Ok(hostnames)
    }
}
