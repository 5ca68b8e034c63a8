//! Site read models.

use std::path::PathBuf;

use serde::Serialize;

use crate::distro::VhostLayout;
use crate::validation::PhpVersion;

/// A virtual host as found on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VirtualHost {
    pub hostname: String,
    pub config_path: PathBuf,
    pub server_names: Vec<String>,
    pub document_root: Option<PathBuf>,
    /// `None` means the site uses the default PHP-FPM pool.
    pub php_version: Option<PhpVersion>,
    pub enabled: bool,
    pub layout: VhostLayout,
    pub host_registered: bool,
}

/// What happened to the web server after a site change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reload", rename_all = "kebab-case")]
pub enum ReloadOutcome {
    Reloaded,
    /// The change did not touch any served configuration.
    NotNeeded,
    /// The web server is not installed or not running.
    Skipped,
    /// The change is on disk; the web server still serves the old config.
    Failed { error: String },
    /// The configuration test failed, so no reload was attempted. The
    /// change is on disk and the web server still serves the old config.
    InvalidConfig { error: String },
}

/// A site after a change, with the reload outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SiteUpdate {
    pub site: VirtualHost,
    #[serde(flatten)]
    pub reload: ReloadOutcome,
}
