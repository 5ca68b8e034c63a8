//! Pure reads of live state.

use std::path::PathBuf;

use tracing::{debug, warn};

use crate::distro::DistributionProfile;
use crate::error::StackResult;
use crate::services::{ObservedState, UnitProbe};
use crate::sites::{hosts, parse, LayoutPaths, VirtualHost};

/// Query the init system for a unit's state.
///
/// A failed probe yields `Unknown` fields rather than an error.
pub fn observe_service(probe: &dyn UnitProbe, unit: &str) -> ObservedState {
    let status = probe.active_state(unit).unwrap_or_else(|e| {
        warn!(unit = %unit, error = %e, "Status probe failed");
        ObservedState::UNKNOWN.status
    });
    let enabled_at_boot = probe.boot_state(unit).unwrap_or_else(|e| {
        warn!(unit = %unit, error = %e, "Boot state probe failed");
        ObservedState::UNKNOWN.enabled_at_boot
    });

    ObservedState {
        status,
        enabled_at_boot,
    }
}

/// Current hosts-file content; a missing file reads as empty.
pub fn read_hosts(profile: &DistributionProfile) -> StackResult<String> {
    match std::fs::read_to_string(profile.hosts_file()) {
        Ok(content) => Ok(content),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
        Err(e) => Err(e.into()),
    }
}

/// Read one site from disk.
pub fn observe_site(
    profile: &DistributionProfile,
    hostname: &str,
) -> StackResult<Option<VirtualHost>> {
    let hosts_content = read_hosts(profile)?;
    observe_site_with_hosts(profile, &hosts_content, hostname)
}

/// Same as [`observe_site`], against an already-read hosts file.
pub fn observe_site_with_hosts(
    profile: &DistributionProfile,
    hosts_content: &str,
    hostname: &str,
) -> StackResult<Option<VirtualHost>> {
    let Some(files) = LayoutPaths::new(profile).locate(hostname)? else {
        return Ok(None);
    };

    let content = std::fs::read_to_string(&files.definition)?;
    if !parse::is_server_definition(&content) {
        debug!(path = %files.definition.display(), "File has no server block");
        return Ok(None);
    }
    let parsed = parse::parse_definition(&content);

    Ok(Some(VirtualHost {
        hostname: hostname.to_string(),
        config_path: files.definition,
        server_names: parsed.server_names,
        document_root: parsed.document_root.map(PathBuf::from),
        php_version: parsed.php_version,
        enabled: files.enabled,
        layout: profile.layout(),
        host_registered: hosts::has_entry(hosts_content, hostname),
    }))
}
