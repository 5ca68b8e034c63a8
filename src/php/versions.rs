//! Installed PHP versions.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use serde::Serialize;
use tracing::debug;

use crate::distro::DistributionProfile;
use crate::error::StackResult;
use crate::executor::run_command;
use crate::validation::{parse_php_version, PhpVersion};

/// `php8.3` (Debian) or `php83` (AUR).
static VERSIONED_BINARY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^php(\d)(?:\.(\d{1,2})|(\d))$").unwrap());

static CLI_VERSION: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"PHP (\d+\.\d+)").unwrap());

const CLI_TIMEOUT: Duration = Duration::from_secs(5);

/// A PHP version with a CLI binary on this host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstalledPhp {
    pub version: PhpVersion,
    pub binary: PathBuf,
    pub fpm_unit: String,
    pub is_default: bool,
}

/// Version encoded in a binary file name, if any.
pub fn version_from_binary_name(name: &str) -> Option<PhpVersion> {
    let caps = VERSIONED_BINARY.captures(name)?;
    let minor = caps.get(2).or_else(|| caps.get(3))?.as_str();
    parse_php_version(&format!("{}.{}", &caps[1], minor)).ok()
}

/// Version reported by `php -v`.
pub fn version_from_cli_output(stdout: &str) -> Option<PhpVersion> {
    let caps = CLI_VERSION.captures(stdout)?;
    parse_php_version(&caps[1]).ok()
}

/// Ask an unversioned `php` binary for its version.
fn cli_version(binary: &Path) -> Option<PhpVersion> {
    let output = run_command(&binary.to_string_lossy(), &["-v"], CLI_TIMEOUT).ok()?;
    if !output.success {
        return None;
    }
    version_from_cli_output(&output.stdout)
}

/// PHP versions installed on the host, newest first.
///
/// Versioned binaries are found by name; the plain `php` binary is asked
/// for its version when no versioned binary already covers it.
pub fn installed(profile: &DistributionProfile) -> StackResult<Vec<InstalledPhp>> {
    let bin_dir = profile.rooted("/usr/bin");
    let mut found: BTreeMap<PhpVersion, PathBuf> = BTreeMap::new();

    match std::fs::read_dir(&bin_dir) {
        Ok(entries) => {
            for entry in entries {
                let entry = entry?;
                let name = entry.file_name();
                if let Some(version) = name.to_str().and_then(version_from_binary_name) {
                    found.entry(version).or_insert_with(|| entry.path());
                }
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }

    let plain = bin_dir.join("php");
    if plain.is_file() {
        match cli_version(&plain) {
            Some(version) => {
                found.entry(version).or_insert(plain);
            }
            None => debug!(binary = %plain.display(), "Could not read PHP version"),
        }
    }

    let default = profile.default_php();
    Ok(found
        .into_iter()
        .rev()
        .map(|(version, binary)| InstalledPhp {
            version,
            binary,
            fpm_unit: profile.php_fpm_unit(version),
            is_default: version == default,
        })
        .collect())
}
