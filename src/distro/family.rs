//! Distribution family detection.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Distribution families with distinct layouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistroFamily {
    Arch,
    Debian,
    Fedora,
    Unknown,
}

impl fmt::Display for DistroFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DistroFamily::Arch => "arch",
            DistroFamily::Debian => "debian",
            DistroFamily::Fedora => "fedora",
            DistroFamily::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// os-release IDs that map directly onto a family.
const ARCH_IDS: &[&str] = &["arch", "manjaro", "endeavouros", "garuda", "artix"];
const DEBIAN_IDS: &[&str] = &["debian", "ubuntu", "linuxmint", "pop", "elementary", "raspbian"];
const FEDORA_IDS: &[&str] = &["fedora", "rhel", "centos", "rocky", "almalinux", "ol"];

fn family_for_id(id: &str) -> Option<DistroFamily> {
    if ARCH_IDS.contains(&id) {
        Some(DistroFamily::Arch)
    } else if DEBIAN_IDS.contains(&id) {
        Some(DistroFamily::Debian)
    } else if FEDORA_IDS.contains(&id) {
        Some(DistroFamily::Fedora)
    } else {
        None
    }
}

/// Read one `KEY=value` entry, with optional quotes, from os-release text.
fn os_release_value<'a>(content: &'a str, key: &str) -> Option<&'a str> {
    content.lines().find_map(|line| {
        let (k, v) = line.trim().split_once('=')?;
        (k == key).then(|| v.trim().trim_matches('"').trim_matches('\''))
    })
}

/// Classify os-release content. `ID` wins over `ID_LIKE`.
pub fn classify_os_release(content: &str) -> DistroFamily {
    let id = os_release_value(content, "ID").map(str::to_lowercase);
    if let Some(family) = id.as_deref().and_then(family_for_id) {
        return family;
    }

    os_release_value(content, "ID_LIKE")
        .map(str::to_lowercase)
        .and_then(|like| like.split_whitespace().find_map(family_for_id))
        .unwrap_or(DistroFamily::Unknown)
}

/// Detect the family of the system mounted at `root`.
///
/// Never fails: a missing or unrecognised os-release yields `Unknown`.
pub fn detect_family(root: &Path) -> DistroFamily {
    let candidates = [root.join("etc/os-release"), root.join("usr/lib/os-release")];

    for path in &candidates {
        if let Ok(content) = std::fs::read_to_string(path) {
            let family = classify_os_release(&content);
            debug!(path = %path.display(), family = %family, "Classified distribution");
            if family == DistroFamily::Unknown {
                warn!(
                    path = %path.display(),
                    "Unrecognised distribution, using Debian-style defaults"
                );
            }
            return family;
        }
    }

    warn!("No os-release file found, using Debian-style defaults");
    DistroFamily::Unknown
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_by_id() {
        assert_eq!(classify_os_release("ID=arch\n"), DistroFamily::Arch);
        assert_eq!(classify_os_release("NAME=\"Ubuntu\"\nID=ubuntu\n"), DistroFamily::Debian);
        assert_eq!(classify_os_release("ID=\"fedora\"\n"), DistroFamily::Fedora);
    }

    #[test]
    fn test_classify_by_id_like() {
        let content = "ID=zorin\nID_LIKE=\"ubuntu debian\"\n";
        assert_eq!(classify_os_release(content), DistroFamily::Debian);
        let content = "ID=nobara\nID_LIKE=\"rhel fedora\"\n";
        assert_eq!(classify_os_release(content), DistroFamily::Fedora);
    }

    #[test]
    fn test_classify_unknown() {
        assert_eq!(classify_os_release("ID=gentoo\n"), DistroFamily::Unknown);
        assert_eq!(classify_os_release(""), DistroFamily::Unknown);
    }

    #[test]
    fn test_detect_from_root() {
        let root = tempfile::tempdir().unwrap();
        assert_eq!(detect_family(root.path()), DistroFamily::Unknown);

        std::fs::create_dir_all(root.path().join("usr/lib")).unwrap();
        std::fs::write(root.path().join("usr/lib/os-release"), "ID=manjaro\n").unwrap();
        assert_eq!(detect_family(root.path()), DistroFamily::Arch);
    }
}
