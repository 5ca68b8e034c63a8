//! Distribution adapter.
//!
//! Detects the distribution family once and maps abstract resources (service
//! units, vhost directories, sockets) to their concrete names.

mod family;
mod profile;

pub use family::{classify_os_release, detect_family, DistroFamily};
pub use profile::{DistributionProfile, Resolved, ResourceKind, VhostLayout};

use tracing::info;

use crate::config::DistroConfig;
use crate::validation::PhpVersion;

/// Build the profile for this process, honouring configured overrides.
pub fn detect(config: &DistroConfig, default_php: PhpVersion) -> DistributionProfile {
    let family = config
        .family
        .unwrap_or_else(|| detect_family(&config.root));

    let mut profile = DistributionProfile::new(family, config.root.clone(), default_php);
    if let Some(layout) = config.layout {
        profile = profile.with_layout(layout);
    }

    info!(
        family = %profile.family(),
        layout = ?profile.layout(),
        root = %profile.root().display(),
        "Distribution profile ready"
    );

    profile
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_honours_overrides() {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(root.path().join("etc")).unwrap();
        std::fs::write(root.path().join("etc/os-release"), "ID=fedora\n").unwrap();

        let mut config = DistroConfig {
            family: None,
            layout: None,
            root: root.path().to_path_buf(),
        };
        let profile = detect(&config, PhpVersion::new(8, 3));
        assert_eq!(profile.family(), DistroFamily::Fedora);
        assert_eq!(profile.layout(), VhostLayout::SingleDirectory);

        config.family = Some(DistroFamily::Debian);
        config.layout = Some(VhostLayout::SingleDirectory);
        let profile = detect(&config, PhpVersion::new(8, 3));
        assert_eq!(profile.family(), DistroFamily::Debian);
        assert_eq!(profile.layout(), VhostLayout::SingleDirectory);
    }
}
