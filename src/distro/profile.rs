//! Resolution of abstract resources to concrete paths and unit names.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{StackError, StackResult};
use crate::services::ServiceKind;
use crate::validation::PhpVersion;

use super::family::DistroFamily;

/// How virtual-host definitions are laid out on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VhostLayout {
    /// `sites-available/<host>` plus a symlink in `sites-enabled/`.
    Symlinked,
    /// `conf.d/<host>.conf`, disabled as `conf.d/<host>.conf.disabled`.
    SingleDirectory,
}

/// Abstract resources a component can ask the profile for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    ServiceUnit(ServiceKind),
    PhpFpmUnit(PhpVersion),
    VhostAvailableDir,
    VhostEnabledDir,
    HostsFile,
    DefaultConfig(ServiceKind),
    PhpFpmSocket(PhpVersion),
    XdebugConfig(PhpVersion),
    BinaryDir,
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceKind::ServiceUnit(service) => write!(f, "{} unit", service.name()),
            ResourceKind::PhpFpmUnit(version) => write!(f, "php {} fpm unit", version),
            ResourceKind::VhostAvailableDir => f.write_str("vhost available dir"),
            ResourceKind::VhostEnabledDir => f.write_str("vhost enabled dir"),
            ResourceKind::HostsFile => f.write_str("hosts file"),
            ResourceKind::DefaultConfig(service) => write!(f, "{} config", service.name()),
            ResourceKind::PhpFpmSocket(version) => write!(f, "php {} fpm socket", version),
            ResourceKind::XdebugConfig(version) => write!(f, "php {} xdebug ini", version),
            ResourceKind::BinaryDir => f.write_str("binary dir"),
        }
    }
}

/// A resolved resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolved {
    Unit(String),
    Path(PathBuf),
}

/// The detected (or configured) distribution and everything that follows
/// from it.
///
/// Files the crate reads or writes are placed under `root`. Paths that are
/// only written *into* configs (PHP-FPM sockets) are not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistributionProfile {
    family: DistroFamily,
    layout: VhostLayout,
    root: PathBuf,
    default_php: PhpVersion,
}

impl DistributionProfile {
    pub fn new(family: DistroFamily, root: impl Into<PathBuf>, default_php: PhpVersion) -> Self {
        let layout = match family {
            DistroFamily::Arch | DistroFamily::Fedora => VhostLayout::SingleDirectory,
            DistroFamily::Debian | DistroFamily::Unknown => VhostLayout::Symlinked,
        };
        Self {
            family,
            layout,
            root: root.into(),
            default_php,
        }
    }

    /// Override the family's default vhost layout.
    pub fn with_layout(mut self, layout: VhostLayout) -> Self {
        self.layout = layout;
        self
    }

    pub fn family(&self) -> DistroFamily {
        self.family
    }

    pub fn layout(&self) -> VhostLayout {
        self.layout
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn default_php(&self) -> PhpVersion {
        self.default_php
    }

    /// Place an absolute system path under the profile root.
    pub fn rooted(&self, path: impl AsRef<Path>) -> PathBuf {
        let path = path.as_ref();
        self.root.join(path.strip_prefix("/").unwrap_or(path))
    }

    /// Resolve an abstract resource for this distribution.
    pub fn resolve(&self, kind: ResourceKind) -> StackResult<Resolved> {
        match kind {
            ResourceKind::ServiceUnit(service) => self.unit_name(service).map(Resolved::Unit),
            ResourceKind::PhpFpmUnit(version) => Ok(Resolved::Unit(self.php_fpm_unit(version))),
            ResourceKind::PhpFpmSocket(version) => Ok(Resolved::Path(self.php_fpm_socket(version))),
            ResourceKind::VhostAvailableDir => Ok(Resolved::Path(self.vhost_available_dir())),
            ResourceKind::VhostEnabledDir => self.vhost_enabled_dir().map(Resolved::Path),
            ResourceKind::HostsFile => Ok(Resolved::Path(self.hosts_file())),
            ResourceKind::DefaultConfig(service) => self.default_config(service).map(Resolved::Path),
            ResourceKind::XdebugConfig(version) => Ok(Resolved::Path(self.xdebug_config(version))),
            ResourceKind::BinaryDir => Ok(Resolved::Path(self.rooted("/usr/bin"))),
        }
    }

    /// Debian-style tables serve `Unknown` as best-effort defaults.
    fn is_debian_like(&self) -> bool {
        matches!(self.family, DistroFamily::Debian | DistroFamily::Unknown)
    }

    fn unsupported(&self, resource: impl Into<String>) -> StackError {
        StackError::unsupported(resource, self.family.to_string())
    }

    /// systemd unit name (without `.service`) of a catalog service.
    pub fn unit_name(&self, service: ServiceKind) -> StackResult<String> {
        use DistroFamily::*;
        use ServiceKind::*;

        let unit = match (service, self.family) {
            (Nginx, _) => "nginx",
            (Apache2, Debian | Unknown) => "apache2",
            (Apache2, _) => return Err(self.unsupported("apache2 unit")),
            (Httpd, Debian | Unknown) => return Err(self.unsupported("httpd unit")),
            (Httpd, _) => "httpd",
            (PhpFpm, _) => return Ok(self.php_fpm_unit(self.default_php)),
            (Mariadb, _) => "mariadb",
            (Mysql, Debian | Unknown) => "mysql",
            (Mysql, _) => "mysqld",
            (Postgresql, _) => "postgresql",
            (Redis, Debian | Unknown) => "redis-server",
            (Redis, _) => "redis",
            (Memcached, _) => "memcached",
        };
        Ok(unit.to_string())
    }

    /// PHP-FPM unit for a specific version.
    pub fn php_fpm_unit(&self, version: PhpVersion) -> String {
        if self.is_debian_like() {
            return format!("php{}-fpm", version);
        }
        if version == self.default_php {
            return "php-fpm".to_string();
        }
        match self.family {
            // Remi software collections
            DistroFamily::Fedora => format!("php{}-php-fpm", version.compact()),
            _ => format!("php{}-fpm", version.compact()),
        }
    }

    /// Socket a site bound to `version` passes requests to.
    pub fn php_fpm_socket(&self, version: PhpVersion) -> PathBuf {
        let socket = if self.is_debian_like() {
            format!("/run/php/php{}-fpm.sock", version)
        } else if self.family == DistroFamily::Arch {
            if version == self.default_php {
                "/run/php-fpm/php-fpm.sock".to_string()
            } else {
                format!("/run/php{}-fpm/php-fpm.sock", version.compact())
            }
        } else if version == self.default_php {
            "/run/php-fpm/www.sock".to_string()
        } else {
            format!("/var/opt/remi/php{}/run/php-fpm/www.sock", version.compact())
        };
        PathBuf::from(socket)
    }

    pub fn vhost_available_dir(&self) -> PathBuf {
        match self.layout {
            VhostLayout::Symlinked => self.rooted("/etc/nginx/sites-available"),
            VhostLayout::SingleDirectory => self.rooted("/etc/nginx/conf.d"),
        }
    }

    pub fn vhost_enabled_dir(&self) -> StackResult<PathBuf> {
        match self.layout {
            VhostLayout::Symlinked => Ok(self.rooted("/etc/nginx/sites-enabled")),
            VhostLayout::SingleDirectory => Err(self.unsupported("vhost enabled directory")),
        }
    }

    pub fn hosts_file(&self) -> PathBuf {
        self.rooted("/etc/hosts")
    }

    /// Main configuration file of a service.
    pub fn default_config(&self, service: ServiceKind) -> StackResult<PathBuf> {
        use DistroFamily::*;
        use ServiceKind::*;

        let v = self.default_php;
        let path = match (service, self.family) {
            (Nginx, _) => "/etc/nginx/nginx.conf".to_string(),
            (Apache2, Debian | Unknown) => "/etc/apache2/apache2.conf".to_string(),
            (Httpd, Arch | Fedora) => "/etc/httpd/conf/httpd.conf".to_string(),
            (PhpFpm, Debian | Unknown) => format!("/etc/php/{}/fpm/php-fpm.conf", v),
            (PhpFpm, Arch) => "/etc/php/php-fpm.conf".to_string(),
            (PhpFpm, Fedora) => "/etc/php-fpm.conf".to_string(),
            (Mariadb, Debian | Unknown) => "/etc/mysql/mariadb.conf.d/50-server.cnf".to_string(),
            (Mariadb, Arch) => "/etc/my.cnf.d/server.cnf".to_string(),
            (Mariadb, Fedora) => "/etc/my.cnf.d/mariadb-server.cnf".to_string(),
            (Mysql, Debian | Unknown) => "/etc/mysql/my.cnf".to_string(),
            (Mysql, _) => "/etc/my.cnf".to_string(),
            (Postgresql, Arch) => "/var/lib/postgres/data/postgresql.conf".to_string(),
            (Postgresql, Fedora) => "/var/lib/pgsql/data/postgresql.conf".to_string(),
            (Redis, _) => "/etc/redis/redis.conf".to_string(),
            (Memcached, Debian | Unknown) => "/etc/memcached.conf".to_string(),
            (Memcached, Fedora) => "/etc/sysconfig/memcached".to_string(),
            (kind, _) => {
                return Err(self.unsupported(format!("default config for {}", kind.name())))
            }
        };
        Ok(self.rooted(path))
    }

    /// Xdebug ini file for a PHP version.
    pub fn xdebug_config(&self, version: PhpVersion) -> PathBuf {
        let path = if self.is_debian_like() {
            format!("/etc/php/{}/mods-available/xdebug.ini", version)
        } else if self.family == DistroFamily::Arch {
            if version == self.default_php {
                "/etc/php/conf.d/xdebug.ini".to_string()
            } else {
                format!("/etc/php{}/conf.d/xdebug.ini", version.compact())
            }
        } else if version == self.default_php {
            "/etc/php.d/15-xdebug.ini".to_string()
        } else {
            format!("/etc/opt/remi/php{}/php.d/15-xdebug.ini", version.compact())
        };
        self.rooted(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PHP83: PhpVersion = PhpVersion::new(8, 3);
    const PHP81: PhpVersion = PhpVersion::new(8, 1);

    fn profile(family: DistroFamily) -> DistributionProfile {
        DistributionProfile::new(family, "/", PHP83)
    }

    #[test]
    fn test_unit_names() {
        let debian = profile(DistroFamily::Debian);
        assert_eq!(debian.unit_name(ServiceKind::Redis).unwrap(), "redis-server");
        assert_eq!(debian.unit_name(ServiceKind::PhpFpm).unwrap(), "php8.3-fpm");
        assert_eq!(debian.unit_name(ServiceKind::Apache2).unwrap(), "apache2");
        assert!(debian.unit_name(ServiceKind::Httpd).unwrap_err().is_unsupported());

        let arch = profile(DistroFamily::Arch);
        assert_eq!(arch.unit_name(ServiceKind::PhpFpm).unwrap(), "php-fpm");
        assert_eq!(arch.unit_name(ServiceKind::Mysql).unwrap(), "mysqld");
        assert_eq!(arch.php_fpm_unit(PHP81), "php81-fpm");

        let fedora = profile(DistroFamily::Fedora);
        assert_eq!(fedora.unit_name(ServiceKind::Httpd).unwrap(), "httpd");
        assert!(fedora.unit_name(ServiceKind::Apache2).is_err());
        assert_eq!(fedora.php_fpm_unit(PHP81), "php81-php-fpm");
    }

    #[test]
    fn test_vhost_dirs_follow_layout() {
        let debian = profile(DistroFamily::Debian);
        assert_eq!(debian.layout(), VhostLayout::Symlinked);
        assert_eq!(
            debian.vhost_available_dir(),
            PathBuf::from("/etc/nginx/sites-available")
        );
        assert_eq!(
            debian.vhost_enabled_dir().unwrap(),
            PathBuf::from("/etc/nginx/sites-enabled")
        );

        let arch = profile(DistroFamily::Arch);
        assert_eq!(arch.layout(), VhostLayout::SingleDirectory);
        assert_eq!(arch.vhost_available_dir(), PathBuf::from("/etc/nginx/conf.d"));
        assert!(arch
            .resolve(ResourceKind::VhostEnabledDir)
            .unwrap_err()
            .is_unsupported());

        let forced = profile(DistroFamily::Arch).with_layout(VhostLayout::Symlinked);
        assert!(forced.vhost_enabled_dir().is_ok());
    }

    #[test]
    fn test_php_sockets() {
        assert_eq!(
            profile(DistroFamily::Debian).php_fpm_socket(PHP81),
            PathBuf::from("/run/php/php8.1-fpm.sock")
        );
        assert_eq!(
            profile(DistroFamily::Arch).php_fpm_socket(PHP83),
            PathBuf::from("/run/php-fpm/php-fpm.sock")
        );
        assert_eq!(
            profile(DistroFamily::Arch).php_fpm_socket(PHP81),
            PathBuf::from("/run/php81-fpm/php-fpm.sock")
        );
        assert_eq!(
            profile(DistroFamily::Fedora).php_fpm_socket(PHP81),
            PathBuf::from("/var/opt/remi/php81/run/php-fpm/www.sock")
        );
    }

    #[test]
    fn test_rooted_paths() {
        let profile = DistributionProfile::new(DistroFamily::Debian, "/tmp/fixture", PHP83);
        assert_eq!(profile.hosts_file(), PathBuf::from("/tmp/fixture/etc/hosts"));
        assert_eq!(
            profile.resolve(ResourceKind::DefaultConfig(ServiceKind::Nginx)).unwrap(),
            Resolved::Path(PathBuf::from("/tmp/fixture/etc/nginx/nginx.conf"))
        );
        // Sockets are config values, not files we touch
        assert_eq!(
            profile.php_fpm_socket(PHP83),
            PathBuf::from("/run/php/php8.3-fpm.sock")
        );
    }

    #[test]
    fn test_unsupported_default_config() {
        let debian = profile(DistroFamily::Debian);
        assert!(debian
            .default_config(ServiceKind::Postgresql)
            .unwrap_err()
            .is_unsupported());
        assert!(profile(DistroFamily::Arch)
            .default_config(ServiceKind::Memcached)
            .is_err());
    }

    #[test]
    fn test_resolution_is_deterministic() {
        let a = profile(DistroFamily::Fedora);
        let b = profile(DistroFamily::Fedora);
        for kind in ServiceKind::ALL {
            assert_eq!(
                a.resolve(ResourceKind::ServiceUnit(kind)).ok(),
                b.resolve(ResourceKind::ServiceUnit(kind)).ok()
            );
        }
    }
}
