//! Xdebug on/off for a PHP version.
//!
//! The extension is considered enabled when its ini file exists under the
//! expected name and carries an uncommented `zend_extension` line for
//! xdebug. A `.disabled` sibling, a commented line, or no such line at all
//! all count as disabled.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use crate::distro::DistributionProfile;
use crate::error::StackResult;
use crate::executor::{PrivilegedAction, PrivilegedExecutor};
use crate::services::{ServiceAction, ServiceKind, ServiceRegistry};
use crate::validation::PhpVersion;

const DISABLED_SUFFIX: &str = ".disabled";

/// Observed xdebug configuration for one PHP version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct XdebugState {
    pub php_version: PhpVersion,
    pub config_path: PathBuf,
    pub enabled: bool,
}

/// What happened to PHP-FPM after a toggle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "fpm_restart", rename_all = "kebab-case")]
pub enum FpmRestart {
    Restarted,
    NotNeeded,
    Failed { error: String },
}

/// Result of [`Xdebug::set_enabled`].
#[derive(Debug, Clone, Serialize)]
pub struct XdebugUpdate {
    #[serde(flatten)]
    pub state: XdebugState,
    #[serde(flatten)]
    pub restart: FpmRestart,
}

fn is_xdebug_directive(line: &str) -> bool {
    let directive = line.trim_start().trim_start_matches(';').trim_start();
    directive.starts_with("zend_extension") && directive.to_ascii_lowercase().contains("xdebug")
}

/// Whether `content` loads xdebug.
pub fn loads_xdebug(content: &str) -> bool {
    content
        .lines()
        .any(|line| is_xdebug_directive(line) && !line.trim_start().starts_with(';'))
}

/// Comment out or restore the xdebug `zend_extension` line.
///
/// Enabling a file without such a line appends one.
pub fn with_xdebug_enabled(content: &str, enabled: bool) -> String {
    let mut found = false;
    let mut out = String::with_capacity(content.len() + 32);

    for line in content.lines() {
        if is_xdebug_directive(line) {
            found = true;
            let bare = line.trim_start().trim_start_matches(';').trim_start();
            if enabled {
                out.push_str(bare);
            } else {
                out.push(';');
                out.push_str(bare);
            }
        } else {
            out.push_str(line);
        }
        out.push('\n');
    }

    if enabled && !found {
        out.push_str("zend_extension=xdebug.so\n");
    }
    out
}

fn disabled_sibling(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(DISABLED_SUFFIX);
    PathBuf::from(name)
}

/// Toggles xdebug through the privileged executor and restarts PHP-FPM.
pub struct Xdebug {
    profile: Arc<DistributionProfile>,
    executor: Arc<dyn PrivilegedExecutor>,
    registry: Arc<ServiceRegistry>,
}

impl Xdebug {
    pub fn new(
        profile: Arc<DistributionProfile>,
        executor: Arc<dyn PrivilegedExecutor>,
        registry: Arc<ServiceRegistry>,
    ) -> Self {
        Self {
            profile,
            executor,
            registry,
        }
    }

    /// Current state for `version`, or `None` when xdebug is not installed
    /// for it.
    pub fn status(&self, version: PhpVersion) -> StackResult<Option<XdebugState>> {
        let active = self.profile.xdebug_config(version);
        let state = |enabled| XdebugState {
            php_version: version,
            config_path: active.clone(),
            enabled,
        };

        if active.is_file() {
            let content = std::fs::read_to_string(&active)?;
            return Ok(Some(state(loads_xdebug(&content))));
        }
        if disabled_sibling(&active).is_file() {
            return Ok(Some(state(false)));
        }
        Ok(None)
    }

    /// Enable or disable xdebug for `version`.
    ///
    /// Returns `None` when xdebug is not installed for that version. The
    /// PHP-FPM restart outcome is reported, not propagated: the ini change
    /// stays in place either way.
    pub fn set_enabled(&self, version: PhpVersion, enabled: bool) -> StackResult<Option<XdebugUpdate>> {
        let Some(current) = self.status(version)? else {
            warn!(php = %version, "Xdebug is not installed");
            return Ok(None);
        };

        if current.enabled == enabled {
            return Ok(Some(XdebugUpdate {
                state: current,
                restart: FpmRestart::NotNeeded,
            }));
        }

        let active = current.config_path.clone();
        let renamed = disabled_sibling(&active);

        if enabled && !active.exists() {
            self.executor.run(&PrivilegedAction::rename(&renamed, &active))?;
            let content = std::fs::read_to_string(&active)?;
            if !loads_xdebug(&content) {
                self.executor
                    .run(&PrivilegedAction::write_file(&active, &with_xdebug_enabled(&content, true)))?;
            }
        } else {
            let content = std::fs::read_to_string(&active)?;
            self.executor
                .run(&PrivilegedAction::write_file(&active, &with_xdebug_enabled(&content, enabled)))?;
        }
        info!(php = %version, enabled, config = %active.display(), "Xdebug toggled");

        let state = self.status(version)?.unwrap_or(XdebugState {
            php_version: version,
            config_path: active,
            enabled,
        });
        Ok(Some(XdebugUpdate {
            state,
            restart: self.restart_fpm(version),
        }))
    }

    fn restart_fpm(&self, version: PhpVersion) -> FpmRestart {
        let result = if version == self.profile.default_php() && self.registry.get(ServiceKind::PhpFpm).is_ok() {
            self.registry
                .apply(ServiceKind::PhpFpm, ServiceAction::Restart)
                .map(|_| ())
        } else {
            self.registry.restart_unit(&self.profile.php_fpm_unit(version))
        };

        match result {
            Ok(()) => FpmRestart::Restarted,
            Err(e) => {
                warn!(php = %version, error = %e, "PHP-FPM restart failed");
                FpmRestart::Failed { error: e.to_string() }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distro::DistroFamily;
    use crate::error::{PrivilegeErrorKind, StackError};
    use crate::executor::{ActionOutput, Program, SystemExecutor};
    use crate::services::{BootState, ServiceStatus, UnitProbe};
    use std::fs;
    use std::sync::Mutex;
    use std::time::Duration;

    struct FpmProbe;

    impl UnitProbe for FpmProbe {
        fn is_installed(&self, unit: &str) -> StackResult<bool> {
            Ok(unit == "php8.3-fpm")
        }

        fn active_state(&self, _unit: &str) -> StackResult<ServiceStatus> {
            Ok(ServiceStatus::Running)
        }

        fn boot_state(&self, _unit: &str) -> StackResult<BootState> {
            Ok(BootState::Enabled)
        }
    }

    /// Runs file actions for real and records systemctl calls.
    struct Recorder {
        files: SystemExecutor,
        systemctl: Mutex<Vec<String>>,
        deny_systemctl: bool,
    }

    impl PrivilegedExecutor for Recorder {
        fn run(&self, action: &PrivilegedAction) -> StackResult<ActionOutput> {
            if action.program == Program::Systemctl {
                self.systemctl.lock().unwrap().push(action.args.join(" "));
                if self.deny_systemctl {
                    return Err(StackError::privilege(action.describe(), PrivilegeErrorKind::Denied));
                }
                return Ok(ActionOutput::default());
            }
            self.files.run(action)
        }
    }

    struct Fixture {
        _root: tempfile::TempDir,
        profile: Arc<DistributionProfile>,
        recorder: Arc<Recorder>,
        xdebug: Xdebug,
    }

    fn fixture(deny_systemctl: bool) -> Fixture {
        let root = tempfile::tempdir().unwrap();
        let profile = Arc::new(DistributionProfile::new(
            DistroFamily::Debian,
            root.path(),
            PhpVersion::new(8, 3),
        ));
        let recorder = Arc::new(Recorder {
            files: SystemExecutor::direct(Duration::from_secs(5)),
            systemctl: Mutex::new(Vec::new()),
            deny_systemctl,
        });
        let registry = Arc::new(ServiceRegistry::new(
            profile.clone(),
            Arc::new(FpmProbe),
            recorder.clone(),
        ));
        registry.discover();
        let xdebug = Xdebug::new(profile.clone(), recorder.clone(), registry);
        Fixture {
            _root: root,
            profile,
            recorder,
            xdebug,
        }
    }

    fn write_ini(path: &Path, content: &str) -> PathBuf {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
        path.to_path_buf()
    }

    #[test]
    fn test_directive_rewrite() {
        let ini = "; xdebug\nzend_extension=xdebug.so\nxdebug.mode=debug\n";
        assert!(loads_xdebug(ini));

        let off = with_xdebug_enabled(ini, false);
        assert_eq!(off, "; xdebug\n;zend_extension=xdebug.so\nxdebug.mode=debug\n");
        assert!(!loads_xdebug(&off));

        let on = with_xdebug_enabled(&off, true);
        assert_eq!(on, ini);
        assert_eq!(with_xdebug_enabled("xdebug.mode=debug\n", true), "xdebug.mode=debug\nzend_extension=xdebug.so\n");
    }

    #[test]
    fn test_no_directive_counts_as_disabled() {
        assert!(!loads_xdebug("xdebug.mode=debug\n"));
        assert!(!loads_xdebug("zend_extension=opcache.so\n"));
    }

    #[test]
    fn test_status_not_installed() {
        let f = fixture(false);
        assert_eq!(f.xdebug.status(PhpVersion::new(8, 3)).unwrap(), None);
        assert!(f.xdebug.set_enabled(PhpVersion::new(8, 3), true).unwrap().is_none());
        assert!(f.recorder.systemctl.lock().unwrap().is_empty());
    }

    #[test]
    fn test_disable_comments_line_and_restarts_default_fpm() {
        let f = fixture(false);
        let v = PhpVersion::new(8, 3);
        let path = write_ini(&f.profile.xdebug_config(v), "zend_extension=xdebug.so\n");

        let update = f.xdebug.set_enabled(v, false).unwrap().unwrap();
        assert!(!update.state.enabled);
        assert_eq!(update.restart, FpmRestart::Restarted);
        assert_eq!(fs::read_to_string(&path).unwrap(), ";zend_extension=xdebug.so\n");
        assert_eq!(*f.recorder.systemctl.lock().unwrap(), vec!["restart php8.3-fpm.service"]);
    }

    #[test]
    fn test_enable_renames_disabled_file() {
        let f = fixture(false);
        let v = PhpVersion::new(8, 3);
        let renamed = write_ini(&disabled_sibling(&f.profile.xdebug_config(v)), "zend_extension=xdebug.so\n");

        assert_eq!(f.xdebug.status(v).unwrap().map(|s| s.enabled), Some(false));
        let update = f.xdebug.set_enabled(v, true).unwrap().unwrap();
        assert!(update.state.enabled);
        assert!(!renamed.exists());
        assert!(f.profile.xdebug_config(v).is_file());
    }

    #[test]
    fn test_already_in_state_does_nothing() {
        let f = fixture(false);
        let v = PhpVersion::new(8, 3);
        write_ini(&f.profile.xdebug_config(v), "zend_extension=xdebug.so\n");

        let update = f.xdebug.set_enabled(v, true).unwrap().unwrap();
        assert_eq!(update.restart, FpmRestart::NotNeeded);
        assert!(f.recorder.systemctl.lock().unwrap().is_empty());
    }

    #[test]
    fn test_restart_failure_keeps_ini_change() {
        let f = fixture(true);
        let v = PhpVersion::new(8, 1);
        let path = write_ini(&f.profile.xdebug_config(v), ";zend_extension=xdebug.so\n");

        let update = f.xdebug.set_enabled(v, true).unwrap().unwrap();
        assert!(update.state.enabled);
        assert!(matches!(update.restart, FpmRestart::Failed { .. }));
        assert_eq!(fs::read_to_string(&path).unwrap(), "zend_extension=xdebug.so\n");
        assert_eq!(*f.recorder.systemctl.lock().unwrap(), vec!["restart php8.1-fpm.service"]);
    }
}
