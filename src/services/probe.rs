//! Read-only unit queries.

use std::time::Duration;

use serde::Serialize;
use tracing::debug;

use crate::error::StackResult;
use crate::executor::{host_command_prefix, summarize_output, SubprocessBuilder, SubprocessResult};
use crate::php::version_from_cli_output;

use super::kind::ServiceKind;

/// Lines of `nginx -t` output kept in a failed check.
const CHECK_OUTPUT_LINES: usize = 5;

/// Runtime state of a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    Running,
    Stopped,
    Failed,
    Unknown,
}

impl ServiceStatus {
    /// Map `systemctl is-active` output.
    pub fn from_is_active(output: &str) -> Self {
        match output.trim() {
            "active" | "reloading" | "activating" => ServiceStatus::Running,
            "inactive" | "deactivating" => ServiceStatus::Stopped,
            "failed" => ServiceStatus::Failed,
            _ => ServiceStatus::Unknown,
        }
    }
}

/// Whether a unit starts at boot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BootState {
    Enabled,
    Disabled,
    Unknown,
}

impl BootState {
    /// Map `systemctl is-enabled` output.
    pub fn from_is_enabled(output: &str) -> Self {
        match output.trim() {
            "enabled" | "enabled-runtime" | "alias" => BootState::Enabled,
            "disabled" | "masked" | "masked-runtime" => BootState::Disabled,
            _ => BootState::Unknown,
        }
    }
}

/// Observed fields of a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ObservedState {
    pub status: ServiceStatus,
    pub enabled_at_boot: BootState,
}

impl ObservedState {
    pub const UNKNOWN: ObservedState = ObservedState {
        status: ServiceStatus::Unknown,
        enabled_at_boot: BootState::Unknown,
    };
}

/// Unprivileged queries against the init system.
pub trait UnitProbe: Send + Sync {
    /// Whether a unit file for `unit` exists on the host.
    fn is_installed(&self, unit: &str) -> StackResult<bool>;

    fn active_state(&self, unit: &str) -> StackResult<ServiceStatus>;

    fn boot_state(&self, unit: &str) -> StackResult<BootState>;

    /// Test the configuration of `kind` without applying it.
    ///
    /// Returns the checker's output when the configuration is rejected, and
    /// `None` when it passes or `kind` has no checker.
    fn check_config(&self, _kind: ServiceKind) -> StackResult<Option<String>> {
        Ok(None)
    }

    /// Version of the software behind `kind`, when it reports one.
    fn version(&self, _kind: ServiceKind) -> Option<String> {
        None
    }
}

/// Interpret `nginx -t` run as an unprivileged user.
///
/// Without root nginx cannot open its pid and log files and fails with
/// "Permission denied" whatever the configuration says, so that failure
/// counts as inconclusive.
fn rejected_config(result: &SubprocessResult) -> Option<String> {
    if result.success {
        return None;
    }
    let output = result.combined_output();
    if output.contains("Permission denied") {
        debug!("Configuration test inconclusive without privileges");
        return None;
    }
    Some(summarize_output(&output, CHECK_OUTPUT_LINES))
}

/// Probe backed by `systemctl` subprocesses.
pub struct SystemctlProbe {
    prefix: Vec<String>,
    timeout: Duration,
}

impl SystemctlProbe {
    pub fn new(timeout: Duration) -> Self {
        Self {
            prefix: host_command_prefix(),
            timeout,
        }
    }

    fn host_command(&self, command: &[&str]) -> StackResult<SubprocessResult> {
        let mut argv: Vec<String> = self.prefix.clone();
        argv.extend(command.iter().map(|arg| arg.to_string()));
        let program = argv.remove(0);

        SubprocessBuilder::new(&program)
            .args(&argv)
            .env("LC_ALL", "C")
            .timeout(self.timeout)
            .run()
    }

    fn systemctl(&self, verb: &str, unit: &str) -> StackResult<SubprocessResult> {
        let unit = format!("{}.service", unit);
        self.host_command(&["systemctl", verb, &unit])
    }
}

impl UnitProbe for SystemctlProbe {
    fn is_installed(&self, unit: &str) -> StackResult<bool> {
        Ok(self.systemctl("cat", unit)?.success)
    }

    fn active_state(&self, unit: &str) -> StackResult<ServiceStatus> {
        // Non-zero exit for inactive units; stdout still carries the state
        let output = self.systemctl("is-active", unit)?;
        Ok(ServiceStatus::from_is_active(&output.stdout))
    }

    fn boot_state(&self, unit: &str) -> StackResult<BootState> {
        let output = self.systemctl("is-enabled", unit)?;
        Ok(BootState::from_is_enabled(&output.stdout))
    }

    fn check_config(&self, kind: ServiceKind) -> StackResult<Option<String>> {
        match kind {
            ServiceKind::Nginx => Ok(rejected_config(&self.host_command(&["nginx", "-t"])?)),
            _ => Ok(None),
        }
    }

    fn version(&self, kind: ServiceKind) -> Option<String> {
        if kind != ServiceKind::PhpFpm {
            return None;
        }
        let output = self.host_command(&["php", "-v"]).ok()?;
        if !output.success {
            return None;
        }
        version_from_cli_output(&output.stdout).map(|version| version.to_string())
    }
}
