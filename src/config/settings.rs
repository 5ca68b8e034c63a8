//! Configuration settings for the stack manager.

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::distro::{DistroFamily, VhostLayout};
use crate::error::StackError;
use crate::validation::parse_php_version;

/// Main configuration structure.
///
/// Every section is optional; a missing file yields the built-in defaults.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub executor: ExecutorConfig,
    #[serde(default)]
    pub distro: DistroConfig,
    #[serde(default)]
    pub sites: SitesConfig,
    #[serde(default)]
    pub reconcile: ReconcileConfig,
    #[serde(default)]
    pub audit: AuditConfig,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log format ("pretty" or "json").
    #[serde(default = "default_log_format")]
    pub format: String,
}

/// Privileged executor configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ExecutorConfig {
    /// Program used to escalate privilege (e.g. "pkexec", "sudo").
    #[serde(default = "default_escalation_program")]
    pub escalation_program: String,
    /// Exit codes of the escalation program that mean the prompt was
    /// dismissed or authorization was refused.
    #[serde(default = "default_denied_exit_codes")]
    pub denied_exit_codes: Vec<i32>,
    /// How long a caller waits for a privileged action, in seconds.
    #[serde(default = "default_action_timeout")]
    pub timeout_seconds: u64,
    /// Timeout for read-only status probes, in seconds.
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_seconds: u64,
}

/// Distribution detection overrides.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct DistroConfig {
    /// Skip detection and use this family.
    #[serde(default)]
    pub family: Option<DistroFamily>,
    /// Force a virtual-host layout instead of the family default.
    #[serde(default)]
    pub layout: Option<VhostLayout>,
    /// Filesystem root that every resolved path is placed under.
    #[serde(default = "default_root")]
    pub root: PathBuf,
}

/// Virtual host configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SitesConfig {
    /// Address written to the hosts file for registered sites.
    #[serde(default = "default_hosts_ip")]
    pub hosts_ip: String,
    /// PHP version used when a site has no explicit binding.
    #[serde(default = "default_php_version")]
    pub default_php_version: String,
    /// Directory of `*.tera` files that replace the built-in templates.
    #[serde(default)]
    pub template_dir: Option<PathBuf>,
}

/// State reconciler configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ReconcileConfig {
    /// Interval between service status refreshes in `watch`, in seconds.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_seconds: u64,
}

/// Audit logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AuditConfig {
    /// Whether audit logging is enabled.
    #[serde(default = "default_audit_enabled")]
    pub enabled: bool,
    /// Path to the audit log file.
    #[serde(default = "default_audit_log_path")]
    pub log_path: PathBuf,
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_escalation_program() -> String {
    "pkexec".to_string()
}

fn default_denied_exit_codes() -> Vec<i32> {
    // pkexec: 126 = dialog dismissed, 127 = not authorized
    vec![126, 127]
}

fn default_action_timeout() -> u64 {
    120
}

fn default_probe_timeout() -> u64 {
    10
}

fn default_root() -> PathBuf {
    PathBuf::from("/")
}

fn default_hosts_ip() -> String {
    "127.0.0.1".to_string()
}

fn default_php_version() -> String {
    "8.3".to_string()
}

fn default_poll_interval() -> u64 {
    5
}

fn default_audit_enabled() -> bool {
    true
}

fn default_audit_log_path() -> PathBuf {
    dirs::state_dir()
        .or_else(dirs::data_local_dir)
        .unwrap_or_else(std::env::temp_dir)
        .join("lumo")
        .join("stack-audit.log")
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            escalation_program: default_escalation_program(),
            denied_exit_codes: default_denied_exit_codes(),
            timeout_seconds: default_action_timeout(),
            probe_timeout_seconds: default_probe_timeout(),
        }
    }
}

impl Default for SitesConfig {
    fn default() -> Self {
        Self {
            hosts_ip: default_hosts_ip(),
            default_php_version: default_php_version(),
            template_dir: None,
        }
    }
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            poll_interval_seconds: default_poll_interval(),
        }
    }
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: default_audit_enabled(),
            log_path: default_audit_log_path(),
        }
    }
}

impl Settings {
    /// Default location of the configuration file.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("/etc"))
            .join("lumo")
            .join("stack.toml")
    }

    /// Load settings from a TOML configuration file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, StackError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| StackError::Config {
            message: format!("Failed to read config file '{}': {}", path.display(), e),
        })?;

        Self::from_toml(&content).map_err(|e| match e {
            StackError::Config { message } => StackError::Config {
                message: format!("{} ({})", message, path.display()),
            },
            other => other,
        })
    }

    /// Load settings, falling back to defaults when the file does not exist.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self, StackError> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Parse and validate settings from TOML text.
    pub fn from_toml(content: &str) -> Result<Self, StackError> {
        let settings: Settings = toml::from_str(content).map_err(|e| StackError::Config {
            message: format!("Failed to parse config: {}", e),
        })?;

        settings.validate()?;

        Ok(settings)
    }

    /// Validate the settings.
    fn validate(&self) -> Result<(), StackError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(StackError::Config {
                message: format!(
                    "Invalid log level '{}'. Valid levels: {:?}",
                    self.logging.level, valid_levels
                ),
            });
        }

        let valid_formats = ["pretty", "json"];
        if !valid_formats.contains(&self.logging.format.to_lowercase().as_str()) {
            return Err(StackError::Config {
                message: format!(
                    "Invalid log format '{}'. Valid formats: {:?}",
                    self.logging.format, valid_formats
                ),
            });
        }

        if self.executor.timeout_seconds == 0 || self.executor.probe_timeout_seconds == 0 {
            return Err(StackError::Config {
                message: "Executor timeouts must be greater than zero".to_string(),
            });
        }

        if self.reconcile.poll_interval_seconds == 0 {
            return Err(StackError::Config {
                message: "Poll interval must be greater than zero".to_string(),
            });
        }

        if self.executor.escalation_program.contains('/')
            && !Path::new(&self.executor.escalation_program).is_absolute()
        {
            return Err(StackError::Config {
                message: format!(
                    "Escalation program '{}' must be a bare name or an absolute path",
                    self.executor.escalation_program
                ),
            });
        }

        if self.sites.hosts_ip.parse::<std::net::IpAddr>().is_err() {
            return Err(StackError::Config {
                message: format!("Invalid hosts IP '{}'", self.sites.hosts_ip),
            });
        }

        parse_php_version(&self.sites.default_php_version).map_err(|e| StackError::Config {
            message: e.to_string(),
        })?;

        Ok(())
    }
}
