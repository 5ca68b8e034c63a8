//! Error types for the stack manager.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the stack manager.
#[derive(Error, Debug)]
pub enum StackError {
    /// Configuration-related errors.
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Validation errors.
    #[error("Validation error: {kind}")]
    Validation { kind: ValidationErrorKind },

    /// Errors from the privileged execution boundary.
    #[error("Privileged action '{action}' failed: {kind}")]
    Privilege {
        action: String,
        kind: PrivilegeErrorKind,
    },

    /// Site store identity violations.
    #[error("Site error: {kind}")]
    Site { kind: SiteErrorKind },

    /// The resource has no equivalent on the detected distribution.
    #[error("{resource} is not available on {distribution}")]
    UnsupportedOnDistribution {
        resource: String,
        distribution: String,
    },

    /// The service exists in the catalog but was not found on this host.
    #[error("Service '{service}' is not installed on this host")]
    NotDiscovered { service: String },

    /// A multi-step sequence stopped partway.
    #[error(
        "Operation on '{hostname}' stopped at step '{step}' (completed: {}): {source}",
        format_steps(.completed)
    )]
    PartialFailure {
        hostname: String,
        step: SiteStep,
        completed: Vec<SiteStep>,
        #[source]
        source: Box<StackError>,
    },

    /// Template-related errors.
    #[error("Template error: {message}")]
    Template { message: String },

    /// I/O errors.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Classification of a failed privileged action.
#[derive(Error, Debug)]
pub enum PrivilegeErrorKind {
    #[error("authorization was refused or cancelled")]
    Denied,

    #[error("no exit after {timeout_secs} seconds")]
    Timeout { timeout_secs: u64 },

    #[error("could not be started: {message}")]
    ExecutionFailed { message: String },

    #[error("exited with code {exit_code}: {output}")]
    NonZeroExit { exit_code: i32, output: String },
}

/// Validation error kinds.
#[derive(Error, Debug)]
pub enum ValidationErrorKind {
    #[error("Invalid hostname '{hostname}': {message}")]
    InvalidHostname { hostname: String, message: String },

    #[error("Invalid PHP version '{version}': expected major.minor")]
    InvalidPhpVersion { version: String },

    #[error("Invalid document root {path}: {message}")]
    InvalidDocumentRoot { path: PathBuf, message: String },

    #[error("Unknown service: {service}")]
    UnknownService { service: String },

    #[error("Invalid parameter value for '{param}': {message}")]
    InvalidParameter { param: String, message: String },
}

/// Site store identity violations.
#[derive(Error, Debug)]
pub enum SiteErrorKind {
    #[error("Site '{hostname}' already exists")]
    AlreadyExists { hostname: String },

    #[error("Site '{hostname}' not found")]
    NotFound { hostname: String },
}

/// One step of a multi-step site sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SiteStep {
    CreateDocumentRoot,
    WriteDefinition,
    Disable,
    UnregisterHost,
    RemoveDefinition,
}

impl std::fmt::Display for SiteStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SiteStep::CreateDocumentRoot => "create-document-root",
            SiteStep::WriteDefinition => "write-definition",
            SiteStep::Disable => "disable",
            SiteStep::UnregisterHost => "unregister-host",
            SiteStep::RemoveDefinition => "remove-definition",
        };
        f.write_str(name)
    }
}

fn format_steps(steps: &[SiteStep]) -> String {
    if steps.is_empty() {
        return "none".to_string();
    }
    steps
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

impl StackError {
    /// Shorthand for a privilege error on a named action.
    pub fn privilege(action: impl Into<String>, kind: PrivilegeErrorKind) -> Self {
        StackError::Privilege {
            action: action.into(),
            kind,
        }
    }

    /// Shorthand for an unsupported resource.
    pub fn unsupported(resource: impl Into<String>, distribution: impl Into<String>) -> Self {
        StackError::UnsupportedOnDistribution {
            resource: resource.into(),
            distribution: distribution.into(),
        }
    }

    /// Whether the user refused or cancelled the escalation prompt.
    ///
    /// Looks through `PartialFailure` to the failing step.
    pub fn is_denied(&self) -> bool {
        match self {
            StackError::Privilege {
                kind: PrivilegeErrorKind::Denied,
                ..
            } => true,
            StackError::PartialFailure { source, .. } => source.is_denied(),
            _ => false,
        }
    }

    /// Whether the error only means a capability is missing on this host.
    pub fn is_unsupported(&self) -> bool {
        matches!(self, StackError::UnsupportedOnDistribution { .. })
    }

    /// Short machine-readable code used in audit entries and JSON output.
    pub fn code(&self) -> &'static str {
        match self {
            StackError::Config { .. } => "CONFIG",
            StackError::Validation { .. } => "VALIDATION",
            StackError::Privilege { kind, .. } => match kind {
                PrivilegeErrorKind::Denied => "DENIED",
                PrivilegeErrorKind::Timeout { .. } => "TIMEOUT",
                PrivilegeErrorKind::ExecutionFailed { .. } => "EXECUTION_FAILED",
                PrivilegeErrorKind::NonZeroExit { .. } => "NON_ZERO_EXIT",
            },
            StackError::Site { kind } => match kind {
                SiteErrorKind::AlreadyExists { .. } => "ALREADY_EXISTS",
                SiteErrorKind::NotFound { .. } => "NOT_FOUND",
            },
            StackError::UnsupportedOnDistribution { .. } => "UNSUPPORTED",
            StackError::NotDiscovered { .. } => "NOT_DISCOVERED",
            StackError::PartialFailure { .. } => "PARTIAL_FAILURE",
            StackError::Template { .. } => "TEMPLATE",
            StackError::Io(_) => "IO",
            StackError::Serialization(_) => "SERIALIZATION",
        }
    }
}

/// Result type alias for stack operations.
pub type StackResult<T> = Result<T, StackError>;
