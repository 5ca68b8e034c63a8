//! Hostname validation.
//!
//! Validates virtual-host hostnames before they reach a file name, a
//! config file or the hosts file.

use crate::error::{StackError, ValidationErrorKind};

/// Maximum length for a hostname.
const MAX_HOSTNAME_LENGTH: usize = 253;

/// Maximum length for a label (part between dots).
const MAX_LABEL_LENGTH: usize = 63;

fn invalid(hostname: &str, message: impl Into<String>) -> StackError {
    StackError::Validation {
        kind: ValidationErrorKind::InvalidHostname {
            hostname: hostname.to_string(),
            message: message.into(),
        },
    }
}

/// Validates a virtual-host hostname.
///
/// # Rules
///
/// - Must be 1-253 characters
/// - Each label (part between dots) must be 1-63 characters
/// - Labels must start and end with a lowercase letter or digit
/// - Labels can contain hyphens but not at start or end
/// - No wildcards, no trailing dot, no uppercase
/// - Must have at least one dot (`blog.test`, not `blog`)
///
/// # Returns
///
/// The validated hostname or an error.
pub fn validate_hostname(hostname: &str) -> Result<&str, StackError> {
    if hostname.is_empty() {
        return Err(invalid(hostname, "Hostname cannot be empty"));
    }

    if hostname.len() > MAX_HOSTNAME_LENGTH {
        return Err(invalid(
            hostname,
            format!(
                "Hostname exceeds maximum length of {} characters",
                MAX_HOSTNAME_LENGTH
            ),
        ));
    }

    if hostname.contains('*') {
        return Err(invalid(hostname, "Wildcard hostnames are not allowed"));
    }

    if hostname.ends_with('.') {
        return Err(invalid(hostname, "Hostname cannot end with a dot"));
    }

    let labels: Vec<&str> = hostname.split('.').collect();

    if labels.len() < 2 {
        return Err(invalid(
            hostname,
            "Hostname must have at least two labels (e.g., blog.test)",
        ));
    }

    for label in &labels {
        validate_label(hostname, label)?;
    }

    Ok(hostname)
}

/// Validates a single label.
fn validate_label(hostname: &str, label: &str) -> Result<(), StackError> {
    if label.is_empty() {
        return Err(invalid(hostname, "Hostname contains an empty label"));
    }

    if label.len() > MAX_LABEL_LENGTH {
        return Err(invalid(
            hostname,
            format!(
                "Label '{}' exceeds maximum length of {} characters",
                label, MAX_LABEL_LENGTH
            ),
        ));
    }

    let is_edge_char = |c: char| c.is_ascii_lowercase() || c.is_ascii_digit();

    // Labels are non-empty here
    let first = label.chars().next().unwrap_or('-');
    let last = label.chars().last().unwrap_or('-');
    if !is_edge_char(first) || !is_edge_char(last) {
        return Err(invalid(
            hostname,
            format!(
                "Label '{}' must start and end with a lowercase letter or digit",
                label
            ),
        ));
    }

    if let Some(c) = label.chars().find(|&c| !is_edge_char(c) && c != '-') {
        return Err(invalid(
            hostname,
            format!("Label '{}' contains invalid character '{}'", label, c),
        ));
    }

    Ok(())
}
