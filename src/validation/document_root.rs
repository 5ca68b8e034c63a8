//! Document root validation.
//!
//! The document root is substituted verbatim into the `root` directive of a
//! site config, so anything nginx would treat as syntax is rejected.

use std::path::PathBuf;

use crate::error::{StackError, ValidationErrorKind};

/// Allowed prefixes for document root paths.
const ALLOWED_DOCROOT_PREFIXES: &[&str] = &["/var/www/", "/home/", "/srv/"];

/// Characters that would break out of an nginx directive.
const FORBIDDEN_CHARS: &[char] = &[';', '{', '}', '"', '\'', '$', '#', '\\'];

fn invalid(path: &str, message: impl Into<String>) -> StackError {
    StackError::Validation {
        kind: ValidationErrorKind::InvalidDocumentRoot {
            path: PathBuf::from(path),
            message: message.into(),
        },
    }
}

/// Validates a document root path for a site configuration.
///
/// # Rules
///
/// - Must be an absolute path
/// - Must start with an allowed prefix (/var/www/, /home/, /srv/)
/// - Cannot contain path traversal sequences (..)
/// - Cannot contain whitespace, control characters or nginx metacharacters
pub fn validate_document_root(path: &str) -> Result<&str, StackError> {
    if path.is_empty() {
        return Err(invalid(path, "Path cannot be empty"));
    }

    if !path.starts_with('/') {
        return Err(invalid(path, "Path must be absolute (start with /)"));
    }

    if path.split('/').any(|segment| segment == "..") || path.contains("/../") {
        return Err(invalid(path, "Path cannot contain traversal sequences (..)"));
    }

    if path.chars().any(|c| c.is_control() || c.is_whitespace()) {
        return Err(invalid(
            path,
            "Path cannot contain whitespace or control characters",
        ));
    }

    if let Some(c) = path.chars().find(|c| FORBIDDEN_CHARS.contains(c)) {
        return Err(invalid(path, format!("Path cannot contain '{}'", c)));
    }

    let has_valid_prefix = ALLOWED_DOCROOT_PREFIXES
        .iter()
        .any(|prefix| path.starts_with(prefix));
    if !has_valid_prefix {
        return Err(invalid(
            path,
            format!(
                "Path must start with one of: {}",
                ALLOWED_DOCROOT_PREFIXES.join(", ")
            ),
        ));
    }

    Ok(path.trim_end_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_document_root() {
        assert!(validate_document_root("/var/www/html").is_ok());
        assert!(validate_document_root("/home/dev/projects/blog/public").is_ok());
        assert!(validate_document_root("/srv/blog").is_ok());
        assert_eq!(validate_document_root("/srv/blog/").unwrap(), "/srv/blog");
    }

    #[test]
    fn test_invalid_document_root() {
        // Empty
        assert!(validate_document_root("").is_err());
        // Not absolute
        assert!(validate_document_root("srv/blog").is_err());
        // Path traversal
        assert!(validate_document_root("/srv/../etc").is_err());
        assert!(validate_document_root("/srv/blog/..").is_err());
        // Wrong prefix
        assert!(validate_document_root("/etc/nginx").is_err());
        assert!(validate_document_root("/tmp/www").is_err());
        // Control and whitespace
        assert!(validate_document_root("/srv/\0blog").is_err());
        assert!(validate_document_root("/srv/blog\n/etc").is_err());
        assert!(validate_document_root("/srv/my blog").is_err());
        // nginx metacharacters
        assert!(validate_document_root("/srv/blog;").is_err());
        assert!(validate_document_root("/srv/blog}").is_err());
        assert!(validate_document_root("/srv/$blog").is_err());
    }
}
