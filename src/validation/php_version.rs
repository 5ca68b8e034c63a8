//! PHP version parsing.

use std::fmt;
use std::str::FromStr;

use serde::{Serialize, Serializer};

use crate::error::{StackError, ValidationErrorKind};

/// A PHP `major.minor` version such as `8.3`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PhpVersion {
    pub major: u8,
    pub minor: u8,
}

impl PhpVersion {
    pub const fn new(major: u8, minor: u8) -> Self {
        Self { major, minor }
    }

    /// Compact form used by AUR and Remi package names (`8.3` -> `83`).
    pub fn compact(&self) -> String {
        format!("{}{}", self.major, self.minor)
    }
}

impl fmt::Display for PhpVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

impl Serialize for PhpVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl FromStr for PhpVersion {
    type Err = StackError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_php_version(s)
    }
}

/// Parse a strict `major.minor` version string.
///
/// Both parts must be one or two ASCII digits; `8.3.1`, `v8.3` and `8` are
/// rejected.
pub fn parse_php_version(version: &str) -> Result<PhpVersion, StackError> {
    let invalid = || StackError::Validation {
        kind: ValidationErrorKind::InvalidPhpVersion {
            version: version.to_string(),
        },
    };

    let (major, minor) = version.split_once('.').ok_or_else(invalid)?;
    let is_part = |s: &str| !s.is_empty() && s.len() <= 2 && s.chars().all(|c| c.is_ascii_digit());
    if !is_part(major) || !is_part(minor) {
        return Err(invalid());
    }

    Ok(PhpVersion {
        major: major.parse().map_err(|_| invalid())?,
        minor: minor.parse().map_err(|_| invalid())?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_versions() {
        assert_eq!(parse_php_version("8.3").unwrap(), PhpVersion::new(8, 3));
        assert_eq!(parse_php_version("7.4").unwrap(), PhpVersion::new(7, 4));
        assert_eq!(parse_php_version("8.10").unwrap(), PhpVersion::new(8, 10));
    }

    #[test]
    fn test_invalid_versions() {
        assert!(parse_php_version("").is_err());
        assert!(parse_php_version("8").is_err());
        assert!(parse_php_version("8.3.1").is_err());
        assert!(parse_php_version("v8.3").is_err());
        assert!(parse_php_version("8.x").is_err());
        assert!(parse_php_version("8.3;").is_err());
        assert!(parse_php_version(".3").is_err());
    }

    #[test]
    fn test_display_and_compact() {
        let version = PhpVersion::new(8, 2);
        assert_eq!(version.to_string(), "8.2");
        assert_eq!(version.compact(), "82");
        assert!(PhpVersion::new(8, 3) > PhpVersion::new(8, 2));
    }
}
