//! The closed catalog of stack services.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{StackError, ValidationErrorKind};

/// Every service the manager knows how to control.
///
/// Declaration order is catalog order: discovery walks it front to back, so
/// within an exclusion group the earlier member wins.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum ServiceKind {
    Nginx,
    Mariadb,
    Mysql,
    Apache2,
    Httpd,
    Postgresql,
    Redis,
    PhpFpm,
    Memcached,
}

/// Broad role of a service in the stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Category {
    WebServer,
    Php,
    Database,
    Cache,
}

/// Services that occupy the same role; at most one member is present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExclusionGroup {
    MysqlCompatible,
    Apache,
}

impl ServiceKind {
    /// All kinds in catalog order.
    pub const ALL: [ServiceKind; 9] = [
        ServiceKind::Nginx,
        ServiceKind::Mariadb,
        ServiceKind::Mysql,
        ServiceKind::Apache2,
        ServiceKind::Httpd,
        ServiceKind::Postgresql,
        ServiceKind::Redis,
        ServiceKind::PhpFpm,
        ServiceKind::Memcached,
    ];

    /// Identifier used on the command line and in JSON output.
    pub fn name(&self) -> &'static str {
        match self {
            ServiceKind::Nginx => "nginx",
            ServiceKind::Mariadb => "mariadb",
            ServiceKind::Mysql => "mysql",
            ServiceKind::Apache2 => "apache2",
            ServiceKind::Httpd => "httpd",
            ServiceKind::Postgresql => "postgresql",
            ServiceKind::Redis => "redis",
            ServiceKind::PhpFpm => "php-fpm",
            ServiceKind::Memcached => "memcached",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ServiceKind::Nginx => "Nginx",
            ServiceKind::Mariadb => "MariaDB",
            ServiceKind::Mysql => "MySQL",
            ServiceKind::Apache2 => "Apache",
            ServiceKind::Httpd => "Apache (httpd)",
            ServiceKind::Postgresql => "PostgreSQL",
            ServiceKind::Redis => "Redis",
            ServiceKind::PhpFpm => "PHP-FPM",
            ServiceKind::Memcached => "Memcached",
        }
    }

    pub fn category(&self) -> Category {
        match self {
            ServiceKind::Nginx | ServiceKind::Apache2 | ServiceKind::Httpd => Category::WebServer,
            ServiceKind::PhpFpm => Category::Php,
            ServiceKind::Mariadb | ServiceKind::Mysql | ServiceKind::Postgresql => {
                Category::Database
            }
            ServiceKind::Redis | ServiceKind::Memcached => Category::Cache,
        }
    }

    pub fn exclusion_group(&self) -> Option<ExclusionGroup> {
        match self {
            ServiceKind::Mariadb | ServiceKind::Mysql => Some(ExclusionGroup::MysqlCompatible),
            ServiceKind::Apache2 | ServiceKind::Httpd => Some(ExclusionGroup::Apache),
            _ => None,
        }
    }
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ServiceKind {
    type Err = StackError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ServiceKind::ALL
            .into_iter()
            .find(|kind| kind.name() == s)
            .ok_or_else(|| StackError::Validation {
                kind: ValidationErrorKind::UnknownService {
                    service: s.to_string(),
                },
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_order_matches_declaration() {
        let mut sorted = ServiceKind::ALL;
        sorted.sort();
        assert_eq!(sorted, ServiceKind::ALL);
    }

    #[test]
    fn test_parse_names() {
        assert_eq!("php-fpm".parse::<ServiceKind>().unwrap(), ServiceKind::PhpFpm);
        assert_eq!("mariadb".parse::<ServiceKind>().unwrap(), ServiceKind::Mariadb);
        assert!("supervisor".parse::<ServiceKind>().is_err());
        assert!("Nginx".parse::<ServiceKind>().is_err());
    }

    #[test]
    fn test_exclusion_groups() {
        assert_eq!(
            ServiceKind::Mariadb.exclusion_group(),
            ServiceKind::Mysql.exclusion_group()
        );
        assert_eq!(ServiceKind::Httpd.exclusion_group(), Some(ExclusionGroup::Apache));
        assert_eq!(ServiceKind::Redis.exclusion_group(), None);
    }

    #[test]
    fn test_serialized_name_matches_cli_name() {
        for kind in ServiceKind::ALL {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind.name()));
        }
    }
}
