//! Reading and rewriting nginx server definitions.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::{StackError, ValidationErrorKind};
use crate::validation::{parse_php_version, PhpVersion};

static SERVER_BLOCK: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"server\s*\{").unwrap());

static SERVER_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"server_name\s+([^;]+);").unwrap());

static ROOT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^\s*root\s+([^;]+);").unwrap());

static PHP_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^#[ \t]*php-version:[ \t]*(\S+)[ \t]*$").unwrap());

static FASTCGI_PASS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"fastcgi_pass\s+unix:([^;]+);").unwrap());

/// `php8.3-fpm`, `php83-fpm`, `php83/run`: dotted or compact version in a socket path.
static SOCKET_VERSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"php(\d)\.?(\d{1,2})[-/]").unwrap());

/// Fields extracted from a server definition.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedDefinition {
    pub server_names: Vec<String>,
    pub document_root: Option<String>,
    pub php_version: Option<PhpVersion>,
    pub php_socket: Option<String>,
}

/// Whether the file contains a server block at all.
pub fn is_server_definition(content: &str) -> bool {
    SERVER_BLOCK.is_match(content)
}

pub fn parse_definition(content: &str) -> ParsedDefinition {
    let server_names = SERVER_NAME
        .captures(content)
        .map(|caps| caps[1].split_whitespace().map(str::to_string).collect())
        .unwrap_or_default();

    let document_root = ROOT.captures(content).map(|caps| caps[1].trim().to_string());

    let php_socket = FASTCGI_PASS
        .captures(content)
        .map(|caps| caps[1].trim().to_string());

    // The marker line wins; otherwise infer from the socket path
    let php_version = PHP_MARKER
        .captures(content)
        .and_then(|caps| parse_php_version(&caps[1]).ok())
        .or_else(|| php_socket.as_deref().and_then(version_from_socket));

    ParsedDefinition {
        server_names,
        document_root,
        php_version,
        php_socket,
    }
}

fn version_from_socket(socket: &str) -> Option<PhpVersion> {
    let caps = SOCKET_VERSION.captures(socket)?;
    parse_php_version(&format!("{}.{}", &caps[1], &caps[2])).ok()
}

/// Point a definition at another PHP-FPM socket and update its version
/// marker, inserting the marker when the file has none.
pub fn rebind_php(content: &str, version: PhpVersion, socket: &str) -> Result<String, StackError> {
    if !FASTCGI_PASS.is_match(content) {
        return Err(StackError::Validation {
            kind: ValidationErrorKind::InvalidParameter {
                param: "php_version".to_string(),
                message: "site has no fastcgi_pass directive to rebind".to_string(),
            },
        });
    }

    let socket_line = format!("fastcgi_pass unix:{};", socket);
    let rebound = FASTCGI_PASS.replace_all(content, regex::NoExpand(&socket_line));

    let marker = format!("# php-version: {}", version);
    let rebound = if PHP_MARKER.is_match(&rebound) {
        PHP_MARKER
            .replace_all(&rebound, regex::NoExpand(&marker))
            .into_owned()
    } else {
        format!("{}\n{}", marker, rebound)
    };

    Ok(rebound)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEFINITION: &str = "\
# php-version: 8.3
server {
    listen 80;
    server_name blog.test www.blog.test;
    root /var/www/blog;

    location ~ \\.php$ {
        fastcgi_pass unix:/run/php/php8.3-fpm.sock;
    }
}
";

    #[test]
    fn test_parse_definition() {
        let parsed = parse_definition(DEFINITION);
        assert_eq!(parsed.server_names, vec!["blog.test", "www.blog.test"]);
        assert_eq!(parsed.document_root.as_deref(), Some("/var/www/blog"));
        assert_eq!(parsed.php_version, Some(PhpVersion::new(8, 3)));
        assert_eq!(parsed.php_socket.as_deref(), Some("/run/php/php8.3-fpm.sock"));
    }

    #[test]
    fn test_version_inferred_from_socket() {
        let content = "server {\n    fastcgi_pass unix:/run/php81-fpm/php-fpm.sock;\n}\n";
        assert_eq!(parse_definition(content).php_version, Some(PhpVersion::new(8, 1)));

        let content = "server {\n    fastcgi_pass unix:/run/php-fpm/php-fpm.sock;\n}\n";
        assert_eq!(parse_definition(content).php_version, None);
    }

    #[test]
    fn test_root_must_start_line() {
        let content = "server {\n    # document root /srv/old;\n    root /srv/new;\n}\n";
        assert_eq!(
            parse_definition(content).document_root.as_deref(),
            Some("/srv/new")
        );
    }

    #[test]
    fn test_server_block_detection() {
        assert!(is_server_definition(DEFINITION));
        assert!(!is_server_definition("upstream php { server unix:/x; }"));
    }

    #[test]
    fn test_rebind_php() {
        let rebound = rebind_php(DEFINITION, PhpVersion::new(8, 1), "/run/php/php8.1-fpm.sock").unwrap();
        let parsed = parse_definition(&rebound);
        assert_eq!(parsed.php_version, Some(PhpVersion::new(8, 1)));
        assert_eq!(parsed.php_socket.as_deref(), Some("/run/php/php8.1-fpm.sock"));
        assert_eq!(rebound.matches("php-version").count(), 1);
    }

    #[test]
    fn test_rebind_inserts_marker() {
        let content = "server {\n    fastcgi_pass unix:/run/php-fpm/php-fpm.sock;\n}\n";
        let rebound = rebind_php(content, PhpVersion::new(8, 2), "/run/php82-fpm/php-fpm.sock").unwrap();
        assert!(rebound.starts_with("# php-version: 8.2\n"));
    }

    #[test]
    fn test_rebind_without_php_handler() {
        let content = "server {\n    root /var/www/static;\n}\n";
        assert!(rebind_php(content, PhpVersion::new(8, 3), "/x.sock").is_err());
    }
}
