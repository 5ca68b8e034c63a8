//! Hosts-file entries.
//!
//! Matching is by exact name token, never by substring: `blog.test` does not
//! match `myblog.test` or `blog.test.local`.

/// Name tokens of a hosts line, with comments and the address stripped.
fn names(line: &str) -> impl Iterator<Item = &str> {
    let data = line.split('#').next().unwrap_or("");
    data.split_whitespace().skip(1)
}

/// Whether any line maps a name to `hostname`.
pub fn has_entry(content: &str, hostname: &str) -> bool {
    content.lines().any(|line| names(line).any(|name| name == hostname))
}

/// Text to append so the file maps `hostname` to `ip`.
///
/// Starts with a newline when the current content does not end with one.
pub fn entry_to_append(content: &str, ip: &str, hostname: &str) -> String {
    let separator = if content.is_empty() || content.ends_with('\n') {
        ""
    } else {
        "\n"
    };
    format!("{}{}\t{}\n", separator, ip, hostname)
}

/// The file with `hostname` removed from every line.
///
/// Lines left without names are dropped; other lines keep their address,
/// remaining names and trailing comment.
pub fn without_entry(content: &str, hostname: &str) -> String {
    let mut out = String::with_capacity(content.len());

    for line in content.lines() {
        if !names(line).any(|name| name == hostname) {
            out.push_str(line);
            out.push('\n');
            continue;
        }

        let (data, comment) = match line.split_once('#') {
            Some((data, comment)) => (data, Some(comment)),
            None => (line, None),
        };
        let mut tokens = data.split_whitespace();
        let address = tokens.next().unwrap_or("");
        let remaining: Vec<&str> = tokens.filter(|name| *name != hostname).collect();

        if remaining.is_empty() {
            continue;
        }

        out.push_str(address);
        out.push('\t');
        out.push_str(&remaining.join(" "));
        if let Some(comment) = comment {
            out.push_str(" #");
            out.push_str(comment);
        }
        out.push('\n');
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOSTS: &str = "\
127.0.0.1\tlocalhost
::1\tlocalhost ip6-localhost
# 127.0.0.1 commented.test
127.0.0.1\tmyblog.test
";

    #[test]
    fn test_exact_token_match() {
        assert!(has_entry(HOSTS, "localhost"));
        assert!(has_entry(HOSTS, "myblog.test"));
        assert!(!has_entry(HOSTS, "blog.test"));
        assert!(!has_entry(HOSTS, "commented.test"));
        assert!(!has_entry(HOSTS, "127.0.0.1"));
    }

    #[test]
    fn test_entry_to_append() {
        assert_eq!(entry_to_append(HOSTS, "127.0.0.1", "blog.test"), "127.0.0.1\tblog.test\n");
        assert_eq!(
            entry_to_append("127.0.0.1 localhost", "127.0.0.1", "blog.test"),
            "\n127.0.0.1\tblog.test\n"
        );
    }

    #[test]
    fn test_without_entry_drops_only_token() {
        let content = format!("{}127.0.0.1\tblog.test\n", HOSTS);
        let cleaned = without_entry(&content, "blog.test");
        assert_eq!(cleaned, HOSTS);
        assert!(has_entry(&cleaned, "myblog.test"));
    }

    #[test]
    fn test_without_entry_keeps_other_names() {
        let content = "127.0.0.1\tblog.test api.test # dev\n";
        assert_eq!(without_entry(content, "blog.test"), "127.0.0.1\tapi.test # dev\n");
    }

    #[test]
    fn test_without_absent_entry_is_identity() {
        assert_eq!(without_entry(HOSTS, "blog.test"), HOSTS);
    }
}
