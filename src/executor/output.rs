//! Output handling for failed commands.

const MAX_LINE_CHARS: usize = 200;
const MAX_TOTAL_CHARS: usize = 1000;

/// Condense command output for inclusion in an error.
///
/// Keeps at most `max_lines` non-blank lines, cuts long lines on a char
/// boundary and caps the total size. Empty output becomes `(no output)` so
/// the error never ends in a dangling colon.
pub fn summarize_output(output: &str, max_lines: usize) -> String {
    let lines: Vec<&str> = output
        .lines()
        .map(str::trim_end)
        .filter(|line| !line.is_empty())
        .collect();

    if lines.is_empty() {
        return "(no output)".to_string();
    }

    let mut summary = String::new();
    for line in lines.iter().take(max_lines) {
        let line: String = if line.chars().count() > MAX_LINE_CHARS {
            let cut: String = line.chars().take(MAX_LINE_CHARS).collect();
            format!("{}...", cut)
        } else {
            line.to_string()
        };

        if summary.chars().count() + line.chars().count() > MAX_TOTAL_CHARS {
            summary.push_str("\n...[truncated]");
            return summary;
        }

        if !summary.is_empty() {
            summary.push('\n');
        }
        summary.push_str(&line);
    }

    if lines.len() > max_lines {
        summary.push_str(&format!("\n...[{} more lines]", lines.len() - max_lines));
    }

    summary
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_output_unchanged() {
        assert_eq!(summarize_output("Hello\nWorld\n", 10), "Hello\nWorld");
    }

    #[test]
    fn test_blank_output() {
        assert_eq!(summarize_output("  \n\n", 10), "(no output)");
    }

    #[test]
    fn test_line_limit() {
        let summary = summarize_output("one\ntwo\nthree\nfour\nfive", 3);
        assert!(summary.starts_with("one\ntwo\nthree"));
        assert!(!summary.contains("four"));
        assert!(summary.ends_with("[2 more lines]"));
    }

    #[test]
    fn test_long_multibyte_line_is_cut_on_char_boundary() {
        let line = "é".repeat(300);
        let summary = summarize_output(&line, 5);
        assert!(summary.ends_with("..."));
        assert_eq!(summary.chars().count(), MAX_LINE_CHARS + 3);
    }
}
