//! Finds domain-rooted URL references inside JSON-encoded content bodies
//! and rewrites them to the storage token once resolved.
//!
//! The original terminator set (`"`, `)`, `'`, `, ` immediately before
//! another URL, space, `<`, `\`, `&quot;`, end-of-string) isn't expressible
//! as a single `regex` crate pattern because the comma case needs a
//! lookahead the crate's RE2-derived engine doesn't support. So the domain
//! occurrence itself is found with a regex, and the match's end boundary is
//! walked by hand from there.

use regex::Regex;

pub struct ReferenceScanner;

impl ReferenceScanner {
    /// Find every occurrence of `domain` in `content`, each extended
    /// forward to the nearest terminator, deduplicated, and with any
    /// trailing comma stripped.
    pub fn find_matches(content: &str, domain: &str) -> Vec<String> {
        let Ok(needle) = Regex::new(&format!("(?i){}", regex::escape(domain))) else {
            return Vec::new();
        };

        let mut seen = std::collections::HashSet::new();
        let mut matches = Vec::new();

        for m in needle.find_iter(content) {
            let end = scan_to_terminator(content, m.start());
            let mut found = &content[m.start()..end];
            found = found.strip_suffix(',').unwrap_or(found);
            if found.is_empty() {
                continue;
            }
            if seen.insert(found.to_string()) {
                matches.push(found.to_string());
            }
        }

        matches
    }

    /// Replace every literal occurrence of `src` in `content` with the
    /// rewritten reference token. Rust's `str::replace` already replaces
    /// every occurrence and needs no metacharacter escaping (it isn't
    /// regex-based), unlike the global-regex replace this is grounded on.
    pub fn rewrite(content: &str, src: &str, stored_path: &str) -> String {
        content.replace(src, &format!("__GHOST_URL__{}", stored_path))
    }
}

/// Walk forward from `start` by whole characters, never a raw byte index, so
/// a multi-byte character (accented letter, em dash, emoji) between the
/// domain and its terminator can't land `content[i..]` on a continuation
/// byte and panic.
fn scan_to_terminator(content: &str, start: usize) -> usize {
    for (offset, c) in content[start..].char_indices() {
        let i = start + offset;
        match c {
            '"' | ')' | '\'' | ' ' | '<' | '\\' => return i,
            ',' => {
                if starts_with_ci(&content[i + 1..], "http://") || starts_with_ci(&content[i + 1..], "https://") {
                    return i;
                }
            }
            _ => {
                if starts_with_ci(&content[i..], "&quot;") {
                    return i;
                }
            }
        }
    }

    content.len()
}

fn starts_with_ci(haystack: &str, needle: &str) -> bool {
    haystack.len() >= needle.len() && haystack[..needle.len()].eq_ignore_ascii_case(needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_url_terminated_by_quote() {
        let content = r#"{"feature_image":"https://substackcdn.com/a/b.png","x":1}"#;
        let matches = ReferenceScanner::find_matches(content, "https://substackcdn.com");
        assert_eq!(matches, vec!["https://substackcdn.com/a/b.png".to_string()]);
    }

    #[test]
    fn matches_url_terminated_by_comma_before_next_url() {
        let content = "https://substackcdn.com/a.png,https://substackcdn.com/b.png";
        let matches = ReferenceScanner::find_matches(content, "https://substackcdn.com");
        assert_eq!(
            matches,
            vec!["https://substackcdn.com/a.png".to_string(), "https://substackcdn.com/b.png".to_string()]
        );
    }

    #[test]
    fn matches_url_terminated_by_html_quote_entity() {
        let content = "src=https://substackcdn.com/a.png&quot; alt=foo";
        let matches = ReferenceScanner::find_matches(content, "https://substackcdn.com");
        assert_eq!(matches, vec!["https://substackcdn.com/a.png".to_string()]);
    }

    #[test]
    fn matches_url_at_end_of_string() {
        let content = "see https://substackcdn.com/a.png";
        let matches = ReferenceScanner::find_matches(content, "https://substackcdn.com");
        assert_eq!(matches, vec!["https://substackcdn.com/a.png".to_string()]);
    }

    #[test]
    fn deduplicates_repeated_matches() {
        let content = "https://substackcdn.com/a.png and https://substackcdn.com/a.png again";
        let matches = ReferenceScanner::find_matches(content, "https://substackcdn.com");
        assert_eq!(matches.len(), 1);
    }

    #[test]
    fn matching_is_case_insensitive() {
        let content = "HTTPS://SUBSTACKCDN.COM/a.png";
        let matches = ReferenceScanner::find_matches(content, "https://substackcdn.com");
        assert_eq!(matches, vec!["HTTPS://SUBSTACKCDN.COM/a.png".to_string()]);
    }

    #[test]
    fn rewrite_replaces_every_occurrence() {
        let content = "a https://substackcdn.com/a.png b https://substackcdn.com/a.png c";
        let rewritten = ReferenceScanner::rewrite(content, "https://substackcdn.com/a.png", "images/2024/a.png");
        assert_eq!(rewritten, "a __GHOST_URL__images/2024/a.png b __GHOST_URL__images/2024/a.png c");
    }

    #[test]
    fn no_op_rewrite_when_src_absent() {
        let content = "nothing to see here";
        let rewritten = ReferenceScanner::rewrite(content, "https://substackcdn.com/a.png", "x");
        assert_eq!(rewritten, content);
    }

    #[test]
    fn multi_byte_characters_between_url_and_terminator_do_not_panic() {
        let content = "…https://substackcdn.com/a.png—caption\" end";
        let matches = ReferenceScanner::find_matches(content, "https://substackcdn.com");
        assert_eq!(matches, vec!["https://substackcdn.com/a.png—caption".to_string()]);
    }

    #[test]
    fn emoji_after_url_with_no_other_terminator_runs_to_end_of_string() {
        let content = "https://substackcdn.com/a.png🎉";
        let matches = ReferenceScanner::find_matches(content, "https://substackcdn.com");
        assert_eq!(matches, vec!["https://substackcdn.com/a.png🎉".to_string()]);
    }
}
