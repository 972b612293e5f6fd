//! Glob-style key patterns (`*`, `?`, `[...]`, `\` escapes).

use crate::error::{StoreFault, StoreResult};
use regex::Regex;

/// A compiled key pattern.
#[derive(Clone, Debug)]
pub struct GlobPattern {
    source: String,
    matcher: Matcher,
}

#[derive(Clone, Debug)]
enum Matcher {
    Literal,
    Regex(Regex),
}

impl GlobPattern {
    pub fn new(pattern: &str) -> StoreResult<Self> {
        let matcher = if pattern.contains(['*', '?', '[', '\\']) {
            let regex = Regex::new(&glob_to_regex(pattern)).map_err(|e| {
                StoreFault::protocol(format!("invalid key pattern {pattern:?}: {e}"))
            })?;
            Matcher::Regex(regex)
        } else {
            Matcher::Literal
        };

        Ok(Self {
            source: pattern.to_string(),
            matcher,
        })
    }

    pub fn matches(&self, key: &str) -> bool {
        match &self.matcher {
            Matcher::Literal => key == self.source,
            Matcher::Regex(regex) => regex.is_match(key),
        }
    }
}

/// Translate a glob into an anchored regex.
fn glob_to_regex(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len() + 8);
    out.push_str("(?s)^");

    let mut chars = pattern.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            '\\' => match chars.next() {
                Some(escaped) => out.push_str(&regex::escape(&escaped.to_string())),
                None => out.push_str(r"\\"),
            },
            '[' => {
                let mut class = String::new();
                let mut raw = String::from("[");
                let mut closed = false;

                if chars.peek() == Some(&'^') {
                    chars.next();
                    raw.push('^');
                    class.push('^');
                }

                while let Some(n) = chars.next() {
                    raw.push(n);
                    match n {
                        ']' => {
                            closed = true;
                            break;
                        }
                        '\\' => {
                            if let Some(e) = chars.next() {
                                raw.push(e);
                                push_class_char(&mut class, e);
                            }
                        }
                        '-' => class.push('-'),
                        other => push_class_char(&mut class, other),
                    }
                }

                if closed && !class.is_empty() && class != "^" {
                    out.push('[');
                    out.push_str(&class);
                    out.push(']');
                } else {
                    // Unterminated or empty class: match the text literally.
                    out.push_str(&regex::escape(&raw));
                }
            }
            other => out.push_str(&regex::escape(&other.to_string())),
        }
    }

    out.push('$');
    out
}

fn push_class_char(class: &mut String, c: char) {
    if c.is_ascii_punctuation() {
        class.push('\\');
    }
    class.push(c);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matches(pattern: &str, key: &str) -> bool {
        GlobPattern::new(pattern).unwrap().matches(key)
    }

    #[test]
    fn test_literal() {
        assert!(matches("srv.sub-2-dp:app1:alice", "srv.sub-2-dp:app1:alice"));
        assert!(!matches("srv.sub-2-dp:app1:alice", "srv.sub-2-dp:app1:alic"));
    }

    #[test]
    fn test_star_and_question() {
        assert!(matches("srv.sub-2-dp:app1:*", "srv.sub-2-dp:app1:alice"));
        assert!(matches("srv.sub-2-dp:app1:*", "srv.sub-2-dp:app1:"));
        assert!(!matches("srv.sub-2-dp:app1:*", "srv.sub-2-dp:app2:alice"));
        assert!(matches("srv.sub-2-dp:*:bob", "srv.sub-2-dp:app9:bob"));
        assert!(matches("h?llo", "hello"));
        assert!(!matches("h?llo", "hllo"));
    }

    #[test]
    fn test_dots_are_literal() {
        assert!(!matches("delivery.point:*", "deliveryXpoint:d1"));
        assert!(matches("delivery.point:*", "delivery.point:d1"));
    }

    #[test]
    fn test_classes() {
        assert!(matches("h[ae]llo", "hallo"));
        assert!(!matches("h[ae]llo", "hillo"));
        assert!(matches("h[^e]llo", "hallo"));
        assert!(!matches("h[^e]llo", "hello"));
        assert!(matches("h[a-c]llo", "hbllo"));
        assert!(matches("h[abc", "h[abc"));
    }

    #[test]
    fn test_escape() {
        assert!(matches(r"a\*b", "a*b"));
        assert!(!matches(r"a\*b", "axb"));
    }
}
