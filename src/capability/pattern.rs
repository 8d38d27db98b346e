//! Glob matching for capability resource patterns.
//!
//! `*` matches within a path segment, `**` across segments; matching covers
//! the whole resource, anchored at the start. URL capabilities work the same
//! way over a host-plus-path string.

use regex::Regex;

use super::CapabilityError;

#[derive(Debug, Clone)]
pub struct ResourcePattern {
    source: String,
    regex: Regex,
}

impl ResourcePattern {
    pub fn new(pattern: &str) -> Result<Self, CapabilityError> {
        let regex =
            Regex::new(&glob_to_regex(pattern)).map_err(|error| CapabilityError::InvalidToken {
                reason: format!("bad resource pattern '{pattern}': {error}"),
            })?;
        Ok(ResourcePattern {
            source: pattern.to_owned(),
            regex,
        })
    }

    pub fn matches(&self, resource: &str) -> bool {
        self.regex.is_match(resource)
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }
}

fn glob_to_regex(pattern: &str) -> String {
    let mut regex = String::from("^");
    let mut chars = pattern.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '*' => {
                if chars.peek() == Some(&'*') {
                    chars.next();
                    regex.push_str(".*");
                } else {
                    regex.push_str("[^/]*");
                }
            }
            c if "\\.+()[]{}^$|?".contains(c) => {
                regex.push('\\');
                regex.push(c);
            }
            c => regex.push(c),
        }
    }

    regex.push('$');
    regex
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matches(pattern: &str, resource: &str) -> bool {
        ResourcePattern::new(pattern).unwrap().matches(resource)
    }

    #[test]
    fn test_star_stays_within_a_segment() {
        assert!(matches("/tmp/*.txt", "/tmp/notes.txt"));
        assert!(!matches("/tmp/*.txt", "/tmp/deep/notes.txt"));
    }

    #[test]
    fn test_double_star_crosses_segments() {
        assert!(matches("/tmp/**", "/tmp/a"));
        assert!(matches("/tmp/**", "/tmp/a/b/c.txt"));
        assert!(!matches("/tmp/**", "/var/a"));
    }

    #[test]
    fn test_matching_is_anchored() {
        assert!(!matches("/tmp/*", "x/tmp/y"));
        assert!(!matches("/tmp", "/tmp/extra"));
    }

    #[test]
    fn test_url_host_plus_path() {
        assert!(matches("https://api.example.com/**", "https://api.example.com/v1/users"));
        assert!(!matches("https://api.example.com/**", "https://evil.example.com/v1"));
    }

    #[test]
    fn test_regex_metacharacters_are_literal() {
        assert!(matches("a+b", "a+b"));
        assert!(!matches("a+b", "aab"));
    }
}
