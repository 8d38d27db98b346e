use std::{fmt::Write as _, path::Path};

use sha2::{Digest, Sha256};

/// A single compilation input: its logical name, its text and the content
/// hash used as cache key and module identity.
///
/// Immutable once created. The comment-stripped text is computed up front so
/// the grammar never has to disambiguate `//` comments from the floor
/// division operator (see [`strip_comments`]).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceUnit {
    pub file: String,
    pub text: String,
    pub stripped: String,
    pub hash: String,
}

impl SourceUnit {
    pub fn new(file: impl Into<String>, text: impl Into<String>) -> Self {
        let file = file.into();
        let text = text.into();

        let mut hasher = Sha256::new();
        hasher.update(text.as_bytes());
        let digest = hasher.finalize();
        let mut hash = String::with_capacity(64);
        for byte in digest {
            let _ = write!(hash, "{byte:02x}");
        }

        let stripped = strip_comments(&text);

        SourceUnit {
            file,
            text,
            stripped,
            hash,
        }
    }

    pub fn from_file(path: &Path) -> std::io::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(Self::new(path.to_string_lossy(), text))
    }
}

/// Blank out `// …` comments while keeping every remaining byte at its
/// original offset, so positions reported by the parser refer to the original
/// text.
///
/// `//` doubles as the floor division operator. The two are told apart the
/// way a JavaScript lexer tells `/`-as-division from `/`-as-regex: after a
/// value (identifier, literal, `)`, `]` or a closing quote) `//` is the
/// operator, everywhere else it starts a comment.
pub fn strip_comments(source: &str) -> String {
    let mut out = String::with_capacity(source.len());
    let mut chars = source.chars().peekable();

    let mut in_string = false;
    let mut escaped = false;
    let mut prev_value_end = false;

    while let Some(c) = chars.next() {
        if in_string {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
                prev_value_end = true;
            }
            continue;
        }

        match c {
            '"' => {
                in_string = true;
                prev_value_end = false;
                out.push(c);
            }
            '/' if chars.peek() == Some(&'/') && !prev_value_end => {
                // comment: blank out everything up to the end of the line
                out.push(' ');
                for c in chars.by_ref() {
                    if c == '\n' {
                        out.push('\n');
                        break;
                    }
                    out.push(' ');
                }
            }
            _ => {
                if c.is_alphanumeric() || c == '_' || c == ')' || c == ']' {
                    prev_value_end = true;
                } else if !c.is_whitespace() {
                    prev_value_end = false;
                }
                out.push(c);
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_line_comment() {
        let stripped = strip_comments("// a comment\nx = 1;");
        assert_eq!(stripped, "            \nx = 1;");
    }

    #[test]
    fn test_keep_floor_division() {
        let stripped = strip_comments("x = 7 // 2;");
        assert_eq!(stripped, "x = 7 // 2;");
    }

    #[test]
    fn test_trailing_comment_after_semicolon() {
        let stripped = strip_comments("x = 1; // note\ny = 2;");
        assert_eq!(stripped, "x = 1;        \ny = 2;");
    }

    #[test]
    fn test_comment_marker_inside_string() {
        let source = "x = \"https://example.com\";";
        assert_eq!(strip_comments(source), source);
    }

    #[test]
    fn test_hash_is_stable() {
        let a = SourceUnit::new("a.sly", "x = 1;");
        let b = SourceUnit::new("b.sly", "x = 1;");
        assert_eq!(a.hash, b.hash);
        assert_eq!(a.hash.len(), 64);
    }
}
