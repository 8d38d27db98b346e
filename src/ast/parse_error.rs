use std::fmt::Display;

use colored::Colorize;
use pest::error::{Error, ErrorVariant, InputLocation, LineColLocation};

use super::{Position, Rule};

/// Error produced while turning source text into an AST.
///
/// The parser halts on the first hard error; no recovery is attempted.
#[derive(Debug, Clone)]
pub struct ParseError {
    pub message: String,
    pub position: Position,
    pub expected: Option<String>,
    pub got: Option<String>,
    pub suggestion: Option<String>,
}

impl ParseError {
    /// Internal error for a pair whose shape does not match its grammar rule.
    pub(crate) fn malformed(what: &str, position: Position) -> Self {
        ParseError {
            message: format!("malformed {what}"),
            position,
            expected: None,
            got: None,
            suggestion: None,
        }
    }

    /// Render this error with the offending source line and a caret marker.
    pub fn render(&self, source: &str) -> String {
        let Some(line_str) = source.lines().nth(self.position.line.saturating_sub(1)) else {
            return format!("{self}");
        };

        let line = self.position.line;
        let margin = " ".repeat(format!("{line}").len());
        let padding = " ".repeat(self.position.column.saturating_sub(1));
        let caret = "^".red();

        format!("{self}\n{margin} |\n{line} | {line_str}\n{margin} | {padding}{caret}")
    }
}

impl Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.position)?;
        if let Some(expected) = &self.expected {
            write!(f, ", expected {expected}")?;
        }
        if let Some(got) = &self.got {
            write!(f, ", got {got}")?;
        }
        if let Some(suggestion) = &self.suggestion {
            write!(f, "\nhint: {suggestion}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ParseError {}

impl From<(Error<Rule>, &str, &str)> for ParseError {
    fn from((error, file, source): (Error<Rule>, &str, &str)) -> Self {
        let (line, column) = match error.line_col {
            LineColLocation::Pos((line, col)) => (line, col),
            LineColLocation::Span((line, col), _) => (line, col),
        };
        let offset = match error.location {
            InputLocation::Pos(offset) => offset,
            InputLocation::Span((offset, _)) => offset,
        };

        let (expected, got) = match &error.variant {
            ErrorVariant::ParsingError {
                positives,
                negatives: _,
            } => {
                let expected = if positives.is_empty() {
                    None
                } else {
                    Some(
                        positives
                            .iter()
                            .map(describe_rule)
                            .collect::<Vec<_>>()
                            .join(" or "),
                    )
                };
                let got = source[offset..].chars().next().map(|c| format!("'{c}'"));
                (expected, got)
            }
            ErrorVariant::CustomError { .. } => (None, None),
        };

        ParseError {
            message: error.variant.message().to_string(),
            position: Position {
                file: file.to_owned(),
                line,
                column,
                offset,
            },
            expected,
            got,
            suggestion: None,
        }
    }
}

fn describe_rule(rule: &Rule) -> String {
    let name = match rule {
        Rule::statement | Rule::simple_stmt => "a statement",
        Rule::expression | Rule::ternary | Rule::primary => "an expression",
        Rule::ident => "an identifier",
        Rule::string => "a string literal",
        Rule::number => "a number",
        Rule::block => "a block",
        other => return format!("{other:?}"),
    };
    name.to_owned()
}

/// The result of parsing a pair into an AST node.
pub type ParseResult<T> = Result<T, ParseError>;
