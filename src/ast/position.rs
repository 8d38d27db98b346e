use std::fmt::Display;

use pest::iterators::Pair;
use serde::{Deserialize, Serialize};

use super::Rule;

/// Location of a syntax element within its source unit.
///
/// `line` and `column` are 1-based, `offset` is the 0-based byte offset into
/// the unit's text. Every AST node carries one of these and they are preserved
/// through analysis and code generation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    pub file: String,
    pub line: usize,
    pub column: usize,
    pub offset: usize,
}

impl Position {
    pub fn from_pair(pair: &Pair<Rule>, file: &str) -> Self {
        let (line, column) = pair.line_col();
        Position {
            file: file.to_owned(),
            line,
            column,
            offset: pair.as_span().start(),
        }
    }
}

impl Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}
