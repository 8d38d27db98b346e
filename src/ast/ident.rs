use pest::iterators::Pair;
use serde::{Deserialize, Serialize};

use super::{ParseError, ParseResult, Position, Rule};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identifier {
    pub name: String,
    pub position: Position,
}

impl Identifier {
    pub fn from_pair(pair: Pair<Rule>, file: &str) -> ParseResult<Identifier> {
        let position = Position::from_pair(&pair, file);
        if pair.as_rule() != Rule::ident {
            return Err(ParseError::malformed("identifier", position));
        }

        Ok(Identifier {
            name: pair.as_str().to_owned(),
            position,
        })
    }
}
