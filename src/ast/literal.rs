use pest::iterators::Pair;
use serde::{Deserialize, Serialize};

use super::{ParseError, ParseResult, Position, Rule};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LiteralValue {
    Number(f64),
    String(String),
    Bool(bool),
    Null,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Literal {
    pub value: LiteralValue,
    pub position: Position,
}

impl Literal {
    pub fn from_number(pair: Pair<Rule>, file: &str) -> ParseResult<Literal> {
        let position = Position::from_pair(&pair, file);
        let value = pair
            .as_str()
            .parse::<f64>()
            .map_err(|_| ParseError::malformed("number literal", position.clone()))?;

        Ok(Literal {
            value: LiteralValue::Number(value),
            position,
        })
    }

    pub fn from_string(pair: Pair<Rule>, file: &str) -> ParseResult<Literal> {
        let position = Position::from_pair(&pair, file);
        let inner = pair
            .into_inner()
            .next()
            .ok_or_else(|| ParseError::malformed("string literal", position.clone()))?;

        let raw = inner.as_str();
        let value = unescape::unescape(raw).unwrap_or_else(|| raw.to_owned());

        Ok(Literal {
            value: LiteralValue::String(value),
            position,
        })
    }

    pub fn from_boolean(pair: Pair<Rule>, file: &str) -> ParseResult<Literal> {
        let position = Position::from_pair(&pair, file);
        Ok(Literal {
            value: LiteralValue::Bool(pair.as_str() == "true"),
            position,
        })
    }

    pub fn from_null(pair: Pair<Rule>, file: &str) -> ParseResult<Literal> {
        Ok(Literal {
            value: LiteralValue::Null,
            position: Position::from_pair(&pair, file),
        })
    }
}
